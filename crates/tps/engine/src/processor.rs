//! Operation orchestration
//!
//! A [`TpsProcessor`] runs one client operation against the card behind a
//! [`ClientSession`]. It owns the session state, reads the card identity
//! once, and sequences applet upgrade and key changeover for a format.

use std::{collections::BTreeMap, sync::Arc};

use tps_apdu_core::CardTransport;
use tps_apdu_globalplatform::{
    PlatformInfo,
    commands::{AppletStatus, applet, select},
    cplc, platform,
};
use tps_protocol::{ApduRelay, Credentials, MessageChannel, OpType};
use tracing::{debug, info, instrument, warn};

use crate::{
    AppletInfo, AuditEvent, CardSession, EngineContext, Error, Outcome, Result, TokenRecord,
    TokenStatus, config::OperationProfile, token_db::Activity,
};

/// BEGIN_OP extension naming the token type
pub const TOKEN_TYPE_EXTENSION: &str = "tokenType";

/// Task names reported with progress updates
pub mod progress {
    /// Applet blocks are being loaded
    pub const APPLET_UPGRADE: &str = "PROGRESS_APPLET_UPGRADE";
    /// Operation finished
    pub const DONE: &str = "PROGRESS_DONE";
}

/// The remote client: card access plus the out of band messages
pub trait ClientSession: CardTransport {
    /// Report progress and wait for the acknowledgement
    fn status_update(&mut self, percent: u8, task: &str) -> Result<()>;

    /// Ask for credentials
    fn request_login(&mut self, invalid_password: bool, blocked: bool) -> Result<Credentials>;
}

impl<C: MessageChannel> ClientSession for ApduRelay<C> {
    fn status_update(&mut self, percent: u8, task: &str) -> Result<()> {
        Ok(Self::status_update(self, percent, task)?)
    }

    fn request_login(&mut self, invalid_password: bool, blocked: bool) -> Result<Credentials> {
        Ok(Self::request_login(self, invalid_password, blocked)?)
    }
}

/// Runs one operation for one card
#[derive(Debug)]
pub struct TpsProcessor<'c, S> {
    pub(crate) context: EngineContext,
    pub(crate) client: &'c mut S,
    pub(crate) session: CardSession,
}

impl<'c, S: ClientSession> TpsProcessor<'c, S> {
    /// Processor for `operation` with the BEGIN_OP `extensions`
    pub fn new(
        context: EngineContext,
        client: &'c mut S,
        operation: OpType,
        extensions: &BTreeMap<String, String>,
    ) -> Self {
        let token_type = extensions
            .get(TOKEN_TYPE_EXTENSION)
            .cloned()
            .unwrap_or_else(|| context.config.general.default_token_type.clone());
        Self {
            session: CardSession::new(operation, token_type),
            context,
            client,
        }
    }

    /// Session state
    pub const fn session(&self) -> &CardSession {
        &self.session
    }

    /// Run the requested operation
    pub fn process(&mut self) -> Result<()> {
        match self.session.operation {
            OpType::Format => self.format(),
            other => Err(Error::UnsupportedOperation(format!(
                "{} is not handled by this server",
                other.name()
            ))),
        }
    }

    /// Format the card
    ///
    /// Every outcome lands in the activity log and the audit trail.
    #[instrument(skip_all, fields(token_type = %self.session.token_type))]
    pub fn format(&mut self) -> Result<()> {
        let result = self.run_format();
        self.finish(result)
    }

    fn run_format(&mut self) -> Result<()> {
        let config = Arc::clone(&self.context.config);
        self.read_applet_info()?;
        let profile = config.profile(OpType::Format, &self.session.token_type)?;

        self.load_token_record(profile)?;
        if profile.login_required {
            self.login()?;
        }

        let channel = self.check_and_upgrade_applet(profile, 10, 90)?;
        let channel = self.check_and_upgrade_symmetric_keys(profile, channel)?;
        debug!(key_info = %channel.key_info(), "Card formatted over secure channel");

        let token_type = self.session.token_type.clone();
        let record = self
            .session
            .token_record
            .as_mut()
            .ok_or_else(|| Error::TokenDatabase("token record not loaded".into()))?;
        record.status = TokenStatus::Formatted;
        record.user_id = None;
        record.token_type = token_type;

        let store = &self.context.token_store;
        if self.session.token_known {
            store.update_token_entry(record)?;
        } else {
            store.add_token_entry(record)?;
        }
        self.client.status_update(100, progress::DONE)
    }

    fn finish(&mut self, result: Result<()>) -> Result<()> {
        let (outcome, message) = match &result {
            Ok(()) => (Outcome::Success, "format completed".to_owned()),
            Err(e) => (Outcome::Failure, e.to_string()),
        };
        let cuid = self.session.cuid_hex();
        let operation = self.session.operation.name();
        match outcome {
            Outcome::Success => info!(%cuid, operation, "Operation completed"),
            Outcome::Failure => warn!(%cuid, operation, error = %message, "Operation failed"),
        }

        let logged = self.context.token_store.record_activity(Activity {
            operation: operation.to_owned(),
            cuid: cuid.clone(),
            user_id: self.session.user_id.clone(),
            token_type: self.session.token_type.clone(),
            outcome,
            message: message.clone(),
        });
        self.context.audit.record(AuditEvent::TokenOperation {
            cuid,
            operation: operation.to_owned(),
            outcome,
            message,
        });

        match (result, logged) {
            (Err(e), Err(log_error)) => {
                warn!(error = %log_error, "Could not record failed activity");
                Err(e)
            }
            (Err(e), Ok(())) => Err(e),
            (Ok(()), logged) => logged,
        }
    }

    /// Identity and applet version of the card, read once per session
    pub fn read_applet_info(&mut self) -> Result<AppletInfo> {
        if let Some(info) = &self.session.applet_info {
            return Ok(info.clone());
        }
        let card_manager = self.context.config.aids.card_manager()?;
        let applet_aid = self.context.config.aids.netkey_instance()?;

        if !self.select(&card_manager)? {
            return Err(Error::SecureChannel("cannot select card manager".into()));
        }
        let platform = self.platform()?;
        let cplc = cplc::get_cplc_data(&mut *self.client)?;
        let mut info = AppletInfo::new(cplc::extract_cuid(&cplc)?, cplc::extract_msn(&cplc)?);

        if self.select(&applet_aid)? {
            match self.applet_version()? {
                Some((status, build_id)) => info = info.with_applet(&status, build_id),
                None => warn!("Provisioning applet did not report its version"),
            }
        } else {
            debug!("Provisioning applet not installed");
        }

        info!(
            cuid = %info.cuid_hex(),
            msn = %info.msn_hex(),
            protocol = %platform.protocol,
            applet_version = info.final_version(),
            "Card identified"
        );
        self.session.applet_info = Some(info.clone());
        Ok(info)
    }

    fn applet_version(&mut self) -> Result<Option<(AppletStatus, [u8; 4])>> {
        let version = self.client.transmit(&applet::get_version())?;
        let status = self.client.transmit(&applet::get_status())?;
        if !version.check_result() || !status.check_result() {
            return Ok(None);
        }
        let build_id = applet::parse_build_id(version.data())?;
        let status = AppletStatus::parse(status.data())?;
        Ok(Some((status, build_id)))
    }

    /// Platform and protocol of the card, detected once per session
    ///
    /// A card whose recognition data cannot be read or parsed is treated as
    /// GP 2.0.1 speaking SCP01. Transport failures still abort.
    pub fn platform(&mut self) -> Result<PlatformInfo> {
        if let Some(info) = &self.session.platform {
            return Ok(info.clone());
        }
        let card_manager = self.context.config.aids.card_manager()?;
        let info = match platform::detect(&mut *self.client, &card_manager) {
            Ok(info) => info,
            Err(tps_apdu_globalplatform::Error::Apdu(e)) => return Err(e.into()),
            Err(e) => {
                warn!(error = %e, "Platform detection failed, assuming GP201/SCP01");
                PlatformInfo::fallback()
            }
        };
        self.session.platform = Some(info.clone());
        Ok(info)
    }

    /// SELECT by AID, returning whether the card accepted it
    pub(crate) fn select(&mut self, aid: &[u8]) -> Result<bool> {
        let response = self.client.transmit(&select::select_by_name(aid))?;
        if !response.check_result() {
            debug!(aid = %hex::encode_upper(aid), status = %response.status(), "SELECT rejected");
        }
        Ok(response.check_result())
    }

    fn load_token_record(&mut self, profile: &OperationProfile) -> Result<()> {
        let cuid = self.session.cuid_hex();
        let (record, known) = match self.context.token_store.get_token_entry(&cuid)? {
            Some(record) if record.status == TokenStatus::Terminated => {
                return Err(Error::DisabledToken(format!("token {cuid} is terminated")));
            }
            Some(record) => (record, true),
            None if profile.allow_unknown_token => {
                info!(%cuid, "Adding unknown token");
                (TokenRecord::new(&cuid, &self.session.token_type), false)
            }
            None => return Err(Error::UnknownToken(format!("token {cuid} is not on file"))),
        };
        self.session.token_record = Some(record);
        self.session.token_known = known;
        Ok(())
    }

    fn login(&mut self) -> Result<()> {
        let credentials = self.client.request_login(false, false)?;
        let user_id = self.context.authenticator.authenticate(&credentials)?;
        debug!(%user_id, "User authenticated");
        self.session.user_id = Some(user_id);
        Ok(())
    }
}
