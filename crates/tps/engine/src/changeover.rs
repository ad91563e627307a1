//! Key changeover
//!
//! Moves the card's key set to the version the profile requires. The channel
//! opened with the card's current keys is used for nothing but PUT KEY; the
//! caller gets a fresh channel on the applet under the new keys.

use std::sync::Arc;

use bytes::Bytes;
use tps_apdu_globalplatform::{KeyInfo, Protocol, SecureChannel};
use tracing::{debug, info, instrument, warn};

use crate::{
    AuditEvent, ClientSession, Error, Outcome, Result, TpsProcessor,
    config::OperationProfile, tks::KeySetRequest,
};

/// Key set development cards accept before any other
const INTERMEDIATE_KEY_INFO: KeyInfo = KeyInfo::new(0x01, 0x01);

impl<S: ClientSession> TpsProcessor<'_, S> {
    /// Roll the card's key set forward when the profile asks for it
    ///
    /// `channel` is the standard channel to the applet. It is returned as is
    /// when key updates are disabled or the card already uses the required
    /// version.
    #[instrument(skip_all)]
    pub fn check_and_upgrade_symmetric_keys(
        &mut self,
        profile: &OperationProfile,
        channel: SecureChannel,
    ) -> Result<SecureChannel> {
        if !profile.key_update.enabled {
            return Ok(channel);
        }
        let required = profile.key_update.required_version()?;
        if channel.key_info().version == required {
            debug!(key_info = %channel.key_info(), "Card already uses the required key version");
            return Ok(channel);
        }

        let config = Arc::clone(&self.context.config);
        let protocol = channel.protocol();
        // INITIALIZE UPDATE only addresses version and index
        let target = KeyInfo::new(required, config.channel.default_key_index);
        let applet_aid = config.aids.netkey_instance()?;

        match self.context.negotiator(profile)?.open(
            &mut *self.client,
            &mut self.session,
            protocol,
            target,
        ) {
            Ok(channel) => {
                debug!(key_info = %channel.key_info(), "Card accepted the required key version");
                return Ok(channel);
            }
            Err(e @ Error::Connection(_)) => return Err(e),
            Err(e) => {
                debug!(error = %e, "Required key version not usable, changing keys over");
            }
        }

        let card_manager = config.aids.card_manager()?;
        if !self.select(&card_manager)? {
            return Err(Error::KeyChangeover("cannot select card manager".into()));
        }
        let mut current_channel = self.context.negotiator(profile)?.open(
            &mut *self.client,
            &mut self.session,
            protocol,
            config.channel.default_key_info(),
        )?;
        let current = current_channel.key_info();

        let result = self.put_new_key_set(profile, &mut current_channel, current, required);
        let new_key_info = result.as_ref().copied().unwrap_or(KeyInfo {
            version: required,
            ..current
        });
        let (outcome, message) = match &result {
            Ok(key_info) => (Outcome::Success, format!("key set changed over to {key_info}")),
            Err(e) => (Outcome::Failure, e.to_string()),
        };
        self.context.audit.record(AuditEvent::KeyChangeover {
            cuid: self.session.cuid_hex(),
            outcome,
            old_key_info: current.to_hex(),
            new_key_info: new_key_info.to_hex(),
            message,
        });
        let new_key_info = result?;
        info!(old = %current, new = %new_key_info, "Key set changed over");

        self.session.set_key_info(new_key_info);
        self.session.changed_over_key_info = Some(new_key_info);

        if !self.select(&applet_aid)? {
            return Err(Error::KeyChangeover(
                "cannot select provisioning applet after key changeover".into(),
            ));
        }
        self.context.negotiator(profile)?.open(
            &mut *self.client,
            &mut self.session,
            protocol,
            target,
        )
    }

    /// PUT KEY the set for `required`, with the development key detour
    ///
    /// The new key info keeps the card's index and, on SCP03, its third byte.
    fn put_new_key_set(
        &mut self,
        profile: &OperationProfile,
        channel: &mut SecureChannel,
        current: KeyInfo,
        required: u8,
    ) -> Result<KeyInfo> {
        let data = self.create_key_set(profile, channel, current, required)?;
        match channel.put_keys(&mut *self.client, current.version, current.index, &data) {
            Ok(()) => Ok(KeyInfo {
                version: required,
                ..current
            }),
            Err(tps_apdu_globalplatform::Error::Apdu(e)) => Err(e.into()),
            Err(e)
                if channel.protocol() == Protocol::Scp02
                    && current.version == KeyInfo::DEVELOPMENT_VERSION =>
            {
                warn!(error = %e, "Development key set refused PUT KEY, installing intermediate key set");
                let changeover_error = |e| Error::from_gp(e, Error::KeyChangeover);
                let intermediate = KeyInfo {
                    kek_index: current.kek_index,
                    ..INTERMEDIATE_KEY_INFO
                };

                let data = self.create_key_set(profile, channel, current, intermediate.version)?;
                channel
                    .put_keys(&mut *self.client, current.version, current.index, &data)
                    .map_err(changeover_error)?;
                if required == intermediate.version {
                    return Ok(intermediate);
                }

                let data = self.create_key_set(profile, channel, intermediate, required)?;
                channel
                    .put_keys(&mut *self.client, intermediate.version, intermediate.index, &data)
                    .map_err(changeover_error)?;
                Ok(KeyInfo {
                    version: required,
                    ..intermediate
                })
            }
            Err(e) => Err(Error::KeyChangeover(e.to_string())),
        }
    }

    fn create_key_set(
        &self,
        profile: &OperationProfile,
        channel: &SecureChannel,
        current: KeyInfo,
        new_version: u8,
    ) -> Result<Bytes> {
        let cuid = *self
            .session
            .applet_info
            .as_ref()
            .ok_or_else(|| Error::KeyChangeover("card identity not read".into()))?
            .cuid();
        let request = KeySetRequest {
            new_version,
            current_key_info: current,
            protocol: channel.protocol(),
            cuid,
            key_diversification_data: *channel.key_diversification_data(),
            wrapped_dek: channel.wrapped_dek().clone(),
            key_set: profile.key_set.clone(),
        };
        self.context
            .tks
            .create_key_set_data(&profile.tks_connection, &request)?
            .into_result("create key set data", Error::KeyChangeover)
    }
}
