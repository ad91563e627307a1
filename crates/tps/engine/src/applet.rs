//! Provisioning applet lifecycle
//!
//! Compares the applet on the card with the version the profile requires and
//! replaces it when they differ: delete, INSTALL [for load], LOAD blocks,
//! INSTALL [for install and make selectable], all over a secure channel
//! opened with the default key set on the Card Manager.

use std::sync::Arc;

use tps_apdu_globalplatform::{KeyInfo, LoadFile, Protocol, SecureChannel};
use tracing::{debug, info, instrument};

use crate::{
    AuditEvent, ClientSession, Error, Outcome, Result, TpsConfig, TpsProcessor,
    config::OperationProfile, processor::progress,
};

/// Privileges granted to the installed applet instance
const APPLET_PRIVILEGES: u8 = 0x00;

impl<S: ClientSession> TpsProcessor<'_, S> {
    /// Make sure the card runs the required applet and hand back an
    /// authenticated channel to it
    ///
    /// Progress between `start` and `end` percent is reported while blocks
    /// are loaded. Without an upgrade the standard channel is still opened.
    #[instrument(skip_all)]
    pub fn check_and_upgrade_applet(
        &mut self,
        profile: &OperationProfile,
        start: u8,
        end: u8,
    ) -> Result<SecureChannel> {
        let config = Arc::clone(&self.context.config);
        let protocol = self.platform()?.protocol;
        let current = self.read_applet_info()?.final_version().to_owned();

        if profile.applet_update.enabled {
            let required = profile.applet_update.required_version_for(protocol)?;
            if required.eq_ignore_ascii_case(&current) {
                debug!(version = %current, "Applet is up to date");
            } else {
                info!(%current, %required, "Applet upgrade required");
                self.upgrade_applet(&config, profile, protocol, &current, required, start, end)?;
            }
        }

        let applet_aid = config.aids.netkey_instance()?;
        if !self.select(&applet_aid)? {
            return Err(Error::SecureChannel(
                "cannot select provisioning applet".into(),
            ));
        }
        self.context.negotiator(profile)?.open(
            &mut *self.client,
            &mut self.session,
            protocol,
            config.channel.default_key_info(),
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn upgrade_applet(
        &mut self,
        config: &TpsConfig,
        profile: &OperationProfile,
        protocol: Protocol,
        current: &str,
        required: &str,
        start: u8,
        end: u8,
    ) -> Result<()> {
        let result = self.install_applet_version(config, profile, protocol, required, start, end);

        let key_info = match &result {
            Ok(key_info) => key_info.to_hex(),
            Err(_) => self
                .session
                .token_record
                .as_ref()
                .map(|record| record.key_info.clone())
                .unwrap_or_default(),
        };
        let (outcome, message) = match &result {
            Ok(_) => (Outcome::Success, format!("applet upgraded to {required}")),
            Err(e) => (Outcome::Failure, e.to_string()),
        };
        self.context.audit.record(AuditEvent::AppletUpgrade {
            cuid: self.session.cuid_hex(),
            outcome,
            old_version: current.to_owned(),
            new_version: required.to_owned(),
            key_info,
            message,
        });

        result?;
        self.session.set_applet_id(required);
        info!(version = %required, "Applet upgraded");
        Ok(())
    }

    fn install_applet_version(
        &mut self,
        config: &TpsConfig,
        profile: &OperationProfile,
        protocol: Protocol,
        version: &str,
        start: u8,
        end: u8,
    ) -> Result<KeyInfo> {
        let card_manager = config.aids.card_manager()?;
        let package = config.aids.netkey_file()?;
        let instance = config.aids.netkey_instance()?;
        let upgrade_error = |e| Error::from_gp(e, Error::UpgradeApplet);

        if !self.select(&card_manager)? {
            return Err(Error::UpgradeApplet("cannot select card manager".into()));
        }
        let mut channel = self.context.negotiator(profile)?.open(
            &mut *self.client,
            &mut self.session,
            protocol,
            config.channel.default_key_info(),
        )?;

        let stale = [
            Some((instance.clone(), false)),
            Some((package.clone(), true)),
            config.aids.netkey_old_instance()?.map(|aid| (aid, false)),
            config.aids.netkey_old_file()?.map(|aid| (aid, true)),
        ];
        for (aid, related) in stale.into_iter().flatten() {
            let deleted = channel
                .delete_object(&mut *self.client, &aid, related)
                .map_err(upgrade_error)?;
            debug!(aid = %hex::encode_upper(&aid), deleted, "Deleted stale applet object");
        }

        let path = profile
            .applet_update
            .load_file_path(version, &config.general.applet_extension);
        let file = LoadFile::from_path(&path).map_err(|e| {
            Error::UpgradeApplet(format!("cannot read load file {}: {e}", path.display()))
        })?;
        channel
            .install_load(&mut *self.client, &package, &card_manager, file.code_size())
            .map_err(upgrade_error)?;

        let blocks = file
            .blocks(channel.max_block_payload(config.channel.block_size))
            .map_err(upgrade_error)?;
        let total = blocks.blocks_count();
        debug!(path = %path.display(), blocks = total, "Loading applet");
        for (sent, block) in blocks.enumerate() {
            channel
                .load_block(&mut *self.client, &block)
                .map_err(upgrade_error)?;
            self.client
                .status_update(progress_percent(start, end, sent + 1, total), progress::APPLET_UPGRADE)?;
        }

        channel
            .install_applet(
                &mut *self.client,
                &package,
                &instance,
                &instance,
                APPLET_PRIVILEGES,
                config.channel.instance_size,
                config.channel.applet_memory_size,
            )
            .map_err(upgrade_error)?;

        if !self.select(&instance)? {
            return Err(Error::UpgradeApplet(
                "installed applet cannot be selected".into(),
            ));
        }
        Ok(channel.key_info())
    }
}

/// Progress after `done` of `total` steps, scaled into `start..=end`
fn progress_percent(start: u8, end: u8, done: usize, total: usize) -> u8 {
    if total == 0 {
        return end;
    }
    let span = usize::from(end.saturating_sub(start));
    let step = span * done.min(total) / total;
    start.saturating_add(u8::try_from(step).unwrap_or(u8::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_percent() {
        assert_eq!(progress_percent(10, 90, 0, 4), 10);
        assert_eq!(progress_percent(10, 90, 1, 4), 30);
        assert_eq!(progress_percent(10, 90, 4, 4), 90);
        assert_eq!(progress_percent(10, 90, 9, 4), 90);
        assert_eq!(progress_percent(10, 90, 0, 0), 90);
    }
}
