//! Per-session card state

use std::cell::OnceCell;

use tps_apdu_globalplatform::{KeyInfo, PlatformInfo, commands::AppletStatus};
use tps_protocol::OpType;

use crate::TokenRecord;

/// Identity and applet version of the card in this session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppletInfo {
    cuid: [u8; 10],
    kdd: Option<[u8; 10]>,
    msn: [u8; 4],
    /// GlobalPlatform major version reported by the applet
    pub gp_major: u8,
    /// GlobalPlatform minor version reported by the applet
    pub gp_minor: u8,
    /// Applet major version
    pub applet_major: u8,
    /// Applet minor version
    pub applet_minor: u8,
    /// Applet build id
    pub build_id: [u8; 4],
    /// Total card memory
    pub total_memory: u32,
    /// Free card memory
    pub free_memory: u32,
    final_version: OnceCell<String>,
}

impl AppletInfo {
    /// Card without the provisioning applet
    pub const fn new(cuid: [u8; 10], msn: [u8; 4]) -> Self {
        Self {
            cuid,
            kdd: None,
            msn,
            gp_major: 0,
            gp_minor: 0,
            applet_major: 0,
            applet_minor: 0,
            build_id: [0; 4],
            total_memory: 0,
            free_memory: 0,
            final_version: OnceCell::new(),
        }
    }

    /// Card with the provisioning applet installed
    pub fn with_applet(mut self, status: &AppletStatus, build_id: [u8; 4]) -> Self {
        self.gp_major = status.platform_major;
        self.gp_minor = status.platform_minor;
        self.applet_major = status.applet_major;
        self.applet_minor = status.applet_minor;
        self.total_memory = status.total_memory;
        self.free_memory = status.free_memory;
        self.build_id = build_id;
        self.final_version = OnceCell::new();
        self
    }

    /// Card unique identifier
    pub const fn cuid(&self) -> &[u8; 10] {
        &self.cuid
    }

    /// Card unique identifier, upper-case hex
    pub fn cuid_hex(&self) -> String {
        hex::encode_upper(self.cuid)
    }

    /// Key diversification data from the first INITIALIZE UPDATE answer
    pub const fn kdd(&self) -> Option<&[u8; 10]> {
        self.kdd.as_ref()
    }

    /// Keep the key diversification data the card reported; later answers
    /// do not replace it
    pub(crate) fn record_kdd(&mut self, kdd: [u8; 10]) {
        self.kdd.get_or_insert(kdd);
    }

    /// Manufacturing serial number, upper-case hex
    pub fn msn_hex(&self) -> String {
        hex::encode_upper(self.msn)
    }

    /// `<applet major>.<applet minor>.<build id>`, lower-case
    pub fn final_version(&self) -> &str {
        self.final_version.get_or_init(|| {
            format!(
                "{}.{}.{}",
                self.applet_major,
                self.applet_minor,
                hex::encode(self.build_id)
            )
        })
    }
}

/// Mutable state of one client operation
#[derive(Debug)]
pub struct CardSession {
    /// Operation requested by the client
    pub operation: OpType,
    /// Token type the operation runs as
    pub token_type: String,
    /// Authenticated user
    pub user_id: Option<String>,
    /// Detected platform, cached for the session
    pub platform: Option<PlatformInfo>,
    /// Card identity, read once
    pub applet_info: Option<AppletInfo>,
    /// In-memory copy of the token record
    pub token_record: Option<TokenRecord>,
    /// Whether the record came from the database
    pub token_known: bool,
    /// Key info installed by a key changeover in this session
    pub changed_over_key_info: Option<KeyInfo>,
}

impl CardSession {
    /// Fresh session for `operation` on `token_type`
    pub fn new(operation: OpType, token_type: impl Into<String>) -> Self {
        Self {
            operation,
            token_type: token_type.into(),
            user_id: None,
            platform: None,
            applet_info: None,
            token_record: None,
            token_known: false,
            changed_over_key_info: None,
        }
    }

    /// The record as stored in the database, `None` for unknown cards
    pub fn record_on_file(&self) -> Option<&TokenRecord> {
        self.token_record.as_ref().filter(|_| self.token_known)
    }

    /// Note the key set the card is using in the in-memory record
    pub fn set_key_info(&mut self, key_info: KeyInfo) {
        if let Some(record) = self.token_record.as_mut() {
            record.key_info = key_info.to_hex();
        }
    }

    /// Note the applet version installed on the card
    pub fn set_applet_id(&mut self, version: &str) {
        if let Some(record) = self.token_record.as_mut() {
            record.applet_id = Some(version.to_owned());
        }
    }

    /// CUID of the card, empty until its identity was read
    pub fn cuid_hex(&self) -> String {
        self.applet_info
            .as_ref()
            .map(AppletInfo::cuid_hex)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    const CUID: [u8; 10] = hex!("1122334455667788AABB");

    #[test]
    fn test_card_without_applet() {
        let info = AppletInfo::new(CUID, hex!("DEADBEEF"));
        assert_eq!(info.final_version(), "0.0.00000000");
        assert_eq!(info.cuid_hex(), "1122334455667788AABB");
        assert_eq!(info.kdd(), None);
        assert_eq!(info.msn_hex(), "DEADBEEF");
    }

    #[test]
    fn test_kdd_is_kept_from_first_handshake() {
        let mut info = AppletInfo::new(CUID, [0; 4]);
        info.record_kdd(hex!("00000265018303953662"));
        info.record_kdd(CUID);
        assert_eq!(info.kdd(), Some(&hex!("00000265018303953662")));
    }

    #[test]
    fn test_final_version_is_lower_case() {
        let status = AppletStatus::parse(&hex!("0201010400010000000080000000000a")).unwrap();
        let info = AppletInfo::new(CUID, [0; 4]).with_applet(&status, hex!("54DE790F"));
        assert_eq!(info.final_version(), "1.4.54de790f");
        assert_eq!(info.gp_major, 2);
        assert_eq!(info.total_memory, 0x0001_0000);
        // cached
        assert_eq!(info.final_version(), "1.4.54de790f");
    }

    #[test]
    fn test_session_record_updates() {
        let mut session = CardSession::new(OpType::Format, "userKey");
        session.set_key_info(KeyInfo::new(1, 1));
        assert!(session.token_record.is_none());

        session.token_record = Some(TokenRecord::new("1122334455667788AABB", "userKey"));
        session.set_key_info(KeyInfo::new(1, 1));
        session.set_applet_id("1.4.54de790f");
        assert!(session.record_on_file().is_none());

        session.token_known = true;
        let record = session.record_on_file().unwrap();
        assert_eq!(record.key_info, "0101");
        assert_eq!(record.applet_id.as_deref(), Some("1.4.54de790f"));
    }
}
