//! Key set sanity checks
//!
//! Three independent checks run whenever a card reports its key set, before
//! any session key is derived for it. Each is switched by the operation
//! profile and audited on success and failure.

use tps_apdu_globalplatform::KeyInfo;
use tracing::debug;

use crate::{
    AuditEvent, AuditSink, Error, Outcome, Result, TokenRecord, audit::SanityCheck,
    config::KeyPolicyConfig,
};

/// Facts about the card the checks look at
#[derive(Debug, Clone, Copy)]
pub struct KeyCheckInput<'a> {
    /// Card unique identifier
    pub cuid: &'a [u8],
    /// Key diversification data the card reported
    pub kdd: &'a [u8],
    /// Key set the card reported
    pub key_info: KeyInfo,
    /// The card's record, `None` when the database does not know it
    pub record: Option<&'a TokenRecord>,
    /// Key set installed earlier in this session, takes precedence over the record
    pub changed_over_key_info: Option<KeyInfo>,
}

/// Applies the configured key set policy
#[derive(Debug, Clone, Copy)]
pub struct KeyPolicy<'a> {
    settings: &'a KeyPolicyConfig,
    allow_unknown_token: bool,
    audit: &'a dyn AuditSink,
}

impl<'a> KeyPolicy<'a> {
    /// Policy from profile settings
    pub const fn new(
        settings: &'a KeyPolicyConfig,
        allow_unknown_token: bool,
        audit: &'a dyn AuditSink,
    ) -> Self {
        Self {
            settings,
            allow_unknown_token,
            audit,
        }
    }

    /// Run every enabled check, stopping at the first failure
    pub fn check(&self, input: &KeyCheckInput<'_>) -> Result<()> {
        if self.settings.cuid_must_match_kdd {
            self.audited(input, SanityCheck::CuidMatchesKdd, cuid_matches_kdd(input))?;
        }
        if self.settings.enable_bounded_gp_key_version {
            let result = key_version_in_range(
                &input.key_info.to_hex(),
                &self.settings.minimum_gp_key_version,
                &self.settings.maximum_gp_key_version,
            );
            self.audited(input, SanityCheck::KeyVersionRange, result)?;
        }
        if self.settings.validate_card_key_info_against_token_db {
            let result = key_info_on_file(input, self.allow_unknown_token);
            self.audited(input, SanityCheck::TokenDbKeyInfo, result)?;
        }
        Ok(())
    }

    fn audited(
        &self,
        input: &KeyCheckInput<'_>,
        check: SanityCheck,
        result: std::result::Result<String, String>,
    ) -> Result<()> {
        let (outcome, message) = match &result {
            Ok(message) => (Outcome::Success, message.clone()),
            Err(message) => (Outcome::Failure, message.clone()),
        };
        debug!(%check, %outcome, message, "Key sanity check");
        self.audit.record(AuditEvent::KeySanityCheck {
            cuid: hex::encode_upper(input.cuid),
            check,
            outcome,
            key_info: input.key_info.to_hex(),
            message,
        });
        result.map(drop).map_err(Error::SecureChannel)
    }
}

fn cuid_matches_kdd(input: &KeyCheckInput<'_>) -> std::result::Result<String, String> {
    let cuid = hex::encode_upper(input.cuid);
    let kdd = hex::encode_upper(input.kdd);
    if cuid.eq_ignore_ascii_case(&kdd) {
        Ok(format!("CUID {cuid} matches KDD"))
    } else {
        Err(format!("CUID {cuid} does not match KDD {kdd}"))
    }
}

/// Check the first key info byte against an inclusive `[minimum, maximum]`
///
/// `key_info` is the 4 or 6 hex digit form; the bounds are two hex digits.
pub fn key_version_in_range(
    key_info: &str,
    minimum: &str,
    maximum: &str,
) -> std::result::Result<String, String> {
    if key_info.len() != 4 && key_info.len() != 6 {
        return Err(format!("malformed key info {key_info:?}"));
    }
    let version = parse_version(&key_info[..2])
        .ok_or_else(|| format!("malformed key info {key_info:?}"))?;
    let min = parse_version(minimum)
        .ok_or_else(|| format!("invalid minimum key version {minimum:?}"))?;
    let max = parse_version(maximum)
        .ok_or_else(|| format!("invalid maximum key version {maximum:?}"))?;

    if version < min {
        Err(format!(
            "key version {version:02X} less than minimum {min:02X}"
        ))
    } else if version > max {
        Err(format!(
            "key version {version:02X} greater than maximum {max:02X}"
        ))
    } else {
        Ok(format!(
            "key version {version:02X} within {min:02X}..={max:02X}"
        ))
    }
}

fn parse_version(hex: &str) -> Option<u8> {
    if hex.len() != 2 {
        return None;
    }
    u8::from_str_radix(hex, 16).ok()
}

fn key_info_on_file(
    input: &KeyCheckInput<'_>,
    allow_unknown_token: bool,
) -> std::result::Result<String, String> {
    let reported = input.key_info.to_hex();
    let Some(record) = input.record else {
        return if allow_unknown_token {
            Ok(format!("unknown token accepted with key info {reported}"))
        } else {
            Err("token not on file and unknown tokens are not allowed".into())
        };
    };
    let on_file = input
        .changed_over_key_info
        .map(|key_info| key_info.to_hex())
        .unwrap_or_else(|| record.key_info.clone());
    if on_file.is_empty() {
        Ok(format!("no key info on file, card reports {reported}"))
    } else if on_file.eq_ignore_ascii_case(&reported) {
        Ok(format!("key info {reported} matches token database"))
    } else {
        Err(format!(
            "card key info {reported} does not match {on_file} on file"
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryAuditSink;
    use hex_literal::hex;

    const CUID: [u8; 10] = hex!("1122334455667788AABB");

    fn input(key_info: KeyInfo, record: Option<&TokenRecord>) -> KeyCheckInput<'_> {
        KeyCheckInput {
            cuid: &CUID,
            kdd: &CUID,
            key_info,
            record,
            changed_over_key_info: None,
        }
    }

    #[test]
    fn test_version_range() {
        assert!(key_version_in_range("0101", "01", "FF").is_ok());
        assert!(key_version_in_range("FF01", "01", "FF").is_ok());
        assert!(key_version_in_range("300170", "01", "FF").is_ok());

        let below = key_version_in_range("0001", "01", "FF").unwrap_err();
        assert!(below.contains("less than minimum"), "{below}");
        let above = key_version_in_range("0301", "01", "02").unwrap_err();
        assert!(above.contains("greater than maximum"), "{above}");

        assert!(key_version_in_range("010", "01", "FF").is_err());
        assert!(key_version_in_range("ZZ01", "01", "FF").is_err());
        assert!(key_version_in_range("0101", "1", "FF").is_err());
        assert!(key_version_in_range("0101", "01", "0FF").is_err());
    }

    #[test]
    fn test_failure_is_audited() {
        let audit = MemoryAuditSink::new();
        let settings = KeyPolicyConfig::default();
        let policy = KeyPolicy::new(&settings, true, &audit);

        let error = policy.check(&input(KeyInfo::new(0x00, 0x01), None)).unwrap_err();
        assert!(matches!(error, Error::SecureChannel(_)));

        let events = audit.events();
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            AuditEvent::KeySanityCheck { check: SanityCheck::KeyVersionRange, outcome: Outcome::Failure, key_info, message, .. }
                if key_info == "0001" && message.contains("less than minimum")
        ));
    }

    #[test]
    fn test_cuid_must_match_kdd() {
        let audit = MemoryAuditSink::new();
        let settings = KeyPolicyConfig {
            cuid_must_match_kdd: true,
            ..KeyPolicyConfig::default()
        };
        let policy = KeyPolicy::new(&settings, true, &audit);
        policy.check(&input(KeyInfo::new(1, 1), None)).unwrap();
        assert_eq!(audit.events().len(), 3);

        let other_kdd = hex!("00000000000000000001");
        let mismatch = KeyCheckInput {
            kdd: &other_kdd,
            ..input(KeyInfo::new(1, 1), None)
        };
        assert!(policy.check(&mismatch).is_err());
        assert_eq!(audit.events().last().unwrap().outcome(), Outcome::Failure);
    }

    #[test]
    fn test_token_db_consistency() {
        let audit = MemoryAuditSink::new();
        let settings = KeyPolicyConfig::default();
        let mut record = TokenRecord::new("1122334455667788AABB", "userKey");

        // nothing on file yet
        let policy = KeyPolicy::new(&settings, false, &audit);
        policy.check(&input(KeyInfo::new(1, 1), Some(&record))).unwrap();

        record.key_info = "0101".into();
        policy.check(&input(KeyInfo::new(1, 1), Some(&record))).unwrap();
        assert!(policy.check(&input(KeyInfo::new(2, 1), Some(&record))).is_err());

        let changed_over = KeyCheckInput {
            changed_over_key_info: Some(KeyInfo::new(2, 1)),
            ..input(KeyInfo::new(2, 1), Some(&record))
        };
        policy.check(&changed_over).unwrap();
    }

    #[test]
    fn test_unknown_token_defers_to_policy() {
        let audit = MemoryAuditSink::new();
        let settings = KeyPolicyConfig::default();
        KeyPolicy::new(&settings, true, &audit)
            .check(&input(KeyInfo::new(1, 1), None))
            .unwrap();
        assert!(
            KeyPolicy::new(&settings, false, &audit)
                .check(&input(KeyInfo::new(1, 1), None))
                .is_err()
        );
    }

    #[test]
    fn test_disabled_checks_are_skipped() {
        let audit = MemoryAuditSink::new();
        let settings = KeyPolicyConfig {
            validate_card_key_info_against_token_db: false,
            enable_bounded_gp_key_version: false,
            ..KeyPolicyConfig::default()
        };
        KeyPolicy::new(&settings, false, &audit)
            .check(&input(KeyInfo::new(0, 1), None))
            .unwrap();
        assert!(audit.events().is_empty());
    }
}
