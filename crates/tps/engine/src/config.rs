//! Server configuration
//!
//! Loaded with figment from built-in defaults, an optional TOML file and
//! `TPS_` prefixed environment variables, in that order. Nested keys use `__`
//! in the environment, e.g. `TPS_CHANNEL__BLOCK_SIZE=240`.
//!
//! Every lookup the engine performs goes through a helper here so a missing
//! or malformed value always surfaces as [`Error::Misconfiguration`].

use std::{collections::BTreeMap, path::Path, path::PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use tps_apdu_globalplatform::{KeyInfo, Protocol, SecurityLevel};
use tps_protocol::OpType;

use crate::{Error, Result};

/// Root of the configuration tree
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TpsConfig {
    /// Secure channel parameters
    pub channel: ChannelConfig,
    /// Well known application identifiers
    pub aids: AidConfig,
    /// General settings
    pub general: GeneralConfig,
    /// Key service connections by name
    pub tks: BTreeMap<String, TksConnectionConfig>,
    /// Operation profiles by operation name, then token type
    pub op: BTreeMap<String, BTreeMap<String, OperationProfile>>,
}

/// `[channel]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Key version sent in INITIALIZE UPDATE for a standard channel
    pub default_key_version: u8,
    /// Key index sent in INITIALIZE UPDATE for a standard channel
    pub default_key_index: u8,
    /// Largest wrapped command data field
    pub block_size: usize,
    /// Volatile data limit announced when installing the applet
    pub instance_size: u16,
    /// Non-volatile data limit announced when installing the applet
    pub applet_memory_size: u16,
    /// Encrypt command data in addition to the C-MAC
    pub encryption: bool,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            default_key_version: 0x00,
            default_key_index: 0x00,
            block_size: 0xF8,
            instance_size: 18000,
            applet_memory_size: 5000,
            encryption: true,
        }
    }
}

impl ChannelConfig {
    /// Key set addressed when no specific version is required
    pub const fn default_key_info(&self) -> KeyInfo {
        KeyInfo::new(self.default_key_version, self.default_key_index)
    }

    /// Security level for wrapped commands
    pub const fn security_level(&self) -> SecurityLevel {
        SecurityLevel::from_encryption(self.encryption)
    }
}

/// `[aids]`, all hex encoded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AidConfig {
    /// Card Manager (issuer security domain)
    pub card_manager: String,
    /// Provisioning applet instance
    pub netkey_instance: String,
    /// Provisioning applet package
    pub netkey_file: String,
    /// Instance left behind by older applet generations
    pub netkey_old_instance: String,
    /// Package left behind by older applet generations
    pub netkey_old_file: String,
}

impl Default for AidConfig {
    fn default() -> Self {
        Self {
            card_manager: "A0000000030000".into(),
            netkey_instance: "627601FF000000".into(),
            netkey_file: "627601FF0000".into(),
            netkey_old_instance: "A00000000101".into(),
            netkey_old_file: "A000000001".into(),
        }
    }
}

impl AidConfig {
    /// Card Manager AID bytes
    pub fn card_manager(&self) -> Result<Vec<u8>> {
        decode_aid("aids.card_manager", &self.card_manager)
    }

    /// Provisioning applet instance AID bytes
    pub fn netkey_instance(&self) -> Result<Vec<u8>> {
        decode_aid("aids.netkey_instance", &self.netkey_instance)
    }

    /// Provisioning applet package AID bytes
    pub fn netkey_file(&self) -> Result<Vec<u8>> {
        decode_aid("aids.netkey_file", &self.netkey_file)
    }

    /// Legacy instance AID, if configured
    pub fn netkey_old_instance(&self) -> Result<Option<Vec<u8>>> {
        optional_aid("aids.netkey_old_instance", &self.netkey_old_instance)
    }

    /// Legacy package AID, if configured
    pub fn netkey_old_file(&self) -> Result<Option<Vec<u8>>> {
        optional_aid("aids.netkey_old_file", &self.netkey_old_file)
    }
}

fn decode_aid(key: &str, value: &str) -> Result<Vec<u8>> {
    let aid = hex::decode(value)
        .map_err(|e| Error::Misconfiguration(format!("{key} is not valid hex: {e}")))?;
    if !(5..=16).contains(&aid.len()) {
        return Err(Error::Misconfiguration(format!(
            "{key} must be 5 to 16 bytes, got {}",
            aid.len()
        )));
    }
    Ok(aid)
}

fn optional_aid(key: &str, value: &str) -> Result<Option<Vec<u8>>> {
    if value.is_empty() {
        return Ok(None);
    }
    decode_aid(key, value).map(Some)
}

/// `[general]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// File extension of applet load files
    pub applet_extension: String,
    /// Token type used when BEGIN_OP does not name one
    pub default_token_type: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            applet_extension: "ijc".into(),
            default_token_type: "userKey".into(),
        }
    }
}

/// `[tks.<connection>]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TksConnectionConfig {
    /// Name of the transport key on the key service side
    pub shared_secret_name: String,
    /// Hex encoded 3DES transport key session keys are wrapped under
    pub shared_secret: String,
}

impl TksConnectionConfig {
    /// Decoded transport key, two-key or three-key 3DES
    pub fn shared_secret(&self) -> Result<Vec<u8>> {
        let key = hex::decode(&self.shared_secret).map_err(|e| {
            Error::Misconfiguration(format!(
                "shared secret {} is not valid hex: {e}",
                self.shared_secret_name
            ))
        })?;
        match key.len() {
            16 | 24 => Ok(key),
            len => Err(Error::Misconfiguration(format!(
                "shared secret {} must be 16 or 24 bytes, got {len}",
                self.shared_secret_name
            ))),
        }
    }
}

/// `[op.<operation>.<token_type>]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperationProfile {
    /// Key service connection used for this profile
    pub tks_connection: String,
    /// Master key set name on the key service
    pub key_set: String,
    /// Accept cards the token database does not know
    pub allow_unknown_token: bool,
    /// Ask the client for credentials before touching the card
    pub login_required: bool,
    /// Applet upgrade settings
    pub applet_update: AppletUpdateConfig,
    /// Key changeover settings
    pub key_update: KeyUpdateConfig,
    /// Key set sanity checks
    pub key_policy: KeyPolicyConfig,
}

impl Default for OperationProfile {
    fn default() -> Self {
        Self {
            tks_connection: "tks1".into(),
            key_set: "defKeySet".into(),
            allow_unknown_token: false,
            login_required: false,
            applet_update: AppletUpdateConfig::default(),
            key_update: KeyUpdateConfig::default(),
            key_policy: KeyPolicyConfig::default(),
        }
    }
}

/// `[op.<operation>.<token_type>.applet_update]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppletUpdateConfig {
    /// Upgrade the provisioning applet when its version differs
    pub enabled: bool,
    /// Required version, e.g. `1.4.54de790f`
    pub required_version: Option<String>,
    /// Per protocol number overrides of `required_version`
    pub required_version_by_protocol: BTreeMap<String, String>,
    /// Directory holding the load files
    pub directory: PathBuf,
}

impl AppletUpdateConfig {
    /// Required applet version for cards speaking `protocol`
    pub fn required_version_for(&self, protocol: Protocol) -> Result<&str> {
        self.required_version_by_protocol
            .get(&protocol.number().to_string())
            .or(self.required_version.as_ref())
            .map(String::as_str)
            .filter(|version| !version.is_empty())
            .ok_or_else(|| {
                Error::Misconfiguration(format!(
                    "no required applet version configured for protocol {}",
                    protocol.number()
                ))
            })
    }

    /// Path of the load file for `version`
    pub fn load_file_path(&self, version: &str, extension: &str) -> PathBuf {
        self.directory.join(format!("{version}.{extension}"))
    }
}

/// `[op.<operation>.<token_type>.key_update]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyUpdateConfig {
    /// Roll the card's key set forward when its version differs
    pub enabled: bool,
    /// Key version the card must end up with
    pub required_version: Option<u8>,
}

impl KeyUpdateConfig {
    /// Required key version
    pub fn required_version(&self) -> Result<u8> {
        self.required_version.ok_or_else(|| {
            Error::Misconfiguration("key update enabled without a required version".into())
        })
    }
}

/// `[op.<operation>.<token_type>.key_policy]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyPolicyConfig {
    /// Require the CUID to equal the key diversification data
    pub cuid_must_match_kdd: bool,
    /// Require the card's key info to equal the one on file
    pub validate_card_key_info_against_token_db: bool,
    /// Require the key version to lie within the configured range
    pub enable_bounded_gp_key_version: bool,
    /// Lowest accepted key version, two hex digits
    pub minimum_gp_key_version: String,
    /// Highest accepted key version, two hex digits
    pub maximum_gp_key_version: String,
}

impl Default for KeyPolicyConfig {
    fn default() -> Self {
        Self {
            cuid_must_match_kdd: false,
            validate_card_key_info_against_token_db: true,
            enable_bounded_gp_key_version: true,
            minimum_gp_key_version: "01".into(),
            maximum_gp_key_version: "FF".into(),
        }
    }
}

impl TpsConfig {
    /// The figment every configuration source is merged into
    pub fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(Env::prefixed("TPS_").split("__"))
    }

    /// Load defaults, then `path`, then the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::from_figment(Self::figment(path))
    }

    /// Extract from an already assembled figment
    pub fn from_figment(figment: Figment) -> Result<Self> {
        figment
            .extract()
            .map_err(|e| Error::Misconfiguration(e.to_string()))
    }

    /// Profile for `operation` on tokens of `token_type`
    pub fn profile(&self, operation: OpType, token_type: &str) -> Result<&OperationProfile> {
        self.op
            .get(operation.name())
            .and_then(|profiles| profiles.get(token_type))
            .ok_or_else(|| {
                Error::Misconfiguration(format!(
                    "no op.{}.{token_type} profile configured",
                    operation.name()
                ))
            })
    }

    /// Key service connection `name`
    pub fn tks_connection(&self, name: &str) -> Result<&TksConnectionConfig> {
        self.tks
            .get(name)
            .ok_or_else(|| Error::Misconfiguration(format!("unknown TKS connection {name}")))
    }

    /// Resolve every lookup a format of `token_type` would perform
    pub fn validate_profile(&self, operation: OpType, token_type: &str) -> Result<()> {
        self.aids.card_manager()?;
        self.aids.netkey_instance()?;
        self.aids.netkey_file()?;
        self.aids.netkey_old_instance()?;
        self.aids.netkey_old_file()?;
        let profile = self.profile(operation, token_type)?;
        self.tks_connection(&profile.tks_connection)?.shared_secret()?;
        if profile.applet_update.enabled {
            for protocol in [Protocol::Scp01, Protocol::Scp02, Protocol::Scp03] {
                profile.applet_update.required_version_for(protocol)?;
            }
        }
        if profile.key_update.enabled {
            profile.key_update.required_version()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    const SAMPLE: &str = r#"
        [channel]
        encryption = false

        [tks.tks1]
        shared_secret_name = "sharedSecret"
        shared_secret = "404142434445464748494A4B4C4D4E4F"

        [op.format.userKey]
        tks_connection = "tks1"
        key_set = "defKeySet"

        [op.format.userKey.applet_update]
        enabled = true
        required_version = "1.4.54de790f"
        required_version_by_protocol = { "3" = "1.5.00000001" }
        directory = "/usr/share/tps/applets"

        [op.format.userKey.key_update]
        enabled = true
        required_version = 2
    "#;

    fn sample() -> TpsConfig {
        TpsConfig::from_figment(
            Figment::from(Serialized::defaults(TpsConfig::default())).merge(Toml::string(SAMPLE)),
        )
        .unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = TpsConfig::default();
        assert_eq!(config.channel.block_size, 0xF8);
        assert_eq!(config.channel.instance_size, 18000);
        assert_eq!(config.channel.default_key_info(), KeyInfo::new(0, 0));
        assert_eq!(config.aids.card_manager().unwrap(), [0xA0, 0, 0, 0, 0x03, 0, 0]);
        assert_eq!(config.general.applet_extension, "ijc");

        let policy = KeyPolicyConfig::default();
        assert!(!policy.cuid_must_match_kdd);
        assert!(policy.validate_card_key_info_against_token_db);
        assert_eq!(policy.minimum_gp_key_version, "01");
        assert_eq!(policy.maximum_gp_key_version, "FF");
    }

    #[test]
    fn test_toml_overrides_defaults() {
        let config = sample();
        assert!(!config.channel.encryption);
        assert_eq!(config.channel.security_level(), SecurityLevel::Mac);
        assert_eq!(config.channel.block_size, 0xF8);

        let profile = config.profile(OpType::Format, "userKey").unwrap();
        assert_eq!(profile.key_update.required_version().unwrap(), 2);
        assert_eq!(
            profile.applet_update.required_version_for(Protocol::Scp02).unwrap(),
            "1.4.54de790f"
        );
        assert_eq!(
            profile.applet_update.required_version_for(Protocol::Scp03).unwrap(),
            "1.5.00000001"
        );
        assert_eq!(
            profile.applet_update.load_file_path("1.4.54de790f", "ijc"),
            PathBuf::from("/usr/share/tps/applets/1.4.54de790f.ijc")
        );
        assert_eq!(
            config.tks_connection("tks1").unwrap().shared_secret().unwrap().len(),
            16
        );
        config.validate_profile(OpType::Format, "userKey").unwrap();
    }

    #[test]
    fn test_lookup_failures_are_misconfiguration() {
        let config = sample();
        assert!(matches!(
            config.profile(OpType::Enroll, "userKey"),
            Err(Error::Misconfiguration(_))
        ));
        assert!(matches!(
            config.tks_connection("tks2"),
            Err(Error::Misconfiguration(_))
        ));

        let mut broken = config.clone();
        broken.aids.card_manager = "A0000000ZZ".into();
        assert!(matches!(
            broken.aids.card_manager(),
            Err(Error::Misconfiguration(_))
        ));

        let secret = TksConnectionConfig {
            shared_secret_name: "short".into(),
            shared_secret: "0011".into(),
        };
        assert!(matches!(
            secret.shared_secret(),
            Err(Error::Misconfiguration(_))
        ));

        assert!(matches!(
            KeyUpdateConfig::default().required_version(),
            Err(Error::Misconfiguration(_))
        ));
        assert!(matches!(
            AppletUpdateConfig::default().required_version_for(Protocol::Scp01),
            Err(Error::Misconfiguration(_))
        ));
    }

    #[test]
    fn test_environment_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file("tps.toml", SAMPLE)?;
            jail.set_env("TPS_CHANNEL__BLOCK_SIZE", "200");
            jail.set_env("TPS_GENERAL__DEFAULT_TOKEN_TYPE", "soKey");

            let config = TpsConfig::load(Some(Path::new("tps.toml"))).unwrap();
            assert_eq!(config.channel.block_size, 200);
            assert!(!config.channel.encryption);
            assert_eq!(config.general.default_token_type, "soKey");
            Ok(())
        });
    }
}
