//! Operator tools for the token processing server
//!
//! Checks configuration and decodes the card and client data that show up
//! in server logs.

use clap::Parser;
use eyre::WrapErr;
use tps_apdu_globalplatform::{PlatformInfo, cplc};
use tps_engine::TpsConfig;
use tps_protocol::{OpType, TpsMessage};
use tracing::info;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};

mod cli;

fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_ansi(true)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::CheckConfig {
            operation,
            token_type,
            print,
        } => {
            let config = TpsConfig::load(cli.config.as_deref())
                .wrap_err("failed to load configuration")?;
            let token_type = token_type.unwrap_or_else(|| config.general.default_token_type.clone());
            let operation = OpType::from(operation);
            config
                .validate_profile(operation, &token_type)
                .wrap_err_with(|| format!("profile op.{}.{token_type}", operation.name()))?;
            info!(operation = operation.name(), %token_type, "Profile resolves");
            if print {
                println!("{}", toml::to_string_pretty(&config)?);
            }
        }
        Commands::Cplc { data } => {
            let data = decode_hex(&data)?;
            println!("CUID: {}", hex::encode_upper(cplc::extract_cuid(&data)?));
            println!("MSN:  {}", hex::encode_upper(cplc::extract_msn(&data)?));
        }
        Commands::Recognition { data, key_info } => {
            let key_info = key_info.as_deref().map(decode_hex).transpose()?;
            let info = PlatformInfo::from_card_data(&decode_hex(&data)?, &key_info.unwrap_or_default())?;
            println!("Platform:       {}", info.platform);
            println!("Protocol:       {}", info.protocol);
            println!("Implementation: {:#04x}", info.implementation);
            if let Some((major, minor)) = info.gp_version() {
                println!("GP version:     {major}.{minor}");
            }
            println!("SCP OID:        {}", hex::encode_upper(&info.secure_channel_oid));
            for key in info.key_information() {
                println!("Key:            id {:#04x} version {:#04x}", key.id, key.version);
            }
        }
        Commands::DecodeMessage { frame } => {
            let message = TpsMessage::decode(frame.as_bytes()).wrap_err("invalid frame")?;
            println!("{}: {message:#?}", message.message_type());
        }
    }
    Ok(())
}

fn decode_hex(data: &str) -> eyre::Result<Vec<u8>> {
    let cleaned: String = data.chars().filter(|c| !c.is_whitespace()).collect();
    hex::decode(cleaned).wrap_err("input is not valid hex")
}
