use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tps_protocol::OpType;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub(crate) struct Cli {
    /// Configuration file (TOML); `TPS_` environment variables override it
    #[arg(short, long, value_name = "FILE", global = true)]
    pub(crate) config: Option<PathBuf>,

    #[command(subcommand)]
    pub(crate) command: Commands,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Commands {
    /// Resolve the configuration and check one operation profile
    CheckConfig {
        /// Operation to check
        #[arg(short, long, value_enum, default_value = "format")]
        operation: Operation,

        /// Token type to check, defaults to `general.default_token_type`
        #[arg(short, long)]
        token_type: Option<String>,

        /// Print the resolved configuration as TOML
        #[arg(long)]
        print: bool,
    },

    /// Decode a GET DATA CPLC answer (hex, status word included)
    Cplc {
        /// Response APDU
        data: String,
    },

    /// Decode card recognition data (tag 66)
    Recognition {
        /// Card data (hex)
        data: String,

        /// Key information template (hex)
        #[arg(short, long)]
        key_info: Option<String>,
    },

    /// Decode one framed client message
    DecodeMessage {
        /// Frame as received, e.g. `s=22&msg_type=15&current_state=10`
        frame: String,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub(crate) enum Operation {
    /// Format
    Format,
    /// Enroll
    Enroll,
    /// PIN reset
    PinReset,
}

impl From<Operation> for OpType {
    fn from(operation: Operation) -> Self {
        match operation {
            Operation::Format => Self::Format,
            Operation::Enroll => Self::Enroll,
            Operation::PinReset => Self::ResetPin,
        }
    }
}
