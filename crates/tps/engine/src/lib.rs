//! Token processing engine
//!
//! Drives a card through the format operation: reads its identity, opens a
//! GlobalPlatform secure channel with session keys from the key service,
//! checks the card's key set against policy, upgrades the provisioning
//! applet and rolls the key set forward when required.
//!
//! Every collaborator (configuration, key service, token database, audit
//! sink, authenticator) is handed in through an [`EngineContext`].
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]
#![warn(missing_docs, rustdoc::missing_crate_level_docs)]

pub mod applet;
pub mod audit;
pub mod auth;
pub mod card;
pub mod changeover;
pub mod config;
pub mod connection;
pub mod context;
mod error;
pub mod negotiator;
pub mod policy;
pub mod processor;
pub mod tks;
pub mod token_db;

pub use audit::{AuditEvent, AuditSink, MemoryAuditSink, Outcome, TracingAuditSink};
pub use auth::{Authenticator, StaticAuthenticator};
pub use card::{AppletInfo, CardSession};
pub use config::TpsConfig;
pub use connection::TpsConnection;
pub use context::EngineContext;
pub use error::{EndOpStatus, Error, Result};
pub use processor::{ClientSession, TpsProcessor};
pub use tks::{TksClient, TksResponse};
pub use token_db::{Activity, MemoryTokenStore, TokenRecord, TokenStatus, TokenStore};
