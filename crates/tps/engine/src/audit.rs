//! Audit events
//!
//! Every key sanity check, key changeover, applet upgrade and token operation
//! produces an event on both success and failure.

use std::fmt;

use derive_more::Display;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Result of an audited step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// The step succeeded
    #[display("success")]
    Success,
    /// The step failed
    #[display("failure")]
    Failure,
}

impl Outcome {
    /// `Success` when `ok`
    pub const fn from_ok(ok: bool) -> Self {
        if ok { Self::Success } else { Self::Failure }
    }
}

/// Key set sanity checks run before a secure channel is trusted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
pub enum SanityCheck {
    /// CUID equals key diversification data
    #[display("cuid_matches_kdd")]
    CuidMatchesKdd,
    /// Key version within the configured range
    #[display("key_version_range")]
    KeyVersionRange,
    /// Key info equals the one on file
    #[display("token_db_key_info")]
    TokenDbKeyInfo,
}

/// An auditable event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditEvent {
    /// A key set sanity check ran
    KeySanityCheck {
        /// Card unique identifier
        cuid: String,
        /// Which check
        check: SanityCheck,
        /// Result
        outcome: Outcome,
        /// Key info the card reported
        key_info: String,
        /// Detail
        message: String,
    },
    /// A key changeover ran
    KeyChangeover {
        /// Card unique identifier
        cuid: String,
        /// Result
        outcome: Outcome,
        /// Key info before the changeover
        old_key_info: String,
        /// Key info the changeover aimed for
        new_key_info: String,
        /// Detail
        message: String,
    },
    /// An applet upgrade ran
    AppletUpgrade {
        /// Card unique identifier
        cuid: String,
        /// Result
        outcome: Outcome,
        /// Version found on the card
        old_version: String,
        /// Version installed
        new_version: String,
        /// Key info of the channel the upgrade used
        key_info: String,
        /// Detail
        message: String,
    },
    /// A client operation finished
    TokenOperation {
        /// Card unique identifier
        cuid: String,
        /// Operation name
        operation: String,
        /// Result
        outcome: Outcome,
        /// Detail
        message: String,
    },
}

impl AuditEvent {
    /// Result of the audited step
    pub const fn outcome(&self) -> Outcome {
        match self {
            Self::KeySanityCheck { outcome, .. }
            | Self::KeyChangeover { outcome, .. }
            | Self::AppletUpgrade { outcome, .. }
            | Self::TokenOperation { outcome, .. } => *outcome,
        }
    }

    /// Event detail
    pub fn message(&self) -> &str {
        match self {
            Self::KeySanityCheck { message, .. }
            | Self::KeyChangeover { message, .. }
            | Self::AppletUpgrade { message, .. }
            | Self::TokenOperation { message, .. } => message,
        }
    }
}

/// Destination of audit events
pub trait AuditSink: Send + Sync + fmt::Debug {
    /// Record one event
    fn record(&self, event: AuditEvent);
}

/// Emits audit events as `tracing` events on the `tps::audit` target
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) {
        match &event {
            AuditEvent::KeySanityCheck {
                cuid,
                check,
                outcome,
                key_info,
                message,
            } => match outcome {
                Outcome::Success => {
                    info!(target: "tps::audit", %cuid, %check, %outcome, %key_info, detail = %message, "Key sanity check")
                }
                Outcome::Failure => {
                    warn!(target: "tps::audit", %cuid, %check, %outcome, %key_info, detail = %message, "Key sanity check")
                }
            },
            AuditEvent::KeyChangeover {
                cuid,
                outcome,
                old_key_info,
                new_key_info,
                message,
            } => {
                info!(target: "tps::audit", %cuid, %outcome, %old_key_info, %new_key_info, detail = %message, "Key changeover")
            }
            AuditEvent::AppletUpgrade {
                cuid,
                outcome,
                old_version,
                new_version,
                key_info,
                message,
            } => {
                info!(target: "tps::audit", %cuid, %outcome, %old_version, %new_version, %key_info, detail = %message, "Applet upgrade")
            }
            AuditEvent::TokenOperation {
                cuid,
                operation,
                outcome,
                message,
            } => {
                info!(target: "tps::audit", %cuid, %operation, %outcome, detail = %message, "Token operation")
            }
        }
    }
}

/// Keeps audit events in memory
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    /// Empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the recorded events
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().clone()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: AuditEvent) {
        self.events.lock().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_keeps_order() {
        let sink = MemoryAuditSink::new();
        sink.record(AuditEvent::KeySanityCheck {
            cuid: "1122334455667788AABB".into(),
            check: SanityCheck::KeyVersionRange,
            outcome: Outcome::Failure,
            key_info: "0001".into(),
            message: "key version 00 less than minimum 01".into(),
        });
        sink.record(AuditEvent::TokenOperation {
            cuid: "1122334455667788AABB".into(),
            operation: "format".into(),
            outcome: Outcome::Failure,
            message: "aborted".into(),
        });
        TracingAuditSink.record(sink.events()[0].clone());

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].outcome(), Outcome::Failure);
        assert!(events[0].message().contains("less than minimum"));
        assert_eq!(Outcome::from_ok(true), Outcome::Success);
    }
}
