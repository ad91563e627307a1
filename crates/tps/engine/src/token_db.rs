//! Token database interface
//!
//! The database is an external store shared by every session. The engine
//! reads one record per card, changes it in memory while the operation runs
//! and writes it back only once the operation succeeded.

use std::{collections::HashMap, fmt};

use derive_more::Display;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::{Error, Outcome, Result};

/// Lifecycle state of a token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenStatus {
    /// Known but never formatted
    #[display("unformatted")]
    Unformatted,
    /// Formatted, not yet enrolled
    #[display("formatted")]
    Formatted,
    /// Enrolled and in use
    #[display("active")]
    Active,
    /// Temporarily disabled
    #[display("suspended")]
    Suspended,
    /// Permanently disabled
    #[display("terminated")]
    Terminated,
}

/// Server side state of one card
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    /// Card unique identifier, upper-case hex
    pub cuid: String,
    /// Lifecycle state
    pub status: TokenStatus,
    /// Installed provisioning applet version
    pub applet_id: Option<String>,
    /// Active key set, upper-case hex, empty when unknown
    pub key_info: String,
    /// Assigned user
    pub user_id: Option<String>,
    /// Token type the card was last processed as
    pub token_type: String,
}

impl TokenRecord {
    /// Record for a card seen for the first time
    pub fn new(cuid: impl Into<String>, token_type: impl Into<String>) -> Self {
        Self {
            cuid: cuid.into(),
            status: TokenStatus::Unformatted,
            applet_id: None,
            key_info: String::new(),
            user_id: None,
            token_type: token_type.into(),
        }
    }
}

/// One line of the activity log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activity {
    /// Operation name, e.g. `format`
    pub operation: String,
    /// Card the operation ran on
    pub cuid: String,
    /// Authenticated user, if any
    pub user_id: Option<String>,
    /// Token type
    pub token_type: String,
    /// Success or failure
    pub outcome: Outcome,
    /// Human readable message
    pub message: String,
}

/// Persistent token store
pub trait TokenStore: Send + Sync + fmt::Debug {
    /// Record for `cuid`, if the card is known
    fn get_token_entry(&self, cuid: &str) -> Result<Option<TokenRecord>>;

    /// Store a record for a card not yet known
    fn add_token_entry(&self, record: &TokenRecord) -> Result<()>;

    /// Replace the record of a known card
    fn update_token_entry(&self, record: &TokenRecord) -> Result<()>;

    /// Append to the activity log
    fn record_activity(&self, activity: Activity) -> Result<()>;
}

/// In process token store
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    records: RwLock<HashMap<String, TokenRecord>>,
    activities: Mutex<Vec<Activity>>,
}

impl MemoryTokenStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with `records`
    pub fn with_records(records: impl IntoIterator<Item = TokenRecord>) -> Self {
        let store = Self::new();
        store.records.write().extend(
            records
                .into_iter()
                .map(|record| (record.cuid.to_ascii_uppercase(), record)),
        );
        store
    }

    /// Snapshot of the activity log
    pub fn activities(&self) -> Vec<Activity> {
        self.activities.lock().clone()
    }
}

impl TokenStore for MemoryTokenStore {
    fn get_token_entry(&self, cuid: &str) -> Result<Option<TokenRecord>> {
        Ok(self.records.read().get(&cuid.to_ascii_uppercase()).cloned())
    }

    fn add_token_entry(&self, record: &TokenRecord) -> Result<()> {
        let mut records = self.records.write();
        let key = record.cuid.to_ascii_uppercase();
        if records.contains_key(&key) {
            return Err(Error::TokenDatabase(format!("token {key} already exists")));
        }
        records.insert(key, record.clone());
        Ok(())
    }

    fn update_token_entry(&self, record: &TokenRecord) -> Result<()> {
        let mut records = self.records.write();
        let key = record.cuid.to_ascii_uppercase();
        match records.get_mut(&key) {
            Some(existing) => {
                *existing = record.clone();
                Ok(())
            }
            None => Err(Error::TokenDatabase(format!("token {key} does not exist"))),
        }
    }

    fn record_activity(&self, activity: Activity) -> Result<()> {
        self.activities.lock().push(activity);
        Ok(())
    }
}
