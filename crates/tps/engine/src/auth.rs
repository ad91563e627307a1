//! End user authentication

use std::{collections::BTreeMap, fmt};

use tps_protocol::Credentials;

use crate::{Error, Result};

/// Verifies credentials collected from the client
pub trait Authenticator: Send + Sync + fmt::Debug {
    /// The authenticated user id
    fn authenticate(&self, credentials: &Credentials) -> Result<String>;
}

/// Authenticates against a fixed user/password table
#[derive(Default, Clone)]
pub struct StaticAuthenticator {
    users: BTreeMap<String, String>,
}

impl fmt::Debug for StaticAuthenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticAuthenticator")
            .field("users", &self.users.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl StaticAuthenticator {
    /// Authenticator knowing no users
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a user
    pub fn with_user(mut self, user_id: impl Into<String>, password: impl Into<String>) -> Self {
        self.users.insert(user_id.into(), password.into());
        self
    }
}

impl Authenticator for StaticAuthenticator {
    fn authenticate(&self, credentials: &Credentials) -> Result<String> {
        match self.users.get(&credentials.user_id) {
            Some(password) if *password == credentials.password => Ok(credentials.user_id.clone()),
            _ => Err(Error::Login(format!(
                "invalid credentials for {}",
                credentials.user_id
            ))),
        }
    }
}
