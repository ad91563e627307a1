//! Collaborators shared by every session

use std::sync::Arc;

use crate::{
    AuditSink, Authenticator, Result, TksClient, TokenStore, TpsConfig,
    config::OperationProfile,
    negotiator::Negotiator,
    policy::KeyPolicy,
};

/// Everything a session needs besides the client connection
#[derive(Debug, Clone)]
pub struct EngineContext {
    /// Server configuration
    pub config: Arc<TpsConfig>,
    /// Key service client
    pub tks: Arc<dyn TksClient>,
    /// Token database
    pub token_store: Arc<dyn TokenStore>,
    /// Audit destination
    pub audit: Arc<dyn AuditSink>,
    /// End user authentication
    pub authenticator: Arc<dyn Authenticator>,
}

impl EngineContext {
    /// Bundle the collaborators
    pub fn new(
        config: TpsConfig,
        tks: Arc<dyn TksClient>,
        token_store: Arc<dyn TokenStore>,
        audit: Arc<dyn AuditSink>,
        authenticator: Arc<dyn Authenticator>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            tks,
            token_store,
            audit,
            authenticator,
        }
    }

    /// Key policy of `profile`
    pub fn key_policy<'a>(&'a self, profile: &'a OperationProfile) -> KeyPolicy<'a> {
        KeyPolicy::new(
            &profile.key_policy,
            profile.allow_unknown_token,
            self.audit.as_ref(),
        )
    }

    /// Negotiator for the key service connection of `profile`
    pub fn negotiator<'a>(&'a self, profile: &'a OperationProfile) -> Result<Negotiator<'a>> {
        let shared_secret = self
            .config
            .tks_connection(&profile.tks_connection)?
            .shared_secret()?;
        Ok(Negotiator::new(
            self.tks.as_ref(),
            &profile.tks_connection,
            &profile.key_set,
            shared_secret,
            self.config.channel.security_level(),
            self.key_policy(profile),
        ))
    }
}
