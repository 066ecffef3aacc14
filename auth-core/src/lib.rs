pub mod config;
pub mod models;
pub mod services;
pub mod utils;

use std::sync::Arc;

use crate::config::AuthCoreConfig;
use crate::services::{
    AccessGate, AuditEmitter, AuthError, AuthorizationService, MfaService, SessionManager,
    TokenService,
};

/// The three services wired together, sharing one audit channel.
#[derive(Clone)]
pub struct AuthCore {
    pub config: AuthCoreConfig,
    pub sessions: Arc<SessionManager>,
    pub mfa: Arc<MfaService>,
    pub authz: Arc<AuthorizationService>,
    pub gate: AccessGate,
}

impl AuthCore {
    /// Build every service from one configuration. Built-in roles are
    /// registered up front.
    pub fn new(
        config: AuthCoreConfig,
        tokens: Arc<dyn TokenService>,
        audit: AuditEmitter,
    ) -> Result<Self, AuthError> {
        let sessions = Arc::new(SessionManager::new(
            config.session.clone(),
            tokens,
            audit.clone(),
        ));
        let mfa = Arc::new(MfaService::new(config.mfa.clone(), audit.clone()));
        let authz = Arc::new(AuthorizationService::with_builtin_roles(
            config.authz.clone(),
            audit,
        )?);
        let gate = AccessGate::new(Arc::clone(&sessions), Arc::clone(&authz));

        Ok(Self {
            config,
            sessions,
            mfa,
            authz,
            gate,
        })
    }
}
