//! Request gate: token and session validation followed by authorization.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use super::authz::{AuthorizationDecision, AuthorizationRequest, AuthorizationService};
use super::error::AuthError;
use super::session::{SessionManager, ValidatedSession};
use crate::models::{Action, DeviceFingerprint};

/// A request that passed every check.
#[derive(Debug, Clone)]
pub struct AccessGrant {
    pub validated: ValidatedSession,
    pub decision: AuthorizationDecision,
}

#[derive(Clone)]
pub struct AccessGate {
    sessions: Arc<SessionManager>,
    authz: Arc<AuthorizationService>,
}

impl AccessGate {
    pub fn new(sessions: Arc<SessionManager>, authz: Arc<AuthorizationService>) -> Self {
        Self { sessions, authz }
    }

    pub async fn check(
        &self,
        access_token: &str,
        fingerprint: &DeviceFingerprint,
        resource: &str,
        action: Action,
        attributes: HashMap<String, Value>,
    ) -> Result<AccessGrant, AuthError> {
        let validated = self
            .sessions
            .validate_request(access_token, fingerprint)
            .await?;

        let request = AuthorizationRequest::new(validated.identity.clone(), resource, action)
            .with_attributes(attributes)
            .from_ip(fingerprint.ip_address.clone());
        let decision = self.authz.authorize(&request, Some(&validated.session));

        if !decision.allowed {
            return Err(AuthError::AuthorizationDenied(decision.reason));
        }

        Ok(AccessGrant {
            validated,
            decision,
        })
    }
}
