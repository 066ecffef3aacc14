//! Shared helpers for auth-core integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use auth_core::{
    config::{AuthCoreConfig, JwtConfig},
    models::{AuditEvent, DeviceFingerprint},
    services::{
        jwt::fingerprint_hash, AuditEmitter, TokenClaims, TokenError, TokenPair, TokenService,
        TokenType,
    },
    utils::totp,
    AuthCore,
};
use chrono::{Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use uuid::Uuid;

pub const TEST_JWT_SECRET: &str = "integration-test-secret-0123456789abcdef";

pub fn test_config() -> AuthCoreConfig {
    AuthCoreConfig {
        jwt: JwtConfig {
            secret: TEST_JWT_SECRET.to_string(),
            ..JwtConfig::default()
        },
        ..AuthCoreConfig::default()
    }
}

pub fn device(device_id: &str, ip: &str) -> DeviceFingerprint {
    DeviceFingerprint::new(device_id, ip, "Mozilla/5.0 (X11; Linux x86_64)")
}

pub fn laptop() -> DeviceFingerprint {
    device("laptop-1", "10.0.0.5")
}

/// Opaque-token service keeping claims in memory. Device binding is off by
/// default so drift reaches the risk engine.
#[derive(Default)]
pub struct InMemoryTokenService {
    tokens: DashMap<String, TokenClaims>,
    bind_device: bool,
}

impl InMemoryTokenService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn device_bound() -> Self {
        Self {
            bind_device: true,
            ..Self::default()
        }
    }

    /// Move a token's expiry into the past.
    pub fn expire(&self, token: &str) {
        if let Some(mut claims) = self.tokens.get_mut(token) {
            claims.exp = (Utc::now() - Duration::minutes(1)).timestamp();
        }
    }

    fn issue(
        &self,
        user_id: &str,
        roles: &[String],
        mfa_verified: bool,
        fingerprint: &DeviceFingerprint,
        token_type: TokenType,
    ) -> String {
        let now = Utc::now();
        let token = format!("tok_{}", Uuid::new_v4().simple());
        self.tokens.insert(
            token.clone(),
            TokenClaims {
                sub: user_id.to_string(),
                roles: roles.to_vec(),
                mfa: mfa_verified,
                token_type,
                fph: fingerprint_hash(fingerprint),
                iss: "in-memory".to_string(),
                exp: (now + Duration::minutes(15)).timestamp(),
                iat: now.timestamp(),
                jti: Uuid::new_v4().to_string(),
            },
        );
        token
    }
}

#[async_trait]
impl TokenService for InMemoryTokenService {
    async fn generate_token_pair(
        &self,
        user_id: &str,
        roles: &[String],
        mfa_verified: bool,
        fingerprint: &DeviceFingerprint,
    ) -> Result<TokenPair, anyhow::Error> {
        Ok(TokenPair {
            access_token: self.issue(user_id, roles, mfa_verified, fingerprint, TokenType::Access),
            refresh_token: self.issue(
                user_id,
                roles,
                mfa_verified,
                fingerprint,
                TokenType::Refresh,
            ),
            token_type: "Bearer".to_string(),
            expires_in: 900,
        })
    }

    async fn verify(
        &self,
        token: &str,
        fingerprint: &DeviceFingerprint,
    ) -> Result<TokenClaims, TokenError> {
        let claims = self
            .tokens
            .get(token)
            .map(|c| c.value().clone())
            .ok_or_else(|| TokenError::Invalid("unknown token".to_string()))?;
        if claims.exp <= Utc::now().timestamp() {
            return Err(TokenError::Expired);
        }
        if self.bind_device && claims.fph != fingerprint_hash(fingerprint) {
            return Err(TokenError::Invalid("device binding mismatch".to_string()));
        }
        Ok(claims)
    }
}

/// Core wired to an in-memory token service and an inspectable audit channel.
pub struct TestCore {
    pub core: AuthCore,
    pub tokens: Arc<InMemoryTokenService>,
    pub audit_rx: UnboundedReceiver<AuditEvent>,
}

impl TestCore {
    pub fn new(config: AuthCoreConfig) -> Self {
        Self::with_tokens(config, Arc::new(InMemoryTokenService::new()))
    }

    pub fn with_tokens(config: AuthCoreConfig, tokens: Arc<InMemoryTokenService>) -> Self {
        let (audit, audit_rx) = AuditEmitter::channel();
        let core = AuthCore::new(config, tokens.clone(), audit).expect("core should build");
        Self {
            core,
            tokens,
            audit_rx,
        }
    }

    /// Everything emitted so far.
    pub fn drain_audit(&mut self) -> Vec<AuditEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.audit_rx.try_recv() {
            events.push(event);
        }
        events
    }
}

/// Code for the current time step.
pub fn current_totp(secret_base32: &str) -> String {
    let key = totp::base32_decode(secret_base32).expect("valid base32 secret");
    totp::totp(&key, Utc::now().timestamp() as u64, 30, 6).expect("totp")
}

/// A six-digit code that is valid for none of the steps near now.
pub fn wrong_totp(secret_base32: &str) -> String {
    let key = totp::base32_decode(secret_base32).expect("valid base32 secret");
    let now = Utc::now().timestamp() as u64;
    let nearby: Vec<String> = (0..=4)
        .map(|i| totp::totp(&key, now + i * 30 - 60, 30, 6).expect("totp"))
        .collect();
    (0u32..)
        .map(|n| format!("{:06}", n))
        .find(|candidate| !nearby.contains(candidate))
        .expect("some code is unused")
}

pub fn roles(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}
