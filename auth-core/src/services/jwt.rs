use async_trait::async_trait;
use chrono::{Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::config::JwtConfig;
use crate::models::DeviceFingerprint;

/// Token flavour carried in the `type` claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

/// Claims shared by access and refresh tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject (user ID)
    pub sub: String,
    pub roles: Vec<String>,
    pub mfa: bool,
    #[serde(rename = "type")]
    pub token_type: TokenType,
    /// SHA-256 of the device id the token was issued to
    pub fph: String,
    pub iss: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// JWT ID
    pub jti: String,
}

/// Token pair returned to the client
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

/// Why a token was refused.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("token expired")]
    Expired,
    #[error("invalid token: {0}")]
    Invalid(String),
}

/// Issues and verifies device-bound bearer tokens.
#[async_trait]
pub trait TokenService: Send + Sync {
    async fn generate_token_pair(
        &self,
        user_id: &str,
        roles: &[String],
        mfa_verified: bool,
        fingerprint: &DeviceFingerprint,
    ) -> Result<TokenPair, anyhow::Error>;

    async fn verify(
        &self,
        token: &str,
        fingerprint: &DeviceFingerprint,
    ) -> Result<TokenClaims, TokenError>;
}

/// HS256 JWT implementation of [`TokenService`].
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    access_token_expiry_minutes: i64,
    refresh_token_expiry_days: i64,
}

impl JwtService {
    pub fn new(config: &JwtConfig) -> Result<Self, anyhow::Error> {
        if config.secret.is_empty() {
            return Err(anyhow::anyhow!("JWT secret must not be empty"));
        }

        tracing::info!(issuer = %config.issuer, "JWT service initialized with HS256 key");

        Ok(Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            issuer: config.issuer.clone(),
            access_token_expiry_minutes: config.access_token_expiry_minutes,
            refresh_token_expiry_days: config.refresh_token_expiry_days,
        })
    }

    fn issue(
        &self,
        user_id: &str,
        roles: &[String],
        mfa_verified: bool,
        fingerprint: &DeviceFingerprint,
        token_type: TokenType,
        lifetime: Duration,
    ) -> Result<String, anyhow::Error> {
        let now = Utc::now();
        let claims = TokenClaims {
            sub: user_id.to_string(),
            roles: roles.to_vec(),
            mfa: mfa_verified,
            token_type,
            fph: fingerprint_hash(fingerprint),
            iss: self.issuer.clone(),
            exp: (now + lifetime).timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| anyhow::anyhow!("Failed to encode token: {}", e))
    }

    /// Get access token expiry in seconds (for client info)
    pub fn access_token_expiry_seconds(&self) -> i64 {
        self.access_token_expiry_minutes * 60
    }
}

#[async_trait]
impl TokenService for JwtService {
    async fn generate_token_pair(
        &self,
        user_id: &str,
        roles: &[String],
        mfa_verified: bool,
        fingerprint: &DeviceFingerprint,
    ) -> Result<TokenPair, anyhow::Error> {
        let access_token = self.issue(
            user_id,
            roles,
            mfa_verified,
            fingerprint,
            TokenType::Access,
            Duration::minutes(self.access_token_expiry_minutes),
        )?;
        let refresh_token = self.issue(
            user_id,
            roles,
            mfa_verified,
            fingerprint,
            TokenType::Refresh,
            Duration::days(self.refresh_token_expiry_days),
        )?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: self.access_token_expiry_seconds(),
        })
    }

    async fn verify(
        &self,
        token: &str,
        fingerprint: &DeviceFingerprint,
    ) -> Result<TokenClaims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;
        validation.set_issuer(&[&self.issuer]);

        let claims = decode::<TokenClaims>(token, &self.decoding_key, &validation)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid(e.to_string()),
            })?
            .claims;

        let expected = fingerprint_hash(fingerprint);
        if !bool::from(expected.as_bytes().ct_eq(claims.fph.as_bytes())) {
            return Err(TokenError::Invalid("device binding mismatch".to_string()));
        }

        Ok(claims)
    }
}

/// Hex SHA-256 of the device id. IP and user agent are left out because they
/// legitimately change during a session.
pub fn fingerprint_hash(fingerprint: &DeviceFingerprint) -> String {
    hex::encode(Sha256::digest(fingerprint.device_id.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> JwtConfig {
        JwtConfig {
            secret: "test-secret-test-secret-test-secret".to_string(),
            issuer: "auth-core-test".to_string(),
            access_token_expiry_minutes: 15,
            refresh_token_expiry_days: 7,
        }
    }

    fn device(id: &str) -> DeviceFingerprint {
        DeviceFingerprint::new(id, "10.0.0.1", "test-agent")
    }

    #[test]
    fn test_rejects_empty_secret() {
        let config = JwtConfig {
            secret: String::new(),
            ..config()
        };
        assert!(JwtService::new(&config).is_err());
    }

    #[tokio::test]
    async fn test_token_pair_generation_and_verification() -> Result<(), anyhow::Error> {
        let service = JwtService::new(&config())?;
        let roles = vec!["user".to_string()];
        let pair = service
            .generate_token_pair("user_123", &roles, true, &device("dev-1"))
            .await?;
        assert_eq!(pair.expires_in, 900);

        let claims = service.verify(&pair.access_token, &device("dev-1")).await?;
        assert_eq!(claims.sub, "user_123");
        assert_eq!(claims.roles, roles);
        assert!(claims.mfa);
        assert_eq!(claims.token_type, TokenType::Access);

        let refresh = service.verify(&pair.refresh_token, &device("dev-1")).await?;
        assert_eq!(refresh.token_type, TokenType::Refresh);
        Ok(())
    }

    #[tokio::test]
    async fn test_token_replayed_from_other_device_fails() -> Result<(), anyhow::Error> {
        let service = JwtService::new(&config())?;
        let pair = service
            .generate_token_pair("user_123", &[], false, &device("dev-1"))
            .await?;
        let result = service.verify(&pair.access_token, &device("dev-2")).await;
        assert!(matches!(result, Err(TokenError::Invalid(_))));
        Ok(())
    }

    #[tokio::test]
    async fn test_expired_token_is_typed() -> Result<(), anyhow::Error> {
        let service = JwtService::new(&config())?;
        let token = service.issue(
            "user_123",
            &[],
            false,
            &device("dev-1"),
            TokenType::Access,
            Duration::minutes(-5),
        )?;
        let result = service.verify(&token, &device("dev-1")).await;
        assert!(matches!(result, Err(TokenError::Expired)));
        Ok(())
    }

    #[tokio::test]
    async fn test_tampered_token_is_invalid() -> Result<(), anyhow::Error> {
        let service = JwtService::new(&config())?;
        let other = JwtService::new(&JwtConfig {
            secret: "another-secret-another-secret-another".to_string(),
            ..config()
        })?;
        let pair = other
            .generate_token_pair("user_123", &[], false, &device("dev-1"))
            .await?;
        let result = service.verify(&pair.access_token, &device("dev-1")).await;
        assert!(matches!(result, Err(TokenError::Invalid(_))));
        Ok(())
    }
}
