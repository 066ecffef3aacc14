use http::StatusCode;
use service_core::error::AppError;
use thiserror::Error;

use super::jwt::TokenError;

/// Why a session could not be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionErrorKind {
    Expired,
    Revoked,
    Invalid,
    InactivityTimeout,
    LimitExceeded,
    AnomalyDetected,
}

impl SessionErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionErrorKind::Expired => "expired",
            SessionErrorKind::Revoked => "revoked",
            SessionErrorKind::Invalid => "invalid",
            SessionErrorKind::InactivityTimeout => "inactivity_timeout",
            SessionErrorKind::LimitExceeded => "limit_exceeded",
            SessionErrorKind::AnomalyDetected => "anomaly_detected",
        }
    }
}

impl std::fmt::Display for SessionErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Multi-factor authentication required")]
    MfaRequired,

    #[error("Session error: {0}")]
    Session(SessionErrorKind),

    #[error("Authorization denied: {0}")]
    AuthorizationDenied(String),

    #[error("Rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimitExceeded { retry_after_secs: u64 },

    #[error("No MFA enrollment for user")]
    MfaNotEnrolled,

    #[error("MFA enrollment already confirmed")]
    MfaAlreadyEnrolled,

    #[error("Invalid role: {0}")]
    InvalidRole(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    /// Transport status the caller should answer with.
    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::AuthenticationFailed(_)
            | AuthError::TokenExpired
            | AuthError::InvalidToken(_)
            | AuthError::Session(_) => StatusCode::UNAUTHORIZED,
            AuthError::MfaRequired | AuthError::AuthorizationDenied(_) => StatusCode::FORBIDDEN,
            AuthError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            AuthError::MfaNotEnrolled => StatusCode::NOT_FOUND,
            AuthError::MfaAlreadyEnrolled => StatusCode::CONFLICT,
            AuthError::InvalidRole(_) => StatusCode::BAD_REQUEST,
            AuthError::Configuration(_) | AuthError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::AuthenticationFailed(_) => "authentication_failed",
            AuthError::TokenExpired => "token_expired",
            AuthError::InvalidToken(_) => "invalid_token",
            AuthError::MfaRequired => "mfa_required",
            AuthError::Session(kind) => match kind {
                SessionErrorKind::Expired => "session_expired",
                SessionErrorKind::Revoked => "session_revoked",
                SessionErrorKind::Invalid => "session_invalid",
                SessionErrorKind::InactivityTimeout => "session_inactivity_timeout",
                SessionErrorKind::LimitExceeded => "session_limit_exceeded",
                SessionErrorKind::AnomalyDetected => "session_anomaly_detected",
            },
            AuthError::AuthorizationDenied(_) => "authorization_denied",
            AuthError::RateLimitExceeded { .. } => "rate_limit_exceeded",
            AuthError::MfaNotEnrolled => "mfa_not_enrolled",
            AuthError::MfaAlreadyEnrolled => "mfa_already_enrolled",
            AuthError::InvalidRole(_) => "invalid_role",
            AuthError::Configuration(_) => "configuration_error",
            AuthError::Internal(_) => "internal_error",
        }
    }

    /// Generic reason safe to show to the end user. Scores, matched rules and
    /// token internals are never included.
    pub fn public_message(&self) -> &'static str {
        match self {
            AuthError::AuthenticationFailed(_) => "Authentication failed",
            AuthError::TokenExpired => "Token expired",
            AuthError::InvalidToken(_) => "Invalid token",
            AuthError::MfaRequired => "Additional verification required",
            AuthError::Session(SessionErrorKind::Expired)
            | AuthError::Session(SessionErrorKind::InactivityTimeout) => "Session expired",
            AuthError::Session(SessionErrorKind::LimitExceeded) => "Too many active sessions",
            AuthError::Session(_) => "Session is no longer valid",
            AuthError::AuthorizationDenied(_) => "Access denied",
            AuthError::RateLimitExceeded { .. } => "Too many attempts. Please try again later.",
            AuthError::MfaNotEnrolled => "Multi-factor authentication is not set up",
            AuthError::MfaAlreadyEnrolled => "Multi-factor authentication is already set up",
            AuthError::InvalidRole(_) => "Invalid role definition",
            AuthError::Configuration(_) | AuthError::Internal(_) => "Internal server error",
        }
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        let public = anyhow::anyhow!(err.public_message());
        match err {
            AuthError::AuthenticationFailed(_)
            | AuthError::TokenExpired
            | AuthError::InvalidToken(_)
            | AuthError::Session(_) => AppError::AuthError(public),
            AuthError::MfaRequired | AuthError::AuthorizationDenied(_) => {
                AppError::Forbidden(public)
            }
            AuthError::RateLimitExceeded { retry_after_secs } => AppError::TooManyRequests(
                err_message(retry_after_secs),
                Some(retry_after_secs),
            ),
            AuthError::MfaNotEnrolled => AppError::NotFound(public),
            AuthError::MfaAlreadyEnrolled => AppError::Conflict(public),
            AuthError::InvalidRole(msg) => AppError::BadRequest(anyhow::anyhow!(msg)),
            AuthError::Configuration(msg) => AppError::ConfigError(anyhow::anyhow!(msg)),
            AuthError::Internal(e) => AppError::InternalError(e),
        }
    }
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Expired => AuthError::TokenExpired,
            TokenError::Invalid(reason) => AuthError::InvalidToken(reason),
        }
    }
}

fn err_message(retry_after_secs: u64) -> String {
    format!(
        "Too many attempts. Please try again in {} seconds.",
        retry_after_secs
    )
}
