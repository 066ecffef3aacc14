//! MFA enrollment model - TOTP secret plus hashed single-use backup codes.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Stored enrollment. Backup codes are kept only as salted hashes.
#[derive(Debug, Clone)]
pub struct MfaEnrollment {
    pub user_id: String,
    /// Base32-encoded shared secret.
    pub secret: String,
    pub backup_code_hashes: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub confirmed: bool,
    pub last_verified_at: Option<DateTime<Utc>>,
    pub recovery_email: Option<String>,
}

impl MfaEnrollment {
    /// Create a new, unconfirmed enrollment.
    pub fn new(
        user_id: impl Into<String>,
        secret: String,
        backup_code_hashes: Vec<String>,
        recovery_email: Option<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            secret,
            backup_code_hashes,
            created_at: Utc::now(),
            confirmed: false,
            last_verified_at: None,
            recovery_email,
        }
    }
}

/// Material returned once, at enrollment. Never stored.
#[derive(Debug, Clone, Serialize)]
pub struct EnrollmentSecrets {
    pub secret: String,
    pub provisioning_uri: String,
    /// Secret split into groups of four for manual entry.
    pub manual_entry_key: String,
    pub backup_codes: Vec<String>,
}

/// How a code was accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MfaMethod {
    Totp,
    BackupCode,
}

/// Outcome of a verification attempt that was not rate limited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MfaVerification {
    pub valid: bool,
    pub method: Option<MfaMethod>,
    /// Present when a backup code was consumed.
    pub backup_codes_remaining: Option<usize>,
}

impl MfaVerification {
    pub fn rejected() -> Self {
        Self {
            valid: false,
            method: None,
            backup_codes_remaining: None,
        }
    }
}

/// Enrollment summary safe to expose to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MfaStatus {
    pub enrolled: bool,
    pub confirmed: bool,
    pub backup_codes_remaining: usize,
    pub last_verified_at: Option<DateTime<Utc>>,
}
