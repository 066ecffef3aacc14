//! TOTP multi-factor service with single-use backup codes.

use chrono::Utc;
use dashmap::DashMap;
use serde_json::json;

use super::audit::AuditEmitter;
use super::error::AuthError;
use super::rate_limit::AttemptLimiter;
use crate::config::MfaConfig;
use crate::models::{
    AuditEvent, AuditEventType, AuditOutcome, EnrollmentSecrets, MfaEnrollment, MfaMethod,
    MfaStatus, MfaVerification,
};
use crate::utils::backup_codes;
use crate::utils::totp;

pub struct MfaService {
    config: MfaConfig,
    enrollments: DashMap<String, MfaEnrollment>,
    limiter: AttemptLimiter,
    audit: AuditEmitter,
}

impl MfaService {
    pub fn new(config: MfaConfig, audit: AuditEmitter) -> Self {
        let limiter = AttemptLimiter::new(config.max_attempts, config.attempt_window_ms);
        Self {
            config,
            enrollments: DashMap::new(),
            limiter,
            audit,
        }
    }

    /// Start (or restart) enrollment. The returned secrets are the only time
    /// the secret and backup codes are available in plaintext.
    pub fn enroll_user(
        &self,
        user_id: &str,
        recovery_email: Option<&str>,
    ) -> Result<EnrollmentSecrets, AuthError> {
        if self
            .enrollments
            .get(user_id)
            .is_some_and(|e| e.confirmed)
        {
            return Err(AuthError::MfaAlreadyEnrolled);
        }

        let secret = totp::base32_encode(&totp::generate_secret());
        let codes = backup_codes::generate_codes(
            self.config.backup_code_count,
            self.config.backup_code_length,
        );
        let account = recovery_email.unwrap_or(user_id);

        let secrets = EnrollmentSecrets {
            provisioning_uri: totp::provisioning_uri(
                &self.config.issuer,
                account,
                &secret,
                self.config.digits,
                self.config.time_step_seconds,
            ),
            manual_entry_key: totp::format_secret_for_display(&secret),
            secret: secret.clone(),
            backup_codes: codes.clone(),
        };

        let enrollment = MfaEnrollment::new(
            user_id,
            secret,
            backup_codes::hash_codes(&codes)?,
            recovery_email.map(str::to_string),
        );

        // A pending enrollment may have been confirmed since the check above.
        match self.enrollments.entry(user_id.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(entry) if entry.get().confirmed => {
                return Err(AuthError::MfaAlreadyEnrolled);
            }
            dashmap::mapref::entry::Entry::Occupied(mut entry) => {
                entry.insert(enrollment);
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(enrollment);
            }
        }

        tracing::info!(user_id = %user_id, app = %self.config.app_name, "MFA enrollment started");
        self.audit.emit(AuditEvent::mfa_event(
            AuditEventType::MfaEnrolled,
            user_id,
            AuditOutcome::Success,
            None,
        ));
        Ok(secrets)
    }

    /// Confirm a pending enrollment with a code from the authenticator app.
    /// Returns `Ok(false)` when the code is wrong.
    pub fn confirm_enrollment(&self, user_id: &str, otp: &str) -> Result<bool, AuthError> {
        self.limiter.try_acquire(user_id)?;

        let confirmed = {
            let Some(mut enrollment) = self.enrollments.get_mut(user_id) else {
                return Err(AuthError::MfaNotEnrolled);
            };
            if enrollment.confirmed {
                return Err(AuthError::MfaAlreadyEnrolled);
            }
            if self.check_totp(&enrollment.secret, otp)? {
                enrollment.confirmed = true;
                enrollment.last_verified_at = Some(Utc::now());
                true
            } else {
                false
            }
        };

        self.settle(user_id, confirmed);
        let outcome = if confirmed {
            AuditOutcome::Success
        } else {
            AuditOutcome::Failure
        };
        self.audit.emit(AuditEvent::mfa_event(
            AuditEventType::MfaConfirmed,
            user_id,
            outcome,
            None,
        ));
        Ok(confirmed)
    }

    /// Verify a TOTP or backup code for a confirmed enrollment.
    pub fn verify(&self, user_id: &str, code: &str) -> Result<MfaVerification, AuthError> {
        if let Err(e) = self.limiter.try_acquire(user_id) {
            tracing::warn!(user_id = %user_id, "MFA verification rate limited");
            self.audit.emit(AuditEvent::mfa_event(
                AuditEventType::MfaVerified,
                user_id,
                AuditOutcome::Blocked,
                Some(json!({ "reason": "rate_limited" })),
            ));
            return Err(e);
        }

        let normalized = backup_codes::normalize_code(code);
        let (secret, hashes) = match self.enrollments.get(user_id) {
            Some(enrollment) if enrollment.confirmed => {
                (enrollment.secret.clone(), enrollment.backup_code_hashes.clone())
            }
            _ => return Err(AuthError::MfaNotEnrolled),
        };

        // Hashing runs without holding the enrollment guard.
        let totp_valid =
            self.looks_like_totp(&normalized) && self.check_totp(&secret, &normalized)?;
        let backup_match = backup_codes::find_matching_code(&normalized, &hashes)
            .map(|index| hashes[index].clone());

        let verification = match self.enrollments.get_mut(user_id) {
            Some(mut enrollment) if totp_valid => {
                enrollment.last_verified_at = Some(Utc::now());
                MfaVerification {
                    valid: true,
                    method: Some(MfaMethod::Totp),
                    backup_codes_remaining: None,
                }
            }
            Some(mut enrollment) => {
                // The matched hash may have been consumed by a concurrent call.
                let position = backup_match.and_then(|matched| {
                    enrollment
                        .backup_code_hashes
                        .iter()
                        .position(|stored| *stored == matched)
                });
                match position {
                    Some(index) => {
                        enrollment.backup_code_hashes.remove(index);
                        enrollment.last_verified_at = Some(Utc::now());
                        MfaVerification {
                            valid: true,
                            method: Some(MfaMethod::BackupCode),
                            backup_codes_remaining: Some(enrollment.backup_code_hashes.len()),
                        }
                    }
                    None => MfaVerification::rejected(),
                }
            }
            None => MfaVerification::rejected(),
        };

        self.settle(user_id, verification.valid);
        if verification.method == Some(MfaMethod::BackupCode) {
            tracing::info!(
                user_id = %user_id,
                remaining = ?verification.backup_codes_remaining,
                "Backup code consumed"
            );
        }

        let (outcome, details) = if verification.valid {
            (
                AuditOutcome::Success,
                json!({
                    "method": verification.method,
                    "backup_codes_remaining": verification.backup_codes_remaining,
                }),
            )
        } else {
            (AuditOutcome::Failure, json!({ "reason": "invalid_code" }))
        };
        self.audit.emit(AuditEvent::mfa_event(
            AuditEventType::MfaVerified,
            user_id,
            outcome,
            Some(details),
        ));

        Ok(verification)
    }

    /// Remove the enrollment after re-authenticating with a current TOTP code.
    pub fn disable(&self, user_id: &str, otp: &str) -> Result<bool, AuthError> {
        if !self.reauthenticate(user_id, otp)? {
            return Ok(false);
        }

        self.enrollments.remove(user_id);
        tracing::info!(user_id = %user_id, "MFA disabled");
        self.audit.emit(AuditEvent::mfa_event(
            AuditEventType::MfaDisabled,
            user_id,
            AuditOutcome::Success,
            None,
        ));
        Ok(true)
    }

    /// Replace all backup codes after re-authenticating with a current TOTP
    /// code. Returns `None` when the code is wrong.
    pub fn regenerate_backup_codes(
        &self,
        user_id: &str,
        otp: &str,
    ) -> Result<Option<Vec<String>>, AuthError> {
        if !self.reauthenticate(user_id, otp)? {
            return Ok(None);
        }

        let codes = backup_codes::generate_codes(
            self.config.backup_code_count,
            self.config.backup_code_length,
        );
        let hashes = backup_codes::hash_codes(&codes)?;
        match self.enrollments.get_mut(user_id) {
            Some(mut enrollment) => {
                enrollment.backup_code_hashes = hashes;
            }
            None => return Err(AuthError::MfaNotEnrolled),
        }

        tracing::info!(user_id = %user_id, count = codes.len(), "Backup codes regenerated");
        self.audit.emit(AuditEvent::mfa_event(
            AuditEventType::MfaBackupCodesRegenerated,
            user_id,
            AuditOutcome::Success,
            Some(json!({ "count": codes.len() })),
        ));
        Ok(Some(codes))
    }

    /// Fresh TOTP proof for sensitive changes. Backup codes are not accepted.
    fn reauthenticate(&self, user_id: &str, otp: &str) -> Result<bool, AuthError> {
        self.limiter.try_acquire(user_id)?;

        let secret = match self.enrollments.get(user_id) {
            Some(enrollment) if enrollment.confirmed => enrollment.secret.clone(),
            _ => return Err(AuthError::MfaNotEnrolled),
        };

        let normalized = backup_codes::normalize_code(otp);
        let valid = self.looks_like_totp(&normalized) && self.check_totp(&secret, &normalized)?;
        self.settle(user_id, valid);
        if !valid {
            tracing::warn!(user_id = %user_id, "MFA re-authentication failed");
            self.audit.emit(AuditEvent::mfa_event(
                AuditEventType::MfaVerified,
                user_id,
                AuditOutcome::Failure,
                Some(json!({ "reason": "reauthentication_failed" })),
            ));
        }
        Ok(valid)
    }

    fn looks_like_totp(&self, code: &str) -> bool {
        code.len() == self.config.digits as usize && code.bytes().all(|b| b.is_ascii_digit())
    }

    fn check_totp(&self, secret: &str, code: &str) -> Result<bool, AuthError> {
        let key = totp::base32_decode(secret)
            .map_err(|e| AuthError::Internal(anyhow::anyhow!("Stored MFA secret is corrupt: {}", e)))?;
        let now = Utc::now().timestamp().max(0) as u64;
        Ok(totp::verify_totp(
            &key,
            code.trim(),
            now,
            self.config.time_step_seconds,
            self.config.digits,
            self.config.window,
        )?)
    }

    /// The attempt was counted when it was admitted; a success clears it.
    fn settle(&self, user_id: &str, success: bool) {
        if success {
            self.limiter.reset(user_id);
        }
    }

    /// True once the enrollment is confirmed.
    pub fn is_enrolled(&self, user_id: &str) -> bool {
        self.enrollments
            .get(user_id)
            .is_some_and(|e| e.confirmed)
    }

    pub fn backup_codes_remaining(&self, user_id: &str) -> usize {
        self.enrollments
            .get(user_id)
            .map(|e| e.backup_code_hashes.len())
            .unwrap_or(0)
    }

    pub fn status(&self, user_id: &str) -> MfaStatus {
        match self.enrollments.get(user_id) {
            Some(e) => MfaStatus {
                enrolled: true,
                confirmed: e.confirmed,
                backup_codes_remaining: e.backup_code_hashes.len(),
                last_verified_at: e.last_verified_at,
            },
            None => MfaStatus {
                enrolled: false,
                confirmed: false,
                backup_codes_remaining: 0,
                last_verified_at: None,
            },
        }
    }
}
