//! Session manager: creation, validation with risk scoring, revocation and
//! background expiry.
//!
//! Sessions live in a primary table keyed by session id plus a per-user index.
//! Per-session mutation goes through the primary table's entry lock, so a
//! validation and the expiry sweep never interleave on the same session. No
//! table guard is held across an `.await`, and no path holds a session guard
//! while acquiring the user index.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;

use super::audit::AuditEmitter;
use super::error::{AuthError, SessionErrorKind};
use super::jwt::{TokenPair, TokenService, TokenType};
use super::risk::RiskEngine;
use crate::config::SessionConfig;
use crate::models::{
    AuditActor, AuditEvent, AuditEventType, AuditOutcome, DeviceFingerprint, RiskAction,
    RiskAssessment, SessionContext, UserIdentity,
};

/// A freshly created session with the tokens issued for it.
#[derive(Debug, Clone)]
pub struct CreatedSession {
    pub session: SessionContext,
    pub tokens: TokenPair,
}

/// Result of a successful validation.
#[derive(Debug, Clone)]
pub struct ValidatedSession {
    pub identity: UserIdentity,
    pub session: SessionContext,
    pub assessment: RiskAssessment,
}

enum Validation {
    Allowed(SessionContext, RiskAssessment),
    StepUp(RiskAssessment),
    Blocked(RiskAssessment),
    Expired,
    Idle,
}

pub struct SessionManager {
    config: SessionConfig,
    sessions: DashMap<String, SessionContext>,
    user_sessions: DashMap<String, Vec<String>>,
    tokens: Arc<dyn TokenService>,
    risk: RiskEngine,
    audit: AuditEmitter,
}

impl SessionManager {
    pub fn new(config: SessionConfig, tokens: Arc<dyn TokenService>, audit: AuditEmitter) -> Self {
        let risk = RiskEngine::new(config.risk.clone(), config.risk_score_threshold);
        Self::with_risk_engine(config, tokens, audit, risk)
    }

    pub fn with_risk_engine(
        config: SessionConfig,
        tokens: Arc<dyn TokenService>,
        audit: AuditEmitter,
        risk: RiskEngine,
    ) -> Self {
        Self {
            config,
            sessions: DashMap::new(),
            user_sessions: DashMap::new(),
            tokens,
            risk,
            audit,
        }
    }

    /// Create a session after primary authentication. At the per-user cap the
    /// oldest session by creation time is evicted first.
    pub async fn create_session(
        &self,
        user_id: &str,
        roles: Vec<String>,
        mfa_verified: bool,
        fingerprint: DeviceFingerprint,
    ) -> Result<CreatedSession, AuthError> {
        let actor = AuditActor::user(user_id)
            .with_client(&fingerprint.ip_address, &fingerprint.user_agent);

        if self.config.require_mfa && !mfa_verified {
            tracing::info!(user_id = %user_id, "Session refused: MFA required");
            self.audit.emit(AuditEvent::authentication_attempt(
                actor,
                "session_create",
                AuditOutcome::Failure,
                Some("mfa_required"),
            ));
            return Err(AuthError::MfaRequired);
        }

        let tokens = self
            .tokens
            .generate_token_pair(user_id, &roles, mfa_verified, &fingerprint)
            .await?;

        let session = SessionContext::new(
            user_id,
            roles,
            mfa_verified,
            fingerprint,
            Duration::seconds(self.config.session_ttl_seconds),
        );
        let session_id = session.session_id.clone();
        self.sessions.insert(session_id.clone(), session.clone());

        let evicted = {
            let mut ids = self.user_sessions.entry(user_id.to_string()).or_default();
            let mut evicted = Vec::new();
            while ids.len() >= self.config.max_sessions_per_user {
                match self.oldest_session(&ids) {
                    Some(index) => evicted.push(ids.remove(index)),
                    None => break,
                }
            }
            ids.push(session_id.clone());
            evicted
        };

        for id in evicted {
            tracing::info!(user_id = %user_id, session_id = %id, "Evicting oldest session at cap");
            self.remove_session(&id, "session_limit");
        }

        tracing::info!(user_id = %user_id, session_id = %session_id, "Session created");
        self.audit.emit(AuditEvent::session_event(
            AuditEventType::SessionCreated,
            actor.with_session(&session_id),
            &session_id,
            "create",
            None,
        ));

        Ok(CreatedSession { session, tokens })
    }

    /// Position in `ids` of the session with the smallest `created_at`.
    /// Ids whose session is already gone count as oldest.
    fn oldest_session(&self, ids: &[String]) -> Option<usize> {
        ids.iter()
            .enumerate()
            .min_by_key(|(index, id)| {
                let created = self.sessions.get(id.as_str()).map(|s| s.created_at);
                (created, *index)
            })
            .map(|(index, _)| index)
    }

    /// Verify an access token and score the request against its session.
    pub async fn validate_request(
        &self,
        access_token: &str,
        fingerprint: &DeviceFingerprint,
    ) -> Result<ValidatedSession, AuthError> {
        let claims = match self.tokens.verify(access_token, fingerprint).await {
            Ok(claims) => claims,
            Err(e) => {
                let err = AuthError::from(e);
                tracing::debug!(error = %err, "Token verification failed");
                self.audit.emit(AuditEvent::authentication_attempt(
                    AuditActor::user("unknown")
                        .with_client(&fingerprint.ip_address, &fingerprint.user_agent),
                    "access_token",
                    AuditOutcome::Failure,
                    Some(err.code()),
                ));
                return Err(err);
            }
        };

        let actor = AuditActor::user(&claims.sub)
            .with_client(&fingerprint.ip_address, &fingerprint.user_agent);

        if claims.token_type != TokenType::Access {
            self.audit.emit(AuditEvent::authentication_attempt(
                actor,
                "access_token",
                AuditOutcome::Failure,
                Some("wrong_token_type"),
            ));
            return Err(AuthError::InvalidToken(
                "refresh token presented as access token".to_string(),
            ));
        }

        let Some(session_id) = self.locate_session(&claims.sub, &fingerprint.device_id) else {
            self.audit.emit(AuditEvent::authentication_attempt(
                actor,
                "access_token",
                AuditOutcome::Failure,
                Some("no_session"),
            ));
            return Err(AuthError::Session(SessionErrorKind::Invalid));
        };
        let actor = actor.with_session(&session_id);

        let now = Utc::now();
        let inactivity = Duration::seconds(self.config.inactivity_timeout_seconds);

        // Decide under the entry lock and drop the session in the same step
        // when the outcome ends it, so no other validation sees it in between.
        let mut validation = None;
        let removed = self.sessions.remove_if_mut(&session_id, |_, session| {
            let outcome = if session.is_expired_at(now) {
                Validation::Expired
            } else if session.is_idle_at(now, inactivity) {
                Validation::Idle
            } else {
                let assessment = self.risk.assess(session, fingerprint, now);
                session.last_validated_at = Some(now);
                match assessment.action {
                    RiskAction::Allow => {
                        session.last_activity_at = now;
                        session.risk_score = assessment.score;
                        session.risk_indicators = assessment.indicators.clone();
                        Validation::Allowed(session.clone(), assessment)
                    }
                    RiskAction::StepUp => Validation::StepUp(assessment),
                    RiskAction::Block => Validation::Blocked(assessment),
                }
            };
            let ends_session = matches!(
                outcome,
                Validation::Blocked(_) | Validation::Expired | Validation::Idle
            );
            validation = Some(outcome);
            ends_session
        });
        let Some(validation) = validation else {
            return Err(AuthError::Session(SessionErrorKind::Invalid));
        };

        match validation {
            Validation::Allowed(session, assessment) => Ok(ValidatedSession {
                identity: session.identity(),
                session,
                assessment,
            }),
            Validation::StepUp(assessment) => {
                tracing::warn!(
                    user_id = %claims.sub,
                    session_id = %session_id,
                    risk_score = assessment.score,
                    indicators = ?assessment.indicators,
                    "Step-up authentication required"
                );
                self.audit.emit(AuditEvent::session_anomaly(
                    actor,
                    &session_id,
                    assessment.score,
                    assessment.indicators,
                    AuditOutcome::Failure,
                ));
                Err(AuthError::MfaRequired)
            }
            Validation::Blocked(assessment) => {
                tracing::warn!(
                    user_id = %claims.sub,
                    session_id = %session_id,
                    risk_score = assessment.score,
                    indicators = ?assessment.indicators,
                    "Session blocked on risk"
                );
                self.finish_removal(removed, "anomaly_detected");
                self.audit.emit(AuditEvent::session_anomaly(
                    actor,
                    &session_id,
                    assessment.score,
                    assessment.indicators,
                    AuditOutcome::Blocked,
                ));
                Err(AuthError::Session(SessionErrorKind::AnomalyDetected))
            }
            Validation::Expired => {
                self.finish_removal(removed, "expired");
                Err(AuthError::Session(SessionErrorKind::Expired))
            }
            Validation::Idle => {
                self.finish_removal(removed, "inactivity_timeout");
                Err(AuthError::Session(SessionErrorKind::InactivityTimeout))
            }
        }
    }

    /// Prefer the most recently active session on the same device, else the
    /// most recently active session of the user.
    fn locate_session(&self, user_id: &str, device_id: &str) -> Option<String> {
        let ids = self.user_sessions.get(user_id)?.value().clone();

        let mut same_device: Option<(DateTime<Utc>, String)> = None;
        let mut any: Option<(DateTime<Utc>, String)> = None;
        for id in ids {
            let Some(session) = self.sessions.get(&id) else {
                continue;
            };
            let active = session.last_activity_at;
            if session.fingerprint.device_id == device_id
                && same_device.as_ref().map_or(true, |(best, _)| active > *best)
            {
                same_device = Some((active, id.clone()));
            }
            if any.as_ref().map_or(true, |(best, _)| active > *best) {
                any = Some((active, id));
            }
        }

        same_device.or(any).map(|(_, id)| id)
    }

    /// Mark a session MFA-verified after a successful step-up, clearing its
    /// accumulated risk and re-snapshotting the fingerprint.
    pub fn complete_step_up(
        &self,
        session_id: &str,
        fingerprint: &DeviceFingerprint,
    ) -> Result<SessionContext, AuthError> {
        let now = Utc::now();
        let updated = {
            let Some(mut session) = self.sessions.get_mut(session_id) else {
                return Err(AuthError::Session(SessionErrorKind::Invalid));
            };
            if session.is_expired_at(now) {
                None
            } else {
                session.mfa_verified = true;
                session.risk_score = 0.0;
                session.risk_indicators.clear();
                session.fingerprint = fingerprint.clone();
                session.last_activity_at = now;
                Some(session.value().clone())
            }
        };

        let Some(session) = updated else {
            self.remove_session(session_id, "expired");
            return Err(AuthError::Session(SessionErrorKind::Expired));
        };

        tracing::info!(user_id = %session.user_id, session_id = %session_id, "Step-up completed");
        self.audit.emit(AuditEvent::session_event(
            AuditEventType::SessionStepUp,
            AuditActor::user(&session.user_id)
                .with_session(session_id)
                .with_client(&fingerprint.ip_address, &fingerprint.user_agent),
            session_id,
            "step_up",
            None,
        ));
        Ok(session)
    }

    /// Revoke one session. Returns false if it did not exist.
    pub fn revoke_session(&self, session_id: &str, reason: &str) -> bool {
        self.remove_session(session_id, reason).is_some()
    }

    /// Revoke every session of a user, returning how many were removed.
    pub fn revoke_all_user_sessions(&self, user_id: &str, reason: &str) -> usize {
        let ids = self
            .user_sessions
            .remove(user_id)
            .map(|(_, ids)| ids)
            .unwrap_or_default();
        ids.iter()
            .filter(|id| self.remove_session(id, reason).is_some())
            .count()
    }

    fn remove_session(&self, session_id: &str, reason: &str) -> Option<SessionContext> {
        let (_, session) = self.sessions.remove(session_id)?;
        self.unindex(&session);
        self.audit_revoked(&session, reason);
        Some(session)
    }

    /// Unindex and audit a session already taken out of the primary table.
    fn finish_removal(&self, removed: Option<(String, SessionContext)>, reason: &str) {
        if let Some((_, session)) = removed {
            self.unindex(&session);
            self.audit_revoked(&session, reason);
        }
    }

    fn unindex(&self, session: &SessionContext) {
        if let Some(mut ids) = self.user_sessions.get_mut(&session.user_id) {
            ids.retain(|id| id != &session.session_id);
        }
        self.user_sessions
            .remove_if(&session.user_id, |_, ids| ids.is_empty());
    }

    fn audit_revoked(&self, session: &SessionContext, reason: &str) {
        tracing::info!(
            user_id = %session.user_id,
            session_id = %session.session_id,
            reason = %reason,
            "Session revoked"
        );
        self.audit.emit(AuditEvent::session_event(
            AuditEventType::SessionRevoked,
            AuditActor::user(&session.user_id).with_session(&session.session_id),
            &session.session_id,
            "revoke",
            Some(reason),
        ));
    }

    /// Revoke every session past its absolute expiry.
    pub fn sweep_expired(&self) -> usize {
        let now = Utc::now();
        let expired: Vec<String> = self
            .sessions
            .iter()
            .filter(|entry| entry.is_expired_at(now))
            .map(|entry| entry.key().clone())
            .collect();

        let mut revoked = 0;
        for id in expired {
            // Re-checked under the entry lock; a concurrent validation may have
            // already removed it.
            if let Some((_, session)) = self.sessions.remove_if(&id, |_, s| s.is_expired_at(now)) {
                self.unindex(&session);
                self.audit_revoked(&session, "expired");
                revoked += 1;
            }
        }

        if revoked > 0 {
            tracing::info!(count = revoked, "Expired sessions swept");
        }
        revoked
    }

    /// Run [`Self::sweep_expired`] every `interval` until the handle is aborted.
    pub fn spawn_expiry_sweep(self: &Arc<Self>, interval: std::time::Duration) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                manager.sweep_expired();
            }
        })
    }

    pub fn get_session(&self, session_id: &str) -> Option<SessionContext> {
        self.sessions.get(session_id).map(|s| s.value().clone())
    }

    /// Live sessions of a user, oldest first.
    pub fn get_user_sessions(&self, user_id: &str) -> Vec<SessionContext> {
        let ids = self
            .user_sessions
            .get(user_id)
            .map(|ids| ids.value().clone())
            .unwrap_or_default();
        let mut sessions: Vec<SessionContext> = ids
            .iter()
            .filter_map(|id| self.sessions.get(id).map(|s| s.value().clone()))
            .collect();
        sessions.sort_by_key(|s| s.created_at);
        sessions
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }
}
