//! Audit event model - structured security events for the external sink.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Audit event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    AuthenticationAttempt,
    SessionCreated,
    SessionRevoked,
    SessionAnomaly,
    SessionStepUp,
    MfaEnrolled,
    MfaConfirmed,
    MfaVerified,
    MfaDisabled,
    MfaBackupCodesRegenerated,
    RoleRegistered,
    RoleUnregistered,
    AuthzEvaluated,
}

impl AuditEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEventType::AuthenticationAttempt => "authentication_attempt",
            AuditEventType::SessionCreated => "session_created",
            AuditEventType::SessionRevoked => "session_revoked",
            AuditEventType::SessionAnomaly => "session_anomaly",
            AuditEventType::SessionStepUp => "session_step_up",
            AuditEventType::MfaEnrolled => "mfa_enrolled",
            AuditEventType::MfaConfirmed => "mfa_confirmed",
            AuditEventType::MfaVerified => "mfa_verified",
            AuditEventType::MfaDisabled => "mfa_disabled",
            AuditEventType::MfaBackupCodesRegenerated => "mfa_backup_codes_regenerated",
            AuditEventType::RoleRegistered => "role_registered",
            AuditEventType::RoleUnregistered => "role_unregistered",
            AuditEventType::AuthzEvaluated => "authz_evaluated",
        }
    }
}

/// Severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// Event outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    Failure,
    Blocked,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditActor {
    pub user_id: String,
    pub session_id: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl AuditActor {
    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Default::default()
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_client(mut self, ip_address: &str, user_agent: &str) -> Self {
        self.ip_address = Some(ip_address.to_string());
        self.user_agent = Some(user_agent.to_string());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditResource {
    #[serde(rename = "type")]
    pub resource_type: String,
    pub id: Option<String>,
    pub name: Option<String>,
}

impl AuditResource {
    pub fn new(resource_type: impl Into<String>, id: Option<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            id,
            name: None,
        }
    }
}

/// Audit event entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub event_type: AuditEventType,
    pub severity: Severity,
    pub actor: AuditActor,
    pub resource: AuditResource,
    pub action: String,
    pub outcome: AuditOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub risk_indicators: Vec<String>,
}

impl AuditEvent {
    pub fn new(
        event_type: AuditEventType,
        severity: Severity,
        actor: AuditActor,
        resource: AuditResource,
        action: impl Into<String>,
        outcome: AuditOutcome,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            event_type,
            severity,
            actor,
            resource,
            action: action.into(),
            outcome,
            details: None,
            risk_indicators: Vec::new(),
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn with_risk_indicators(mut self, indicators: Vec<String>) -> Self {
        self.risk_indicators = indicators;
        self
    }

    /// A primary or step-up authentication attempt.
    pub fn authentication_attempt(
        actor: AuditActor,
        method: &str,
        outcome: AuditOutcome,
        reason: Option<&str>,
    ) -> Self {
        let severity = match outcome {
            AuditOutcome::Success => Severity::Info,
            AuditOutcome::Failure => Severity::Warning,
            AuditOutcome::Blocked => Severity::Critical,
        };
        let event = Self::new(
            AuditEventType::AuthenticationAttempt,
            severity,
            actor,
            AuditResource::new("authentication", None),
            method,
            outcome,
        );
        match reason {
            Some(reason) => event.with_details(serde_json::json!({ "reason": reason })),
            None => event,
        }
    }

    /// A risk-triggered block or step-up on an existing session.
    pub fn session_anomaly(
        actor: AuditActor,
        session_id: &str,
        risk_score: f64,
        indicators: Vec<String>,
        outcome: AuditOutcome,
    ) -> Self {
        let severity = if outcome == AuditOutcome::Blocked {
            Severity::Critical
        } else {
            Severity::Warning
        };
        Self::new(
            AuditEventType::SessionAnomaly,
            severity,
            actor,
            AuditResource::new("session", Some(session_id.to_string())),
            "validate",
            outcome,
        )
        .with_details(serde_json::json!({ "risk_score": risk_score }))
        .with_risk_indicators(indicators)
    }

    /// A session lifecycle change (created, revoked, stepped up).
    pub fn session_event(
        event_type: AuditEventType,
        actor: AuditActor,
        session_id: &str,
        action: &str,
        reason: Option<&str>,
    ) -> Self {
        let event = Self::new(
            event_type,
            Severity::Info,
            actor,
            AuditResource::new("session", Some(session_id.to_string())),
            action,
            AuditOutcome::Success,
        );
        match reason {
            Some(reason) => event.with_details(serde_json::json!({ "reason": reason })),
            None => event,
        }
    }

    /// An MFA lifecycle or verification event.
    pub fn mfa_event(
        event_type: AuditEventType,
        user_id: &str,
        outcome: AuditOutcome,
        details: Option<serde_json::Value>,
    ) -> Self {
        let severity = match outcome {
            AuditOutcome::Success => Severity::Info,
            AuditOutcome::Failure => Severity::Warning,
            AuditOutcome::Blocked => Severity::Critical,
        };
        let event = Self::new(
            event_type,
            severity,
            AuditActor::user(user_id),
            AuditResource::new("mfa", Some(user_id.to_string())),
            event_type.as_str(),
            outcome,
        );
        match details {
            Some(details) => event.with_details(details),
            None => event,
        }
    }

    /// The outcome of an authorization check.
    #[allow(clippy::too_many_arguments)]
    pub fn authorization_decision(
        actor: AuditActor,
        resource: &str,
        action: &str,
        allowed: bool,
        reason: &str,
        matched_permission: Option<&str>,
        elapsed_micros: u128,
    ) -> Self {
        let (severity, outcome) = if allowed {
            (Severity::Info, AuditOutcome::Success)
        } else {
            (Severity::Warning, AuditOutcome::Failure)
        };
        Self::new(
            AuditEventType::AuthzEvaluated,
            severity,
            actor,
            AuditResource::new(resource, None),
            action,
            outcome,
        )
        .with_details(serde_json::json!({
            "reason": reason,
            "matched_permission": matched_permission,
            "elapsed_micros": elapsed_micros,
        }))
    }
}
