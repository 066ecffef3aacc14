//! Session model - per-login state with a fingerprint snapshot and risk score.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use super::{DeviceFingerprint, UserIdentity};

/// Session entity.
///
/// The fingerprint is a snapshot taken at creation; drift from it feeds the
/// risk score and is never an error by itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionContext {
    pub session_id: String,
    pub user_id: String,
    pub roles: Vec<String>,
    pub fingerprint: DeviceFingerprint,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Accumulated risk in `[0, 1]`.
    pub risk_score: f64,
    #[serde(default)]
    pub risk_indicators: Vec<String>,
    pub mfa_verified: bool,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    /// Time of the last validation attempt, used for the rapid-request signal.
    #[serde(skip)]
    pub last_validated_at: Option<DateTime<Utc>>,
}

impl SessionContext {
    /// Create a new session. `ttl` must be positive.
    pub fn new(
        user_id: impl Into<String>,
        roles: Vec<String>,
        mfa_verified: bool,
        fingerprint: DeviceFingerprint,
        ttl: Duration,
    ) -> Self {
        let now = Utc::now();
        Self {
            session_id: Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            roles,
            fingerprint,
            created_at: now,
            last_activity_at: now,
            expires_at: now + ttl,
            risk_score: 0.0,
            risk_indicators: Vec::new(),
            mfa_verified,
            metadata: HashMap::new(),
            last_validated_at: None,
        }
    }

    /// Check if the session has passed its absolute expiry.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Check if the session has been idle longer than `timeout`.
    pub fn is_idle_at(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        now - self.last_activity_at > timeout
    }

    pub fn identity(&self) -> UserIdentity {
        UserIdentity::new(self.user_id.clone(), self.roles.clone(), self.mfa_verified)
    }
}

/// Decision derived from a risk score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskAction {
    Allow,
    StepUp,
    Block,
}

impl RiskAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskAction::Allow => "allow",
            RiskAction::StepUp => "step_up",
            RiskAction::Block => "block",
        }
    }
}

/// Ephemeral result of scoring one validation. Only the score and indicators
/// are folded back into the session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskAssessment {
    pub score: f64,
    pub indicators: Vec<String>,
    pub action: RiskAction,
}
