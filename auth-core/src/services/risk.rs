//! Drift-based risk scoring for session validation.

use chrono::{DateTime, Duration, Utc};
use std::net::Ipv4Addr;
use std::sync::Arc;

use crate::config::RiskPolicy;
use crate::models::{DeviceFingerprint, RiskAction, RiskAssessment, SessionContext};

pub const DEVICE_MISMATCH: &str = "device_mismatch";
pub const IP_CHANGE: &str = "ip_change";
pub const IMPOSSIBLE_TRAVEL: &str = "impossible_travel";
pub const USER_AGENT_CHANGE: &str = "user_agent_change";
pub const RAPID_REQUESTS: &str = "rapid_requests";

/// Decides whether moving between two addresses is implausible.
///
/// Only consulted when the address changed. A geo or ASN lookup can replace
/// the default heuristic without touching the scoring contract.
pub trait TravelCheck: Send + Sync {
    fn is_impossible(&self, previous_ip: &str, current_ip: &str) -> bool;
}

/// Flags travel when the first octet of two IPv4 addresses differs.
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstOctetTravelCheck;

impl TravelCheck for FirstOctetTravelCheck {
    fn is_impossible(&self, previous_ip: &str, current_ip: &str) -> bool {
        match (
            previous_ip.parse::<Ipv4Addr>(),
            current_ip.parse::<Ipv4Addr>(),
        ) {
            (Ok(prev), Ok(curr)) => prev.octets()[0] != curr.octets()[0],
            _ => false,
        }
    }
}

#[derive(Clone)]
pub struct RiskEngine {
    policy: RiskPolicy,
    threshold: f64,
    travel: Arc<dyn TravelCheck>,
}

impl RiskEngine {
    pub fn new(policy: RiskPolicy, threshold: f64) -> Self {
        Self::with_travel_check(policy, threshold, Arc::new(FirstOctetTravelCheck))
    }

    pub fn with_travel_check(
        policy: RiskPolicy,
        threshold: f64,
        travel: Arc<dyn TravelCheck>,
    ) -> Self {
        Self {
            policy,
            threshold,
            travel,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Score `current` against the session's fingerprint snapshot. The result
    /// builds on the session's prior score and is clamped to `[0, 1]`.
    pub fn assess(
        &self,
        session: &SessionContext,
        current: &DeviceFingerprint,
        now: DateTime<Utc>,
    ) -> RiskAssessment {
        let snapshot = &session.fingerprint;
        let mut delta = 0.0;
        let mut indicators = Vec::new();

        if snapshot.device_id != current.device_id {
            delta += self.policy.device_mismatch;
            indicators.push(DEVICE_MISMATCH.to_string());
        }

        if snapshot.ip_address != current.ip_address {
            delta += self.policy.ip_mismatch;
            indicators.push(IP_CHANGE.to_string());

            if self
                .travel
                .is_impossible(&snapshot.ip_address, &current.ip_address)
            {
                delta += self.policy.impossible_travel;
                indicators.push(IMPOSSIBLE_TRAVEL.to_string());
            }
        }

        if snapshot.user_agent != current.user_agent {
            delta += self.policy.user_agent_mismatch;
            indicators.push(USER_AGENT_CHANGE.to_string());
        }

        let rapid_window = Duration::milliseconds(self.policy.rapid_request_window_ms);
        if let Some(last) = session.last_validated_at {
            if now - last < rapid_window {
                delta += self.policy.rapid_requests;
                indicators.push(RAPID_REQUESTS.to_string());
            }
        }

        let score = (session.risk_score + delta).clamp(0.0, 1.0);
        RiskAssessment {
            score,
            indicators,
            action: self.action_for(score),
        }
    }

    pub fn action_for(&self, score: f64) -> RiskAction {
        if score >= self.threshold {
            RiskAction::Block
        } else if score >= self.threshold * self.policy.step_up_ratio {
            RiskAction::StepUp
        } else {
            RiskAction::Allow
        }
    }
}
