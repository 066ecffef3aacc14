//! Identity and device fingerprint models.

use serde::{Deserialize, Serialize};

/// Identity produced by a successful primary authentication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub user_id: String,
    pub roles: Vec<String>,
    pub mfa_verified: bool,
}

impl UserIdentity {
    pub fn new(user_id: impl Into<String>, roles: Vec<String>, mfa_verified: bool) -> Self {
        Self {
            user_id: user_id.into(),
            roles,
            mfa_verified,
        }
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

/// Device and network attributes supplied by the caller on every session
/// operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceFingerprint {
    pub device_id: String,
    pub ip_address: String,
    pub user_agent: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screen_resolution: Option<String>,
}

impl DeviceFingerprint {
    pub fn new(
        device_id: impl Into<String>,
        ip_address: impl Into<String>,
        user_agent: impl Into<String>,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            ip_address: ip_address.into(),
            user_agent: user_agent.into(),
            locale: None,
            timezone: None,
            screen_resolution: None,
        }
    }
}
