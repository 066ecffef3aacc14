pub mod audit_event;
pub mod identity;
pub mod mfa_enrollment;
pub mod role;
pub mod session;

pub use audit_event::{
    AuditActor, AuditEvent, AuditEventType, AuditOutcome, AuditResource, Severity,
};
pub use identity::{DeviceFingerprint, UserIdentity};
pub use mfa_enrollment::{
    EnrollmentSecrets, MfaEnrollment, MfaMethod, MfaStatus, MfaVerification,
};
pub use role::{builtin_roles, Action, Permission, RoleConstraints, RoleDefinition};
pub use session::{RiskAction, RiskAssessment, SessionContext};
