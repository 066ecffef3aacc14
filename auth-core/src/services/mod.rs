//! Services layer for auth-core.
//!
//! Session risk, MFA and authorization services plus the token and audit
//! collaborators they depend on.

pub mod audit;
pub mod authz;
pub mod error;
pub mod gate;
pub mod jwt;
pub mod mfa;
pub mod rate_limit;
pub mod risk;
pub mod session;

pub use audit::{AuditEmitter, AuditSink, MemoryAuditSink, TracingAuditSink};
pub use authz::{AuthorizationDecision, AuthorizationRequest, AuthorizationService};
pub use error::{AuthError, SessionErrorKind};
pub use gate::{AccessGate, AccessGrant};
pub use jwt::{JwtService, TokenClaims, TokenError, TokenPair, TokenService, TokenType};
pub use mfa::MfaService;
pub use rate_limit::AttemptLimiter;
pub use risk::{FirstOctetTravelCheck, RiskEngine, TravelCheck};
pub use session::{CreatedSession, SessionManager, ValidatedSession};
