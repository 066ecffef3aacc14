//! service-core: shared infrastructure for the auth-core workspace.
pub mod config;
pub mod error;
pub mod observability;

pub use http;
pub use serde;
pub use serde_json;
pub use tokio;
pub use tracing;
