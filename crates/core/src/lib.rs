pub mod config;
pub mod error;
pub mod types;

pub use config::EngineConfig;
pub use error::{DiagnosticError, DiagnosticResult};
pub use types::{AcquisitionChannel, Counter, DiagnosticContext, FunnelSnapshot};
