//! medsearch-common: Shared errors and the sandboxed HTTP client used across all medsearch crates.

pub mod error;
pub mod sandbox;

pub use error::{MedsearchError, Result};
pub use sandbox::SandboxClient;
