//! Observability ecosystem dependencies for LookerVault.
//!
//! All crates in the workspace should depend on `observability_deps` rather
//! than on `tracing` directly, so that the tracing version used across the
//! workspace can be updated in one place.

pub use tracing;
pub use tracing::{debug, error, info, trace, warn};

mod init;

pub use init::{init_logging, LogFormat};
