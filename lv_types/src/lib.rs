//! Core data model for LookerVault: content items, sessions, checkpoints,
//! dead-letter entries and cross-instance ID mappings.
//!
//! This crate holds plain data and the error-kind taxonomy; it performs no
//! IO and has no opinion about how its types are persisted.

pub mod config;
pub mod content;
pub mod dlq;
pub mod error;
pub mod mapping;
pub mod session;

pub use config::EngineConfig;
pub use content::{ContentFilter, ContentItem, ContentType};
pub use dlq::DeadLetterItem;
pub use error::ErrorKind;
pub use mapping::IDMapping;
pub use session::{Checkpoint, CheckpointData, Session, SessionStatus};
