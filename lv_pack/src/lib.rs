//! Pack/Unpack engine: renders the repository's content into a
//! version-controllable directory tree and writes edits back (§4.6).

mod error;
mod model;
mod pack;
mod query_remap;
mod sanitize;
mod unpack;

pub use error::{Error, Result, ValidationFailure};
pub use model::{ExportMetadata, FolderMapEntry, ItemFile, ItemMetadata, UnpackStrategy, SCHEMA_VERSION};
pub use pack::{pack, PackOptions, PackSummary};
pub use query_remap::{canonical_query_hash, QueryRemappingTable};
pub use sanitize::{sanitize_segment, CollisionResolver};
pub use unpack::{unpack, UnpackOptions};
