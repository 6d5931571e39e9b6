//! Top-level command errors and the exit-code taxonomy (spec.md §6).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("extract: {0}")]
    Extract(#[from] crate::commands::extract::Error),

    #[error("restore: {0}")]
    Restore(#[from] crate::commands::restore::Error),

    #[error("unpack: {0}")]
    Unpack(#[from] crate::commands::unpack::Error),

    #[error("pack: {0}")]
    Pack(#[from] crate::commands::pack::Error),
}

impl Error {
    /// Exit codes per spec.md §6: 0 success, 1 general error, 2 validation
    /// error, 3 connection error, 4 circular folder reference (unpack),
    /// 5 transaction failed (pack), 130 interrupted.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Extract(crate::commands::extract::Error::Client(e))
            | Error::Restore(crate::commands::restore::Error::Client(e))
                if is_connection_error(e) =>
            {
                3
            }
            Error::Extract(crate::commands::extract::Error::Extract(lv_extract::Error::Cancelled))
            | Error::Restore(crate::commands::restore::Error::Restore(lv_restore::Error::Cancelled)) => 130,
            Error::Restore(crate::commands::restore::Error::Restore(lv_restore::Error::Client(e)))
                if is_connection_error(e) =>
            {
                3
            }
            Error::Pack(crate::commands::pack::Error::Pack(lv_pack::Error::ValidationFailed(_))) => 2,
            Error::Pack(crate::commands::pack::Error::Pack(lv_pack::Error::TransactionFailed(_))) => 5,
            Error::Unpack(crate::commands::unpack::Error::Unpack(
                lv_pack::Error::CircularFolderReference(_),
            )) => 4,
            _ => 1,
        }
    }
}

fn is_connection_error(e: &lv_client::LookerClientError) -> bool {
    matches!(
        e.kind(),
        lv_client::LookerClientErrorKind::Network | lv_client::LookerClientErrorKind::Timeout
    )
}
