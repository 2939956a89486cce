use thiserror::Error;

use crate::api::ApiError;

/// Crate-level error surface. User-facing failures are transient
/// notifications; none of them roll back already-cascaded entries.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// The edit referenced a site or identity the registry does not know.
    /// Rejected before any local or remote mutation.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Persistence failed partway through a cascade. Entries after
    /// `index` are stale; a full reload is required, there is no
    /// automatic resume.
    #[error("cascade aborted at entry index {index}; downstream entries are stale")]
    CascadeAbort {
        index: usize,
        #[source]
        source: Box<LedgerError>,
    },

    #[error("entry not found: {0}")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("remote store error: {0}")]
    Remote(#[from] ApiError),
}

impl From<rusqlite::Error> for LedgerError {
    fn from(err: rusqlite::Error) -> Self {
        LedgerError::Database(err.to_string())
    }
}
