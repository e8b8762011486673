//! Error taxonomy for the ledger client.
//!
//! Three families matter to callers: connectivity failures (retried, then
//! degraded to cached/mock data), validation failures (never sent to the
//! backend) and explicit API rejections (surfaced, never masked by mock data).
//! The remaining variants are local guard and plumbing failures.

use thiserror::Error;

use crate::validation::Violation;

pub type Result<T> = std::result::Result<T, LedgerError>;

#[derive(Debug, Error)]
pub enum LedgerError {
    /// The backend could not be reached at all (timeout, refused, cancelled).
    #[error("{0}")]
    Connectivity(String),

    /// The backend answered with a non-2xx status.
    #[error("{message} (HTTP {status})")]
    Api { status: u16, message: String },

    #[error("entry has {} validation error(s)", .0.len())]
    Validation(Vec<Violation>),

    #[error("role {role} may not {action}")]
    Forbidden { role: String, action: String },

    #[error("cannot {action} while status is {from}")]
    InvalidTransition { from: String, action: String },

    #[error("{0} is required")]
    MissingReason(&'static str),

    #[error("unknown entry field: {0}")]
    UnknownField(String),

    #[error("{0} is derived and cannot be set")]
    ReadOnlyField(String),

    #[error("entry has not been saved yet")]
    Unsaved,

    #[error("not signed in")]
    NotAuthenticated,

    #[error("local storage: {0}")]
    Storage(String),

    #[error("invalid response from backend: {0}")]
    Decode(String),
}

impl LedgerError {
    /// Connectivity failures are the only ones worth retrying or papering
    /// over with mock data.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, LedgerError::Connectivity(_))
    }
}

impl From<rusqlite::Error> for LedgerError {
    fn from(e: rusqlite::Error) -> Self {
        LedgerError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(e: serde_json::Error) -> Self {
        LedgerError::Decode(e.to_string())
    }
}
