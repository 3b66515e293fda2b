//! Hardware status taxonomy.
//!
//! Every [`crate::SwitchHal`] call returns `Result<_, HalError>`. Callers are
//! required to branch on the two benign variants (`AlreadyExists` on create,
//! `NotFound` on remove) and treat everything else as a real failure.

use thiserror::Error;

/// Error type for hardware programming operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HalError {
    /// The object already exists. Benign on create paths.
    #[error("object already exists: {0}")]
    AlreadyExists(String),

    /// The object was not found. Benign on remove paths.
    #[error("object not found: {0}")]
    NotFound(String),

    /// A hardware table is full.
    #[error("hardware table full: {0}")]
    TableFull(String),

    /// The object is still referenced by another hardware object.
    #[error("object in use: {0}")]
    ObjectInUse(String),

    /// Hardware resources exhausted.
    #[error("insufficient resources: {0}")]
    InsufficientResources(String),

    /// The request was malformed.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Any other non-success status from the hardware layer.
    #[error("hardware failure: {0}")]
    Failure(String),
}

impl HalError {
    /// Returns true for the benign "create raced with an existing object"
    /// status.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, HalError::AlreadyExists(_))
    }

    /// Returns true for the benign "remove of an already-gone object" status.
    pub fn is_not_found(&self) -> bool {
        matches!(self, HalError::NotFound(_))
    }
}

/// Result type for hardware programming operations.
pub type HalResult<T> = Result<T, HalError>;
