//! Error types for model and arrangement operations
//!
//! All errors carry a bracketed error code in their display string for easy
//! categorization in logs and bug reports.
//!
//! # Error Codes
//!
//! Error codes follow the pattern: `E<category><number>`
//!
//! Categories:
//! - **E1xxx**: I/O and model loading errors
//! - **E2xxx**: Geometry preconditions
//! - **E3xxx**: Model operation errors
//! - **E4xxx**: Arrangement errors
//!
//! ## Common Error Codes
//!
//! - `E1001`: I/O error reading file
//! - `E1002`: Unrecognized input file extension
//! - `E1003`: A registered loader failed to read the file
//! - `E1004`: Load succeeded but produced zero objects
//! - `E2001`: Invalid or degenerate mesh
//! - `E2002`: Precondition violation
//! - `E3001`: Unsupported operation
//! - `E3002`: Entity index out of bounds
//! - `E4001`: No feasible arrangement

use std::io;
use thiserror::Error;

/// Result type for model and arrangement operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while mutating or arranging a model
#[derive(Error, Debug)]
pub enum Error {
    /// IO error occurred while reading an input file
    ///
    /// **Error Code**: E1001
    #[error("[E1001] I/O error: {0}")]
    Io(#[from] io::Error),

    /// The input file extension is not handled by any registered loader
    ///
    /// **Error Code**: E1002
    ///
    /// **Common Causes**:
    /// - Typo in the file name
    /// - A format for which no loader was registered
    #[error("[E1002] Unknown file format: '{0}' is not a recognized extension")]
    UnsupportedFormat(String),

    /// A loader recognized the extension but failed to read the file
    ///
    /// **Error Code**: E1003
    ///
    /// **Common Causes**:
    /// - Corrupted or truncated file
    /// - File content not matching its extension
    #[error("[E1003] Loading of the model file failed: {0}")]
    LoadFailure(String),

    /// A load succeeded structurally but produced no objects
    ///
    /// **Error Code**: E1004
    ///
    /// Treated as a load failure: no partial model is returned.
    #[error("[E1004] The supplied file could not be used because it is empty")]
    EmptyModel,

    /// A mesh operation was attempted on invalid or degenerate geometry
    ///
    /// **Error Code**: E2001
    ///
    /// **Common Causes**:
    /// - Requesting a bounding box of a zero-facet mesh
    /// - Triangulating a cross-section ring with fewer than three points
    #[error("[E2001] Invalid mesh: {0}")]
    InvalidMesh(String),

    /// A documented precondition of an operation was violated
    ///
    /// **Error Code**: E2002
    ///
    /// These fail loudly rather than returning degenerate geometry.
    #[error("[E2002] Precondition violation: {0}")]
    Precondition(String),

    /// The requested operation is not supported for this model shape
    ///
    /// **Error Code**: E3001
    ///
    /// **Common Causes**:
    /// - Grid duplication on a model with zero or several objects
    #[error("[E3001] Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// An entity index was out of bounds for its owning collection
    ///
    /// **Error Code**: E3002
    #[error("[E3002] {entity} index {index} out of bounds (len {len})")]
    IndexOutOfBounds {
        /// Kind of entity being addressed ("object", "volume", "instance")
        entity: &'static str,
        /// The offending index
        index: usize,
        /// Length of the collection at the time of the call
        len: usize,
    },

    /// No valid layout exists for the requested arrangement
    ///
    /// **Error Code**: E4001
    ///
    /// Returned by duplication when the resulting copies would not fit on the
    /// print bed. Recoverable: the model is left unmodified.
    #[error("[E4001] No feasible arrangement: {0}")]
    ArrangementInfeasible(String),
}

impl Error {
    /// Create an IndexOutOfBounds error for a named entity collection
    pub(crate) fn out_of_bounds(entity: &'static str, index: usize, len: usize) -> Self {
        Error::IndexOutOfBounds { entity, index, len }
    }
}
