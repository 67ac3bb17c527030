//! Error types for superblock operations.
//!
//! One error enum covers the whole crate; variants are kinds rather than
//! carriers of rich context, since callers branch on the kind alone.

use thiserror::Error;

/// Errors surfaced by superblock and device operations.
#[derive(Debug, Error)]
pub enum SuperblockError {
    /// A caller-supplied argument was invalid (bad slot, bad length).
    #[error("invalid argument: {0}")]
    InvalidArgs(&'static str),

    /// The operation requires a state the volume is not in, or the wrong
    /// construction mode (library vs driver).
    #[error("bad state: {0}")]
    BadState(&'static str),

    /// Unknown version, pathological block geometry, or a capability the
    /// backing device does not offer.
    #[error("not supported: {0}")]
    NotSupported(&'static str),

    /// The backing device is too small to hold the required replicas.
    #[error("device too small for reserved superblock copies")]
    NoSpace,

    /// Cryptographic open failed at every replica for the given key and
    /// slot. Wrong key, tampered header, and corrupt slot all surface as
    /// this one kind.
    #[error("access denied")]
    AccessDenied,

    /// Short read/write or an underlying transport failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An internal invariant was violated.
    #[error("internal error: {0}")]
    Internal(&'static str),
}

/// Type alias for Results using SuperblockError.
pub type Result<T> = std::result::Result<T, SuperblockError>;
