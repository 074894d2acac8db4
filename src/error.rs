//! Error types for construction-time validation.
//!
//! Rejectable game inputs (an illegal move or rotation) are not errors: they
//! come back as `false` from the live game's methods. The variants here only
//! cover misconfiguration and misuse that must be caught before any thread
//! is spawned.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// Bad dimensions, zero depth, zero width, out-of-range speed.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The snapshotted piece queue is shorter than the search depth.
    #[error("piece queue holds {available} pieces but search depth is {depth}")]
    QueueTooShort { available: usize, depth: usize },

    /// `start()` was called on a timer or calculator that already ran.
    #[error("{0} was already started")]
    AlreadyStarted(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;
