//! Crate-wide error taxonomy.
//!
//! Every fallible operation in this crate resolves to one of these kinds:
//!
//! - [`MffError::InvalidFormat`] — a decoded block or document violates a
//!   structural invariant (wrong sample depth, wrong namespace, mismatched
//!   channel count, inconsistent sampling rate, empty stream).  Checked
//!   eagerly at parse/decode time; the operation aborts.
//! - [`MffError::NotFound`] — a requested basename is absent from the
//!   container.
//! - [`MffError::InvalidArgument`] — a caller-supplied parameter violates a
//!   stated precondition.  Surfaces synchronously and mutates no state.
//! - [`MffError::IncompatibleStream`] — the writer refuses a
//!   `(filename, data type)` combination.
//! - [`MffError::MissingHeader`] — a reuse-flagged data block appears before
//!   any header block has been read.
//! - [`MffError::BadCalibration`] — a calibration is absent or begins after
//!   recording start.
//! - [`MffError::Io`] — an underlying read or write failed.

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MffError {
    #[error("invalid format: {0}")]
    InvalidFormat(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("incompatible stream: {0}")]
    IncompatibleStream(String),

    /// A block with the reuse flag was seen before any header block.
    #[error("data block without a preceding header block")]
    MissingHeader,

    #[error("bad calibration: {0}")]
    BadCalibration(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl MffError {
    pub(crate) fn format(msg: impl Into<String>) -> Self {
        MffError::InvalidFormat(msg.into())
    }

    pub(crate) fn argument(msg: impl Into<String>) -> Self {
        MffError::InvalidArgument(msg.into())
    }

    pub(crate) fn not_found(msg: impl Into<String>) -> Self {
        MffError::NotFound(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, MffError>;
