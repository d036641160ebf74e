//! Crate-wide error taxonomy.
//!
//! Every fallible operation in the crate yields one of these kinds.
//! Propagation policy:
//!
//! - **Archive-fatal** (abort the session): [`Error::InvalidFormat`],
//!   [`Error::UnsupportedVersion`], [`Error::UnexpectedEof`] during
//!   structural reads.
//! - **Entry-fatal** (the session stays usable for other entries):
//!   [`Error::DecryptionFailed`], [`Error::IntegrityFailure`],
//!   [`Error::UncorrectableErrors`], [`Error::CompressionFailed`].
//! - **Local**: [`Error::EntryNotFound`] from the requiring lookup; the
//!   non-requiring variant returns `Ok(None)` without building an error.
//! - **Writer poisoning**: the first I/O failure poisons the writer;
//!   everything except `close` then fails with [`Error::Poisoned`].
//!
//! Wrong-password and tampered-ciphertext failures intentionally render the
//! same message so callers cannot distinguish them.

use std::io;
use thiserror::Error;

use crate::ecc::EccError;

/// Message shared by every failure an attacker could use as a
/// password/tamper oracle.  [`Error::DecryptionFailed`] always renders it;
/// checksum mismatches inside encrypted chunks render it too.
pub(crate) const OPAQUE_CRYPTO_FAILURE: &str =
    "decryption failed — wrong password or corrupted data";

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// The bytes do not form a valid APACK structure.
    #[error("invalid archive format: {0}")]
    InvalidFormat(String),

    /// The archive declares a compatibility level newer than this build.
    #[error("unsupported archive: requires compat level {required}, this build supports up to {supported}")]
    UnsupportedVersion { required: u8, supported: u8 },

    /// The stream ended inside a structure that promised more bytes.
    #[error("unexpected end of stream")]
    UnexpectedEof,

    /// A checksum did not match its payload.
    #[error("{0}")]
    IntegrityFailure(String),

    /// AEAD tag or key-unwrap failure.  Also returned for a wrong password;
    /// the message never reveals which.
    #[error("{OPAQUE_CRYPTO_FAILURE}")]
    DecryptionFailed,

    /// A compression provider failed to compress or decompress.
    #[error("compression failed: {0}")]
    CompressionFailed(String),

    /// More corrupted bytes than the Reed–Solomon configuration can repair.
    #[error("too many errors to correct")]
    UncorrectableErrors,

    /// The requiring lookup found no entry with the given name or id.
    #[error("entry not found: {0}")]
    EntryNotFound(String),

    /// A value exceeds a hard format limit (string length, chunk size, …).
    #[error("value exceeds format limit: {0}")]
    ValueTooLarge(String),

    /// The writer suffered an I/O failure earlier in the session.
    #[error("writer is poisoned by an earlier I/O failure")]
    Poisoned,

    /// The archive session was closed; no further operations are possible.
    #[error("archive is already closed")]
    AlreadyClosed,

    /// No registered provider matches the requested algorithm id.
    #[error("unknown {kind} algorithm: {id}")]
    UnknownAlgorithm { kind: &'static str, id: String },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl From<EccError> for Error {
    fn from(e: EccError) -> Self {
        match e {
            EccError::UncorrectableErrors | EccError::DivisionByZero => {
                Error::UncorrectableErrors
            }
            other => Error::InvalidFormat(other.to_string()),
        }
    }
}

impl Error {
    /// Translate `io::ErrorKind::UnexpectedEof` into the structural
    /// [`Error::UnexpectedEof`] kind; pass everything else through.
    pub(crate) fn from_read(e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            Error::UnexpectedEof
        } else {
            Error::Io(e)
        }
    }
}
