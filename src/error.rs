//! Error types for image assembly.
//!
//! Every operation returns the first error it encounters to its caller
//! unchanged, with the failing path attached. There is no retry, no
//! aggregation, and no rollback: after a failed build the destination
//! path must be treated as untrustworthy.

use std::io;
use std::path::Path;
use thiserror::Error;

/// Errors produced while opening, walking, or assembling disk images.
#[derive(Error, Debug)]
pub enum ImageError {
    /// A source file, image path, or filesystem entry does not exist.
    #[error("not found: {path}")]
    NotFound { path: String },

    /// A create precondition was violated and `--force` was not given.
    #[error("already exists: {path}")]
    AlreadyExists { path: String },

    /// A file was found where the traversal expected a directory.
    #[error("not a directory: {path}")]
    NotADirectory { path: String },

    /// A directory was found where a file operation expected a file.
    #[error("is a directory: {path}")]
    IsADirectory { path: String },

    /// The image is not in a format the requested operation supports,
    /// e.g. a finalize was required but the destination is not ISO9660.
    #[error("unsupported image format: {path}")]
    UnsupportedFormat { path: String },

    /// A copy moved a different number of bytes than the source declared.
    #[error("short copy of {path}: expected {expected} bytes, copied {actual}")]
    SizeMismatch {
        path: String,
        expected: u64,
        actual: u64,
    },

    /// The recursive walk exceeded the depth guard, which usually means
    /// the image contains a self-referential directory chain.
    #[error("directory tree too deep at {path} (limit {limit})")]
    TooDeep { path: String, limit: usize },

    /// No embedded EFI system-partition image was found in the source ISO.
    #[error("no .img file in source ISO: cannot locate the EFI system partition")]
    NoEfiImage,

    /// More than one candidate EFI system-partition image was found.
    #[error("ambiguous EFI system partition: both {first} and {second} end in .img")]
    EfiImageAmbiguous { first: String, second: String },

    /// The staged filesystem tree outgrew the image's backing store.
    #[error("image full: need {needed} sectors, capacity is {capacity}")]
    OutOfSpace { needed: u64, capacity: u64 },

    /// An underlying read/write/stat/truncate failure.
    #[error("{path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
}

impl ImageError {
    /// Attach a path to an I/O error, mapping the well-known kinds onto
    /// their typed equivalents so callers can match on them.
    pub fn from_io(path: impl AsRef<Path>, err: io::Error) -> Self {
        let path = path.as_ref().display().to_string();
        match err.kind() {
            io::ErrorKind::NotFound => ImageError::NotFound { path },
            io::ErrorKind::AlreadyExists => ImageError::AlreadyExists { path },
            _ => ImageError::Io { path, source: err },
        }
    }

    pub fn not_found(path: impl AsRef<Path>) -> Self {
        ImageError::NotFound {
            path: path.as_ref().display().to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ImageError>;
