//! Error taxonomy for fingerprinting and retrieval.
//!
//! Fingerprinting and endpoint parsing fail on caller input. Per-file read
//! failures stay local to a scan. Remote failures are split into
//! [`FetchError::NotFound`] and [`FetchError::Transport`] so callers can
//! match on the variant instead of inspecting message text.

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors that abort a whole fingerprint scan.
#[derive(Debug, Error)]
pub enum FingerprintError {
    /// The root path is empty or is not a traversable directory.
    #[error("invalid root {}: {reason}", .path.display())]
    InvalidRoot { path: PathBuf, reason: String },

    /// An exclude glob could not be compiled.
    #[error("invalid exclude pattern: {0}")]
    InvalidPattern(#[from] globset::Error),

    /// The directory tree could not be enumerated.
    #[error("failed to enumerate {}: {source}", .path.display())]
    Traversal {
        path: PathBuf,
        source: walkdir::Error,
    },

    /// The hashing worker pool could not be started.
    #[error("failed to start hashing pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),

    #[error("fingerprint scan cancelled")]
    Cancelled,
}

/// A single file could not be opened or read to completion.
#[derive(Debug, Error)]
#[error("failed to read {}: {source}", .path.display())]
pub struct ReadError {
    pub path: PathBuf,
    pub source: io::Error,
}

/// Endpoint strings are validated before any network activity.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EndpointError {
    #[error("invalid endpoint {input:?}: {reason} (expected grpc[s]://host[:port] or http[s]://host[:port])")]
    InvalidEndpoint { input: String, reason: String },
}

/// Status codes a transport may report for a remote call.
///
/// Mirrors the gRPC code space; HTTP statuses are folded into it by the
/// HTTP transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    NotFound,
    Unauthenticated,
    PermissionDenied,
    Unavailable,
    DeadlineExceeded,
    ResourceExhausted,
    InvalidArgument,
    Cancelled,
    Internal,
    Unknown,
}

/// A failure reported by a transport, before classification.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct RemoteStatus {
    pub code: StatusCode,
    pub message: String,
}

impl RemoteStatus {
    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Wraps the status in an `io::Error` so it can travel through an
    /// `AsyncRead` and be recovered by [`crate::client::classify_io`].
    pub fn into_io(self) -> io::Error {
        io::Error::other(self)
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StatusCode::NotFound => "not_found",
            StatusCode::Unauthenticated => "unauthenticated",
            StatusCode::PermissionDenied => "permission_denied",
            StatusCode::Unavailable => "unavailable",
            StatusCode::DeadlineExceeded => "deadline_exceeded",
            StatusCode::ResourceExhausted => "resource_exhausted",
            StatusCode::InvalidArgument => "invalid_argument",
            StatusCode::Cancelled => "cancelled",
            StatusCode::Internal => "internal",
            StatusCode::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Detail code of a [`TransportFailure`].
///
/// Has no "not found" member: a missing key is [`FetchError::NotFound`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureCode {
    Unauthenticated,
    PermissionDenied,
    Unavailable,
    DeadlineExceeded,
    ResourceExhausted,
    InvalidArgument,
    Cancelled,
    Internal,
    Unknown,
    /// Creating or writing the local destination failed.
    LocalIo,
}

impl FailureCode {
    /// Whether a caller may reasonably retry after this failure.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            FailureCode::Unavailable
                | FailureCode::DeadlineExceeded
                | FailureCode::ResourceExhausted
                | FailureCode::Internal
                | FailureCode::Unknown
        )
    }
}

impl fmt::Display for FailureCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureCode::Unauthenticated => "unauthenticated",
            FailureCode::PermissionDenied => "permission_denied",
            FailureCode::Unavailable => "unavailable",
            FailureCode::DeadlineExceeded => "deadline_exceeded",
            FailureCode::ResourceExhausted => "resource_exhausted",
            FailureCode::InvalidArgument => "invalid_argument",
            FailureCode::Cancelled => "cancelled",
            FailureCode::Internal => "internal",
            FailureCode::Unknown => "unknown",
            FailureCode::LocalIo => "local_io",
        };
        f.write_str(s)
    }
}

/// Connection, protocol, authorization or local-write failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("transport failure ({code}): {message}")]
pub struct TransportFailure {
    pub code: FailureCode,
    pub message: String,
}

impl TransportFailure {
    pub fn new(code: FailureCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Result of a remote `get`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The store definitively has no object under this key.
    #[error("no cache object found for key {key:?}")]
    NotFound { key: String },

    #[error(transparent)]
    Transport(#[from] TransportFailure),
}
