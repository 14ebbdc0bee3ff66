use std::io;

use thiserror::Error;

use crate::transaction::SessionState;

#[derive(Debug, Error)]
pub enum DepGitError {
    #[error("invalid pkt-line length header {0:?}")]
    InvalidPktLength(String),
    #[error("pkt-line payload of {0} bytes is too long")]
    PktLineTooLong(usize),
    #[error("unexpected end of stream")]
    UnexpectedEof,
    #[error("malformed command line: {0}")]
    InvalidCommand(String),
    #[error("unsupported service request: {0}")]
    UnsupportedService(String),

    #[error("packfile truncated")]
    TruncatedPack,
    #[error("bad packfile signature")]
    InvalidPackSignature,
    #[error("unsupported packfile version {0}")]
    UnsupportedPackVersion(u32),
    #[error("invalid object type code {0}")]
    InvalidObjectType(u8),
    #[error("pack entry size overflows")]
    EntrySizeOverflow,
    #[error("inflate failed: {0}")]
    DecompressionError(String),
    #[error("object size mismatch: declared {declared}, inflated {actual}")]
    SizeMismatch { declared: u64, actual: u64 },
    #[error("delta base {0} not found in pack")]
    MissingBaseObject(String),
    #[error("invalid delta: {0}")]
    InvalidDelta(&'static str),
    #[error("packfile checksum mismatch")]
    ChecksumMismatch,
    #[error("invalid object id {0:?}")]
    InvalidHash(String),
    #[error("invalid loose object")]
    InvalidLooseObject,

    #[error("permission denied")]
    PermissionDenied,
    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("not found")]
    NotFound,
    #[error("bad data: {0}")]
    BadData(String),
    #[error("already exists")]
    AlreadyExists,
    #[error("stale old value")]
    StaleRef,
    #[error("operation cancelled")]
    Cancelled,
    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error("illegal session transition {from:?} -> {to:?}")]
    IllegalTransition { from: SessionState, to: SessionState },

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("object store error: {0}")]
    ObjectStore(String),
    #[error("io error: {0}")]
    Io(io::Error),
    #[error("ssh error: {0}")]
    Russh(#[from] russh::Error),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("{0}")]
    Other(String),
}

/// Coarse bucket used to decide how far an error propagates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Framing,
    Decode,
    Authorization,
    Authentication,
    Storage,
    NotFound,
    BadData,
    AlreadyExists,
    Cancelled,
    Internal,
}

impl DepGitError {
    pub fn class(&self) -> ErrorClass {
        match self {
            DepGitError::InvalidPktLength(_)
            | DepGitError::PktLineTooLong(_)
            | DepGitError::UnexpectedEof
            | DepGitError::InvalidCommand(_)
            | DepGitError::UnsupportedService(_) => ErrorClass::Framing,
            DepGitError::TruncatedPack
            | DepGitError::InvalidPackSignature
            | DepGitError::UnsupportedPackVersion(_)
            | DepGitError::InvalidObjectType(_)
            | DepGitError::EntrySizeOverflow
            | DepGitError::DecompressionError(_)
            | DepGitError::SizeMismatch { .. }
            | DepGitError::MissingBaseObject(_)
            | DepGitError::InvalidDelta(_)
            | DepGitError::ChecksumMismatch
            | DepGitError::InvalidHash(_)
            | DepGitError::InvalidLooseObject => ErrorClass::Decode,
            DepGitError::PermissionDenied => ErrorClass::Authorization,
            DepGitError::AuthenticationFailed => ErrorClass::Authentication,
            DepGitError::ObjectStore(_) | DepGitError::Io(_) => ErrorClass::Storage,
            DepGitError::NotFound => ErrorClass::NotFound,
            DepGitError::BadData(_) => ErrorClass::BadData,
            DepGitError::AlreadyExists => ErrorClass::AlreadyExists,
            DepGitError::Cancelled | DepGitError::DeadlineExceeded => ErrorClass::Cancelled,
            DepGitError::StaleRef
            | DepGitError::IllegalTransition { .. }
            | DepGitError::Database(_)
            | DepGitError::Russh(_)
            | DepGitError::Config(_)
            | DepGitError::Other(_) => ErrorClass::Internal,
        }
    }
}

impl From<io::Error> for DepGitError {
    fn from(e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            DepGitError::UnexpectedEof
        } else {
            DepGitError::Io(e)
        }
    }
}

impl From<object_store::Error> for DepGitError {
    fn from(e: object_store::Error) -> Self {
        match e {
            object_store::Error::AlreadyExists { .. } => DepGitError::AlreadyExists,
            object_store::Error::NotFound { .. } => DepGitError::NotFound,
            other => DepGitError::ObjectStore(other.to_string()),
        }
    }
}

pub type Result<T, E = DepGitError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unexpected_eof_is_framing() {
        let err: DepGitError = io::Error::new(io::ErrorKind::UnexpectedEof, "short").into();
        assert!(matches!(err, DepGitError::UnexpectedEof));
        assert_eq!(err.class(), ErrorClass::Framing);
    }

    #[test]
    fn test_other_io_is_storage() {
        let err: DepGitError = io::Error::other("disk gone").into();
        assert_eq!(err.class(), ErrorClass::Storage);
    }

    #[test]
    fn test_object_store_mapping() {
        let err: DepGitError = object_store::Error::NotFound {
            path: "a/b".to_string(),
            source: "missing".into(),
        }
        .into();
        assert!(matches!(err, DepGitError::NotFound));
        let err: DepGitError = object_store::Error::AlreadyExists {
            path: "a/b".to_string(),
            source: "exists".into(),
        }
        .into();
        assert!(matches!(err, DepGitError::AlreadyExists));
    }

    #[test]
    fn test_size_mismatch_message() {
        let err = DepGitError::SizeMismatch {
            declared: 10,
            actual: 7,
        };
        assert_eq!(err.class(), ErrorClass::Decode);
        assert_eq!(
            err.to_string(),
            "object size mismatch: declared 10, inflated 7"
        );
    }
}
