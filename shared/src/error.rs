//! Error types for software management
//!
//! Every error maps onto a negative errno status code, which is what the
//! engine reports back to the management server.

use thiserror::Error;

use crate::{errno, SwMgmtEvent};

/// Errors raised by the LwM2M engine while creating instances, resources or hooks
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("Path not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Type mismatch at {0}")]
    TypeMismatch(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),
}

impl EngineError {
    /// Negative errno status for this error
    pub fn code(&self) -> i32 {
        match self {
            EngineError::NotFound(_) => -errno::ENOENT,
            EngineError::AlreadyExists(_) => -errno::EEXIST,
            EngineError::TypeMismatch(_) | EngineError::InvalidPath(_) => -errno::EINVAL,
        }
    }
}

/// Errors that can occur in the software management registry and drivers
#[derive(Error, Debug)]
pub enum SwMgmtError {
    #[error("Missing required callback: {0}")]
    InvalidArgument(&'static str),

    #[error("Event not supported: {0}")]
    NotSupported(SwMgmtEvent),

    #[error("No package owner registered for instance {0}")]
    NotExecutable(u16),

    #[error("Package on instance {0} is being installed")]
    Busy(u16),

    #[error("Storage failure on {path}: {source}")]
    Storage {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Engine failure: {0}")]
    Engine(#[from] EngineError),

    #[error("Modem failure: {0}")]
    Modem(String),
}

impl SwMgmtError {
    /// Wrap an I/O error raised while touching `path`
    pub fn storage(path: impl Into<String>, source: std::io::Error) -> Self {
        SwMgmtError::Storage {
            path: path.into(),
            source,
        }
    }

    /// Negative errno status for this error
    pub fn code(&self) -> i32 {
        match self {
            SwMgmtError::InvalidArgument(_) => -errno::EINVAL,
            SwMgmtError::NotSupported(_) => -errno::ENOTSUP,
            SwMgmtError::NotExecutable(_) => -errno::ENOEXEC,
            SwMgmtError::Busy(_) => -errno::EBUSY,
            SwMgmtError::Storage { source, .. } => match source.kind() {
                std::io::ErrorKind::NotFound => -errno::ENOENT,
                _ => -errno::EIO,
            },
            SwMgmtError::Engine(e) => e.code(),
            SwMgmtError::Modem(_) => -errno::EIO,
        }
    }
}

/// Convert a callback result into an engine status code
pub fn status_code(result: &Result<(), SwMgmtError>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(e) => e.code(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(SwMgmtError::InvalidArgument("notify").code(), -22);
        assert_eq!(SwMgmtError::NotSupported(SwMgmtEvent::Activate).code(), -134);
        assert_eq!(SwMgmtError::NotExecutable(1).code(), -8);
        assert_eq!(SwMgmtError::Busy(1).code(), -16);
        assert_eq!(
            SwMgmtError::from(EngineError::NotFound("9/1/0".into())).code(),
            -2
        );
    }

    #[test]
    fn test_storage_error_code() {
        let err = SwMgmtError::storage(
            "/lfs/update.bin",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert_eq!(err.code(), -errno::EIO);
        assert!(err.to_string().contains("/lfs/update.bin"));
    }

    #[test]
    fn test_status_code() {
        assert_eq!(status_code(&Ok(())), 0);
        assert_eq!(status_code(&Err(SwMgmtError::Modem("busy".into()))), -5);
    }
}
