//! Error types for the file cache

use std::fmt;

#[derive(Debug)]
pub enum FileCacheError {
    /// The key was never stored, has expired, or was evicted
    NotFound,
    Io(Box<std::io::Error>),
}

impl FileCacheError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, FileCacheError::NotFound)
    }
}

impl fmt::Display for FileCacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileCacheError::NotFound => write!(f, "Key not found"),
            FileCacheError::Io(err) => write!(f, "IO error: {}", err),
        }
    }
}

impl std::error::Error for FileCacheError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FileCacheError::Io(err) => Some(err.as_ref()),
            FileCacheError::NotFound => None,
        }
    }
}

impl From<std::io::Error> for FileCacheError {
    fn from(err: std::io::Error) -> Self {
        FileCacheError::Io(Box::new(err))
    }
}

pub type Result<T> = std::result::Result<T, FileCacheError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_not_found_display() {
        let err = FileCacheError::NotFound;
        assert_eq!(format!("{}", err), "Key not found");
        assert!(err.is_not_found());
        assert!(err.source().is_none());
    }

    #[test]
    fn test_io_error_display_and_source() {
        let err: FileCacheError =
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only fs").into();
        assert_eq!(format!("{}", err), "IO error: read-only fs");
        assert!(!err.is_not_found());
        assert!(err.source().is_some());
    }

    #[test]
    fn test_error_is_debug() {
        let err = FileCacheError::NotFound;
        let debug_str = format!("{:?}", err);
        assert!(debug_str.contains("NotFound"));
    }
}
