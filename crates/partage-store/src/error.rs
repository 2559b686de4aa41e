//! Error types for the partage blob store

use std::fmt;

#[derive(Debug)]
pub enum StoreError {
    /// Declared upload length is above the configured maximum
    QuotaExceeded { declared: u64, max: u64 },
    Io(Box<std::io::Error>),
    /// A metadata record exists but cannot be parsed
    Corrupt { id: String, reason: String },
    NotFound(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::QuotaExceeded { declared, max } => write!(
                f,
                "Quota exceeded: {} bytes declared, maximum is {}",
                declared, max
            ),
            StoreError::Io(err) => write!(f, "IO error: {}", err),
            StoreError::Corrupt { id, reason } => {
                write!(f, "Corrupt metadata for {}: {}", id, reason)
            }
            StoreError::NotFound(id) => write!(f, "Not found: {}", id),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Io(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(Box::new(err))
    }
}

impl StoreError {
    /// Map an io error to `NotFound` when the file is missing, `Io` otherwise
    pub(crate) fn from_io(err: std::io::Error, id: &str) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            StoreError::NotFound(id.to_string())
        } else {
            StoreError::Io(Box::new(err))
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quota_exceeded_display() {
        let err = StoreError::QuotaExceeded {
            declared: 2048,
            max: 1024,
        };
        assert_eq!(
            format!("{}", err),
            "Quota exceeded: 2048 bytes declared, maximum is 1024"
        );
    }

    #[test]
    fn test_corrupt_display() {
        let err = StoreError::Corrupt {
            id: "abc.txt".to_string(),
            reason: "expected value".to_string(),
        };
        assert!(format!("{}", err).contains("abc.txt"));
        assert!(format!("{}", err).contains("expected value"));
    }

    #[test]
    fn test_from_io_maps_missing_file_to_not_found() {
        let err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = StoreError::from_io(err, "abc");
        assert!(err.is_not_found());

        let err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
        let err = StoreError::from_io(err, "abc");
        assert!(matches!(err, StoreError::Io(_)));
    }

    #[test]
    fn test_error_source() {
        use std::error::Error;

        let err: StoreError = std::io::Error::other("disk full").into();
        assert!(err.source().is_some());

        let err = StoreError::NotFound("x".to_string());
        assert!(err.source().is_none());
    }
}
