//! Error types for the sweeper

use partage_store::StoreError;
use std::fmt;

#[derive(Debug)]
pub enum TrashError {
    Store(StoreError),
    Config(String),
}

impl fmt::Display for TrashError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrashError::Store(err) => write!(f, "Sweep failed: {}", err),
            TrashError::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for TrashError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TrashError::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StoreError> for TrashError {
    fn from(err: StoreError) -> Self {
        TrashError::Store(err)
    }
}

impl From<tracing_subscriber::filter::ParseError> for TrashError {
    fn from(err: tracing_subscriber::filter::ParseError) -> Self {
        TrashError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TrashError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_display() {
        let err = TrashError::from(StoreError::Corrupt {
            id: "abc".to_string(),
            reason: "EOF while parsing".to_string(),
        });
        assert_eq!(
            format!("{}", err),
            "Sweep failed: Corrupt metadata for abc: EOF while parsing"
        );
    }

    #[test]
    fn test_config_error_display() {
        let err = TrashError::Config("bad directive".to_string());
        assert_eq!(format!("{}", err), "Configuration error: bad directive");
    }
}
