//! Error types for the locus location catalog.

use thiserror::Error;

/// Result type alias using locus's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for locus operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Location not found
    #[error("Location not found: {0}")]
    LocationNotFound(i64),

    /// Alias not found for the given location
    #[error("Alias not found: {0}")]
    AliasNotFound(i64),

    /// Client link not found for the given location
    #[error("Client link not found: {0}")]
    ClientLinkNotFound(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_not_found() {
        let err = Error::NotFound("test resource".to_string());
        assert_eq!(err.to_string(), "Not found: test resource");
    }

    #[test]
    fn test_error_display_location_not_found() {
        let err = Error::LocationNotFound(42);
        assert_eq!(err.to_string(), "Location not found: 42");
    }

    #[test]
    fn test_error_display_alias_not_found() {
        let err = Error::AliasNotFound(7);
        assert_eq!(err.to_string(), "Alias not found: 7");
    }

    #[test]
    fn test_error_display_client_link_not_found() {
        let err = Error::ClientLinkNotFound("erp/123/Operator".to_string());
        assert_eq!(err.to_string(), "Client link not found: erp/123/Operator");
    }

    #[test]
    fn test_error_display_invalid_input() {
        let err = Error::InvalidInput("latitude out of range".to_string());
        assert_eq!(err.to_string(), "Invalid input: latitude out of range");
    }

    #[test]
    fn test_error_display_internal() {
        let err = Error::Internal("unexpected state".to_string());
        assert_eq!(err.to_string(), "Internal error: unexpected state");
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<i32>("not a number");
        assert!(json_err.is_err());

        let err: Error = json_err.unwrap_err().into();
        match err {
            Error::Serialization(msg) => assert!(!msg.is_empty()),
            _ => panic!("Expected Serialization error"),
        }
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<Error>();
        assert_sync::<Error>();
    }

    #[test]
    fn test_result_type_ok() {
        fn get_result() -> Result<i32> {
            Ok(42)
        }
        assert_eq!(get_result().unwrap(), 42);
    }
}
