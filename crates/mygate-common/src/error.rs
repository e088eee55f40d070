//! Error types for the mygate gateway

use thiserror::Error;

/// Gateway error taxonomy
#[derive(Error, Debug)]
pub enum Error {
    // Authentication
    #[error("Missing bearer token")]
    AuthenticationMissing,

    #[error("Invalid bearer token")]
    AuthenticationInvalid,

    // Request validation
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Primary key has {expected} components but id supplied {got}")]
    CompositeKey { expected: usize, got: usize },

    // Lookup failures
    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Routine not found: {0}")]
    RoutineNotFound(String),

    // Database
    #[error("Server error {code}: {message}")]
    Driver { code: u16, message: String },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Catalog load failed: {0}")]
    Catalog(String),

    #[error("Policy load failed: {0}")]
    PolicyLoad(String),

    // General
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// HTTP status code for each error kind
    pub fn status_code(&self) -> u16 {
        match self {
            // 400 Bad Request — including driver errors that carry a server
            // error code (unique-constraint violations and friends)
            Self::Validation(_) | Self::CompositeKey { .. } | Self::Driver { .. } => 400,

            // 401 Unauthorized
            Self::AuthenticationMissing | Self::AuthenticationInvalid => 401,

            // 404 Not Found
            Self::TableNotFound(_) | Self::RoutineNotFound(_) => 404,

            // 500 Internal Server Error
            Self::Database(_)
            | Self::Catalog(_)
            | Self::PolicyLoad(_)
            | Self::Config(_)
            | Self::Json(_) => 500,
        }
    }

    /// Short machine-readable code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::AuthenticationMissing => "auth_missing",
            Self::AuthenticationInvalid => "auth_invalid",
            Self::Validation(_) => "validation_error",
            Self::CompositeKey { .. } => "composite_key_mismatch",
            Self::TableNotFound(_) => "table_not_found",
            Self::RoutineNotFound(_) => "routine_not_found",
            Self::Driver { .. } => "server_error",
            Self::Database(_) => "database_error",
            Self::Catalog(_) => "catalog_error",
            Self::PolicyLoad(_) => "policy_load_error",
            Self::Config(_) => "config_error",
            Self::Json(_) => "json_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(Error::AuthenticationMissing.status_code(), 401);
        assert_eq!(Error::TableNotFound("x".into()).status_code(), 404);
        assert_eq!(Error::CompositeKey { expected: 2, got: 1 }.status_code(), 400);
        assert_eq!(
            Error::Driver { code: 1062, message: "dup".into() }.status_code(),
            400
        );
        assert_eq!(Error::Database("boom".into()).status_code(), 500);
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(Error::AuthenticationInvalid.error_code(), "auth_invalid");
        assert_eq!(
            Error::Driver { code: 1062, message: String::new() }.error_code(),
            "server_error"
        );
    }
}
