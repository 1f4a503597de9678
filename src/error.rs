pub use masterror::{AppError, AppResult};

/// Create file read error
pub fn file_read_error(path: &str, source: std::io::Error) -> AppError {
    AppError::internal(format!("Failed to read file '{}': {}", path, source))
}

/// Create file write error
pub fn file_write_error(path: &str, source: std::io::Error) -> AppError {
    AppError::internal(format!("Failed to write file '{}': {}", path, source))
}

/// Create config error
pub fn config_error(message: impl Into<String>) -> AppError {
    AppError::bad_request(message.into())
}

/// Create input error for empty or malformed user input
pub fn input_error(message: impl Into<String>) -> AppError {
    AppError::bad_request(message.into())
}

/// Create schema provider error
pub fn schema_error(message: impl Into<String>) -> AppError {
    AppError::service(format!("Schema lookup failed: {}", message.into()))
}

/// Create embedding error
pub fn embedding_error(message: impl Into<String>) -> AppError {
    AppError::service(format!("Embedding failed: {}", message.into()))
}

/// Create embedding cache error
pub fn cache_error(message: impl Into<String>) -> AppError {
    AppError::internal(format!("Embedding cache error: {}", message.into()))
}

/// Create serialization error
pub fn serialization_error(format: &str, message: impl std::fmt::Display) -> AppError {
    AppError::internal(format!("Failed to serialize {}: {}", format, message))
}

/// Format a database error message for display, trimming driver noise
pub fn format_database_error(message: &str) -> String {
    let first = message.lines().next().unwrap_or_default().trim();
    match first.split_once("ERROR:") {
        Some((_, rest)) => rest.trim().to_string(),
        None => first.to_string()
    }
}
