// src/error.rs

use thiserror::Error;

/// Core error types for Cupertino
#[derive(Error, Debug)]
pub enum Error {
    /// Database-related errors (failed statements or transactions)
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// I/O errors with context
    #[error("I/O error: {0}")]
    IoError(String),

    /// JSON encoding/decoding errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Database initialization error
    #[error("Failed to initialize database: {0}")]
    InitError(String),

    /// Database not found
    #[error("Database not found at path: {0}")]
    DatabaseNotFound(String),

    /// Malformed version or constraint text
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// A package was reached again while its own dependencies were being resolved
    #[error("Circular dependency detected: {0}")]
    CircularDependency(String),

    /// No available release satisfies a dependency constraint
    #[error("No version of {name} satisfies constraint {constraint}")]
    NoSatisfyingVersion { name: String, constraint: String },

    /// Archive entry or manifest path escapes its destination directory
    #[error("Path traversal attempt: {0}")]
    PathTraversal(String),

    /// Downloaded artifact does not match the registry checksum
    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    /// Package or version not found
    #[error("Not found: {0}")]
    NotFoundError(String),

    /// Registry returned an error status or could not be reached
    #[error("Registry error: {0}")]
    RegistryError(String),

    /// Resource already exists
    #[error("Conflict: {0}")]
    ConflictError(String),

    /// Invalid or unreadable package manifest
    #[error("Manifest error: {0}")]
    ManifestError(String),
}

/// Result type alias using Cupertino's Error type
pub type Result<T> = std::result::Result<T, Error>;
