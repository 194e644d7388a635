//! Error types for `pavilion-core`.
//!
//! All fallible operations in the core library return [`CoreResult<T>`],
//! which is an alias for `Result<T, CoreError>`.

/// Unified error type for all core operations.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// The underlying hashing primitive failed, or a stored hash could not
    /// be parsed. Never describes why a candidate secret did not match;
    /// mismatches are reported as `Ok(false)`, not as errors.
    #[error("password hash error: {0}")]
    Hash(String),
}

/// Convenience alias used throughout `pavilion-core`.
pub type CoreResult<T> = Result<T, CoreError>;
