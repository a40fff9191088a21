//! Error types for symtrans operations.
//!
//! Every failure is fatal for a benchmark run: the core reports it as a value
//! and the binary stops before producing a timing sample.

/// Errors that can occur while allocating, configuring or running a benchmark.
#[derive(Debug, thiserror::Error)]
pub enum SymtransError {
    /// Memory allocation failed.
    #[error(
        "Memory allocation failed: {message} (requested {requested_size} bytes with {requested_alignment} byte alignment)"
    )]
    AllocationError {
        /// The size that was requested to be allocated.
        requested_size: usize,
        /// The alignment that was requested.
        requested_alignment: usize,
        /// Human-readable error message.
        message: String,
    },
    /// Invalid layout parameters were provided.
    #[error("Invalid memory layout: {message} (size: {size}, alignment: {alignment})")]
    LayoutError {
        /// The size parameter that caused the error.
        size: usize,
        /// The alignment parameter that caused the error.
        alignment: usize,
        /// Human-readable error message.
        message: String,
    },
    /// A mode, dimension, thread count or harness parameter is unusable.
    #[error("Configuration error: {message}")]
    ConfigurationError {
        /// Human-readable error message.
        message: String,
    },
    /// Reading or writing a result file failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type alias for symtrans operations.
pub type Result<T> = std::result::Result<T, SymtransError>;

/// Creates an allocation error.
pub fn allocation_error(size: usize, alignment: usize, message: impl Into<String>) -> SymtransError {
    SymtransError::AllocationError {
        requested_size: size,
        requested_alignment: alignment,
        message: message.into(),
    }
}

/// Creates a layout error.
pub fn layout_error(size: usize, alignment: usize, message: impl Into<String>) -> SymtransError {
    SymtransError::LayoutError {
        size,
        alignment,
        message: message.into(),
    }
}

/// Creates a configuration error.
pub fn configuration_error(message: impl Into<String>) -> SymtransError {
    SymtransError::ConfigurationError {
        message: message.into(),
    }
}

impl SymtransError {
    /// True for errors raised before any memory or timing work, i.e. bad input.
    pub fn is_configuration(&self) -> bool {
        matches!(self, SymtransError::ConfigurationError { .. })
    }
}
