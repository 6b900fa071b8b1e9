/// Core error types for the Mosaic engine.

/// A specialized Result type for Mosaic operations.
pub type MosaicResult<T> = Result<T, MosaicError>;

/// Top-level error type encompassing all Mosaic subsystems.
#[derive(Debug, thiserror::Error)]
pub enum MosaicError {
    /// A resource-tracking invariant was broken. Fatal to the owning pool;
    /// the operation is aborted and surfaced to the caller.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// The driver refused an allocation. The caller decides retry/drop.
    #[error("resource unavailable: {0}")]
    ResourceUnavailable(String),

    /// A lane channel is closed. Non-fatal: the lane is skipped for the
    /// current unit.
    #[error("lane {lane} channel closed")]
    ChannelClosed { lane: u32 },

    /// The requested configuration exceeds driver or engine limits.
    /// Fatal at setup, before any frame is processed.
    #[error("unsupported configuration: {0}")]
    ConfigUnsupported(String),

    #[error("render error: {0}")]
    Render(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl MosaicError {
    /// Create an invariant-violation error.
    pub fn invariant(message: impl Into<String>) -> Self {
        MosaicError::InvariantViolation(message.into())
    }

    /// Create an unsupported-configuration error.
    pub fn unsupported(message: impl Into<String>) -> Self {
        MosaicError::ConfigUnsupported(message.into())
    }

    /// Create a render error.
    pub fn render(message: impl Into<String>) -> Self {
        MosaicError::Render(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invariant_display() {
        let err = MosaicError::invariant("unknown buffer released: 3_y");
        assert_eq!(
            err.to_string(),
            "invariant violation: unknown buffer released: 3_y"
        );
    }

    #[test]
    fn test_channel_closed_display() {
        let err = MosaicError::ChannelClosed { lane: 7 };
        assert_eq!(err.to_string(), "lane 7 channel closed");
    }

    #[test]
    fn test_unsupported_display() {
        let err = MosaicError::unsupported("grid 16384x16384 exceeds device limit 8192");
        assert!(err.to_string().starts_with("unsupported configuration:"));
    }
}
