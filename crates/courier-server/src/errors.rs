//! Server error types.

use thiserror::Error;

/// Errors raised while starting or running the HTTP listener.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Binding or serving the socket failed.
    #[error("server i/o error: {0}")]
    Io(#[from] std::io::Error),
    /// A Prometheus recorder could not be installed.
    #[error("failed to install metrics recorder: {0}")]
    Metrics(String),
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_conversion() {
        let err: ServerError = std::io::Error::new(std::io::ErrorKind::AddrInUse, "taken").into();
        assert!(err.to_string().contains("taken"));
    }

    #[test]
    fn metrics_display() {
        let err = ServerError::Metrics("already installed".into());
        assert_eq!(
            err.to_string(),
            "failed to install metrics recorder: already installed"
        );
    }
}
