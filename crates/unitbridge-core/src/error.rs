//! Error types shared by the bridge and its collaborators.

use std::time::Duration;

/// Failure reported by the gateway while establishing a connection.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConnectError {
    /// The remote service rejected the token. Terminal: never retried.
    #[error("authentication rejected: {0}")]
    Authentication(String),
    /// Anything else (network, remote outage, protocol hiccup).
    #[error("connection failed: {0}")]
    Transient(String),
    /// Setup did not finish within the configured window.
    #[error("connection setup timed out after {0:?}")]
    TimedOut(Duration),
}

impl ConnectError {
    /// Whether this failure ends the integration for the rest of the process.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectError::Authentication(_))
    }
}

/// The host could not enumerate its units.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unit enumeration failed: {message}")]
pub struct EnumerationError {
    message: String,
}

impl EnumerationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Failure inside the messaging collaborator.
#[derive(Debug, Clone, thiserror::Error)]
pub enum MessageError {
    #[error("unknown channel: {0}")]
    InvalidChannel(u64),
    #[error("message delivery failed: {0}")]
    Delivery(String),
}

/// Error starting the connection.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StartError {
    #[error("connection setup has already been started")]
    AlreadyStarted,
}

/// Error loading or writing configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to access config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("config is missing a value for {0}")]
    Missing(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_authentication_is_terminal() {
        assert!(ConnectError::Authentication("bad token".into()).is_terminal());
        assert!(!ConnectError::Transient("reset".into()).is_terminal());
        assert!(!ConnectError::TimedOut(Duration::from_secs(1)).is_terminal());
    }

    #[test]
    fn enumeration_error_message() {
        let err = EnumerationError::new("registry locked");
        assert_eq!(err.message(), "registry locked");
        assert_eq!(err.to_string(), "unit enumeration failed: registry locked");
    }
}
