//! Error types for the update monitor

use thiserror::Error;

/// Result type for update monitor operations
pub type Result<T> = std::result::Result<T, MonitorError>;

/// Update monitor error types
#[derive(Debug, Error)]
pub enum MonitorError {
    /// Socket-level failure talking to the admin listener
    #[error("Connection error: {0}")]
    Connection(String),

    /// The admin listener rejected the shared secret
    #[error("Authentication failed: server rejected RCON password")]
    Authentication,

    /// Malformed or truncated frame
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Version source or log sink unavailable
    #[error("Remote source error: {0}")]
    RemoteSource(String),

    /// The restart action itself failed
    #[error("Execution error: {0}")]
    Execution(String),

    /// Version store failure
    #[error("Store error: {0}")]
    Store(String),

    /// Invalid or unreadable settings
    #[error("Config error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl MonitorError {
    /// Whether the next poll cycle may reasonably succeed where this one failed.
    ///
    /// Remote I/O failures are transient. Local store and configuration
    /// failures are not and should surface to the operator.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            MonitorError::Connection(_)
                | MonitorError::Authentication
                | MonitorError::Protocol(_)
                | MonitorError::RemoteSource(_)
                | MonitorError::Execution(_)
        )
    }

    /// Whether the connection must be dropped and re-established.
    pub fn forces_reconnect(&self) -> bool {
        matches!(self, MonitorError::Connection(_) | MonitorError::Protocol(_))
    }
}

impl From<serde_json::Error> for MonitorError {
    fn from(err: serde_json::Error) -> Self {
        MonitorError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for MonitorError {
    fn from(err: toml::de::Error) -> Self {
        MonitorError::Config(err.to_string())
    }
}
