//! Error types for the tracker environment abstraction.

use std::io;
use thiserror::Error;

/// Errors that can occur in the environment abstraction layer.
#[derive(Debug, Error)]
pub enum EnvError {
    /// Connection could not be established (DNS, unreachable, reset)
    #[error("Connect to {addr} failed: {reason}")]
    ConnectFailed { addr: String, reason: String },

    /// Peer actively refused the connection
    #[error("Connection refused by {0}")]
    Refused(String),

    /// Operation timed out
    #[error("Timeout after {0}ms")]
    Timeout(u64),

    /// Peer closed the stream
    #[error("Connection closed by peer")]
    Closed,

    /// Read or write failed on an open stream
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl EnvError {
    /// Creates a connect error, promoting `ConnectionRefused` to `Refused`.
    pub fn connect(addr: impl Into<String>, err: io::Error) -> Self {
        let addr = addr.into();
        if err.kind() == io::ErrorKind::ConnectionRefused {
            Self::Refused(addr)
        } else {
            Self::ConnectFailed { addr, reason: err.to_string() }
        }
    }

    /// Creates a timeout error from a duration.
    pub fn timeout(after: std::time::Duration) -> Self {
        Self::Timeout(after.as_millis() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_connect_refused_is_promoted() {
        let err = EnvError::connect("127.0.0.1:1", io::Error::from(io::ErrorKind::ConnectionRefused));
        assert!(matches!(err, EnvError::Refused(ref a) if a == "127.0.0.1:1"));

        let err = EnvError::connect("example:1", io::Error::new(io::ErrorKind::Other, "dns"));
        assert!(matches!(err, EnvError::ConnectFailed { .. }));
    }

    #[test]
    fn test_timeout_display() {
        assert_eq!(EnvError::timeout(Duration::from_secs(1)).to_string(), "Timeout after 1000ms");
    }
}
