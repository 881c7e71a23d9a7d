//! Network abstraction for tracker sessions.

use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::EnvError;

/// A bidirectional byte stream owned by one session.
///
/// Blanket-implemented for anything tokio can read and write, so both
/// `TcpStream` and `tokio::io::DuplexStream` qualify.
pub trait DeviceStream: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

impl<T> DeviceStream for T where T: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

/// Opens the per-device connection to the collector.
///
/// # Implementations
///
/// - **Production**: `TcpConnector` - real TCP sockets
/// - **Simulation**: `SimConnector` - in-memory duplex with a scripted peer
///
/// # Connection Flow
///
/// ```text
/// Session                   Connector                  Collector
///   |                           |                          |
///   |-- connect(addr, t) ------>|                          |
///   |                           |-- [open within t] ------>|
///   |<-- Ok(stream) ------------|                          |
/// ```
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// The stream type handed to the session.
    type Stream: DeviceStream;

    /// Opens a connection to `addr`, failing after `timeout`.
    ///
    /// # Returns
    /// * `Ok(stream)` - Connection established
    /// * `Err(EnvError::Timeout)` - No connection within `timeout`
    /// * `Err(EnvError::Refused | ConnectFailed)` - Immediate failure
    async fn connect(&self, addr: &str, timeout: Duration) -> Result<Self::Stream, EnvError>;
}
