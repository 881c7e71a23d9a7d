//! Simulated network: in-memory connections to scripted collector peers.

use crate::collector::{serve_device, FrameObserver};
use crate::scenarios::PeerBehavior;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::io::{duplex, DuplexStream};
use tracing::debug;
use tracker_env::{Connector, EnvError};

/// Buffer size of each in-memory pipe.
const PIPE_CAPACITY: usize = 16 * 1024;

/// Connector whose every connection lands on a scripted `serve_device` peer.
///
/// Behaviors are consumed one per connection attempt from the script; once
/// the script is exhausted the fallback behavior is used for all further
/// attempts.
pub struct SimConnector {
    /// Per-attempt behaviors, consumed front to back
    script: Mutex<VecDeque<PeerBehavior>>,

    /// Behavior once the script runs out
    fallback: PeerBehavior,

    /// Connection attempts seen so far
    attempts: AtomicU32,

    /// Where decoded frames go
    observer: Option<FrameObserver>,
}

impl SimConnector {
    /// Creates a connector that applies `behavior` to every connection.
    pub fn new(behavior: PeerBehavior) -> Self {
        Self::scripted(Vec::new(), behavior)
    }

    /// Creates a connector that plays `script` first, then `fallback`.
    pub fn scripted(script: Vec<PeerBehavior>, fallback: PeerBehavior) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback,
            attempts: AtomicU32::new(0),
            observer: None,
        }
    }

    /// Forwards decoded frames to `observer`.
    pub fn with_observer(mut self, observer: FrameObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Number of connection attempts so far.
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    fn next_behavior(&self) -> PeerBehavior {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or(self.fallback)
    }
}

#[async_trait]
impl Connector for SimConnector {
    type Stream = DuplexStream;

    async fn connect(&self, addr: &str, _timeout: Duration) -> Result<DuplexStream, EnvError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        let behavior = self.next_behavior();
        debug!(addr, attempt, %behavior, "Simulated connect");

        if behavior == PeerBehavior::Refuse {
            return Err(EnvError::Refused(addr.to_string()));
        }

        let (client, server) = duplex(PIPE_CAPACITY);
        let observer = self.observer.clone();
        tokio::spawn(async move {
            if let Err(e) = serve_device(server, behavior, observer).await {
                debug!(error = %e, "Simulated peer ended with error");
            }
        });
        Ok(client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tracker_env::DeviceId;

    #[tokio::test]
    async fn test_script_then_fallback() {
        let connector = SimConnector::scripted(
            vec![PeerBehavior::Refuse, PeerBehavior::Reject(0x05)],
            PeerBehavior::Accept,
        );
        let timeout = Duration::from_secs(1);

        let err = connector.connect("sim:5027", timeout).await.unwrap_err();
        assert!(matches!(err, EnvError::Refused(_)));

        let mut rejected = connector.connect("sim:5027", timeout).await.unwrap();
        rejected.write_all(&DeviceId::new(3).handshake_bytes()).await.unwrap();
        assert_eq!(rejected.read_u8().await.unwrap(), 0x05);

        let mut accepted = connector.connect("sim:5027", timeout).await.unwrap();
        accepted.write_all(&DeviceId::new(3).handshake_bytes()).await.unwrap();
        assert_eq!(accepted.read_u8().await.unwrap(), 0x01);

        assert_eq!(connector.attempts(), 3);
    }
}
