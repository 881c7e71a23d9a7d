//! Production implementations backed by Tokio and real sockets.

use crate::{mix_seed, Connector, EnvError, TrackerContext};
use async_trait::async_trait;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tracing::Instrument;

/// Production context backed by Tokio and OS entropy.
///
/// Time comes from the system clock. With a zero seed every device gets a
/// fresh entropy-seeded RNG; any other seed makes trajectories reproducible.
#[derive(Debug, Clone, Copy)]
pub struct TokioContext {
    start: Instant,
    seed: u64,
}

impl TokioContext {
    pub fn new() -> Self {
        Self::with_seed(0)
    }

    /// Creates a context whose device RNGs derive from `seed`.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            start: Instant::now(),
            seed,
        }
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl Default for TokioContext {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TrackerContext for TokioContext {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }

    fn system_time(&self) -> SystemTime {
        SystemTime::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    fn spawn<F>(&self, name: &str, future: F) -> JoinHandle<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        tokio::spawn(future.instrument(tracing::info_span!("device_task", name = %name)))
    }

    fn device_rng(&self, seed_extension: u64) -> ChaCha8Rng {
        if self.seed == 0 {
            return ChaCha8Rng::from_entropy();
        }
        ChaCha8Rng::seed_from_u64(mix_seed(self.seed, seed_extension))
    }

    fn seed(&self) -> u64 {
        self.seed
    }
}

/// Opens plain TCP connections with Nagle disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    type Stream = TcpStream;

    async fn connect(&self, addr: &str, timeout: Duration) -> Result<TcpStream, EnvError> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| EnvError::timeout(timeout))?
            .map_err(|e| EnvError::connect(addr, e))?;
        stream.set_nodelay(true)?;
        Ok(stream)
    }
}
