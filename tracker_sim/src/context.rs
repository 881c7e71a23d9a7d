//! Virtual-clock context for driving sessions without waiting.

use async_trait::async_trait;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::task::JoinHandle;
use tracing::Instrument;
use tracker_env::{mix_seed, TrackerContext};

/// Wall-clock instant that virtual time zero maps to (2024-01-01T00:00:00Z).
const EPOCH_UNIX_SECS: u64 = 1_704_067_200;

/// `TrackerContext` whose clock only moves when a task sleeps.
///
/// `sleep` bumps a shared nanosecond counter and yields once, so a 29 s send
/// interval or a 2 s reconnect delay costs one scheduler turn. Clones share
/// the clock. Device RNGs are derived from the seed and the device index, so
/// every run with the same seed replays the same trajectories.
#[derive(Debug, Clone)]
pub struct SimContext {
    seed: u64,
    elapsed_ns: Arc<AtomicU64>,
}

impl SimContext {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            elapsed_ns: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn shared(seed: u64) -> Arc<Self> {
        Arc::new(Self::new(seed))
    }

    /// Moves the virtual clock forward without yielding.
    pub fn advance(&self, by: Duration) {
        let ns = u64::try_from(by.as_nanos()).unwrap_or(u64::MAX);
        self.elapsed_ns.fetch_add(ns, Ordering::SeqCst);
    }
}

#[async_trait]
impl TrackerContext for SimContext {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.elapsed_ns.load(Ordering::SeqCst))
    }

    fn system_time(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(EPOCH_UNIX_SECS) + self.now()
    }

    async fn sleep(&self, duration: Duration) {
        self.advance(duration);
        tokio::task::yield_now().await;
    }

    fn spawn<F>(&self, name: &str, future: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        tokio::spawn(future.instrument(tracing::debug_span!("sim_task", name = %name)))
    }

    fn device_rng(&self, seed_extension: u64) -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(mix_seed(self.seed, seed_extension))
    }

    fn seed(&self) -> u64 {
        self.seed
    }
}
