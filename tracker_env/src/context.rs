//! Core environment context trait for tracker sessions.

use async_trait::async_trait;
use rand_chacha::ChaCha8Rng;
use std::future::Future;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::task::JoinHandle;

/// Combines a master seed with a device index into a per-device RNG seed.
pub fn mix_seed(master: u64, extension: u64) -> u64 {
    master.wrapping_mul(0x517c_c1b7_2722_0a95) ^ extension
}

/// Everything a device session needs from the outside world except sockets.
///
/// # Implementations
///
/// - **Production**: `TokioContext` - `tokio::time`, system clock, entropy or seed
/// - **Simulation**: `SimContext` - virtual clock, always seeded
#[async_trait]
pub trait TrackerContext: Send + Sync + 'static {
    /// Monotonic time since the context was created.
    fn now(&self) -> Duration;

    /// Returns the wall-clock time used for record timestamps.
    ///
    /// In simulation, this is derived from virtual clock + epoch offset.
    fn system_time(&self) -> SystemTime;

    /// Waits for `duration`. Simulation contexts advance their clock instead.
    async fn sleep(&self, duration: Duration);

    /// Spawns a background task inside a span named `name`.
    fn spawn<F>(&self, name: &str, future: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static;

    /// Derives the random source for one device.
    ///
    /// Seeded contexts combine the master seed with `seed_extension` so each
    /// device walks a different but reproducible trajectory.
    fn device_rng(&self, seed_extension: u64) -> ChaCha8Rng;

    /// Master seed. 0 means device RNGs come from entropy.
    fn seed(&self) -> u64;

    /// Wall-clock time as Unix milliseconds.
    fn unix_millis(&self) -> u64 {
        self.system_time()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}
