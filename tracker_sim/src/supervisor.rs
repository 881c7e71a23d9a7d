//! SimulationSupervisor - launches one DeviceSession per simulated unit.

use crate::backoff::{Backoff, ConstantBackoff};
use crate::session::{DeviceSession, SessionSnapshot, SessionState, SessionStats};

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;
use tracker_env::{Connector, DeviceId, TrackerContext, MAX_DEVICE_INDEX};

/// Configuration for a fleet run.
#[derive(Debug, Clone)]
pub struct FleetConfig {
    /// Collector address (host:port)
    pub server_addr: String,

    /// Number of devices to simulate (ordinals 1..=device_count, at most `MAX_DEVICE_INDEX`)
    pub device_count: u32,

    /// Pause between frames, also the trajectory tick length
    pub send_interval: Duration,

    /// Delay between consecutive session launches
    pub launch_stagger: Duration,

    /// Bound on connect and on every write and read of a session
    pub io_timeout: Duration,

    /// Reconnect delay policy
    pub backoff: Arc<dyn Backoff>,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            server_addr: "122.155.175.199:5027".to_string(),
            device_count: 200,
            // Intended cadence is 30 s; 29 s is what deployed units used.
            send_interval: Duration::from_secs(29),
            launch_stagger: Duration::from_millis(20),
            io_timeout: Duration::from_secs(1),
            backoff: Arc::new(ConstantBackoff::default()),
        }
    }
}

impl FleetConfig {
    pub fn with_server(mut self, addr: impl Into<String>) -> Self {
        self.server_addr = addr.into();
        self
    }

    /// Sets the fleet size, capped at `MAX_DEVICE_INDEX` so every IMEI stays 15 digits.
    pub fn with_device_count(mut self, count: u32) -> Self {
        self.device_count = count.min(MAX_DEVICE_INDEX);
        self
    }

    pub fn with_send_interval(mut self, interval: Duration) -> Self {
        self.send_interval = interval;
        self
    }

    pub fn with_launch_stagger(mut self, stagger: Duration) -> Self {
        self.launch_stagger = stagger;
        self
    }

    pub fn with_io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }

    pub fn with_backoff(mut self, backoff: impl Backoff) -> Self {
        self.backoff = Arc::new(backoff);
        self
    }
}

/// Aggregate view of a running fleet.
#[derive(Debug, Clone, Serialize)]
pub struct FleetSummary {
    pub devices: usize,
    pub streaming: usize,
    pub frames_sent: u64,
    pub failures: u64,
    pub sessions: Vec<SessionSnapshot>,
}

/// Owns the spawned sessions of a fleet.
///
/// Sessions are fire-and-forget: nothing joins them while they run. Dropping
/// the handle leaves them running; `shutdown` aborts them.
pub struct FleetHandle {
    handles: Vec<JoinHandle<()>>,
    stats: Vec<Arc<SessionStats>>,
}

impl FleetHandle {
    /// Number of sessions launched.
    pub fn session_count(&self) -> usize {
        self.handles.len()
    }

    /// Number of session tasks still alive.
    pub fn running(&self) -> usize {
        self.handles.iter().filter(|h| !h.is_finished()).count()
    }

    /// Per-session counters, in launch order.
    pub fn stats(&self) -> &[Arc<SessionStats>] {
        &self.stats
    }

    /// Current summary without stopping anything.
    pub fn summary(&self) -> FleetSummary {
        let sessions: Vec<SessionSnapshot> = self.stats.iter().map(|s| s.snapshot()).collect();
        FleetSummary {
            devices: sessions.len(),
            streaming: sessions
                .iter()
                .filter(|s| s.state == SessionState::Streaming)
                .count(),
            frames_sent: sessions.iter().map(|s| s.frames_sent).sum(),
            failures: sessions.iter().map(|s| s.failures).sum(),
            sessions,
        }
    }

    /// Aborts every session and returns the final summary.
    pub async fn shutdown(self) -> FleetSummary {
        for handle in &self.handles {
            handle.abort();
        }
        let summary = self.summary();
        for handle in self.handles {
            // Aborted tasks resolve to a cancellation error.
            let _ = handle.await;
        }
        info!(
            devices = summary.devices,
            frames = summary.frames_sent,
            failures = summary.failures,
            "Fleet stopped"
        );
        summary
    }
}

/// Launches and owns a fleet of device sessions.
pub struct SimulationSupervisor<Ctx, Conn>
where
    Ctx: TrackerContext,
    Conn: Connector,
{
    /// Configuration
    config: Arc<FleetConfig>,

    /// Shared environment context
    context: Arc<Ctx>,

    /// Shared connector
    connector: Arc<Conn>,
}

impl<Ctx, Conn> SimulationSupervisor<Ctx, Conn>
where
    Ctx: TrackerContext,
    Conn: Connector,
{
    /// Creates a supervisor. Nothing is launched until `launch`.
    pub fn new(config: FleetConfig, context: Arc<Ctx>, connector: Arc<Conn>) -> Self {
        Self {
            config: Arc::new(config),
            context,
            connector,
        }
    }

    /// Returns the fleet configuration.
    pub fn config(&self) -> &FleetConfig {
        &self.config
    }

    /// Starts one session per device, waiting `launch_stagger` between them.
    ///
    /// Returns once every session has been spawned.
    pub async fn launch(&self) -> FleetHandle {
        let count = self.config.device_count;
        info!(
            devices = count,
            server = %self.config.server_addr,
            interval_s = self.config.send_interval.as_secs_f64(),
            seed = self.context.seed(),
            "Launching fleet"
        );

        let mut handles = Vec::with_capacity(count as usize);
        let mut stats = Vec::with_capacity(count as usize);

        for index in 1..=count {
            let session = DeviceSession::new(
                DeviceId::new(index),
                Arc::clone(&self.context),
                Arc::clone(&self.connector),
                Arc::clone(&self.config),
            );
            stats.push(session.stats());
            let name = format!("device-{}", session.id());
            handles.push(self.context.spawn(&name, session.run()));

            if index < count {
                self.context.sleep(self.config.launch_stagger).await;
            }
        }

        info!(devices = handles.len(), "Fleet launched");
        FleetHandle { handles, stats }
    }
}
