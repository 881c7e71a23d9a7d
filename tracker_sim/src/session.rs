//! DeviceSession - one simulated tracker's connection state machine.
//!
//! ```text
//!                 ┌──────────────┐
//!        ┌───────►│ Disconnected │◄──────────── any failure
//!        │        └──────┬───────┘              (after backoff)
//!        │               │
//!        │        ┌──────▼───────┐
//!        │        │  Connecting  │  connect within io_timeout
//!        │        └──────┬───────┘
//!        │               │
//!        │        ┌──────▼───────┐
//!        │        │ Handshaking  │  u16 len + IMEI, expect 0x01
//!        │        └──────┬───────┘
//!        │               │
//!        │        ┌──────▼───────┐
//!        └────────┤  Streaming   │◄─┐ advance, encode, send, ack,
//!                 └──────┬───────┘  │ sleep send_interval
//!                        └──────────┘
//! ```
//!
//! Every error is collapsed into one recoverable path: log it, count it, go
//! back to `Disconnected`, wait, try again. Sessions never terminate on their
//! own.

use crate::collector::HANDSHAKE_ACCEPT;
use crate::supervisor::FleetConfig;

use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::io;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info, warn};
use tracker_core::{avl_codec, KinematicState, Zone};
use tracker_env::{Connector, DeviceId, DeviceStream, EnvError, TrackerContext};

/// Size of the buffer used for handshake and ack reads.
const READ_BUF_LEN: usize = 1024;

/// Why a session dropped back to `Disconnected`.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Connect, read or write failure (includes timeouts)
    #[error(transparent)]
    Env(#[from] EnvError),

    /// Collector answered the handshake with something other than 0x01,
    /// or closed without answering
    #[error("Handshake rejected (reply {0:?})")]
    HandshakeRejected(Option<u8>),

    /// Collector closed the stream instead of acknowledging a frame
    #[error("Collector closed the stream")]
    StreamClosed,
}

impl From<io::Error> for SessionError {
    fn from(err: io::Error) -> Self {
        Self::Env(EnvError::Io(err))
    }
}

/// Observable session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Disconnected,
    Connecting,
    Handshaking,
    Streaming,
}

impl SessionState {
    fn as_u8(self) -> u8 {
        match self {
            SessionState::Disconnected => 0,
            SessionState::Connecting => 1,
            SessionState::Handshaking => 2,
            SessionState::Streaming => 3,
        }
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => SessionState::Connecting,
            2 => SessionState::Handshaking,
            3 => SessionState::Streaming,
            _ => SessionState::Disconnected,
        }
    }
}

/// Lock-free counters published by a running session.
#[derive(Debug)]
pub struct SessionStats {
    device: DeviceId,
    zone: Zone,
    state: AtomicU8,
    connect_attempts: AtomicU64,
    handshakes: AtomicU64,
    frames_sent: AtomicU64,
    failures: AtomicU64,
}

impl SessionStats {
    pub fn new(device: DeviceId, zone: Zone) -> Self {
        Self {
            device,
            zone,
            state: AtomicU8::new(SessionState::Disconnected.as_u8()),
            connect_attempts: AtomicU64::new(0),
            handshakes: AtomicU64::new(0),
            frames_sent: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Relaxed))
    }

    pub fn connect_attempts(&self) -> u64 {
        self.connect_attempts.load(Ordering::Relaxed)
    }

    pub fn handshakes(&self) -> u64 {
        self.handshakes.load(Ordering::Relaxed)
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Point-in-time copy for summaries.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            imei: self.device.imei(),
            zone: self.zone,
            state: self.state(),
            connect_attempts: self.connect_attempts(),
            handshakes: self.handshakes(),
            frames_sent: self.frames_sent(),
            failures: self.failures(),
        }
    }

    fn set_state(&self, state: SessionState) {
        self.state.store(state.as_u8(), Ordering::Relaxed);
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Serializable view of `SessionStats`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub imei: String,
    pub zone: Zone,
    pub state: SessionState,
    pub connect_attempts: u64,
    pub handshakes: u64,
    pub frames_sent: u64,
    pub failures: u64,
}

/// Connection phase; the open stream lives inside the phases that need it.
enum Phase<S> {
    Disconnected,
    Connecting,
    Handshaking(S),
    Streaming(S),
}

/// A single simulated tracker unit.
///
/// Owns its identity, kinematic state, RNG and (while connected) its stream.
/// Nothing here is shared with other devices except the read-only config.
pub struct DeviceSession<Ctx, Conn>
where
    Ctx: TrackerContext,
    Conn: Connector,
{
    id: DeviceId,
    zone: Zone,
    kinematics: KinematicState,
    rng: ChaCha8Rng,
    context: Arc<Ctx>,
    connector: Arc<Conn>,
    config: Arc<FleetConfig>,
    phase: Phase<Conn::Stream>,
    /// Consecutive failures since the last accepted handshake
    failures: u32,
    stats: Arc<SessionStats>,
}

impl<Ctx, Conn> DeviceSession<Ctx, Conn>
where
    Ctx: TrackerContext,
    Conn: Connector,
{
    /// Creates a session parked at a random hub of the device's zone.
    pub fn new(id: DeviceId, context: Arc<Ctx>, connector: Arc<Conn>, config: Arc<FleetConfig>) -> Self {
        let mut rng = context.device_rng(id.index() as u64);
        let zone = Zone::for_device(id.index());
        let kinematics = KinematicState::parked_at(zone.random_hub(&mut rng));

        Self {
            id,
            zone,
            kinematics,
            rng,
            context,
            connector,
            config,
            phase: Phase::Disconnected,
            failures: 0,
            stats: Arc::new(SessionStats::new(id, zone)),
        }
    }

    pub fn id(&self) -> DeviceId {
        self.id
    }

    pub fn zone(&self) -> Zone {
        self.zone
    }

    pub fn kinematics(&self) -> &KinematicState {
        &self.kinematics
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.failures
    }

    /// Shared handle to this session's counters.
    pub fn stats(&self) -> Arc<SessionStats> {
        Arc::clone(&self.stats)
    }

    pub fn state(&self) -> SessionState {
        match self.phase {
            Phase::Disconnected => SessionState::Disconnected,
            Phase::Connecting => SessionState::Connecting,
            Phase::Handshaking(_) => SessionState::Handshaking,
            Phase::Streaming(_) => SessionState::Streaming,
        }
    }

    /// Drives the state machine forever.
    pub async fn run(mut self) {
        info!(device = %self.id, zone = %self.zone, "Session started");
        loop {
            self.step().await;
        }
    }

    /// Performs exactly one transition and returns the resulting state.
    pub async fn step(&mut self) -> SessionState {
        let phase = std::mem::replace(&mut self.phase, Phase::Disconnected);

        let outcome = match phase {
            Phase::Disconnected => {
                self.wait_before_connect().await;
                Ok(Phase::Connecting)
            }
            Phase::Connecting => self.connect().await.map(Phase::Handshaking),
            Phase::Handshaking(stream) => self.handshake(stream).await.map(Phase::Streaming),
            Phase::Streaming(stream) => self.stream_frame(stream).await.map(Phase::Streaming),
        };

        self.phase = match outcome {
            Ok(next) => next,
            Err(err) => {
                self.record_failure(&err);
                Phase::Disconnected
            }
        };

        let state = self.state();
        self.stats.set_state(state);
        state
    }

    async fn wait_before_connect(&mut self) {
        if self.failures == 0 {
            return;
        }
        let delay = self.config.backoff.delay(self.failures);
        debug!(device = %self.id, delay_ms = delay.as_millis() as u64, "Waiting before reconnect");
        self.context.sleep(delay).await;
    }

    async fn connect(&mut self) -> Result<Conn::Stream, SessionError> {
        SessionStats::bump(&self.stats.connect_attempts);
        let stream = self
            .connector
            .connect(&self.config.server_addr, self.config.io_timeout)
            .await?;
        debug!(device = %self.id, addr = %self.config.server_addr, "Connected");
        Ok(stream)
    }

    async fn handshake(&mut self, mut stream: Conn::Stream) -> Result<Conn::Stream, SessionError> {
        write_all(&mut stream, &self.id.handshake_bytes(), self.config.io_timeout).await?;

        let mut reply = [0u8; READ_BUF_LEN];
        let n = read_reply(&mut stream, &mut reply, self.config.io_timeout).await?;
        match reply[..n].first() {
            Some(&HANDSHAKE_ACCEPT) => {
                self.failures = 0;
                SessionStats::bump(&self.stats.handshakes);
                info!(device = %self.id, "Handshake accepted");
                Ok(stream)
            }
            other => Err(SessionError::HandshakeRejected(other.copied())),
        }
    }

    async fn stream_frame(&mut self, mut stream: Conn::Stream) -> Result<Conn::Stream, SessionError> {
        let distance = self
            .kinematics
            .advance_in_place(self.zone, self.config.send_interval, &mut self.rng);

        let k = &self.kinematics;
        let frame = avl_codec::encode(
            self.context.unix_millis(),
            k.latitude,
            k.longitude,
            k.course,
            k.speed,
            k.odometer,
        );
        write_all(&mut stream, &frame, self.config.io_timeout).await?;
        SessionStats::bump(&self.stats.frames_sent);
        debug!(
            device = %self.id,
            lat = k.latitude,
            lon = k.longitude,
            speed = k.speed,
            distance_m = distance,
            "Frame sent"
        );

        // Any non-empty reply counts as an ack; contents are ignored.
        let mut ack = [0u8; READ_BUF_LEN];
        if read_reply(&mut stream, &mut ack, self.config.io_timeout).await? == 0 {
            return Err(SessionError::StreamClosed);
        }

        self.context.sleep(self.config.send_interval).await;
        Ok(stream)
    }

    fn record_failure(&mut self, err: &SessionError) {
        self.failures = self.failures.saturating_add(1);
        SessionStats::bump(&self.stats.failures);
        warn!(device = %self.id, error = %err, attempt = self.failures, "Session failed, reconnecting");
    }
}

/// Writes all of `bytes`, failing if the collector stops draining for `timeout`.
async fn write_all<S: DeviceStream>(stream: &mut S, bytes: &[u8], timeout: Duration) -> Result<(), SessionError> {
    tokio::time::timeout(timeout, stream.write_all(bytes))
        .await
        .map_err(|_| EnvError::timeout(timeout))??;
    Ok(())
}

/// Reads whatever the collector sent, bounded by `timeout`.
async fn read_reply<S: DeviceStream>(stream: &mut S, buf: &mut [u8], timeout: Duration) -> Result<usize, SessionError> {
    let n = tokio::time::timeout(timeout, stream.read(buf))
        .await
        .map_err(|_| EnvError::timeout(timeout))??;
    Ok(n)
}
