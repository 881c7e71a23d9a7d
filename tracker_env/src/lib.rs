//! Tracker Environment Abstraction Layer
//!
//! This crate provides the "Sans-IO" seam that lets device sessions run in
//! both **Production** (tokio + real TCP) and **Simulation** (virtual clock +
//! in-memory peers) environments.
//!
//! # Core Concept
//!
//! A session never touches the clock, the RNG or a socket directly:
//! - Time (`now()`, `system_time()`, `sleep()`)
//! - Concurrency (`spawn()`)
//! - Randomness (`device_rng()`)
//! - Network (`Connector::connect()`)
//!
//! With a seeded context a whole fleet run becomes reproducible, and hours of
//! reconnect backoff collapse into milliseconds of test time.
//!
//! # Example
//!
//! ```ignore
//! use tracker_env::{TrackerContext, Connector};
//!
//! async fn session_loop<Ctx: TrackerContext, Conn: Connector>(ctx: &Ctx, conn: &Conn) {
//!     loop {
//!         match conn.connect("127.0.0.1:5027", Duration::from_secs(1)).await {
//!             Ok(stream) => stream_frames(stream).await,
//!             Err(_) => ctx.sleep(Duration::from_secs(2)).await,
//!         }
//!     }
//! }
//! ```

mod context;
mod error;
mod network;
mod tokio_impl;
mod types;

pub use context::{mix_seed, TrackerContext};
pub use error::EnvError;
pub use network::{Connector, DeviceStream};
pub use tokio_impl::{TcpConnector, TokioContext};
pub use types::{DeviceId, IMEI_PREFIX, MAX_DEVICE_INDEX};
