//! Tracker Fleet Simulator
//!
//! Launches a fleet of simulated GPS tracker units. Each unit keeps one TCP
//! session to a telematics collector: it identifies itself with an IMEI, then
//! streams one position frame per interval while it drives a random walk
//! inside its assigned zone.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                  SimulationSupervisor                      │
//! │      (spawns N sessions, 20 ms apart, owns FleetHandle)    │
//! │                                                            │
//! │  ┌───────────────┐  ┌───────────────┐                      │
//! │  │ DeviceSession │  │ DeviceSession │   ...                │
//! │  │  #1 (North)   │  │ #71 (Central) │                      │
//! │  └───────┬───────┘  └───────┬───────┘                      │
//! │          │ TrackerContext   │ Connector                    │
//! └──────────┼──────────────────┼──────────────────────────────┘
//!            ▼                  ▼
//!     TokioContext/TcpConnector  or  SimContext/SimConnector
//!            │                          │
//!     remote collector           serve_device (PeerBehavior)
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use tracker_sim::{FleetConfig, SimulationSupervisor};
//! use tracker_env::{TcpConnector, TokioContext};
//!
//! let config = FleetConfig::default().with_device_count(10);
//! let supervisor = SimulationSupervisor::new(config, TokioContext::shared(), Arc::new(TcpConnector));
//! let fleet = supervisor.launch().await;
//! tokio::signal::ctrl_c().await?;
//! let summary = fleet.shutdown().await;
//! ```

mod backoff;
mod context;
mod network;
mod session;
mod supervisor;
pub mod collector;
pub mod scenarios;

pub use backoff::{Backoff, ConstantBackoff, ExponentialBackoff};
pub use collector::{serve_device, CollectedFrame, Collector, CollectorError};
pub use context::SimContext;
pub use network::SimConnector;
pub use scenarios::PeerBehavior;
pub use session::{DeviceSession, SessionError, SessionSnapshot, SessionState, SessionStats};
pub use supervisor::{FleetConfig, FleetHandle, FleetSummary, SimulationSupervisor};
