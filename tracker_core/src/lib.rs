//! Tracker Core - GPS tracker fleet telemetry primitives
//!
//! Pure, I/O-free building blocks for simulating AVL tracking units:
//! 1. **Geo zones**: static hub tables and the operating-area geofence
//! 2. **Trajectory**: constrained random walk with geofence teleport
//! 3. **AVL codec**: Codec 8 style frame encoding with a CRC16/ARC trailer

pub mod avl_codec;
pub mod geo_zones;
pub mod trajectory;

// Re-export key types for convenience
pub use avl_codec::{crc16_arc, decode_frame, encode, encode_frame, AvlRecord, CodecError, IoElement, IoValue};
pub use geo_zones::{operating_area, within_operating_area, Zone};
pub use trajectory::{advance, KinematicState, Step};
