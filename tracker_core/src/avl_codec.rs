//! AVL packet codec - Codec 8 style telemetry frames with a CRC16/ARC trailer.
//!
//! # Frame layout (big-endian throughout)
//!
//! ```text
//! ┌──────────┬──────────┬─────────────────────────────┬───────┬──────────┐
//! │ preamble │ data len │ codec id | count | record   │ count │ checksum │
//! │   4 B=0  │   4 B    │ AVL body + IO block (len B) │  1 B  │   4 B    │
//! └──────────┴──────────┴─────────────────────────────┴───────┴──────────┘
//! ```
//!
//! The checksum covers everything after the 8-byte prefix. It is a 16-bit CRC
//! written into a 4-byte field; conventional Codec 8 collectors read the CRC
//! from the low two bytes of that field, which is what we emit.

use bytes::{Buf, BufMut, BytesMut};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Codec identifier written after the length prefix.
pub const CODEC_ID: u8 = 0x08;
/// Satellites-in-view reported with every record.
pub const SATELLITES: u8 = 10;
/// Fixed-point scale applied to latitude and longitude.
pub const COORD_SCALE: f64 = 10_000_000.0;

/// Digital input 1 (ignition).
pub const IO_IGNITION: u8 = 239;
/// External power supply voltage (mV).
pub const IO_EXTERNAL_VOLTAGE: u8 = 66;
/// Backup battery voltage (mV).
pub const IO_BATTERY_VOLTAGE: u8 = 67;
/// Total odometer (m).
pub const IO_ODOMETER: u8 = 16;
/// Constant voltage reported for both supplies.
pub const NOMINAL_VOLTAGE_MV: u16 = 12_500;

/// Preamble plus data-length prefix.
pub const HEADER_LEN: usize = 8;
/// Width of the checksum trailer.
///
/// Holds a 16-bit CRC. Some collectors expect a 2-byte trailer instead; check
/// the target server before narrowing this.
pub const CHECKSUM_FIELD_LEN: usize = 4;

/// Errors produced while decoding a frame.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    /// Fewer bytes than the layout requires
    #[error("Truncated frame: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },

    /// Preamble was not four zero bytes
    #[error("Invalid preamble: {0:#010x}")]
    BadPreamble(u32),

    /// Declared data length disagrees with the frame size
    #[error("Data length mismatch: header says {declared}, frame carries {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    /// Unsupported codec id
    #[error("Unknown codec id: {0:#04x}")]
    UnknownCodec(u8),

    /// Leading and trailing record counts disagree or are not 1
    #[error("Record count mismatch: leading {leading}, trailing {trailing}")]
    RecordCount { leading: u8, trailing: u8 },

    /// CRC over the payload did not match the trailer
    #[error("Checksum mismatch: computed {computed:#06x}, frame carries {received:#010x}")]
    Checksum { computed: u16, received: u32 },
}

/// Value of a single IO element, tagged by its wire width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IoValue {
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
}

impl IoValue {
    /// Width of the value on the wire.
    pub fn width(&self) -> usize {
        match self {
            IoValue::U8(_) => 1,
            IoValue::U16(_) => 2,
            IoValue::U32(_) => 4,
            IoValue::U64(_) => 8,
        }
    }

    fn put(&self, buf: &mut BytesMut) {
        match *self {
            IoValue::U8(v) => buf.put_u8(v),
            IoValue::U16(v) => buf.put_u16(v),
            IoValue::U32(v) => buf.put_u32(v),
            IoValue::U64(v) => buf.put_u64(v),
        }
    }
}

/// A typed auxiliary reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IoElement {
    pub id: u8,
    pub value: IoValue,
}

/// A single AVL telemetry sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvlRecord {
    /// Sample time (Unix milliseconds)
    pub timestamp_ms: u64,

    /// Record priority (always 0 for periodic reports)
    pub priority: u8,

    /// Longitude in degrees × 1e7
    pub longitude_e7: i32,

    /// Latitude in degrees × 1e7
    pub latitude_e7: i32,

    /// Altitude in meters
    pub altitude: i16,

    /// Heading in whole degrees
    pub course: i16,

    /// Satellites in view
    pub satellites: u8,

    /// Speed in whole km/h
    pub speed: i16,

    /// Event IO id (0 = periodic)
    pub event_io_id: u8,

    /// IO elements in wire order
    pub io: Vec<IoElement>,
}

impl AvlRecord {
    /// Builds a periodic record with the fixed tracker IO set.
    ///
    /// Scaled and whole-unit fields truncate toward zero.
    pub fn new(
        timestamp_ms: u64,
        latitude: f64,
        longitude: f64,
        course: f64,
        speed_kmh: f64,
        odometer_m: f64,
    ) -> Self {
        Self {
            timestamp_ms,
            priority: 0,
            longitude_e7: (longitude * COORD_SCALE) as i32,
            latitude_e7: (latitude * COORD_SCALE) as i32,
            altitude: 0,
            course: course as i16,
            satellites: SATELLITES,
            speed: speed_kmh as i16,
            event_io_id: 0,
            io: vec![
                IoElement { id: IO_IGNITION, value: IoValue::U8(1) },
                IoElement { id: IO_EXTERNAL_VOLTAGE, value: IoValue::U16(NOMINAL_VOLTAGE_MV) },
                IoElement { id: IO_BATTERY_VOLTAGE, value: IoValue::U16(NOMINAL_VOLTAGE_MV) },
                IoElement { id: IO_ODOMETER, value: IoValue::U32(odometer_m as u32) },
            ],
        }
    }

    /// Latitude in degrees.
    pub fn latitude(&self) -> f64 {
        self.latitude_e7 as f64 / COORD_SCALE
    }

    /// Longitude in degrees.
    pub fn longitude(&self) -> f64 {
        self.longitude_e7 as f64 / COORD_SCALE
    }

    /// Looks up an IO element by id.
    pub fn io_value(&self, id: u8) -> Option<IoValue> {
        self.io.iter().find(|e| e.id == id).map(|e| e.value)
    }

    /// Odometer reading in meters, if present.
    pub fn odometer(&self) -> Option<u32> {
        match self.io_value(IO_ODOMETER)? {
            IoValue::U32(v) => Some(v),
            _ => None,
        }
    }

    fn put_io_block(&self, buf: &mut BytesMut) {
        buf.put_u8(self.event_io_id);
        buf.put_u8(self.io.len() as u8);
        for width in [1, 2, 4, 8] {
            let group: Vec<&IoElement> =
                self.io.iter().filter(|e| e.value.width() == width).collect();
            buf.put_u8(group.len() as u8);
            for element in group {
                buf.put_u8(element.id);
                element.value.put(buf);
            }
        }
    }
}

/// CRC-16/ARC: reflected 0xA001 polynomial, zero initial register.
pub fn crc16_arc(data: &[u8]) -> u16 {
    let mut crc: u16 = 0;
    for &byte in data {
        crc ^= byte as u16;
        for _ in 0..8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ 0xA001;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

/// Serializes a record into a complete frame including the checksum trailer.
pub fn encode_frame(record: &AvlRecord) -> Vec<u8> {
    let mut data = BytesMut::with_capacity(64);
    data.put_u8(CODEC_ID);
    data.put_u8(1);
    data.put_u64(record.timestamp_ms);
    data.put_u8(record.priority);
    data.put_i32(record.longitude_e7);
    data.put_i32(record.latitude_e7);
    data.put_i16(record.altitude);
    data.put_i16(record.course);
    data.put_u8(record.satellites);
    data.put_i16(record.speed);
    record.put_io_block(&mut data);

    let mut frame = BytesMut::with_capacity(HEADER_LEN + data.len() + 1 + CHECKSUM_FIELD_LEN);
    frame.put_u32(0);
    frame.put_u32(data.len() as u32);
    frame.put_slice(&data);
    frame.put_u8(1);

    let crc = crc16_arc(&frame[HEADER_LEN..]);
    frame.put_u32(crc as u32);
    frame.to_vec()
}

/// Convenience wrapper: builds the periodic record and encodes it.
pub fn encode(
    timestamp_ms: u64,
    latitude: f64,
    longitude: f64,
    course: f64,
    speed_kmh: f64,
    odometer_m: f64,
) -> Vec<u8> {
    encode_frame(&AvlRecord::new(
        timestamp_ms,
        latitude,
        longitude,
        course,
        speed_kmh,
        odometer_m,
    ))
}

/// Reads the data-length field from an 8-byte frame header.
///
/// Returns the number of bytes that follow the header (data, trailing count
/// and checksum).
pub fn frame_remainder_len(header: &[u8; HEADER_LEN]) -> Result<usize, CodecError> {
    let mut buf = &header[..];
    let preamble = buf.get_u32();
    if preamble != 0 {
        return Err(CodecError::BadPreamble(preamble));
    }
    Ok(buf.get_u32() as usize + 1 + CHECKSUM_FIELD_LEN)
}

fn need(buf: &[u8], needed: usize) -> Result<(), CodecError> {
    if buf.remaining() < needed {
        return Err(CodecError::Truncated { needed, available: buf.remaining() });
    }
    Ok(())
}

/// Parses and validates a complete frame.
pub fn decode_frame(frame: &[u8]) -> Result<AvlRecord, CodecError> {
    need(frame, HEADER_LEN)?;
    let mut header = [0u8; HEADER_LEN];
    header.copy_from_slice(&frame[..HEADER_LEN]);
    let expected = HEADER_LEN + frame_remainder_len(&header)?;
    need(frame, expected)?;
    if frame.len() != expected {
        return Err(CodecError::LengthMismatch {
            declared: expected - HEADER_LEN - 1 - CHECKSUM_FIELD_LEN,
            actual: frame.len() - HEADER_LEN - 1 - CHECKSUM_FIELD_LEN,
        });
    }

    let checked = &frame[HEADER_LEN..expected - CHECKSUM_FIELD_LEN];
    let received = (&frame[expected - CHECKSUM_FIELD_LEN..]).get_u32();
    let computed = crc16_arc(checked);
    if received != computed as u32 {
        return Err(CodecError::Checksum { computed, received });
    }

    let data_len = checked.len() - 1;
    let mut buf = &checked[..data_len];
    let trailing = checked[data_len];

    need(buf, 2)?;
    let codec = buf.get_u8();
    if codec != CODEC_ID {
        return Err(CodecError::UnknownCodec(codec));
    }
    let leading = buf.get_u8();
    if leading != 1 || trailing != 1 {
        return Err(CodecError::RecordCount { leading, trailing });
    }

    need(buf, 24)?;
    let timestamp_ms = buf.get_u64();
    let priority = buf.get_u8();
    let longitude_e7 = buf.get_i32();
    let latitude_e7 = buf.get_i32();
    let altitude = buf.get_i16();
    let course = buf.get_i16();
    let satellites = buf.get_u8();
    let speed = buf.get_i16();

    need(buf, 2)?;
    let event_io_id = buf.get_u8();
    let _total = buf.get_u8();
    let mut io = Vec::new();
    for width in [1usize, 2, 4, 8] {
        need(buf, 1)?;
        let count = buf.get_u8() as usize;
        need(buf, count * (1 + width))?;
        for _ in 0..count {
            let id = buf.get_u8();
            let value = match width {
                1 => IoValue::U8(buf.get_u8()),
                2 => IoValue::U16(buf.get_u16()),
                4 => IoValue::U32(buf.get_u32()),
                _ => IoValue::U64(buf.get_u64()),
            };
            io.push(IoElement { id, value });
        }
    }

    Ok(AvlRecord {
        timestamp_ms,
        priority,
        longitude_e7,
        latitude_e7,
        altitude,
        course,
        satellites,
        speed,
        event_io_id,
        io,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    const FIXED_TS: u64 = 1_700_000_000_000;

    // Frame for lat=13.7563 lon=100.5018 speed=100 course=50 odo=50000 at FIXED_TS.
    const GOLDEN_FRAME: &str = "000000000000002d08010000018bcfe56800003be75b9008330b78000000320a00640004\
                                01ef01024230d44330d401100000c3500001000014fa";

    fn hex(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }

    fn fixed_frame(ts: u64) -> Vec<u8> {
        encode(ts, 13.7563, 100.5018, 50.0, 100.0, 50_000.0)
    }

    #[test]
    fn test_crc_empty_is_zero() {
        assert_eq!(crc16_arc(&[]), 0);
    }

    #[test]
    fn test_crc_reference_vector() {
        assert_eq!(crc16_arc(b"123456789"), 0xBB3D);
        assert_eq!(crc16_arc(&[0x01]), 0xC0C1);
    }

    proptest! {
        #[test]
        fn prop_crc_ignores_leading_zeros(data in prop::collection::vec(any::<u8>(), 0..64), zeros in 0usize..16) {
            let mut padded = vec![0u8; zeros];
            padded.extend_from_slice(&data);
            prop_assert_eq!(crc16_arc(&padded), crc16_arc(&data));
        }

        #[test]
        fn prop_crc_linear_over_xor(
            a in prop::collection::vec(any::<u8>(), 16),
            b in prop::collection::vec(any::<u8>(), 16),
        ) {
            // Zero initial register makes the CRC linear: crc(a ^ b) == crc(a) ^ crc(b).
            let x: Vec<u8> = a.iter().zip(&b).map(|(p, q)| p ^ q).collect();
            prop_assert_eq!(crc16_arc(&x), crc16_arc(&a) ^ crc16_arc(&b));
        }
    }

    #[test]
    fn test_golden_frame() {
        let frame = fixed_frame(FIXED_TS);
        assert_eq!(frame.len(), 58);
        assert_eq!(hex(&frame), GOLDEN_FRAME.replace(' ', ""));
    }

    #[test]
    fn test_frame_layout() {
        let frame = fixed_frame(FIXED_TS);
        assert_eq!(&frame[0..4], &[0, 0, 0, 0]);
        assert_eq!(u32::from_be_bytes(frame[4..8].try_into().unwrap()), 45);
        assert_eq!(frame[8], CODEC_ID);
        assert_eq!(frame[9], 1);
        assert_eq!(u64::from_be_bytes(frame[10..18].try_into().unwrap()), FIXED_TS);
        assert_eq!(frame[18], 0);
        assert_eq!(
            i32::from_be_bytes(frame[19..23].try_into().unwrap()),
            (100.5018 * COORD_SCALE) as i32
        );
        assert_eq!(
            i32::from_be_bytes(frame[23..27].try_into().unwrap()),
            (13.7563 * COORD_SCALE) as i32
        );
        assert_eq!(frame[31], SATELLITES);
        assert_eq!(i16::from_be_bytes(frame[32..34].try_into().unwrap()), 100);
        assert_eq!(frame[53], 1);

        let crc = crc16_arc(&frame[8..54]);
        assert_eq!(&frame[54..], &(crc as u32).to_be_bytes());
    }

    #[test]
    fn test_encode_deterministic_except_timestamp() {
        assert_eq!(fixed_frame(FIXED_TS), fixed_frame(FIXED_TS));

        let a = fixed_frame(FIXED_TS);
        let b = fixed_frame(FIXED_TS + 29_000);
        assert_eq!(a.len(), b.len());
        for (i, (x, y)) in a.iter().zip(&b).enumerate() {
            if x != y {
                assert!(
                    (10..18).contains(&i) || i >= 54,
                    "byte {i} differs outside timestamp and checksum"
                );
            }
        }
    }

    #[test]
    fn test_truncation_toward_zero() {
        let record = AvlRecord::new(0, 10.0, 100.0, 359.9, 139.7, 50_000.9);
        assert_eq!(record.course, 359);
        assert_eq!(record.speed, 139);
        assert_eq!(record.odometer(), Some(50_000));
    }

    #[test]
    fn test_decode_recovers_record() {
        let record = AvlRecord::new(FIXED_TS, 13.7563, 100.5018, 50.0, 100.0, 50_000.0);
        let decoded = decode_frame(&encode_frame(&record)).unwrap();
        assert_eq!(decoded, record);
        assert_relative_eq!(decoded.latitude(), 13.7563, epsilon = 1e-6);
        assert_relative_eq!(decoded.longitude(), 100.5018, epsilon = 1e-6);
        assert_eq!(decoded.io_value(IO_IGNITION), Some(IoValue::U8(1)));
        assert_eq!(decoded.io_value(IO_BATTERY_VOLTAGE), Some(IoValue::U16(12_500)));
    }

    #[test]
    fn test_decode_rejects_corruption() {
        let mut frame = fixed_frame(FIXED_TS);
        frame[30] ^= 0xFF;
        assert!(matches!(decode_frame(&frame), Err(CodecError::Checksum { .. })));

        let mut frame = fixed_frame(FIXED_TS);
        frame[0] = 1;
        assert!(matches!(decode_frame(&frame), Err(CodecError::BadPreamble(_))));

        let frame = fixed_frame(FIXED_TS);
        assert!(matches!(
            decode_frame(&frame[..40]),
            Err(CodecError::Truncated { needed: 58, available: 40 })
        ));

        let mut frame = fixed_frame(FIXED_TS);
        frame.push(0);
        assert!(matches!(decode_frame(&frame), Err(CodecError::LengthMismatch { .. })));
    }

    #[test]
    fn test_frame_remainder_len() {
        let frame = fixed_frame(FIXED_TS);
        let header: [u8; HEADER_LEN] = frame[..HEADER_LEN].try_into().unwrap();
        assert_eq!(frame_remainder_len(&header).unwrap(), 50);
    }
}
