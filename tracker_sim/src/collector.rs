//! Loopback collector - a minimal server side of the tracker protocol.
//!
//! Used both as a demo target for the fleet (`tracker-sim collect`) and as the
//! scripted peer behind `SimConnector`. Each connection is served by
//! `serve_device`, which works over any async byte stream.

use crate::scenarios::PeerBehavior;
use std::io;
use std::net::SocketAddr;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracker_core::avl_codec::{decode_frame, frame_remainder_len, HEADER_LEN};
use tracker_core::{AvlRecord, CodecError};

/// Handshake reply that accepts a device.
pub const HANDSHAKE_ACCEPT: u8 = 0x01;

/// Longest identity the collector will read.
const MAX_IDENTITY_LEN: usize = 64;

/// Largest frame the collector will buffer, header and checksum included.
pub const MAX_FRAME_LEN: usize = 1280;

/// Errors raised while serving one device connection.
#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Malformed frame: {0}")]
    Codec(#[from] CodecError),

    #[error("Identity length {0} exceeds 64 bytes")]
    IdentityTooLong(usize),

    #[error("Identity is not ASCII")]
    IdentityNotAscii,

    #[error("Frame of {0} bytes exceeds 1280")]
    FrameTooLong(usize),
}

/// A decoded frame tagged with the sender's identity.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectedFrame {
    pub imei: String,
    pub record: AvlRecord,
}

/// Sink for decoded frames.
pub type FrameObserver = mpsc::UnboundedSender<CollectedFrame>;

async fn read_identity<S: AsyncRead + Unpin>(stream: &mut S) -> Result<String, CollectorError> {
    let len = stream.read_u16().await? as usize;
    if len > MAX_IDENTITY_LEN {
        return Err(CollectorError::IdentityTooLong(len));
    }
    let mut raw = vec![0u8; len];
    stream.read_exact(&mut raw).await?;
    if !raw.is_ascii() {
        return Err(CollectorError::IdentityNotAscii);
    }
    Ok(raw.into_iter().map(char::from).collect())
}

/// Reads one frame. Returns `None` if the device closed between frames.
async fn read_frame<S: AsyncRead + Unpin>(stream: &mut S) -> Result<Option<Vec<u8>>, CollectorError> {
    let mut header = [0u8; HEADER_LEN];
    match stream.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let remainder = frame_remainder_len(&header)?;
    let total = HEADER_LEN.saturating_add(remainder);
    if total > MAX_FRAME_LEN {
        return Err(CollectorError::FrameTooLong(total));
    }
    let mut frame = Vec::with_capacity(total);
    frame.extend_from_slice(&header);
    frame.resize(total, 0);
    stream.read_exact(&mut frame[HEADER_LEN..]).await?;
    Ok(Some(frame))
}

/// Serves a single device connection according to `behavior`.
///
/// Returns the number of frames acknowledged.
pub async fn serve_device<S>(
    mut stream: S,
    behavior: PeerBehavior,
    observer: Option<FrameObserver>,
) -> Result<u32, CollectorError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if behavior == PeerBehavior::Refuse {
        return Ok(0);
    }

    let imei = read_identity(&mut stream).await?;

    match behavior {
        PeerBehavior::Reject(code) => {
            debug!(%imei, code, "Rejecting handshake");
            stream.write_all(&[code]).await?;
            return Ok(0);
        }
        PeerBehavior::Silent => {
            // Hold the connection until the device gives up.
            let mut sink = [0u8; 256];
            while stream.read(&mut sink).await? > 0 {}
            return Ok(0);
        }
        _ => {}
    }

    stream.write_all(&[HANDSHAKE_ACCEPT]).await?;
    info!(%imei, "Device accepted");

    let mut acked = 0u32;
    while let Some(frame) = read_frame(&mut stream).await? {
        let record = decode_frame(&frame)?;
        debug!(
            %imei,
            lat = record.latitude(),
            lon = record.longitude(),
            speed = record.speed,
            odometer = record.odometer(),
            "Frame received"
        );

        if let Some(tx) = &observer {
            let _ = tx.send(CollectedFrame { imei: imei.clone(), record });
        }

        if let PeerBehavior::CloseAfter(limit) = behavior {
            if acked + 1 >= limit {
                debug!(%imei, acked, "Closing after frame limit");
                return Ok(acked);
            }
        }

        // Acknowledge with the number of accepted records.
        stream.write_u32(1).await?;
        acked += 1;
    }

    debug!(%imei, acked, "Device disconnected");
    Ok(acked)
}

/// TCP collector that serves every accepted connection with one behavior.
pub struct Collector {
    listener: TcpListener,
    behavior: PeerBehavior,
    observer: Option<FrameObserver>,
}

impl Collector {
    /// Binds a collector on `addr` (use port 0 for an ephemeral port).
    pub async fn bind(addr: &str, behavior: PeerBehavior) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            behavior,
            observer: None,
        })
    }

    /// Forwards every decoded frame to `observer`.
    pub fn with_observer(mut self, observer: FrameObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Address the collector is listening on.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept loop. Runs until the task is dropped or accept fails.
    pub async fn run(self) -> io::Result<()> {
        info!(addr = %self.listener.local_addr()?, behavior = %self.behavior, "Collector listening");
        loop {
            let (stream, peer) = self.listener.accept().await?;
            let behavior = self.behavior;
            let observer = self.observer.clone();
            tokio::spawn(async move {
                if let Err(e) = serve_device(stream, behavior, observer).await {
                    warn!(%peer, error = %e, "Connection handler error");
                }
            });
        }
    }
}
