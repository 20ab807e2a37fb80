use std::io::{ErrorKind, Read, Write};

use serde::{Deserialize, Serialize};

use super::RoundTripState;
use crate::error::{HelperError, ProtocolError};

/// Size of the little-endian `u32` length prefix.
pub const PREFIX_LEN: usize = 4;

/// Bounds applied to a received frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameLimits {
    /// Largest payload accepted from a peer.
    pub max_payload: usize,
    /// Size of each individual read.
    pub chunk_size: usize,
}

impl Default for FrameLimits {
    fn default() -> Self {
        Self {
            max_payload: 10 * 1024 * 1024,
            chunk_size: 64 * 1024,
        }
    }
}

/// Write `payload` behind a 4-byte little-endian length prefix.
pub fn write_frame<W: Write + ?Sized>(writer: &mut W, payload: &[u8]) -> Result<(), HelperError> {
    let len = u32::try_from(payload.len()).map_err(|_| {
        ProtocolError::OversizedPayload {
            declared: payload.len(),
            max: u32::MAX as usize,
        }
    })?;
    let mut frame = Vec::with_capacity(PREFIX_LEN + payload.len());
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(payload);
    writer.write_all(&frame).map_err(|source| HelperError::Io {
        stage: RoundTripState::Sending,
        source,
    })?;
    writer.flush().map_err(|source| HelperError::Io {
        stage: RoundTripState::Sending,
        source,
    })
}

/// Read one length-prefixed frame.
///
/// A zero or over-limit prefix fails before any payload byte is read. A peer
/// that closes mid-payload fails with [`ProtocolError::PrematureEof`].
pub fn read_frame<R: Read + ?Sized>(reader: &mut R, limits: &FrameLimits) -> Result<Vec<u8>, HelperError> {
    let mut prefix = [0u8; PREFIX_LEN];
    let got = read_full(reader, &mut prefix)?;
    if got < PREFIX_LEN {
        return Err(ProtocolError::PrematureEof {
            expected: PREFIX_LEN,
            received: got,
        }
        .into());
    }

    let declared = u32::from_le_bytes(prefix) as usize;
    if declared == 0 {
        return Err(ProtocolError::BadFraming("zero-length payload".to_string()).into());
    }
    if declared > limits.max_payload {
        return Err(ProtocolError::OversizedPayload {
            declared,
            max: limits.max_payload,
        }
        .into());
    }
    log::debug!("Expecting {declared} byte payload");

    let mut payload = Vec::with_capacity(declared);
    let mut chunk = vec![0u8; limits.chunk_size.clamp(1, declared)];
    while payload.len() < declared {
        let want = chunk.len().min(declared - payload.len());
        let n = match reader.read(&mut chunk[..want]) {
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(source) => {
                return Err(HelperError::Io {
                    stage: RoundTripState::Receiving,
                    source,
                })
            }
        };
        if n == 0 {
            log::warn!("Pipe closed after {} of {declared} bytes", payload.len());
            return Err(ProtocolError::PrematureEof {
                expected: declared,
                received: payload.len(),
            }
            .into());
        }
        payload.extend_from_slice(&chunk[..n]);
    }

    Ok(payload)
}

/// Fill `buf` as far as the reader allows; returns the byte count read.
fn read_full<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> Result<usize, HelperError> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(source) => {
                return Err(HelperError::Io {
                    stage: RoundTripState::Receiving,
                    source,
                })
            }
        }
    }
    Ok(filled)
}
