//! Conversions between normalized float sample buffers and 16-bit PCM framed
//! with the minimal 44-byte RIFF/WAVE header.
//!
//! # Header layout
//!
//! | Offset | Size | Field |
//! |---|---|---|
//! | 0 | 4 | `RIFF` |
//! | 4 | 4 | total length - 8 |
//! | 8 | 4 | `WAVE` |
//! | 12 | 4 | `fmt ` |
//! | 16 | 4 | format chunk size (16) |
//! | 20 | 2 | format tag (1 = PCM) |
//! | 22 | 2 | channels (1) |
//! | 24 | 4 | sample rate |
//! | 28 | 4 | byte rate |
//! | 32 | 2 | block align |
//! | 34 | 2 | bits per sample (16) |
//! | 36 | 4 | `data` |
//! | 40 | 4 | payload length |
//!
//! Positive samples scale by 32767 and negative samples by 32768, so the full
//! signed 16-bit range is reachable and a clamped `-1.0` lands on `i16::MIN`.

use crate::error::FormatError;
use crate::SampleBuffer;

/// Size of the fixed container header.
pub const HEADER_LEN: usize = 44;

const PCM_FORMAT_TAG: u16 = 1;
const BITS_PER_SAMPLE: u16 = 16;
const CHANNELS: u16 = 1;

/// Fields read back from a container header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavHeader {
    pub format_tag: u16,
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    pub data_len: u32,
}

/// PCM bytes wrapped in the container header, ready for the host or the pipe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedAudio {
    bytes: Vec<u8>,
}

impl EncodedAudio {
    /// Wrap bytes produced elsewhere (e.g. pre-encoded helper output) without inspection.
    pub fn from_raw(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Parse the header, if the bytes carry one.
    pub fn header(&self) -> Option<WavHeader> {
        parse_header(&self.bytes).ok()
    }
}

/// Encode float samples as mono 16-bit PCM with a 44-byte header.
pub fn encode_pcm16(buffer: &SampleBuffer) -> EncodedAudio {
    let data_len = buffer.samples.len() * 2;
    let mut bytes = Vec::with_capacity(HEADER_LEN + data_len);

    let block_align = CHANNELS * BITS_PER_SAMPLE / 8;
    let byte_rate = buffer.sample_rate * u32::from(block_align);

    bytes.extend_from_slice(b"RIFF");
    bytes.extend_from_slice(&((HEADER_LEN - 8 + data_len) as u32).to_le_bytes());
    bytes.extend_from_slice(b"WAVE");
    bytes.extend_from_slice(b"fmt ");
    bytes.extend_from_slice(&16u32.to_le_bytes());
    bytes.extend_from_slice(&PCM_FORMAT_TAG.to_le_bytes());
    bytes.extend_from_slice(&CHANNELS.to_le_bytes());
    bytes.extend_from_slice(&buffer.sample_rate.to_le_bytes());
    bytes.extend_from_slice(&byte_rate.to_le_bytes());
    bytes.extend_from_slice(&block_align.to_le_bytes());
    bytes.extend_from_slice(&BITS_PER_SAMPLE.to_le_bytes());
    bytes.extend_from_slice(b"data");
    bytes.extend_from_slice(&(data_len as u32).to_le_bytes());

    for &sample in &buffer.samples {
        bytes.extend_from_slice(&float_to_pcm16(sample).to_le_bytes());
    }

    EncodedAudio { bytes }
}

/// Decode a buffer produced by [`encode_pcm16`] (or any 16-bit mono container
/// with the same fixed header) back into normalized floats.
pub fn decode_pcm16(bytes: &[u8]) -> Result<SampleBuffer, FormatError> {
    let header = parse_header(bytes)?;
    let samples = pcm16_samples(&bytes[HEADER_LEN..])?
        .into_iter()
        .map(pcm16_to_float)
        .collect();

    Ok(SampleBuffer {
        samples,
        sample_rate: header.sample_rate,
    })
}

/// Read and validate the fixed 44-byte header.
pub fn parse_header(bytes: &[u8]) -> Result<WavHeader, FormatError> {
    if bytes.len() < HEADER_LEN {
        return Err(FormatError::TooShort(bytes.len()));
    }

    for (offset, expected) in [(0, "RIFF"), (8, "WAVE"), (12, "fmt "), (36, "data")] {
        if &bytes[offset..offset + 4] != expected.as_bytes() {
            return Err(FormatError::BadMarker { offset, expected });
        }
    }

    let header = WavHeader {
        format_tag: read_u16(bytes, 20),
        channels: read_u16(bytes, 22),
        sample_rate: read_u32(bytes, 24),
        bits_per_sample: read_u16(bytes, 34),
        data_len: read_u32(bytes, 40),
    };

    if header.bits_per_sample != BITS_PER_SAMPLE {
        return Err(FormatError::UnsupportedBitDepth(header.bits_per_sample));
    }

    Ok(header)
}

/// Sample rate field at offset 24, read without validating the markers.
///
/// Cloud services occasionally emit containers with extra chunk padding, so
/// only the length is checked here.
pub fn header_sample_rate(bytes: &[u8]) -> Result<u32, FormatError> {
    if bytes.len() < HEADER_LEN {
        return Err(FormatError::TooShort(bytes.len()));
    }
    Ok(read_u32(bytes, 24))
}

/// Split a raw little-endian PCM payload into signed 16-bit samples.
pub fn pcm16_samples(payload: &[u8]) -> Result<Vec<i16>, FormatError> {
    if payload.len() % 2 != 0 {
        return Err(FormatError::OddPayload(payload.len()));
    }
    Ok(payload
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect())
}

/// Clamp to [-1, 1] and scale into the signed 16-bit range, truncating toward zero.
pub fn float_to_pcm16(sample: f32) -> i16 {
    let clamped = if sample.is_nan() {
        0.0
    } else {
        sample.clamp(-1.0, 1.0)
    };
    if clamped < 0.0 {
        (clamped * 32768.0) as i16
    } else {
        (clamped * 32767.0) as i16
    }
}

/// Inverse of [`float_to_pcm16`].
pub fn pcm16_to_float(sample: i16) -> f32 {
    if sample < 0 {
        f32::from(sample) / 32768.0
    } else {
        f32::from(sample) / 32767.0
    }
}

fn read_u16(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}
