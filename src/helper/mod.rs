//! IPC client for the external synthesis helper process.
//!
//! The helper listens on a well-known named pipe. A request is a UTF-8 JSON
//! [`HelperPipeMessage`]; the reply is a 4-byte little-endian length followed
//! by that many bytes of audio.

pub mod client;
pub mod framing;
pub mod message;
pub mod pipe;

use std::fmt;

pub use client::{
    FramingMode, HelperProcessClient, RetryPolicy, RetryPolicyBuilder, DEFAULT_PIPE_NAME,
};
pub use framing::FrameLimits;
pub use message::{HelperArgs, HelperPipeMessage};
pub use pipe::{NamedPipeConnector, PipeConnector, PipeStream};

/// Progress of a single helper round trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundTripState {
    Disconnected,
    Connecting,
    Connected,
    Sending,
    Receiving,
    Complete,
    Failed,
}

impl fmt::Display for RoundTripState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RoundTripState::Disconnected => "disconnected",
            RoundTripState::Connecting => "connecting",
            RoundTripState::Connected => "connected",
            RoundTripState::Sending => "sending",
            RoundTripState::Receiving => "receiving",
            RoundTripState::Complete => "complete",
            RoundTripState::Failed => "failed",
        })
    }
}
