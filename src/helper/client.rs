use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use super::framing::{read_frame, write_frame, FrameLimits};
use super::message::HelperPipeMessage;
use super::pipe::{is_pipe_busy, NamedPipeConnector, PipeConnector, PipeStream};
use super::RoundTripState;
use crate::error::HelperError;

/// Well-known pipe the helper listens on.
pub const DEFAULT_PIPE_NAME: &str = "AACSpeakHelper";

/// Bounded connection retry policy.
#[derive(Debug, Clone, PartialEq, Eq, Builder, Serialize, Deserialize)]
#[builder(default)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total connection attempts, including the first.
    pub max_attempts: u32,
    /// Pause between failed attempts.
    pub retry_delay_ms: u64,
    /// Longest wait for a busy pipe to free up.
    pub pipe_wait_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay_ms: 1000,
            pipe_wait_ms: 5000,
        }
    }
}

impl RetryPolicy {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn pipe_wait(&self) -> Duration {
        Duration::from_millis(self.pipe_wait_ms)
    }
}

/// How the request document is put on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FramingMode {
    /// One unframed write of the JSON document.
    #[default]
    Raw,
    /// The JSON document behind a 4-byte little-endian length prefix.
    LengthPrefixed,
}

/// Client for the external synthesis helper.
///
/// Each call is one round trip on a fresh connection:
/// `Disconnected → Connecting → Connected → Sending → Receiving → Complete | Failed`.
/// The reply is always a length-prefixed payload.
pub struct HelperProcessClient {
    pipe_name: String,
    connector: Arc<dyn PipeConnector>,
    retry: RetryPolicy,
    limits: FrameLimits,
    framing: FramingMode,
}

impl Default for HelperProcessClient {
    fn default() -> Self {
        Self::new(DEFAULT_PIPE_NAME)
    }
}

impl HelperProcessClient {
    pub fn new(pipe_name: &str) -> Self {
        Self::with_connector(pipe_name, Arc::new(NamedPipeConnector))
    }

    pub fn with_connector(pipe_name: &str, connector: Arc<dyn PipeConnector>) -> Self {
        Self {
            pipe_name: pipe_name.to_string(),
            connector,
            retry: RetryPolicy::default(),
            limits: FrameLimits::default(),
            framing: FramingMode::default(),
        }
    }

    pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn frame_limits(mut self, limits: FrameLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn framing(mut self, framing: FramingMode) -> Self {
        self.framing = framing;
        self
    }

    pub fn pipe_name(&self) -> &str {
        &self.pipe_name
    }

    /// Send a speak request and return the helper's audio payload untouched.
    pub fn synthesize(&self, message: &HelperPipeMessage) -> Result<Vec<u8>, HelperError> {
        let mut message = message.clone();
        message.args.return_audio_bytes = true;
        message.args.listvoices = false;
        self.round_trip(&message)
    }

    /// Ask the helper for its voice list.
    pub fn list_voices(&self, engine: &str) -> Result<serde_json::Value, HelperError> {
        let reply = self.round_trip(&HelperPipeMessage::list_voices(engine))?;
        Ok(serde_json::from_slice(&reply)?)
    }

    /// Connect, send `message`, and read one framed reply.
    pub fn round_trip(&self, message: &HelperPipeMessage) -> Result<Vec<u8>, HelperError> {
        let mut state = RoundTripState::Disconnected;
        let result = self.run(message, &mut state);
        match &result {
            Ok(payload) => {
                advance(&mut state, RoundTripState::Complete);
                log::info!("Helper returned {} bytes", payload.len());
            }
            Err(e) => {
                log::warn!("Helper round trip failed while {state}: {e}");
                advance(&mut state, RoundTripState::Failed);
            }
        }
        result
    }

    fn run(&self, message: &HelperPipeMessage, state: &mut RoundTripState) -> Result<Vec<u8>, HelperError> {
        let body = message.to_bytes()?;

        advance(state, RoundTripState::Connecting);
        let mut stream = self.connect()?;
        advance(state, RoundTripState::Connected);

        advance(state, RoundTripState::Sending);
        match self.framing {
            FramingMode::Raw => {
                stream
                    .write_all(&body)
                    .and_then(|_| stream.flush())
                    .map_err(|source| HelperError::Io {
                        stage: RoundTripState::Sending,
                        source,
                    })?;
            }
            FramingMode::LengthPrefixed => write_frame(&mut stream, &body)?,
        }
        log::debug!(
            "Sent {} byte request ({} characters of text)",
            body.len(),
            message.clipboard_text.chars().count()
        );

        advance(state, RoundTripState::Receiving);
        read_frame(&mut stream, &self.limits)
    }

    fn connect(&self) -> Result<Box<dyn PipeStream>, HelperError> {
        let attempts = self.retry.max_attempts.max(1);
        for attempt in 1..=attempts {
            match self.connector.connect(&self.pipe_name) {
                Ok(stream) => {
                    log::debug!("Connected to pipe '{}' on attempt {attempt}", self.pipe_name);
                    return Ok(stream);
                }
                Err(e) if is_pipe_busy(&e) => {
                    log::warn!("Pipe '{}' busy (attempt {attempt}/{attempts})", self.pipe_name);
                    if self.connector.wait_for_pipe(&self.pipe_name, self.retry.pipe_wait()) {
                        continue;
                    }
                }
                Err(e) => {
                    log::warn!(
                        "Failed to connect to pipe '{}' (attempt {attempt}/{attempts}): {e}",
                        self.pipe_name
                    );
                }
            }
            if attempt < attempts {
                std::thread::sleep(self.retry.retry_delay());
            }
        }

        Err(HelperError::ConnectExhausted {
            pipe: self.pipe_name.clone(),
            attempts,
        })
    }
}

fn advance(state: &mut RoundTripState, next: RoundTripState) {
    log::trace!("Helper round trip: {state} -> {next}");
    *state = next;
}
