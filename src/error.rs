//! Error taxonomy shared by backends, the registry, the helper-process client
//! and the request router.
//!
//! Component-local errors stay typed inside their component. At the router
//! boundary every one of them collapses into [`BridgeError`], which is the
//! only error type the host facades in [`crate::sapi`] ever see.

use std::path::PathBuf;

use crate::helper::RoundTripState;

/// Raised while a backend parses and validates its configuration document.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Required file not found: {}", .0.display())]
    MissingFile(PathBuf),
    #[error("Missing credential field '{0}'")]
    MissingCredential(&'static str),
    #[error("Malformed configuration document: {0}")]
    MalformedDocument(String),
    #[error("Unknown engine type '{0}'")]
    UnknownEngineKind(String),
    #[error("Backend is already configured; shut it down before reconfiguring")]
    AlreadyConfigured,
    #[error("Backend unavailable: {0}")]
    Unsupported(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for ConfigError {
    fn from(e: serde_json::Error) -> Self {
        ConfigError::MalformedDocument(e.to_string())
    }
}

/// Raised by `SynthesisBackend::synthesize`. Never tears down the backend session.
#[derive(thiserror::Error, Debug)]
pub enum SynthesisError {
    #[error("Backend is not ready. Configure it first.")]
    NotReady,
    #[error("Engine failure: {0}")]
    EngineFailure(String),
}

/// Framing violations on the helper pipe.
#[derive(thiserror::Error, Debug)]
pub enum ProtocolError {
    #[error("Bad framing: {0}")]
    BadFraming(String),
    #[error("Declared payload of {declared} bytes exceeds the {max} byte limit")]
    OversizedPayload { declared: usize, max: usize },
    #[error("Peer closed the pipe after {received} of {expected} bytes")]
    PrematureEof { expected: usize, received: usize },
}

/// Codec-level errors for the 44-byte container format.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum FormatError {
    #[error("Buffer of {0} bytes is shorter than the 44-byte header")]
    TooShort(usize),
    #[error("Expected marker {expected:?} at offset {offset}")]
    BadMarker { offset: usize, expected: &'static str },
    #[error("Unsupported bit depth {0}, only 16-bit PCM is handled")]
    UnsupportedBitDepth(u16),
    #[error("PCM payload length {0} is not a multiple of 2")]
    OddPayload(usize),
}

/// Failures of one helper-process round trip.
#[derive(thiserror::Error, Debug)]
pub enum HelperError {
    #[error("Could not connect to pipe '{pipe}' after {attempts} attempts")]
    ConnectExhausted { pipe: String, attempts: u32 },
    #[error("Pipe I/O failed while {stage}: {source}")]
    Io {
        stage: RoundTripState,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("Failed to encode or decode a helper document: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failures of the on-disk worker bridge.
#[derive(thiserror::Error, Debug)]
pub enum WorkerError {
    #[error("Worker executable not found: {}", .0.display())]
    MissingExecutable(PathBuf),
    #[error("Worker did not finish within {0} ms")]
    Timeout(u128),
    #[error("Worker reported failure: {0}")]
    Reported(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid worker response: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid worker audio: {0}")]
    Wav(#[from] hound::Error),
}

/// Registry-level failures.
#[derive(thiserror::Error, Debug)]
pub enum RegistryError {
    #[error("Failed to configure engine '{id}': {source}")]
    Configure {
        id: String,
        #[source]
        source: ConfigError,
    },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Failed to read configuration {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<serde_json::Error> for RegistryError {
    fn from(e: serde_json::Error) -> Self {
        RegistryError::Config(ConfigError::from(e))
    }
}

/// The single failure signal crossing the router boundary.
#[derive(thiserror::Error, Debug)]
pub enum BridgeError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Synthesis(#[from] SynthesisError),
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error(transparent)]
    Helper(#[from] HelperError),
    #[error(transparent)]
    Worker(#[from] WorkerError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("No engine available for '{0}'")]
    EngineUnavailable(String),
    #[error("Backend returned no audio")]
    EmptyAudio,
    #[error("All {attempted} fallback strategies failed")]
    ChainExhausted { attempted: usize },
    #[error("Invalid argument: {0}")]
    InvalidArgument(&'static str),
    #[error("Output site rejected audio: {0}")]
    Output(#[source] std::io::Error),
}
