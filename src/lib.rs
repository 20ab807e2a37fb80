//! # sapi-tts-bridge
//!
//! The engine side of a SAPI text-to-speech voice. Host-facing facades accept
//! SAPI-style speak requests and dispatch them to one of several
//! interchangeable synthesis backends.
//!
//! ## Features
//!
//! - **Local neural voices**: VITS/Piper ONNX models with espeak-ng phonemization (`vits`)
//! - **Cloud voices**: Azure Speech over REST (`azure`)
//! - **Helper process**: length-framed requests to an external synthesis helper over a named pipe
//! - **Fallback chain**: registry backend, one-shot local backend, helper process, on-disk worker
//! - **SAPI surface**: [`sapi::TtsEngine`] and [`sapi::SpeechVoice`] model the engine and voice objects
//!
//! ## Quick Start
//!
//! ```toml
//! [dependencies]
//! sapi-tts-bridge = { version = "2026.2", features = ["vits"] }
//! ```
//!
//! ```ignore
//! use std::sync::Arc;
//! use sapi_tts_bridge::{BackendRegistry, router::{RouterOptions, SynthesisRequestRouter, SpeakRequest}};
//!
//! let registry = Arc::new(BackendRegistry::new());
//! registry.load_configuration("engines_config.json".as_ref())?;
//!
//! let router = SynthesisRequestRouter::new(registry.clone(), RouterOptions::default());
//! router.set_voice_token(r"HKEY_LOCAL_MACHINE\SOFTWARE\Microsoft\SPEECH\Voices\Tokens\amy");
//! let audio = router.synthesize(&SpeakRequest::new("Hello, world!"))?;
//! println!("{} bytes of PCM", audio.len());
//!
//! registry.shutdown_all_engines();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod codec;
pub mod engines;
pub mod error;
pub mod helper;
pub mod logging;
pub mod registry;
pub mod router;
pub mod sapi;
pub mod settings;
pub mod worker;

pub use codec::EncodedAudio;
pub use engines::BackendKind;
pub use error::{
    BridgeError, ConfigError, FormatError, HelperError, ProtocolError, RegistryError,
    SynthesisError, WorkerError,
};
pub use registry::BackendRegistry;
pub use router::SynthesisRequestRouter;

use std::path::Path;

/// Normalized audio produced by a backend.
///
/// Samples are 32-bit floats in [-1.0, 1.0] at the backend's native rate.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
    /// Raw audio samples as f32 values
    pub samples: Vec<f32>,
    /// Sample rate reported by the backend that produced the samples
    pub sample_rate: u32,
}

impl SampleBuffer {
    /// Write the audio to a 32-bit float WAV file.
    pub fn write_wav(&self, path: &Path) -> Result<(), hound::Error> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut writer = hound::WavWriter::create(path, spec)?;
        for &sample in &self.samples {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;
        Ok(())
    }

    /// Duration of the audio in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Native output format advertised by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
}

impl AudioFormat {
    pub const fn mono16(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            channels: 1,
            bits_per_sample: 16,
        }
    }
}

/// Common interface for synthesis backends.
///
/// A backend is built unconfigured, becomes ready after one successful
/// [`configure`](SynthesisBackend::configure), and stays ready until
/// [`shutdown`](SynthesisBackend::shutdown). Configured backends are shared
/// behind `Arc`, so everything after `configure` takes `&self`.
pub trait SynthesisBackend: Send + Sync {
    /// Parse and validate a backend-specific configuration document, then
    /// build the native session.
    fn configure(&mut self, config: &serde_json::Value) -> Result<(), ConfigError>;

    /// Synthesize speech from the given text at the backend's native rate.
    fn synthesize(&self, text: &str) -> Result<SampleBuffer, SynthesisError>;

    /// Release native resources. Safe to call more than once.
    fn shutdown(&self);

    /// True only between a successful `configure` and `shutdown`.
    fn is_ready(&self) -> bool;

    /// Human-readable identity for diagnostics.
    fn describe(&self) -> String;

    /// Native output format.
    fn preferred_format(&self) -> AudioFormat;

    /// Synthesize speech and write it to a WAV file.
    ///
    /// Default implementation calls `synthesize()` then `SampleBuffer::write_wav()`.
    fn synthesize_to_file(&self, text: &str, wav_path: &Path) -> Result<(), BridgeError> {
        let buffer = self.synthesize(text)?;
        buffer
            .write_wav(wav_path)
            .map_err(|e| BridgeError::Synthesis(SynthesisError::EngineFailure(e.to_string())))
    }
}
