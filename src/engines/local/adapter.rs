use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use super::session::{SessionFactory, SpeechSession, VitsSessionFactory};
use crate::error::{ConfigError, SynthesisError};
use crate::{AudioFormat, SampleBuffer, SynthesisBackend};

/// Rate advertised before a session reports its own.
const FALLBACK_SAMPLE_RATE: u32 = 22050;

/// Configuration document for a local neural voice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalNeuralConfig {
    /// ONNX model file.
    pub model_path: PathBuf,
    /// `tokens.txt` symbol table.
    pub tokens_path: PathBuf,
    /// Lexicon for word-based models.
    #[serde(default)]
    pub lexicon_path: Option<PathBuf>,
    /// espeak-ng data directory for Piper voices.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    #[serde(default = "default_noise_scale")]
    pub noise_scale: f32,
    #[serde(default = "default_noise_scale_w")]
    pub noise_scale_w: f32,
    #[serde(default = "default_length_scale")]
    pub length_scale: f32,
    #[serde(default = "default_num_threads")]
    pub num_threads: usize,
    /// Speaker index for multi-speaker models.
    #[serde(default)]
    pub speaker_id: i64,
    /// espeak-ng voice used for phonemization.
    #[serde(default = "default_language")]
    pub language: String,
    /// Bundled espeak-ng binary. `None` uses PATH.
    #[serde(default)]
    pub espeak_path: Option<PathBuf>,
}

fn default_noise_scale() -> f32 {
    0.667
}

fn default_noise_scale_w() -> f32 {
    0.8
}

fn default_length_scale() -> f32 {
    1.0
}

fn default_num_threads() -> usize {
    1
}

fn default_language() -> String {
    "en-us".to_string()
}

impl LocalNeuralConfig {
    pub fn new(model_path: impl Into<PathBuf>, tokens_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            tokens_path: tokens_path.into(),
            lexicon_path: None,
            data_dir: None,
            noise_scale: default_noise_scale(),
            noise_scale_w: default_noise_scale_w(),
            length_scale: default_length_scale(),
            num_threads: default_num_threads(),
            speaker_id: 0,
            language: default_language(),
            espeak_path: None,
        }
    }

    /// Check that every referenced file or directory exists.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_path(&self.model_path)?;
        require_path(&self.tokens_path)?;
        if let Some(lexicon) = &self.lexicon_path {
            require_path(lexicon)?;
        }
        if let Some(data_dir) = &self.data_dir {
            require_path(data_dir)?;
        }
        if self.num_threads == 0 {
            return Err(ConfigError::MalformedDocument(
                "numThreads must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn require_path(path: &Path) -> Result<(), ConfigError> {
    if path.as_os_str().is_empty() || !path.exists() {
        return Err(ConfigError::MissingFile(path.to_path_buf()));
    }
    Ok(())
}

/// Local neural text-to-speech backend.
///
/// The native session is built once in [`configure`](SynthesisBackend::configure)
/// and reused for every request. Generation on one session is serialized by
/// an internal lock.
///
/// ```rust,no_run
/// use sapi_tts_bridge::engines::local::LocalNeuralAdapter;
/// use sapi_tts_bridge::SynthesisBackend;
///
/// let mut backend = LocalNeuralAdapter::new();
/// backend.configure(&serde_json::json!({
///     "modelPath": "models/amy/en_US-amy-low.onnx",
///     "tokensPath": "models/amy/tokens.txt",
///     "dataDir": "models/amy/espeak-ng-data"
/// }))?;
/// let audio = backend.synthesize("Hello, world!")?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct LocalNeuralAdapter {
    config: Option<LocalNeuralConfig>,
    session: Mutex<Option<Box<dyn SpeechSession>>>,
    factory: Arc<dyn SessionFactory>,
    sample_rate: u32,
    session_info: String,
    ready: AtomicBool,
}

impl Default for LocalNeuralAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalNeuralAdapter {
    /// Create an adapter backed by the ONNX Runtime VITS session.
    pub fn new() -> Self {
        Self::with_session_factory(Arc::new(VitsSessionFactory))
    }

    /// Create an adapter that builds its session through `factory`.
    pub fn with_session_factory(factory: Arc<dyn SessionFactory>) -> Self {
        Self {
            config: None,
            session: Mutex::new(None),
            factory,
            sample_rate: FALLBACK_SAMPLE_RATE,
            session_info: String::new(),
            ready: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> Option<&LocalNeuralConfig> {
        self.config.as_ref()
    }
}

impl Drop for LocalNeuralAdapter {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl SynthesisBackend for LocalNeuralAdapter {
    fn configure(&mut self, config: &serde_json::Value) -> Result<(), ConfigError> {
        if self.is_ready() {
            return Err(ConfigError::AlreadyConfigured);
        }

        let parsed: LocalNeuralConfig = serde_json::from_value(config.clone())?;
        parsed.validate()?;
        log::info!(
            "Configuring local neural backend: model={}, tokens={}",
            parsed.model_path.display(),
            parsed.tokens_path.display()
        );

        let session = self.factory.create(&parsed)?;
        self.sample_rate = session.sample_rate();
        self.session_info = session.describe();
        log::info!("Local session ready at {} Hz", self.sample_rate);

        *self.session.lock().unwrap_or_else(|e| e.into_inner()) = Some(session);
        self.config = Some(parsed);
        self.ready.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn synthesize(&self, text: &str) -> Result<SampleBuffer, SynthesisError> {
        if !self.is_ready() {
            return Err(SynthesisError::NotReady);
        }

        let mut guard = self.session.lock().unwrap_or_else(|e| e.into_inner());
        let session = guard.as_mut().ok_or(SynthesisError::NotReady)?;

        log::debug!("Generating audio for {} characters", text.chars().count());
        let samples = session
            .generate(text)
            .map_err(|e| SynthesisError::EngineFailure(e.to_string()))?;
        if samples.is_empty() {
            return Err(SynthesisError::EngineFailure(
                "session returned no samples".to_string(),
            ));
        }

        log::debug!("Generated {} samples at {} Hz", samples.len(), self.sample_rate);
        Ok(SampleBuffer {
            samples,
            sample_rate: self.sample_rate,
        })
    }

    fn shutdown(&self) {
        let released = self
            .session
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .is_some();
        self.ready.store(false, Ordering::SeqCst);
        if released {
            log::info!("Local neural session released");
        }
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn describe(&self) -> String {
        if self.session_info.is_empty() {
            "Local neural TTS backend".to_string()
        } else {
            format!("Local neural TTS backend ({})", self.session_info)
        }
    }

    fn preferred_format(&self) -> AudioFormat {
        AudioFormat::mono16(self.sample_rate)
    }
}
