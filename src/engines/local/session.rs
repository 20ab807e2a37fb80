use super::adapter::LocalNeuralConfig;
use super::error::LocalEngineError;
use crate::error::ConfigError;

/// A native inference session: built once, asked to generate many times.
pub trait SpeechSession: Send {
    /// Generate normalized float samples for the given text.
    fn generate(&mut self, text: &str) -> Result<Vec<f32>, LocalEngineError>;

    /// Output rate of the loaded model, read back after the session was created.
    fn sample_rate(&self) -> u32;

    fn describe(&self) -> String {
        "native speech session".to_string()
    }
}

/// Builds sessions from validated local configuration.
pub trait SessionFactory: Send + Sync {
    fn create(&self, config: &LocalNeuralConfig) -> Result<Box<dyn SpeechSession>, ConfigError>;
}

/// Builds ONNX Runtime sessions for VITS/Piper models.
#[derive(Debug, Clone, Copy, Default)]
pub struct VitsSessionFactory;

impl SessionFactory for VitsSessionFactory {
    #[cfg(feature = "vits")]
    fn create(&self, config: &LocalNeuralConfig) -> Result<Box<dyn SpeechSession>, ConfigError> {
        let model = super::model::VitsModel::load(config)
            .map_err(|e| ConfigError::Unsupported(format!("failed to load VITS model: {e}")))?;
        Ok(Box::new(model))
    }

    #[cfg(not(feature = "vits"))]
    fn create(&self, _config: &LocalNeuralConfig) -> Result<Box<dyn SpeechSession>, ConfigError> {
        Err(ConfigError::Unsupported(
            "local neural voices need the `vits` feature".to_string(),
        ))
    }
}
