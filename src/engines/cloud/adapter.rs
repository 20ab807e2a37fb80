use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use super::client::{riff_output_format, AzureClientFactory, CloudClientFactory, CloudSpeechClient};
use super::ssml::{self, SsmlVoice};
use crate::codec::{self, HEADER_LEN};
use crate::error::{ConfigError, SynthesisError};
use crate::{AudioFormat, SampleBuffer, SynthesisBackend};

/// Configuration document for a cloud voice.
///
/// Credentials are only ever read from this document; nothing is built in.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudConfig {
    #[serde(default)]
    pub subscription_key: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub voice: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub style: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_channels")]
    pub channels: u16,
    #[serde(default = "default_bits_per_sample")]
    pub bits_per_sample: u16,
}

fn default_language() -> String {
    "en-US".to_string()
}

fn default_sample_rate() -> u32 {
    24000
}

fn default_channels() -> u16 {
    1
}

fn default_bits_per_sample() -> u16 {
    16
}

// Keeps the subscription key out of logs.
impl std::fmt::Debug for CloudConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudConfig")
            .field("subscription_key", &"<redacted>")
            .field("region", &self.region)
            .field("voice", &self.voice)
            .field("language", &self.language)
            .field("style", &self.style)
            .field("role", &self.role)
            .field("sample_rate", &self.sample_rate)
            .finish()
    }
}

impl CloudConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.subscription_key.trim().is_empty() {
            return Err(ConfigError::MissingCredential("subscriptionKey"));
        }
        if self.region.trim().is_empty() {
            return Err(ConfigError::MissingCredential("region"));
        }
        if self.voice.trim().is_empty() {
            return Err(ConfigError::MissingCredential("voice"));
        }
        if self.bits_per_sample != 16 {
            return Err(ConfigError::MalformedDocument(format!(
                "bitsPerSample {} is not supported, only 16",
                self.bits_per_sample
            )));
        }
        // Only rates the service can return as RIFF.
        if riff_output_format(self.sample_rate).is_none() {
            return Err(ConfigError::MalformedDocument(format!(
                "sampleRate {} is not supported",
                self.sample_rate
            )));
        }
        Ok(())
    }
}

/// Cloud text-to-speech backend.
///
/// Each request becomes one SSML document. The connected client is shared
/// and may serve concurrent requests.
pub struct CloudAdapter {
    config: Option<CloudConfig>,
    client: RwLock<Option<Arc<dyn CloudSpeechClient>>>,
    factory: Arc<dyn CloudClientFactory>,
    ready: AtomicBool,
}

impl Default for CloudAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl CloudAdapter {
    pub fn new() -> Self {
        Self::with_client_factory(Arc::new(AzureClientFactory))
    }

    pub fn with_client_factory(factory: Arc<dyn CloudClientFactory>) -> Self {
        Self {
            config: None,
            client: RwLock::new(None),
            factory,
            ready: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> Option<&CloudConfig> {
        self.config.as_ref()
    }

    fn current_client(&self) -> Option<Arc<dyn CloudSpeechClient>> {
        self.client
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl Drop for CloudAdapter {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Skip the container header, take the rate from it, and scale the PCM payload.
pub fn decode_cloud_audio(bytes: &[u8]) -> Result<SampleBuffer, SynthesisError> {
    let sample_rate = codec::header_sample_rate(bytes)
        .map_err(|e| SynthesisError::EngineFailure(format!("unexpected cloud audio: {e}")))?;
    let samples = codec::pcm16_samples(&bytes[HEADER_LEN..])
        .map_err(|e| SynthesisError::EngineFailure(format!("unexpected cloud audio: {e}")))?
        .into_iter()
        .map(|s| f32::from(s) / 32768.0)
        .collect();
    Ok(SampleBuffer {
        samples,
        sample_rate,
    })
}

impl SynthesisBackend for CloudAdapter {
    fn configure(&mut self, config: &serde_json::Value) -> Result<(), ConfigError> {
        if self.is_ready() {
            return Err(ConfigError::AlreadyConfigured);
        }

        let parsed: CloudConfig = serde_json::from_value(config.clone())?;
        parsed.validate()?;
        log::info!(
            "Configuring cloud backend: region={}, voice={}",
            parsed.region,
            parsed.voice
        );

        let client = self.factory.connect(&parsed)?;
        *self.client.write().unwrap_or_else(|e| e.into_inner()) = Some(client);
        self.config = Some(parsed);
        self.ready.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn synthesize(&self, text: &str) -> Result<SampleBuffer, SynthesisError> {
        let (Some(config), Some(client)) = (self.config.as_ref(), self.current_client()) else {
            return Err(SynthesisError::NotReady);
        };
        if !self.is_ready() {
            return Err(SynthesisError::NotReady);
        }

        let document = ssml::build(
            &SsmlVoice {
                name: &config.voice,
                language: &config.language,
                style: config.style.as_deref(),
                role: config.role.as_deref(),
            },
            text,
        )
        .map_err(|e| SynthesisError::EngineFailure(format!("failed to build SSML: {e}")))?;
        log::debug!("Submitting {} byte SSML document", document.len());

        let bytes = client
            .synthesize_ssml(&document)
            .map_err(|e| SynthesisError::EngineFailure(e.to_string()))?;
        let audio = decode_cloud_audio(&bytes)?;
        log::debug!(
            "Cloud returned {} samples at {} Hz",
            audio.samples.len(),
            audio.sample_rate
        );
        Ok(audio)
    }

    fn shutdown(&self) {
        let released = self
            .client
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .is_some();
        self.ready.store(false, Ordering::SeqCst);
        if released {
            log::info!("Cloud client released");
        }
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn describe(&self) -> String {
        match (self.current_client(), self.config.as_ref()) {
            (Some(client), Some(config)) => {
                format!("Cloud TTS backend ({}, voice {})", client.describe(), config.voice)
            }
            _ => "Cloud TTS backend".to_string(),
        }
    }

    fn preferred_format(&self) -> AudioFormat {
        let config = self.config.as_ref();
        AudioFormat {
            sample_rate: config.map_or(default_sample_rate(), |c| c.sample_rate),
            channels: config.map_or(default_channels(), |c| c.channels),
            bits_per_sample: config.map_or(default_bits_per_sample(), |c| c.bits_per_sample),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::cloud::CloudError;
    use std::sync::Mutex;

    struct RecordingClient {
        documents: Mutex<Vec<String>>,
        reply: Result<Vec<u8>, CloudError>,
    }

    impl CloudSpeechClient for RecordingClient {
        fn synthesize_ssml(&self, ssml: &str) -> Result<Vec<u8>, CloudError> {
            self.documents.lock().unwrap().push(ssml.to_string());
            self.reply.clone()
        }
    }

    struct FixedFactory(Arc<RecordingClient>);

    impl CloudClientFactory for FixedFactory {
        fn connect(&self, _config: &CloudConfig) -> Result<Arc<dyn CloudSpeechClient>, ConfigError> {
            Ok(self.0.clone())
        }
    }

    fn container(rate: u32, samples: &[i16]) -> Vec<u8> {
        let mut bytes = vec![0u8; HEADER_LEN];
        bytes[0..4].copy_from_slice(b"RIFF");
        bytes[24..28].copy_from_slice(&rate.to_le_bytes());
        for s in samples {
            bytes.extend_from_slice(&s.to_le_bytes());
        }
        bytes
    }

    fn adapter(reply: Result<Vec<u8>, CloudError>) -> (CloudAdapter, Arc<RecordingClient>) {
        let client = Arc::new(RecordingClient {
            documents: Mutex::new(Vec::new()),
            reply,
        });
        (
            CloudAdapter::with_client_factory(Arc::new(FixedFactory(client.clone()))),
            client,
        )
    }

    fn config() -> serde_json::Value {
        serde_json::json!({
            "subscriptionKey": "test-key",
            "region": "uksouth",
            "voice": "en-GB-LibbyNeural",
            "style": "cheerful"
        })
    }

    #[test]
    fn empty_credentials_are_rejected() {
        for (field, missing) in [
            ("subscriptionKey", "subscriptionKey"),
            ("region", "region"),
            ("voice", "voice"),
        ] {
            let mut doc = config();
            doc[field] = serde_json::json!("");
            let (mut backend, _) = adapter(Ok(Vec::new()));
            let err = backend.configure(&doc).unwrap_err();
            assert!(
                matches!(err, ConfigError::MissingCredential(name) if name == missing),
                "{field}"
            );
            assert!(!backend.is_ready());
        }
    }

    #[test]
    fn defaults_to_24k_mono_16bit() {
        let (mut backend, _) = adapter(Ok(Vec::new()));
        backend.configure(&config()).unwrap();
        assert_eq!(backend.preferred_format(), AudioFormat::mono16(24000));
        assert_eq!(backend.config().unwrap().language, "en-US");
    }

    #[test]
    fn decodes_rate_and_payload_from_container() {
        let (mut backend, client) = adapter(Ok(container(16000, &[0, 16384, -32768])));
        backend.configure(&config()).unwrap();

        let audio = backend.synthesize("Good morning").unwrap();
        assert_eq!(audio.sample_rate, 16000);
        assert_eq!(audio.samples, vec![0.0, 0.5, -1.0]);

        let documents = client.documents.lock().unwrap();
        assert_eq!(documents.len(), 1);
        assert!(documents[0].contains(r#"<voice name="en-GB-LibbyNeural">"#));
        assert!(documents[0].contains(r#"style="cheerful""#));
        assert!(documents[0].contains("Good morning"));
    }

    #[test]
    fn canceled_result_carries_detail() {
        let (mut backend, _) = adapter(Err(CloudError::Canceled("quota exceeded".into())));
        backend.configure(&config()).unwrap();
        match backend.synthesize("hi") {
            Err(SynthesisError::EngineFailure(detail)) => assert!(detail.contains("quota exceeded")),
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(backend.is_ready());
    }

    #[test]
    fn truncated_container_is_an_engine_failure() {
        let (mut backend, _) = adapter(Ok(vec![0u8; 12]));
        backend.configure(&config()).unwrap();
        assert!(matches!(
            backend.synthesize("hi"),
            Err(SynthesisError::EngineFailure(_))
        ));
    }

    #[test]
    fn unsupported_sample_rate_is_rejected() {
        let mut doc = config();
        doc["sampleRate"] = serde_json::json!(12345);
        let (mut backend, _) = adapter(Ok(container(24000, &[1])));
        assert!(matches!(
            backend.configure(&doc),
            Err(ConfigError::MalformedDocument(_))
        ));
        assert!(!backend.is_ready());

        doc["sampleRate"] = serde_json::json!(48000);
        backend.configure(&doc).unwrap();
        assert_eq!(backend.preferred_format(), AudioFormat::mono16(48000));
    }

    #[test]
    fn odd_payload_is_an_engine_failure() {
        let mut reply = container(24000, &[1, 2]);
        reply.push(7);
        let (mut backend, _) = adapter(Ok(reply));
        backend.configure(&config()).unwrap();
        assert!(matches!(
            backend.synthesize("hi"),
            Err(SynthesisError::EngineFailure(_))
        ));
    }

    #[test]
    fn reconfigure_is_rejected_until_shutdown() {
        let (mut backend, _) = adapter(Ok(container(24000, &[1])));
        backend.configure(&config()).unwrap();
        assert!(matches!(
            backend.configure(&config()),
            Err(ConfigError::AlreadyConfigured)
        ));
        backend.shutdown();
        assert!(matches!(backend.synthesize("x"), Err(SynthesisError::NotReady)));
        backend.configure(&config()).unwrap();
        assert!(backend.is_ready());
    }

    #[test]
    fn debug_output_hides_key() {
        let parsed: CloudConfig = serde_json::from_value(config()).unwrap();
        assert!(!format!("{parsed:?}").contains("test-key"));
    }
}
