use std::sync::Arc;

use super::adapter::CloudConfig;
use crate::error::ConfigError;

/// Result of a failed cloud request.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CloudError {
    #[error("Synthesis canceled: {0}")]
    Canceled(String),
    #[error("Synthesis failed: {0}")]
    Failed(String),
}

/// A connected cloud speech client: SSML in, encoded audio out.
pub trait CloudSpeechClient: Send + Sync {
    /// Submit one SSML document and return the container bytes (44-byte header + PCM).
    fn synthesize_ssml(&self, ssml: &str) -> Result<Vec<u8>, CloudError>;

    fn describe(&self) -> String {
        "cloud speech client".to_string()
    }
}

/// Builds clients from validated cloud configuration.
pub trait CloudClientFactory: Send + Sync {
    fn connect(&self, config: &CloudConfig) -> Result<Arc<dyn CloudSpeechClient>, ConfigError>;
}

/// Builds Azure Speech REST clients.
#[derive(Debug, Clone, Copy, Default)]
pub struct AzureClientFactory;

impl CloudClientFactory for AzureClientFactory {
    #[cfg(feature = "azure")]
    fn connect(&self, config: &CloudConfig) -> Result<Arc<dyn CloudSpeechClient>, ConfigError> {
        Ok(Arc::new(azure::AzureSpeechClient::new(config)?))
    }

    #[cfg(not(feature = "azure"))]
    fn connect(&self, _config: &CloudConfig) -> Result<Arc<dyn CloudSpeechClient>, ConfigError> {
        Err(ConfigError::Unsupported(
            "cloud voices need the `azure` feature".to_string(),
        ))
    }
}

/// `X-Microsoft-OutputFormat` value for a mono 16-bit RIFF response at
/// `sample_rate`, or `None` when the service has no such format.
pub fn riff_output_format(sample_rate: u32) -> Option<&'static str> {
    match sample_rate {
        8000 => Some("riff-8khz-16bit-mono-pcm"),
        16000 => Some("riff-16khz-16bit-mono-pcm"),
        22050 => Some("riff-22050hz-16bit-mono-pcm"),
        24000 => Some("riff-24khz-16bit-mono-pcm"),
        44100 => Some("riff-44100hz-16bit-mono-pcm"),
        48000 => Some("riff-48khz-16bit-mono-pcm"),
        _ => None,
    }
}

#[cfg(feature = "azure")]
mod azure {
    use std::time::Duration;

    use reqwest::blocking::Client;
    use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, USER_AGENT};

    use super::{riff_output_format, CloudError, CloudSpeechClient};
    use crate::engines::cloud::adapter::CloudConfig;
    use crate::error::ConfigError;

    const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

    /// Azure Speech text-to-speech over the REST endpoint.
    pub struct AzureSpeechClient {
        client: Client,
        endpoint: String,
        region: String,
    }

    impl AzureSpeechClient {
        pub fn new(config: &CloudConfig) -> Result<Self, ConfigError> {
            let mut headers = HeaderMap::new();
            headers.insert(
                "Ocp-Apim-Subscription-Key",
                HeaderValue::from_str(&config.subscription_key)
                    .map_err(|_| ConfigError::MalformedDocument("invalid subscription key".into()))?,
            );
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/ssml+xml"));
            let output_format = riff_output_format(config.sample_rate).ok_or_else(|| {
                ConfigError::MalformedDocument(format!(
                    "sampleRate {} is not supported",
                    config.sample_rate
                ))
            })?;
            headers.insert("X-Microsoft-OutputFormat", HeaderValue::from_static(output_format));
            headers.insert(USER_AGENT, HeaderValue::from_static("sapi-tts-bridge"));

            let client = Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .default_headers(headers)
                .build()
                .map_err(|e| ConfigError::Unsupported(format!("failed to create HTTP client: {e}")))?;

            Ok(Self {
                client,
                endpoint: format!(
                    "https://{}.tts.speech.microsoft.com/cognitiveservices/v1",
                    config.region
                ),
                region: config.region.clone(),
            })
        }
    }

    impl CloudSpeechClient for AzureSpeechClient {
        fn synthesize_ssml(&self, ssml: &str) -> Result<Vec<u8>, CloudError> {
            let response = self
                .client
                .post(&self.endpoint)
                .body(ssml.to_string())
                .send()
                .map_err(|e| CloudError::Failed(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                let detail = response.text().unwrap_or_default();
                return Err(if status.as_u16() == 401 || status.as_u16() == 403 {
                    CloudError::Canceled(format!("{status}: authentication rejected {detail}"))
                } else {
                    CloudError::Failed(format!("{status}: {detail}"))
                });
            }

            response
                .bytes()
                .map(|b| b.to_vec())
                .map_err(|e| CloudError::Failed(e.to_string()))
        }

        fn describe(&self) -> String {
            format!("Azure Speech REST ({})", self.region)
        }
    }
}
