#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::{self, Cursor, Read, Write};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use sapi_tts_bridge::codec::encode_pcm16;
use sapi_tts_bridge::engines::cloud::{CloudClientFactory, CloudConfig, CloudError, CloudSpeechClient};
use sapi_tts_bridge::engines::local::{LocalEngineError, LocalNeuralConfig, SessionFactory, SpeechSession};
use sapi_tts_bridge::engines::DefaultBackendFactory;
use sapi_tts_bridge::helper::{HelperProcessClient, PipeConnector, PipeStream, RetryPolicy};
use sapi_tts_bridge::{ConfigError, SampleBuffer};

/// One sample per character at 16 kHz.
pub struct ToneSession;

impl SpeechSession for ToneSession {
    fn generate(&mut self, text: &str) -> Result<Vec<f32>, LocalEngineError> {
        Ok(text.chars().map(|_| 0.25).collect())
    }

    fn sample_rate(&self) -> u32 {
        16000
    }
}

#[derive(Default)]
pub struct ToneFactory {
    pub created: AtomicUsize,
}

impl SessionFactory for ToneFactory {
    fn create(&self, _config: &LocalNeuralConfig) -> Result<Box<dyn SpeechSession>, ConfigError> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ToneSession))
    }
}

/// Replies with a fixed RIFF container at 24 kHz.
pub struct FakeCloudClient;

impl CloudSpeechClient for FakeCloudClient {
    fn synthesize_ssml(&self, _ssml: &str) -> Result<Vec<u8>, CloudError> {
        Ok(encode_pcm16(&SampleBuffer {
            samples: vec![0.5; 240],
            sample_rate: 24000,
        })
        .into_bytes())
    }
}

pub struct FakeCloudFactory;

impl CloudClientFactory for FakeCloudFactory {
    fn connect(&self, _config: &CloudConfig) -> Result<Arc<dyn CloudSpeechClient>, ConfigError> {
        Ok(Arc::new(FakeCloudClient))
    }
}

pub fn fake_factory() -> DefaultBackendFactory {
    DefaultBackendFactory::with_factories(Arc::new(ToneFactory::default()), Arc::new(FakeCloudFactory))
}

/// Model and tokens files in `dir`, returning a local engine config document.
pub fn local_config(dir: &Path) -> serde_json::Value {
    let model = dir.join("model.onnx");
    let tokens = dir.join("tokens.txt");
    std::fs::write(&model, b"onnx").unwrap();
    std::fs::write(&tokens, "_ 0\na 1\n").unwrap();
    serde_json::json!({
        "modelPath": model,
        "tokensPath": tokens,
    })
}

pub fn cloud_config() -> serde_json::Value {
    serde_json::json!({
        "subscriptionKey": "test-key",
        "region": "westeurope",
        "voice": "en-US-JennyNeural",
    })
}

/// A connection that replays `reply` and records what was written.
pub struct ScriptedStream {
    reply: Cursor<Vec<u8>>,
    sent: Arc<Mutex<Vec<u8>>>,
}

impl Read for ScriptedStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reply.read(buf)
    }
}

impl Write for ScriptedStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.sent.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Hands out one scripted reply per connection; refuses once they run out.
#[derive(Default)]
pub struct ScriptedConnector {
    replies: Mutex<VecDeque<Vec<u8>>>,
    pub sent: Arc<Mutex<Vec<u8>>>,
    pub connects: AtomicUsize,
}

impl ScriptedConnector {
    pub fn with_replies(replies: Vec<Vec<u8>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            ..Self::default()
        }
    }
}

impl PipeConnector for ScriptedConnector {
    fn connect(&self, _name: &str) -> io::Result<Box<dyn PipeStream>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        match self.replies.lock().unwrap().pop_front() {
            Some(reply) => Ok(Box::new(ScriptedStream {
                reply: Cursor::new(reply),
                sent: self.sent.clone(),
            })),
            None => Err(io::Error::new(io::ErrorKind::ConnectionRefused, "no helper")),
        }
    }
}

/// `payload` behind its little-endian length prefix.
pub fn framed(payload: &[u8]) -> Vec<u8> {
    let mut frame = (payload.len() as u32).to_le_bytes().to_vec();
    frame.extend_from_slice(payload);
    frame
}

pub fn helper_client(connector: Arc<ScriptedConnector>) -> HelperProcessClient {
    HelperProcessClient::with_connector("TestPipe", connector).retry_policy(RetryPolicy {
        max_attempts: 1,
        retry_delay_ms: 0,
        pipe_wait_ms: 0,
    })
}
