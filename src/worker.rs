//! On-disk request/response bridge to a separate synthesis worker process.
//!
//! The bridge writes `{Text, Speed, SpeakerId, OutputPath}` to a request file,
//! runs the worker with the request path as its last argument and waits for
//! it. The worker leaves `<request>.response.json` next to the request and the
//! audio at the reported `AudioPath`.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use wait_timeout::ChildExt;

use crate::error::WorkerError;
use crate::SampleBuffer;

static REQUEST_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct WorkerRequest {
    pub text: String,
    pub speed: f32,
    pub speaker_id: i32,
    pub output_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct WorkerResponse {
    pub success: bool,
    #[serde(default)]
    pub error_message: String,
    #[serde(default)]
    pub sample_count: u64,
    #[serde(default)]
    pub sample_rate: u32,
    #[serde(default)]
    pub audio_path: PathBuf,
}

/// Settings for [`WorkerBridge`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    /// Worker executable. Empty disables the bridge.
    pub executable: PathBuf,
    /// Arguments placed before the request path.
    pub args: Vec<String>,
    /// Directory for request, response and audio files. Empty uses the temp dir.
    pub work_dir: PathBuf,
    pub timeout_ms: u64,
    pub speaker_id: i32,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            executable: PathBuf::new(),
            args: Vec::new(),
            work_dir: PathBuf::new(),
            timeout_ms: 30_000,
            speaker_id: 0,
        }
    }
}

/// SAPI rate (-10..=10) to a speed multiplier: 10 is three times faster, -10 three times slower.
pub fn rate_to_speed(rate: i32) -> f32 {
    3f32.powf(rate.clamp(-10, 10) as f32 / 10.0)
}

pub struct WorkerBridge {
    settings: WorkerSettings,
}

impl WorkerBridge {
    pub fn new(settings: WorkerSettings) -> Self {
        Self { settings }
    }

    pub fn is_configured(&self) -> bool {
        !self.settings.executable.as_os_str().is_empty()
    }

    fn work_dir(&self) -> PathBuf {
        if self.settings.work_dir.as_os_str().is_empty() {
            std::env::temp_dir()
        } else {
            self.settings.work_dir.clone()
        }
    }

    /// Run one request through the worker and load the audio it produced.
    pub fn synthesize(&self, text: &str, rate: i32) -> Result<SampleBuffer, WorkerError> {
        let executable = &self.settings.executable;
        if !self.is_configured() || (executable.components().count() > 1 && !executable.exists()) {
            return Err(WorkerError::MissingExecutable(executable.clone()));
        }

        let work_dir = self.work_dir();
        fs::create_dir_all(&work_dir)?;
        let stem = format!(
            "tts_request_{}_{}",
            std::process::id(),
            REQUEST_COUNTER.fetch_add(1, Ordering::Relaxed)
        );
        let request_path = work_dir.join(format!("{stem}.json"));
        let response_path = request_path.with_extension("response.json");
        let audio_path = work_dir.join(format!("{stem}.wav"));

        let result = self.run(text, rate, &request_path, &response_path, &audio_path);

        for path in [&request_path, &response_path, &audio_path] {
            if path.exists() {
                if let Err(e) = fs::remove_file(path) {
                    log::debug!("Could not remove {}: {e}", path.display());
                }
            }
        }
        result
    }

    fn run(
        &self,
        text: &str,
        rate: i32,
        request_path: &Path,
        response_path: &Path,
        audio_path: &Path,
    ) -> Result<SampleBuffer, WorkerError> {
        let request = WorkerRequest {
            text: text.to_string(),
            speed: rate_to_speed(rate),
            speaker_id: self.settings.speaker_id,
            output_path: audio_path.to_path_buf(),
        };
        fs::write(request_path, serde_json::to_vec_pretty(&request)?)?;
        log::debug!("Wrote worker request {}", request_path.display());

        let mut child = Command::new(&self.settings.executable)
            .args(&self.settings.args)
            .arg(request_path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    WorkerError::MissingExecutable(self.settings.executable.clone())
                }
                _ => WorkerError::Io(e),
            })?;

        let timeout = Duration::from_millis(self.settings.timeout_ms);
        let status = match child.wait_timeout(timeout)? {
            Some(status) => status,
            None => {
                log::warn!("Worker exceeded {} ms, killing it", self.settings.timeout_ms);
                let _ = child.kill();
                let _ = child.wait();
                return Err(WorkerError::Timeout(timeout.as_millis()));
            }
        };
        if !status.success() {
            log::warn!("Worker exited with {status}");
        }

        if !response_path.exists() {
            return Err(WorkerError::Reported(format!(
                "no response file (worker exited with {status})"
            )));
        }
        let response: WorkerResponse = serde_json::from_slice(&fs::read(response_path)?)?;
        if !response.success {
            return Err(WorkerError::Reported(response.error_message));
        }

        let wav = if response.audio_path.as_os_str().is_empty() {
            audio_path.to_path_buf()
        } else {
            response.audio_path.clone()
        };
        let buffer = read_wav(&wav)?;
        if wav != audio_path && wav.starts_with(self.work_dir()) {
            let _ = fs::remove_file(&wav);
        }
        log::info!(
            "Worker produced {} samples at {} Hz",
            buffer.samples.len(),
            buffer.sample_rate
        );
        Ok(buffer)
    }
}

/// Load a mono WAV file as normalized floats.
pub fn read_wav(path: &Path) -> Result<SampleBuffer, WorkerError> {
    let mut reader = hound::WavReader::open(path)?;
    let spec = reader.spec();
    let channels = usize::from(spec.channels.max(1));
    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.clamp(1, 32) - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()?
        }
    };
    // Downmix by taking the first channel.
    let samples = interleaved.into_iter().step_by(channels).collect();
    Ok(SampleBuffer {
        samples,
        sample_rate: spec.sample_rate,
    })
}
