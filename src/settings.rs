//! Bridge settings document (`bridge_settings.json`).
//!
//! Every field has a default, so a missing file or a partial document is fine:
//!
//! ```json
//! {
//!   "pipe_name": "AACSpeakHelper",
//!   "retry": { "max_attempts": 3, "retry_delay_ms": 1000, "pipe_wait_ms": 5000 },
//!   "frame_limits": { "max_payload": 10485760, "chunk_size": 65536 },
//!   "framing": "raw",
//!   "chain": ["registry", "direct_local", "helper_process", "worker_bridge"],
//!   "default_engine_id": "sherpa-amy",
//!   "worker": { "executable": "SherpaWorker.exe", "timeout_ms": 30000 },
//!   "voice_substitutions": [{ "contains": "TestSherpa", "voice": "amy" }]
//! }
//! ```

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::helper::{
    FrameLimits, FramingMode, HelperProcessClient, PipeConnector, RetryPolicy, DEFAULT_PIPE_NAME,
};
use crate::registry::BackendRegistry;
use crate::router::{
    FallbackLink, RouterOptions, SynthesisRequestRouter, VoiceSubstitution, DEFAULT_SAMPLE_RATE,
    ENGINES_CONFIG_FILE,
};
use crate::worker::{WorkerBridge, WorkerSettings};

pub const BRIDGE_SETTINGS_FILE: &str = "bridge_settings.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeSettings {
    pub pipe_name: String,
    pub retry: RetryPolicy,
    pub frame_limits: FrameLimits,
    pub framing: FramingMode,
    pub chain: Vec<FallbackLink>,
    pub default_engine_id: Option<String>,
    pub engines_config_file: String,
    pub default_sample_rate: u32,
    pub worker: WorkerSettings,
    pub voice_substitutions: Vec<VoiceSubstitution>,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            pipe_name: DEFAULT_PIPE_NAME.to_string(),
            retry: RetryPolicy::default(),
            frame_limits: FrameLimits::default(),
            framing: FramingMode::default(),
            chain: FallbackLink::all(),
            default_engine_id: None,
            engines_config_file: ENGINES_CONFIG_FILE.to_string(),
            default_sample_rate: DEFAULT_SAMPLE_RATE,
            worker: WorkerSettings::default(),
            voice_substitutions: VoiceSubstitution::defaults(),
        }
    }
}

impl BridgeSettings {
    /// Load settings from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            log::debug!("No settings at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let settings: Self = serde_json::from_str(&content)?;
        log::info!("Loaded bridge settings from {}", path.display());
        Ok(settings)
    }

    /// Load `bridge_settings.json` from `dir`.
    pub fn load_from_dir(dir: &Path) -> Result<Self, ConfigError> {
        Self::load(&dir.join(BRIDGE_SETTINGS_FILE))
    }

    /// Router options with the engine configuration looked up in `config_dir`.
    pub fn router_options(&self, config_dir: &Path) -> RouterOptions {
        RouterOptions {
            chain: self.chain.clone(),
            default_engine_id: self.default_engine_id.clone(),
            config_dir: Some(config_dir.to_path_buf()),
            engines_config_file: self.engines_config_file.clone(),
            voice_substitutions: self.voice_substitutions.clone(),
            default_sample_rate: self.default_sample_rate,
            ..RouterOptions::default()
        }
    }

    pub fn helper_client(&self, connector: Arc<dyn PipeConnector>) -> HelperProcessClient {
        HelperProcessClient::with_connector(&self.pipe_name, connector)
            .retry_policy(self.retry.clone())
            .frame_limits(self.frame_limits)
            .framing(self.framing)
    }

    /// Fully wired router: helper attached when its link is enabled, worker
    /// attached when an executable is configured.
    pub fn build_router(
        &self,
        registry: Arc<BackendRegistry>,
        config_dir: &Path,
        connector: Arc<dyn PipeConnector>,
    ) -> SynthesisRequestRouter {
        let mut router = SynthesisRequestRouter::new(registry, self.router_options(config_dir));
        if self.chain.contains(&FallbackLink::HelperProcess) {
            router = router.with_helper(self.helper_client(connector));
        }
        if !self.worker.executable.as_os_str().is_empty() {
            router = router.with_worker(WorkerBridge::new(self.worker.clone()));
        }
        router
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = BridgeSettings::load_from_dir(dir.path()).unwrap();
        assert_eq!(settings, BridgeSettings::default());
        assert_eq!(settings.pipe_name, "AACSpeakHelper");
        assert_eq!(settings.retry.max_attempts, 3);
        assert_eq!(settings.frame_limits.max_payload, 10 * 1024 * 1024);
    }

    #[test]
    fn partial_document_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(BRIDGE_SETTINGS_FILE),
            r#"{ "chain": ["helper_process"], "retry": { "retry_delay_ms": 10 }, "framing": "length_prefixed" }"#,
        )
        .unwrap();
        let settings = BridgeSettings::load_from_dir(dir.path()).unwrap();
        assert_eq!(settings.chain, vec![FallbackLink::HelperProcess]);
        assert_eq!(settings.retry.retry_delay_ms, 10);
        assert_eq!(settings.retry.max_attempts, 3);
        assert_eq!(settings.framing, FramingMode::LengthPrefixed);

        let options = settings.router_options(dir.path());
        assert_eq!(options.chain, vec![FallbackLink::HelperProcess]);
        assert_eq!(options.config_dir.as_deref(), Some(dir.path()));
    }

    #[test]
    fn malformed_document_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(BRIDGE_SETTINGS_FILE), "{ not json").unwrap();
        assert!(matches!(
            BridgeSettings::load_from_dir(dir.path()),
            Err(ConfigError::MalformedDocument(_))
        ));
    }
}
