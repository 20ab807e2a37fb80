//! Process-wide bridge state shared by every engine and voice object.
//!
//! The host DLL calls [`BridgeHost::install`] from its attach hook and
//! [`BridgeHost::teardown`] on detach; COM objects created in between share
//! the installed registry and router.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use super::{SpeechVoice, TtsEngine};
use crate::error::BridgeError;
use crate::helper::{NamedPipeConnector, PipeConnector};
use crate::registry::BackendRegistry;
use crate::router::SynthesisRequestRouter;
use crate::settings::BridgeSettings;

static HOST: Mutex<Option<Arc<BridgeHost>>> = Mutex::new(None);

pub struct BridgeHost {
    config_dir: PathBuf,
    settings: BridgeSettings,
    registry: Arc<BackendRegistry>,
    router: Arc<SynthesisRequestRouter>,
}

impl BridgeHost {
    /// Load settings and engines from `config_dir`, talking to the helper over named pipes.
    pub fn bootstrap(config_dir: &Path) -> Result<Self, BridgeError> {
        Self::bootstrap_with(
            config_dir,
            Arc::new(BackendRegistry::new()),
            Arc::new(NamedPipeConnector),
        )
    }

    pub fn bootstrap_with(
        config_dir: &Path,
        registry: Arc<BackendRegistry>,
        connector: Arc<dyn PipeConnector>,
    ) -> Result<Self, BridgeError> {
        crate::logging::init();
        let settings = BridgeSettings::load_from_dir(config_dir)?;

        let engines_path = config_dir.join(&settings.engines_config_file);
        if engines_path.exists() {
            // A broken engines file leaves the other fallback links usable.
            match registry.load_configuration(&engines_path) {
                Ok(created) => log::info!("{created} engine(s) ready"),
                Err(e) => log::error!("Engine configuration not loaded: {e}"),
            }
        } else {
            log::warn!("No engine configuration at {}", engines_path.display());
        }

        let router = settings.build_router(registry.clone(), config_dir, connector);
        Ok(Self {
            config_dir: config_dir.to_path_buf(),
            settings,
            registry,
            router: Arc::new(router),
        })
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn settings(&self) -> &BridgeSettings {
        &self.settings
    }

    pub fn registry(&self) -> &Arc<BackendRegistry> {
        &self.registry
    }

    pub fn router(&self) -> &Arc<SynthesisRequestRouter> {
        &self.router
    }

    /// A new engine object sharing this host's router.
    pub fn create_engine(&self) -> TtsEngine {
        TtsEngine::new(self.router.clone())
    }

    pub fn create_voice(&self) -> SpeechVoice {
        SpeechVoice::new(self.create_engine())
    }

    /// Make `host` the process-wide instance, replacing and shutting down any previous one.
    pub fn install(host: BridgeHost) -> Arc<BridgeHost> {
        let host = Arc::new(host);
        let previous = HOST
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(host.clone());
        if let Some(previous) = previous {
            previous.registry.shutdown_all_engines();
        }
        host
    }

    pub fn current() -> Option<Arc<BridgeHost>> {
        HOST.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Remove the process-wide instance and shut down its engines.
    pub fn teardown() {
        let host = HOST.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(host) = host {
            host.registry.shutdown_all_engines();
            log::info!("Bridge host torn down");
        }
    }
}
