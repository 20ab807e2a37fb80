//! Keyed registry of configured synthesis backends plus the voice alias table.
//!
//! One mutex guards both maps. Backends are handed out as `Arc`s, so
//! synthesis on a retrieved backend runs outside the lock.
//!
//! # Configuration document
//!
//! ```json
//! {
//!   "engines": {
//!     "sherpa-amy": { "type": "sherpaonnx", "config": { "modelPath": "...", "tokensPath": "..." } },
//!     "azure-jenny": { "type": "azure", "config": { "subscriptionKey": "...", "region": "...", "voice": "..." } }
//!   },
//!   "voices": { "amy": "sherpa-amy", "Jenny": "azure-jenny" }
//! }
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::engines::{BackendFactory, BackendKind, DefaultBackendFactory};
use crate::error::{ConfigError, RegistryError};
use crate::SynthesisBackend;

/// Result of [`BackendRegistry::initialize_engine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitOutcome {
    Created,
    /// The id was already registered. The existing instance is kept.
    AlreadyExists,
}

/// One `engines` entry: backend kind plus its kind-specific document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineEntry {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub config: serde_json::Value,
}

#[derive(Default)]
struct RegistryState {
    engines: HashMap<String, Arc<dyn SynthesisBackend>>,
    voice_aliases: HashMap<String, String>,
    catalog: HashMap<String, EngineEntry>,
}

/// Owns every configured backend for the lifetime of the host process.
pub struct BackendRegistry {
    state: Mutex<RegistryState>,
    factory: Arc<dyn BackendFactory>,
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::with_factory(Arc::new(DefaultBackendFactory::default()))
    }

    /// Build adapters through `factory` instead of the default wiring.
    pub fn with_factory(factory: Arc<dyn BackendFactory>) -> Self {
        Self {
            state: Mutex::new(RegistryState::default()),
            factory,
        }
    }

    pub fn factory(&self) -> Arc<dyn BackendFactory> {
        self.factory.clone()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Construct, configure and store a backend under `id`.
    ///
    /// A backend whose `configure` fails is dropped and never stored.
    pub fn initialize_engine(
        &self,
        id: &str,
        kind: BackendKind,
        config: &serde_json::Value,
    ) -> Result<InitOutcome, RegistryError> {
        let mut state = self.lock();
        if state.engines.contains_key(id) {
            log::info!("Engine '{id}' already exists");
            return Ok(InitOutcome::AlreadyExists);
        }

        let mut backend = self.factory.create(kind);
        backend.configure(config).map_err(|source| RegistryError::Configure {
            id: id.to_string(),
            source,
        })?;

        log::info!("Initialized engine '{id}' ({kind}): {}", backend.describe());
        state.engines.insert(id.to_string(), Arc::from(backend));
        Ok(InitOutcome::Created)
    }

    /// Store an already configured backend. Returns `AlreadyExists` without
    /// replacing if the id is taken.
    pub fn register(&self, id: &str, backend: Arc<dyn SynthesisBackend>) -> InitOutcome {
        let mut state = self.lock();
        if state.engines.contains_key(id) {
            return InitOutcome::AlreadyExists;
        }
        state.engines.insert(id.to_string(), backend);
        InitOutcome::Created
    }

    /// Map lookup only. Never constructs on demand.
    pub fn get_engine(&self, id: &str) -> Option<Arc<dyn SynthesisBackend>> {
        self.lock().engines.get(id).cloned()
    }

    pub fn is_engine_initialized(&self, id: &str) -> bool {
        self.lock().engines.contains_key(id)
    }

    /// Registered ids, sorted.
    pub fn get_engine_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.lock().engines.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn shutdown_engine(&self, id: &str) {
        let removed = self.lock().engines.remove(id);
        if let Some(backend) = removed {
            backend.shutdown();
            log::info!("Shut down engine '{id}'");
        }
    }

    /// Shut down every backend and clear the alias table.
    pub fn shutdown_all_engines(&self) {
        let mut state = self.lock();
        for (id, backend) in state.engines.drain() {
            backend.shutdown();
            log::debug!("Shut down engine '{id}'");
        }
        state.voice_aliases.clear();
    }

    /// Read a configuration document from disk and apply it.
    pub fn load_configuration(&self, path: &Path) -> Result<usize, RegistryError> {
        let content = std::fs::read_to_string(path).map_err(|source| RegistryError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let doc: serde_json::Value = serde_json::from_str(&content)?;
        log::info!("Loading engine configuration from {}", path.display());
        self.parse_configuration(&doc)
    }

    /// Initialize every `engines` entry, then replace the alias table with `voices`.
    ///
    /// A failing entry is logged and skipped. Returns the number of engines
    /// created by this call.
    pub fn parse_configuration(&self, doc: &serde_json::Value) -> Result<usize, RegistryError> {
        let root = doc.as_object().ok_or_else(|| {
            ConfigError::MalformedDocument("configuration root must be an object".to_string())
        })?;

        let mut catalog = HashMap::new();
        let mut created = 0;
        if let Some(engines) = root.get("engines") {
            let engines = engines.as_object().ok_or_else(|| {
                ConfigError::MalformedDocument("'engines' must be an object".to_string())
            })?;
            for (id, raw) in engines {
                let entry: EngineEntry = match serde_json::from_value(raw.clone()) {
                    Ok(entry) => entry,
                    Err(e) => {
                        log::error!("Skipping engine '{id}': {e}");
                        continue;
                    }
                };
                let kind = match entry.kind.parse::<BackendKind>() {
                    Ok(kind) => kind,
                    Err(e) => {
                        log::error!("Skipping engine '{id}': {e}");
                        continue;
                    }
                };
                match self.initialize_engine(id, kind, &entry.config) {
                    Ok(InitOutcome::Created) => created += 1,
                    Ok(InitOutcome::AlreadyExists) => {}
                    Err(e) => log::error!("{e}"),
                }
                catalog.insert(id.clone(), entry);
            }
        }

        let mut aliases = HashMap::new();
        if let Some(voices) = root.get("voices") {
            let voices = voices.as_object().ok_or_else(|| {
                ConfigError::MalformedDocument("'voices' must be an object".to_string())
            })?;
            for (voice, engine_id) in voices {
                match engine_id.as_str() {
                    Some(engine_id) => {
                        aliases.insert(voice.clone(), engine_id.to_string());
                    }
                    None => log::warn!("Ignoring voice '{voice}': engine id is not a string"),
                }
            }
        }

        let mut state = self.lock();
        log::info!(
            "Configuration applied: {created} engine(s) created, {} voice alias(es)",
            aliases.len()
        );
        state.voice_aliases = aliases;
        state.catalog = catalog;
        Ok(created)
    }

    /// Alias lookup: exact name first, then case-insensitive.
    pub fn get_engine_id_for_voice(&self, voice: &str) -> Option<String> {
        let state = self.lock();
        if let Some(id) = state.voice_aliases.get(voice) {
            return Some(id.clone());
        }
        state
            .voice_aliases
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(voice))
            .map(|(_, id)| id.clone())
    }

    pub fn voice_aliases(&self) -> HashMap<String, String> {
        self.lock().voice_aliases.clone()
    }

    /// The configuration entry last loaded for `id`, whether or not it initialized.
    pub fn engine_entry(&self, id: &str) -> Option<EngineEntry> {
        self.lock().catalog.get(id).cloned()
    }

    /// True iff every registered backend is ready.
    pub fn perform_health_check(&self) -> bool {
        let state = self.lock();
        let mut healthy = true;
        for (id, backend) in &state.engines {
            if !backend.is_ready() {
                log::warn!("Engine '{id}' is not ready");
                healthy = false;
            }
        }
        healthy
    }

    /// `(id, describe(), is_ready())` for every engine, sorted by id.
    pub fn describe_engines(&self) -> Vec<(String, String, bool)> {
        let state = self.lock();
        let mut rows: Vec<_> = state
            .engines
            .iter()
            .map(|(id, backend)| (id.clone(), backend.describe(), backend.is_ready()))
            .collect();
        rows.sort_by(|a, b| a.0.cmp(&b.0));
        rows
    }
}

impl Drop for BackendRegistry {
    fn drop(&mut self) {
        self.shutdown_all_engines();
    }
}
