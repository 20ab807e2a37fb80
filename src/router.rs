//! Voice resolution and the prioritized synthesis fallback chain.
//!
//! The router turns a SAPI voice token into an engine id, then tries each
//! enabled [`FallbackLink`] in order until one yields non-empty audio:
//!
//! 1. [`FallbackLink::Registry`]: the configured in-process backend
//! 2. [`FallbackLink::DirectLocal`]: a one-shot local backend built from the engine's config entry
//! 3. [`FallbackLink::HelperProcess`]: a round trip to the helper process
//! 4. [`FallbackLink::WorkerBridge`]: the on-disk worker process
//!
//! A failing link is logged and the next one is tried. Only exhaustion of
//! the whole chain is reported to the caller.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, Once};

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::codec::{encode_pcm16, EncodedAudio};
use crate::engines::BackendKind;
use crate::error::{BridgeError, SynthesisError};
use crate::helper::{HelperPipeMessage, HelperProcessClient};
use crate::registry::BackendRegistry;
use crate::worker::WorkerBridge;
use crate::{AudioFormat, SampleBuffer, SynthesisBackend};

/// Engine configuration file looked up in the config directory.
pub const ENGINES_CONFIG_FILE: &str = "engines_config.json";

/// Sample rate reported before any engine has been resolved.
pub const DEFAULT_SAMPLE_RATE: u32 = 22050;

/// One strategy in the fallback chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackLink {
    Registry,
    DirectLocal,
    HelperProcess,
    WorkerBridge,
}

impl FallbackLink {
    pub fn all() -> Vec<FallbackLink> {
        vec![
            FallbackLink::Registry,
            FallbackLink::DirectLocal,
            FallbackLink::HelperProcess,
            FallbackLink::WorkerBridge,
        ]
    }
}

/// Voice tokens whose name contains `contains` are looked up as `voice`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceSubstitution {
    pub contains: String,
    pub voice: String,
}

impl VoiceSubstitution {
    pub fn new(contains: &str, voice: &str) -> Self {
        Self {
            contains: contains.to_string(),
            voice: voice.to_string(),
        }
    }

    /// `TestSherpa` is the installer's test token for the bundled Amy voice.
    pub fn defaults() -> Vec<VoiceSubstitution> {
        vec![VoiceSubstitution::new("TestSherpa", "amy")]
    }
}

#[derive(Debug, Clone, PartialEq, Builder)]
#[builder(default)]
pub struct RouterOptions {
    /// Enabled links, tried in order.
    pub chain: Vec<FallbackLink>,
    /// Engine used when no voice token has been set.
    pub default_engine_id: Option<String>,
    /// Directory holding the engine configuration file. `None` disables bootstrap.
    pub config_dir: Option<PathBuf>,
    pub engines_config_file: String,
    pub voice_substitutions: Vec<VoiceSubstitution>,
    pub default_sample_rate: u32,
    /// Engine name sent to the helper when the engine id has no config entry.
    pub helper_engine: String,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self {
            chain: FallbackLink::all(),
            default_engine_id: None,
            config_dir: None,
            engines_config_file: ENGINES_CONFIG_FILE.to_string(),
            voice_substitutions: VoiceSubstitution::defaults(),
            default_sample_rate: DEFAULT_SAMPLE_RATE,
            helper_engine: BackendKind::LocalNeural.as_str().to_string(),
        }
    }
}

/// Text plus the SAPI prosody settings in force for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeakRequest {
    pub text: String,
    /// SAPI rate, -10..=10.
    pub rate: i32,
    /// SAPI volume, 0..=100.
    pub volume: u32,
}

impl SpeakRequest {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
            rate: 0,
            volume: 100,
        }
    }

    pub fn with_rate(mut self, rate: i32) -> Self {
        self.rate = rate;
        self
    }

    pub fn with_volume(mut self, volume: u32) -> Self {
        self.volume = volume;
        self
    }
}

#[derive(Debug, Default)]
struct VoiceState {
    voice_name: Option<String>,
    engine_id: Option<String>,
}

pub struct SynthesisRequestRouter {
    registry: Arc<BackendRegistry>,
    options: RouterOptions,
    helper: Option<HelperProcessClient>,
    worker: Option<WorkerBridge>,
    voice: Mutex<VoiceState>,
    bootstrap: Once,
}

impl SynthesisRequestRouter {
    pub fn new(registry: Arc<BackendRegistry>, options: RouterOptions) -> Self {
        Self {
            registry,
            options,
            helper: None,
            worker: None,
            voice: Mutex::new(VoiceState::default()),
            bootstrap: Once::new(),
        }
    }

    pub fn with_helper(mut self, helper: HelperProcessClient) -> Self {
        self.helper = Some(helper);
        self
    }

    pub fn with_worker(mut self, worker: WorkerBridge) -> Self {
        self.worker = Some(worker);
        self
    }

    pub fn registry(&self) -> &Arc<BackendRegistry> {
        &self.registry
    }

    pub fn options(&self) -> &RouterOptions {
        &self.options
    }

    fn voice_state(&self) -> MutexGuard<'_, VoiceState> {
        self.voice.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Bind the router to a SAPI voice token and return the engine id it resolves to.
    ///
    /// The voice name is the token id's last `\`-separated segment. Substitution
    /// rules apply first, then the registry's alias table; an unmapped name is
    /// used as the engine id itself.
    pub fn set_voice_token(&self, token_id: &str) -> String {
        let voice_name = voice_name_from_token(token_id);
        let lookup = self.substitute(voice_name);
        let engine_id = self
            .registry
            .get_engine_id_for_voice(&lookup)
            .unwrap_or_else(|| lookup.clone());

        log::info!("Voice '{voice_name}' resolved to engine '{engine_id}'");
        let mut state = self.voice_state();
        state.voice_name = Some(voice_name.to_string());
        state.engine_id = Some(engine_id.clone());
        engine_id
    }

    fn substitute(&self, voice_name: &str) -> String {
        let lowered = voice_name.to_lowercase();
        self.options
            .voice_substitutions
            .iter()
            .find(|rule| lowered.contains(&rule.contains.to_lowercase()))
            .map(|rule| rule.voice.clone())
            .unwrap_or_else(|| voice_name.to_string())
    }

    pub fn voice_name(&self) -> Option<String> {
        self.voice_state().voice_name.clone()
    }

    /// Current engine id: the bound one, else the voice name's alias, else the
    /// voice name, else the configured default.
    pub fn current_engine_id(&self) -> Option<String> {
        let state = self.voice_state();
        if let Some(id) = &state.engine_id {
            return Some(id.clone());
        }
        if let Some(voice) = &state.voice_name {
            let lookup = self.substitute(voice);
            return Some(self.registry.get_engine_id_for_voice(&lookup).unwrap_or(lookup));
        }
        self.options.default_engine_id.clone()
    }

    /// Format of the audio the current engine produces.
    pub fn output_format(&self) -> AudioFormat {
        self.current_engine_id()
            .and_then(|id| self.ensure_engine(&id))
            .map(|backend| backend.preferred_format())
            .unwrap_or_else(|| AudioFormat::mono16(self.options.default_sample_rate))
    }

    /// Ready backend for `id`, loading the engine configuration once if it
    /// is not registered yet. Registered but unready backends are skipped.
    fn ensure_engine(&self, id: &str) -> Option<Arc<dyn SynthesisBackend>> {
        if !self.registry.is_engine_initialized(id) {
            self.bootstrap();
        }
        self.registry.get_engine(id).filter(|b| b.is_ready())
    }

    /// Load the engine configuration file. Runs at most once per router.
    fn bootstrap(&self) {
        self.bootstrap.call_once(|| self.load_engines_config());
    }

    fn load_engines_config(&self) {
        let Some(dir) = &self.options.config_dir else {
            return;
        };
        let path = dir.join(&self.options.engines_config_file);
        if !path.exists() {
            log::debug!("No engine configuration at {}", path.display());
            return;
        }
        if let Err(e) = self.registry.load_configuration(&path) {
            log::error!("Failed to load {}: {e}", path.display());
        }
    }

    /// Produce encoded audio for `request` from the first link that succeeds.
    pub fn synthesize(&self, request: &SpeakRequest) -> Result<EncodedAudio, BridgeError> {
        if request.text.trim().is_empty() {
            return Err(BridgeError::InvalidArgument("text is empty"));
        }

        let engine_id = self.current_engine_id();
        log::info!(
            "Synthesizing {} characters with engine {:?}",
            request.text.chars().count(),
            engine_id
        );

        for link in &self.options.chain {
            match self.try_link(*link, engine_id.as_deref(), request) {
                Ok(audio) if !audio.is_empty() => {
                    log::info!("{link:?} produced {} bytes", audio.len());
                    return Ok(audio);
                }
                Ok(_) => log::warn!("{link:?} returned no audio"),
                Err(e) => log::warn!("{link:?} failed: {e}"),
            }
        }

        log::error!("All {} fallback strategies failed", self.options.chain.len());
        Err(BridgeError::ChainExhausted {
            attempted: self.options.chain.len(),
        })
    }

    fn try_link(
        &self,
        link: FallbackLink,
        engine_id: Option<&str>,
        request: &SpeakRequest,
    ) -> Result<EncodedAudio, BridgeError> {
        match link {
            FallbackLink::Registry => {
                let id = require_engine(engine_id)?;
                let backend = self
                    .ensure_engine(id)
                    .ok_or_else(|| BridgeError::EngineUnavailable(id.to_string()))?;
                let buffer = backend.synthesize(&request.text)?;
                encode(buffer, request.volume)
            }
            FallbackLink::DirectLocal => {
                let id = require_engine(engine_id)?;
                self.direct_local(id, request)
            }
            FallbackLink::HelperProcess => {
                let helper = self
                    .helper
                    .as_ref()
                    .ok_or_else(|| BridgeError::EngineUnavailable("helper process".to_string()))?;
                let message = self.helper_message(engine_id, request);
                Ok(EncodedAudio::from_raw(helper.synthesize(&message)?))
            }
            FallbackLink::WorkerBridge => {
                let worker = self
                    .worker
                    .as_ref()
                    .filter(|w| w.is_configured())
                    .ok_or_else(|| BridgeError::EngineUnavailable("worker bridge".to_string()))?;
                let buffer = worker.synthesize(&request.text, request.rate)?;
                encode(buffer, request.volume)
            }
        }
    }

    fn direct_local(&self, id: &str, request: &SpeakRequest) -> Result<EncodedAudio, BridgeError> {
        if self.registry.engine_entry(id).is_none() {
            self.bootstrap();
        }
        let entry = self
            .registry
            .engine_entry(id)
            .ok_or_else(|| BridgeError::EngineUnavailable(id.to_string()))?;
        let kind: BackendKind = entry.kind.parse()?;
        if kind != BackendKind::LocalNeural {
            return Err(BridgeError::EngineUnavailable(format!("{id} is not a local engine")));
        }

        log::debug!("Building one-shot local backend for '{id}'");
        let mut backend = self.registry.factory().create(kind);
        backend.configure(&entry.config)?;
        let result = backend.synthesize(&request.text);
        backend.shutdown();
        encode(result?, request.volume)
    }

    fn helper_message(&self, engine_id: Option<&str>, request: &SpeakRequest) -> HelperPipeMessage {
        let entry = engine_id.and_then(|id| self.registry.engine_entry(id));
        let kind = entry.as_ref().and_then(|e| e.kind.parse::<BackendKind>().ok());
        let engine = kind
            .map(|k| k.as_str().to_string())
            .unwrap_or_else(|| self.options.helper_engine.clone());
        let voice = self
            .voice_name()
            .map(|name| self.substitute(&name))
            .unwrap_or_default();

        let mut message = HelperPipeMessage::speak(&request.text, &engine, &voice)
            .with_prosody(request.rate, request.volume);
        if let (Some(kind), Some(entry)) = (kind, entry) {
            message = message
                .with_style(entry.config.get("style").and_then(|s| s.as_str()).map(String::from))
                .with_backend_settings(kind, &entry.config);
        }
        message
    }
}

fn require_engine(engine_id: Option<&str>) -> Result<&str, BridgeError> {
    engine_id.ok_or_else(|| BridgeError::EngineUnavailable("no voice selected".to_string()))
}

/// Apply the SAPI volume as gain and encode.
fn encode(mut buffer: SampleBuffer, volume: u32) -> Result<EncodedAudio, BridgeError> {
    if buffer.is_empty() {
        return Err(BridgeError::Synthesis(SynthesisError::EngineFailure(
            "backend returned no samples".to_string(),
        )));
    }
    let volume = volume.min(100);
    if volume < 100 {
        let gain = volume as f32 / 100.0;
        buffer.samples.iter_mut().for_each(|s| *s *= gain);
    }
    Ok(encode_pcm16(&buffer))
}

/// Voice name of a SAPI token id: the text after the last backslash.
pub fn voice_name_from_token(token_id: &str) -> &str {
    token_id.rsplit('\\').next().unwrap_or(token_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::HEADER_LEN;
    use crate::engines::BackendFactory;
    use crate::error::ConfigError;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct CountingBackend {
        ready: AtomicBool,
        calls: Arc<AtomicUsize>,
        fail: bool,
        configures: Arc<AtomicUsize>,
        reject_config: bool,
    }

    impl SynthesisBackend for CountingBackend {
        fn configure(&mut self, _config: &serde_json::Value) -> Result<(), ConfigError> {
            self.configures.fetch_add(1, Ordering::SeqCst);
            if self.reject_config {
                return Err(ConfigError::MissingCredential("subscriptionKey"));
            }
            self.ready.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn synthesize(&self, _text: &str) -> Result<SampleBuffer, SynthesisError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(SynthesisError::EngineFailure("boom".into()));
            }
            Ok(SampleBuffer {
                samples: vec![0.5; 10],
                sample_rate: 16000,
            })
        }

        fn shutdown(&self) {
            self.ready.store(false, Ordering::SeqCst);
        }

        fn is_ready(&self) -> bool {
            self.ready.load(Ordering::SeqCst)
        }

        fn describe(&self) -> String {
            "counting".into()
        }

        fn preferred_format(&self) -> AudioFormat {
            AudioFormat::mono16(16000)
        }
    }

    #[derive(Default)]
    struct CountingFactory {
        calls: Arc<AtomicUsize>,
        fail: bool,
        configures: Arc<AtomicUsize>,
        reject_config: bool,
    }

    impl BackendFactory for CountingFactory {
        fn create(&self, _kind: BackendKind) -> Box<dyn SynthesisBackend> {
            Box::new(CountingBackend {
                ready: AtomicBool::new(false),
                calls: self.calls.clone(),
                fail: self.fail,
                configures: self.configures.clone(),
                reject_config: self.reject_config,
            })
        }
    }

    fn registry(fail: bool) -> (Arc<BackendRegistry>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let registry = Arc::new(BackendRegistry::with_factory(Arc::new(CountingFactory {
            calls: calls.clone(),
            fail,
            ..CountingFactory::default()
        })));
        registry
            .parse_configuration(&serde_json::json!({
                "engines": { "sherpa-amy": { "type": "sherpaonnx", "config": {} } },
                "voices": { "amy": "sherpa-amy" }
            }))
            .unwrap();
        (registry, calls)
    }

    #[test]
    fn token_name_is_last_segment() {
        assert_eq!(
            voice_name_from_token(r"HKEY_LOCAL_MACHINE\SOFTWARE\Microsoft\SPEECH\Voices\Tokens\Amy"),
            "Amy"
        );
        assert_eq!(voice_name_from_token("plain"), "plain");
    }

    #[test]
    fn test_token_substitutes_to_amy() {
        let (registry, _) = registry(false);
        let router = SynthesisRequestRouter::new(registry, RouterOptions::default());
        let amy = router.set_voice_token(r"...\Tokens\Amy");
        let test = router.set_voice_token(r"...\Tokens\TestSherpaVoice");
        assert_eq!(amy, "sherpa-amy");
        assert_eq!(test, amy);
        assert_eq!(router.voice_name().as_deref(), Some("TestSherpaVoice"));
    }

    #[test]
    fn unmapped_voice_is_its_own_engine_id() {
        let (registry, _) = registry(false);
        let router = SynthesisRequestRouter::new(registry, RouterOptions::default());
        assert_eq!(router.set_voice_token(r"Tokens\azure-jenny"), "azure-jenny");
    }

    #[test]
    fn registry_link_encodes_backend_audio() {
        let (registry, calls) = registry(false);
        let router = SynthesisRequestRouter::new(registry, RouterOptions::default());
        router.set_voice_token(r"Tokens\Amy");

        let audio = router.synthesize(&SpeakRequest::new("hello")).unwrap();
        assert_eq!(audio.len(), HEADER_LEN + 20);
        assert_eq!(audio.header().unwrap().sample_rate, 16000);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(router.output_format(), AudioFormat::mono16(16000));
    }

    #[test]
    fn volume_scales_samples() {
        let (registry, _) = registry(false);
        let router = SynthesisRequestRouter::new(registry, RouterOptions::default());
        router.set_voice_token(r"Tokens\Amy");
        let loud = crate::codec::decode_pcm16(
            router.synthesize(&SpeakRequest::new("x")).unwrap().as_bytes(),
        )
        .unwrap();
        let quiet = crate::codec::decode_pcm16(
            router
                .synthesize(&SpeakRequest::new("x").with_volume(50))
                .unwrap()
                .as_bytes(),
        )
        .unwrap();
        assert!((quiet.samples[0] - loud.samples[0] / 2.0).abs() < 1e-3);
    }

    #[test]
    fn failing_backend_falls_through_to_direct_local_then_exhausts() {
        let (registry, calls) = registry(true);
        let options = RouterOptionsBuilder::default()
            .chain(vec![FallbackLink::Registry, FallbackLink::DirectLocal])
            .build()
            .unwrap();
        let router = SynthesisRequestRouter::new(registry, options);
        router.set_voice_token(r"Tokens\Amy");

        let err = router.synthesize(&SpeakRequest::new("hello")).unwrap_err();
        assert!(matches!(err, BridgeError::ChainExhausted { attempted: 2 }));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unconfigured_links_are_skipped() {
        let (registry, _) = registry(false);
        let options = RouterOptionsBuilder::default()
            .chain(vec![
                FallbackLink::HelperProcess,
                FallbackLink::WorkerBridge,
                FallbackLink::Registry,
            ])
            .build()
            .unwrap();
        let router = SynthesisRequestRouter::new(registry, options);
        router.set_voice_token(r"Tokens\Amy");
        assert!(router.synthesize(&SpeakRequest::new("hi")).is_ok());
    }

    #[test]
    fn empty_text_is_rejected() {
        let (registry, _) = registry(false);
        let router = SynthesisRequestRouter::new(registry, RouterOptions::default());
        assert!(matches!(
            router.synthesize(&SpeakRequest::new("   ")),
            Err(BridgeError::InvalidArgument(_))
        ));
    }

    #[test]
    fn default_format_before_resolution() {
        let router = SynthesisRequestRouter::new(
            Arc::new(BackendRegistry::new()),
            RouterOptions::default(),
        );
        assert_eq!(router.current_engine_id(), None);
        assert_eq!(router.output_format(), AudioFormat::mono16(22050));
    }

    #[test]
    fn bootstraps_engines_from_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(ENGINES_CONFIG_FILE),
            r#"{ "engines": { "late": { "type": "sherpaonnx", "config": {} } } }"#,
        )
        .unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let registry = Arc::new(BackendRegistry::with_factory(Arc::new(CountingFactory {
            calls: calls.clone(),
            ..CountingFactory::default()
        })));
        let options = RouterOptionsBuilder::default()
            .config_dir(Some(dir.path().to_path_buf()))
            .build()
            .unwrap();
        let router = SynthesisRequestRouter::new(registry.clone(), options);
        router.set_voice_token(r"Tokens\late");

        assert!(router.synthesize(&SpeakRequest::new("hi")).is_ok());
        assert!(registry.is_engine_initialized("late"));
    }

    #[test]
    fn unready_backend_is_skipped_for_the_next_link() {
        let (registry, calls) = registry(false);
        let options = RouterOptionsBuilder::default()
            .chain(vec![FallbackLink::Registry, FallbackLink::DirectLocal])
            .build()
            .unwrap();
        let router = SynthesisRequestRouter::new(registry.clone(), options);
        router.set_voice_token(r"Tokens\Amy");

        let registered = registry.get_engine("sherpa-amy").unwrap();
        registered.shutdown();
        assert!(registry.is_engine_initialized("sherpa-amy"));
        assert_eq!(router.output_format(), AudioFormat::mono16(DEFAULT_SAMPLE_RATE));

        // Only the one-shot backend built by DirectLocal synthesizes.
        assert!(router.synthesize(&SpeakRequest::new("hi")).is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!registered.is_ready());

        let options = RouterOptionsBuilder::default()
            .chain(vec![FallbackLink::Registry])
            .build()
            .unwrap();
        let router = SynthesisRequestRouter::new(registry, options);
        router.set_voice_token(r"Tokens\Amy");
        assert!(matches!(
            router.synthesize(&SpeakRequest::new("hi")),
            Err(BridgeError::ChainExhausted { attempted: 1 })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn engine_config_is_loaded_once_per_router() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(ENGINES_CONFIG_FILE),
            r#"{ "engines": { "azure-jenny": { "type": "azure", "config": {} } } }"#,
        )
        .unwrap();

        let configures = Arc::new(AtomicUsize::new(0));
        let registry = Arc::new(BackendRegistry::with_factory(Arc::new(CountingFactory {
            configures: configures.clone(),
            reject_config: true,
            ..CountingFactory::default()
        })));
        let options = RouterOptionsBuilder::default()
            .chain(vec![FallbackLink::Registry])
            .config_dir(Some(dir.path().to_path_buf()))
            .build()
            .unwrap();
        let router = SynthesisRequestRouter::new(registry.clone(), options);
        router.set_voice_token(r"Tokens\azure-jenny");

        for _ in 0..5 {
            assert!(router.synthesize(&SpeakRequest::new("hi")).is_err());
            assert_eq!(router.output_format(), AudioFormat::mono16(DEFAULT_SAMPLE_RATE));
        }
        assert_eq!(configures.load(Ordering::SeqCst), 1);
        assert!(!registry.is_engine_initialized("azure-jenny"));
    }
}
