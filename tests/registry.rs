mod common;

use std::sync::Arc;

use sapi_tts_bridge::registry::InitOutcome;
use sapi_tts_bridge::{BackendKind, BackendRegistry, RegistryError};
use serde_json::json;

use common::{cloud_config, fake_factory, local_config};

fn registry() -> BackendRegistry {
    BackendRegistry::with_factory(Arc::new(fake_factory()))
}

#[test]
fn loads_engines_and_voices_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let doc = json!({
        "engines": {
            "sherpa-amy": { "type": "sherpaonnx", "config": local_config(dir.path()) },
            "azure-jenny": { "type": "azure", "config": cloud_config() }
        },
        "voices": { "amy": "sherpa-amy", "Jenny": "azure-jenny" }
    });
    let path = dir.path().join("engines_config.json");
    std::fs::write(&path, serde_json::to_vec_pretty(&doc).unwrap()).unwrap();

    let registry = registry();
    assert_eq!(registry.load_configuration(&path).unwrap(), 2);
    assert_eq!(registry.get_engine_ids(), vec!["azure-jenny", "sherpa-amy"]);
    assert_eq!(registry.get_engine_id_for_voice("jenny").as_deref(), Some("azure-jenny"));
    assert!(registry.perform_health_check());

    let amy = registry.get_engine("sherpa-amy").unwrap();
    assert_eq!(amy.preferred_format().sample_rate, 16000);
    let jenny = registry.get_engine("azure-jenny").unwrap();
    let audio = jenny.synthesize("Hello").unwrap();
    assert_eq!(audio.sample_rate, 24000);
    assert_eq!(audio.samples.len(), 240);
}

#[test]
fn duplicate_id_is_reported_without_replacing() {
    let dir = tempfile::tempdir().unwrap();
    let registry = registry();
    let config = local_config(dir.path());

    assert_eq!(
        registry
            .initialize_engine("amy", BackendKind::LocalNeural, &config)
            .unwrap(),
        InitOutcome::Created
    );
    let first = registry.get_engine("amy").unwrap();
    assert_eq!(
        registry
            .initialize_engine("amy", BackendKind::Cloud, &cloud_config())
            .unwrap(),
        InitOutcome::AlreadyExists
    );
    assert!(Arc::ptr_eq(&first, &registry.get_engine("amy").unwrap()));
}

#[test]
fn failing_entry_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let registry = registry();
    let doc = json!({
        "engines": {
            "good": { "type": "sherpaonnx", "config": local_config(dir.path()) },
            "missing-model": {
                "type": "sherpaonnx",
                "config": { "modelPath": dir.path().join("nope.onnx"), "tokensPath": "nope.txt" }
            },
            "no-key": { "type": "azure", "config": { "region": "westeurope", "voice": "x" } },
            "mystery": { "type": "mock", "config": {} }
        }
    });

    assert_eq!(registry.parse_configuration(&doc).unwrap(), 1);
    assert_eq!(registry.get_engine_ids(), vec!["good"]);
    assert!(!registry.is_engine_initialized("missing-model"));
    assert!(registry.engine_entry("missing-model").is_some());
    assert!(registry.engine_entry("mystery").is_none());

    assert!(matches!(
        registry.initialize_engine("no-key", BackendKind::Cloud, &json!({ "region": "r", "voice": "v" })),
        Err(RegistryError::Configure { id, .. }) if id == "no-key"
    ));
}

#[test]
fn reload_replaces_aliases() {
    let registry = registry();
    registry
        .parse_configuration(&json!({ "voices": { "amy": "sherpa-amy", "old": "gone" } }))
        .unwrap();
    registry
        .parse_configuration(&json!({ "voices": { "amy": "sherpa-amy-v2" } }))
        .unwrap();

    assert_eq!(registry.get_engine_id_for_voice("amy").as_deref(), Some("sherpa-amy-v2"));
    assert_eq!(registry.get_engine_id_for_voice("old"), None);
}

#[test]
fn shutdown_all_leaves_registry_empty() {
    let dir = tempfile::tempdir().unwrap();
    let registry = registry();
    registry
        .parse_configuration(&json!({
            "engines": { "amy": { "type": "sherpaonnx", "config": local_config(dir.path()) } },
            "voices": { "Amy": "amy" }
        }))
        .unwrap();
    let amy = registry.get_engine("amy").unwrap();

    registry.shutdown_all_engines();
    assert!(registry.get_engine_ids().is_empty());
    assert!(!amy.is_ready());
    assert_eq!(registry.get_engine_id_for_voice("Amy"), None);
}

#[test]
fn malformed_root_is_rejected() {
    let registry = registry();
    assert!(matches!(
        registry.parse_configuration(&json!(["not", "an", "object"])),
        Err(RegistryError::Config(_))
    ));
}
