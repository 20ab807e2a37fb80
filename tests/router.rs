mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use sapi_tts_bridge::codec::{parse_header, HEADER_LEN};
use sapi_tts_bridge::router::{FallbackLink, RouterOptions, SpeakRequest, SynthesisRequestRouter};
use sapi_tts_bridge::{BackendRegistry, BridgeError};
use serde_json::json;

use common::{fake_factory, framed, helper_client, local_config, ScriptedConnector};

const AMY_TOKEN: &str = r"HKEY_LOCAL_MACHINE\SOFTWARE\Microsoft\SPEECH\Voices\Tokens\amy";

fn options(chain: Vec<FallbackLink>) -> RouterOptions {
    RouterOptions {
        chain,
        ..RouterOptions::default()
    }
}

fn registry_with_amy(dir: &std::path::Path) -> Arc<BackendRegistry> {
    let registry = Arc::new(BackendRegistry::with_factory(Arc::new(fake_factory())));
    registry
        .parse_configuration(&json!({
            "engines": { "sherpa-amy": { "type": "sherpaonnx", "config": local_config(dir) } },
            "voices": { "amy": "sherpa-amy" }
        }))
        .unwrap();
    registry
}

#[test]
fn helper_payload_is_returned_untouched() {
    let payload: Vec<u8> = (0..100u8).collect();
    let connector = Arc::new(ScriptedConnector::with_replies(vec![framed(&payload)]));
    let registry = Arc::new(BackendRegistry::with_factory(Arc::new(fake_factory())));
    let router = SynthesisRequestRouter::new(registry, options(vec![FallbackLink::HelperProcess]))
        .with_helper(helper_client(connector.clone()));

    router.set_voice_token(AMY_TOKEN);
    let audio = router.synthesize(&SpeakRequest::new("Hello world")).unwrap();
    assert_eq!(audio.as_bytes(), payload.as_slice());

    let sent: serde_json::Value = serde_json::from_slice(&connector.sent.lock().unwrap()).unwrap();
    assert_eq!(sent["clipboard_text"], "Hello world");
    assert_eq!(sent["args"]["return_audio_bytes"], true);
    assert_eq!(sent["args"]["voice"], "amy");
}

#[test]
fn bad_reply_falls_through_to_next_link() {
    let dir = tempfile::tempdir().unwrap();
    let connector = Arc::new(ScriptedConnector::with_replies(vec![vec![0, 0, 0, 0]]));
    let router = SynthesisRequestRouter::new(
        registry_with_amy(dir.path()),
        options(vec![FallbackLink::HelperProcess, FallbackLink::Registry]),
    )
    .with_helper(helper_client(connector.clone()));

    router.set_voice_token(AMY_TOKEN);
    let audio = router.synthesize(&SpeakRequest::new("Hello")).unwrap();

    assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
    let header = parse_header(audio.as_bytes()).unwrap();
    assert_eq!(header.sample_rate, 16000);
    assert_eq!(audio.len(), HEADER_LEN + 5 * 2);
}

#[test]
fn exhausted_chain_reports_attempts() {
    let connector = Arc::new(ScriptedConnector::default());
    let registry = Arc::new(BackendRegistry::with_factory(Arc::new(fake_factory())));
    let router = SynthesisRequestRouter::new(
        registry,
        options(vec![FallbackLink::Registry, FallbackLink::HelperProcess]),
    )
    .with_helper(helper_client(connector));

    router.set_voice_token(AMY_TOKEN);
    assert!(matches!(
        router.synthesize(&SpeakRequest::new("Hello")),
        Err(BridgeError::ChainExhausted { attempted: 2 })
    ));
}

#[test]
fn empty_text_is_rejected_before_any_link() {
    let connector = Arc::new(ScriptedConnector::default());
    let registry = Arc::new(BackendRegistry::new());
    let router = SynthesisRequestRouter::new(registry, options(vec![FallbackLink::HelperProcess]))
        .with_helper(helper_client(connector.clone()));

    assert!(matches!(
        router.synthesize(&SpeakRequest::new("   ")),
        Err(BridgeError::InvalidArgument(_))
    ));
    assert_eq!(connector.connects.load(Ordering::SeqCst), 0);
}

#[test]
fn test_voice_is_substituted_before_alias_lookup() {
    let dir = tempfile::tempdir().unwrap();
    let router = SynthesisRequestRouter::new(registry_with_amy(dir.path()), RouterOptions::default());

    let engine_id = router.set_voice_token(
        r"HKEY_LOCAL_MACHINE\SOFTWARE\Microsoft\SPEECH\Voices\Tokens\TestSherpaVoice",
    );
    assert_eq!(engine_id, "sherpa-amy");
    assert_eq!(router.voice_name().as_deref(), Some("TestSherpaVoice"));
    assert_eq!(router.output_format().sample_rate, 16000);
}

#[test]
fn helper_receives_substituted_voice_name() {
    let connector = Arc::new(ScriptedConnector::with_replies(vec![framed(&[1, 2, 3, 4])]));
    let registry = Arc::new(BackendRegistry::with_factory(Arc::new(fake_factory())));
    let router = SynthesisRequestRouter::new(registry, options(vec![FallbackLink::HelperProcess]))
        .with_helper(helper_client(connector.clone()));

    router.set_voice_token(r"Tokens\TestSherpaVoice");
    router.synthesize(&SpeakRequest::new("Hello")).unwrap();

    let sent: serde_json::Value = serde_json::from_slice(&connector.sent.lock().unwrap()).unwrap();
    assert_eq!(sent["args"]["voice"], "amy");
}

#[test]
fn unknown_voice_reports_default_rate() {
    let router = SynthesisRequestRouter::new(
        Arc::new(BackendRegistry::with_factory(Arc::new(fake_factory()))),
        RouterOptions::default(),
    );
    router.set_voice_token(r"Tokens\nobody");
    assert_eq!(router.current_engine_id().as_deref(), Some("nobody"));
    assert_eq!(router.output_format().sample_rate, 22050);
}

#[test]
fn engines_file_is_loaded_on_first_use() {
    let dir = tempfile::tempdir().unwrap();
    let doc = json!({
        "engines": { "sherpa-amy": { "type": "sherpaonnx", "config": local_config(dir.path()) } },
        "voices": { "amy": "sherpa-amy" }
    });
    std::fs::write(
        dir.path().join("engines_config.json"),
        serde_json::to_vec(&doc).unwrap(),
    )
    .unwrap();

    let registry = Arc::new(BackendRegistry::with_factory(Arc::new(fake_factory())));
    let router = SynthesisRequestRouter::new(
        registry.clone(),
        RouterOptions {
            chain: vec![FallbackLink::Registry],
            config_dir: Some(dir.path().to_path_buf()),
            default_engine_id: Some("sherpa-amy".to_string()),
            ..RouterOptions::default()
        },
    );

    assert!(registry.get_engine_ids().is_empty());
    let audio = router.synthesize(&SpeakRequest::new("Hi")).unwrap();
    assert_eq!(audio.len(), HEADER_LEN + 4);
    assert!(registry.is_engine_initialized("sherpa-amy"));
}
