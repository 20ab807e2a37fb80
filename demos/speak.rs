use std::path::PathBuf;
use std::time::Instant;

use sapi_tts_bridge::sapi::{BridgeHost, BufferSite, SpeakFlags, TextFragment};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let config_dir = PathBuf::from(args.next().unwrap_or_else(|| ".".to_string()));
    let voice = args.next().unwrap_or_else(|| "amy".to_string());

    let host = BridgeHost::bootstrap(&config_dir)?;
    println!("Engines: {:?}", host.registry().get_engine_ids());

    let engine = host.create_engine();
    let engine_id = engine.set_object_token(&format!(
        r"HKEY_LOCAL_MACHINE\SOFTWARE\Microsoft\SPEECH\Voices\Tokens\{voice}"
    ))?;
    let format = engine.output_format(None);
    println!("Voice {voice} -> engine {engine_id}, {} Hz", format.samples_per_sec);

    let text = "Hello! This voice is served through the SAPI bridge.";
    let mut site = BufferSite::new();

    let synth_start = Instant::now();
    engine.speak(
        SpeakFlags::DEFAULT,
        Some(&format),
        &[TextFragment::speak(text)],
        &mut site,
    )?;
    println!(
        "Received {} bytes and {} events in {:.2?}",
        site.audio.len(),
        site.events.len(),
        synth_start.elapsed()
    );

    std::fs::write("output.wav", &site.audio)?;
    println!("Saved to output.wav");

    host.registry().shutdown_all_engines();
    Ok(())
}
