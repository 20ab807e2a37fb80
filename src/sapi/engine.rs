use std::sync::{Arc, Mutex};

use super::{
    EventId, OutputSite, SiteActions, SpeakFlags, SpeechEvent, TextFragment, WaveFormat,
};
use crate::error::BridgeError;
use crate::router::{SpeakRequest, SynthesisRequestRouter};

/// The text-to-speech engine object SAPI instantiates for a voice token.
pub struct TtsEngine {
    router: Arc<SynthesisRequestRouter>,
    token: Mutex<Option<String>>,
}

impl TtsEngine {
    pub fn new(router: Arc<SynthesisRequestRouter>) -> Self {
        Self {
            router,
            token: Mutex::new(None),
        }
    }

    pub fn router(&self) -> &Arc<SynthesisRequestRouter> {
        &self.router
    }

    /// Bind to a voice token id and return the engine id it resolved to.
    pub fn set_object_token(&self, token_id: &str) -> Result<String, BridgeError> {
        if token_id.trim().is_empty() {
            return Err(BridgeError::InvalidArgument("token id is empty"));
        }
        let engine_id = self.router.set_voice_token(token_id);
        *self.token.lock().unwrap_or_else(|e| e.into_inner()) = Some(token_id.to_string());
        Ok(engine_id)
    }

    pub fn object_token(&self) -> Option<String> {
        self.token.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Render the speakable fragments into `site`.
    ///
    /// Empty text succeeds without touching the site. Otherwise the audio is
    /// written once, bracketed by start and end input stream events. `format`
    /// is the format the host negotiated through [`output_format`](Self::output_format).
    pub fn speak(
        &self,
        flags: SpeakFlags,
        format: Option<&WaveFormat>,
        fragments: &[TextFragment],
        site: &mut dyn OutputSite,
    ) -> Result<(), BridgeError> {
        let text: String = fragments
            .iter()
            .filter(|f| f.action.is_speakable())
            .map(|f| f.text.as_str())
            .collect();
        log::debug!(
            "Speak: {} fragment(s), {} characters, flags {:#x}",
            fragments.len(),
            text.chars().count(),
            flags.0
        );

        if let Some(format) = format {
            log::debug!(
                "Output format: {} Hz, {} channel(s), {} bits",
                format.samples_per_sec,
                format.channels,
                format.bits_per_sample
            );
        }
        if text.trim().is_empty() {
            log::debug!("Nothing to speak");
            return Ok(());
        }
        if site.actions().contains(SiteActions::ABORT) {
            log::info!("Speak aborted by the host before synthesis");
            return Ok(());
        }

        let request = SpeakRequest::new(&text)
            .with_rate(site.rate())
            .with_volume(site.volume());
        let audio = self.router.synthesize(&request)?;

        if site.actions().contains(SiteActions::ABORT) {
            log::info!("Speak aborted by the host, dropping {} bytes", audio.len());
            return Ok(());
        }

        site.add_events(&[SpeechEvent::new(EventId::StartInputStream, 0)])
            .map_err(BridgeError::Output)?;
        let written = site.write(audio.as_bytes()).map_err(BridgeError::Output)?;
        if written != audio.len() {
            log::warn!("Site accepted {written} of {} bytes", audio.len());
        }
        site.add_events(&[SpeechEvent::new(EventId::EndInputStream, written as u64)])
            .map_err(BridgeError::Output)?;

        log::info!("Wrote {written} bytes of audio");
        Ok(())
    }

    /// PCM, mono, 16-bit at the current engine's live sample rate.
    ///
    /// The requested target format is not negotiated.
    pub fn output_format(&self, target: Option<&WaveFormat>) -> WaveFormat {
        let format = WaveFormat::from(self.router.output_format());
        if let Some(target) = target {
            if target.samples_per_sec != format.samples_per_sec {
                log::debug!(
                    "Host asked for {} Hz, engine produces {} Hz",
                    target.samples_per_sec,
                    format.samples_per_sec
                );
            }
        }
        format
    }
}
