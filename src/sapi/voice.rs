use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::path::Path;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Duration;

use super::{
    EventId, OutputSite, SiteActions, SpeakFlags, SpeechEvent, TextFragment, TtsEngine,
};
use crate::error::BridgeError;

/// Receives a callback whenever an event of interest is queued.
pub trait NotifySink: Send + Sync {
    fn notify(&self);
}

impl<F: Fn() + Send + Sync> NotifySink for F {
    fn notify(&self) {
        self()
    }
}

/// `SPRUNSTATE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Done,
    Speaking,
}

/// `SPVOICESTATUS` subset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceStatus {
    pub running_state: RunState,
    pub current_stream: u32,
    pub last_stream_queued: u32,
    /// Outcome of the most recent speak call, `None` once it succeeded.
    pub last_error: Option<String>,
}

struct VoiceState {
    status: VoiceStatus,
    rate: i32,
    volume: u32,
    priority: i32,
    alert_boundary: EventId,
    sync_timeout_ms: u32,
    token: Option<String>,
    interest: u64,
    queued_interest: u64,
}

impl VoiceState {
    fn set_running(&mut self, state: RunState) {
        if state == RunState::Speaking {
            self.status.current_stream += 1;
            self.status.last_stream_queued = self.status.current_stream;
        }
        self.status.running_state = state;
    }
}

/// A voice object: per-caller prosody, status and an event queue in front of a [`TtsEngine`].
pub struct SpeechVoice {
    engine: TtsEngine,
    state: Mutex<VoiceState>,
    done: Condvar,
    events: Mutex<VecDeque<SpeechEvent>>,
    notify: Mutex<Option<Box<dyn NotifySink>>>,
    output: Mutex<Box<dyn Write + Send>>,
}

impl SpeechVoice {
    /// A voice that discards its audio until [`set_output`](Self::set_output) is called.
    pub fn new(engine: TtsEngine) -> Self {
        let start_end = EventId::StartInputStream.mask() | EventId::EndInputStream.mask();
        Self {
            engine,
            state: Mutex::new(VoiceState {
                status: VoiceStatus {
                    running_state: RunState::Done,
                    current_stream: 0,
                    last_stream_queued: 0,
                    last_error: None,
                },
                rate: 0,
                volume: 100,
                priority: 0,
                alert_boundary: EventId::WordBoundary,
                sync_timeout_ms: 10_000,
                token: None,
                interest: start_end,
                queued_interest: start_end,
            }),
            done: Condvar::new(),
            events: Mutex::new(VecDeque::new()),
            notify: Mutex::new(None),
            output: Mutex::new(Box::new(io::sink())),
        }
    }

    pub fn engine(&self) -> &TtsEngine {
        &self.engine
    }

    fn state(&self) -> MutexGuard<'_, VoiceState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_output(&self, output: Box<dyn Write + Send>) {
        *self.output.lock().unwrap_or_else(|e| e.into_inner()) = output;
    }

    /// Speak `text` synchronously and return its stream number.
    ///
    /// With [`SpeakFlags::IS_FILENAME`] the text names a file to read instead.
    pub fn speak(&self, text: &str, flags: SpeakFlags) -> Result<u32, BridgeError> {
        if flags.contains(SpeakFlags::IS_FILENAME) {
            let mut file = std::fs::File::open(Path::new(text)).map_err(BridgeError::Output)?;
            let remaining = SpeakFlags(flags.0 & !SpeakFlags::IS_FILENAME.0);
            return self.speak_stream(&mut file, remaining);
        }
        if flags.contains(SpeakFlags::PURGE_BEFORE_SPEAK) {
            self.events.lock().unwrap_or_else(|e| e.into_inner()).clear();
        }

        let (stream, rate, volume) = {
            let mut state = self.state();
            state.set_running(RunState::Speaking);
            (state.status.current_stream, state.rate, state.volume)
        };
        log::debug!("Speak stream {stream}: {} characters", text.chars().count());

        let mut captured = Vec::new();
        let result = {
            let mut output = self.output.lock().unwrap_or_else(|e| e.into_inner());
            let mut site = VoiceSite {
                output: &mut **output,
                events: &mut captured,
                rate,
                volume,
            };
            let format = self.engine.output_format(None);
            self.engine
                .speak(flags, Some(&format), &[TextFragment::speak(text)], &mut site)
        };

        {
            let mut state = self.state();
            state.status.last_error = result.as_ref().err().map(|e| e.to_string());
            state.set_running(RunState::Done);
        }
        self.done.notify_all();

        for mut event in captured {
            event.stream_number = stream;
            self.fire_event(event);
        }
        result.map(|()| stream)
    }

    /// Read UTF-8 or UTF-16LE text from `reader` and speak it.
    pub fn speak_stream(&self, reader: &mut dyn Read, flags: SpeakFlags) -> Result<u32, BridgeError> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes).map_err(BridgeError::Output)?;
        let text = decode_text(&bytes);
        self.speak(&text, flags)
    }

    /// Queue `event` if it is of interest and wake the notify sink.
    fn fire_event(&self, event: SpeechEvent) {
        let (interest, queued) = {
            let state = self.state();
            (state.interest, state.queued_interest)
        };
        let mask = event.id.mask();
        if queued & mask != 0 {
            self.events
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push_back(event);
        }
        if interest & mask != 0 {
            if let Some(sink) = self.notify.lock().unwrap_or_else(|e| e.into_inner()).as_ref() {
                sink.notify();
            }
        }
    }

    /// Drain up to `max` queued events.
    pub fn get_events(&self, max: usize) -> Vec<SpeechEvent> {
        let mut events = self.events.lock().unwrap_or_else(|e| e.into_inner());
        let n = max.min(events.len());
        events.drain(..n).collect()
    }

    /// Events that wake the sink, and events that are queued for [`get_events`](Self::get_events).
    pub fn set_interest(&self, interest: u64, queued_interest: u64) {
        let mut state = self.state();
        state.interest = interest;
        state.queued_interest = queued_interest;
    }

    pub fn interest(&self) -> (u64, u64) {
        let state = self.state();
        (state.interest, state.queued_interest)
    }

    pub fn set_notify_sink(&self, sink: Option<Box<dyn NotifySink>>) {
        *self.notify.lock().unwrap_or_else(|e| e.into_inner()) = sink;
    }

    pub fn status(&self) -> VoiceStatus {
        self.state().status.clone()
    }

    pub fn pause(&self) {
        self.state().set_running(RunState::Done);
        self.done.notify_all();
    }

    pub fn resume(&self) {
        self.state().set_running(RunState::Speaking);
    }

    /// Bind a voice token; the engine resolves it to a backend.
    pub fn set_voice(&self, token_id: &str) -> Result<(), BridgeError> {
        let engine_id = self.engine.set_object_token(token_id)?;
        log::info!("Voice {token_id} mapped to engine {engine_id}");
        self.state().token = Some(token_id.to_string());
        Ok(())
    }

    /// The bound voice token, if any.
    pub fn voice(&self) -> Option<String> {
        self.state().token.clone()
    }

    /// Clamped to -10..=10.
    pub fn set_rate(&self, rate: i32) {
        self.state().rate = rate.clamp(-10, 10);
    }

    pub fn rate(&self) -> i32 {
        self.state().rate
    }

    /// Clamped to 0..=100.
    pub fn set_volume(&self, volume: u32) {
        self.state().volume = volume.min(100);
    }

    pub fn volume(&self) -> u32 {
        self.state().volume
    }

    pub fn set_priority(&self, priority: i32) {
        self.state().priority = priority;
    }

    pub fn priority(&self) -> i32 {
        self.state().priority
    }

    pub fn set_alert_boundary(&self, boundary: EventId) {
        self.state().alert_boundary = boundary;
    }

    pub fn alert_boundary(&self) -> EventId {
        self.state().alert_boundary
    }

    pub fn set_sync_speak_timeout(&self, timeout_ms: u32) {
        self.state().sync_timeout_ms = timeout_ms;
    }

    pub fn sync_speak_timeout(&self) -> u32 {
        self.state().sync_timeout_ms
    }

    /// Block until the voice is done. Returns false on timeout.
    pub fn wait_until_done(&self, timeout: Duration) -> bool {
        let state = self.state();
        let (_state, result) = self
            .done
            .wait_timeout_while(state, timeout, |s| s.status.running_state == RunState::Speaking)
            .unwrap_or_else(|e| e.into_inner());
        !result.timed_out()
    }

    /// Skipping is not supported; always reports zero items skipped.
    pub fn skip(&self, _kind: &str, _count: i32) -> u32 {
        0
    }
}

/// Routes engine output into the voice's writer and collects its events.
struct VoiceSite<'a> {
    output: &'a mut (dyn Write + Send),
    events: &'a mut Vec<SpeechEvent>,
    rate: i32,
    volume: u32,
}

impl OutputSite for VoiceSite<'_> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.output.write_all(data)?;
        Ok(data.len())
    }

    fn add_events(&mut self, events: &[SpeechEvent]) -> io::Result<()> {
        self.events.extend_from_slice(events);
        Ok(())
    }

    fn actions(&self) -> SiteActions {
        SiteActions::NONE
    }

    fn rate(&self) -> i32 {
        self.rate
    }

    fn volume(&self) -> u32 {
        self.volume
    }
}

/// UTF-16LE when there is a BOM or the bytes are not UTF-8, UTF-8 otherwise.
fn decode_text(bytes: &[u8]) -> String {
    if let Some(rest) = bytes.strip_prefix(&[0xFF, 0xFE]) {
        return decode_utf16le(rest);
    }
    let bytes = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) if bytes.len() % 2 == 0 => decode_utf16le(bytes),
        Err(_) => String::from_utf8_lossy(bytes).into_owned(),
    }
}

fn decode_utf16le(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16_lossy(&units)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_stream_encodings() {
        assert_eq!(decode_text(b"hello"), "hello");
        assert_eq!(decode_text(&[0xEF, 0xBB, 0xBF, b'h', b'i']), "hi");
        assert_eq!(decode_text(&[0xFF, 0xFE, b'h', 0, b'i', 0]), "hi");
        // Invalid UTF-8 without a BOM falls back to UTF-16LE.
        assert_eq!(decode_text(&[0xE9, 0x00]), "é");
    }

    #[test]
    fn running_state_tracks_stream_numbers() {
        let mut state = VoiceState {
            status: VoiceStatus {
                running_state: RunState::Done,
                current_stream: 0,
                last_stream_queued: 0,
                last_error: None,
            },
            rate: 0,
            volume: 100,
            priority: 0,
            alert_boundary: EventId::WordBoundary,
            sync_timeout_ms: 0,
            token: None,
            interest: 0,
            queued_interest: 0,
        };
        state.set_running(RunState::Speaking);
        state.set_running(RunState::Done);
        state.set_running(RunState::Speaking);
        assert_eq!(state.status.current_stream, 2);
        assert_eq!(state.status.last_stream_queued, 2);
        assert_eq!(state.status.running_state, RunState::Speaking);
    }
}
