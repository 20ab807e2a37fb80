//! Host-facing facades modelling the SAPI engine and voice surfaces.
//!
//! [`engine::TtsEngine`] follows `ISpTTSEngine` + `ISpObjectWithToken`;
//! [`voice::SpeechVoice`] follows `ISpVoice`. Both are plain Rust types: the
//! COM registration and vtable glue that exposes them to SAPI lives outside
//! this crate and forwards each call unchanged.

pub mod engine;
pub mod host;
pub mod voice;

use std::io;

use crate::AudioFormat;

pub use engine::TtsEngine;
pub use host::BridgeHost;
pub use voice::{NotifySink, RunState, SpeechVoice, VoiceStatus};

/// `SPF_*` speak flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SpeakFlags(pub u32);

impl SpeakFlags {
    pub const DEFAULT: SpeakFlags = SpeakFlags(0);
    pub const ASYNC: SpeakFlags = SpeakFlags(1);
    pub const PURGE_BEFORE_SPEAK: SpeakFlags = SpeakFlags(2);
    pub const IS_FILENAME: SpeakFlags = SpeakFlags(4);
    pub const IS_XML: SpeakFlags = SpeakFlags(8);
    pub const IS_NOT_XML: SpeakFlags = SpeakFlags(16);

    pub fn contains(self, other: SpeakFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for SpeakFlags {
    type Output = SpeakFlags;

    fn bitor(self, rhs: SpeakFlags) -> SpeakFlags {
        SpeakFlags(self.0 | rhs.0)
    }
}

/// `SPVACTIONS`: what the engine should do with a fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentAction {
    Speak,
    Silence,
    Pronounce,
    Bookmark,
    SpellOut,
    Section,
    ParseUnknownTag,
}

impl FragmentAction {
    /// Actions whose text ends up in the synthesized audio.
    pub fn is_speakable(self) -> bool {
        matches!(
            self,
            FragmentAction::Speak | FragmentAction::Pronounce | FragmentAction::SpellOut
        )
    }
}

/// One entry of the fragment list handed to `Speak`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextFragment {
    pub text: String,
    pub action: FragmentAction,
    /// Offset of this fragment in the caller's original text.
    pub text_offset: u32,
}

impl TextFragment {
    pub fn speak(text: &str) -> Self {
        Self {
            text: text.to_string(),
            action: FragmentAction::Speak,
            text_offset: 0,
        }
    }
}

/// `SPEVENTENUM` ids raised by this engine and voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum EventId {
    StartInputStream = 1,
    EndInputStream = 2,
    VoiceChange = 3,
    TtsBookmark = 4,
    WordBoundary = 5,
    Phoneme = 6,
    SentenceBoundary = 7,
    Viseme = 8,
    TtsAudioLevel = 9,
}

impl EventId {
    /// Bit of this id in an interest mask.
    pub const fn mask(self) -> u64 {
        1u64 << (self as u32)
    }
}

/// `SPEVENT` as queued for the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpeechEvent {
    pub id: EventId,
    pub stream_number: u32,
    /// Byte offset into the audio stream.
    pub audio_offset: u64,
    pub wparam: u64,
    pub lparam: i64,
}

impl SpeechEvent {
    pub fn new(id: EventId, audio_offset: u64) -> Self {
        Self {
            id,
            stream_number: 0,
            audio_offset,
            wparam: 0,
            lparam: 0,
        }
    }
}

/// `SPVESACTIONS` requested by the site between writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SiteActions(pub u32);

impl SiteActions {
    pub const NONE: SiteActions = SiteActions(0);
    pub const ABORT: SiteActions = SiteActions(1);
    pub const SKIP: SiteActions = SiteActions(2);
    pub const RATE: SiteActions = SiteActions(4);
    pub const VOLUME: SiteActions = SiteActions(8);

    pub fn contains(self, other: SiteActions) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }
}

/// `WAVEFORMATEX` for 16-bit PCM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaveFormat {
    pub format_tag: u16,
    pub channels: u16,
    pub samples_per_sec: u32,
    pub avg_bytes_per_sec: u32,
    pub block_align: u16,
    pub bits_per_sample: u16,
}

/// `WAVE_FORMAT_PCM`.
pub const WAVE_FORMAT_PCM: u16 = 1;

impl From<AudioFormat> for WaveFormat {
    fn from(format: AudioFormat) -> Self {
        let block_align = format.channels * format.bits_per_sample / 8;
        Self {
            format_tag: WAVE_FORMAT_PCM,
            channels: format.channels,
            samples_per_sec: format.sample_rate,
            avg_bytes_per_sec: format.sample_rate * u32::from(block_align),
            block_align,
            bits_per_sample: format.bits_per_sample,
        }
    }
}

/// The host's `ISpTTSEngineSite`: where audio and events go.
pub trait OutputSite {
    /// Write audio bytes, returning how many were accepted.
    fn write(&mut self, data: &[u8]) -> io::Result<usize>;

    fn add_events(&mut self, events: &[SpeechEvent]) -> io::Result<()>;

    fn actions(&self) -> SiteActions {
        SiteActions::NONE
    }

    /// Current SAPI rate adjustment, -10..=10.
    fn rate(&self) -> i32 {
        0
    }

    /// Current SAPI volume, 0..=100.
    fn volume(&self) -> u32 {
        100
    }
}

/// An [`OutputSite`] that keeps everything in memory.
#[derive(Debug, Default)]
pub struct BufferSite {
    pub audio: Vec<u8>,
    pub events: Vec<SpeechEvent>,
    pub actions: SiteActions,
    pub rate: i32,
    pub volume: u32,
}

impl BufferSite {
    pub fn new() -> Self {
        Self {
            volume: 100,
            ..Self::default()
        }
    }
}

impl OutputSite for BufferSite {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.audio.extend_from_slice(data);
        Ok(data.len())
    }

    fn add_events(&mut self, events: &[SpeechEvent]) -> io::Result<()> {
        self.events.extend_from_slice(events);
        Ok(())
    }

    fn actions(&self) -> SiteActions {
        self.actions
    }

    fn rate(&self) -> i32 {
        self.rate
    }

    fn volume(&self) -> u32 {
        self.volume
    }
}
