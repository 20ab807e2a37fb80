use std::borrow::Cow;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use super::error::LocalEngineError;
use super::tokens::{Lexicon, TokenTable};

/// Location of the espeak-ng binary and its data directory.
#[derive(Debug, Clone, Default)]
pub struct EspeakConfig {
    /// `None` runs `espeak-ng` from PATH.
    pub bin_path: Option<PathBuf>,
    /// Either an `espeak-ng-data` directory or its parent.
    pub data_path: Option<PathBuf>,
}

impl EspeakConfig {
    fn binary(&self) -> &Path {
        self.bin_path
            .as_deref()
            .unwrap_or_else(|| Path::new("espeak-ng"))
    }

    /// espeak-ng's `--path` wants the directory that *contains* `espeak-ng-data`.
    fn search_path(&self) -> Option<&Path> {
        let data = self.data_path.as_deref()?;
        if data.file_name().and_then(|n| n.to_str()) == Some("espeak-ng-data") {
            data.parent()
        } else {
            Some(data)
        }
    }
}

/// How text becomes model tokens.
#[derive(Debug, Clone)]
pub enum Frontend {
    /// IPA via espeak-ng, one token per IPA character (Piper voices).
    Espeak { config: EspeakConfig, voice: String },
    /// Word lookup in a lexicon, one token per pronunciation symbol.
    Lexicon(Lexicon),
    /// Raw characters of the input text (character-level models such as MMS).
    Characters,
}

impl Frontend {
    /// Convert text to token IDs. Symbols not in the table are dropped.
    pub fn to_token_ids(&self, text: &str, tokens: &TokenTable) -> Result<Vec<i64>, LocalEngineError> {
        match self {
            Frontend::Espeak { config, voice } => phonemize(text, voice, tokens, config),
            Frontend::Lexicon(lexicon) => Ok(lexicon_ids(text, lexicon, tokens)),
            Frontend::Characters => Ok(text
                .to_lowercase()
                .chars()
                .filter_map(|ch| tokens.get_char(ch))
                .collect()),
        }
    }
}

/// IPA token ids for `text`, phonemized by espeak-ng with voice `lang`.
///
/// Sentence punctuation is kept as its own token followed by a word gap.
/// IPA symbols missing from `tokens` are dropped.
pub fn phonemize(
    text: &str,
    lang: &str,
    tokens: &TokenTable,
    espeak: &EspeakConfig,
) -> Result<Vec<i64>, LocalEngineError> {
    let chunks = chunk_text(text);
    let words: Vec<&str> = chunks.iter().filter_map(Chunk::words).collect();
    let mut phonemes = if words.is_empty() {
        Vec::new()
    } else {
        espeak_lines(&words, lang, espeak)?
    }
    .into_iter();

    let gap = tokens.get_char(' ');
    let mut ids = Vec::new();
    for chunk in &chunks {
        match chunk {
            Chunk::Words(_) => {
                if let Some(line) = phonemes.next() {
                    ids.extend(ipa_to_ids(&line, tokens));
                }
            }
            Chunk::Pause(mark) => {
                ids.extend(tokens.get_char(*mark));
                ids.extend(gap);
            }
        }
    }
    Ok(ids)
}

fn lexicon_ids(text: &str, lexicon: &Lexicon, tokens: &TokenTable) -> Vec<i64> {
    let gap = tokens.get(" ");
    let mut ids = Vec::new();
    for chunk in chunk_text(text) {
        let words = match chunk {
            Chunk::Pause(mark) => {
                ids.extend(tokens.get_char(mark));
                continue;
            }
            Chunk::Words(words) => words,
        };
        for word in words.split_whitespace() {
            match lexicon.pronounce(word) {
                Some(symbols) => ids.extend(symbols.iter().filter_map(|s| tokens.get(s))),
                None => log::warn!("Word not in lexicon, skipping: {word:?}"),
            }
            ids.extend(gap);
        }
    }
    ids
}

/// A run of words, or a punctuation mark that ends one.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Chunk {
    Words(String),
    Pause(char),
}

impl Chunk {
    fn words(&self) -> Option<&str> {
        match self {
            Chunk::Words(words) => Some(words),
            Chunk::Pause(_) => None,
        }
    }
}

/// Split at pause marks and collapse whitespace. A `.` or `,` between two
/// digits stays inside the number.
fn chunk_text(text: &str) -> Vec<Chunk> {
    let chars: Vec<char> = text.chars().collect();
    let mut chunks = Vec::new();
    let mut words = String::new();

    for (i, &ch) in chars.iter().enumerate() {
        let inside_number = matches!(ch, '.' | ',')
            && i > 0
            && chars[i - 1].is_ascii_digit()
            && chars.get(i + 1).is_some_and(|c| c.is_ascii_digit());

        match pause_mark(ch) {
            Some(mark) if !inside_number => {
                push_words(&mut chunks, &mut words);
                chunks.push(Chunk::Pause(mark));
            }
            _ if ch.is_whitespace() => {
                if !words.is_empty() && !words.ends_with(' ') {
                    words.push(' ');
                }
            }
            _ => words.push(ch),
        }
    }
    push_words(&mut chunks, &mut words);
    chunks
}

fn push_words(chunks: &mut Vec<Chunk>, words: &mut String) {
    let trimmed = words.trim();
    if !trimmed.is_empty() {
        chunks.push(Chunk::Words(trimmed.to_string()));
    }
    words.clear();
}

/// Characters that break a sentence into separately phonemized chunks.
/// Line breaks read as a full stop.
fn pause_mark(ch: char) -> Option<char> {
    match ch {
        '\n' | '\r' => Some('.'),
        '.' | '!' | '?' | ',' | ';' | ':' | '(' | ')' | '"' => Some(ch),
        '\u{2014}' | '\u{2026}' | '\u{201c}' | '\u{201d}' => Some(ch),
        _ => None,
    }
}

/// One IPA line per input line. espeak-ng sometimes merges lines in stdin
/// mode; then every chunk is phonemized on its own.
fn espeak_lines(
    chunks: &[&str],
    lang: &str,
    espeak: &EspeakConfig,
) -> Result<Vec<String>, LocalEngineError> {
    let output = run_espeak(&chunks.join("\n"), lang, espeak)?;
    let lines: Vec<String> = output.lines().map(str::to_string).collect();
    if lines.len() == chunks.len() {
        return Ok(lines);
    }
    log::debug!(
        "espeak-ng returned {} lines for {} chunks, phonemizing one by one",
        lines.len(),
        chunks.len()
    );
    chunks
        .iter()
        .map(|chunk| run_espeak(chunk, lang, espeak))
        .collect()
}

fn run_espeak(input: &str, lang: &str, espeak: &EspeakConfig) -> Result<String, LocalEngineError> {
    let mut command = Command::new(espeak.binary());
    command
        .args(["--ipa", "--stdin", "-q", "-v", lang])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(path) = espeak.search_path() {
        command.arg(format!("--path={}", path.display()));
    }

    let mut child = command.spawn().map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => LocalEngineError::EspeakNotFound,
        _ => LocalEngineError::Io(e),
    })?;
    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(terminated(input).as_bytes())?;
    }

    let output = child.wait_with_output()?;
    if !output.status.success() {
        return Err(LocalEngineError::PhonemizerFailed(format!(
            "espeak-ng exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// espeak-ng under-processes a last line that has no terminator.
fn terminated(input: &str) -> Cow<'_, str> {
    if input.ends_with('\n') {
        Cow::Borrowed(input)
    } else {
        Cow::Owned(format!("{input}\n"))
    }
}

fn ipa_to_ids(ipa: &str, tokens: &TokenTable) -> Vec<i64> {
    ipa.lines()
        .flat_map(|line| line.trim().chars())
        .filter(|&ch| ch != '_')
        .filter_map(|ch| tokens.get_char(ch))
        .collect()
}
