use ndarray::{arr1, Array2};
use ort::execution_providers::CPUExecutionProvider;
use ort::inputs;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::TensorRef;

use super::adapter::LocalNeuralConfig;
use super::error::LocalEngineError;
use super::phonemizer::{EspeakConfig, Frontend};
use super::session::SpeechSession;
use super::tokens::{Lexicon, TokenTable};

/// Used when the model carries no `sample_rate` metadata entry.
const DEFAULT_SAMPLE_RATE: u32 = 22050;

/// Input naming convention of the exported graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InputLayout {
    /// `input`, `input_lengths`, `scales` (Piper export).
    Piper,
    /// `x`, `x_length`, `noise_scale`, `length_scale`, `noise_scale_w`.
    Separate,
}

/// ONNX Runtime session for a VITS-family model.
pub struct VitsModel {
    session: Session,
    tokens: TokenTable,
    frontend: Frontend,
    layout: InputLayout,
    has_speaker_input: bool,
    sample_rate: u32,
    noise_scale: f32,
    noise_scale_w: f32,
    length_scale: f32,
    speaker_id: i64,
}

impl VitsModel {
    /// Load the model, its token table and the configured front end.
    pub fn load(config: &LocalNeuralConfig) -> Result<Self, LocalEngineError> {
        log::info!("Loading VITS model from {}", config.model_path.display());

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_execution_providers(vec![CPUExecutionProvider::default().build()])?
            .with_intra_threads(config.num_threads)?
            .commit_from_file(&config.model_path)?;

        let layout = detect_layout(&session);
        let has_speaker_input = session.inputs().iter().any(|i| i.name() == "sid");
        let sample_rate = read_sample_rate(&session);
        log::info!(
            "Detected: layout={:?}, speaker_input={}, sample_rate={}",
            layout,
            has_speaker_input,
            sample_rate
        );

        let tokens = TokenTable::load(&config.tokens_path)?;
        let frontend = build_frontend(config)?;

        Ok(Self {
            session,
            tokens,
            frontend,
            layout,
            has_speaker_input,
            sample_rate,
            noise_scale: config.noise_scale,
            noise_scale_w: config.noise_scale_w,
            length_scale: config.length_scale,
            speaker_id: config.speaker_id,
        })
    }

    fn run(&mut self, ids: &[i64]) -> Result<Vec<f32>, LocalEngineError> {
        let ids_arr = Array2::from_shape_vec((1, ids.len()), ids.to_vec())?;
        let lengths = arr1(&[ids.len() as i64]);
        let sid = arr1(&[self.speaker_id]);
        let scales = arr1(&[self.noise_scale, self.length_scale, self.noise_scale_w]);
        let noise = arr1(&[self.noise_scale]);
        let length = arr1(&[self.length_scale]);
        let noise_w = arr1(&[self.noise_scale_w]);

        let mut model_inputs = match self.layout {
            InputLayout::Piper => inputs![
                "input" => TensorRef::from_array_view(ids_arr.view())?,
                "input_lengths" => TensorRef::from_array_view(lengths.view())?,
                "scales" => TensorRef::from_array_view(scales.view())?,
            ],
            InputLayout::Separate => inputs![
                "x" => TensorRef::from_array_view(ids_arr.view())?,
                "x_length" => TensorRef::from_array_view(lengths.view())?,
                "noise_scale" => TensorRef::from_array_view(noise.view())?,
                "length_scale" => TensorRef::from_array_view(length.view())?,
                "noise_scale_w" => TensorRef::from_array_view(noise_w.view())?,
            ],
        };
        if self.has_speaker_input {
            model_inputs.push((
                "sid".into(),
                TensorRef::from_array_view(sid.view())?.into(),
            ));
        }

        let output = self.session.run(model_inputs)?;
        let first_output = output
            .iter()
            .next()
            .ok_or_else(|| LocalEngineError::Ort(ort::Error::new("No output from model")))?;
        let waveform = first_output.1.try_extract_array::<f32>()?;

        Ok(waveform.iter().copied().collect())
    }
}

impl SpeechSession for VitsModel {
    fn generate(&mut self, text: &str) -> Result<Vec<f32>, LocalEngineError> {
        let ids = self.frontend.to_token_ids(text, &self.tokens)?;
        if ids.is_empty() {
            log::warn!("No tokens produced for text: {text:?}");
            return Err(LocalEngineError::EmptyOutput);
        }
        let framed = self.tokens.intersperse(&ids);
        let audio = self.run(&framed)?;
        if audio.is_empty() {
            return Err(LocalEngineError::EmptyOutput);
        }
        Ok(audio)
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn describe(&self) -> String {
        format!("VITS, {:?} inputs, {} tokens", self.layout, self.tokens.len())
    }
}

fn build_frontend(config: &LocalNeuralConfig) -> Result<Frontend, LocalEngineError> {
    if let Some(lexicon) = &config.lexicon_path {
        return Ok(Frontend::Lexicon(Lexicon::load(lexicon)?));
    }
    if config.data_dir.is_some() {
        return Ok(Frontend::Espeak {
            config: EspeakConfig {
                bin_path: config.espeak_path.clone(),
                data_path: config.data_dir.clone(),
            },
            voice: config.language.clone(),
        });
    }
    Ok(Frontend::Characters)
}

fn detect_layout(session: &Session) -> InputLayout {
    if session.inputs().iter().any(|i| i.name() == "scales") {
        InputLayout::Piper
    } else {
        InputLayout::Separate
    }
}

fn read_sample_rate(session: &Session) -> u32 {
    let declared = session
        .metadata()
        .ok()
        .and_then(|meta| meta.custom("sample_rate").ok().flatten())
        .and_then(|value| value.trim().parse::<u32>().ok());
    match declared {
        Some(rate) if rate > 0 => rate,
        _ => {
            log::warn!("Model has no sample_rate metadata, assuming {DEFAULT_SAMPLE_RATE} Hz");
            DEFAULT_SAMPLE_RATE
        }
    }
}
