//! Local neural text-to-speech backend.
//!
//! Runs VITS-family ONNX models (Piper voices, MMS, lexicon-based VITS) in
//! process. Text reaches the model through one of three front ends:
//!
//! | Config | Front end | Typical models |
//! |---|---|---|
//! | `dataDir` set | espeak-ng IPA | Piper (`vits-piper-*`) |
//! | `lexiconPath` set | lexicon lookup | lexicon VITS models |
//! | neither | raw characters | MMS |
//!
//! # System Requirements
//!
//! Piper voices need **espeak-ng**, either on PATH or bundled through `espeakPath`.
//!
//! # Model Directory Layout
//!
//! ```text
//! models/amy/vits-piper-en_US-amy-low/
//! ├── en_US-amy-low.onnx     # model, with a `sample_rate` metadata entry
//! ├── tokens.txt             # "<symbol> <id>" per line
//! └── espeak-ng-data/        # phonemizer data
//! ```
//!
//! # Configuration
//!
//! ```json
//! {
//!   "modelPath": "models/amy/vits-piper-en_US-amy-low/en_US-amy-low.onnx",
//!   "tokensPath": "models/amy/vits-piper-en_US-amy-low/tokens.txt",
//!   "dataDir": "models/amy/vits-piper-en_US-amy-low/espeak-ng-data",
//!   "noiseScale": 0.667,
//!   "noiseScaleW": 0.8,
//!   "lengthScale": 1.0,
//!   "numThreads": 1
//! }
//! ```

pub mod adapter;
pub mod error;
#[cfg(feature = "vits")]
pub mod model;
#[cfg(feature = "vits")]
pub mod phonemizer;
pub mod session;
#[cfg(feature = "vits")]
pub mod tokens;

pub use adapter::{LocalNeuralAdapter, LocalNeuralConfig};
pub use error::LocalEngineError;
pub use session::{SessionFactory, SpeechSession, VitsSessionFactory};
