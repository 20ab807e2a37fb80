#[derive(thiserror::Error, Debug)]
pub enum LocalEngineError {
    #[cfg(feature = "vits")]
    #[error("ONNX runtime error: {0}")]
    Ort(#[from] ort::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[cfg(feature = "vits")]
    #[error("Array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
    #[error(
        "espeak-ng not found. Install it or point `espeakPath` at a bundled binary: \
         https://espeak-ng.org/download"
    )]
    EspeakNotFound,
    #[error("Phonemization failed: {0}")]
    PhonemizerFailed(String),
    #[error("Invalid tokens file: {0}")]
    Tokens(String),
    #[error("Invalid lexicon file: {0}")]
    Lexicon(String),
    #[error("Model produced no audio")]
    EmptyOutput,
}
