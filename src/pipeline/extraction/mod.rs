pub mod types;
pub mod ocr;
pub mod vision;

pub use types::*;
pub use ocr::*;
pub use vision::*;

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Tesseract binary could not be started ({binary}): {reason}")]
    OcrInit { binary: PathBuf, reason: String },

    #[error("OCR processing failed: {0}")]
    OcrProcessing(String),

    #[error("Text encoding error: {0}")]
    EncodingError(String),
}
