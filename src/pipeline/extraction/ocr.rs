use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;

use super::types::{OcrEngine, OcrPage, OcrResult, OcrToken};
use super::ExtractionError;

/// Language every OCR pass starts from.
pub const DEFAULT_LANGUAGE: &str = "eng";

/// Filename keyword → Tesseract language codes. Matching is a
/// case-insensitive substring test and several hints may apply at once.
const LANGUAGE_HINTS: &[(&str, &[&str])] = &[
    ("french", &["fra"]),
    ("spanish", &["spa"]),
    ("italian", &["ita"]),
    ("german", &["deu"]),
    ("belgian", &["fra", "nld"]),
];

/// Resolve the OCR language set for an image from its file name.
pub fn select_languages(filename: &str) -> Vec<String> {
    let lowered = filename.to_lowercase();
    let mut languages = vec![DEFAULT_LANGUAGE.to_string()];
    for (keyword, codes) in LANGUAGE_HINTS {
        if lowered.contains(keyword) {
            for code in *codes {
                if !languages.iter().any(|l| l == code) {
                    languages.push((*code).to_string());
                }
            }
        }
    }
    languages
}

/// Runs OCR on claim images and never fails: every error is folded into an
/// `OcrResult` with `success = false`.
#[derive(Clone)]
pub struct OcrAdapter {
    engine: Arc<dyn OcrEngine>,
}

impl OcrAdapter {
    pub fn new(engine: Arc<dyn OcrEngine>) -> Self {
        Self { engine }
    }

    pub fn extract(&self, image_path: &Path) -> OcrResult {
        let filename = image_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let languages = select_languages(&filename);

        let page = std::fs::read(image_path)
            .map_err(ExtractionError::from)
            .and_then(|bytes| self.engine.recognize(&bytes, &languages));

        match page {
            Ok(page) => {
                let text = page.text.trim().to_string();
                let result = OcrResult {
                    word_count: text.split_whitespace().count(),
                    confidence: page.mean_confidence(),
                    text,
                    languages_used: languages,
                    success: true,
                    error: None,
                };
                tracing::debug!(
                    file = %filename,
                    languages = %result.languages_used.join("+"),
                    words = result.word_count,
                    confidence = result.confidence,
                    "OCR complete"
                );
                result
            }
            Err(e) => {
                tracing::warn!(file = %filename, error = %e, "OCR failed, continuing without text");
                OcrResult::failed(format!("OCR failed: {e}"), languages)
            }
        }
    }
}

// ──────────────────────────────────────────────
// Tesseract CLI engine
// ──────────────────────────────────────────────

/// OCR engine backed by the `tesseract` executable.
///
/// Image bytes are piped on stdin and TSV is read from stdout, so no
/// temporary files are needed.
pub struct TesseractCli {
    binary: PathBuf,
}

impl TesseractCli {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl OcrEngine for TesseractCli {
    fn recognize(&self, image_bytes: &[u8], languages: &[String]) -> Result<OcrPage, ExtractionError> {
        let lang = if languages.is_empty() {
            DEFAULT_LANGUAGE.to_string()
        } else {
            languages.join("+")
        };

        let mut child = Command::new(&self.binary)
            .args(["stdin", "stdout", "-l", &lang, "tsv"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ExtractionError::OcrInit {
                binary: self.binary.clone(),
                reason: e.to_string(),
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(image_bytes)?;
        }

        let output = child.wait_with_output()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExtractionError::OcrProcessing(format!(
                "tesseract exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let tsv = String::from_utf8(output.stdout)
            .map_err(|e| ExtractionError::EncodingError(e.to_string()))?;
        Ok(parse_tsv(&tsv))
    }
}

// ──────────────────────────────────────────────
// Linked libtesseract engine (feature "ocr")
// ──────────────────────────────────────────────

/// OCR engine backed by the linked Tesseract library. Needs a tessdata
/// directory holding the traineddata files for every hinted language.
#[cfg(feature = "ocr")]
pub struct BundledTesseract {
    tessdata_dir: PathBuf,
}

#[cfg(feature = "ocr")]
impl BundledTesseract {
    pub fn new(tessdata_dir: &Path) -> Result<Self, ExtractionError> {
        if !tessdata_dir.is_dir() {
            return Err(ExtractionError::OcrInit {
                binary: tessdata_dir.to_path_buf(),
                reason: "tessdata directory not found".into(),
            });
        }
        Ok(Self {
            tessdata_dir: tessdata_dir.to_path_buf(),
        })
    }
}

#[cfg(feature = "ocr")]
impl OcrEngine for BundledTesseract {
    fn recognize(&self, image_bytes: &[u8], languages: &[String]) -> Result<OcrPage, ExtractionError> {
        let lang = if languages.is_empty() {
            DEFAULT_LANGUAGE.to_string()
        } else {
            languages.join("+")
        };
        let init_error = |reason: String| ExtractionError::OcrInit {
            binary: self.tessdata_dir.clone(),
            reason,
        };
        let datapath = self
            .tessdata_dir
            .to_str()
            .ok_or_else(|| init_error("Invalid tessdata path".into()))?;

        let tess = tesseract::Tesseract::new(Some(datapath), Some(lang.as_str())).map_err(|e| init_error(format!("{e:?}")))?;
        let mut tess = tess
            .set_image_from_mem(image_bytes)
            .map_err(|e| ExtractionError::OcrProcessing(format!("{e:?}")))?;
        let tsv = tess
            .get_tsv_text(0)
            .map_err(|e| ExtractionError::OcrProcessing(format!("{e:?}")))?;

        Ok(parse_tsv(&tsv))
    }
}

/// Pick the OCR backend. The linked library is used when the crate is built
/// with the `ocr` feature and a tessdata directory is configured; otherwise
/// the `tesseract` executable is invoked.
pub fn build_engine(binary: &Path, tessdata_dir: Option<&Path>) -> Result<Arc<dyn OcrEngine>, ExtractionError> {
    match tessdata_dir {
        #[cfg(feature = "ocr")]
        Some(dir) => {
            tracing::info!(tessdata = %dir.display(), "Using linked Tesseract library");
            Ok(Arc::new(BundledTesseract::new(dir)?))
        }
        #[cfg(not(feature = "ocr"))]
        Some(dir) => {
            tracing::warn!(
                tessdata = %dir.display(),
                "tessdata directory configured but built without the `ocr` feature, using the tesseract executable"
            );
            Ok(Arc::new(TesseractCli::new(binary)))
        }
        None => Ok(Arc::new(TesseractCli::new(binary))),
    }
}

/// Parse Tesseract TSV output into text and per-word confidences.
/// TSV columns: level page_num block_num par_num line_num word_num left top width height conf text
/// Level 5 = individual word entries. Confidence stays on the 0-100 scale; -1 is kept as the sentinel.
/// Text is rebuilt line by line, with a blank line between paragraphs.
fn parse_tsv(tsv: &str) -> OcrPage {
    let mut tokens = Vec::new();
    let mut text = String::new();
    let mut current_line: Option<(&str, &str, &str, &str)> = None;
    let mut current_par: Option<(&str, &str, &str)> = None;

    for line in tsv.lines().skip(1) {
        // Skip header row
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 12 {
            continue;
        }

        // Level 5 = word
        match fields[0].parse::<i32>() {
            Ok(5) => {}
            _ => continue,
        }

        let confidence: f32 = match fields[10].trim().parse() {
            Ok(c) => c,
            Err(_) => continue,
        };

        let word = fields[11].trim();
        if word.is_empty() {
            continue;
        }

        let par_key = (fields[1], fields[2], fields[3]);
        let line_key = (fields[1], fields[2], fields[3], fields[4]);
        if current_line != Some(line_key) {
            if current_line.is_some() {
                text.push('\n');
                if current_par != Some(par_key) {
                    text.push('\n');
                }
            }
            current_line = Some(line_key);
            current_par = Some(par_key);
        } else {
            text.push(' ');
        }
        text.push_str(word);

        tokens.push(OcrToken {
            text: word.to_string(),
            confidence,
        });
    }

    OcrPage { text, tokens }
}

/// Mock OCR engine for unit testing without Tesseract.
pub struct MockOcrEngine {
    pub text: String,
    pub confidence: f32,
}

impl MockOcrEngine {
    pub fn new(text: &str, confidence: f32) -> Self {
        Self {
            text: text.to_string(),
            confidence,
        }
    }
}

impl OcrEngine for MockOcrEngine {
    fn recognize(&self, _image_bytes: &[u8], _languages: &[String]) -> Result<OcrPage, ExtractionError> {
        let tokens = self
            .text
            .split_whitespace()
            .map(|w| OcrToken {
                text: w.to_string(),
                confidence: self.confidence,
            })
            .collect();

        Ok(OcrPage {
            text: self.text.clone(),
            tokens,
        })
    }
}
