//! Claim bundles on disk: `claim <n>/` directories holding a description,
//! Markdown documents, document images and an optional reference answer.

use std::path::{Path, PathBuf};

use base64::Engine as _;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pipeline::decision::ExpectedAnswer;

const DESCRIPTION_FILE: &str = "description.txt";
const ANSWER_FILE: &str = "answer.json";
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp"];

#[derive(Error, Debug)]
pub enum BundleError {
    #[error("Claim {0} not found")]
    ClaimNotFound(u32),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed answer file for claim {claim}: {reason}")]
    MalformedAnswer { claim: u32, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Markdown,
}

/// A text document supplied with a claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub filename: String,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: DocumentKind,
}

/// An image file supplied with a claim. Bytes are read on demand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRef {
    pub filename: String,
    pub path: PathBuf,
}

impl ImageRef {
    /// MIME type from the file extension; unknown extensions are sent as JPEG.
    pub fn mime_type(&self) -> &'static str {
        match extension_lower(&self.path).as_deref() {
            Some("png") => "image/png",
            Some("webp") => "image/webp",
            _ => "image/jpeg",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClaimBundle {
    pub id: u32,
    pub description: String,
    pub documents: Vec<Document>,
    pub images: Vec<ImageRef>,
    pub expected_answer: Option<ExpectedAnswer>,
}

/// Image as returned by the preview endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ImagePreview {
    pub filename: String,
    /// `data:<mime>;base64,...`
    pub data: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClaimPreview {
    pub claim_number: u32,
    pub description: String,
    pub documents: Vec<Document>,
    pub images: Vec<ImagePreview>,
    pub expected_answer: Option<ExpectedAnswer>,
}

/// Reads claim bundles from the claims root directory.
#[derive(Debug, Clone)]
pub struct ClaimBundleLoader {
    root: PathBuf,
    max_claim_id: u32,
}

impl ClaimBundleLoader {
    pub fn new(root: impl Into<PathBuf>, max_claim_id: u32) -> Self {
        Self {
            root: root.into(),
            max_claim_id,
        }
    }

    pub fn claim_dir(&self, id: u32) -> PathBuf {
        self.root.join(format!("claim {id}"))
    }

    /// Ids in `1..=max_claim_id` whose directory exists, ascending.
    pub fn available_claims(&self) -> Vec<u32> {
        (1..=self.max_claim_id)
            .filter(|id| self.claim_dir(*id).is_dir())
            .collect()
    }

    pub fn load(&self, id: u32) -> Result<ClaimBundle, BundleError> {
        let dir = self.claim_dir(id);
        if !dir.is_dir() {
            return Err(BundleError::ClaimNotFound(id));
        }

        let description_path = dir.join(DESCRIPTION_FILE);
        let description = if description_path.is_file() {
            read_to_string(&description_path)?
        } else {
            String::new()
        };

        let answer_path = dir.join(ANSWER_FILE);
        let expected_answer = if answer_path.is_file() {
            let raw = read_to_string(&answer_path)?;
            let answer = serde_json::from_str(&raw).map_err(|e| BundleError::MalformedAnswer {
                claim: id,
                reason: e.to_string(),
            })?;
            Some(answer)
        } else {
            None
        };

        let mut entries: Vec<PathBuf> = std::fs::read_dir(&dir)
            .map_err(|source| BundleError::Io {
                path: dir.clone(),
                source,
            })?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file())
            .collect();
        entries.sort();

        let mut documents = Vec::new();
        let mut images = Vec::new();
        for path in entries {
            let Some(filename) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
                continue;
            };
            match extension_lower(&path).as_deref() {
                Some("md") => documents.push(Document {
                    content: read_to_string(&path)?,
                    filename,
                    kind: DocumentKind::Markdown,
                }),
                Some(ext) if IMAGE_EXTENSIONS.contains(&ext) => images.push(ImageRef { filename, path }),
                _ => {}
            }
        }

        tracing::debug!(
            claim = id,
            documents = documents.len(),
            images = images.len(),
            has_answer = expected_answer.is_some(),
            "Claim bundle loaded"
        );

        Ok(ClaimBundle {
            id,
            description,
            documents,
            images,
            expected_answer,
        })
    }

    /// Bundle contents with images inlined as data URLs.
    pub fn preview(&self, id: u32) -> Result<ClaimPreview, BundleError> {
        let bundle = self.load(id)?;
        let images = bundle
            .images
            .iter()
            .map(|image| {
                let bytes = std::fs::read(&image.path).map_err(|source| BundleError::Io {
                    path: image.path.clone(),
                    source,
                })?;
                Ok(ImagePreview {
                    filename: image.filename.clone(),
                    data: format!(
                        "data:{};base64,{}",
                        image.mime_type(),
                        base64::engine::general_purpose::STANDARD.encode(bytes)
                    ),
                })
            })
            .collect::<Result<Vec<_>, BundleError>>()?;

        Ok(ClaimPreview {
            claim_number: bundle.id,
            description: bundle.description,
            documents: bundle.documents,
            images,
            expected_answer: bundle.expected_answer,
        })
    }
}

fn extension_lower(path: &Path) -> Option<String> {
    path.extension().map(|e| e.to_string_lossy().to_ascii_lowercase())
}

fn read_to_string(path: &Path) -> Result<String, BundleError> {
    std::fs::read_to_string(path).map_err(|source| BundleError::Io {
        path: path.to_path_buf(),
        source,
    })
}
