use std::fmt;

use serde::{Deserialize, Serialize};

use super::grounding::GroundingRecord;

/// The three verdicts a claim can receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DecisionKind {
    #[serde(alias = "approve", alias = "Approve")]
    Approve,
    #[serde(alias = "deny", alias = "Deny")]
    Deny,
    #[serde(alias = "uncertain", alias = "Uncertain")]
    Uncertain,
}

impl DecisionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "APPROVE",
            Self::Deny => "DENY",
            Self::Uncertain => "UNCERTAIN",
        }
    }

    /// Case-insensitive parse; surrounding whitespace ignored.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "APPROVE" => Some(Self::Approve),
            "DENY" => Some(Self::Deny),
            "UNCERTAIN" => Some(Self::Uncertain),
            _ => None,
        }
    }
}

impl fmt::Display for DecisionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final decision for one claim.
///
/// Fields the model returns beyond `decision` and `explanation` (reasoning,
/// flags, facility notes, …) are kept verbatim in `extra` and serialized
/// flat next to the known fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub decision: DecisionKind,
    #[serde(default)]
    pub explanation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
    #[serde(
        rename = "google_search_grounding",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub grounding: Vec<GroundingRecord>,
    #[serde(rename = "clinic_verification_enabled", default)]
    pub verification_enabled: bool,
}

impl Decision {
    pub fn new(decision: DecisionKind, explanation: impl Into<String>) -> Self {
        Self {
            decision,
            explanation: explanation.into(),
            raw_response: None,
            extra: serde_json::Map::new(),
            grounding: Vec::new(),
            verification_enabled: false,
        }
    }

    /// UNCERTAIN decision carrying the unparseable model text.
    pub fn unparseable(reason: &str, raw_text: &str) -> Self {
        Self {
            raw_response: Some(raw_text.to_string()),
            ..Self::new(
                DecisionKind::Uncertain,
                format!("Error parsing LLM response: {reason}"),
            )
        }
    }
}
