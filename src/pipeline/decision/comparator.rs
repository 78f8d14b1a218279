use serde::{Deserialize, Serialize};

use super::types::DecisionKind;

/// Reference answer shipped with a claim bundle (`answer.json`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExpectedAnswer {
    #[serde(default)]
    pub decision: Option<DecisionKind>,
    #[serde(default)]
    pub acceptable_decision: Option<DecisionKind>,
    /// Anything else in the answer file (notes, rationale) is kept as-is.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchOutcome {
    pub exact_match: bool,
    pub acceptable_match: bool,
    pub expected: Option<DecisionKind>,
    pub acceptable_alternative: Option<DecisionKind>,
    pub actual: DecisionKind,
}

impl MatchOutcome {
    pub fn is_match(&self) -> bool {
        self.exact_match || self.acceptable_match
    }
}

/// Compare the model's decision with the reference answer.
/// `None` when the claim has no reference answer.
pub fn compare(actual: DecisionKind, expected: Option<&ExpectedAnswer>) -> Option<MatchOutcome> {
    let expected = expected?;
    Some(MatchOutcome {
        exact_match: expected.decision == Some(actual),
        acceptable_match: expected.acceptable_decision == Some(actual),
        expected: expected.decision,
        acceptable_alternative: expected.acceptable_decision,
        actual,
    })
}
