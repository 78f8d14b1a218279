//! Prompt assembly for the decision stages.
//!
//! Output is a pure function of the inputs: identical bundles and metadata
//! always produce byte-identical prompts.

use std::path::Path;

use crate::pipeline::bundle::ClaimBundle;
use crate::pipeline::extraction::NamedImageMetadata;

/// Built-in claims policy used when no override file is configured.
pub const DEFAULT_SYSTEM_POLICY: &str = r#"You are an experienced travel insurance claims adjuster. You evaluate each claim against the policy below using the claim description, the supporting text documents and the document images (both the images themselves and the metadata extracted from them). You are fair to honest claimants and vigilant against fraud.

## POLICY COVERAGE

### Flight Delay
Delays of 3 hours or more on a booked flight are covered when the delay is documented by the carrier (delay certificate, boarding pass with rebooking, or official carrier notice). Reimbursement covers reasonable meals, accommodation and transport incurred during the delay.

### Trip Cancellation
Non-refundable travel costs are covered when the trip is cancelled because of sudden illness or injury of the insured or a close family member, documented by a medical certificate issued before or on the original departure date.

### Medical Expenses
Emergency medical treatment abroad is covered when supported by an itemised invoice or receipt and a medical report from a licensed facility.

### Baggage
Lost, stolen or damaged baggage is covered when reported to the carrier or police within 24 hours, supported by a property irregularity report or police report and proof of value.

## POLICY EXCLUSIONS

- Pre-existing conditions not declared at purchase.
- Elective or cosmetic treatment.
- Events known or foreseeable when the policy was purchased.
- Losses caused by intoxication, illegal acts or deliberate self-harm.
- Claims submitted without any supporting documentation.
- Voluntary cancellation or change of plans.

## DOCUMENT VALIDATION RULES

### Consistency
Names, dates, flight numbers, locations and amounts must agree across the description, text documents and images. The insured's name must appear on the core documents.

### Medical Certificates
A valid medical certificate names the issuing facility and practitioner, is dated, states the condition or incapacity and the affected dates, and carries a signature or official stamp.

### Dates
Treatment, cancellation and incident dates must fall within the policy period and in a plausible order (for example, illness certified before the cancellation it justifies).

### Image Quality
Illegible or heavily cropped documents cannot prove a fact on their own. Request clarification rather than guess.

## FRAUD DETECTION PRIORITY HIERARCHY

Check in this order and stop at the first conclusive finding:
1. Altered or fabricated documents (inconsistent fonts, edited dates or amounts, mismatched stamps).
2. Identity mismatch between the insured and the documents.
3. Non-existent or unverifiable issuing facilities or carriers.
4. Timeline impossibilities (treatment after travel, certificate issued after the claim date).
5. Amount inflation or duplicate items.
6. Minor inconsistencies that an honest mistake would explain.

## DECISION GUIDELINES

### APPROVE
All coverage conditions are met, the documents are consistent and authentic-looking, and no exclusion applies.

### DENY
An exclusion clearly applies, a coverage condition is clearly not met, or there is strong evidence of fraud.

### UNCERTAIN
Evidence is insufficient or contradictory, a document is illegible, or a fraud indicator is present but not conclusive. Explain exactly what information is missing.

## OUTPUT FORMAT

Respond with a single JSON object:
```json
{
  "decision": "APPROVE | DENY | UNCERTAIN",
  "explanation": "concise justification referencing the policy sections and documents",
  "confidence": "high | medium | low",
  "fraud_indicators": ["each concrete fraud indicator found, empty if none"],
  "missing_information": ["information needed to decide, empty if none"]
}
```"#;

/// Assembles the decision prompts around a fixed system policy.
#[derive(Debug, Clone)]
pub struct PromptComposer {
    system_prompt: String,
}

impl Default for PromptComposer {
    fn default() -> Self {
        Self::new(DEFAULT_SYSTEM_POLICY)
    }
}

impl PromptComposer {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
        }
    }

    /// Policy from a plain-text file. The whole file is the policy, with
    /// trailing whitespace trimmed; it is not parsed as TOML or any other
    /// structured format.
    pub fn from_file(path: &Path) -> std::io::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self::new(text.trim_end()))
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Stage-1 prompt for one claim.
    pub fn compose(
        &self,
        bundle: &ClaimBundle,
        image_metadata: &[NamedImageMetadata],
        verification_enabled: bool,
    ) -> String {
        let mut parts: Vec<String> = vec![self.system_prompt.clone()];

        parts.push("\n\n## CLAIM TO ANALYZE\n".into());
        parts.push(format!("### Claim Description\n{}\n", bundle.description));

        if !bundle.documents.is_empty() {
            parts.push("\n### Supporting Documents (Text)\n".into());
            for doc in &bundle.documents {
                parts.push(format!("\n**{}**\n```\n{}\n```\n", doc.filename, doc.content));
            }
        }

        if !image_metadata.is_empty() {
            parts.push("\n### Supporting Documents (Images - Extracted Metadata)\n".into());
            for entry in image_metadata {
                let json = serde_json::to_string_pretty(&entry.metadata)
                    .unwrap_or_else(|e| format!("{{\"error\": \"metadata not serializable: {e}\"}}"));
                parts.push(format!("\n**{}**\n```json\n{}\n```\n", entry.filename, json));
            }
        }

        parts.push("\n### Images Attached\n".into());
        parts.push(format!(
            "{} image(s) are attached for your direct visual analysis.\n",
            image_metadata.len()
        ));

        if verification_enabled {
            parts.push("\n### Google Search Grounding Enabled\n".into());
            parts.push(
                "You have access to Google Search to verify medical facilities, hospitals, and clinics."
                    .into(),
            );
            parts.push(
                "Simply mention or ask about any medical facility, and relevant search results will be provided."
                    .into(),
            );
            parts.push("Use this to verify the authenticity of medical certificates and documents.\n".into());
        }

        parts.push("\n## YOUR TASK\n".into());
        parts.push("Analyze all provided information and make a decision: APPROVE, DENY, or UNCERTAIN.".into());
        parts.push("Follow the decision guidelines strictly and check for all fraud indicators.".into());
        if verification_enabled {
            parts.push(
                "Use Google Search to verify any medical facilities mentioned in certificates if needed."
                    .into(),
            );
        }
        parts.push("Return your response in the required JSON format.".into());

        parts.join("\n")
    }

    /// Stage-2 prompt: the stage-1 analysis plus the facility verification directive.
    pub fn compose_verification(&self, initial_analysis: &str) -> String {
        format!(
            "{system}\n\n## INITIAL DOCUMENT ANALYSIS\n\
             Below is the initial analysis of the claim with all documents and images:\n\n\
             {initial_analysis}\n\n{VERIFICATION_DIRECTIVE}",
            system = self.system_prompt,
        )
    }
}

const VERIFICATION_DIRECTIVE: &str = r#"## CLINIC VERIFICATION TASK
You now have access to Google Search to verify medical facilities.

CRITICAL: DO NOT MAKE UP OR FABRICATE FACILITY NAMES
- ONLY search for facilities that are EXPLICITLY and CLEARLY mentioned in the documents above
- If you cannot extract a SPECIFIC facility name, DO NOT attempt to search
- DO NOT guess, infer, or create facility names
- If no clear facility name exists, skip verification and keep your original decision

Your task:
1. Review the initial analysis - are there SPECIFIC medical facility names mentioned?
2. If YES and the name is CLEAR:
   - Use Google Search to verify each facility
   - Check: Does it exist? Does location match? Is it legitimate?
3. If NO or names are UNCLEAR:
   - Skip verification entirely
   - Keep your original decision based on other factors
4. Update your decision ONLY if verification reveals important findings

Check for red flags:
- Facility doesn't exist in Google (if you searched)
- Address/location mismatch (if you searched)
- Suspicious or fake facilities (if you searched)

IMPORTANT:
- Search format: "[Exact Facility Name from Document] + [Location]"
- Only search if you have a clear, specific facility name
- Absence of facility name does NOT mean fraud

Provide your FINAL decision in JSON format.
If you performed searches, include a "clinic_verification" field with results.
If you did NOT perform searches (no clear facility name), note this in your explanation."#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::bundle::{Document, DocumentKind, ImageRef};
    use crate::pipeline::extraction::{DocumentFacts, ImageMetadata, OcrResult};

    fn bundle() -> ClaimBundle {
        ClaimBundle {
            id: 4,
            description: "Cancelled trip due to appendicitis".into(),
            documents: vec![Document {
                filename: "itinerary.md".into(),
                content: "Paris -> Rome, 12 May".into(),
                kind: DocumentKind::Markdown,
            }],
            images: vec![ImageRef {
                filename: "certificate.png".into(),
                path: "certificate.png".into(),
            }],
            expected_answer: None,
        }
    }

    fn metadata() -> Vec<NamedImageMetadata> {
        vec![NamedImageMetadata {
            filename: "certificate.png".into(),
            metadata: ImageMetadata::Extracted {
                facts: DocumentFacts {
                    document_type: "medical certificate".into(),
                    ..Default::default()
                },
                ocr_extraction: OcrResult::failed("OCR failed: x", vec!["eng".into()]),
            },
        }]
    }

    fn position(haystack: &str, needle: &str) -> usize {
        haystack.find(needle).unwrap_or_else(|| panic!("missing {needle:?}"))
    }

    #[test]
    fn sections_appear_in_fixed_order() {
        let composer = PromptComposer::new("POLICY TEXT");
        let prompt = composer.compose(&bundle(), &metadata(), false);

        let order = [
            "POLICY TEXT",
            "## CLAIM TO ANALYZE",
            "### Claim Description\nCancelled trip due to appendicitis",
            "### Supporting Documents (Text)",
            "**itinerary.md**\n```\nParis -> Rome, 12 May\n```",
            "### Supporting Documents (Images - Extracted Metadata)",
            "**certificate.png**\n```json\n{",
            "1 image(s) are attached for your direct visual analysis.",
            "## YOUR TASK",
            "Return your response in the required JSON format.",
        ];
        let positions: Vec<usize> = order.iter().map(|n| position(&prompt, n)).collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]), "{positions:?}");
        assert!(prompt.starts_with("POLICY TEXT"));
    }

    #[test]
    fn grounding_notice_only_when_enabled() {
        let composer = PromptComposer::default();
        let without = composer.compose(&bundle(), &metadata(), false);
        let with = composer.compose(&bundle(), &metadata(), true);

        assert!(!without.contains("Google Search Grounding Enabled"));
        assert!(with.contains("Google Search Grounding Enabled"));
        assert!(position(&with, "Google Search Grounding Enabled") < position(&with, "## YOUR TASK"));
        assert!(with.contains("verify any medical facilities mentioned in certificates"));
    }

    #[test]
    fn composition_is_deterministic() {
        let composer = PromptComposer::default();
        let a = composer.compose(&bundle(), &metadata(), true);
        let b = composer.compose(&bundle(), &metadata(), true);
        assert_eq!(a, b);
    }

    #[test]
    fn empty_sections_are_omitted() {
        let mut b = bundle();
        b.documents.clear();
        let prompt = PromptComposer::new("P").compose(&b, &[], false);
        assert!(!prompt.contains("Supporting Documents (Text)"));
        assert!(!prompt.contains("Extracted Metadata"));
        assert!(prompt.contains("0 image(s) are attached"));
    }

    #[test]
    fn verification_prompt_wraps_initial_analysis() {
        let composer = PromptComposer::new("POLICY");
        let prompt = composer.compose_verification("{\"decision\": \"APPROVE\"}");
        assert!(prompt.starts_with("POLICY"));
        assert!(position(&prompt, "## INITIAL DOCUMENT ANALYSIS") < position(&prompt, "{\"decision\": \"APPROVE\"}"));
        assert!(prompt.contains("DO NOT MAKE UP OR FABRICATE FACILITY NAMES"));
        assert!(prompt.trim_end().ends_with("note this in your explanation."));
    }

    #[test]
    fn policy_file_override() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("policy.txt");
        std::fs::write(&path, "Custom policy\n\n").unwrap();
        let composer = PromptComposer::from_file(&path).unwrap();
        assert_eq!(composer.system_prompt(), "Custom policy");
        assert!(PromptComposer::from_file(&tmp.path().join("missing.txt")).is_err());
    }

    #[test]
    fn policy_file_is_taken_verbatim() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("policy.toml");
        let content = "policy = \"\"\"\nCover delays over 2 hours.\n\"\"\"";
        std::fs::write(&path, content).unwrap();
        let composer = PromptComposer::from_file(&path).unwrap();
        assert_eq!(composer.system_prompt(), content);
        assert!(composer.compose(&bundle(), &[], false).starts_with("policy = "));
    }

    #[test]
    fn default_policy_has_all_sections() {
        for heading in [
            "## POLICY COVERAGE",
            "## POLICY EXCLUSIONS",
            "## DOCUMENT VALIDATION RULES",
            "## FRAUD DETECTION PRIORITY HIERARCHY",
            "## DECISION GUIDELINES",
            "## OUTPUT FORMAT",
        ] {
            assert!(DEFAULT_SYSTEM_POLICY.contains(heading), "{heading}");
        }
    }
}
