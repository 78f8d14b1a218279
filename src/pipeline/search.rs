//! Web search client used to check that named medical facilities exist.
//!
//! The decision engine only needs to know whether a search backend is
//! configured (the grounded stage-2 call uses the generation service's own
//! search tool). `verify_facility` is the direct lookup used when a caller
//! wants a verdict for one facility name.

use std::time::Duration;

use serde::{Deserialize, Serialize};

const CUSTOM_SEARCH_URL: &str = "https://www.googleapis.com/customsearch/v1";

/// The custom search API caps `num` at 10.
const MAX_RESULTS: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub link: String,
    pub snippet: String,
    pub display_link: Option<String>,
}

/// Outcome of one search. Never an error: failures are explicit variants.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    Results {
        query: String,
        total_results: String,
        hits: Vec<SearchHit>,
    },
    NotConfigured,
    Timeout,
    RequestError(String),
}

impl SearchOutcome {
    pub fn error_message(&self) -> Option<String> {
        match self {
            Self::Results { .. } => None,
            Self::NotConfigured => Some("Google Search API not configured".into()),
            Self::Timeout => Some("Search request timed out".into()),
            Self::RequestError(e) => Some(format!("Search request failed: {e}")),
        }
    }
}

/// Web search abstraction (allows mocking).
pub trait WebSearch: Send + Sync {
    fn is_configured(&self) -> bool;

    fn search(&self, query: &str, num_results: usize) -> SearchOutcome;
}

/// Google Custom Search JSON API client.
pub struct GoogleCustomSearch {
    api_key: String,
    engine_id: String,
    endpoint: String,
    client: reqwest::blocking::Client,
}

impl GoogleCustomSearch {
    pub fn new(api_key: &str, engine_id: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::blocking::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            api_key: api_key.to_string(),
            engine_id: engine_id.to_string(),
            endpoint: CUSTOM_SEARCH_URL.to_string(),
            client,
        })
    }

    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.to_string();
        self
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CustomSearchResponse {
    #[serde(default)]
    items: Vec<CustomSearchItem>,
    search_information: Option<SearchInformation>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CustomSearchItem {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    snippet: String,
    display_link: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchInformation {
    total_results: Option<String>,
}

impl WebSearch for GoogleCustomSearch {
    fn is_configured(&self) -> bool {
        !self.api_key.is_empty() && !self.engine_id.is_empty()
    }

    fn search(&self, query: &str, num_results: usize) -> SearchOutcome {
        if !self.is_configured() {
            return SearchOutcome::NotConfigured;
        }

        let num = num_results.clamp(1, MAX_RESULTS).to_string();
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("key", self.api_key.as_str()),
                ("cx", self.engine_id.as_str()),
                ("q", query),
                ("num", num.as_str()),
            ])
            .send()
            .and_then(|r| r.error_for_status());

        let response = match response {
            Ok(r) => r,
            Err(e) if e.is_timeout() => return SearchOutcome::Timeout,
            Err(e) => return SearchOutcome::RequestError(e.without_url().to_string()),
        };

        match response.json::<CustomSearchResponse>() {
            Ok(parsed) => SearchOutcome::Results {
                query: query.to_string(),
                total_results: parsed
                    .search_information
                    .and_then(|s| s.total_results)
                    .unwrap_or_else(|| "0".to_string()),
                hits: parsed
                    .items
                    .into_iter()
                    .map(|item| SearchHit {
                        title: item.title,
                        link: item.link,
                        snippet: item.snippet,
                        display_link: item.display_link,
                    })
                    .collect(),
            },
            Err(e) => SearchOutcome::RequestError(e.to_string()),
        }
    }
}

// ──────────────────────────────────────────────
// Facility verification
// ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FacilityVerification {
    /// `None` when the search itself could not run.
    pub verified: Option<bool>,
    pub confidence: f32,
    pub message: String,
    pub search_results: Vec<SearchHit>,
}

/// Look up one facility and grade how strongly the results confirm it.
///
/// Title hit → verified (0.9); snippet-only hit → verified (0.7);
/// results without a hit → unverified (0.6); no results → unverified (0.8);
/// search failure → unknown (0.0).
pub fn verify_facility(
    search: &dyn WebSearch,
    facility_name: &str,
    location: Option<&str>,
) -> FacilityVerification {
    let mut query_parts = vec![facility_name];
    if let Some(loc) = location.filter(|l| !l.trim().is_empty()) {
        query_parts.push(loc);
    }
    query_parts.extend(["hospital", "OR", "clinic", "OR", "medical"]);
    let query = query_parts.join(" ");

    let hits = match search.search(&query, 5) {
        SearchOutcome::Results { hits, .. } => hits,
        failure => {
            let reason = failure.error_message().unwrap_or_default();
            tracing::warn!(facility = facility_name, reason = %reason, "Facility search failed");
            return FacilityVerification {
                verified: None,
                confidence: 0.0,
                message: format!("Search failed: {reason}"),
                search_results: vec![],
            };
        }
    };

    if hits.is_empty() {
        return FacilityVerification {
            verified: Some(false),
            confidence: 0.8,
            message: format!(
                "No results found for '{facility_name}'. Facility may not exist or name may be incorrect."
            ),
            search_results: vec![],
        };
    }

    let needle = facility_name.to_lowercase();
    let mut relevant = Vec::new();
    let mut title_match = false;
    for hit in &hits {
        let in_title = hit.title.to_lowercase().contains(&needle);
        let in_snippet = hit.snippet.to_lowercase().contains(&needle);
        if in_title || in_snippet {
            relevant.push(hit.clone());
            title_match |= in_title;
        }
    }
    relevant.truncate(3);

    if title_match {
        FacilityVerification {
            verified: Some(true),
            confidence: 0.9,
            message: format!("Facility '{facility_name}' found in search results with strong match."),
            search_results: relevant,
        }
    } else if !relevant.is_empty() {
        FacilityVerification {
            verified: Some(true),
            confidence: 0.7,
            message: format!("Facility '{facility_name}' found with partial match. May need verification."),
            search_results: relevant,
        }
    } else {
        FacilityVerification {
            verified: Some(false),
            confidence: 0.6,
            message: format!(
                "No clear match found for '{facility_name}'. Facility may not exist or search terms may be incorrect."
            ),
            search_results: hits.into_iter().take(3).collect(),
        }
    }
}

/// Mock search backend returning a fixed outcome and recording queries.
pub struct MockWebSearch {
    outcome: SearchOutcome,
    queries: std::sync::Mutex<Vec<String>>,
}

impl MockWebSearch {
    pub fn new(outcome: SearchOutcome) -> Self {
        Self {
            outcome,
            queries: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn with_hits(hits: Vec<SearchHit>) -> Self {
        Self::new(SearchOutcome::Results {
            query: String::new(),
            total_results: hits.len().to_string(),
            hits,
        })
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().map(|q| q.clone()).unwrap_or_default()
    }
}

impl WebSearch for MockWebSearch {
    fn is_configured(&self) -> bool {
        self.outcome != SearchOutcome::NotConfigured
    }

    fn search(&self, query: &str, _num_results: usize) -> SearchOutcome {
        if let Ok(mut q) = self.queries.lock() {
            q.push(query.to_string());
        }
        self.outcome.clone()
    }
}
