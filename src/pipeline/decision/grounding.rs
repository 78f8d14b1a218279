use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::pipeline::llm::GroundingMetadata;

/// Number of source names listed in a grounding summary.
const TOP_SOURCES: usize = 5;

/// Evidence the verification stage's web search produced, as persisted with
/// the decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundingRecord {
    pub search_performed: bool,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub search_queries: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_entry_point: Option<String>,
    pub search_results: Vec<SearchResult>,
    pub grounding_supports: Vec<SupportSegment>,
    pub total_results: usize,
    pub verified_statements: usize,
    pub summary: GroundingSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Position of the chunk in the service response; supports refer to it.
    pub index: usize,
    pub source: String,
    pub url: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupportSegment {
    pub verified_text: String,
    pub start_index: Option<u32>,
    pub end_index: Option<u32>,
    pub source_indices: Vec<usize>,
    /// Display names of the referenced results.
    #[serde(default)]
    pub sources: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundingSummary {
    pub total_searches: usize,
    pub total_results: usize,
    pub verified_statements: usize,
    pub top_sources: Vec<String>,
}

impl SearchResult {
    fn display_name(&self) -> String {
        if !self.title.is_empty() {
            self.title.clone()
        } else if !self.url.is_empty() {
            self.url.clone()
        } else {
            "Unknown".to_string()
        }
    }
}

/// Build the persisted record for one candidate's grounding metadata.
///
/// Returns `None` when the search produced neither results nor supports.
pub fn build_record(metadata: &GroundingMetadata, timestamp: DateTime<Utc>) -> Option<GroundingRecord> {
    let search_results: Vec<SearchResult> = metadata
        .grounding_chunks
        .iter()
        .enumerate()
        .filter_map(|(index, chunk)| {
            let web = chunk.web.as_ref()?;
            let url = web.uri.clone().unwrap_or_default();
            let title = web.title.clone().unwrap_or_default();
            if url.is_empty() && title.is_empty() {
                return None;
            }
            Some(SearchResult {
                index,
                source: "web".to_string(),
                url,
                title,
            })
        })
        .collect();

    let grounding_supports: Vec<SupportSegment> = metadata
        .grounding_supports
        .iter()
        .map(|support| {
            let segment = support.segment.clone().unwrap_or_default();
            let sources = support
                .grounding_chunk_indices
                .iter()
                .filter_map(|i| search_results.iter().find(|r| r.index == *i))
                .map(SearchResult::display_name)
                .collect();
            SupportSegment {
                verified_text: segment.text.unwrap_or_default(),
                start_index: segment.start_index,
                end_index: segment.end_index,
                source_indices: support.grounding_chunk_indices.clone(),
                sources,
            }
        })
        .collect();

    if search_results.is_empty() && grounding_supports.is_empty() {
        return None;
    }

    let summary = GroundingSummary {
        total_searches: 1,
        total_results: search_results.len(),
        verified_statements: grounding_supports.len(),
        top_sources: search_results
            .iter()
            .take(TOP_SOURCES)
            .map(SearchResult::display_name)
            .collect(),
    };

    Some(GroundingRecord {
        search_performed: true,
        timestamp,
        search_queries: metadata.web_search_queries.clone(),
        search_entry_point: metadata
            .search_entry_point
            .as_ref()
            .and_then(|e| e.rendered_content.clone()),
        total_results: search_results.len(),
        verified_statements: grounding_supports.len(),
        search_results,
        grounding_supports,
        summary,
    })
}

/// Records for every candidate that carried usable grounding.
pub fn build_records(metadata: &[GroundingMetadata], timestamp: DateTime<Utc>) -> Vec<GroundingRecord> {
    metadata
        .iter()
        .filter_map(|m| build_record(m, timestamp))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::llm::{GroundingChunk, GroundingSupport, SupportedSegment, WebChunk};

    fn chunk(uri: Option<&str>, title: Option<&str>) -> GroundingChunk {
        GroundingChunk {
            web: Some(WebChunk {
                uri: uri.map(String::from),
                title: title.map(String::from),
            }),
        }
    }

    fn support(text: &str, indices: Vec<usize>) -> GroundingSupport {
        GroundingSupport {
            segment: Some(SupportedSegment {
                start_index: Some(0),
                end_index: Some(text.len() as u32),
                text: Some(text.to_string()),
            }),
            grounding_chunk_indices: indices,
        }
    }

    #[test]
    fn empty_metadata_yields_no_record() {
        assert!(build_record(&GroundingMetadata::default(), Utc::now()).is_none());
    }

    #[test]
    fn chunks_without_url_or_title_are_skipped() {
        let metadata = GroundingMetadata {
            grounding_chunks: vec![
                chunk(None, None),
                chunk(Some("https://stmary.example"), None),
                GroundingChunk { web: None },
            ],
            ..Default::default()
        };
        let record = build_record(&metadata, Utc::now()).unwrap();
        assert_eq!(record.search_results.len(), 1);
        assert_eq!(record.search_results[0].index, 1);
        assert_eq!(record.search_results[0].source, "web");
        assert_eq!(record.summary.top_sources, vec!["https://stmary.example"]);
    }

    #[test]
    fn summary_counts_and_top_sources() {
        let chunks = (0..7)
            .map(|i| chunk(Some(&format!("https://s{i}.example")), Some(&format!("Source {i}"))))
            .collect();
        let metadata = GroundingMetadata {
            web_search_queries: vec!["St Mary Hospital".into()],
            grounding_chunks: chunks,
            grounding_supports: vec![
                support("St Mary Hospital is a registered facility", vec![0, 2]),
                support("Located in London", vec![1]),
            ],
            ..Default::default()
        };
        let record = build_record(&metadata, Utc::now()).unwrap();

        assert!(record.search_performed);
        assert_eq!(record.total_results, 7);
        assert_eq!(record.verified_statements, 2);
        assert_eq!(record.summary.total_searches, 1);
        assert_eq!(record.summary.top_sources.len(), 5);
        assert_eq!(record.summary.top_sources[0], "Source 0");
        assert_eq!(record.search_queries, vec!["St Mary Hospital"]);
        assert_eq!(record.grounding_supports[0].sources, vec!["Source 0", "Source 2"]);
        assert_eq!(record.grounding_supports[0].source_indices, vec![0, 2]);
    }

    #[test]
    fn supports_alone_produce_a_record() {
        let metadata = GroundingMetadata {
            grounding_supports: vec![support("verified claim", vec![3])],
            ..Default::default()
        };
        let record = build_record(&metadata, Utc::now()).unwrap();
        assert!(record.search_results.is_empty());
        assert_eq!(record.verified_statements, 1);
        assert!(record.grounding_supports[0].sources.is_empty());
    }

    #[test]
    fn support_without_segment_kept_with_empty_text() {
        let metadata = GroundingMetadata {
            grounding_chunks: vec![chunk(Some("https://stmary.example"), Some("St Mary"))],
            grounding_supports: vec![GroundingSupport {
                segment: None,
                grounding_chunk_indices: vec![0],
            }],
            ..Default::default()
        };
        let record = build_record(&metadata, Utc::now()).unwrap();
        assert_eq!(record.verified_statements, 1);
        let support = &record.grounding_supports[0];
        assert_eq!(support.verified_text, "");
        assert_eq!(support.start_index, None);
        assert_eq!(support.end_index, None);
        assert_eq!(support.sources, vec!["St Mary"]);
    }

    #[test]
    fn build_records_skips_empty_candidates() {
        let useful = GroundingMetadata {
            grounding_chunks: vec![chunk(Some("https://a"), Some("A"))],
            ..Default::default()
        };
        let records = build_records(&[GroundingMetadata::default(), useful], Utc::now());
        assert_eq!(records.len(), 1);
    }
}
