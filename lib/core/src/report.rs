// Query result shapes returned by a fitted state
use crate::cluster::TermWeight;
use crate::document::DocumentId;
use ahash::AHashMap;
use serde::{Deserialize, Serialize};

/// A search hit with the document's text and metadata attached
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityHit {
    pub document_id: DocumentId,
    pub score: f32,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterSummary {
    pub cluster_id: usize,
    pub size: usize,
    pub representative_document_ids: Vec<DocumentId>,
    pub top_terms: Vec<TermWeight>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueCount {
    pub value: String,
    pub count: usize,
}

/// Where the hits of a search are located
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationSummary {
    pub total: usize,
    /// Every borough seen
    pub boroughs: Vec<ValueCount>,
    /// Top streets
    pub streets: Vec<ValueCount>,
    /// Top zip codes
    pub zips: Vec<ValueCount>,
}

fn field_value(metadata: Option<&serde_json::Value>, field: &str) -> Option<String> {
    match metadata?.get(field)? {
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn ranked(counts: AHashMap<String, usize>, limit: Option<usize>) -> Vec<ValueCount> {
    let mut out: Vec<ValueCount> = counts
        .into_iter()
        .map(|(value, count)| ValueCount { value, count })
        .collect();
    out.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.value.cmp(&b.value)));
    if let Some(limit) = limit {
        out.truncate(limit);
    }
    out
}

/// Count `borough`, `street_name` and `incident_zip` metadata among the hits
///
/// Hits without metadata, or with a missing/empty field, are not counted for
/// that field. Counts are sorted descending, ties by value.
pub fn location_summary(hits: &[SimilarityHit], top_n: usize) -> LocationSummary {
    let mut boroughs = AHashMap::new();
    let mut streets = AHashMap::new();
    let mut zips = AHashMap::new();

    for hit in hits {
        let metadata = hit.metadata.as_ref();
        for (field, counts) in [
            ("borough", &mut boroughs),
            ("street_name", &mut streets),
            ("incident_zip", &mut zips),
        ] {
            if let Some(value) = field_value(metadata, field) {
                *counts.entry(value).or_insert(0usize) += 1;
            }
        }
    }

    LocationSummary {
        total: hits.len(),
        boroughs: ranked(boroughs, None),
        streets: ranked(streets, Some(top_n)),
        zips: ranked(zips, Some(top_n)),
    }
}
