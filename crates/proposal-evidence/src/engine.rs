//! Citation extraction
//!
//! Walks a generated analysis document depth-first. Every object carrying a
//! `citations` array gets a `citationIds` array of small integer ids, and
//! each distinct citation becomes one [`Evidence`] record.
//!
//! Ids follow document traversal order and are assigned fresh on every call,
//! so extracting an unchanged document twice yields the same map.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Key of the citations array looked up on every object
pub const CITATIONS_FIELD: &str = "citations";

/// Key the assigned ids are written back under
pub const CITATION_IDS_FIELD: &str = "citationIds";

/// Title used when a citation carries none
pub const UNKNOWN_SOURCE: &str = "Unknown Source";

/// Deduplicated citation record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    /// Positive id, first-seen order
    pub id: u32,
    pub source_id: String,
    pub page: u32,
    #[serde(rename = "source_title")]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quote: Option<String>,
}

/// Evidence records by id
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EvidenceMap(BTreeMap<u32, Evidence>);

impl EvidenceMap {
    /// Empty map
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up by id
    #[inline]
    #[must_use]
    pub fn get(&self, id: u32) -> Option<&Evidence> {
        self.0.get(&id)
    }

    /// Number of distinct citations
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no citation was found
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Records in id order
    pub fn iter(&self) -> impl Iterator<Item = &Evidence> {
        self.0.values()
    }
}

impl<'a> IntoIterator for &'a EvidenceMap {
    type Item = &'a Evidence;
    type IntoIter = std::collections::btree_map::Values<'a, u32, Evidence>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.values()
    }
}

/// Dedup identity: source, raw page, quote (missing quote = empty)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CitationKey {
    source_id: String,
    page: String,
    quote: String,
}

/// State of one extraction pass
#[derive(Debug, Default)]
struct Extraction {
    next_id: u32,
    seen: HashMap<CitationKey, u32>,
    evidence: EvidenceMap,
}

fn text_of(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn page_of(value: Option<&Value>) -> u32 {
    match value {
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
            .and_then(|p| u32::try_from(p).ok())
            .unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

impl Extraction {
    fn new() -> Self {
        Self {
            next_id: 1,
            ..Self::default()
        }
    }

    fn assign(&mut self, citation: &Map<String, Value>) -> u32 {
        let quote = citation
            .get("quote")
            .and_then(Value::as_str)
            .filter(|q| !q.is_empty());
        let key = CitationKey {
            source_id: text_of(citation.get("source_id")),
            page: text_of(citation.get("page")),
            quote: quote.unwrap_or_default().to_string(),
        };
        if let Some(id) = self.seen.get(&key) {
            return *id;
        }

        let id = self.next_id;
        self.next_id += 1;
        let title = citation
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or(UNKNOWN_SOURCE);
        self.evidence.0.insert(
            id,
            Evidence {
                id,
                source_id: key.source_id.clone(),
                page: page_of(citation.get("page")),
                title: title.to_string(),
                quote: quote.map(str::to_string),
            },
        );
        self.seen.insert(key, id);
        id
    }

    fn walk(&mut self, value: &mut Value) {
        match value {
            Value::Object(map) => {
                if let Some(Value::Array(citations)) = map.get(CITATIONS_FIELD) {
                    let ids: Vec<Value> = citations
                        .iter()
                        .filter_map(Value::as_object)
                        .map(|c| Value::from(self.assign(c)))
                        .collect();
                    map.insert(CITATION_IDS_FIELD.to_string(), Value::Array(ids));
                }
                for child in map.values_mut() {
                    self.walk(child);
                }
            }
            Value::Array(items) => {
                for item in items {
                    self.walk(item);
                }
            }
            _ => {}
        }
    }
}

/// Extract evidence and annotate `document` with `citationIds`
///
/// Any previous `citationIds` are overwritten, so re-running on an
/// annotated document is stable.
pub fn extract(document: &mut Value) -> EvidenceMap {
    let mut pass = Extraction::new();
    pass.walk(document);
    debug!(evidence = pass.evidence.len(), "citation extraction finished");
    pass.evidence
}

/// Extract evidence without touching `document`
#[must_use]
pub fn collect(document: &Value) -> EvidenceMap {
    let mut copy = document.clone();
    extract(&mut copy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn duplicate_citations_share_one_record() {
        let mut doc = json!({
            "summary": {
                "text": "Budget is tight [1]",
                "citations": [
                    {"source_id": "s1", "page": 3, "title": "RFP", "quote": "limit"},
                    {"source_id": "s2", "page": 1, "title": "Annex"}
                ]
            },
            "risks": [
                {"citations": [{"source_id": "s1", "page": 3, "title": "RFP", "quote": "limit"}]}
            ]
        });
        let map = extract(&mut doc);
        assert_eq!(map.len(), 2);
        assert_eq!(doc["summary"]["citationIds"], json!([1, 2]));
        assert_eq!(doc["risks"][0]["citationIds"], json!([1]));
    }

    #[test]
    fn missing_fields_get_defaults() {
        let mut doc = json!({"citations": [{"source_id": "s9"}]});
        let map = extract(&mut doc);
        let evidence = map.get(1).unwrap();
        assert_eq!(evidence.page, 0);
        assert_eq!(evidence.title, UNKNOWN_SOURCE);
        assert_eq!(evidence.quote, None);
    }

    #[test]
    fn missing_quote_and_empty_quote_are_the_same_citation() {
        let mut doc = json!({"citations": [
            {"source_id": "s", "page": 1},
            {"source_id": "s", "page": 1, "quote": ""}
        ]});
        let map = extract(&mut doc);
        assert_eq!(map.len(), 1);
        assert_eq!(doc["citationIds"], json!([1, 1]));
    }

    #[test]
    fn ids_follow_traversal_order() {
        let mut doc = json!({
            "b": {"citations": [{"source_id": "first"}]},
            "a": {"citations": [{"source_id": "second"}]}
        });
        let map = extract(&mut doc);
        assert_eq!(map.get(1).map(|e| e.source_id.as_str()), Some("first"));
        assert_eq!(map.get(2).map(|e| e.source_id.as_str()), Some("second"));
    }

    #[test]
    fn non_array_citations_are_ignored() {
        let mut doc = json!({"citations": "none", "items": [1, "two", null]});
        assert!(extract(&mut doc).is_empty());
        assert!(doc.get(CITATION_IDS_FIELD).is_none());
    }

    #[test]
    fn collect_leaves_document_untouched() {
        let doc = json!({"citations": [{"source_id": "s"}]});
        let before = doc.clone();
        assert_eq!(collect(&doc).len(), 1);
        assert_eq!(doc, before);
    }

    #[test]
    fn evidence_serializes_with_source_title() {
        let mut doc = json!({"citations": [{"source_id": "s", "page": 2, "title": "Tender"}]});
        let map = extract(&mut doc);
        let json = serde_json::to_value(&map).unwrap();
        assert_eq!(
            json,
            json!({"1": {"id": 1, "source_id": "s", "page": 2, "source_title": "Tender"}})
        );
    }
}
