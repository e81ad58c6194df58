//! Inline `[n]` citation markers

use crate::engine::{Evidence, EvidenceMap};
use once_cell::sync::Lazy;
use regex::Regex;

static MARKER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[(\d+)\]").expect("marker pattern is valid"));

/// Piece of segmented text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'a> {
    /// Plain text between markers
    Text(&'a str),
    /// Marker whose id resolves in the evidence map
    Citation {
        /// Marker text, e.g. `[3]`
        marker: &'a str,
        /// Resolved record
        evidence: &'a Evidence,
    },
    /// Marker with no matching evidence; rendered as plain text
    Unresolved(&'a str),
}

impl Segment<'_> {
    /// Text as it appears in the source
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Text(s) | Self::Unresolved(s) => s,
            Self::Citation { marker, .. } => marker,
        }
    }
}

/// Split `text` into plain runs and citation markers
///
/// Concatenating [`Segment::as_str`] over the result gives back `text`.
#[must_use]
pub fn segment<'a>(text: &'a str, evidence: &'a EvidenceMap) -> Vec<Segment<'a>> {
    let mut out = Vec::new();
    let mut last = 0;
    for caps in MARKER_RE.captures_iter(text) {
        let (Some(whole), Some(digits)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        if whole.start() > last {
            out.push(Segment::Text(&text[last..whole.start()]));
        }
        let marker = whole.as_str();
        let resolved = digits
            .as_str()
            .parse::<u32>()
            .ok()
            .and_then(|id| evidence.get(id));
        out.push(match resolved {
            Some(evidence) => Segment::Citation { marker, evidence },
            None => Segment::Unresolved(marker),
        });
        last = whole.end();
    }
    if last < text.len() {
        out.push(Segment::Text(&text[last..]));
    }
    out
}

/// Distinct marker ids in first-seen order (resolved or not)
#[must_use]
pub fn referenced_ids(text: &str) -> Vec<u32> {
    let mut ids = Vec::new();
    for caps in MARKER_RE.captures_iter(text) {
        if let Some(id) = caps.get(1).and_then(|m| m.as_str().parse::<u32>().ok()) {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
    }
    ids
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::extract;
    use serde_json::json;

    fn sample_map() -> EvidenceMap {
        let mut doc = json!({"citations": [
            {"source_id": "a", "page": 1, "title": "RFP"},
            {"source_id": "b", "page": 2, "title": "Annex"}
        ]});
        extract(&mut doc)
    }

    #[test]
    fn splits_text_and_markers() {
        let map = sample_map();
        let segments = segment("Scope [1] and budget [2].", &map);
        assert_eq!(segments.len(), 5);
        assert_eq!(segments[0], Segment::Text("Scope "));
        assert!(matches!(
            segments[1],
            Segment::Citation { evidence, .. } if evidence.source_id == "a"
        ));
        assert_eq!(segments[4], Segment::Text("."));
    }

    #[test]
    fn unknown_markers_stay_plain() {
        let map = sample_map();
        let segments = segment("[7][1]", &map);
        assert_eq!(segments[0], Segment::Unresolved("[7]"));
        assert!(matches!(segments[1], Segment::Citation { .. }));
    }

    #[test]
    fn huge_ids_do_not_fail() {
        let map = sample_map();
        let segments = segment("see [99999999999999999999]", &map);
        assert_eq!(segments[1], Segment::Unresolved("[99999999999999999999]"));
    }

    #[test]
    fn segments_rebuild_the_text() {
        let map = sample_map();
        let text = "[1] lead, middle [x] [3], tail [2]";
        let rebuilt: String = segment(text, &map).iter().map(Segment::as_str).collect();
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn referenced_ids_dedupe_in_order() {
        assert_eq!(referenced_ids("[2] [1] [2] [abc]"), vec![2, 1]);
        assert!(referenced_ids("no markers").is_empty());
    }
}
