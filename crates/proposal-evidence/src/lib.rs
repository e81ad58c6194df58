//! Citation evidence for generated documents (proposal-evidence)
//!
//! - [`extract`] assigns deduplicated ids to every citation in a JSON
//!   document and writes them back as `citationIds`
//! - [`segment`] splits prose on `[n]` markers against the resulting map
//!
//! # Example
//!
//! ```rust
//! use proposal_evidence::{extract, segment, Segment};
//! use serde_json::json;
//!
//! let mut doc = json!({
//!     "text": "Meets the deadline [1]",
//!     "citations": [{"source_id": "rfp", "page": 4, "title": "RFP"}]
//! });
//! let evidence = extract(&mut doc);
//! assert_eq!(doc["citationIds"], json!([1]));
//!
//! let text = doc["text"].as_str().unwrap_or_default();
//! let parts = segment(text, &evidence);
//! assert!(matches!(parts[1], Segment::Citation { .. }));
//! ```

pub mod engine;
pub mod markers;

pub use engine::{
    collect, extract, Evidence, EvidenceMap, CITATIONS_FIELD, CITATION_IDS_FIELD, UNKNOWN_SOURCE,
};
pub use markers::{referenced_ids, segment, Segment};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
