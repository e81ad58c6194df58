//! Editor configuration
//!
//! Loaded from TOML; every key is optional and falls back to the default.
//!
//! ```toml
//! order_spacing = 1000.0
//! persistence_timeout_secs = 30
//!
//! [endpoints]
//! tasks_technical = "/api/webhook/generate-tasks-advanced"
//! ```

use crate::error::ConfigError;
use proposal_tree::{OrderingAllocator, DEFAULT_MIN_GAP, DEFAULT_SPACING};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Paths of the generation service endpoints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationEndpoints {
    /// Whole-project outline structure
    pub outline: String,
    /// Task generation, technical workflow
    pub tasks_technical: String,
    /// Task generation, management workflow
    pub tasks_management: String,
    /// Subsection generation
    pub subsections: String,
    /// Task and section content
    pub content: String,
    /// Section integration
    pub integrate: String,
    /// Task images
    pub image: String,
    /// Analysis document with citations
    pub analysis: String,
}

impl Default for GenerationEndpoints {
    fn default() -> Self {
        Self {
            outline: "/api/webhook/generate-structure-check".to_string(),
            tasks_technical: "/api/webhook/generate-tasks-advanced".to_string(),
            tasks_management: "/api/webhook/generate-tasks-management".to_string(),
            subsections: "/api/webhook/generate-requirements".to_string(),
            content: "/api/webhook/generate-content".to_string(),
            integrate: "/api/webhook/integrate-chapter".to_string(),
            image: "/api/webhook/generate-image".to_string(),
            analysis: "/api/webhook/analysis".to_string(),
        }
    }
}

/// Proposal editor configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    /// Distance between neighbouring order keys
    pub order_spacing: f64,
    /// Smallest key gap still split before a renumber is required
    pub min_order_gap: f64,
    /// Backend call timeout in seconds
    pub persistence_timeout_secs: u64,
    /// Generation call timeout in seconds
    pub generation_timeout_secs: u64,
    /// Refetch after every successful mutation
    pub refresh_after_success: bool,
    /// Generation service endpoints
    pub endpoints: GenerationEndpoints,
}

impl EditorConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string
    ///
    /// # Errors
    /// Returns error if the TOML is invalid
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// Load from a TOML file
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// With order spacing
    #[inline]
    #[must_use]
    pub fn with_order_spacing(mut self, spacing: f64) -> Self {
        self.order_spacing = spacing;
        self
    }

    /// With minimum order gap
    #[inline]
    #[must_use]
    pub fn with_min_order_gap(mut self, gap: f64) -> Self {
        self.min_order_gap = gap;
        self
    }

    /// With persistence timeout
    #[inline]
    #[must_use]
    pub fn with_persistence_timeout(mut self, secs: u64) -> Self {
        self.persistence_timeout_secs = secs;
        self
    }

    /// With generation timeout
    #[inline]
    #[must_use]
    pub fn with_generation_timeout(mut self, secs: u64) -> Self {
        self.generation_timeout_secs = secs;
        self
    }

    /// With refresh after every successful mutation
    #[inline]
    #[must_use]
    pub fn with_refresh_after_success(mut self, refresh: bool) -> Self {
        self.refresh_after_success = refresh;
        self
    }

    /// With endpoints
    #[inline]
    #[must_use]
    pub fn with_endpoints(mut self, endpoints: GenerationEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// Allocator configured with this spacing and gap
    #[must_use]
    pub fn allocator(&self) -> OrderingAllocator {
        OrderingAllocator::new()
            .with_spacing(self.order_spacing)
            .with_min_gap(self.min_order_gap)
    }

    /// Persistence timeout
    #[inline]
    #[must_use]
    pub fn persistence_timeout(&self) -> Duration {
        Duration::from_secs(self.persistence_timeout_secs)
    }

    /// Generation timeout
    #[inline]
    #[must_use]
    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_timeout_secs)
    }
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            order_spacing: DEFAULT_SPACING,
            min_order_gap: DEFAULT_MIN_GAP,
            persistence_timeout_secs: 30,
            generation_timeout_secs: 300,
            refresh_after_success: false,
            endpoints: GenerationEndpoints::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_is_default() {
        assert_eq!(EditorConfig::from_toml_str("").unwrap(), EditorConfig::default());
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let config = EditorConfig::from_toml_str(
            r#"
            order_spacing = 64.0
            [endpoints]
            image = "/img"
            "#,
        )
        .unwrap();
        assert_eq!(config.order_spacing, 64.0);
        assert_eq!(config.persistence_timeout_secs, 30);
        assert_eq!(config.endpoints.image, "/img");
        assert_eq!(config.endpoints.content, GenerationEndpoints::default().content);
    }

    #[test]
    fn invalid_toml_is_an_error() {
        let err = EditorConfig::from_toml_str("order_spacing = \"wide\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn allocator_uses_configured_spacing() {
        let alloc = EditorConfig::new().with_order_spacing(10.0).allocator();
        assert_eq!(alloc.spacing(), 10.0);
    }
}
