//! Component knowledge base
//!
//! A JSON object mapping component names to usage documentation that is
//! handed to the coder verbatim.

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Default)]
pub struct KnowledgeBase {
    entries: BTreeMap<String, Value>,
}

impl KnowledgeBase {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load from `path`; `None` yields an empty base
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::empty());
        };
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read knowledge file {}", path.display()))?;
        let map: Map<String, Value> = serde_json::from_str(&content)
            .with_context(|| format!("Knowledge file {} is not a JSON object", path.display()))?;
        tracing::info!("Loaded {} component entries from {}", map.len(), path.display());
        Ok(Self {
            entries: map.into_iter().collect(),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries.get(name)
    }

    /// Entries for the known names among `components`, warning on the rest
    pub fn select(&self, components: &[String]) -> BTreeMap<String, Value> {
        let mut selected = BTreeMap::new();
        for name in components {
            match self.entries.get(name) {
                Some(value) => {
                    selected.insert(name.clone(), value.clone());
                }
                None => tracing::warn!("Component {} not found in knowledge base", name),
            }
        }
        selected
    }
}

impl FromIterator<(String, Value)> for KnowledgeBase {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
