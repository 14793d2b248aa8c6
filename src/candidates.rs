//! Candidate drug set (formulary) loading and output filtering
//!
//! Model output is never trusted to stay inside the formulary: every
//! recommendation passes through [`filter_candidates`] before it reaches a
//! caller.

use std::collections::HashSet;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::RwLock;

use serde_json::Value;
use tracing::debug;
use tracing::info;
use tracing::warn;

/// Lazily loaded, process-wide view of the candidate drug file
#[derive(Debug)]
pub struct CandidateRegistry {
    path: PathBuf,
    cache: RwLock<Option<Arc<HashSet<String>>>>,
}

impl CandidateRegistry {
    /// Create a registry for `path`; nothing is read until [`names`](Self::names)
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: RwLock::new(None),
        }
    }

    /// Registry pre-populated with `names` (tests and embedding callers)
    #[must_use]
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let set: HashSet<String> = names
            .into_iter()
            .map(Into::into)
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .collect();
        Self {
            path: PathBuf::new(),
            cache: RwLock::new(Some(Arc::new(set))),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Cached candidate names, loading them on first use
    pub fn names(&self) -> Arc<HashSet<String>> {
        if let Some(names) = self
            .cache
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .as_ref()
        {
            return Arc::clone(names);
        }
        self.reload()
    }

    /// Re-read the candidate file, replacing the cache
    pub fn reload(&self) -> Arc<HashSet<String>> {
        let names = Arc::new(load_candidate_names(&self.path));
        let mut cache = self
            .cache
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *cache = Some(Arc::clone(&names));
        names
    }

    /// Candidate names sorted for stable prompt listings
    pub fn sorted_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.names().iter().cloned().collect();
        names.sort();
        names
    }

    /// Restrict raw model output to the cached candidate set
    pub fn filter(&self, raw: &str) -> String {
        filter_candidates(raw, &self.names())
    }
}

/// Read a JSON array of drug names
///
/// A missing or malformed file yields an empty set; with an empty set the
/// filter passes model output through unchanged.
pub fn load_candidate_names(path: &Path) -> HashSet<String> {
    if !path.is_file() {
        warn!(
            "Candidate drug file not found: {}, recommendations will not be restricted",
            path.display()
        );
        return HashSet::new();
    }

    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            warn!("Failed to read candidate drug file {}: {e}", path.display());
            return HashSet::new();
        }
    };

    let names: HashSet<String> = match serde_json::from_str::<Value>(&content) {
        Ok(Value::Array(items)) => items
            .iter()
            .map(value_to_text)
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .collect(),
        Ok(_) => {
            warn!("Candidate drug file {} is not a JSON array", path.display());
            HashSet::new()
        }
        Err(e) => {
            warn!("Candidate drug file {} is not valid JSON: {e}", path.display());
            HashSet::new()
        }
    };

    info!("Loaded {} candidate drugs from {}", names.len(), path.display());
    names
}

/// Restrict a raw JSON array of drug names to `candidates`
///
/// Returns `"[]"` when `raw` is not a JSON array. Elements are coerced to
/// trimmed strings (non-scalar elements are ignored). With an empty candidate
/// set the coerced list is returned unchanged; otherwise only members are
/// kept, first occurrence wins.
pub fn filter_candidates(raw: &str, candidates: &HashSet<String>) -> String {
    let Ok(Value::Array(items)) = serde_json::from_str::<Value>(raw.trim()) else {
        debug!("Model output is not a JSON array, treating as no recommendation");
        return "[]".to_string();
    };

    let drugs: Vec<String> = items
        .iter()
        .filter_map(|item| match item {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .collect();

    if candidates.is_empty() {
        return to_json_array(&drugs);
    }

    let mut seen: HashSet<&str> = HashSet::new();
    let filtered: Vec<String> = drugs
        .iter()
        .filter(|name| !name.is_empty() && candidates.contains(name.as_str()))
        .filter(|name| seen.insert(name.as_str()))
        .cloned()
        .collect();

    if filtered.len() < drugs.len() {
        debug!(
            "Candidate filter kept {} of {} suggested drugs",
            filtered.len(),
            drugs.len()
        );
    }

    to_json_array(&filtered)
}

/// Parse a filtered advice string back into names; anything else is empty
pub fn parse_drug_list(advice: &str) -> Vec<String> {
    serde_json::from_str::<Vec<String>>(advice).unwrap_or_default()
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn to_json_array(names: &[String]) -> String {
    // serde_json keeps non-ASCII characters literal
    serde_json::to_string(names).unwrap_or_else(|_| "[]".to_string())
}
