//! Prompt library loading.
//!
//! The library is a single JSON export: an array of prompt records with
//! `id`, `name`, `content`, `category`, and `tags`. A missing or malformed
//! file degrades to an empty library so the rest of the pipeline keeps
//! working without enrichment material.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// CorpusEntry
// ---------------------------------------------------------------------------

/// One prompt in the library.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusEntry {
    pub id: String,
    pub name: String,
    pub content: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl CorpusEntry {
    /// Lowercased concatenation of every searchable field.
    pub fn haystack(&self) -> String {
        let mut text = String::with_capacity(
            self.name.len() + self.content.len() + self.category.len() + 32,
        );
        text.push_str(&self.name);
        text.push(' ');
        text.push_str(&self.content);
        text.push(' ');
        text.push_str(&self.category);
        for tag in &self.tags {
            text.push(' ');
            text.push_str(tag);
        }
        text.to_lowercase()
    }
}

// ---------------------------------------------------------------------------
// Corpus
// ---------------------------------------------------------------------------

/// The loaded prompt library. Constructed once and injected into the
/// retriever; never loaded lazily behind a global.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    entries: Vec<CorpusEntry>,
}

impl Corpus {
    /// Load the library from a JSON export file.
    ///
    /// Any failure (missing file, bad JSON) logs a warning and yields an
    /// empty library.
    pub fn load(path: &Path) -> Self {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "prompt library unavailable, continuing with empty library");
                return Self::default();
            }
        };
        match serde_json::from_str::<Vec<CorpusEntry>>(&raw) {
            Ok(entries) => {
                info!(path = %path.display(), count = entries.len(), "prompt library loaded");
                Self { entries }
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "prompt library malformed, continuing with empty library");
                Self::default()
            }
        }
    }

    pub fn from_entries(entries: Vec<CorpusEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[CorpusEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, id: &str) -> Option<&CorpusEntry> {
        self.entries.iter().find(|e| e.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_empty_library() {
        let corpus = Corpus::load(Path::new("/nonexistent/prompts-export.json"));
        assert!(corpus.is_empty());
    }

    #[test]
    fn malformed_json_yields_empty_library() {
        let dir = std::env::temp_dir().join("promptforge-corpus-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("broken.json");
        std::fs::write(&path, "{not json").unwrap();
        let corpus = Corpus::load(&path);
        assert!(corpus.is_empty());
    }

    #[test]
    fn loads_valid_export() {
        let dir = std::env::temp_dir().join("promptforge-corpus-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("valid.json");
        std::fs::write(
            &path,
            r#"[{"id":"p1","name":"API error handling","content":"Always return structured errors.","category":"backend","tags":["api","errors"]}]"#,
        )
        .unwrap();
        let corpus = Corpus::load(&path);
        assert_eq!(corpus.len(), 1);
        let entry = corpus.get("p1").unwrap();
        assert_eq!(entry.category, "backend");
        assert!(entry.haystack().contains("structured errors"));
        assert!(entry.haystack().contains("api"));
    }

    #[test]
    fn optional_fields_default() {
        let entry: CorpusEntry =
            serde_json::from_str(r#"{"id":"p2","name":"n","content":"c"}"#).unwrap();
        assert!(entry.category.is_empty());
        assert!(entry.tags.is_empty());
    }
}
