//! Substring search over titles, page bodies and record fields.
//!
//! There is no index: every search scans the catalog, the pages and the
//! records of one tenant.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strata_types::Id;
use tracing::debug;

use crate::error::ContentResult;
use crate::store::WorkspaceStore;

const TITLE_SCORE: u32 = 10;
const BODY_SCORE: u32 = 5;
const FIELD_SCORE: u32 = 2;
const MAX_SCORE: u32 = 100;
const SNIPPET_CONTEXT: usize = 50;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchOptions {
    pub query: String,
    /// Zero means no limit.
    #[serde(default)]
    pub limit: usize,
    #[serde(default)]
    pub match_title: bool,
    #[serde(default)]
    pub match_body: bool,
    #[serde(default)]
    pub match_fields: bool,
}

impl SearchOptions {
    /// Search everywhere for `query`.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// With no flag set, every field is searched.
    fn scopes(&self) -> (bool, bool, bool) {
        if self.match_title || self.match_body || self.match_fields {
            (self.match_title, self.match_body, self.match_fields)
        } else {
            (true, true, true)
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchKind {
    Page,
    Record,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    #[serde(rename = "type")]
    pub kind: SearchKind,
    pub node_id: Id,
    #[serde(default, skip_serializing_if = "Id::is_zero")]
    pub record_id: Id,
    pub title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub snippet: String,
    pub score: u32,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub matches: BTreeMap<String, String>,
    pub modified: DateTime<Utc>,
}

impl WorkspaceStore {
    /// Best matches first; ties go to the most recently modified.
    pub fn search(&self, options: &SearchOptions) -> ContentResult<Vec<SearchResult>> {
        let needle = options.query.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(Vec::new());
        }
        let (in_title, in_body, in_fields) = options.scopes();
        let _guard = self.backend().read_lock();
        let mut results = Vec::new();

        for row in self.catalog().rows() {
            let title_hit = in_title && row.title.to_lowercase().contains(&needle);
            let mut score = if title_hit { TITLE_SCORE } else { 0 };
            let mut snippet = String::new();
            if in_body && row.kind.has_page() {
                let body = self.read_page(row.id)?.body;
                if let Some(s) = snippet_around(&body, &needle) {
                    score += BODY_SCORE;
                    snippet = s;
                }
            }
            if score > 0 {
                results.push(SearchResult {
                    kind: SearchKind::Page,
                    node_id: row.id,
                    record_id: Id::ZERO,
                    title: row.title.clone(),
                    snippet,
                    score: score.min(MAX_SCORE),
                    matches: BTreeMap::new(),
                    modified: row.modified,
                });
            }

            if in_fields && row.kind.has_table() {
                for record in self.records_table(row.id)?.rows() {
                    let matches: BTreeMap<String, String> = record
                        .data
                        .iter()
                        .map(|(k, v)| (k.clone(), v.to_string()))
                        .filter(|(_, v)| v.to_lowercase().contains(&needle))
                        .collect();
                    if matches.is_empty() {
                        continue;
                    }
                    let score = (FIELD_SCORE * matches.len() as u32).min(MAX_SCORE);
                    results.push(SearchResult {
                        kind: SearchKind::Record,
                        node_id: row.id,
                        record_id: record.id,
                        title: row.title.clone(),
                        snippet: String::new(),
                        score,
                        matches,
                        modified: record.modified,
                    });
                }
            }
        }

        results.sort_by(|a, b| b.score.cmp(&a.score).then(b.modified.cmp(&a.modified)));
        if options.limit > 0 {
            results.truncate(options.limit);
        }
        debug!(tenant = %self.tenant(), hits = results.len(), "search");
        Ok(results)
    }
}

/// Up to [`SNIPPET_CONTEXT`] characters either side of the first match,
/// with `...` where the text was cut.
fn snippet_around(text: &str, needle: &str) -> Option<String> {
    let lower = text.to_lowercase();
    let byte = lower.find(needle)?;
    let start_char = lower[..byte].chars().count();
    let needle_chars = needle.chars().count();

    let chars: Vec<char> = text.chars().collect();
    let start = start_char.saturating_sub(SNIPPET_CONTEXT).min(chars.len());
    let end = (start_char + needle_chars + SNIPPET_CONTEXT).min(chars.len());
    let mut out = String::new();
    if start > 0 {
        out.push_str("...");
    }
    out.extend(&chars[start..end]);
    if end < chars.len() {
        out.push_str("...");
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use strata_types::Id;

    use super::*;
    use crate::models::NodeType;
    use crate::testing::{author, people_schema, person, workspace};

    #[test]
    fn snippet_cuts_long_text() {
        let text = format!("{}needle{}", "a".repeat(80), "b".repeat(80));
        let s = snippet_around(&text, "needle").unwrap();
        assert_eq!(s, format!("...{}needle{}...", "a".repeat(50), "b".repeat(50)));
    }

    #[test]
    fn snippet_short_text_is_whole() {
        assert_eq!(snippet_around("Find the Needle here", "needle").unwrap(), "Find the Needle here");
        assert!(snippet_around("nothing", "needle").is_none());
    }

    #[test]
    fn snippet_multibyte() {
        let text = format!("{}ünïcode", "é".repeat(60));
        let s = snippet_around(&text, "ünï").unwrap();
        assert!(s.starts_with("..."));
        assert!(s.ends_with("ünïcode"));
    }

    #[test]
    fn default_scopes() {
        assert_eq!(SearchOptions::new("x").scopes(), (true, true, true));
        let only_title = SearchOptions {
            match_title: true,
            ..SearchOptions::new("x")
        };
        assert_eq!(only_title.scopes(), (true, false, false));
    }

    #[test]
    fn search_ranks_titles_over_bodies() {
        let dir = tempfile::tempdir().unwrap();
        let ws = workspace(dir.path());
        let body = ws
            .create_node(&author(), Id::ZERO, "Notes", NodeType::Document, "about the roadmap", vec![])
            .unwrap();
        let title = ws
            .create_node(&author(), Id::ZERO, "Roadmap", NodeType::Document, "", vec![])
            .unwrap();
        let both = ws
            .create_node(&author(), Id::ZERO, "Roadmap 2", NodeType::Document, "roadmap v2", vec![])
            .unwrap();
        ws.create_node(&author(), Id::ZERO, "Other", NodeType::Document, "nothing", vec![])
            .unwrap();

        let results = ws.search(&SearchOptions::new("ROADMAP")).unwrap();
        let ids: Vec<_> = results.iter().map(|r| r.node_id).collect();
        assert_eq!(ids, [both.id, title.id, body.id]);
        assert_eq!(results[0].score, 15);
        assert_eq!(results[2].snippet, "about the roadmap");

        let limited = ws.search(&SearchOptions::new("roadmap").with_limit(1)).unwrap();
        assert_eq!(limited.len(), 1);
        assert!(ws.search(&SearchOptions::new("  ")).unwrap().is_empty());
    }

    #[test]
    fn search_finds_record_fields() {
        let dir = tempfile::tempdir().unwrap();
        let ws = workspace(dir.path());
        let table = ws
            .create_node(&author(), Id::ZERO, "People", NodeType::Table, "", people_schema())
            .unwrap();
        let alice = ws.append_record(&author(), table.id, person("Alice", 25.0)).unwrap();
        ws.append_record(&author(), table.id, person("Bob", 10.0)).unwrap();

        let options = SearchOptions {
            match_fields: true,
            ..SearchOptions::new("alice")
        };
        let results = ws.search(&options).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].kind, SearchKind::Record);
        assert_eq!(results[0].record_id, alice.id);
        assert_eq!(results[0].title, "People");
        assert_eq!(results[0].matches["Name"], "Alice");

        let titles_only = SearchOptions {
            match_title: true,
            ..SearchOptions::new("alice")
        };
        assert!(ws.search(&titles_only).unwrap().is_empty());
    }
}
