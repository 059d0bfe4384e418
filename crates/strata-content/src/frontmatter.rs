//! The on-disk envelope of a page (`index.md`): a `---` delimited header of
//! `key: value` lines, a blank line, then the markdown body.

use chrono::{DateTime, Utc};
use strata_types::Id;

const DELIMITER: &str = "---";

/// A parsed page file.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Page {
    pub id: Id,
    pub title: String,
    pub created: Option<DateTime<Utc>>,
    pub modified: Option<DateTime<Utc>>,
    pub tags: Vec<String>,
    pub body: String,
}

impl Page {
    /// Render header and body.
    pub fn format(&self) -> String {
        let mut out = String::new();
        out.push_str(DELIMITER);
        out.push('\n');
        out.push_str(&format!("id: {}\n", self.id));
        out.push_str(&format!("title: {}\n", single_line(&self.title)));
        if let Some(created) = self.created {
            out.push_str(&format!("created: {}\n", created.to_rfc3339()));
        }
        if let Some(modified) = self.modified {
            out.push_str(&format!("modified: {}\n", modified.to_rfc3339()));
        }
        if !self.tags.is_empty() {
            let tags: Vec<String> = self.tags.iter().map(|t| single_line(t)).collect();
            out.push_str(&format!("tags: [{}]\n", tags.join(", ")));
        }
        out.push_str(DELIMITER);
        out.push_str("\n\n");
        out.push_str(&self.body);
        out
    }

    /// Split a page file into header fields and body.
    ///
    /// A file that does not start with a header is all body. Unknown header
    /// keys and unparsable values are ignored.
    pub fn parse(text: &str) -> Self {
        let mut page = Page::default();
        let Some((header, body)) = split_header(text) else {
            page.body = text.to_string();
            return page;
        };
        for line in header.lines() {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();
            match key.trim() {
                "id" => page.id = value.parse().unwrap_or_default(),
                "title" => page.title = value.to_string(),
                "created" => page.created = parse_time(value),
                "modified" => page.modified = parse_time(value),
                "tags" => page.tags = parse_tags(value),
                _ => {}
            }
        }
        page.body = body.trim_start_matches(['\n', '\r']).to_string();
        page
    }
}

fn split_header(text: &str) -> Option<(&str, &str)> {
    let rest = text
        .strip_prefix("---\n")
        .or_else(|| text.strip_prefix("---\r\n"))?;
    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == DELIMITER {
            return Some((&rest[..offset], &rest[offset + line.len()..]));
        }
        offset += line.len();
    }
    None
}

fn parse_time(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

fn parse_tags(value: &str) -> Vec<String> {
    value
        .trim_start_matches('[')
        .trim_end_matches(']')
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect()
}

fn single_line(s: &str) -> String {
    s.replace(['\r', '\n'], " ")
}
