use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strata_query::{Fields, Filter, Property, RecordData, Sort, Value, View};
use strata_table::Row;
use strata_types::Id;

/// What a node holds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    /// Markdown page.
    #[default]
    Document,
    /// Schema and records.
    Table,
    /// Both a page and a table.
    Hybrid,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Document => "document",
            Self::Table => "table",
            Self::Hybrid => "hybrid",
        }
    }

    /// Whether the node has a markdown body.
    pub fn has_page(&self) -> bool {
        matches!(self, Self::Document | Self::Hybrid)
    }

    /// Whether the node has a schema and records.
    pub fn has_table(&self) -> bool {
        matches!(self, Self::Table | Self::Hybrid)
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "document" | "page" => Ok(Self::Document),
            "table" => Ok(Self::Table),
            "hybrid" => Ok(Self::Hybrid),
            other => Err(format!("unknown node type: {other}")),
        }
    }
}

/// One line of the node catalog (`nodes.jsonl`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeRow {
    pub id: Id,
    #[serde(default, skip_serializing_if = "Id::is_zero")]
    pub parent_id: Id,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: NodeType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub icon: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cover: String,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}

impl Row for NodeRow {
    fn id(&self) -> Id {
        self.id
    }

    fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("title is required".into());
        }
        if self.parent_id == self.id {
            return Err("node cannot be its own parent".into());
        }
        Ok(())
    }

    fn columns() -> Vec<String> {
        [
            "id", "parent_id", "title", "type", "tags", "icon", "cover", "created", "modified",
        ]
        .map(String::from)
        .to_vec()
    }
}

/// A node as callers see it.
///
/// `children` is filled only by [`list_nodes`](crate::WorkspaceStore::list_nodes);
/// `has_children` only by single-node reads.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: Id,
    #[serde(default, skip_serializing_if = "Id::is_zero")]
    pub parent_id: Id,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: NodeType,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<Property>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub views: Vec<View>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub icon: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cover: String,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub has_children: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Node>,
}

impl Node {
    pub(crate) fn from_row(row: NodeRow) -> Self {
        Self {
            id: row.id,
            parent_id: row.parent_id,
            title: row.title,
            kind: row.kind,
            content: String::new(),
            properties: Vec::new(),
            views: Vec::new(),
            tags: row.tags,
            icon: row.icon,
            cover: row.cover,
            created: row.created,
            modified: row.modified,
            has_children: false,
            children: Vec::new(),
        }
    }
}

/// Schema and saved views of a table node (`metadata.json`).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TableMeta {
    #[serde(default)]
    pub properties: Vec<Property>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub views: Vec<View>,
}

/// One row of a table node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DataRecord {
    pub id: Id,
    pub data: RecordData,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}

impl DataRecord {
    pub fn new(data: RecordData) -> Self {
        let now = Utc::now();
        Self {
            id: Id::new(),
            data,
            created: now,
            modified: now,
        }
    }
}

impl Row for DataRecord {
    fn id(&self) -> Id {
        self.id
    }

    fn columns() -> Vec<String> {
        ["id", "data", "created", "modified"].map(String::from).to_vec()
    }
}

impl Fields for DataRecord {
    fn field(&self, name: &str) -> Option<&Value> {
        self.data.get(name)
    }
}

/// A file attached to a node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub name: String,
    pub size: u64,
    pub mime_type: String,
    pub created: DateTime<Utc>,
}

/// Fields to change on a node. `None` leaves a field alone.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Vec<Property>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover: Option<String>,
}

impl NodeUpdate {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// A read through a saved view and/or ad-hoc filters and sorts.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view: Option<Id>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<Filter>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sorts: Vec<Sort>,
    #[serde(default)]
    pub offset: usize,
    /// Zero means no limit.
    #[serde(default)]
    pub limit: usize,
}

impl RecordQuery {
    pub fn view(id: Id) -> Self {
        Self {
            view: Some(id),
            ..Self::default()
        }
    }

    pub fn with_filters(mut self, filters: Vec<Filter>) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_sorts(mut self, sorts: Vec<Sort>) -> Self {
        self.sorts = sorts;
        self
    }

    pub fn with_page(mut self, offset: usize, limit: usize) -> Self {
        self.offset = offset;
        self.limit = limit;
        self
    }
}

/// One page of records plus the number that matched before paging.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryPage {
    pub records: Vec<DataRecord>,
    pub total: usize,
}

/// A page body as it was at some revision.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeVersion {
    pub id: Id,
    pub rev: String,
    pub title: String,
    pub content: String,
}

/// A page that links to some other node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backlink {
    pub node_id: Id,
    pub title: String,
}
