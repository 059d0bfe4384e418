//! Saved views and ad-hoc queries.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use strata_types::Id;
use tracing::debug;

use crate::error::{QueryError, QueryResult};
use crate::eval::{evaluate, sort_records};
use crate::filter::{validate_filters, validate_sorts, Filter, Sort};
use crate::schema::{find_property, Property};
use crate::value::{Fields, Value};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewType {
    #[default]
    Table,
    Board,
    Gallery,
    List,
    Calendar,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewColumn {
    pub property: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub width: u32,
    #[serde(default = "visible_by_default")]
    pub visible: bool,
}

fn is_zero(n: &u32) -> bool {
    *n == 0
}

fn visible_by_default() -> bool {
    true
}

/// Grouping by one property, with some bucket keys hidden.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub property: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hidden: Vec<Value>,
}

/// A named, persisted query over one table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct View {
    pub id: Id,
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: ViewType,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub default: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub columns: Vec<ViewColumn>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<Filter>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sorts: Vec<Sort>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<Group>,
}

impl View {
    /// A table view with a fresh id and no query.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Id::new(),
            name: name.into(),
            kind: ViewType::Table,
            default: false,
            columns: Vec::new(),
            filters: Vec::new(),
            sorts: Vec::new(),
            groups: Vec::new(),
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

    pub fn with_groups(mut self, groups: Vec<Group>) -> Self {
        self.groups = groups;
        self
    }

    /// Check the view's name and every part of its query against `schema`.
    pub fn validate(&self, schema: &[Property]) -> QueryResult<()> {
        if self.name.trim().is_empty() {
            return Err(QueryError::Schema("view has no name".into()));
        }
        validate_filters(&self.filters, schema)?;
        validate_sorts(&self.sorts, schema)?;
        validate_groups(&self.groups, schema)?;
        let mut seen = HashSet::new();
        for column in &self.columns {
            if find_property(schema, &column.property).is_none() {
                return Err(QueryError::Schema(format!(
                    "unknown property: {}",
                    column.property
                )));
            }
            if !seen.insert(column.property.as_str()) {
                return Err(QueryError::Schema(format!(
                    "duplicate column: {}",
                    column.property
                )));
            }
        }
        Ok(())
    }

    /// The filter/sort part of this view.
    pub fn query(&self) -> Query {
        Query {
            filters: self.filters.clone(),
            sorts: self.sorts.clone(),
        }
    }
}

pub fn validate_groups(groups: &[Group], schema: &[Property]) -> QueryResult<()> {
    for group in groups {
        if find_property(schema, &group.property).is_none() {
            return Err(QueryError::Group(format!(
                "unknown property: {}",
                group.property
            )));
        }
    }
    Ok(())
}

/// Filters and sorts to run against a table.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Query {
    #[serde(default)]
    pub filters: Vec<Filter>,
    #[serde(default)]
    pub sorts: Vec<Sort>,
}

impl Query {
    pub fn validate(&self, schema: &[Property]) -> QueryResult<()> {
        validate_filters(&self.filters, schema)?;
        validate_sorts(&self.sorts, schema)
    }

    /// Filter, then sort.
    pub fn apply<R: Fields>(&self, records: Vec<R>) -> Vec<R> {
        let mut out = evaluate(records, &self.filters);
        sort_records(&mut out, &self.sorts);
        out
    }
}

/// Combine a saved view with ad-hoc parameters.
///
/// Each non-empty ad-hoc field replaces the view's field of the same name;
/// the two are never merged. An empty ad-hoc field leaves the view's value.
pub fn resolve_query(view: Option<&View>, adhoc: Query) -> Query {
    let mut query = view.map(View::query).unwrap_or_default();
    if let Some(view) = view {
        debug!(
            view = %view.id,
            replace_filters = !adhoc.filters.is_empty(),
            replace_sorts = !adhoc.sorts.is_empty(),
            "resolving view query"
        );
    }
    if !adhoc.filters.is_empty() {
        query.filters = adhoc.filters;
    }
    if !adhoc.sorts.is_empty() {
        query.sorts = adhoc.sorts;
    }
    query
}
