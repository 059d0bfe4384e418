//! Filter trees and sort keys, and their validation against a schema.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{QueryError, QueryResult};
use crate::schema::{Property, PropertyType};
use crate::value::Value;

/// Deepest accepted nesting of `and`/`or` lists; the top-level list is 0.
pub const MAX_FILTER_DEPTH: usize = 10;

/// Comparison applied by a leaf filter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum FilterOp {
    Equals,
    NotEquals,
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    GreaterThan,
    LessThan,
    GreaterOrEqual,
    LessOrEqual,
    IsEmpty,
    IsNotEmpty,
}

impl FilterOp {
    pub const ALL: [FilterOp; 12] = [
        Self::Equals,
        Self::NotEquals,
        Self::Contains,
        Self::NotContains,
        Self::StartsWith,
        Self::EndsWith,
        Self::GreaterThan,
        Self::LessThan,
        Self::GreaterOrEqual,
        Self::LessOrEqual,
        Self::IsEmpty,
        Self::IsNotEmpty,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Equals => "equals",
            Self::NotEquals => "not_equals",
            Self::Contains => "contains",
            Self::NotContains => "not_contains",
            Self::StartsWith => "starts_with",
            Self::EndsWith => "ends_with",
            Self::GreaterThan => "gt",
            Self::LessThan => "lt",
            Self::GreaterOrEqual => "gte",
            Self::LessOrEqual => "lte",
            Self::IsEmpty => "is_empty",
            Self::IsNotEmpty => "is_not_empty",
        }
    }

    /// Whether this operator is meaningful for a property of type `kind`.
    pub fn accepts(&self, kind: PropertyType) -> bool {
        match self {
            Self::Equals | Self::NotEquals | Self::IsEmpty | Self::IsNotEmpty => true,
            Self::Contains | Self::NotContains | Self::StartsWith | Self::EndsWith => {
                kind.is_textual()
            }
            Self::GreaterThan | Self::LessThan | Self::GreaterOrEqual | Self::LessOrEqual => {
                kind.is_ordered()
            }
        }
    }

    /// `is_empty` and `is_not_empty` ignore the filter value.
    pub fn takes_value(&self) -> bool {
        !matches!(self, Self::IsEmpty | Self::IsNotEmpty)
    }
}

impl fmt::Display for FilterOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterOp {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| QueryError::Filter(format!("unknown operator: {s}")))
    }
}

impl TryFrom<String> for FilterOp {
    type Error = QueryError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<FilterOp> for String {
    fn from(op: FilterOp) -> Self {
        op.as_str().to_string()
    }
}

/// A node of a boolean filter tree.
///
/// A leaf sets `property` and `operator` (and usually `value`); a grouping
/// node sets `and` or `or` instead. When both lists are set `and` wins.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub property: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<FilterOp>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub value: Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub and: Vec<Filter>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub or: Vec<Filter>,
}

impl Filter {
    pub fn leaf(property: impl Into<String>, operator: FilterOp, value: impl Into<Value>) -> Self {
        Self {
            property: property.into(),
            operator: Some(operator),
            value: value.into(),
            ..Default::default()
        }
    }

    pub fn all(filters: Vec<Filter>) -> Self {
        Self {
            and: filters,
            ..Default::default()
        }
    }

    pub fn any(filters: Vec<Filter>) -> Self {
        Self {
            or: filters,
            ..Default::default()
        }
    }

    pub fn is_group(&self) -> bool {
        !self.and.is_empty() || !self.or.is_empty()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl FromStr for Direction {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            other => Err(QueryError::Sort(format!("invalid sort direction: {other}"))),
        }
    }
}

impl TryFrom<String> for Direction {
    type Error = QueryError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Direction> for String {
    fn from(d: Direction) -> Self {
        match d {
            Direction::Asc => "asc".into(),
            Direction::Desc => "desc".into(),
        }
    }
}

/// One key of a multi-key sort.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sort {
    pub property: String,
    #[serde(default)]
    pub direction: Direction,
}

impl Sort {
    pub fn asc(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            direction: Direction::Asc,
        }
    }

    pub fn desc(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            direction: Direction::Desc,
        }
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn index(schema: &[Property]) -> HashMap<&str, &Property> {
    schema.iter().map(|p| (p.name.as_str(), p)).collect()
}

/// Check a filter list against `schema`.
///
/// Within one list a property may appear once; nested `and`/`or` lists start
/// their own scope. Lists nested deeper than [`MAX_FILTER_DEPTH`] are rejected.
pub fn validate_filters(filters: &[Filter], schema: &[Property]) -> QueryResult<()> {
    validate_level(filters, &index(schema), 0)
}

fn validate_level(
    filters: &[Filter],
    props: &HashMap<&str, &Property>,
    depth: usize,
) -> QueryResult<()> {
    if depth > MAX_FILTER_DEPTH {
        return Err(QueryError::Filter(
            "nested filters exceed maximum depth".into(),
        ));
    }
    let mut seen = HashSet::new();
    for filter in filters {
        validate_leaf(filter, props)?;
        if !filter.property.is_empty() && !seen.insert(filter.property.as_str()) {
            return Err(QueryError::Filter(format!(
                "duplicate property: {}",
                filter.property
            )));
        }
        if !filter.and.is_empty() {
            validate_level(&filter.and, props, depth + 1)?;
        }
        if !filter.or.is_empty() {
            validate_level(&filter.or, props, depth + 1)?;
        }
    }
    Ok(())
}

fn validate_leaf(filter: &Filter, props: &HashMap<&str, &Property>) -> QueryResult<()> {
    match (filter.property.as_str(), filter.operator) {
        ("", None) => Ok(()),
        ("", Some(_)) => Err(QueryError::Filter(
            "filter has operator but no property".into(),
        )),
        (name, op) => {
            let prop = props
                .get(name)
                .ok_or_else(|| QueryError::Filter(format!("unknown property: {name}")))?;
            let op = op.ok_or_else(|| {
                QueryError::Filter("filter has property but no operator".into())
            })?;
            if !op.accepts(prop.kind) {
                return Err(QueryError::Filter(format!(
                    "invalid operator {op} for property {name}"
                )));
            }
            Ok(())
        }
    }
}

/// Every sort names a known property, at most once.
pub fn validate_sorts(sorts: &[Sort], schema: &[Property]) -> QueryResult<()> {
    let props = index(schema);
    let mut seen = HashSet::new();
    for sort in sorts {
        if sort.property.is_empty() {
            return Err(QueryError::Sort("sort has no property".into()));
        }
        if !props.contains_key(sort.property.as_str()) {
            return Err(QueryError::Sort(format!("unknown property: {}", sort.property)));
        }
        if !seen.insert(sort.property.as_str()) {
            return Err(QueryError::Sort(format!("duplicate property: {}", sort.property)));
        }
    }
    Ok(())
}
