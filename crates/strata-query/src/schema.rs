//! Table schema: the declared properties of a Table or Hybrid node.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{QueryError, QueryResult};

/// Declared type of a property.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyType {
    Text,
    Number,
    Checkbox,
    /// ISO 8601 date string.
    Date,
    /// One option id.
    Select,
    /// List of option ids.
    MultiSelect,
    Url,
    Email,
    Phone,
}

impl PropertyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Number => "number",
            Self::Checkbox => "checkbox",
            Self::Date => "date",
            Self::Select => "select",
            Self::MultiSelect => "multi_select",
            Self::Url => "url",
            Self::Email => "email",
            Self::Phone => "phone",
        }
    }

    /// Types whose values are free text.
    pub fn is_textual(&self) -> bool {
        matches!(
            self,
            Self::Text | Self::Url | Self::Email | Self::Phone | Self::Select | Self::MultiSelect
        )
    }

    /// Types with a meaningful order.
    pub fn is_ordered(&self) -> bool {
        matches!(self, Self::Number | Self::Date)
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PropertyType {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "text" => Self::Text,
            "number" => Self::Number,
            "checkbox" => Self::Checkbox,
            "date" => Self::Date,
            "select" => Self::Select,
            "multi_select" => Self::MultiSelect,
            "url" => Self::Url,
            "email" => Self::Email,
            "phone" => Self::Phone,
            other => return Err(QueryError::Schema(format!("unknown property type: {other}"))),
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectOption {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub color: String,
}

/// One column of a table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: PropertyType,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<SelectOption>,
}

impl Property {
    pub fn new(name: impl Into<String>, kind: PropertyType) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
            options: Vec::new(),
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_options(mut self, options: Vec<SelectOption>) -> Self {
        self.options = options;
        self
    }
}

impl FromStr for Property {
    type Err = QueryError;

    /// `name:type`, with a trailing `!` on the type marking it required.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, kind) = s
            .split_once(':')
            .ok_or_else(|| QueryError::Schema(format!("expected name:type, got {s:?}")))?;
        let (kind, required) = match kind.strip_suffix('!') {
            Some(k) => (k, true),
            None => (kind, false),
        };
        let mut prop = Property::new(name.trim(), kind.trim().parse()?);
        prop.required = required;
        Ok(prop)
    }
}

/// Find a property by name.
pub fn find_property<'a>(schema: &'a [Property], name: &str) -> Option<&'a Property> {
    schema.iter().find(|p| p.name == name)
}

/// Names must be present and unique.
pub fn validate_schema(schema: &[Property]) -> QueryResult<()> {
    let mut seen = HashSet::new();
    for prop in schema {
        if prop.name.trim().is_empty() {
            return Err(QueryError::Schema("property has no name".into()));
        }
        if !seen.insert(prop.name.as_str()) {
            return Err(QueryError::Schema(format!("duplicate property: {}", prop.name)));
        }
    }
    Ok(())
}
