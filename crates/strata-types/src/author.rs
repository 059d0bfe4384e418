use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Identity recorded on every revision.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Author {
    pub name: String,
    pub email: String,
}

impl Author {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }

    /// Fill empty fields from `fallback`.
    pub fn or(self, fallback: &Author) -> Self {
        Self {
            name: if self.name.is_empty() {
                fallback.name.clone()
            } else {
                self.name
            },
            email: if self.email.is_empty() {
                fallback.email.clone()
            } else {
                self.email
            },
        }
    }
}

impl Default for Author {
    fn default() -> Self {
        Self::new("strata", "strata@localhost")
    }
}

impl fmt::Display for Author {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <{}>", self.name, self.email)
    }
}

/// Parses `Name <email>` or a bare `Name`, which leaves the email empty.
impl FromStr for Author {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (name, email) = match s.split_once('<') {
            Some((name, rest)) => {
                let email = rest
                    .strip_suffix('>')
                    .ok_or_else(|| TypeError::InvalidAuthor(format!("unclosed email in {s:?}")))?;
                (name.trim(), email.trim())
            }
            None => (s, ""),
        };
        if name.is_empty() {
            return Err(TypeError::InvalidAuthor(format!("missing name in {s:?}")));
        }
        if email.contains(['<', '>']) {
            return Err(TypeError::InvalidAuthor(format!("malformed email in {s:?}")));
        }
        Ok(Self::new(name, email))
    }
}
