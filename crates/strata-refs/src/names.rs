//! Branch and remote name validation.
//!
//! Valid branch names:
//! - Must be non-empty
//! - Must not contain whitespace, `~`, `^`, `:`, `?`, `*`, `[`, `\`
//! - Must not contain `..` or `@{`
//! - Must not start or end with `.` or `/`
//! - Must not end with `.lock`
//! - Components between slashes must be non-empty and not start with `.`

use crate::error::{RefError, Result};
use crate::types::Ref;

/// Characters that are forbidden anywhere in a ref name.
const FORBIDDEN_CHARS: &[char] = &[' ', '\t', '\n', '\r', '~', '^', ':', '?', '*', '[', '\\'];

fn invalid(name: &str, reason: impl Into<String>) -> RefError {
    RefError::InvalidName {
        name: name.to_string(),
        reason: reason.into(),
    }
}

/// Validate a branch name, returning `Ok(())` if valid.
///
/// # Examples
///
/// ```
/// use strata_refs::names::validate_branch_name;
///
/// assert!(validate_branch_name("main").is_ok());
/// assert!(validate_branch_name("feature/auth").is_ok());
/// assert!(validate_branch_name("").is_err());
/// assert!(validate_branch_name("bad..name").is_err());
/// ```
pub fn validate_branch_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(invalid(name, "branch name must not be empty"));
    }
    if let Some(ch) = FORBIDDEN_CHARS.iter().find(|ch| name.contains(**ch)) {
        return Err(invalid(name, format!("contains forbidden character: {ch:?}")));
    }
    if name.contains("..") {
        return Err(invalid(name, "must not contain '..'"));
    }
    if name.contains("@{") {
        return Err(invalid(name, "must not contain '@{'"));
    }
    if name.starts_with('.') || name.ends_with('.') {
        return Err(invalid(name, "must not start or end with '.'"));
    }
    if name.starts_with('/') || name.ends_with('/') {
        return Err(invalid(name, "must not start or end with '/'"));
    }
    if name.ends_with(".lock") {
        return Err(invalid(name, "must not end with '.lock'"));
    }
    for component in name.split('/') {
        if component.is_empty() {
            return Err(invalid(name, "path components must not be empty"));
        }
        if component.starts_with('.') {
            return Err(invalid(
                name,
                format!("component must not start with '.': {component:?}"),
            ));
        }
    }
    Ok(())
}

/// Validate a remote name. Must be a simple identifier (no slashes).
pub fn validate_remote_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(invalid(name, "remote name must not be empty"));
    }
    if name.contains('/') {
        return Err(invalid(name, "remote name must not contain '/'"));
    }
    validate_branch_name(name)
}

/// Validate every name a ref carries.
pub(crate) fn validate_ref(reference: &Ref) -> Result<()> {
    match reference {
        Ref::Branch { name, .. } => validate_branch_name(name),
        Ref::Remote { remote, branch, .. } => {
            validate_remote_name(remote)?;
            validate_branch_name(branch)
        }
    }
}

#[cfg(test)]
mod tests {
    use strata_types::ObjectId;

    use super::*;

    #[test]
    fn valid_names() {
        assert!(validate_branch_name("main").is_ok());
        assert!(validate_branch_name("v1.0").is_ok());
        assert!(validate_branch_name("feature/deep/nested").is_ok());
    }

    #[test]
    fn reject_malformed_names() {
        for bad in [
            "",
            "bad..name",
            "has space",
            "a~b",
            "a:b",
            "a*b",
            ".hidden",
            "trailing.",
            "/leading",
            "trailing/",
            "a//b",
            "main.lock",
            "ref@{0}",
            "feature/.hidden",
        ] {
            assert!(validate_branch_name(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn remote_names() {
        assert!(validate_remote_name("origin").is_ok());
        assert!(validate_remote_name("up-stream").is_ok());
        assert!(validate_remote_name("").is_err());
        assert!(validate_remote_name("a/b").is_err());
        assert!(validate_remote_name("a b").is_err());
    }

    #[test]
    fn refs_are_checked_by_every_name() {
        let id = ObjectId::from_bytes(b"tip");
        assert!(validate_ref(&Ref::branch("main", id)).is_ok());
        assert!(validate_ref(&Ref::remote("origin", "main", id)).is_ok());
        assert!(validate_ref(&Ref::remote("a/b", "main", id)).is_err());
        assert!(validate_ref(&Ref::remote("origin", "bad..name", id)).is_err());
    }
}
