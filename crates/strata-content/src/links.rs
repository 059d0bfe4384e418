//! Links between pages.
//!
//! A page links to another node with a relative markdown link to that
//! node's page file, e.g. `[Notes](../<id>/index.md)`. The [`LinkIndex`]
//! answers "who links here" without rereading every page.

use std::collections::HashMap;
use std::sync::{LazyLock, RwLock};

use regex::Regex;
use strata_types::Id;

use crate::store::PAGE_FILE;

static MARKDOWN_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[[^\]]*\]\(([^)\s]+)\)").expect("valid link pattern"));

/// Ids of the nodes `content` links to, in order of first appearance.
///
/// Absolute and external targets are ignored, as are targets whose id does
/// not parse.
pub fn linked_node_ids(content: &str) -> Vec<Id> {
    let mut ids = Vec::new();
    for caps in MARKDOWN_LINK.captures_iter(content) {
        if let Some(id) = link_target(&caps[1]) {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
    }
    ids
}

fn link_target(target: &str) -> Option<Id> {
    if target.starts_with('/') || target.contains("://") {
        return None;
    }
    let mut parts = target.rsplit('/');
    if parts.next()? != PAGE_FILE {
        return None;
    }
    let id: Id = parts.next()?.parse().ok()?;
    if id.is_zero() || parts.any(|part| part != "..") {
        return None;
    }
    Some(id)
}

#[derive(Default)]
struct Links {
    forward: HashMap<Id, Vec<Id>>,
    backward: HashMap<Id, Vec<Id>>,
}

impl Links {
    fn insert(&mut self, source: Id, targets: Vec<Id>) {
        for target in &targets {
            self.backward.entry(*target).or_default().push(source);
        }
        if !targets.is_empty() {
            self.forward.insert(source, targets);
        }
    }

    fn remove(&mut self, source: Id) {
        for target in self.forward.remove(&source).unwrap_or_default() {
            if let Some(sources) = self.backward.get_mut(&target) {
                sources.retain(|s| *s != source);
                if sources.is_empty() {
                    self.backward.remove(&target);
                }
            }
        }
    }
}

/// Forward and backward page links of one workspace.
///
/// Empty until [`build`](Self::build) runs; updates before that are
/// dropped since the build reads the pages as they are then.
#[derive(Default)]
pub(crate) struct LinkIndex {
    links: RwLock<Option<Links>>,
}

impl LinkIndex {
    pub(crate) fn is_built(&self) -> bool {
        self.links.read().expect("lock poisoned").is_some()
    }

    pub(crate) fn build(&self, pages: impl IntoIterator<Item = (Id, String)>) {
        let mut links = Links::default();
        for (id, body) in pages {
            links.insert(id, linked_node_ids(&body));
        }
        *self.links.write().expect("lock poisoned") = Some(links);
    }

    /// Replace the outgoing links of `source` with those found in `content`.
    pub(crate) fn update(&self, source: Id, content: &str) {
        if let Some(links) = self.links.write().expect("lock poisoned").as_mut() {
            links.remove(source);
            links.insert(source, linked_node_ids(content));
        }
    }

    pub(crate) fn remove(&self, source: Id) {
        if let Some(links) = self.links.write().expect("lock poisoned").as_mut() {
            links.remove(source);
        }
    }

    /// Sources linking to `target`. Empty if the index is not built.
    pub(crate) fn backlinks(&self, target: Id) -> Vec<Id> {
        self.links
            .read()
            .expect("lock poisoned")
            .as_ref()
            .and_then(|links| links.backward.get(&target).cloned())
            .unwrap_or_default()
    }

    pub(crate) fn clear(&self) {
        *self.links.write().expect("lock poisoned") = None;
    }
}
