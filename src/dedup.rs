// src/dedup.rs
//! Canonical-link resolution and the upsert gate.

use std::collections::HashSet;
use std::fmt;

use crate::ingest::types::RawEntry;
use crate::insight::Insight;

/// Identity of a story within one source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DedupKey {
    Link(String),
    /// Lower-cased, whitespace-collapsed title; used when the entry has no link.
    Title(String),
}

impl DedupKey {
    pub fn from_parts(link: Option<&str>, title: &str) -> Self {
        match link.map(str::trim).filter(|l| !l.is_empty()) {
            Some(l) => DedupKey::Link(l.to_string()),
            None => DedupKey::Title(
                title
                    .split_whitespace()
                    .collect::<Vec<_>>()
                    .join(" ")
                    .to_lowercase(),
            ),
        }
    }

    /// Flat form persisted next to the source name.
    pub fn storage_key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DedupKey::Link(l) => write!(f, "link:{l}"),
            DedupKey::Title(t) => write!(f, "title:{t}"),
        }
    }
}

/// The feed's explicit canonical link if present, else the entry link verbatim.
pub fn canonical_link(entry: &RawEntry) -> Option<String> {
    let non_empty = |l: &Option<String>| {
        l.as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
    };
    non_empty(&entry.canonical_link).or_else(|| non_empty(&entry.link))
}

/// `false` when `(source, key)` is already stored.
pub fn should_insert<F>(candidate: &Insight, existing: F) -> bool
where
    F: FnOnce(&str, &DedupKey) -> bool,
{
    !existing(&candidate.source, &candidate.dedup_key())
}

/// Per-cycle gate: remembers keys admitted in this run on top of the store lookup,
/// so a feed repeating an item within one body is stored once.
#[derive(Debug, Default)]
pub struct UpsertGate {
    admitted: HashSet<(String, DedupKey)>,
}

impl UpsertGate {
    pub fn admit<F>(&mut self, candidate: &Insight, existing: F) -> bool
    where
        F: FnOnce(&str, &DedupKey) -> bool,
    {
        let key = (candidate.source.clone(), candidate.dedup_key());
        if self.admitted.contains(&key) || !should_insert(candidate, existing) {
            return false;
        }
        self.admitted.insert(key);
        true
    }
}
