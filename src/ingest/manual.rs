// src/ingest/manual.rs
//! Free-text submissions turned into feed-shaped entries.

use once_cell::sync::OnceCell;
use regex::Regex;

use crate::ingest::normalize_text;
use crate::ingest::types::RawEntry;
use crate::insight::headline;

pub const MANUAL_TITLE_CHARS: usize = 80;

fn url_regex() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r#"https?://[^\s<>"{}|\\^`\[\]]+"#).unwrap())
}

/// Title is the first sentence (shortened), link the first URL, content the whole text.
pub fn entry_from_text(raw: &str) -> RawEntry {
    let cleaned = normalize_text(raw);
    RawEntry {
        title: headline(&cleaned, MANUAL_TITLE_CHARS),
        content: raw.trim().to_string(),
        link: url_regex()
            .find(raw)
            .map(|m| m.as_str().trim_end_matches(['.', ',', ')']).to_string()),
        ..RawEntry::default()
    }
}
