// src/snippet.rs
//! Per-query excerpts with highlight spans.
//!
//! Snippets are built at read time from the stored summary; nothing here
//! is persisted. Highlighting is word-boundary aware, so a query for "amp"
//! never lights up the middle of "vampire".

use once_cell::sync::OnceCell;
use regex::Regex;
use serde::Serialize;

use crate::config::SnippetSettings;
use crate::ingest::normalize_text;
use crate::insight::Insight;

pub const ELLIPSIS: &str = "...";
/// Sentence cuts are only taken if they keep at least this share of the budget.
pub const SENTENCE_FLOOR: f64 = 0.7;
/// Query tokens this short are ignored.
pub const MIN_TOKEN_CHARS: usize = 3;

/// Byte range into `SnippetResult::text`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SnippetResult {
    pub text: String,
    pub spans: Vec<Span>,
    /// No query term occurs in the text; the excerpt is "related", not a hit.
    pub fallback: bool,
    pub related_to: Option<String>,
    pub truncated: bool,
}

impl SnippetResult {
    /// The highlighted substrings, in order.
    pub fn highlighted(&self) -> impl Iterator<Item = &str> {
        self.spans.iter().map(move |s| &self.text[s.start..s.end])
    }
}

#[derive(Debug, Clone, Copy)]
struct Word {
    start: usize,
    end: usize,
}

fn words(text: &str) -> Vec<Word> {
    static RE: OnceCell<Regex> = OnceCell::new();
    let re = RE.get_or_init(|| Regex::new(r"\S+").unwrap());
    re.find_iter(text)
        .map(|m| Word {
            start: m.start(),
            end: m.end(),
        })
        .collect()
}

fn ends_sentence(word: &str) -> bool {
    word.trim_end_matches(['"', '\'', ')', ']'])
        .ends_with(['.', '!', '?'])
}

/// Stored summary minus markup and URLs, whitespace collapsed.
pub fn clean_for_snippet(s: &str) -> String {
    static RE_URL: OnceCell<Regex> = OnceCell::new();
    let re_url = RE_URL.get_or_init(|| Regex::new(r"(?i)\b(?:https?://|www\.)\S+").unwrap());
    let text = normalize_text(s);
    let stripped = re_url.replace_all(&text, "");
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Lower-cased word tokens longer than two chars, de-duplicated.
pub fn query_tokens(query: &str) -> Vec<String> {
    static RE: OnceCell<Regex> = OnceCell::new();
    let re = RE.get_or_init(|| Regex::new(r"(?u)\w+").unwrap());
    let mut out: Vec<String> = Vec::new();
    for m in re.find_iter(query) {
        let t = m.as_str().to_lowercase();
        if t.chars().count() >= MIN_TOKEN_CHARS && !out.contains(&t) {
            out.push(t);
        }
    }
    out
}

fn token_regex(tokens: &[String]) -> Option<Regex> {
    if tokens.is_empty() {
        return None;
    }
    let alts = tokens
        .iter()
        .map(|t| regex::escape(t))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"(?i)\b(?:{alts})\b")).ok()
}

/// End (exclusive word index) of a window starting at `from`.
/// Returns `(end, hard_cut)`. `min_end` words are always kept.
fn cut(text: &str, ws: &[Word], from: usize, budget: usize, min_end: usize) -> (usize, bool) {
    let n = ws.len();
    if n - from <= budget {
        return (n, false);
    }
    let limit = from + budget;
    let floor = from + (budget as f64 * SENTENCE_FLOOR).ceil() as usize;
    let floor = floor.max(min_end).max(from + 1);
    for end in (floor..=limit).rev() {
        let w = ws[end - 1];
        if ends_sentence(&text[w.start..w.end]) {
            return (end, false);
        }
    }
    (limit, true)
}

/// Prefix of `text` within the budget. Returns `(excerpt, truncated)`.
fn prefix(text: &str, ws: &[Word], budget: usize) -> (String, bool) {
    if ws.is_empty() {
        return (String::new(), false);
    }
    let (end, hard) = cut(text, ws, 0, budget, 1);
    let mut out = text[ws[0].start..ws[end - 1].end].to_string();
    if hard {
        out.push(' ');
        out.push_str(ELLIPSIS);
    }
    (out, end < ws.len())
}

/// Build the display excerpt of `insight` for `query`.
pub fn build_snippet(
    insight: &Insight,
    query: Option<&str>,
    settings: &SnippetSettings,
) -> SnippetResult {
    let content = clean_for_snippet(&insight.summary);
    let ws = words(&content);
    let budget = settings.word_budget.max(1);

    let query = query.map(str::trim).filter(|q| !q.is_empty());
    let Some(query) = query else {
        let (text, truncated) = prefix(&content, &ws, budget);
        return SnippetResult {
            text,
            truncated,
            ..SnippetResult::default()
        };
    };

    let tokens = query_tokens(query);
    let hit = token_regex(&tokens).and_then(|re| {
        let pos = re.find(&content)?.start();
        Some((re, pos))
    });

    let Some((re, pos)) = hit else {
        let (body, truncated) = prefix(&content, &ws, budget);
        let marker = format!("Related to \"{query}\"");
        let text = if body.is_empty() {
            marker
        } else {
            format!("{marker}: {body}")
        };
        return SnippetResult {
            text,
            spans: Vec::new(),
            fallback: true,
            related_to: Some(query.to_string()),
            truncated,
        };
    };

    // Word holding the first hit, and the start of its sentence.
    let hit_word = ws.partition_point(|w| w.end <= pos);
    let sentence_start = (1..=hit_word)
        .rev()
        .find(|&i| {
            let w = ws[i - 1];
            ends_sentence(&content[w.start..w.end])
        })
        .unwrap_or(0);
    let half = budget / 2;
    let (start, lead) = if hit_word - sentence_start > half {
        (hit_word - half, true)
    } else {
        (sentence_start, false)
    };
    let (end, hard) = cut(&content, &ws, start, budget, hit_word + 1);

    let body = &content[ws[start].start..ws[end - 1].end];
    let mut text = String::new();
    if lead {
        text.push_str(ELLIPSIS);
        text.push(' ');
    }
    let offset = text.len();
    text.push_str(body);
    if hard {
        text.push(' ');
        text.push_str(ELLIPSIS);
    }
    let spans = re
        .find_iter(body)
        .map(|m| Span {
            start: m.start() + offset,
            end: m.end() + offset,
        })
        .collect();

    SnippetResult {
        text,
        spans,
        fallback: false,
        related_to: None,
        truncated: lead || end < ws.len(),
    }
}

/// Escaped HTML with `<mark>` around spans; the only markup emitted.
pub fn render_html(snippet: &SnippetResult) -> String {
    let mut out = String::with_capacity(snippet.text.len() + snippet.spans.len() * 13);
    let mut at = 0;
    for s in &snippet.spans {
        out.push_str(&html_escape::encode_text(&snippet.text[at..s.start]));
        out.push_str("<mark>");
        out.push_str(&html_escape::encode_text(&snippet.text[s.start..s.end]));
        out.push_str("</mark>");
        at = s.end;
    }
    out.push_str(&html_escape::encode_text(&snippet.text[at..]));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn insight(summary: &str) -> Insight {
        let mut i = Insight::sample("blog", "t");
        i.summary = summary.to_string();
        i
    }

    fn settings(budget: usize) -> SnippetSettings {
        SnippetSettings {
            word_budget: budget,
        }
    }

    #[test]
    fn direct_hit_marks_exact_word() {
        let ins = insight("Amp is an amazing AI coding assistant");
        let s = build_snippet(&ins, Some("amazing"), &settings(60));
        assert!(!s.fallback);
        assert_eq!(s.text, "Amp is an amazing AI coding assistant");
        assert_eq!(s.spans, vec![Span { start: 10, end: 17 }]);
        assert_eq!(s.highlighted().collect::<Vec<_>>(), vec!["amazing"]);
    }

    #[test]
    fn no_query_gives_plain_prefix() {
        let ins = insight("One. Two three.");
        let s = build_snippet(&ins, None, &settings(60));
        assert_eq!(s.text, "One. Two three.");
        assert!(s.spans.is_empty());
        assert!(!s.fallback);
        assert_eq!(build_snippet(&ins, Some("   "), &settings(60)).text, s.text);
    }

    #[test]
    fn short_tokens_are_dropped() {
        assert_eq!(query_tokens("a to Amp, AMP cursor"), vec!["amp", "cursor"]);
    }

    #[test]
    fn vampire_is_not_a_hit_for_amp() {
        let mut ins = insight("Notes from a vampire bootcamp.");
        ins.matched_keywords.insert("amp".into());
        let s = build_snippet(&ins, Some("amp"), &settings(60));
        assert!(s.fallback);
        assert!(s.text.starts_with("Related to \"amp\": "));
        assert!(s.spans.is_empty());
        assert_eq!(s.related_to.as_deref(), Some("amp"));
    }

    #[test]
    fn urls_are_not_searchable_text() {
        let ins = insight("Read it at https://ampcode.com/notes today");
        let s = build_snippet(&ins, Some("ampcode"), &settings(60));
        assert!(s.fallback);
        assert!(!s.text.contains("https://"));
    }

    #[test]
    fn truncates_on_sentence_within_floor() {
        // budget 10, floor 7: sentence ends at word 8
        let ins = insight("One two three four five six seven eight. Nine ten eleven twelve thirteen.");
        let s = build_snippet(&ins, None, &settings(10));
        assert_eq!(s.text, "One two three four five six seven eight.");
        assert!(s.truncated);
    }

    #[test]
    fn hard_cut_with_ellipsis_below_floor() {
        let ins = insight("One two three four five. Six seven eight nine ten eleven twelve thirteen");
        let s = build_snippet(&ins, None, &settings(10));
        assert_eq!(s.text, "One two three four five. Six seven eight nine ten ...");
        assert!(s.truncated);
    }

    #[test]
    fn window_starts_at_hit_sentence() {
        let ins = insight(
            "Intro words here. Another filler sentence follows now. Cursor gained agents today. Tail text.",
        );
        let s = build_snippet(&ins, Some("agents"), &settings(8));
        assert!(s.text.starts_with("Cursor gained agents today."));
        assert_eq!(s.highlighted().collect::<Vec<_>>(), vec!["agents"]);
    }

    #[test]
    fn long_sentence_gets_leading_ellipsis() {
        let filler = "word ".repeat(30);
        let ins = insight(&format!("{filler}target word word word."));
        let s = build_snippet(&ins, Some("target"), &settings(10));
        assert!(s.text.starts_with("... "));
        let hl: Vec<_> = s.highlighted().collect();
        assert_eq!(hl, vec!["target"]);
        assert!(s.text.split_whitespace().filter(|w| *w != ELLIPSIS).count() <= 10);
    }

    #[test]
    fn html_render_escapes_and_marks() {
        let ins = insight("Use <b>Amp</b> &amp; more & amp it up");
        let s = build_snippet(&ins, Some("amp"), &settings(60));
        let html = render_html(&s);
        assert_eq!(html, "Use <mark>Amp</mark> &amp; more &amp; <mark>amp</mark> it up");
    }
}
