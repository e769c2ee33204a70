// src/ingest/parse.rs
//! Feed body → `RawEntry` values.
//!
//! Works on RSS 2.0 `<item>`, RSS 1.0 (RDF) `<item>` and Atom `<entry>` alike:
//! every direct child of an item is collected as a (qualified name, value)
//! pair, then the source's `FieldMapping` picks the normalized fields.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use metrics::histogram;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::BTreeSet;

use crate::config::FieldMapping;
use crate::error::FetchError;
use crate::ingest::types::RawEntry;

/// Raw children of a single `<item>`/`<entry>`, in document order.
#[derive(Debug, Clone, Default)]
pub struct FeedItem {
    fields: Vec<(String, String)>,
}

impl FeedItem {
    fn push(&mut self, name: String, value: String) {
        let v = value.trim();
        if !v.is_empty() {
            self.fields.push((name, v.to_string()));
        }
    }

    pub fn all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.fields
            .iter()
            .filter(move |(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn first(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A direct child of an item that is still being read.
struct OpenField {
    name: String,
    text: String,
    attr_value: Option<String>,
    /// Text of a nested `<name>` child (Atom person constructs).
    person_name: String,
    in_person_name: bool,
}

impl OpenField {
    fn new(e: &BytesStart) -> Self {
        let qname = qualified_name(e);
        let is_link = local_name(&qname).eq_ignore_ascii_case("link");
        let name = if is_link {
            // Atom: <link rel="canonical" href=".."/> becomes field `canonical`.
            match attr(e, "rel").as_deref() {
                None | Some("alternate") => qname,
                Some(rel) => rel.to_string(),
            }
        } else {
            qname
        };
        let attr_value = attr(e, "href")
            .or_else(|| attr(e, "term"))
            .or_else(|| attr(e, "url"));
        Self {
            name,
            text: String::new(),
            attr_value,
            person_name: String::new(),
            in_person_name: false,
        }
    }

    /// A child element opened inside this field.
    fn open_nested(&mut self, qname: &str) {
        self.in_person_name = local_name(qname) == "name";
    }

    fn close_nested(&mut self) {
        self.in_person_name = false;
    }

    fn push_text(&mut self, s: &str) {
        if self.in_person_name {
            if !self.person_name.is_empty() {
                self.person_name.push(' ');
            }
            self.person_name.push_str(s);
        }
        if !self.text.is_empty() {
            self.text.push(' ');
        }
        self.text.push_str(s);
    }

    fn finish(self, item: &mut FeedItem) {
        let value = if !self.person_name.trim().is_empty() {
            self.person_name
        } else if self.text.trim().is_empty() {
            self.attr_value.unwrap_or_default()
        } else {
            self.text
        };
        item.push(self.name, value);
    }
}

fn qualified_name(e: &BytesStart) -> String {
    String::from_utf8_lossy(e.name().as_ref()).into_owned()
}

fn local_name(qname: &str) -> &str {
    qname.rsplit(':').next().unwrap_or(qname)
}

fn decode(bytes: &[u8]) -> String {
    let raw = String::from_utf8_lossy(bytes);
    html_escape::decode_html_entities(&raw).into_owned()
}

fn attr(e: &BytesStart, key: &str) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key.as_bytes())
        .map(|a| decode(&a.value))
}

fn is_feed_root(qname: &str) -> bool {
    matches!(local_name(qname), "rss" | "RDF" | "feed")
}

fn is_item(qname: &str) -> bool {
    matches!(local_name(qname), "item" | "entry")
}

/// Extract all items of a feed document.
pub fn parse_items(xml: &str) -> Result<Vec<FeedItem>, FetchError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut items = Vec::new();
    let mut depth = 0usize;
    let mut saw_root = false;
    let mut current: Option<FeedItem> = None;
    let mut item_depth = 0usize;
    let mut field: Option<OpenField> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                depth += 1;
                let qname = qualified_name(&e);
                if depth == 1 && is_feed_root(&qname) {
                    saw_root = true;
                }
                if current.is_none() {
                    if is_item(&qname) {
                        current = Some(FeedItem::default());
                        item_depth = depth;
                    }
                } else if field.is_none() && depth == item_depth + 1 {
                    field = Some(OpenField::new(&e));
                } else if depth == item_depth + 2 {
                    if let Some(f) = field.as_mut() {
                        f.open_nested(&qname);
                    }
                }
            }
            Ok(Event::Empty(e)) => {
                if let Some(item) = current.as_mut() {
                    if field.is_none() && depth == item_depth {
                        OpenField::new(&e).finish(item);
                    }
                }
            }
            Ok(Event::Text(t)) => {
                if let Some(f) = field.as_mut() {
                    f.push_text(&decode(&t));
                }
            }
            Ok(Event::CData(c)) => {
                if let Some(f) = field.as_mut() {
                    f.push_text(&String::from_utf8_lossy(&c));
                }
            }
            Ok(Event::End(_)) => {
                if current.is_some() {
                    if depth == item_depth + 2 {
                        if let Some(f) = field.as_mut() {
                            f.close_nested();
                        }
                    } else if depth == item_depth + 1 {
                        if let (Some(f), Some(item)) = (field.take(), current.as_mut()) {
                            f.finish(item);
                        }
                    } else if depth == item_depth {
                        if let Some(item) = current.take() {
                            items.push(item);
                        }
                    }
                }
                depth = depth.saturating_sub(1);
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(FetchError::Parse(format!(
                    "xml error at byte {}: {e}",
                    reader.buffer_position()
                )))
            }
            _ => {}
        }
    }

    if !saw_root {
        return Err(FetchError::Parse(
            "document has no rss, rdf or atom root element".into(),
        ));
    }
    Ok(items)
}

/// Best-effort date parsing: RFC 2822, RFC 3339, then bare ISO forms.
pub fn parse_date(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(ndt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Some(ndt.and_utc());
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|ndt| ndt.and_utc())
}

fn is_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

fn first_of<'a>(item: &'a FeedItem, names: &'a [String]) -> Option<&'a str> {
    names.iter().find_map(|n| item.first(n))
}

fn first_url<'a>(item: &'a FeedItem, names: &'a [String]) -> Option<String> {
    names
        .iter()
        .flat_map(|n| item.all(n))
        .find(|v| is_url(v))
        .map(str::to_string)
}

/// Resolve one item through the field mapping.
/// Returns `None` for items with neither a title nor content.
pub fn map_entry(item: &FeedItem, mapping: &FieldMapping) -> Option<RawEntry> {
    let title = first_of(item, &mapping.title).unwrap_or_default().to_string();

    let mut parts: Vec<&str> = Vec::new();
    for v in mapping.content.iter().flat_map(|n| item.all(n)) {
        if !parts.contains(&v) {
            parts.push(v);
        }
    }
    let content = parts.join("\n");

    if title.is_empty() && content.is_empty() {
        return None;
    }

    let published = mapping
        .date
        .iter()
        .flat_map(|n| item.all(n))
        .find_map(parse_date);

    let tags: BTreeSet<String> = mapping
        .tags
        .iter()
        .flat_map(|n| item.all(n))
        .map(str::to_string)
        .collect();

    Some(RawEntry {
        title,
        content,
        published,
        link: first_url(item, &mapping.link),
        canonical_link: first_url(item, &mapping.canonical_link),
        author: first_of(item, &mapping.author).map(str::to_string),
        tags,
    })
}

/// Parse a whole feed body with the given mapping.
pub fn parse_feed(xml: &str, mapping: &FieldMapping) -> Result<Vec<RawEntry>, FetchError> {
    let t0 = std::time::Instant::now();
    let items = parse_items(xml)?;
    let entries: Vec<RawEntry> = items.iter().filter_map(|it| map_entry(it, mapping)).collect();
    histogram!("ingest_parse_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:content="http://purl.org/rss/1.0/modules/content/">
  <channel>
    <title>Channel title is not an item</title>
    <link>https://blog.test/</link>
    <item>
      <title>Amp ships &amp; learns</title>
      <link>https://blog.test/amp</link>
      <description>&lt;p&gt;Short&amp;nbsp;teaser&lt;/p&gt;</description>
      <content:encoded><![CDATA[<p>Full <b>body</b></p>]]></content:encoded>
      <pubDate>Mon, 21 Oct 2024 07:28:00 GMT</pubDate>
      <dc:creator>Jane</dc:creator>
      <category>agents</category>
      <category>tools</category>
    </item>
    <item>
      <description>No title, no date</description>
    </item>
    <item><title></title></item>
  </channel>
</rss>"#;

    const ATOM: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Atom feed</title>
  <entry>
    <title>Cursor adds agents</title>
    <link rel="alternate" href="https://news.test/amp/cursor?amp=1"/>
    <link rel="canonical" href="https://news.test/cursor"/>
    <updated>2024-10-21T08:00:00Z</updated>
    <author><name>Sam</name></author>
    <category term="ide"/>
    <summary type="html">Cursor &lt;i&gt;now&lt;/i&gt; runs agents.</summary>
  </entry>
</feed>"#;

    #[test]
    fn first_outlives_the_lookup_name() {
        let items = parse_items(RSS).unwrap();
        let creator = {
            let name = String::from("DC:CREATOR");
            items[0].first(&name)
        };
        assert_eq!(creator, Some("Jane"));
        assert_eq!(items[0].first("category"), Some("agents"));
    }

    #[test]
    fn rss_items_map_through_default_fields() {
        let out = parse_feed(RSS, &FieldMapping::default()).unwrap();
        assert_eq!(out.len(), 2);
        let e = &out[0];
        assert_eq!(e.title, "Amp ships & learns");
        assert_eq!(e.link.as_deref(), Some("https://blog.test/amp"));
        assert!(e.content.contains("<b>body</b>"));
        assert!(e.content.contains("<p>Short"));
        assert_eq!(e.author.as_deref(), Some("Jane"));
        assert_eq!(e.tags.len(), 2);
        assert_eq!(e.published.unwrap().to_rfc3339(), "2024-10-21T07:28:00+00:00");

        let untitled = &out[1];
        assert!(untitled.title.is_empty());
        assert!(untitled.published.is_none());
        assert!(untitled.link.is_none());
    }

    #[test]
    fn atom_links_split_by_rel() {
        let out = parse_feed(ATOM, &FieldMapping::default()).unwrap();
        assert_eq!(out.len(), 1);
        let e = &out[0];
        assert_eq!(e.link.as_deref(), Some("https://news.test/amp/cursor?amp=1"));
        assert_eq!(e.canonical_link.as_deref(), Some("https://news.test/cursor"));
        assert_eq!(e.author.as_deref(), Some("Sam"));
        assert!(e.tags.contains("ide"));
        assert!(e.published.is_some());
    }

    #[test]
    fn atom_author_prefers_name_child() {
        let xml = r#"<feed xmlns="http://www.w3.org/2005/Atom"><entry>
            <title>Agents</title>
            <author><name>Sam</name><uri>https://sam.test/</uri><email>sam@sam.test</email></author>
        </entry></feed>"#;
        let out = parse_feed(xml, &FieldMapping::default()).unwrap();
        assert_eq!(out[0].author.as_deref(), Some("Sam"));
    }

    #[test]
    fn author_without_name_child_keeps_text() {
        let xml = r#"<feed xmlns="http://www.w3.org/2005/Atom"><entry>
            <title>Agents</title>
            <author><uri>https://sam.test/</uri></author>
        </entry></feed>"#;
        let out = parse_feed(xml, &FieldMapping::default()).unwrap();
        assert_eq!(out[0].author.as_deref(), Some("https://sam.test/"));
    }

    #[test]
    fn custom_mapping_overrides_defaults() {
        let mapping = FieldMapping {
            content: vec!["description".into()],
            ..FieldMapping::default()
        };
        let out = parse_feed(RSS, &mapping).unwrap();
        assert!(!out[0].content.contains("body"));
    }

    #[test]
    fn malformed_bodies_are_parse_errors() {
        let broken = "<rss><channel><item><title>x</channel></rss>";
        assert!(matches!(parse_items(broken), Err(FetchError::Parse(_))));
        assert!(matches!(
            parse_items("<html><body>not a feed</body></html>"),
            Err(FetchError::Parse(_))
        ));
        assert!(matches!(parse_items("plain text"), Err(FetchError::Parse(_))));
    }

    #[test]
    fn dates_in_common_shapes() {
        assert!(parse_date("Tue, 10 Jun 2003 04:00:00 GMT").is_some());
        assert!(parse_date("2024-01-02T03:04:05+02:00").is_some());
        assert!(parse_date("2024-01-02").is_some());
        assert!(parse_date("yesterday").is_none());
    }
}
