// tests/parse_feeds.rs
use chrono::{TimeZone, Utc};
use insight_tracker::config::FieldMapping;
use insight_tracker::ingest::parse::{parse_feed, parse_items};
use insight_tracker::FetchError;

fn fixture(name: &str) -> String {
    std::fs::read_to_string(format!("tests/fixtures/{name}")).expect("fixture")
}

#[test]
fn rss_fixture_maps_every_item() {
    let entries = parse_feed(&fixture("devtools_rss.xml"), &FieldMapping::default()).unwrap();
    assert_eq!(entries.len(), 4);

    let amp = &entries[0];
    assert_eq!(amp.title, "Amp ships multi-agent workflows");
    assert_eq!(amp.link.as_deref(), Some("https://devtools.test/amp-multi-agent"));
    assert_eq!(amp.author.as_deref(), Some("Jane Doe"));
    assert!(amp.tags.contains("agents"));
    assert!(amp.content.contains("<b>parallel</b>"));
    assert_eq!(
        amp.published,
        Some(Utc.with_ymd_and_hms(2024, 10, 21, 9, 30, 0).unwrap())
    );

    // content:encoded is preferred and entities inside CDATA are left alone.
    let cursor = &entries[2];
    assert!(cursor.content.starts_with("<p>Cursor IDE"));
    assert!(cursor.content.contains("&amp;"));
}

#[test]
fn atom_fixture_resolves_links_and_dates() {
    let entries = parse_feed(&fixture("research_atom.xml"), &FieldMapping::default()).unwrap();
    assert_eq!(entries.len(), 3);

    let eval = &entries[0];
    assert_eq!(
        eval.link.as_deref(),
        Some("https://research.test/amp/evaluating-agents?amp=1")
    );
    assert_eq!(
        eval.canonical_link.as_deref(),
        Some("https://research.test/evaluating-agents")
    );
    assert_eq!(eval.author.as_deref(), Some("R. Smith"));

    let ide = &entries[2];
    assert_eq!(
        ide.canonical_link.as_deref(),
        Some("https://research.test/ide-agents-canonical")
    );
    // +02:00 normalized to UTC.
    assert_eq!(
        ide.published,
        Some(Utc.with_ymd_and_hms(2024, 10, 18, 10, 0, 0).unwrap())
    );
}

#[test]
fn custom_mapping_picks_other_fields() {
    let mapping = FieldMapping {
        content: vec!["category".into()],
        link: vec!["guid".into()],
        ..FieldMapping::default()
    };
    let xml = r#"<rss><channel><item>
        <title>Tagged</title>
        <link>https://a.test/ignored</link>
        <guid>https://a.test/guid-1</guid>
        <category>claude</category>
    </item></channel></rss>"#;
    let entries = parse_feed(xml, &mapping).unwrap();
    assert_eq!(entries[0].content, "claude");
    assert_eq!(entries[0].link.as_deref(), Some("https://a.test/guid-1"));
}

#[test]
fn non_feed_documents_are_rejected() {
    assert!(matches!(
        parse_items("<html><body>hi</body></html>"),
        Err(FetchError::Parse(_))
    ));
    assert!(matches!(
        parse_items("<rss><channel><item><title>x</item></rss>"),
        Err(FetchError::Parse(_))
    ));
}

#[test]
fn empty_channel_is_not_an_error() {
    let entries = parse_feed(
        "<rss version=\"2.0\"><channel><title>Empty</title></channel></rss>",
        &FieldMapping::default(),
    )
    .unwrap();
    assert!(entries.is_empty());
}
