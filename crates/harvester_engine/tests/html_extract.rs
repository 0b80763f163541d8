use harvester_engine::{
    ExtractionRules, Extractor, FieldRules, HtmlExtractor, HtmlItem, Pick, RuleError,
    SelectorRule, Transform,
};
use pretty_assertions::assert_eq;

fn timeline_rules() -> ExtractionRules {
    ExtractionRules {
        base_url: Some("https://x.test".to_string()),
        identity: vec![
            SelectorRule::attr("a.permalink", "href"),
            SelectorRule::attr("time", "data-href"),
        ],
        natural_key: vec!["author".to_string(), "timestamp".to_string()],
        text_fields: vec![
            FieldRules::new(
                "author",
                vec![
                    SelectorRule::text(".handle"),
                    SelectorRule::attr("a.permalink", "href").transform(Transform::UrlPathHead),
                ],
            ),
            FieldRules::new(
                "text",
                vec![
                    SelectorRule::text(".body"),
                    SelectorRule::attr("img", "alt")
                        .pick(Pick::Longest)
                        .transform(Transform::QuotedText),
                ],
            ),
            FieldRules::new("timestamp", vec![SelectorRule::attr("time", "datetime")]),
        ],
        counter_fields: vec![
            FieldRules::new(
                "likes",
                vec![
                    SelectorRule::text(".likes"),
                    SelectorRule::attr(".likes-button", "aria-label"),
                ],
            ),
            FieldRules::new("views", vec![SelectorRule::text(".views")]),
        ],
    }
}

#[test]
fn first_strategy_wins_when_present() {
    let extractor = HtmlExtractor::compile(&timeline_rules()).unwrap();
    let item = HtmlItem::new(
        r#"<article>
            <span class="handle">alice</span>
            <a class="permalink" href="/alice/status/42?s=20">link</a>
            <p class="body">  Hello there  </p>
            <time datetime="2024-05-01T10:00:00Z"></time>
            <span class="likes">1.2K</span>
            <span class="views">3,400</span>
        </article>"#,
    );

    let record = extractor.extract(&item, "Test").unwrap();
    assert_eq!(record.source_item_id, "https://x.test/alice/status/42");
    assert_eq!(record.group_key, "Test");
    assert_eq!(record.author(), "alice");
    assert_eq!(record.text(), "Hello there");
    assert_eq!(record.timestamp(), "2024-05-01T10:00:00Z");
    assert_eq!(record.counter("likes"), 1200);
    assert_eq!(record.counter("views"), 3400);
}

#[test]
fn later_strategies_fill_missing_fields() {
    let extractor = HtmlExtractor::compile(&timeline_rules()).unwrap();
    let item = HtmlItem::new(
        r#"<article>
            <a class="permalink" href="https://x.test/bob/status/7/">link</a>
            <img alt="Photo">
            <img alt="Photo by bob on May 1. May be an image of text that says &quot;sunset&quot;.">
            <button class="likes-button" aria-label="2M likes"></button>
        </article>"#,
    );

    let record = extractor.extract(&item, "Test").unwrap();
    assert_eq!(record.source_item_id, "https://x.test/bob/status/7");
    assert_eq!(record.author(), "bob");
    assert_eq!(record.text(), "sunset");
    assert_eq!(record.timestamp(), "");
    assert_eq!(record.counter("likes"), 2_000_000);
    assert_eq!(record.counter("views"), 0);
}

#[test]
fn natural_key_used_when_no_link_exists() {
    let extractor = HtmlExtractor::compile(&timeline_rules()).unwrap();
    let item = HtmlItem::new(
        r#"<div><span class="handle">carol</span><time datetime="2024-05-02"></time></div>"#,
    );
    let record = extractor.extract(&item, "Test").unwrap();
    assert_eq!(record.source_item_id, "carol|2024-05-02");
    assert!(record.is_identified());
}

#[test]
fn empty_markup_yields_unidentified_record() {
    let extractor = HtmlExtractor::compile(&timeline_rules()).unwrap();
    let record = extractor.extract(&HtmlItem::new("<div></div>"), "Test").unwrap();
    assert_eq!(record.source_item_id, "");
    assert!(!record.is_identified());
    assert_eq!(record.text(), "");
    assert_eq!(record.counter("likes"), 0);
}

#[test]
fn zero_count_falls_through_to_next_strategy() {
    let extractor = HtmlExtractor::compile(&timeline_rules()).unwrap();
    let item = HtmlItem::new(
        r#"<div>
            <span class="likes">0</span>
            <button class="likes-button" aria-label="15 likes"></button>
        </div>"#,
    );
    let record = extractor.extract(&item, "Test").unwrap();
    assert_eq!(record.counter("likes"), 15);
}

#[test]
fn last_pick_reads_final_match() {
    let rules = ExtractionRules {
        identity: vec![SelectorRule::attr("a", "href").pick(Pick::Last)],
        ..ExtractionRules::default()
    };
    let extractor = HtmlExtractor::compile(&rules).unwrap();
    let item = HtmlItem::new(r#"<p><a href="first">1</a><a href="  ">2</a><a href="last">3</a></p>"#);
    let record = extractor.extract(&item, "Test").unwrap();
    assert_eq!(record.source_item_id, "last");
}

#[test]
fn invalid_selector_is_a_configuration_error() {
    let rules = ExtractionRules {
        identity: vec![SelectorRule::text("a[[")],
        ..ExtractionRules::default()
    };
    match HtmlExtractor::compile(&rules) {
        Err(RuleError::InvalidSelector { selector, .. }) => assert_eq!(selector, "a[["),
        Ok(_) => panic!("selector should not compile"),
    }
}
