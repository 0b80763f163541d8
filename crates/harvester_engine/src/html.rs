use harvester_core::FallbackChain;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{ExtractError, Extractor, RecordExtractor};

/// Rendered markup of one item, as captured from the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HtmlItem {
    pub html: String,
}

impl HtmlItem {
    pub fn new(html: impl Into<String>) -> Self {
        Self { html: html.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pick {
    #[default]
    First,
    Last,
    Longest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transform {
    /// Text between the first pair of quotes, or the whole value.
    QuotedText,
    /// First path segment of a link, e.g. the handle in `/alice/status/1`.
    UrlPathHead,
}

/// One strategy: read `attr` (or the text) of the elements matching
/// `selector`, pick one non-blank value and optionally transform it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorRule {
    pub selector: String,
    #[serde(default)]
    pub attr: Option<String>,
    #[serde(default)]
    pub pick: Pick,
    #[serde(default)]
    pub transform: Option<Transform>,
}

impl SelectorRule {
    pub fn text(selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            attr: None,
            pick: Pick::First,
            transform: None,
        }
    }

    pub fn attr(selector: impl Into<String>, attr: impl Into<String>) -> Self {
        Self {
            attr: Some(attr.into()),
            ..Self::text(selector)
        }
    }

    pub fn pick(mut self, pick: Pick) -> Self {
        self.pick = pick;
        self
    }

    pub fn transform(mut self, transform: Transform) -> Self {
        self.transform = Some(transform);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRules {
    pub name: String,
    pub strategies: Vec<SelectorRule>,
}

impl FieldRules {
    pub fn new(name: impl Into<String>, strategies: Vec<SelectorRule>) -> Self {
        Self {
            name: name.into(),
            strategies,
        }
    }
}

/// Declarative extraction rules for HTML item snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionRules {
    /// Prefix for root-relative identity links.
    pub base_url: Option<String>,
    pub identity: Vec<SelectorRule>,
    pub natural_key: Vec<String>,
    pub text_fields: Vec<FieldRules>,
    pub counter_fields: Vec<FieldRules>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleError {
    #[error("invalid selector {selector:?}: {message}")]
    InvalidSelector { selector: String, message: String },
}

pub struct HtmlExtractor {
    inner: RecordExtractor<Html>,
}

impl HtmlExtractor {
    pub fn compile(rules: &ExtractionRules) -> Result<Self, RuleError> {
        let base_url = rules.base_url.clone();
        let mut identity: FallbackChain<Html, String> = FallbackChain::new();
        for rule in &rules.identity {
            let read = compile_rule(rule)?;
            let base_url = base_url.clone();
            identity = identity.then_text(move |doc: &Html| {
                read(doc).map(|href| absolutize(base_url.as_deref(), href))
            });
        }

        let mut inner = RecordExtractor::new(identity).natural_key(rules.natural_key.clone());
        for field in &rules.text_fields {
            let mut chain: FallbackChain<Html, String> = FallbackChain::new();
            for rule in &field.strategies {
                chain = chain.then_text(compile_rule(rule)?);
            }
            inner = inner.text_field(field.name.clone(), chain);
        }
        for field in &rules.counter_fields {
            let mut chain: FallbackChain<Html, u64> = FallbackChain::new();
            for rule in &field.strategies {
                chain = chain.then_count(compile_rule(rule)?);
            }
            inner = inner.counter_field(field.name.clone(), chain);
        }
        Ok(Self { inner })
    }
}

impl Extractor<HtmlItem> for HtmlExtractor {
    fn extract(
        &self,
        cursor: &HtmlItem,
        group_key: &str,
    ) -> Result<harvester_core::Record, ExtractError> {
        let doc = Html::parse_fragment(&cursor.html);
        Ok(self.inner.read(&doc, group_key))
    }
}

type CompiledRule = Box<dyn Fn(&Html) -> Option<String> + Send + Sync>;

fn compile_rule(rule: &SelectorRule) -> Result<CompiledRule, RuleError> {
    let selector = Selector::parse(&rule.selector).map_err(|err| RuleError::InvalidSelector {
        selector: rule.selector.clone(),
        message: format!("{err:?}"),
    })?;
    let attr = rule.attr.clone();
    let pick = rule.pick;
    let transform = rule.transform;

    Ok(Box::new(move |doc: &Html| {
        let mut values = doc
            .select(&selector)
            .filter_map(|el| match attr.as_deref() {
                Some(name) => el.value().attr(name).map(str::to_string),
                None => Some(el.text().collect::<String>()),
            })
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());

        let picked = match pick {
            Pick::First => values.next(),
            Pick::Last => values.last(),
            Pick::Longest => values.fold(None, |best: Option<String>, value| match best {
                Some(b) if b.chars().count() >= value.chars().count() => Some(b),
                _ => Some(value),
            }),
        }?;

        match transform {
            None => Some(picked),
            Some(Transform::QuotedText) => Some(quoted_text(&picked)),
            Some(Transform::UrlPathHead) => url_path_head(&picked),
        }
    }))
}

fn quoted_text(value: &str) -> String {
    for (open, close) in [('\u{201c}', '\u{201d}'), ('"', '"')] {
        if let Some((_, rest)) = value.split_once(open) {
            if let Some((inner, _)) = rest.split_once(close) {
                if !inner.trim().is_empty() {
                    return inner.trim().to_string();
                }
            }
        }
    }
    value.to_string()
}

fn url_path_head(value: &str) -> Option<String> {
    let path = match value.split_once("://") {
        Some((_, rest)) => rest.split_once('/').map(|(_, path)| path).unwrap_or(""),
        None => value,
    };
    path.split(['/', '?', '#'])
        .find(|segment| !segment.is_empty())
        .map(str::to_string)
}

fn absolutize(base_url: Option<&str>, href: String) -> String {
    match base_url {
        Some(base) if href.starts_with('/') => {
            format!("{}{}", base.trim_end_matches('/'), href)
        }
        _ => href,
    }
}
