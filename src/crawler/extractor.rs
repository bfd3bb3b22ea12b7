//! Turning fetched pages into records and outbound links
//!
//! Extractors run synchronously on a worker after a successful fetch. They
//! must not fail on malformed markup; an `Err` is reserved for problems such
//! as a schema mismatch, in which case the page still counts as crawled and
//! its links are still followed.

use crate::crawler::parser::parse_html;
use crate::state::{CrawlResponse, PageItem};
use chrono::Utc;
use scraper::{Html, Selector};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Invalid selector for field '{field}': {reason}")]
    InvalidSelector { field: String, reason: String },

    #[error("Extraction failed: {0}")]
    Failed(String),
}

/// What an extractor found on one page
#[derive(Debug, Clone)]
pub struct Extraction<T> {
    /// The record to emit, if the page produced one
    pub item: Option<T>,

    /// Absolute URLs to consider for the frontier
    pub links: Vec<String>,
}

impl<T> Extraction<T> {
    pub fn new(item: Option<T>, links: Vec<String>) -> Self {
        Self { item, links }
    }

    /// No record, only links
    pub fn links_only(links: Vec<String>) -> Self {
        Self { item: None, links }
    }
}

/// Derives a record and outbound links from a response
pub trait Extractor: Send + Sync + 'static {
    type Item: Serialize + Clone + Send + Sync + 'static;

    fn extract(&self, response: &CrawlResponse) -> Result<Extraction<Self::Item>, ExtractError>;
}

/// Base URL for resolving links: the final URL, else the requested one
fn base_url(response: &CrawlResponse) -> Result<Url, ExtractError> {
    Url::parse(&response.url)
        .or_else(|_| Url::parse(&response.request.url))
        .map_err(|e| ExtractError::Failed(format!("unusable page URL {}: {}", response.url, e)))
}

/// Default extractor: title, visible text and links of an HTML page
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlExtractor;

impl HtmlExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Extractor for HtmlExtractor {
    type Item = PageItem;

    fn extract(&self, response: &CrawlResponse) -> Result<Extraction<PageItem>, ExtractError> {
        let base = base_url(response)?;
        let parsed = parse_html(&response.content, &base);

        let item = PageItem {
            url: response.url.clone(),
            title: parsed.title,
            text: parsed.text,
            links: parsed.links.clone(),
            extracted_data: BTreeMap::new(),
            crawled_at: Utc::now(),
        };

        Ok(Extraction::new(Some(item), parsed.links))
    }
}

#[derive(Debug)]
struct FieldRule {
    name: String,
    selector: Selector,
    attr: Option<String>,
}

/// Schema-driven extractor mapping field names to CSS selectors
///
/// A rule is either `selector` (text of the first match, whitespace collapsed)
/// or `selector@attr` (attribute of the first match). Fields without a match
/// are recorded as `null`.
#[derive(Debug)]
pub struct SelectorExtractor {
    fields: Vec<FieldRule>,
}

impl SelectorExtractor {
    /// Compiles all selectors up front
    ///
    /// # Errors
    ///
    /// Returns `ExtractError::InvalidSelector` for the first rule that does not parse.
    pub fn new<I, K, V>(rules: I) -> Result<Self, ExtractError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: AsRef<str>,
    {
        let mut fields = Vec::new();

        for (name, rule) in rules {
            let name = name.into();
            let rule = rule.as_ref();

            let (css, attr) = match rule.rsplit_once('@') {
                Some((css, attr)) if !attr.is_empty() && !attr.contains(|c: char| c.is_whitespace() || c == ']') => {
                    (css, Some(attr.to_string()))
                }
                _ => (rule, None),
            };

            let selector = Selector::parse(css.trim()).map_err(|e| ExtractError::InvalidSelector {
                field: name.clone(),
                reason: e.to_string(),
            })?;

            fields.push(FieldRule {
                name,
                selector,
                attr,
            });
        }

        Ok(Self { fields })
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    fn extract_fields(&self, html: &str) -> BTreeMap<String, Value> {
        let document = Html::parse_document(html);

        self.fields
            .iter()
            .map(|field| {
                let value = document
                    .select(&field.selector)
                    .next()
                    .and_then(|element| match &field.attr {
                        Some(attr) => element.value().attr(attr).map(|v| v.trim().to_string()),
                        None => Some(
                            element
                                .text()
                                .collect::<String>()
                                .split_whitespace()
                                .collect::<Vec<_>>()
                                .join(" "),
                        ),
                    })
                    .map_or(Value::Null, Value::String);

                (field.name.clone(), value)
            })
            .collect()
    }
}

impl Extractor for SelectorExtractor {
    type Item = PageItem;

    fn extract(&self, response: &CrawlResponse) -> Result<Extraction<PageItem>, ExtractError> {
        let base = base_url(response)?;
        let parsed = parse_html(&response.content, &base);

        let item = PageItem {
            url: response.url.clone(),
            title: parsed.title,
            text: parsed.text,
            links: parsed.links.clone(),
            extracted_data: self.extract_fields(&response.content),
            crawled_at: Utc::now(),
        };

        Ok(Extraction::new(Some(item), parsed.links))
    }
}
