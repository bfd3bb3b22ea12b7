use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Metadata key holding extra request headers as a JSON object of strings
pub const HEADERS_KEY: &str = "headers";

/// A URL waiting to be fetched
///
/// Requests are created by seeding or link discovery and consumed once by a worker.
/// Hooks may rewrite a request before it is fetched; otherwise it is not changed
/// after being enqueued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlRequest {
    pub url: String,

    /// Link distance from the seed (seeds are depth 0)
    pub depth: u32,

    /// Higher values are fetched first
    pub priority: i64,

    /// Open metadata carried with the request, e.g. `{"headers": {...}}`
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl CrawlRequest {
    /// Creates a depth-0, priority-0 request
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            depth: 0,
            priority: 0,
            metadata: HashMap::new(),
        }
    }

    pub fn with_depth(mut self, depth: u32) -> Self {
        self.depth = depth;
        self
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    /// Adds (or replaces) an extra header sent with this request
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_header(name, value);
        self
    }

    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let entry = self
            .metadata
            .entry(HEADERS_KEY.to_string())
            .or_insert_with(|| Value::Object(Map::new()));

        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        if let Value::Object(headers) = entry {
            headers.insert(name.into(), Value::String(value.into()));
        }
    }

    /// Extra headers from `metadata["headers"]`; non-string values are ignored
    pub fn extra_headers(&self) -> Vec<(String, String)> {
        match self.metadata.get(HEADERS_KEY) {
            Some(Value::Object(headers)) => headers
                .iter()
                .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                .collect(),
            _ => Vec::new(),
        }
    }
}
