use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Record produced by the built-in extractors for one crawled page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageItem {
    pub url: String,
    pub title: Option<String>,
    pub text: String,
    pub links: Vec<String>,

    /// Named fields produced by selector-driven extraction
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extracted_data: BTreeMap<String, Value>,

    pub crawled_at: DateTime<Utc>,
}
