//! URL handling module for Ergane
//!
//! This module provides de-duplication keys, domain keys and robots.txt origins.

mod domain;
mod normalize;

// Re-export main functions
pub use domain::{domain_of, extract_domain, origin_of, robots_url};
pub use normalize::{dedup_key, normalize_url};
