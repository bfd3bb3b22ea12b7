//! Robots.txt handling module
//!
//! This module provides functionality for fetching, parsing, and caching robots.txt files.
//! Missing files, non-200 responses and fetch failures are treated as "allow all".

mod cache;
mod parser;

pub use cache::{CachedRobots, RobotsCache, DEFAULT_ROBOTS_CAPACITY};
pub use parser::RobotsRules;
