//! Bounded robots.txt cache
//!
//! Parsed rules are cached per origin. When the cache is full the single
//! oldest insertion is evicted, and entries older than 24 hours are refetched.

use crate::robots::RobotsRules;
use crate::url::{origin_of, robots_url};
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use url::Url;

/// Default number of origins kept in the cache
pub const DEFAULT_ROBOTS_CAPACITY: usize = 1_000;

/// Cached robots.txt rules for an origin
#[derive(Debug, Clone)]
pub struct CachedRobots {
    pub rules: RobotsRules,

    /// When the robots.txt was fetched
    pub fetched_at: DateTime<Utc>,
}

impl CachedRobots {
    pub fn new(rules: RobotsRules) -> Self {
        Self {
            rules,
            fetched_at: Utc::now(),
        }
    }

    /// Older than 24 hours
    pub fn is_stale(&self) -> bool {
        self.age() > Duration::hours(24)
    }

    pub fn age(&self) -> Duration {
        Utc::now() - self.fetched_at
    }
}

#[derive(Debug, Default)]
struct Entries {
    map: HashMap<String, CachedRobots>,
    /// Origins in insertion order, oldest first
    order: VecDeque<String>,
}

/// Robots.txt policy with a bounded per-origin cache
#[derive(Debug)]
pub struct RobotsCache {
    client: Client,
    agent: String,
    enabled: bool,
    capacity: usize,
    entries: Mutex<Entries>,
}

impl RobotsCache {
    /// Creates a cache that fetches with `client` and matches rules for `agent`
    pub fn new(client: Client, agent: impl Into<String>, enabled: bool, capacity: usize) -> Self {
        Self {
            client,
            agent: agent.into(),
            enabled,
            capacity: capacity.max(1),
            entries: Mutex::new(Entries::default()),
        }
    }

    fn entries(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn len(&self) -> usize {
        self.entries().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `origin` currently has a cache entry
    pub fn contains(&self, origin: &str) -> bool {
        self.entries().map.contains_key(origin)
    }

    /// Checks if the crawler may fetch `url`
    ///
    /// Always true when robots.txt enforcement is disabled. Unparsable URLs
    /// are allowed; the fetch itself will report the problem.
    pub async fn can_fetch(&self, url: &str) -> bool {
        if !self.enabled {
            return true;
        }

        let Ok(parsed) = Url::parse(url) else {
            return true;
        };
        let Some(origin) = origin_of(&parsed) else {
            return true;
        };

        let rules = match self.cached(&origin) {
            Some(rules) => rules,
            None => {
                let rules = self.fetch_rules(&parsed).await;
                self.insert(origin, rules.clone());
                rules
            }
        };

        let allowed = rules.is_allowed(url, &self.agent);
        if !allowed {
            tracing::debug!("Disallowed by robots.txt: {}", url);
        }
        allowed
    }

    fn cached(&self, origin: &str) -> Option<RobotsRules> {
        self.entries()
            .map
            .get(origin)
            .filter(|entry| !entry.is_stale())
            .map(|entry| entry.rules.clone())
    }

    /// Inserts rules for `origin`, evicting the oldest origin when full
    pub fn insert(&self, origin: String, rules: RobotsRules) {
        let mut entries = self.entries();

        if entries.map.contains_key(&origin) {
            entries.order.retain(|o| o != &origin);
        } else if entries.map.len() >= self.capacity {
            if let Some(oldest) = entries.order.pop_front() {
                tracing::trace!("Evicting robots.txt for {}", oldest);
                entries.map.remove(&oldest);
            }
        }

        entries.order.push_back(origin.clone());
        entries.map.insert(origin, CachedRobots::new(rules));
    }

    async fn fetch_rules(&self, url: &Url) -> RobotsRules {
        let Some(robots_url) = robots_url(url) else {
            return RobotsRules::allow_all();
        };

        match self.client.get(&robots_url).send().await {
            Ok(response) if response.status().is_success() => match response.text().await {
                Ok(body) => {
                    tracing::debug!("Fetched {}", robots_url);
                    RobotsRules::from_content(&body)
                }
                Err(e) => {
                    tracing::warn!("Failed to read {}: {}", robots_url, e);
                    RobotsRules::allow_all()
                }
            },
            Ok(response) => {
                tracing::debug!(
                    "{} returned {}, allowing all",
                    robots_url,
                    response.status()
                );
                RobotsRules::allow_all()
            }
            Err(e) => {
                tracing::warn!("Failed to fetch {}: {}", robots_url, e);
                RobotsRules::allow_all()
            }
        }
    }
}
