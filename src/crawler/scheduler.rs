//! Scheduler for managing the crawl frontier
//!
//! This module handles:
//! - Priority queue management for requests to crawl (strict priority, FIFO ties)
//! - URL de-duplication with a bounded, insertion-ordered seen-set
//! - Bounding the number of pending requests
//! - Waking idle workers when work arrives
//! - Exporting and restoring the frontier for checkpoints

use crate::state::CrawlRequest;
use crate::url::dedup_key;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

/// Default number of normalized URLs remembered for de-duplication
pub const DEFAULT_SEEN_CAPACITY: usize = 100_000;

/// A request waiting in the frontier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedRequest {
    /// Higher values are popped first
    pub priority: i64,

    /// Insertion order; breaks priority ties first-in first-out
    pub sequence: u64,

    pub request: CrawlRequest,
}

// BinaryHeap is a max-heap: higher priority first, then lower sequence
impl Ord for QueuedRequest {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

impl PartialOrd for QueuedRequest {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Serializable snapshot of the frontier
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchedulerState {
    /// Normalized URLs in insertion order, oldest first
    pub seen_urls: Vec<String>,

    /// Pending requests in pop order
    pub pending: Vec<QueuedRequest>,
}

#[derive(Debug, Default)]
struct Frontier {
    heap: BinaryHeap<QueuedRequest>,
    seen: HashSet<String>,
    seen_order: VecDeque<String>,
    next_sequence: u64,
}

/// Scheduler manages the frontier queue and URL de-duplication
pub struct Scheduler {
    frontier: Mutex<Frontier>,
    max_queue_size: usize,
    seen_capacity: usize,
    not_empty: Notify,
}

impl Scheduler {
    /// Creates an empty scheduler
    ///
    /// # Arguments
    ///
    /// * `max_queue_size` - Maximum number of pending requests; further adds are rejected
    /// * `seen_capacity` - Maximum number of normalized URLs remembered
    pub fn new(max_queue_size: usize, seen_capacity: usize) -> Self {
        Self {
            frontier: Mutex::new(Frontier::default()),
            max_queue_size,
            seen_capacity: seen_capacity.max(1),
            not_empty: Notify::new(),
        }
    }

    fn frontier(&self) -> MutexGuard<'_, Frontier> {
        self.frontier.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds a request unless its URL was already seen or the queue is full
    ///
    /// # Returns
    ///
    /// * `true` - The request was enqueued
    /// * `false` - Duplicate URL or full queue
    pub fn add(&self, request: CrawlRequest) -> bool {
        let added = {
            let mut frontier = self.frontier();
            self.push(&mut frontier, request)
        };
        if added {
            self.not_empty.notify_waiters();
        }
        added
    }

    /// Adds several requests under one lock acquisition
    ///
    /// Duplicates are rejected against earlier state and within the batch.
    ///
    /// # Returns
    ///
    /// The number of requests enqueued
    pub fn add_many(&self, requests: impl IntoIterator<Item = CrawlRequest>) -> usize {
        let added = {
            let mut frontier = self.frontier();
            let mut count = 0;
            for request in requests {
                if self.push(&mut frontier, request) {
                    count += 1;
                }
            }
            count
        };
        if added > 0 {
            self.not_empty.notify_waiters();
        }
        added
    }

    fn push(&self, frontier: &mut Frontier, request: CrawlRequest) -> bool {
        let key = dedup_key(&request.url);
        if frontier.seen.contains(&key) {
            tracing::trace!("Already seen: {}", request.url);
            return false;
        }

        if frontier.heap.len() >= self.max_queue_size {
            tracing::debug!("Frontier full ({}), dropping {}", self.max_queue_size, request.url);
            return false;
        }

        if frontier.seen.len() >= self.seen_capacity {
            self.evict_seen(frontier);
        }
        frontier.seen.insert(key.clone());
        frontier.seen_order.push_back(key);

        let sequence = frontier.next_sequence;
        frontier.next_sequence += 1;
        frontier.heap.push(QueuedRequest {
            priority: request.priority,
            sequence,
            request,
        });
        true
    }

    /// Drops the oldest 10% of the seen-set
    fn evict_seen(&self, frontier: &mut Frontier) {
        let count = (self.seen_capacity / 10).max(1);
        for _ in 0..count {
            match frontier.seen_order.pop_front() {
                Some(key) => {
                    frontier.seen.remove(&key);
                }
                None => break,
            }
        }
        tracing::trace!("Evicted {} URLs from the seen-set", count);
    }

    /// Pops the highest-priority request, if any
    pub fn get_nowait(&self) -> Option<CrawlRequest> {
        self.frontier().heap.pop().map(|queued| queued.request)
    }

    /// Waits for and pops the highest-priority request
    pub async fn get(&self) -> CrawlRequest {
        loop {
            let notified = self.not_empty.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(request) = self.get_nowait() {
                return request;
            }
            notified.await;
        }
    }

    /// Returns once the frontier holds at least one request
    pub async fn wait_not_empty(&self) {
        loop {
            let notified = self.not_empty.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if !self.is_empty() {
                return;
            }
            notified.await;
        }
    }

    /// Number of pending requests
    pub fn size(&self) -> usize {
        self.frontier().heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frontier().heap.is_empty()
    }

    /// Number of URLs currently remembered as seen
    pub fn seen_count(&self) -> usize {
        self.frontier().seen.len()
    }

    /// Snapshot of the seen-set and the pending queue
    pub fn get_state(&self) -> SchedulerState {
        let frontier = self.frontier();
        let mut pending = frontier.heap.clone().into_sorted_vec();
        pending.reverse();

        SchedulerState {
            seen_urls: frontier.seen_order.iter().cloned().collect(),
            pending,
        }
    }

    /// Replaces the frontier with a snapshot
    ///
    /// The sequence counter restarts above the largest restored sequence so new
    /// requests sort after restored ones of equal priority.
    pub fn restore_state(&self, state: SchedulerState) {
        {
            let mut frontier = self.frontier();

            let skip = state.seen_urls.len().saturating_sub(self.seen_capacity);
            let mut seen = HashSet::new();
            let mut seen_order = VecDeque::new();
            for key in state.seen_urls.into_iter().skip(skip) {
                if seen.insert(key.clone()) {
                    seen_order.push_back(key);
                }
            }

            let next_sequence = state
                .pending
                .iter()
                .map(|queued| queued.sequence + 1)
                .max()
                .unwrap_or(0)
                .max(frontier.next_sequence);

            frontier.seen = seen;
            frontier.seen_order = seen_order;
            frontier.heap = state.pending.into_iter().collect();
            frontier.next_sequence = next_sequence;

            tracing::debug!(
                "Restored frontier: {} pending, {} seen",
                frontier.heap.len(),
                frontier.seen.len()
            );
        }
        self.not_empty.notify_waiters();
    }
}
