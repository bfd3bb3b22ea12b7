use crate::output::CrawlStats;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::futures::Notified;
use tokio::sync::Notify;
use tokio::time::Instant;

/// Lifecycle of one crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrawlPhase {
    NotStarted,
    Running,
    /// Workers are finishing; no new pages are started
    Draining,
    Stopped,
}

/// Result of trying to reserve a slot in the page budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotClaim {
    /// A slot was reserved; the caller must commit or release it
    Granted,
    /// The budget is fully reserved by in-flight pages that may still release
    Busy,
    /// `pages_crawled` reached the budget
    Exhausted,
}

#[derive(Debug, Default)]
struct Counters {
    pages_crawled: usize,
    items_extracted: usize,
    errors: usize,
    cache_hits: usize,
    in_flight: usize,
    last_checkpoint_at: usize,
    started_at: Option<Instant>,
    finished_at: Option<Instant>,
}

/// Crawl-wide counters shared by every worker
///
/// All counters and the in-flight count live under one mutex so the budget
/// check and the in-flight increment happen as a single step.
#[derive(Debug)]
pub struct CrawlState {
    max_pages: usize,
    counters: Mutex<Counters>,
    phase: Mutex<CrawlPhase>,
    progress: Notify,
}

impl CrawlState {
    pub fn new(max_pages: usize) -> Self {
        Self {
            max_pages,
            counters: Mutex::new(Counters::default()),
            phase: Mutex::new(CrawlPhase::NotStarted),
            progress: Notify::new(),
        }
    }

    fn counters(&self) -> MutexGuard<'_, Counters> {
        self.counters.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn max_pages(&self) -> usize {
        self.max_pages
    }

    pub fn phase(&self) -> CrawlPhase {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_phase(&self, phase: CrawlPhase) {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner) = phase;
        if phase == CrawlPhase::Running {
            let mut counters = self.counters();
            counters.started_at.get_or_insert_with(Instant::now);
        } else if phase == CrawlPhase::Stopped {
            self.counters().finished_at = Some(Instant::now());
        }
        self.progress.notify_waiters();
    }

    /// Moves a running crawl to `Draining`; other phases are left alone
    pub fn begin_draining(&self) {
        {
            let mut phase = self.phase.lock().unwrap_or_else(PoisonError::into_inner);
            if *phase != CrawlPhase::Running {
                return;
            }
            *phase = CrawlPhase::Draining;
        }
        self.progress.notify_waiters();
    }

    /// Restores counters from a checkpoint before the crawl starts
    pub fn restore(&self, pages_crawled: usize) {
        let mut counters = self.counters();
        counters.pages_crawled = pages_crawled;
        counters.last_checkpoint_at = pages_crawled;
    }

    /// Reserves one page of the budget
    pub fn claim_slot(&self) -> SlotClaim {
        let mut counters = self.counters();
        if counters.pages_crawled >= self.max_pages {
            SlotClaim::Exhausted
        } else if counters.pages_crawled + counters.in_flight >= self.max_pages {
            SlotClaim::Busy
        } else {
            counters.in_flight += 1;
            SlotClaim::Granted
        }
    }

    /// Gives back a slot without counting a page
    ///
    /// `wake` should be set when the slot frees budget another worker may be
    /// waiting for (a vetoed request); an idle worker that found no work
    /// releases quietly.
    pub fn release_slot(&self, wake: bool) {
        {
            let mut counters = self.counters();
            counters.in_flight = counters.in_flight.saturating_sub(1);
        }
        if wake {
            self.progress.notify_waiters();
        }
    }

    /// Counts a fetched page; the slot stays in flight until `finish_page`
    pub fn record_page(&self, is_error: bool, from_cache: bool) -> usize {
        let mut counters = self.counters();
        counters.pages_crawled += 1;
        if is_error {
            counters.errors += 1;
        }
        if from_cache {
            counters.cache_hits += 1;
        }
        counters.pages_crawled
    }

    pub fn record_item(&self) {
        self.counters().items_extracted += 1;
    }

    /// Ends the in-flight part of a page and wakes idle workers
    pub fn finish_page(&self) {
        {
            let mut counters = self.counters();
            counters.in_flight = counters.in_flight.saturating_sub(1);
        }
        self.progress.notify_waiters();
    }

    /// Wakes every waiter, e.g. when a worker decides the crawl is over
    pub fn wake_all(&self) {
        self.progress.notify_waiters();
    }

    pub fn budget_met(&self) -> bool {
        self.counters().pages_crawled >= self.max_pages
    }

    pub fn in_flight(&self) -> usize {
        self.counters().in_flight
    }

    /// True when nothing is in flight and `frontier_empty` reports no work
    ///
    /// Evaluated under the counter lock so no worker can claim a slot between
    /// the two checks.
    pub fn is_drained(&self, frontier_empty: impl FnOnce() -> bool) -> bool {
        let counters = self.counters();
        counters.in_flight == 0 && frontier_empty()
    }

    /// Returns true (once) each time another `interval` pages were crawled
    pub fn checkpoint_due(&self, interval: usize) -> bool {
        if interval == 0 {
            return false;
        }
        let mut counters = self.counters();
        if counters.pages_crawled >= counters.last_checkpoint_at + interval {
            counters.last_checkpoint_at = counters.pages_crawled;
            true
        } else {
            false
        }
    }

    pub fn pages_crawled(&self) -> usize {
        self.counters().pages_crawled
    }

    /// Future resolved at the next progress notification
    ///
    /// Callers should `enable()` it before re-checking their condition so a
    /// notification fired in between is not lost.
    pub fn progress_notified(&self) -> Notified<'_> {
        self.progress.notified()
    }

    pub fn snapshot(&self) -> CrawlStats {
        let counters = self.counters();
        let elapsed = match (counters.started_at, counters.finished_at) {
            (Some(start), Some(end)) => end.saturating_duration_since(start),
            (Some(start), None) => start.elapsed(),
            _ => Default::default(),
        };
        let elapsed_secs = elapsed.as_secs_f64();
        let pages_per_sec = if elapsed_secs > 0.0 {
            counters.pages_crawled as f64 / elapsed_secs
        } else {
            0.0
        };

        CrawlStats {
            pages_crawled: counters.pages_crawled,
            items_extracted: counters.items_extracted,
            errors: counters.errors,
            cache_hits: counters.cache_hits,
            elapsed_secs,
            pages_per_sec,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_claim_until_exhausted() {
        let state = CrawlState::new(2);

        assert_eq!(state.claim_slot(), SlotClaim::Granted);
        assert_eq!(state.claim_slot(), SlotClaim::Granted);
        assert_eq!(state.claim_slot(), SlotClaim::Busy);

        state.record_page(false, false);
        state.finish_page();
        assert_eq!(state.claim_slot(), SlotClaim::Busy);

        state.record_page(false, false);
        state.finish_page();
        assert_eq!(state.claim_slot(), SlotClaim::Exhausted);
        assert!(state.budget_met());
    }

    #[test]
    fn test_release_returns_budget() {
        let state = CrawlState::new(1);
        assert_eq!(state.claim_slot(), SlotClaim::Granted);
        assert_eq!(state.claim_slot(), SlotClaim::Busy);

        state.release_slot(true);
        assert_eq!(state.in_flight(), 0);
        assert_eq!(state.pages_crawled(), 0);
        assert_eq!(state.claim_slot(), SlotClaim::Granted);
    }

    #[test]
    fn test_concurrent_claims_never_overshoot() {
        let state = Arc::new(CrawlState::new(7));
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let state = state.clone();
                std::thread::spawn(move || {
                    let mut granted = 0;
                    for _ in 0..10 {
                        if state.claim_slot() == SlotClaim::Granted {
                            state.record_page(false, false);
                            state.finish_page();
                            granted += 1;
                        }
                    }
                    granted
                })
            })
            .collect();

        let total: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(total, 7);
        assert_eq!(state.pages_crawled(), 7);
    }

    #[test]
    fn test_counters_and_snapshot() {
        let state = CrawlState::new(10);
        state.set_phase(CrawlPhase::Running);
        state.claim_slot();
        state.record_page(true, false);
        state.record_item();
        state.finish_page();
        state.claim_slot();
        state.record_page(false, true);
        state.finish_page();

        let stats = state.snapshot();
        assert_eq!(stats.pages_crawled, 2);
        assert_eq!(stats.errors, 1);
        assert_eq!(stats.cache_hits, 1);
        assert_eq!(stats.items_extracted, 1);
        assert_eq!(state.phase(), CrawlPhase::Running);
    }

    #[test]
    fn test_checkpoint_due() {
        let state = CrawlState::new(100);
        state.restore(3);
        assert!(!state.checkpoint_due(2));

        state.record_page(false, false);
        assert!(!state.checkpoint_due(2));
        state.record_page(false, false);
        assert!(state.checkpoint_due(2));
        assert!(!state.checkpoint_due(2));
        assert!(!state.checkpoint_due(0));
    }

    #[test]
    fn test_phase_transitions() {
        let state = CrawlState::new(10);
        state.begin_draining();
        assert_eq!(state.phase(), CrawlPhase::NotStarted);

        state.set_phase(CrawlPhase::Running);
        state.begin_draining();
        assert_eq!(state.phase(), CrawlPhase::Draining);

        state.set_phase(CrawlPhase::Stopped);
        state.begin_draining();
        assert_eq!(state.phase(), CrawlPhase::Stopped);
    }

    #[test]
    fn test_is_drained() {
        let state = CrawlState::new(10);
        assert!(state.is_drained(|| true));
        assert!(!state.is_drained(|| false));

        state.claim_slot();
        assert!(!state.is_drained(|| true));
    }
}
