//! Crawler coordinator - main crawl orchestration logic
//!
//! This module contains the worker pool that coordinates all aspects of
//! the crawling process, including:
//! - Authenticating the HTTP session and seeding or restoring the frontier
//! - Claiming page-budget slots and fetching pages
//! - Running hooks, extracting records and following links
//! - Streaming records to the caller and the sink
//! - Checkpointing, shutdown and final statistics

use crate::auth::{Authenticator, NoopAuthenticator};
use crate::config::{validate, Config};
use crate::crawler::backend::{build_http_client, FetchBackend, HttpBackend, HttpSession};
use crate::crawler::checkpoint::Checkpoint;
use crate::crawler::extractor::Extractor;
use crate::crawler::fetcher::Fetcher;
use crate::crawler::hooks::{Hook, HookAction, HookChain};
use crate::crawler::parser::extract_links;
use crate::crawler::rate_limiter::RateLimiter;
use crate::crawler::scheduler::Scheduler;
use crate::output::{CrawlStats, Sink};
use crate::robots::RobotsCache;
use crate::state::{CrawlPhase, CrawlRequest, CrawlResponse, CrawlState, SlotClaim};
use crate::storage::{open_cache, ResponseCache};
use crate::url::domain_of;
use crate::{ErganeError, Result};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use url::Url;

/// Pages between progress log lines
const PROGRESS_INTERVAL: usize = 10;

/// Requests a running crawl to stop
///
/// Cloneable and usable before the crawl starts. The crawl moves to
/// `Draining`, workers stop taking new pages and in-flight fetches stop
/// retrying. Unless the budget was met or the frontier drained, the crawl
/// ends with its checkpoint preserved.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn shutdown(&self) {
        if !self.tx.send_replace(true) {
            tracing::info!("Shutdown requested");
        }
    }

    pub fn is_shutdown(&self) -> bool {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

/// Final result of a crawl run
#[derive(Debug, Clone)]
pub struct CrawlReport {
    pub stats: CrawlStats,

    /// True when the page budget was met or the frontier drained; false when
    /// a shutdown stopped the crawl with work left
    pub completed: bool,
}

/// Everything `Crawler::run` collected
#[derive(Debug, Clone)]
pub struct CrawlOutcome<T> {
    pub items: Vec<T>,
    pub report: CrawlReport,
}

/// State shared between the workers and the caller's handle
struct CrawlCore<T> {
    scheduler: Scheduler,
    state: CrawlState,
    sink: Option<Arc<dyn Sink<T>>>,
    checkpoint_path: Option<PathBuf>,
    config_hash: Option<String>,
}

impl<T: Send + 'static> CrawlCore<T> {
    /// Flushes the sink and snapshots the frontier and counters
    ///
    /// The snapshot is written when a checkpoint path is configured.
    async fn checkpoint(&self) -> Result<Checkpoint> {
        let batch_number = match &self.sink {
            Some(sink) => {
                sink.flush().await?;
                sink.batch_number()
            }
            None => 0,
        };

        let checkpoint = Checkpoint::new(
            self.state.pages_crawled(),
            self.scheduler.get_state(),
            batch_number,
            self.config_hash.clone(),
        );

        if let Some(path) = &self.checkpoint_path {
            checkpoint.save(path)?;
        }
        Ok(checkpoint)
    }
}

/// What every worker needs
struct Shared<E: Extractor> {
    core: Arc<CrawlCore<E::Item>>,
    fetcher: Fetcher,
    extractor: Arc<E>,
    hooks: HookChain,
    allowed_domains: HashSet<String>,
    same_domain: bool,
    max_depth: u32,
    checkpoint_interval: usize,
    shutdown: ShutdownHandle,
}

/// A configured crawl, ready to start
pub struct Crawler<E: Extractor> {
    config: Config,
    config_hash: Option<String>,
    extractor: Arc<E>,
    session: HttpSession,
    fetcher: Fetcher,
    sink: Option<Arc<dyn Sink<E::Item>>>,
    hooks: HookChain,
    authenticator: Arc<dyn Authenticator>,
    resume: Option<Checkpoint>,
    shutdown: ShutdownHandle,
}

impl<E: Extractor> Crawler<E> {
    /// Validates `config` and builds the HTTP stack
    ///
    /// No network activity happens here; invalid configurations fail before
    /// anything is fetched.
    ///
    /// # Errors
    ///
    /// * `ErganeError::Config` - The configuration is invalid
    /// * `ErganeError::Reqwest` - The HTTP client could not be built (e.g. bad proxy)
    /// * `ErganeError::Cache` - The response cache could not be opened
    pub fn new(config: Config, extractor: E) -> Result<Self> {
        validate(&config)?;

        let session = build_http_client(&config.crawler, &config.user_agent)?;
        let shutdown = ShutdownHandle::new();

        let robots = RobotsCache::new(
            session.client.clone(),
            config.user_agent.crawler_name.clone(),
            config.crawler.respect_robots_txt,
            config.crawler.robots_cache_capacity,
        );
        let fetcher = Fetcher::new(
            Arc::new(HttpBackend::new(session.client.clone())),
            RateLimiter::from_config(&config.crawler),
            robots,
        )
        .with_cache(open_cache(&config.cache)?)
        .with_retries(config.crawler.max_retries, config.crawler.retry_base_delay())
        .with_shutdown(shutdown.subscribe());

        Ok(Self {
            config,
            config_hash: None,
            extractor: Arc::new(extractor),
            session,
            fetcher,
            sink: None,
            hooks: HookChain::new(),
            authenticator: Arc::new(NoopAuthenticator),
            resume: None,
            shutdown,
        })
    }

    pub fn with_sink(mut self, sink: Arc<dyn Sink<E::Item>>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Appends a hook; hooks run in the order they were added
    pub fn with_hook(mut self, hook: Arc<dyn Hook>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn with_authenticator(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.authenticator = authenticator;
        self
    }

    /// Replaces the network retrieval step; robots, rate limits, retries
    /// and caching still apply
    pub fn with_backend(mut self, backend: Arc<dyn FetchBackend>) -> Self {
        self.fetcher.set_backend(backend);
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn ResponseCache>) -> Self {
        self.fetcher.set_cache(Some(cache));
        self
    }

    /// Hash of the config file, recorded in checkpoints
    pub fn with_config_hash(mut self, hash: impl Into<String>) -> Self {
        self.config_hash = Some(hash.into());
        self
    }

    /// Continues from `checkpoint` instead of seeding
    pub fn resume_from(mut self, checkpoint: Checkpoint) -> Self {
        self.resume = Some(checkpoint);
        self
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Authenticates, seeds (or restores) the frontier and spawns the workers
    ///
    /// # Errors
    ///
    /// Authentication failures abort the crawl before any page is fetched.
    pub async fn start(self) -> Result<CrawlHandle<E::Item>> {
        let Crawler {
            config,
            config_hash,
            extractor,
            session,
            fetcher,
            sink,
            hooks,
            authenticator,
            resume,
            shutdown,
        } = self;

        if let Err(e) = authenticator.ensure_authenticated(&session).await {
            tracing::error!("Authentication failed: {}", e);
            return Err(e.into());
        }

        let crawler_config = &config.crawler;
        let core = Arc::new(CrawlCore {
            scheduler: Scheduler::new(crawler_config.max_queue_size, crawler_config.seen_capacity),
            state: CrawlState::new(crawler_config.max_pages),
            sink,
            checkpoint_path: config.checkpoint.path.clone(),
            config_hash,
        });

        match resume {
            Some(checkpoint) => {
                if let (Some(saved), Some(current)) = (&checkpoint.config_hash, &core.config_hash) {
                    if saved != current {
                        tracing::warn!("Config changed since checkpoint was saved; resuming anyway");
                    }
                }
                tracing::info!(
                    "Resuming crawl: {} pages already crawled, {} pending",
                    checkpoint.pages_crawled,
                    checkpoint.pending_queue.len()
                );
                core.scheduler.restore_state(checkpoint.scheduler_state());
                core.state.restore(checkpoint.pages_crawled);
                if let Some(sink) = &core.sink {
                    sink.resume_at_batch(checkpoint.batch_number);
                }
            }
            None => {
                let added = core
                    .scheduler
                    .add_many(crawler_config.seeds.iter().map(CrawlRequest::new));
                tracing::info!("Seeded frontier with {} URLs", added);
            }
        }

        let allowed_domains: HashSet<String> = crawler_config
            .seeds
            .iter()
            .filter_map(|seed| domain_of(seed))
            .collect();

        let concurrency = crawler_config.concurrency.max(1);
        let (items_tx, items_rx) = mpsc::channel(crawler_config.output_buffer.max(1));

        let shared = Arc::new(Shared {
            core: core.clone(),
            fetcher,
            extractor,
            hooks,
            allowed_domains,
            same_domain: crawler_config.same_domain,
            max_depth: crawler_config.max_depth,
            checkpoint_interval: config.checkpoint.interval,
            shutdown: shutdown.clone(),
        });

        tracing::info!(
            "Starting crawl with {} workers (max {} pages, max depth {})",
            concurrency,
            crawler_config.max_pages,
            crawler_config.max_depth
        );
        core.state.set_phase(CrawlPhase::Running);
        let drain_watch = tokio::spawn(drain_on_shutdown(core.clone(), shutdown.subscribe()));

        let mut workers = JoinSet::new();
        for id in 0..concurrency {
            workers.spawn(worker(id, shared.clone(), items_tx.clone()));
        }
        drop(items_tx);

        let task = tokio::spawn(supervise(shared, workers, drain_watch));

        Ok(CrawlHandle {
            items: items_rx,
            core,
            shutdown,
            task,
        })
    }

    /// Starts the crawl, collects every streamed record and waits for the end
    pub async fn run(self) -> Result<CrawlOutcome<E::Item>> {
        let mut handle = self.start().await?;

        let mut items = Vec::new();
        while let Some(item) = handle.next_item().await {
            items.push(item);
        }

        let report = handle.join().await?;
        Ok(CrawlOutcome { items, report })
    }
}

/// Handle to a running crawl
pub struct CrawlHandle<T> {
    items: mpsc::Receiver<T>,
    core: Arc<CrawlCore<T>>,
    shutdown: ShutdownHandle,
    task: JoinHandle<CrawlReport>,
}

impl<T: Send + 'static> CrawlHandle<T> {
    /// Next record from the live output stream; `None` once the crawl has ended
    /// and every buffered record was received
    pub async fn next_item(&mut self) -> Option<T> {
        self.items.recv().await
    }

    pub fn stats(&self) -> CrawlStats {
        self.core.state.snapshot()
    }

    pub fn phase(&self) -> CrawlPhase {
        self.core.state.phase()
    }

    pub fn shutdown(&self) {
        self.shutdown.shutdown();
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Snapshots the crawl now, writing it to the configured checkpoint path
    pub async fn checkpoint(&self) -> Result<Checkpoint> {
        self.core.checkpoint().await
    }

    /// Waits for the crawl to finish
    ///
    /// Records not yet received from the live stream are discarded (the sink
    /// still has them).
    pub async fn join(self) -> Result<CrawlReport> {
        drop(self.items);
        self.task
            .await
            .map_err(|e| ErganeError::Task(e.to_string()))
    }
}

/// Moves the crawl to `Draining` as soon as shutdown is requested
async fn drain_on_shutdown<T: Send + 'static>(core: Arc<CrawlCore<T>>, mut shutdown: watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_ok() {
        core.state.begin_draining();
    }
}

/// Waits for the workers, then flushes output and settles the checkpoint
///
/// The crawl counts as completed when the budget is met or the frontier is
/// drained with nothing in flight, whether or not shutdown was requested.
async fn supervise<E: Extractor>(
    shared: Arc<Shared<E>>,
    mut workers: JoinSet<()>,
    drain_watch: JoinHandle<()>,
) -> CrawlReport {
    while let Some(joined) = workers.join_next().await {
        if let Err(e) = joined {
            tracing::error!("Worker task failed: {}", e);
        }
    }
    drain_watch.abort();

    let core = &shared.core;
    let completed =
        core.state.budget_met() || core.state.is_drained(|| core.scheduler.is_empty());
    core.state.begin_draining();

    if let Some(sink) = &core.sink {
        if let Err(e) = sink.flush().await {
            tracing::warn!("Failed to flush output: {}", e);
        }
        if let Err(e) = sink.consolidate().await {
            tracing::warn!("Failed to consolidate output: {}", e);
        }
    }

    if let Some(path) = &core.checkpoint_path {
        if completed {
            if let Err(e) = Checkpoint::delete(path) {
                tracing::warn!("Failed to remove checkpoint {}: {}", path.display(), e);
            }
        } else if let Err(e) = core.checkpoint().await {
            tracing::warn!("Failed to save checkpoint on shutdown: {}", e);
        } else {
            tracing::info!("Checkpoint saved to {}", path.display());
        }
    }

    core.state.set_phase(CrawlPhase::Stopped);
    let stats = core.state.snapshot();
    tracing::info!(
        "Crawl {}: {} pages crawled, {} items, {} errors in {:.1}s",
        if completed { "completed" } else { "stopped" },
        stats.pages_crawled,
        stats.items_extracted,
        stats.errors,
        stats.elapsed_secs
    );

    CrawlReport { stats, completed }
}

/// One worker: claim a budget slot, take a request, process it, repeat
async fn worker<E: Extractor>(id: usize, shared: Arc<Shared<E>>, items: mpsc::Sender<E::Item>) {
    let state = &shared.core.state;
    let scheduler = &shared.core.scheduler;
    let mut shutdown = shared.shutdown.subscribe();

    loop {
        if *shutdown.borrow() {
            tracing::debug!("Worker {} stopping on shutdown", id);
            state.begin_draining();
            break;
        }

        let progress = state.progress_notified();
        tokio::pin!(progress);
        progress.as_mut().enable();

        match state.claim_slot() {
            SlotClaim::Exhausted => {
                tracing::debug!("Worker {} done: page budget reached", id);
                state.begin_draining();
                break;
            }
            SlotClaim::Busy => {
                tokio::select! {
                    _ = &mut progress => {}
                    _ = shutdown.changed() => {}
                }
                continue;
            }
            SlotClaim::Granted => {}
        }

        let Some(request) = scheduler.get_nowait() else {
            state.release_slot(false);

            if state.is_drained(|| scheduler.is_empty()) {
                tracing::debug!("Worker {} done: frontier drained", id);
                state.begin_draining();
                state.wake_all();
                break;
            }

            tokio::select! {
                _ = scheduler.wait_not_empty() => {}
                _ = &mut progress => {}
                _ = shutdown.changed() => {}
            }
            continue;
        };

        shared.process(request, &items, &mut shutdown).await;
    }
}

impl<E: Extractor> Shared<E> {
    async fn process(
        &self,
        request: CrawlRequest,
        items: &mpsc::Sender<E::Item>,
        shutdown: &mut watch::Receiver<bool>,
    ) {
        let state = &self.core.state;

        let request = match self.hooks.on_request(request).await {
            HookAction::Continue(request) => request,
            HookAction::Veto => {
                tracing::debug!("Request vetoed by hook");
                state.release_slot(true);
                return;
            }
        };

        let depth = request.depth;
        let response = self.fetcher.fetch(request).await;
        let crawled = state.record_page(response.is_error(), response.from_cache);

        if crawled % PROGRESS_INTERVAL == 0 {
            let stats = state.snapshot();
            tracing::info!(
                "Progress: {} pages crawled, {} in frontier, {:.2} pages/sec",
                stats.pages_crawled,
                self.core.scheduler.size(),
                stats.pages_per_sec
            );
        }

        match self.hooks.on_response(response).await {
            HookAction::Continue(response) => {
                self.handle_response(response, depth, items, shutdown).await
            }
            HookAction::Veto => tracing::debug!("Response vetoed by hook"),
        }

        if self.core.checkpoint_path.is_some() && state.checkpoint_due(self.checkpoint_interval) {
            if let Err(e) = self.core.checkpoint().await {
                tracing::warn!("Failed to save checkpoint: {}", e);
            }
        }

        state.finish_page();
    }

    async fn handle_response(
        &self,
        response: CrawlResponse,
        depth: u32,
        items: &mpsc::Sender<E::Item>,
        shutdown: &mut watch::Receiver<bool>,
    ) {
        if !response.is_success() || response.content.is_empty() {
            return;
        }

        let links = match self.extractor.extract(&response) {
            Ok(extraction) => {
                if let Some(item) = extraction.item {
                    self.emit(item, items, shutdown).await;
                }
                extraction.links
            }
            Err(e) => {
                tracing::warn!("Extraction failed for {}: {}", response.url, e);
                Url::parse(&response.url)
                    .map(|base| extract_links(&response.content, &base))
                    .unwrap_or_default()
            }
        };

        if depth >= self.max_depth {
            return;
        }

        let next_depth = depth + 1;
        let found = links.len();
        let added = self.core.scheduler.add_many(
            links
                .into_iter()
                .filter(|link| self.in_scope(link))
                .map(|link| {
                    CrawlRequest::new(link)
                        .with_depth(next_depth)
                        .with_priority(-i64::from(next_depth))
                }),
        );
        tracing::debug!("Queued {} of {} links from {}", added, found, response.url);
    }

    /// Sends a record to the sink and the live stream
    ///
    /// The stream is bounded: a full buffer blocks this worker until the
    /// consumer catches up, or drops the stream copy if shutdown is requested.
    async fn emit(&self, item: E::Item, items: &mpsc::Sender<E::Item>, shutdown: &mut watch::Receiver<bool>) {
        if let Some(sink) = &self.core.sink {
            if let Err(e) = sink.add(item.clone()).await {
                tracing::warn!("Failed to write record to sink: {}", e);
            }
        }

        tokio::select! {
            sent = items.send(item) => {
                if sent.is_err() {
                    tracing::trace!("Output stream closed; record kept in sink only");
                }
            }
            _ = shutdown.wait_for(|stop| *stop) => {
                tracing::debug!("Shutdown while output stream full; record kept in sink only");
            }
        }

        self.core.state.record_item();
    }

    /// Same-domain scoping against the seed hosts
    fn in_scope(&self, link: &str) -> bool {
        if !self.same_domain {
            return true;
        }
        domain_of(link).is_some_and(|domain| self.allowed_domains.contains(&domain))
    }
}
