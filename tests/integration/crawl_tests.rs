//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock HTTP servers and test
//! the full crawl cycle end-to-end.

use async_trait::async_trait;
use ergane::auth::CookieAuthenticator;
use ergane::config::Config;
use ergane::crawler::{Checkpoint, Hook, HookAction, HtmlExtractor};
use ergane::output::JsonlSink;
use ergane::storage::{ResponseCache, SqliteCache};
use ergane::{CrawlResponse, Crawler, ErganeError, PageItem};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Builds an HTML page linking to `links`
fn html_page(title: &str, links: &[&str]) -> String {
    let anchors: String = links
        .iter()
        .map(|link| format!(r#"<a href="{}">{}</a>"#, link, link))
        .collect();
    format!(
        "<html><head><title>{}</title></head><body><p>{}</p>{}</body></html>",
        title, title, anchors
    )
}

async fn mount_page(server: &MockServer, route: &str, links: &[&str]) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html")
                .set_body_string(html_page(route, links)),
        )
        .mount(server)
        .await;
}

/// Creates a test configuration seeded at `seed`, writing into `dir`
fn create_test_config(seed: String, dir: &Path) -> Config {
    let mut config = Config::default();
    config.crawler.seeds = vec![seed];
    config.crawler.max_pages = 10;
    config.crawler.max_depth = 2;
    config.crawler.concurrency = 4;
    config.crawler.rate_limit = 500.0;
    config.crawler.timeout = 5.0;
    config.crawler.max_retries = 0;
    config.crawler.retry_base_delay = 0.01;
    config.crawler.respect_robots_txt = false;
    config.user_agent.crawler_name = "TestBot".to_string();
    config.output.path = dir.join("output.jsonl");
    config.output.batch_size = 2;
    config
}

fn read_jsonl(path: &Path) -> Vec<serde_json::Value> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

/// Number of requests the server saw per path
async fn hits_by_path(server: &MockServer) -> HashMap<String, usize> {
    let mut hits = HashMap::new();
    for request in server.received_requests().await.unwrap_or_default() {
        *hits.entry(request.url.path().to_string()).or_insert(0) += 1;
    }
    hits
}

#[tokio::test]
async fn test_four_page_graph() {
    let server = MockServer::start().await;
    mount_page(&server, "/a", &["/b", "/c"]).await;
    mount_page(&server, "/b", &["/d"]).await;
    mount_page(&server, "/c", &[]).await;
    mount_page(&server, "/d", &[]).await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(format!("{}/a", server.uri()), dir.path());
    let output = config.output.path.clone();
    let sink = JsonlSink::<PageItem>::create(&output, config.output.batch_size).unwrap();

    let outcome = Crawler::new(config, HtmlExtractor::new())
        .unwrap()
        .with_sink(Arc::new(sink))
        .run()
        .await
        .unwrap();

    assert!(outcome.report.completed);
    assert_eq!(outcome.report.stats.pages_crawled, 4);
    assert_eq!(outcome.report.stats.items_extracted, 4);
    assert_eq!(outcome.report.stats.errors, 0);
    assert_eq!(outcome.items.len(), 4);

    let mut urls: Vec<String> = read_jsonl(&output)
        .iter()
        .map(|record| record["url"].as_str().unwrap().to_string())
        .collect();
    urls.sort();
    let expected: Vec<String> = ["/a", "/b", "/c", "/d"]
        .iter()
        .map(|p| format!("{}{}", server.uri(), p))
        .collect();
    assert_eq!(urls, expected);

    // Batches are merged away
    assert!(!dir.path().join("output_000000.jsonl").exists());

    let record = read_jsonl(&output)
        .into_iter()
        .find(|r| r["url"].as_str().unwrap().ends_with("/a"))
        .unwrap();
    assert_eq!(record["title"], "/a");
    assert_eq!(record["links"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_not_found_counts_one_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(format!("{}/missing", server.uri()), dir.path());

    let outcome = Crawler::new(config, HtmlExtractor::new())
        .unwrap()
        .run()
        .await
        .unwrap();

    assert!(outcome.report.completed);
    assert_eq!(outcome.report.stats.pages_crawled, 1);
    assert_eq!(outcome.report.stats.errors, 1);
    assert!(outcome.items.is_empty());
}

#[tokio::test]
async fn test_unreachable_seed_becomes_status_zero() {
    let dir = TempDir::new().unwrap();
    // Nothing listens on port 9 on a test machine
    let mut config = create_test_config("http://127.0.0.1:9/".to_string(), dir.path());
    config.crawler.max_retries = 1;

    let outcome = Crawler::new(config, HtmlExtractor::new())
        .unwrap()
        .run()
        .await
        .unwrap();

    assert!(outcome.report.completed);
    assert_eq!(outcome.report.stats.pages_crawled, 1);
    assert_eq!(outcome.report.stats.errors, 1);
}

#[tokio::test]
async fn test_budget_holds_under_concurrency() {
    let server = MockServer::start().await;
    let links: Vec<String> = (0..40).map(|i| format!("/p{}", i)).collect();
    let link_refs: Vec<&str> = links.iter().map(String::as_str).collect();
    mount_page(&server, "/", &link_refs).await;
    for link in &links {
        mount_page(&server, link, &[]).await;
    }

    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(format!("{}/", server.uri()), dir.path());
    config.crawler.max_pages = 6;
    config.crawler.concurrency = 12;

    let outcome = Crawler::new(config, HtmlExtractor::new())
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(outcome.report.stats.pages_crawled, 6);
    let fetched: usize = hits_by_path(&server).await.values().sum();
    assert_eq!(fetched, 6);
}

#[tokio::test]
async fn test_robots_disallow_respected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /private/\n"),
        )
        .expect(1)
        .mount(&server)
        .await;
    mount_page(&server, "/", &["/public", "/private/secret"]).await;
    mount_page(&server, "/public", &[]).await;
    Mock::given(method("GET"))
        .and(path("/private/secret"))
        .respond_with(ResponseTemplate::new(200).set_body_string("secret"))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(format!("{}/", server.uri()), dir.path());
    config.crawler.respect_robots_txt = true;

    let outcome = Crawler::new(config, HtmlExtractor::new())
        .unwrap()
        .run()
        .await
        .unwrap();

    // The denied URL still uses a page of the budget
    assert_eq!(outcome.report.stats.pages_crawled, 3);
    assert_eq!(outcome.report.stats.errors, 1);
    assert_eq!(outcome.items.len(), 2);
}

/// Vetoes responses for URLs containing `/skip`
struct SkipResponses;

#[async_trait]
impl Hook for SkipResponses {
    async fn on_response(&self, response: CrawlResponse) -> HookAction<CrawlResponse> {
        if response.url.contains("/skip") {
            HookAction::Veto
        } else {
            HookAction::Continue(response)
        }
    }
}

#[tokio::test]
async fn test_response_veto_counts_page_but_skips_extraction() {
    let server = MockServer::start().await;
    mount_page(&server, "/", &["/skip", "/keep"]).await;
    mount_page(&server, "/skip", &["/behind-skip"]).await;
    mount_page(&server, "/keep", &[]).await;
    mount_page(&server, "/behind-skip", &[]).await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(format!("{}/", server.uri()), dir.path());

    let outcome = Crawler::new(config, HtmlExtractor::new())
        .unwrap()
        .with_hook(Arc::new(SkipResponses))
        .run()
        .await
        .unwrap();

    assert_eq!(outcome.report.stats.pages_crawled, 3);
    assert_eq!(outcome.items.len(), 2);
    assert!(!hits_by_path(&server).await.contains_key("/behind-skip"));
}

#[tokio::test]
async fn test_shutdown_checkpoint_and_resume() {
    let server = MockServer::start().await;
    let links: Vec<String> = (0..5).map(|i| format!("/slow{}", i)).collect();
    let link_refs: Vec<&str> = links.iter().map(String::as_str).collect();
    mount_page(&server, "/", &link_refs).await;
    for link in &links {
        Mock::given(method("GET"))
            .and(path(link.as_str()))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(html_page(link, &[]))
                    .set_delay(Duration::from_millis(100)),
            )
            .mount(&server)
            .await;
    }

    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(format!("{}/", server.uri()), dir.path());
    config.crawler.concurrency = 1;
    config.checkpoint.path = Some(dir.path().join("checkpoint.json"));
    config.checkpoint.interval = 1;
    let checkpoint_path = dir.path().join("checkpoint.json");
    let output = config.output.path.clone();

    // First run: stop after the first record
    let sink = JsonlSink::<PageItem>::create(&output, 10).unwrap();
    let mut handle = Crawler::new(config.clone(), HtmlExtractor::new())
        .unwrap()
        .with_sink(Arc::new(sink))
        .start()
        .await
        .unwrap();

    let first = handle.next_item().await.unwrap();
    assert_eq!(first.url, format!("{}/", server.uri()));
    handle.shutdown();
    let report = handle.join().await.unwrap();

    assert!(!report.completed);
    assert!(checkpoint_path.exists());
    let checkpoint = Checkpoint::load(&checkpoint_path).unwrap();
    assert_eq!(checkpoint.pages_crawled, report.stats.pages_crawled);
    assert_eq!(
        checkpoint.pages_crawled + checkpoint.pending_queue.len(),
        6
    );

    // Second run picks up the remaining frontier
    let sink = JsonlSink::<PageItem>::append(&output, 10).unwrap();
    let outcome = Crawler::new(config, HtmlExtractor::new())
        .unwrap()
        .with_sink(Arc::new(sink))
        .resume_from(checkpoint)
        .run()
        .await
        .unwrap();

    assert!(outcome.report.completed);
    assert_eq!(outcome.report.stats.pages_crawled, 6);
    assert!(!checkpoint_path.exists());

    let hits = hits_by_path(&server).await;
    assert_eq!(hits.len(), 6);
    assert!(hits.values().all(|&n| n == 1), "pages fetched twice: {:?}", hits);

    assert_eq!(read_jsonl(&output).len(), 6);
}

#[tokio::test]
async fn test_response_cache_serves_second_run() {
    let server = MockServer::start().await;
    mount_page(&server, "/", &["/next"]).await;
    mount_page(&server, "/next", &[]).await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(format!("{}/", server.uri()), dir.path());
    let cache = Arc::new(SqliteCache::open(&dir.path().join("cache.db"), 3600).unwrap());

    let first = Crawler::new(config.clone(), HtmlExtractor::new())
        .unwrap()
        .with_cache(cache.clone())
        .run()
        .await
        .unwrap();
    assert_eq!(first.report.stats.cache_hits, 0);
    assert_eq!(cache.stats().await.unwrap().entries, 2);

    let second = Crawler::new(config, HtmlExtractor::new())
        .unwrap()
        .with_cache(cache)
        .run()
        .await
        .unwrap();
    assert_eq!(second.report.stats.pages_crawled, 2);
    assert_eq!(second.report.stats.cache_hits, 2);
    assert_eq!(second.items.len(), 2);

    let fetched: usize = hits_by_path(&server).await.values().sum();
    assert_eq!(fetched, 2);
}

#[tokio::test]
async fn test_failed_authentication_aborts_before_fetching() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/account"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("home"))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(format!("{}/", server.uri()), dir.path());
    let auth = CookieAuthenticator::new(&server.uri())
        .unwrap()
        .with_cookie("session", "expired")
        .with_check_url("/account")
        .unwrap();

    let result = Crawler::new(config, HtmlExtractor::new())
        .unwrap()
        .with_authenticator(Arc::new(auth))
        .start()
        .await;

    assert!(matches!(result, Err(ErganeError::Auth(_))));
}
