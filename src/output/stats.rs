//! Crawl statistics snapshots
//!
//! A `CrawlStats` is a point-in-time copy of the crawl-wide counters plus the
//! derived elapsed time and throughput.

use serde::Serialize;
use std::fmt;

/// Crawl statistics summary
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CrawlStats {
    /// Pages fetched (including failures and vetoed responses)
    pub pages_crawled: usize,

    /// Records emitted to the output stream and sink
    pub items_extracted: usize,

    /// Responses that failed or returned an HTTP error status
    pub errors: usize,

    /// Responses served from the response cache
    pub cache_hits: usize,

    /// Seconds since the crawl started running
    pub elapsed_secs: f64,

    pub pages_per_sec: f64,
}

impl CrawlStats {
    /// Fraction of crawled pages that did not count as errors, in percent
    pub fn success_rate(&self) -> f64 {
        if self.pages_crawled == 0 {
            return 0.0;
        }
        let ok = self.pages_crawled.saturating_sub(self.errors);
        (ok as f64 / self.pages_crawled as f64) * 100.0
    }
}

impl fmt::Display for CrawlStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Crawl Statistics ===")?;
        writeln!(f)?;
        writeln!(f, "  Pages crawled: {}", self.pages_crawled)?;
        writeln!(f, "  Items extracted: {}", self.items_extracted)?;
        writeln!(f, "  Errors: {}", self.errors)?;
        writeln!(f, "  Cache hits: {}", self.cache_hits)?;
        writeln!(
            f,
            "  Elapsed: {:.1}s ({:.2} pages/sec)",
            self.elapsed_secs, self.pages_per_sec
        )?;
        write!(
            f,
            "Success Rate: {:.1}% ({} / {} pages without errors)",
            self.success_rate(),
            self.pages_crawled.saturating_sub(self.errors),
            self.pages_crawled
        )
    }
}

/// Prints statistics to stdout
pub fn print_statistics(stats: &CrawlStats) {
    println!("{}", stats);
}
