//! JSON Lines sink
//!
//! Records are buffered and written as numbered batch files next to the
//! output path (`{stem}_{batch:06}.jsonl`). Consolidation merges the existing
//! output and every batch into the output file, keeping the latest record
//! per `url`.

use crate::output::traits::{Sink, SinkError, SinkResult};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Writes records as JSON Lines
#[derive(Debug)]
pub struct JsonlSink<T> {
    path: PathBuf,
    dir: PathBuf,
    stem: String,
    batch_size: usize,
    buffer: Mutex<Vec<String>>,
    batch_number: AtomicU64,
    _item: PhantomData<fn(T)>,
}

impl<T> JsonlSink<T> {
    /// Sink for a fresh crawl: removes stale batches and any previous output
    pub fn create(path: impl Into<PathBuf>, batch_size: usize) -> SinkResult<Self> {
        let sink = Self::new(path.into(), batch_size)?;

        for (_, batch) in sink.batch_files()? {
            fs::remove_file(batch)?;
        }
        remove_if_exists(&sink.path)?;

        Ok(sink)
    }

    /// Sink for a resumed crawl: keeps existing output and batches
    ///
    /// Batch numbering continues after the highest batch already on disk.
    pub fn append(path: impl Into<PathBuf>, batch_size: usize) -> SinkResult<Self> {
        let sink = Self::new(path.into(), batch_size)?;

        if let Some((last, _)) = sink.batch_files()?.last() {
            sink.batch_number.store(last + 1, Ordering::SeqCst);
        }
        Ok(sink)
    }

    fn new(path: PathBuf, batch_size: usize) -> SinkResult<Self> {
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| SinkError::Write(format!("invalid output path {}", path.display())))?
            .to_string();

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        Ok(Self {
            path,
            dir,
            stem,
            batch_size: batch_size.max(1),
            buffer: Mutex::new(Vec::new()),
            batch_number: AtomicU64::new(0),
            _item: PhantomData,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn batch_path(&self, batch: u64) -> PathBuf {
        self.dir.join(format!("{}_{:06}.jsonl", self.stem, batch))
    }

    /// Batch files on disk, ordered by batch number
    fn batch_files(&self) -> SinkResult<Vec<(u64, PathBuf)>> {
        let prefix = format!("{}_", self.stem);
        let mut batches = Vec::new();

        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };

            let number = name
                .strip_prefix(&prefix)
                .and_then(|rest| rest.strip_suffix(".jsonl"))
                .filter(|digits| digits.len() >= 6 && digits.bytes().all(|b| b.is_ascii_digit()))
                .and_then(|digits| digits.parse::<u64>().ok());

            if let Some(number) = number {
                batches.push((number, entry.path()));
            }
        }

        batches.sort_by_key(|(number, _)| *number);
        Ok(batches)
    }

    /// Takes the buffered lines as the next numbered batch
    ///
    /// Must be called with the buffer lock held, so batch numbers follow the
    /// order records entered the buffer.
    fn take_batch(&self, buffer: &mut Vec<String>) -> Option<(u64, Vec<String>)> {
        if buffer.is_empty() {
            return None;
        }
        let batch = self.batch_number.fetch_add(1, Ordering::SeqCst);
        Some((batch, std::mem::take(buffer)))
    }

    async fn write_batch(&self, batch: Option<(u64, Vec<String>)>) -> SinkResult<()> {
        let Some((batch, lines)) = batch else {
            return Ok(());
        };

        let path = self.batch_path(batch);
        let mut content = lines.join("\n");
        content.push('\n');

        tokio::fs::write(&path, content).await?;
        debug!("Wrote {} records to {}", lines.len(), path.display());
        Ok(())
    }
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Keeps the last record per `url`, ordered by that last occurrence
///
/// Lines that are not objects with a string `url` are kept as they are.
fn dedup_by_url(lines: Vec<String>) -> SinkResult<Vec<String>> {
    let keys = lines
        .iter()
        .map(|line| {
            let value: serde_json::Value = serde_json::from_str(line)?;
            Ok(value.get("url").and_then(|u| u.as_str()).map(str::to_string))
        })
        .collect::<SinkResult<Vec<Option<String>>>>()?;

    let mut last_index = HashMap::new();
    for (index, key) in keys.iter().enumerate() {
        if let Some(key) = key {
            last_index.insert(key.as_str(), index);
        }
    }

    Ok(lines
        .into_iter()
        .zip(keys.iter())
        .enumerate()
        .filter(|(index, (_, key))| match key {
            Some(key) => last_index.get(key.as_str()) == Some(index),
            None => true,
        })
        .map(|(_, (line, _))| line)
        .collect())
}

fn read_lines(path: &Path, into: &mut Vec<String>) -> io::Result<()> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };

    into.extend(
        content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string),
    );
    Ok(())
}

#[async_trait]
impl<T> Sink<T> for JsonlSink<T>
where
    T: Serialize + Send + 'static,
{
    async fn add(&self, item: T) -> SinkResult<()> {
        let line = serde_json::to_string(&item)?;

        let full = {
            let mut buffer = self.buffer.lock().await;
            buffer.push(line);
            if buffer.len() >= self.batch_size {
                self.take_batch(&mut buffer)
            } else {
                None
            }
        };

        self.write_batch(full).await
    }

    async fn flush(&self) -> SinkResult<()> {
        let pending = {
            let mut buffer = self.buffer.lock().await;
            self.take_batch(&mut buffer)
        };
        self.write_batch(pending).await
    }

    async fn consolidate(&self) -> SinkResult<()> {
        self.flush().await?;

        let batches = self.batch_files()?;
        let mut lines = Vec::new();
        read_lines(&self.path, &mut lines)?;
        for (_, batch) in &batches {
            read_lines(batch, &mut lines)?;
        }

        let merged = dedup_by_url(lines)?;
        let mut content = merged.join("\n");
        if !content.is_empty() {
            content.push('\n');
        }

        let mut tmp = self.path.as_os_str().to_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        for (_, batch) in &batches {
            tokio::fs::remove_file(batch).await?;
        }

        info!(
            "Consolidated {} batches into {} ({} records)",
            batches.len(),
            self.path.display(),
            merged.len()
        );
        Ok(())
    }

    fn batch_number(&self) -> u64 {
        self.batch_number.load(Ordering::SeqCst)
    }

    fn resume_at_batch(&self, batch: u64) {
        self.batch_number.fetch_max(batch, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use tempfile::TempDir;

    fn read_records(path: &Path) -> Vec<Value> {
        fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_batches_written_when_full() {
        let dir = TempDir::new().unwrap();
        let sink = JsonlSink::create(dir.path().join("out.jsonl"), 2).unwrap();

        for i in 0..5 {
            sink.add(json!({"url": format!("https://example.com/{}", i)}))
                .await
                .unwrap();
        }
        assert_eq!(Sink::<Value>::batch_number(&sink), 2);
        assert!(dir.path().join("out_000000.jsonl").exists());
        assert!(dir.path().join("out_000001.jsonl").exists());
        assert!(!dir.path().join("out_000002.jsonl").exists());

        Sink::<Value>::flush(&sink).await.unwrap();
        assert!(dir.path().join("out_000002.jsonl").exists());
        assert_eq!(read_records(&dir.path().join("out_000002.jsonl")).len(), 1);
    }

    #[tokio::test]
    async fn test_consolidate_keeps_latest_per_url() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.jsonl");
        let sink = JsonlSink::create(&path, 1).unwrap();

        sink.add(json!({"url": "A", "v": 1})).await.unwrap();
        sink.add(json!({"url": "B", "v": 1})).await.unwrap();
        sink.add(json!({"url": "A", "v": 2})).await.unwrap();
        sink.consolidate().await.unwrap();

        let records = read_records(&path);
        assert_eq!(records, vec![json!({"url": "B", "v": 1}), json!({"url": "A", "v": 2})]);
        assert!(!dir.path().join("out_000000.jsonl").exists());

        Sink::<Value>::consolidate(&sink).await.unwrap();
        assert_eq!(read_records(&path), records);
    }

    #[tokio::test]
    async fn test_create_clears_stale_output() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.jsonl");
        fs::write(&path, "{\"url\":\"old\"}\n").unwrap();
        fs::write(dir.path().join("out_000004.jsonl"), "{\"url\":\"stale\"}\n").unwrap();
        fs::write(dir.path().join("other_000001.jsonl"), "{}\n").unwrap();

        let sink: JsonlSink<Value> = JsonlSink::create(&path, 10).unwrap();
        assert!(!path.exists());
        assert!(!dir.path().join("out_000004.jsonl").exists());
        assert!(dir.path().join("other_000001.jsonl").exists());
        assert_eq!(sink.batch_number(), 0);
    }

    #[tokio::test]
    async fn test_append_merges_with_previous_output() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.jsonl");
        fs::write(&path, "{\"url\":\"A\",\"v\":1}\n{\"url\":\"B\",\"v\":1}\n").unwrap();
        fs::write(dir.path().join("out_000003.jsonl"), "{\"url\":\"C\",\"v\":1}\n").unwrap();

        let sink = JsonlSink::append(&path, 10).unwrap();
        assert_eq!(Sink::<Value>::batch_number(&sink), 4);
        sink.resume_at_batch(2);
        assert_eq!(Sink::<Value>::batch_number(&sink), 4);

        sink.add(json!({"url": "A", "v": 2})).await.unwrap();
        sink.consolidate().await.unwrap();

        let urls: Vec<_> = read_records(&path)
            .into_iter()
            .map(|r| r["url"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(urls, vec!["B", "C", "A"]);
    }

    #[tokio::test]
    async fn test_records_without_url_kept() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.jsonl");
        let sink = JsonlSink::create(&path, 10).unwrap();

        sink.add_many(vec![json!({"n": 1}), json!({"n": 1}), json!(["x"])])
            .await
            .unwrap();
        sink.consolidate().await.unwrap();
        assert_eq!(read_records(&path).len(), 3);
    }

    #[tokio::test]
    async fn test_consolidate_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.jsonl");
        let sink: JsonlSink<Value> = JsonlSink::create(&path, 10).unwrap();
        sink.consolidate().await.unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_flush_racing_add_keeps_latest_record() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.jsonl");
        let sink = std::sync::Arc::new(JsonlSink::create(&path, 3).unwrap());

        let flusher = {
            let sink = sink.clone();
            tokio::spawn(async move {
                for _ in 0..200 {
                    Sink::<Value>::flush(&*sink).await.unwrap();
                    tokio::task::yield_now().await;
                }
            })
        };
        for version in 0..300 {
            sink.add(json!({"url": "A", "v": version})).await.unwrap();
        }
        flusher.await.unwrap();
        sink.consolidate().await.unwrap();

        assert_eq!(read_records(&path), vec![json!({"url": "A", "v": 299})]);
    }

    #[tokio::test]
    async fn test_empty_flush_uses_no_batch_number() {
        let dir = TempDir::new().unwrap();
        let sink = JsonlSink::create(dir.path().join("out.jsonl"), 10).unwrap();

        Sink::<Value>::flush(&sink).await.unwrap();
        assert_eq!(Sink::<Value>::batch_number(&sink), 0);

        sink.add(json!({"url": "A"})).await.unwrap();
        Sink::<Value>::flush(&sink).await.unwrap();
        Sink::<Value>::flush(&sink).await.unwrap();
        assert_eq!(Sink::<Value>::batch_number(&sink), 1);
        assert!(dir.path().join("out_000000.jsonl").exists());
    }

    #[test]
    fn test_invalid_path() {
        assert!(JsonlSink::<Value>::create("", 10).is_err());
    }
}
