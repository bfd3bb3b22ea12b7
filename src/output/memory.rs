use crate::output::traits::{Sink, SinkResult};
use async_trait::async_trait;
use std::sync::{Mutex, PoisonError};

/// Collects records in memory
#[derive(Debug, Default)]
pub struct MemorySink<T> {
    items: Mutex<Vec<T>>,
}

impl<T: Clone> MemorySink<T> {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(Vec::new()),
        }
    }

    /// Copy of everything added so far, in insertion order
    pub fn items(&self) -> Vec<T> {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.items.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl<T> Sink<T> for MemorySink<T>
where
    T: Clone + Send + 'static,
{
    async fn add(&self, item: T) -> SinkResult<()> {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(item);
        Ok(())
    }

    async fn flush(&self) -> SinkResult<()> {
        Ok(())
    }
}
