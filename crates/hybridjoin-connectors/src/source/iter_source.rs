//! Iterator-backed source for generators and tests.

use async_trait::async_trait;

use hybridjoin_core::StreamTuple;

use super::{SourceError, StreamSource};

/// Wraps any iterator of tuples.
pub struct IterSource<I> {
    name: String,
    iter: I,
    exhausted: bool,
}

impl<I> IterSource<I> {
    /// Creates a source named `name` over `iter`.
    pub fn new(name: impl Into<String>, iter: I) -> Self {
        Self {
            name: name.into(),
            iter,
            exhausted: false,
        }
    }
}

#[async_trait]
impl<T, I> StreamSource<T> for IterSource<I>
where
    T: Send + 'static,
    I: Iterator<Item = StreamTuple<T>> + Send,
{
    async fn poll_batch(&mut self, max: usize) -> Result<Option<Vec<StreamTuple<T>>>, SourceError> {
        if self.exhausted {
            return Ok(None);
        }
        let batch: Vec<_> = self.iter.by_ref().take(max).collect();
        if batch.is_empty() {
            self.exhausted = true;
            return Ok(None);
        }
        Ok(Some(batch))
    }

    fn source_name(&self) -> &str {
        &self.name
    }
}
