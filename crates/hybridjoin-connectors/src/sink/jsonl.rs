//! JSON Lines sink.
//!
//! Each matched pair becomes one line:
//!
//! ```text
//! {"key":"c1","tuple":{...},"record":{...}}
//! ```

use std::path::Path;

use async_trait::async_trait;
use serde::Serialize;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};

use hybridjoin_core::{MatchSink, MatchedPair, SinkError};

#[derive(Serialize)]
struct PairLine<'a, T, R> {
    key: String,
    tuple: &'a T,
    record: &'a R,
}

/// Writes matched pairs as JSON lines through a buffered writer.
///
/// Output is buffered; call [`MatchSink::flush`] (the coordinator does so
/// when it stops) before reading the destination.
pub struct JsonLinesSink<W> {
    name: String,
    writer: BufWriter<W>,
    buf: Vec<u8>,
    lines: u64,
}

impl JsonLinesSink<tokio::fs::File> {
    /// Creates (or truncates) the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Write`] if the file cannot be created.
    pub async fn create(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let path = path.as_ref();
        let file = tokio::fs::File::create(path).await?;
        Ok(Self::new(path.display().to_string(), file))
    }
}

impl<W> JsonLinesSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    /// Wraps `writer`.
    pub fn new(name: impl Into<String>, writer: W) -> Self {
        Self {
            name: name.into(),
            writer: BufWriter::new(writer),
            buf: Vec::with_capacity(256),
            lines: 0,
        }
    }

    /// Lines written so far.
    #[must_use]
    pub fn lines_written(&self) -> u64 {
        self.lines
    }

    /// Returns the inner writer. Unflushed output is discarded.
    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

#[async_trait]
impl<T, R, W> MatchSink<T, R> for JsonLinesSink<W>
where
    T: Serialize + Send + Sync + 'static,
    R: Serialize + Send + Sync + 'static,
    W: AsyncWrite + Unpin + Send,
{
    async fn accept(&mut self, pair: MatchedPair<T, R>) -> Result<(), SinkError> {
        self.buf.clear();
        let line = PairLine {
            key: pair.key().to_string(),
            tuple: pair.tuple.payload(),
            record: pair.record.as_ref(),
        };
        serde_json::to_writer(&mut self.buf, &line).map_err(|e| SinkError::Serde(e.to_string()))?;
        self.buf.push(b'\n');

        self.writer.write_all(&self.buf).await?;
        self.lines += 1;
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), SinkError> {
        self.writer.flush().await?;
        tracing::debug!(sink = %self.name, lines = self.lines, "JSON lines sink flushed");
        Ok(())
    }

    fn sink_name(&self) -> &str {
        &self.name
    }
}
