//! Stream sources.
//!
//! A [`StreamSource`] yields tuples in a fixed order, a batch at a time.
//! `Ok(None)` means the source is exhausted; that is a normal end of
//! stream, not an error.

mod csv_source;
mod iter_source;

pub use csv_source::CsvStreamSource;
pub use iter_source::IterSource;

use async_trait::async_trait;

use hybridjoin_core::error_codes;
use hybridjoin_core::StreamTuple;

/// Errors from stream sources.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// Reading from the underlying input failed.
    #[error("[{code}] source I/O failed: {0}", code = error_codes::SOURCE_IO_FAILED)]
    Io(#[from] std::io::Error),

    /// A record could not be decoded.
    #[error("[{code}] decode failed at record {record}: {message}", code = error_codes::SOURCE_DECODE_FAILED)]
    Decode {
        /// 1-based record number.
        record: u64,
        /// Decoder message.
        message: String,
    },
}

/// Producer side of the join: an ordered, possibly unbounded tuple stream.
#[async_trait]
pub trait StreamSource<T>: Send {
    /// Returns up to `max` tuples, or `None` once exhausted.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the input cannot be read or decoded.
    async fn poll_batch(&mut self, max: usize) -> Result<Option<Vec<StreamTuple<T>>>, SourceError>;

    /// Source name for logging.
    fn source_name(&self) -> &str;
}
