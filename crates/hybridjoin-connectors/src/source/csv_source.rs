//! CSV file source.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use hybridjoin_core::{JoinKey, StreamTuple};

use super::{SourceError, StreamSource};

type KeyFn<T> = Box<dyn Fn(&T) -> JoinKey + Send>;

/// Reads a headed CSV input row by row and deserializes each row into `T`.
///
/// Fields are whitespace-trimmed before decoding. The join key is derived
/// from each decoded row by a caller-supplied extractor.
///
/// Reads are synchronous and bounded by the batch size, so a poll never
/// reads more than `max` rows.
///
/// A row that fails to decode ends the batch. Rows decoded before it are
/// returned first and the error is reported by the following poll.
pub struct CsvStreamSource<T> {
    name: String,
    reader: csv::Reader<Box<dyn Read + Send>>,
    key_fn: KeyFn<T>,
    rows_read: u64,
    pending_error: Option<SourceError>,
    exhausted: bool,
}

impl<T> CsvStreamSource<T>
where
    T: DeserializeOwned + Send + 'static,
{
    /// Opens the CSV file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Io`] if the file cannot be opened.
    pub fn open(
        path: impl AsRef<Path>,
        key_fn: impl Fn(&T) -> JoinKey + Send + 'static,
    ) -> Result<Self, SourceError> {
        let path = path.as_ref();
        let file = File::open(path)?;
        Ok(Self::from_reader(path.display().to_string(), file, key_fn))
    }

    /// Wraps an arbitrary reader.
    pub fn from_reader<R>(
        name: impl Into<String>,
        reader: R,
        key_fn: impl Fn(&T) -> JoinKey + Send + 'static,
    ) -> Self
    where
        R: Read + Send + 'static,
    {
        let input: Box<dyn Read + Send> = Box::new(reader);
        let reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(input);
        Self {
            name: name.into(),
            reader,
            key_fn: Box::new(key_fn),
            rows_read: 0,
            pending_error: None,
            exhausted: false,
        }
    }

    /// Rows decoded so far.
    #[must_use]
    pub fn rows_read(&self) -> u64 {
        self.rows_read
    }
}

#[async_trait]
impl<T> StreamSource<T> for CsvStreamSource<T>
where
    T: DeserializeOwned + Send + 'static,
{
    async fn poll_batch(&mut self, max: usize) -> Result<Option<Vec<StreamTuple<T>>>, SourceError> {
        if let Some(e) = self.pending_error.take() {
            return Err(e);
        }
        if self.exhausted {
            return Ok(None);
        }

        let mut batch = Vec::with_capacity(max.min(1024));
        for row in self.reader.deserialize::<T>().take(max) {
            let record = self.rows_read + 1;
            let row = match row {
                Ok(row) => row,
                Err(e) if batch.is_empty() => return Err(csv_error(record, e)),
                Err(e) => {
                    self.pending_error = Some(csv_error(record, e));
                    break;
                }
            };
            self.rows_read = record;
            let key = (self.key_fn)(&row);
            batch.push(StreamTuple::new(key, row));
        }

        if batch.is_empty() {
            self.exhausted = true;
            tracing::info!(source = %self.name, rows = self.rows_read, "CSV source exhausted");
            return Ok(None);
        }
        Ok(Some(batch))
    }

    fn source_name(&self) -> &str {
        &self.name
    }
}

fn csv_error(record: u64, e: csv::Error) -> SourceError {
    let message = e.to_string();
    match e.into_kind() {
        csv::ErrorKind::Io(io) => SourceError::Io(io),
        _ => SourceError::Decode { record, message },
    }
}
