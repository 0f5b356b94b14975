//! Streaming row ingestion.
//!
//! Rows are pulled lazily off a CSV reader and validated one at a time. A
//! malformed row yields a row-scoped error and the stream continues; only
//! an unreadable source kills the whole stream.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use tracing::{debug, warn};

use phenolink_core::{Error, RawRecord, Result};

use crate::schema::ExpectedSchema;

/// Lazy, finite, restartable stream of [`RawRecord`]s from one tabular
/// source.
///
/// Iteration yields `Result<RawRecord>`: `Err(Error::RowValidation)` items
/// are row-scoped and non-fatal; callers log, count, and keep pulling.
pub struct RecordStream<R: Read> {
    reader: csv::Reader<R>,
    headers: Vec<String>,
    schema: ExpectedSchema,
    /// Row number (1-based, header excluded) of the next row to be read.
    next_row: u64,
    /// Rows at or below this offset are skipped without validation.
    resume_offset: u64,
}

impl RecordStream<File> {
    /// Open a source and validate its header.
    pub fn open(path: &Path, schema: ExpectedSchema) -> Result<Self> {
        Self::open_at(path, schema, 0)
    }

    /// Open a source for a resumed run; rows numbered at or below `offset`
    /// are skipped.
    pub fn open_at(path: &Path, schema: ExpectedSchema, offset: u64) -> Result<Self> {
        let file = File::open(path)
            .map_err(|e| Error::SourceUnreadable(format!("{}: {}", path.display(), e)))?;
        Self::from_reader(file, schema, offset)
            .map_err(|e| match e {
                Error::SourceUnreadable(msg) => {
                    Error::SourceUnreadable(format!("{}: {}", path.display(), msg))
                }
                other => other,
            })
    }
}

impl<R: Read> RecordStream<R> {
    /// Build a stream over any reader; the first record must be a header
    /// row naming the columns.
    pub fn from_reader(reader: R, schema: ExpectedSchema, offset: u64) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers: Vec<String> = csv_reader
            .headers()
            .map_err(|e| Error::SourceUnreadable(e.to_string()))?
            .iter()
            .map(String::from)
            .collect();

        if headers.iter().all(|h| h.is_empty()) {
            return Err(Error::SourceUnreadable("no header row".to_string()));
        }

        debug!(
            columns = headers.len(),
            resume_offset = offset,
            "Opened tabular source"
        );

        Ok(Self {
            reader: csv_reader,
            headers,
            schema,
            next_row: 1,
            resume_offset: offset,
        })
    }

    /// Column names from the header row.
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Validate one raw CSV record against the expected schema.
    fn validate(&self, row: u64, record: &csv::StringRecord) -> Result<RawRecord> {
        let fields: Vec<(String, String)> = self
            .headers
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let value = record.get(i).unwrap_or("").trim();
                (name.clone(), value.to_string())
            })
            .collect();

        for required in self.schema.required() {
            let present = fields
                .iter()
                .any(|(name, value)| name == required && !value.is_empty());
            if !present {
                return Err(Error::RowValidation {
                    row,
                    message: format!("missing required field {}", required),
                });
            }
        }

        Ok(RawRecord::new(row, fields))
    }
}

impl<R: Read> Iterator for RecordStream<R> {
    type Item = Result<RawRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut record = csv::StringRecord::new();
        loop {
            let row = self.next_row;
            match self.reader.read_record(&mut record) {
                Ok(false) => return None,
                Ok(true) => {
                    self.next_row += 1;
                    if row <= self.resume_offset {
                        continue;
                    }
                    return Some(self.validate(row, &record));
                }
                Err(e) => {
                    self.next_row += 1;
                    if row <= self.resume_offset {
                        continue;
                    }
                    warn!(row, error = %e, "Unparseable row");
                    return Some(Err(Error::RowValidation {
                        row,
                        message: e.to_string(),
                    }));
                }
            }
        }
    }
}
