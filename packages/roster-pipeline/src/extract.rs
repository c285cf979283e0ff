//! Record Extractor
//!
//! Streams one delimited source into [`RawRecord`]s. The first row names the
//! columns. Rows with the wrong field count or bad UTF-8 are skipped and
//! counted; rows of the right width with every cell empty are skipped
//! silently. A source that cannot be opened, or an I/O failure mid-stream,
//! is fatal.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::{ReaderBuilder, StringRecord, Trim};
use tracing::{debug, warn};

use crate::entities::EntityKind;
use crate::error::{PipelineError, Result};
use crate::transform::Column;

/// One source row as column name -> trimmed text
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRecord {
    line: u64,
    fields: HashMap<String, String>,
}

impl RawRecord {
    pub fn new(line: u64, fields: HashMap<String, String>) -> Self {
        Self { line, fields }
    }

    pub fn from_pairs<'a>(line: u64, pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let fields = pairs
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Self { line, fields }
    }

    /// 1-based line in the source
    pub fn line(&self) -> u64 {
        self.line
    }

    /// First non-empty value under the column's name or one of its aliases
    pub fn get(&self, column: &Column) -> Option<&str> {
        let mut fallback = None;
        for name in column.spellings() {
            if let Some(value) = self.fields.get(name) {
                if !value.is_empty() {
                    return Some(value.as_str());
                }
                fallback.get_or_insert(value.as_str());
            }
        }
        fallback
    }
}

/// Row counters for one source
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractStats {
    pub rows: usize,
    pub malformed: usize,
    pub blank: usize,
}

/// Lazy, single-pass stream of rows
pub struct RecordStream<R: Read> {
    entity: EntityKind,
    reader: csv::Reader<R>,
    headers: Vec<String>,
    record: StringRecord,
    stats: ExtractStats,
    finished: bool,
}

/// Open `path` for `entity`; failure to open is fatal
pub fn open_source(entity: EntityKind, path: &Path, delimiter: u8) -> Result<RecordStream<File>> {
    let file = File::open(path).map_err(|e| {
        PipelineError::parse(entity, format!("cannot open {}: {}", path.display(), e))
    })?;
    debug!(entity = %entity, path = %path.display(), "Opened source");
    RecordStream::from_reader(entity, file, delimiter)
}

impl<R: Read> RecordStream<R> {
    pub fn from_reader(entity: EntityKind, reader: R, delimiter: u8) -> Result<Self> {
        let mut reader = ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(true)
            .flexible(true)
            .trim(Trim::All)
            .from_reader(reader);

        let headers = reader
            .headers()
            .map_err(|e| PipelineError::Parse {
                entity,
                message: "unreadable header row".to_string(),
                source: Some(e),
            })?
            .iter()
            .map(str::to_string)
            .collect();

        Ok(Self {
            entity,
            reader,
            headers,
            record: StringRecord::new(),
            stats: ExtractStats::default(),
            finished: false,
        })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn stats(&self) -> ExtractStats {
        self.stats
    }

    /// Required fields with no matching header under any spelling
    pub fn missing_columns<'c>(
        &self,
        columns: &'c [Column],
        required: impl IntoIterator<Item = &'c str>,
    ) -> Vec<&'c str> {
        required
            .into_iter()
            .filter(|field| {
                let spellings: Vec<&str> = match columns.iter().find(|c| c.name == *field) {
                    Some(column) => column.spellings().collect(),
                    None => vec![*field],
                };
                !spellings
                    .iter()
                    .any(|s| self.headers.iter().any(|h| h == s))
            })
            .collect()
    }

    fn build(&self) -> RawRecord {
        let line = self.record.position().map(|p| p.line()).unwrap_or_default();
        let fields = self
            .headers
            .iter()
            .zip(self.record.iter())
            .map(|(h, v)| (h.clone(), v.to_string()))
            .collect();
        RawRecord::new(line, fields)
    }
}

impl<R: Read> Iterator for RecordStream<R> {
    type Item = Result<RawRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.finished {
            match self.reader.read_record(&mut self.record) {
                Ok(false) => self.finished = true,
                Ok(true) => {
                    // Width first: an empty row of the wrong width is still malformed
                    if self.record.len() != self.headers.len() {
                        self.stats.malformed += 1;
                        warn!(
                            entity = %self.entity,
                            line = self.record.position().map(|p| p.line()).unwrap_or_default(),
                            expected = self.headers.len(),
                            found = self.record.len(),
                            "Skipping malformed row: wrong field count"
                        );
                        continue;
                    }
                    if self.record.iter().all(str::is_empty) {
                        self.stats.blank += 1;
                        continue;
                    }
                    self.stats.rows += 1;
                    return Some(Ok(self.build()));
                }
                Err(e) if e.is_io_error() => {
                    self.finished = true;
                    return Some(Err(PipelineError::Parse {
                        entity: self.entity,
                        message: "read failed mid-stream".to_string(),
                        source: Some(e),
                    }));
                }
                Err(e) => {
                    self.stats.malformed += 1;
                    warn!(
                        entity = %self.entity,
                        line = e.position().map(|p| p.line()).unwrap_or_default(),
                        error = %e,
                        "Skipping malformed row"
                    );
                }
            }
        }
        None
    }
}
