//! Stream sources feeding vectors to a detector.
//!
//! A [`StreamSource`] hands out vectors in batches. [`MemorySource`] replays an
//! in-memory dataset; [`CsvSource`] reads numeric records from a delimited file,
//! optionally dropping a trailing class label column.
//!
//! # Examples
//!
//! ```rust
//! use term_outlier::sources::{MemorySource, StreamSource};
//!
//! # fn main() -> term_outlier::error::Result<()> {
//! let mut source = MemorySource::new(vec![vec![1.0], vec![2.0], vec![3.0]]);
//! assert_eq!(source.next_batch(2)?, Some(vec![vec![1.0], vec![2.0]]));
//! assert_eq!(source.next_batch(2)?, Some(vec![vec![3.0]]));
//! assert_eq!(source.next_batch(2)?, None);
//! # Ok(())
//! # }
//! ```

use std::fmt::Debug;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument};

use crate::error::{OutlierError, Result};

/// A finite or unbounded supply of vectors.
pub trait StreamSource: Debug {
    /// Returns up to `max` vectors, or `None` once the source is exhausted.
    ///
    /// A returned batch is never empty.
    fn next_batch(&mut self, max: usize) -> Result<Option<Vec<Vec<f64>>>>;

    /// Returns a human-readable description of this source.
    fn description(&self) -> String;
}

/// Replays vectors held in memory.
#[derive(Debug, Clone)]
pub struct MemorySource {
    points: Vec<Vec<f64>>,
    position: usize,
}

impl MemorySource {
    pub fn new(points: Vec<Vec<f64>>) -> Self {
        Self { points, position: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.points.len() - self.position
    }
}

impl From<Vec<Vec<f64>>> for MemorySource {
    fn from(points: Vec<Vec<f64>>) -> Self {
        Self::new(points)
    }
}

impl StreamSource for MemorySource {
    fn next_batch(&mut self, max: usize) -> Result<Option<Vec<Vec<f64>>>> {
        if self.position >= self.points.len() || max == 0 {
            return Ok(None);
        }
        let end = (self.position + max).min(self.points.len());
        let batch = self.points[self.position..end].to_vec();
        self.position = end;
        Ok(Some(batch))
    }

    fn description(&self) -> String {
        format!("in-memory stream of {} vectors", self.points.len())
    }
}

/// Options for configuring CSV reading.
#[derive(Debug, Clone)]
pub struct CsvOptions {
    /// Whether the file starts with a header row (default: false)
    pub has_header: bool,
    /// Field delimiter (default: ',')
    pub delimiter: u8,
    /// Comment prefix (lines starting with this are ignored)
    pub comment: Option<u8>,
    /// Whether the last column is a class label to be dropped
    pub contains_class: bool,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            has_header: false,
            delimiter: b',',
            comment: None,
            contains_class: false,
        }
    }
}

/// Numeric records from a delimited file, one vector per record.
///
/// Parse failures report the 1-based line number of the offending record.
pub struct CsvSource {
    description: String,
    reader: csv::Reader<Box<dyn Read>>,
    options: CsvOptions,
    record: csv::StringRecord,
    exhausted: bool,
}

impl Debug for CsvSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsvSource")
            .field("description", &self.description)
            .field("options", &self.options)
            .field("exhausted", &self.exhausted)
            .finish()
    }
}

impl CsvSource {
    /// Opens a comma-separated file without header or class column.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        Self::with_options(path, CsvOptions::default())
    }

    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn with_options(path: impl AsRef<Path>, options: CsvOptions) -> Result<Self> {
        let path: PathBuf = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        info!(contains_class = options.contains_class, "opened csv stream");
        Ok(Self::build(
            Box::new(file),
            format!("csv file {}", path.display()),
            options,
        ))
    }

    /// Reads records from any reader, e.g. an in-memory buffer.
    pub fn from_reader(reader: impl Read + 'static, options: CsvOptions) -> Self {
        Self::build(Box::new(reader), "csv reader".to_string(), options)
    }

    fn build(reader: Box<dyn Read>, description: String, options: CsvOptions) -> Self {
        let reader = csv::ReaderBuilder::new()
            .has_headers(options.has_header)
            .delimiter(options.delimiter)
            .comment(options.comment)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);
        Self {
            description,
            reader,
            options,
            record: csv::StringRecord::new(),
            exhausted: false,
        }
    }

    fn parse_record(&self) -> Result<Vec<f64>> {
        let line = self.record.position().map_or(0, csv::Position::line);
        let fields = if self.options.contains_class {
            self.record.len().saturating_sub(1)
        } else {
            self.record.len()
        };
        if fields == 0 {
            return Err(OutlierError::parse(line, "record has no coordinates"));
        }
        self.record
            .iter()
            .take(fields)
            .map(|field| {
                field.parse::<f64>().map_err(|e| {
                    OutlierError::parse(line, format!("invalid coordinate '{field}': {e}"))
                })
            })
            .collect()
    }
}

impl StreamSource for CsvSource {
    fn next_batch(&mut self, max: usize) -> Result<Option<Vec<Vec<f64>>>> {
        if self.exhausted || max == 0 {
            return Ok(None);
        }
        let mut batch = Vec::with_capacity(max);
        while batch.len() < max {
            if !self.reader.read_record(&mut self.record)? {
                self.exhausted = true;
                break;
            }
            if self.record.iter().all(str::is_empty) {
                continue;
            }
            batch.push(self.parse_record()?);
        }
        debug!(records = batch.len(), "csv batch read");
        Ok((!batch.is_empty()).then_some(batch))
    }

    fn description(&self) -> String {
        self.description.clone()
    }
}
