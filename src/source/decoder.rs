//! Delimited text decoder.
//!
//! Decodes a header-prefixed delimited file into [`Record`]s, keeping only
//! the configured columns. Rows are yielded lazily and in file order.

use bytes::Bytes;
use csv::{ReaderBuilder, StringRecord, StringRecordsIntoIter, Trim};
use snafu::IntoError;
use snafu::prelude::*;
use std::collections::HashSet;
use std::io::{Cursor, Read};
use std::time::Instant;
use tracing::debug;

use crate::config::Config;
use crate::emit;
use crate::error::{ConfigError, DecodeError, HeaderSnafu, MalformedRowSnafu};
use crate::metrics::events::{BytesRead, RecordsDecoded};
use crate::record::Record;

/// Configuration for the CSV decoder.
#[derive(Debug, Clone)]
pub struct CsvDecoderConfig {
    /// Field delimiter byte.
    pub delimiter: u8,
    /// Trim surrounding whitespace from headers and cells.
    pub trim: bool,
    /// Columns retained in each record; everything else is dropped.
    pub columns: Vec<String>,
}

impl CsvDecoderConfig {
    /// Create a comma-delimited, trimming configuration for `columns`.
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            delimiter: b',',
            trim: true,
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }

    /// Build the decoder configuration from the run configuration.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Ok(Self {
            delimiter: config.decode.delimiter_byte()?,
            trim: config.decode.trim,
            columns: config.decode.retained_columns(&config.schema),
        })
    }
}

/// Decoder turning delimited bytes into records.
#[derive(Debug, Clone)]
pub struct CsvDecoder {
    config: CsvDecoderConfig,
}

impl CsvDecoder {
    pub fn new(config: CsvDecoderConfig) -> Self {
        Self { config }
    }

    /// Start decoding `data`.
    ///
    /// The header row is read eagerly; data rows are decoded as the returned
    /// iterator is advanced.
    pub fn records(&self, data: Bytes) -> Result<RecordIter<Cursor<Bytes>>, DecodeError> {
        self.records_from(Cursor::new(data))
    }

    /// Start decoding from any reader.
    pub fn records_from<R: Read>(&self, reader: R) -> Result<RecordIter<R>, DecodeError> {
        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .delimiter(self.config.delimiter)
            .flexible(true)
            .trim(if self.config.trim { Trim::All } else { Trim::None })
            .from_reader(reader);

        let headers = rdr.headers().context(HeaderSnafu)?;
        let projection = self.project(headers);

        Ok(RecordIter {
            rows: rdr.into_records(),
            projection,
        })
    }

    /// Decode every row, failing on the first malformed one.
    ///
    /// `path` is used for logging only.
    pub fn decode_all(&self, data: Bytes, path: &str) -> Result<Vec<Record>, DecodeError> {
        emit!(BytesRead {
            bytes: data.len() as u64,
        });

        let start = Instant::now();
        let byte_len = data.len();
        let records = self.records(data)?.collect::<Result<Vec<_>, _>>()?;

        emit!(RecordsDecoded {
            count: records.len() as u64,
        });
        debug!(
            "Decoded {} bytes -> {} records from {} in {:?}",
            byte_len,
            records.len(),
            path,
            start.elapsed()
        );

        Ok(records)
    }

    /// Map retained columns to their header positions, in header order.
    fn project(&self, headers: &StringRecord) -> Vec<(usize, String)> {
        let wanted: HashSet<&str> = self.config.columns.iter().map(String::as_str).collect();
        let mut taken = HashSet::new();

        headers
            .iter()
            .enumerate()
            .filter(|(_, name)| wanted.contains(name) && taken.insert(*name))
            .map(|(idx, name)| (idx, name.to_string()))
            .collect()
    }
}

/// Lazy, single-pass iterator over decoded records.
pub struct RecordIter<R> {
    rows: StringRecordsIntoIter<R>,
    projection: Vec<(usize, String)>,
}

impl<R: Read> Iterator for RecordIter<R> {
    type Item = Result<Record, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        let row = self.rows.next()?;
        Some(
            row.map(|row| {
                self.projection
                    .iter()
                    .filter_map(|(idx, name)| row.get(*idx).map(|value| (name.as_str(), value)))
                    .collect()
            })
            .map_err(|source| {
                let line = source.position().map_or(0, |p| p.line());
                MalformedRowSnafu { line }.into_error(source)
            }),
        )
    }
}
