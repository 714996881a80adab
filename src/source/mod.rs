//! Record decoding for inbound files.
//!
//! Turns the raw bytes of a delimited file into an ordered sequence of
//! records. A decode error is fatal for the batch it belongs to.

pub mod decoder;

pub use decoder::{CsvDecoder, CsvDecoderConfig, RecordIter};
