//! Binary snapshot decoding.
//!
//! A snapshot is a two-integer header `(header, time_offset)` followed by a
//! uniform array of `(datum_code, time_stamp, value)` triples, every field a
//! 4-byte signed integer. Decoding is lazy: [`RecordDecoder`] yields one
//! record per iteration and stops for good after the first error.

use flate2::read::MultiGzDecoder;
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufReader, ErrorKind, Read};
use std::path::Path;
use thiserror::Error;

/// Scale applied to the header's time offset.
pub const TIME_OFFSET_SCALE: i64 = 100_000;

/// Multiplier turning record time units into nanoseconds.
pub const NANOS_PER_UNIT: i64 = 1_000;

/// Record count read by `decode` when no count is given.
pub const DEFAULT_RECORD_COUNT: usize = 100;

/// Size in bytes of every integer field.
const FIELD_BYTES: usize = 4;

/// Errors raised while decoding a snapshot.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("snapshot header truncated after {read} bytes")]
    TruncatedHeader { read: usize },

    #[error("record {index} truncated: {read} of 12 bytes")]
    TruncatedRecord { index: usize, read: usize },

    #[error("I/O error while decoding: {0}")]
    Io(#[from] io::Error),
}

/// Byte order of the integers in a snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ByteOrder {
    /// Order of the decoding host.
    #[default]
    Native,
    Little,
    Big,
}

impl ByteOrder {
    fn read_i32(self, bytes: [u8; FIELD_BYTES]) -> i32 {
        match self {
            ByteOrder::Native => i32::from_ne_bytes(bytes),
            ByteOrder::Little => i32::from_le_bytes(bytes),
            ByteOrder::Big => i32::from_be_bytes(bytes),
        }
    }
}

impl std::str::FromStr for ByteOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "native" => Ok(ByteOrder::Native),
            "little" | "le" => Ok(ByteOrder::Little),
            "big" | "be" => Ok(ByteOrder::Big),
            _ => Err(format!("unknown byte order: {}", s)),
        }
    }
}

impl std::fmt::Display for ByteOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ByteOrder::Native => write!(f, "native"),
            ByteOrder::Little => write!(f, "little"),
            ByteOrder::Big => write!(f, "big"),
        }
    }
}

/// How many records to read after the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeMode {
    /// Exactly `n` records; a shorter stream is truncated.
    Fixed(usize),
    /// Records until the stream ends on a record boundary.
    UntilEof,
}

/// The two leading integers of a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SnapshotHeader {
    pub header: i32,
    pub time_offset: i32,
}

/// One decoded sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BinaryRecord {
    pub header: i32,
    pub time_offset: i32,
    pub datum_code: i32,
    pub time_stamp: i32,
    pub value: i32,
}

impl BinaryRecord {
    /// High byte of the datum code.
    pub fn source(&self) -> u8 {
        ((self.datum_code as u32) >> 24) as u8
    }

    /// Low 24 bits of the datum code.
    pub fn datum(&self) -> u32 {
        (self.datum_code as u32) & 0x00FF_FFFF
    }

    /// `(time_offset * TIME_OFFSET_SCALE + time_stamp) * NANOS_PER_UNIT`.
    pub fn absolute_time_nanos(&self) -> i64 {
        (i64::from(self.time_offset) * TIME_OFFSET_SCALE + i64::from(self.time_stamp))
            * NANOS_PER_UNIT
    }
}

/// Lazy record iterator over a snapshot stream.
pub struct RecordDecoder<R> {
    reader: R,
    order: ByteOrder,
    mode: DecodeMode,
    header: SnapshotHeader,
    index: usize,
    done: bool,
}

impl<R: Read> RecordDecoder<R> {
    /// Read the header and position the decoder at the first record.
    pub fn new(mut reader: R, mode: DecodeMode, order: ByteOrder) -> Result<Self, DecodeError> {
        let mut buf = [0u8; FIELD_BYTES * 2];
        let read = read_full(&mut reader, &mut buf)?;
        if read < buf.len() {
            return Err(DecodeError::TruncatedHeader { read });
        }

        let header = SnapshotHeader {
            header: order.read_i32(field(&buf, 0)),
            time_offset: order.read_i32(field(&buf, 1)),
        };

        Ok(Self {
            reader,
            order,
            mode,
            header,
            index: 0,
            done: matches!(mode, DecodeMode::Fixed(0)),
        })
    }

    pub fn header(&self) -> SnapshotHeader {
        self.header
    }

    fn next_record(&mut self) -> Result<Option<BinaryRecord>, DecodeError> {
        let mut buf = [0u8; FIELD_BYTES * 3];
        let read = read_full(&mut self.reader, &mut buf)?;

        if read == 0 && self.mode == DecodeMode::UntilEof {
            return Ok(None);
        }
        if read < buf.len() {
            return Err(DecodeError::TruncatedRecord {
                index: self.index,
                read,
            });
        }

        Ok(Some(BinaryRecord {
            header: self.header.header,
            time_offset: self.header.time_offset,
            datum_code: self.order.read_i32(field(&buf, 0)),
            time_stamp: self.order.read_i32(field(&buf, 1)),
            value: self.order.read_i32(field(&buf, 2)),
        }))
    }
}

impl<R: Read> Iterator for RecordDecoder<R> {
    type Item = Result<BinaryRecord, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let result = self.next_record();
        match &result {
            Ok(Some(_)) => {
                self.index += 1;
                if let DecodeMode::Fixed(n) = self.mode {
                    self.done = self.index >= n;
                }
            }
            Ok(None) | Err(_) => self.done = true,
        }
        result.transpose()
    }
}

/// Decode a whole stream into memory.
pub fn decode_all<R: Read>(
    reader: R,
    mode: DecodeMode,
    order: ByteOrder,
) -> Result<Vec<BinaryRecord>, DecodeError> {
    RecordDecoder::new(reader, mode, order)?.collect()
}

/// Open a snapshot for decoding, gunzipping `.gz` files.
pub fn open_snapshot(path: &Path) -> Result<Box<dyn Read>, DecodeError> {
    let file = BufReader::new(File::open(path)?);
    let gzipped = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("gz"));

    if gzipped {
        Ok(Box::new(MultiGzDecoder::new(file)))
    } else {
        Ok(Box::new(file))
    }
}

fn field<const N: usize>(buf: &[u8; N], index: usize) -> [u8; FIELD_BYTES] {
    let start = index * FIELD_BYTES;
    let mut out = [0u8; FIELD_BYTES];
    out.copy_from_slice(&buf[start..start + FIELD_BYTES]);
    out
}

/// Fill `buf` as far as the stream allows and report how much was read.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
