//! Byte sourcing, encoding and delimiter helpers.
//!
//! All file I/O in tabular-insight flows through this module:
//!
//! - **Bounded reads**: `read_bytes` never buffers more than the configured
//!   byte ceiling plus one byte, then fails with `SizeLimitError`.
//! - **Encoding**: input decoding via `encoding_rs`, defaulting to UTF-8
//!   (a byte-order mark is honoured and stripped).
//! - **Delimiters**: extension-based resolution (`.tsv` → tab) and sniffing
//!   from the header line.
//! - **stdin/stdout**: the `-` path convention routes through standard streams.
//! - **Cancellation**: [`CancelFlag`] lets a caller abort long reads.

use std::{
    fs::File,
    io::{self, BufReader, BufWriter, Read, Write},
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use encoding_rs::{Encoding, UTF_8};

use crate::error::{EngineError, EngineResult, LimitUnit};

pub const DEFAULT_CSV_DELIMITER: u8 = b',';
pub const DEFAULT_TSV_DELIMITER: u8 = b'\t';
const SNIFF_CANDIDATES: &[u8] = b",\t;|";

pub fn is_dash(path: &Path) -> bool {
    path == Path::new("-")
}

/// Shared abort switch checked by adapters between rows and batches.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> EngineResult<()> {
        if self.is_cancelled() {
            Err(EngineError::Cancelled)
        } else {
            Ok(())
        }
    }
}

pub fn resolve_encoding(label: Option<&str>) -> Option<&'static Encoding> {
    match label {
        Some(value) => Encoding::for_label(value.trim().as_bytes()),
        None => Some(UTF_8),
    }
}

pub fn resolve_input_delimiter(path: Option<&Path>, provided: Option<u8>) -> Option<u8> {
    provided.or_else(|| match path?.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") => Some(DEFAULT_TSV_DELIMITER),
        Some(ext) if ext.eq_ignore_ascii_case("csv") => Some(DEFAULT_CSV_DELIMITER),
        _ => None,
    })
}

/// Picks the most frequent candidate delimiter on the first line, comma on ties.
pub fn sniff_delimiter(text: &str) -> u8 {
    let first_line = text.lines().next().unwrap_or("");
    let mut best = DEFAULT_CSV_DELIMITER;
    let mut best_count = first_line.matches(',').count();
    for &candidate in SNIFF_CANDIDATES.iter().skip(1) {
        let count = first_line.matches(candidate as char).count();
        if count > best_count {
            best = candidate;
            best_count = count;
        }
    }
    best
}

pub fn decode_bytes(bytes: &[u8], encoding: &'static Encoding) -> Option<String> {
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        None
    } else {
        Some(text.into_owned())
    }
}

/// Reads at most `max_bytes`; a larger source is an error, never a truncation.
pub fn read_bytes<R: Read>(reader: R, max_bytes: u64) -> EngineResult<Vec<u8>> {
    let mut buffer = Vec::new();
    reader
        .take(max_bytes.saturating_add(1))
        .read_to_end(&mut buffer)?;
    ensure_byte_ceiling(buffer.len(), max_bytes)?;
    Ok(buffer)
}

pub fn read_path(path: &Path, max_bytes: u64) -> EngineResult<Vec<u8>> {
    if is_dash(path) {
        return read_bytes(io::stdin().lock(), max_bytes);
    }
    let file = File::open(path)?;
    if file.metadata()?.len() > max_bytes {
        return Err(EngineError::SizeLimit {
            unit: LimitUnit::Bytes,
            limit: max_bytes,
        });
    }
    read_bytes(BufReader::new(file), max_bytes)
}

pub fn ensure_byte_ceiling(len: usize, max_bytes: u64) -> EngineResult<()> {
    if len as u64 > max_bytes {
        Err(EngineError::SizeLimit {
            unit: LimitUnit::Bytes,
            limit: max_bytes,
        })
    } else {
        Ok(())
    }
}

pub fn ensure_row_ceiling(rows: usize, max_rows: usize) -> EngineResult<()> {
    if rows > max_rows {
        Err(EngineError::SizeLimit {
            unit: LimitUnit::Rows,
            limit: max_rows as u64,
        })
    } else {
        Ok(())
    }
}

pub fn write_output(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut writer: Box<dyn Write> = if is_dash(path) {
        Box::new(io::stdout().lock())
    } else {
        Box::new(BufWriter::new(File::create(path)?))
    };
    writer.write_all(bytes)?;
    writer.flush()
}
