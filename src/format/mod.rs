//! Format adapters: bytes ⇄ [`Dataset`] for each supported storage format.
//!
//! Every adapter declares, per [`ColumnType`], whether its encoding can carry
//! that type losslessly. The converter consults that table and nothing else,
//! so it never needs to know which library sits behind a format.

pub mod columnar;
pub mod delimited;
pub mod records;
pub mod spreadsheet;

use std::{fmt, path::Path, str::FromStr};

use encoding_rs::Encoding;
use log::debug;
use serde::Serialize;

use crate::{
    config::{ReadSettings, SizeLimits},
    data::{Cell, Column, Dataset},
    error::{EngineError, EngineResult},
    io_utils::{self, CancelFlag},
    preview::Preview,
    schema::ColumnType,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FormatTag {
    DelimitedText,
    Spreadsheet,
    Columnar,
    StructuredRecord,
}

impl FormatTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            FormatTag::DelimitedText => "delimited-text",
            FormatTag::Spreadsheet => "spreadsheet",
            FormatTag::Columnar => "columnar",
            FormatTag::StructuredRecord => "structured-record",
        }
    }

    pub fn variants() -> &'static [&'static str] {
        &[
            "delimited-text",
            "spreadsheet",
            "columnar",
            "structured-record",
        ]
    }

    pub fn from_extension(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "csv" | "tsv" | "txt" => Some(FormatTag::DelimitedText),
            "xlsx" | "xls" | "xlsm" | "xlsb" | "ods" => Some(FormatTag::Spreadsheet),
            "parquet" | "pq" => Some(FormatTag::Columnar),
            "json" | "jsonl" | "ndjson" => Some(FormatTag::StructuredRecord),
            _ => None,
        }
    }

    /// Guesses the format from magic bytes; anything unrecognised is delimited text.
    pub fn sniff(bytes: &[u8]) -> Self {
        const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
        const OLE_MAGIC: &[u8] = b"\xD0\xCF\x11\xE0";
        const PARQUET_MAGIC: &[u8] = b"PAR1";
        if bytes.starts_with(ZIP_MAGIC) || bytes.starts_with(OLE_MAGIC) {
            return FormatTag::Spreadsheet;
        }
        if bytes.starts_with(PARQUET_MAGIC) {
            return FormatTag::Columnar;
        }
        let body = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
        match body.iter().find(|b| !b.is_ascii_whitespace()) {
            Some(b'[') | Some(b'{') => FormatTag::StructuredRecord,
            _ => FormatTag::DelimitedText,
        }
    }

    /// Explicit hint first, then the file extension, then the content.
    pub fn resolve(hint: Option<FormatTag>, path: Option<&Path>, bytes: &[u8]) -> Self {
        if let Some(tag) = hint {
            return tag;
        }
        if let Some(tag) = path.and_then(FormatTag::from_extension) {
            return tag;
        }
        let sniffed = FormatTag::sniff(bytes);
        debug!("Sniffed input format as {sniffed}");
        sniffed
    }
}

impl fmt::Display for FormatTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FormatTag {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase().replace('_', "-");
        match normalized.as_str() {
            "delimited-text" | "delimited" | "csv" | "tsv" | "txt" => Ok(FormatTag::DelimitedText),
            "spreadsheet" | "xlsx" | "xls" | "excel" | "ods" => Ok(FormatTag::Spreadsheet),
            "columnar" | "parquet" | "pq" => Ok(FormatTag::Columnar),
            "structured-record" | "records" | "json" | "jsonl" | "ndjson" => {
                Ok(FormatTag::StructuredRecord)
            }
            other => Err(format!(
                "Unknown format '{other}'. Use one of: {}",
                FormatTag::variants().join(", ")
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReadOptions {
    pub max_rows: usize,
    pub delimiter: Option<u8>,
    pub encoding: &'static Encoding,
    pub sheet: usize,
    pub cancel: CancelFlag,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            max_rows: SizeLimits::default().max_rows,
            delimiter: None,
            encoding: encoding_rs::UTF_8,
            sheet: 0,
            cancel: CancelFlag::new(),
        }
    }
}

impl ReadOptions {
    pub fn from_settings(settings: &ReadSettings, limits: &SizeLimits) -> EngineResult<Self> {
        let delimiter = match settings.delimiter {
            Some(ch) if ch.is_ascii() => Some(ch as u8),
            Some(ch) => {
                return Err(EngineError::invalid_spec(
                    format!("delimiter '{ch}' must be a single ASCII character"),
                    vec!["delimiter".to_string()],
                ));
            }
            None => None,
        };
        let encoding = io_utils::resolve_encoding(settings.encoding.as_deref()).ok_or_else(|| {
            EngineError::invalid_spec(
                format!(
                    "unknown encoding '{}'",
                    settings.encoding.as_deref().unwrap_or_default()
                ),
                vec!["encoding".to_string()],
            )
        })?;
        Ok(Self {
            max_rows: limits.max_rows,
            delimiter,
            encoding,
            sheet: settings.sheet,
            cancel: CancelFlag::new(),
        })
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Row ceiling lifted; used to count rows for a preview.
    pub fn unbounded(&self) -> Self {
        Self {
            max_rows: usize::MAX,
            ..self.clone()
        }
    }
}

pub trait FormatAdapter {
    fn tag(&self) -> FormatTag;

    fn read(&self, bytes: &[u8], options: &ReadOptions) -> EngineResult<Dataset>;

    fn write(&self, dataset: &Dataset) -> EngineResult<Vec<u8>>;

    /// Whether values of `column_type` survive a write/read cycle unchanged.
    fn represents(&self, column_type: ColumnType) -> bool;

    /// Head-and-count summary that ignores the row ceiling.
    fn preview(
        &self,
        bytes: &[u8],
        options: &ReadOptions,
        head_rows: usize,
    ) -> EngineResult<Preview> {
        let dataset = self.read(bytes, &options.unbounded())?;
        Ok(Preview::from_dataset(
            self.tag(),
            &dataset,
            head_rows,
            options.max_rows,
        ))
    }
}

pub fn adapter_for(tag: FormatTag) -> Box<dyn FormatAdapter> {
    match tag {
        FormatTag::DelimitedText => Box::new(delimited::DelimitedAdapter),
        FormatTag::Spreadsheet => Box::new(spreadsheet::SpreadsheetAdapter),
        FormatTag::Columnar => Box::new(columnar::ColumnarAdapter),
        FormatTag::StructuredRecord => Box::new(records::RecordsAdapter),
    }
}

/// Column names for a header row: blanks get `column_<n>`.
pub(crate) fn normalize_headers<I, S>(headers: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    headers
        .into_iter()
        .enumerate()
        .map(|(idx, raw)| {
            let trimmed = raw.as_ref().trim();
            if trimmed.is_empty() {
                format!("column_{}", idx + 1)
            } else {
                trimmed.to_string()
            }
        })
        .collect()
}

/// Row-major cells into a validated dataset.
pub(crate) fn dataset_from_rows(
    headers: Vec<String>,
    rows: Vec<Vec<Cell>>,
) -> EngineResult<Dataset> {
    let mut columns = headers
        .iter()
        .map(|_| Vec::with_capacity(rows.len()))
        .collect::<Vec<Vec<Cell>>>();
    for row in rows {
        let mut cells = row.into_iter();
        for column in columns.iter_mut() {
            column.push(cells.next().unwrap_or(Cell::Absent));
        }
    }
    Dataset::new(
        headers
            .into_iter()
            .zip(columns)
            .map(|(name, cells)| Column::new(name, cells))
            .collect(),
    )
}

/// Storage class a typed writer uses for one column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Physical {
    Number,
    Boolean,
    Date,
    Text,
}

/// Normalises a column's cells to a single storage class.
///
/// Measured types (numeric, boolean, temporal) are parsed into native cells
/// when every present value converts and renders back to the same text;
/// label types keep native cells only when the whole column already shares
/// one variant, otherwise they are rendered as text.
pub(crate) fn physical_cells(column: &Column) -> (Physical, Vec<Cell>) {
    let column_type = column.column_type().or(column.native_type());
    let converted = match column_type {
        Some(ty) if ty.is_numeric() => convert_all(column, Physical::Number, |c| {
            c.as_number().map(Cell::Number)
        }),
        Some(ColumnType::Boolean) => convert_all(column, Physical::Boolean, |c| {
            c.as_boolean().map(Cell::Boolean)
        }),
        Some(ColumnType::Temporal) => convert_all(column, Physical::Date, |c| {
            c.as_datetime().map(Cell::Date)
        }),
        _ => None,
    };
    if let Some(result) = converted {
        return result;
    }

    let mut present = column.present().peekable();
    let uniform = match present.peek() {
        Some(Cell::Number(_)) if column.present().all(|c| matches!(c, Cell::Number(_))) => {
            Some(Physical::Number)
        }
        Some(Cell::Boolean(_)) if column.present().all(|c| matches!(c, Cell::Boolean(_))) => {
            Some(Physical::Boolean)
        }
        Some(Cell::Date(_)) if column.present().all(|c| matches!(c, Cell::Date(_))) => {
            Some(Physical::Date)
        }
        _ => None,
    };
    if let Some(physical) = uniform {
        return (physical, column.cells().to_vec());
    }
    let cells = column
        .cells()
        .iter()
        .map(|cell| match cell {
            Cell::Absent => Cell::Absent,
            Cell::Text(s) => Cell::Text(s.clone()),
            other => Cell::Text(other.as_display()),
        })
        .collect();
    (Physical::Text, cells)
}

fn convert_all<F>(column: &Column, physical: Physical, convert: F) -> Option<(Physical, Vec<Cell>)>
where
    F: Fn(&Cell) -> Option<Cell>,
{
    let cells = column
        .cells()
        .iter()
        .map(|cell| match cell {
            Cell::Absent => Some(Cell::Absent),
            // Text whose canonical rendering differs (`0150`, `yes`) stays text.
            Cell::Text(text) => convert(cell).filter(|native| native.as_display() == *text),
            other => convert(other),
        })
        .collect::<Option<Vec<_>>>()?;
    Some((physical, cells))
}
