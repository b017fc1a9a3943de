use csv::{ByteRecord, QuoteStyle};
use log::debug;

use crate::{
    data::{Cell, Dataset},
    error::{EngineError, EngineResult},
    format::{FormatAdapter, FormatTag, ReadOptions, dataset_from_rows, normalize_headers},
    io_utils,
    preview::Preview,
    schema::ColumnType,
};

/// CSV/TSV. Every present field is read as text: the format cannot tag types.
pub struct DelimitedAdapter;

impl DelimitedAdapter {
    fn open<'a>(
        &self,
        bytes: &'a [u8],
        options: &ReadOptions,
    ) -> EngineResult<(csv::Reader<&'a [u8]>, Vec<String>)> {
        let delimiter = match options.delimiter {
            Some(delimiter) => delimiter,
            None => {
                let head = &bytes[..bytes.len().min(4096)];
                io_utils::sniff_delimiter(&String::from_utf8_lossy(head))
            }
        };
        debug!(
            "Reading delimited text with delimiter '{}'",
            printable_delimiter(delimiter)
        );
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .delimiter(delimiter)
            .double_quote(true)
            .flexible(false)
            .from_reader(bytes);
        let header_record = reader.byte_headers().map_err(csv_error)?.clone();
        let mut headers = decode_record(&header_record, options)?;
        if let Some(first) = headers.first_mut() {
            *first = first.trim_start_matches('\u{feff}').to_string();
        }
        Ok((reader, normalize_headers(headers)))
    }
}

impl FormatAdapter for DelimitedAdapter {
    fn tag(&self) -> FormatTag {
        FormatTag::DelimitedText
    }

    fn read(&self, bytes: &[u8], options: &ReadOptions) -> EngineResult<Dataset> {
        let (mut reader, headers) = self.open(bytes, options)?;
        let mut rows = Vec::new();
        for (row_idx, record) in reader.byte_records().enumerate() {
            options.cancel.check()?;
            io_utils::ensure_row_ceiling(row_idx + 1, options.max_rows)?;
            let record = record.map_err(csv_error)?;
            let fields = decode_record(&record, options)?;
            rows.push(fields.into_iter().map(Cell::text).collect());
        }
        dataset_from_rows(headers, rows)
    }

    fn write(&self, dataset: &Dataset) -> EngineResult<Vec<u8>> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(io_utils::DEFAULT_CSV_DELIMITER)
            .quote_style(QuoteStyle::Always)
            .double_quote(true)
            .from_writer(Vec::new());
        if !dataset.columns().is_empty() {
            writer
                .write_record(dataset.column_names())
                .map_err(csv_error)?;
        }
        for idx in 0..dataset.row_count() {
            let row = dataset.row(idx);
            writer
                .write_record(row.iter().map(|cell| cell.as_display()))
                .map_err(csv_error)?;
        }
        writer
            .into_inner()
            .map_err(|err| EngineError::format(FormatTag::DelimitedText, err.to_string()))
    }

    fn represents(&self, column_type: ColumnType) -> bool {
        !matches!(column_type, ColumnType::Temporal)
    }

    /// Streams the input: keeps the head, counts the rest without buffering it.
    fn preview(
        &self,
        bytes: &[u8],
        options: &ReadOptions,
        head_rows: usize,
    ) -> EngineResult<Preview> {
        let (mut reader, headers) = self.open(bytes, options)?;
        let mut head = Vec::with_capacity(head_rows);
        let mut total = 0usize;
        let mut record = ByteRecord::new();
        while reader.read_byte_record(&mut record).map_err(csv_error)? {
            options.cancel.check()?;
            if total < head_rows {
                let fields = decode_record(&record, options)?;
                head.push(fields.into_iter().map(Cell::text).collect());
            }
            total += 1;
        }
        Ok(Preview::new(
            FormatTag::DelimitedText,
            headers,
            head,
            total,
            options.max_rows,
        ))
    }
}

fn decode_record(record: &ByteRecord, options: &ReadOptions) -> EngineResult<Vec<String>> {
    record
        .iter()
        .map(|field| {
            io_utils::decode_bytes(field, options.encoding).ok_or_else(|| {
                EngineError::format(
                    FormatTag::DelimitedText,
                    format!("failed to decode text with encoding {}", options.encoding.name()),
                )
            })
        })
        .collect()
}

fn csv_error(err: csv::Error) -> EngineError {
    EngineError::format(FormatTag::DelimitedText, err.to_string())
}

pub(crate) fn printable_delimiter(delimiter: u8) -> String {
    match delimiter {
        b',' => ",".to_string(),
        b'\t' => "\\t".to_string(),
        other => (other as char).to_string(),
    }
}
