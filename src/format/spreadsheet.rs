use std::io::Cursor;

use calamine::{Data, Reader, open_workbook_auto_from_rs};
use chrono::NaiveTime;
use log::{debug, warn};
use rust_xlsxwriter::{Format, Workbook, XlsxError};

use crate::{
    data::{Cell, Dataset, parse_temporal},
    error::{EngineError, EngineResult},
    format::{
        FormatAdapter, FormatTag, ReadOptions, dataset_from_rows, normalize_headers, physical_cells,
    },
    io_utils,
    schema::ColumnType,
};

const SHEET_NAME: &str = "data";
const DATE_FORMAT: &str = "yyyy-mm-dd";
const DATETIME_FORMAT: &str = "yyyy-mm-dd hh:mm:ss";

/// Excel-family workbooks. Reads one sheet; writes a single `data` sheet.
pub struct SpreadsheetAdapter;

impl FormatAdapter for SpreadsheetAdapter {
    fn tag(&self) -> FormatTag {
        FormatTag::Spreadsheet
    }

    fn read(&self, bytes: &[u8], options: &ReadOptions) -> EngineResult<Dataset> {
        let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))
            .map_err(|err| EngineError::format(FormatTag::Spreadsheet, err.to_string()))?;
        let sheet_count = workbook.sheet_names().len();
        let range = workbook
            .worksheet_range_at(options.sheet)
            .ok_or_else(|| {
                EngineError::format(
                    FormatTag::Spreadsheet,
                    format!(
                        "no sheet at index {} (workbook has {sheet_count})",
                        options.sheet
                    ),
                )
            })?
            .map_err(|err| EngineError::format(FormatTag::Spreadsheet, err.to_string()))?;
        debug!(
            "Reading sheet {} with {} row(s) including header",
            options.sheet,
            range.height()
        );

        let mut rows_iter = range.rows();
        let headers = match rows_iter.next() {
            Some(row) => normalize_headers(row.iter().map(header_text)),
            None => Vec::new(),
        };
        let mut rows = Vec::new();
        for (row_idx, row) in rows_iter.enumerate() {
            options.cancel.check()?;
            io_utils::ensure_row_ceiling(row_idx + 1, options.max_rows)?;
            rows.push(row.iter().map(cell_from_excel).collect());
        }
        dataset_from_rows(headers, rows)
    }

    fn write(&self, dataset: &Dataset) -> EngineResult<Vec<u8>> {
        let mut workbook = Workbook::new();
        let header_format = Format::new().set_bold();
        let date_format = Format::new().set_num_format(DATE_FORMAT);
        let datetime_format = Format::new().set_num_format(DATETIME_FORMAT);

        let worksheet = workbook.add_worksheet();
        worksheet.set_name(SHEET_NAME).map_err(xlsx_error)?;
        for (col_idx, column) in dataset.columns().iter().enumerate() {
            let col = u16::try_from(col_idx).map_err(|_| {
                EngineError::format(FormatTag::Spreadsheet, "too many columns for a worksheet")
            })?;
            worksheet
                .write_string_with_format(0, col, column.name(), &header_format)
                .map_err(xlsx_error)?;
            let (_, cells) = physical_cells(column);
            for (row_idx, cell) in cells.iter().enumerate() {
                let row = u32::try_from(row_idx + 1).map_err(|_| {
                    EngineError::format(FormatTag::Spreadsheet, "too many rows for a worksheet")
                })?;
                match cell {
                    Cell::Absent => {}
                    Cell::Number(n) => {
                        worksheet.write_number(row, col, *n).map_err(xlsx_error)?;
                    }
                    Cell::Boolean(b) => {
                        worksheet.write_boolean(row, col, *b).map_err(xlsx_error)?;
                    }
                    Cell::Date(dt) => {
                        let format = if dt.time() == NaiveTime::MIN {
                            &date_format
                        } else {
                            &datetime_format
                        };
                        worksheet
                            .write_datetime_with_format(row, col, dt, format)
                            .map_err(xlsx_error)?;
                    }
                    Cell::Text(s) => {
                        worksheet.write_string(row, col, s).map_err(xlsx_error)?;
                    }
                }
            }
        }
        workbook.save_to_buffer().map_err(xlsx_error)
    }

    fn represents(&self, _column_type: ColumnType) -> bool {
        true
    }
}

fn header_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        other => cell_from_excel(other).as_display(),
    }
}

fn cell_from_excel(cell: &Data) -> Cell {
    match cell {
        Data::Empty => Cell::Absent,
        Data::String(s) => Cell::text(s.as_str()),
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Float(f) => Cell::number(*f),
        Data::Bool(b) => Cell::Boolean(*b),
        Data::DateTime(dt) => {
            if dt.is_duration() {
                Cell::number(dt.as_f64())
            } else {
                dt.as_datetime().map(Cell::Date).unwrap_or(Cell::Absent)
            }
        }
        Data::DateTimeIso(s) => parse_temporal(s)
            .map(Cell::Date)
            .unwrap_or_else(|| Cell::text(s.as_str())),
        Data::DurationIso(s) => Cell::text(s.as_str()),
        Data::Error(err) => {
            warn!("Spreadsheet cell error {err:?} read as absent");
            Cell::Absent
        }
    }
}

fn xlsx_error(err: XlsxError) -> EngineError {
    EngineError::format(FormatTag::Spreadsheet, err.to_string())
}
