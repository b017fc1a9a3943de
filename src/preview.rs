//! Labeled head-and-count summaries and record-shaped row samples.

use serde::Serialize;
use serde_json::{Map, Value as JsonValue};

use crate::{
    data::{Cell, Dataset},
    format::FormatTag,
};

pub type Record = Map<String, JsonValue>;

/// Returned instead of a dataset when a caller asks for a preview: never a
/// truncated dataset, always the true row count next to the head.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Preview {
    pub format: FormatTag,
    pub columns: Vec<String>,
    pub head: Vec<Record>,
    pub total_rows: usize,
    pub row_ceiling: usize,
    pub exceeds_ceiling: bool,
}

impl Preview {
    pub fn new(
        format: FormatTag,
        columns: Vec<String>,
        head: Vec<Vec<Cell>>,
        total_rows: usize,
        row_ceiling: usize,
    ) -> Self {
        let head = head
            .into_iter()
            .map(|row| record(&columns, row.iter()))
            .collect();
        Self {
            format,
            columns,
            head,
            total_rows,
            row_ceiling,
            exceeds_ceiling: total_rows > row_ceiling,
        }
    }

    pub fn from_dataset(
        format: FormatTag,
        dataset: &Dataset,
        head_rows: usize,
        row_ceiling: usize,
    ) -> Self {
        let columns = dataset.column_names();
        let head = rows(dataset, 0..dataset.row_count().min(head_rows));
        Self {
            format,
            columns,
            head,
            total_rows: dataset.row_count(),
            row_ceiling,
            exceeds_ceiling: dataset.row_count() > row_ceiling,
        }
    }
}

/// First and last rows of a dataset, as shown alongside an analysis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sample {
    pub head: Vec<Record>,
    pub tail: Vec<Record>,
}

impl Sample {
    pub fn from_dataset(dataset: &Dataset, rows_each: usize) -> Self {
        let total = dataset.row_count();
        let head_end = total.min(rows_each);
        let tail_start = total.saturating_sub(rows_each);
        Self {
            head: rows(dataset, 0..head_end),
            tail: rows(dataset, tail_start..total),
        }
    }
}

pub fn record<'a, I>(columns: &[String], cells: I) -> Record
where
    I: Iterator<Item = &'a Cell>,
{
    columns
        .iter()
        .cloned()
        .zip(cells.map(|cell| serde_json::to_value(cell).unwrap_or(JsonValue::Null)))
        .collect()
}

pub fn rows(dataset: &Dataset, range: std::ops::Range<usize>) -> Vec<Record> {
    let columns = dataset.column_names();
    range
        .map(|idx| record(&columns, dataset.row(idx).into_iter()))
        .collect()
}
