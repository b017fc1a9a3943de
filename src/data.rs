use std::{collections::HashSet, fmt};

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Serialize, Serializer};

use crate::{
    error::{EngineError, EngineResult},
    schema::ColumnType,
};

/// A single tagged cell. Adapters produce these; only the type inferencer
/// turns a column of cells into a semantic [`ColumnType`].
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Absent,
    Text(String),
    Number(f64),
    Boolean(bool),
    Date(NaiveDateTime),
}

impl Cell {
    /// Builds a text cell, mapping blank input to [`Cell::Absent`].
    pub fn text(value: impl Into<String>) -> Self {
        let value = value.into();
        if value.trim().is_empty() {
            Cell::Absent
        } else {
            Cell::Text(value)
        }
    }

    pub fn number(value: f64) -> Self {
        if value.is_finite() {
            Cell::Number(value)
        } else {
            Cell::Absent
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Cell::Absent)
    }

    /// Numeric view of the cell; text is parsed, booleans and dates are not numeric.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Cell::Number(n) if n.is_finite() => Some(*n),
            Cell::Text(s) => parse_number(s),
            _ => None,
        }
    }

    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            Cell::Boolean(b) => Some(*b),
            Cell::Text(s) => parse_boolean_token(s),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            Cell::Date(dt) => Some(*dt),
            Cell::Text(s) => parse_temporal(s),
            _ => None,
        }
    }

    /// Grouping key used for distinct counts, frequency tables and pivot keys.
    pub fn key(&self) -> String {
        self.as_display()
    }

    pub fn as_display(&self) -> String {
        match self {
            Cell::Absent => String::new(),
            Cell::Text(s) => s.clone(),
            Cell::Number(n) => format_number(*n),
            Cell::Boolean(b) => b.to_string(),
            Cell::Date(dt) => format_temporal(dt),
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_display())
    }
}

impl Serialize for Cell {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Cell::Absent => serializer.serialize_none(),
            Cell::Text(s) => serializer.serialize_str(s),
            Cell::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 9.0e15 {
                    serializer.serialize_i64(*n as i64)
                } else {
                    serializer.serialize_f64(*n)
                }
            }
            Cell::Boolean(b) => serializer.serialize_bool(*b),
            Cell::Date(dt) => serializer.serialize_str(&format_temporal(dt)),
        }
    }
}

pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 9.0e15 {
        format!("{value:.0}")
    } else {
        value.to_string()
    }
}

pub fn format_temporal(value: &NaiveDateTime) -> String {
    if value.time() == NaiveTime::MIN {
        value.format("%Y-%m-%d").to_string()
    } else {
        value.format("%Y-%m-%d %H:%M:%S%.f").to_string()
    }
}

pub fn parse_number(value: &str) -> Option<f64> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|n| n.is_finite())
}

pub fn parse_boolean_token(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "yes" | "y" => Some(true),
        "false" | "f" | "no" | "n" => Some(false),
        _ => None,
    }
}

pub fn parse_naive_date(value: &str) -> Option<NaiveDate> {
    const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%m/%d/%Y", "%Y/%m/%d", "%d-%m-%Y"];
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
}

pub fn parse_naive_datetime(value: &str) -> Option<NaiveDateTime> {
    const DATETIME_FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%d/%m/%Y %H:%M:%S",
        "%m/%d/%Y %H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
    ];
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
}

/// Recognised date/time patterns, dates first. RFC 3339 values with an
/// offset are normalised to UTC.
pub fn parse_temporal(value: &str) -> Option<NaiveDateTime> {
    let trimmed = value.trim();
    if trimmed.len() < 6 {
        return None;
    }
    if let Some(date) = parse_naive_date(trimmed) {
        return date.and_hms_opt(0, 0, 0);
    }
    if let Some(datetime) = parse_naive_datetime(trimmed) {
        return Some(datetime);
    }
    DateTime::parse_from_rfc3339(trimmed)
        .ok()
        .map(|dt| dt.naive_utc())
}

#[derive(Debug, Clone)]
pub struct Column {
    name: String,
    cells: Vec<Cell>,
    column_type: Option<ColumnType>,
    native_type: Option<ColumnType>,
}

impl Column {
    pub fn new(name: impl Into<String>, cells: Vec<Cell>) -> Self {
        Self {
            name: name.into(),
            cells,
            column_type: None,
            native_type: None,
        }
    }

    /// Records the type the source format declared for this column. Used by
    /// inference only when the column has no present values.
    pub fn with_native_type(mut self, native: ColumnType) -> Self {
        self.native_type = Some(native);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn column_type(&self) -> Option<ColumnType> {
        self.column_type
    }

    pub fn native_type(&self) -> Option<ColumnType> {
        self.native_type
    }

    pub fn present(&self) -> impl Iterator<Item = &Cell> {
        self.cells.iter().filter(|cell| !cell.is_absent())
    }

    pub fn missing_count(&self) -> usize {
        self.cells.iter().filter(|cell| cell.is_absent()).count()
    }

    pub fn distinct_count(&self) -> usize {
        self.present().map(Cell::key).collect::<HashSet<_>>().len()
    }

    /// Attaches the inferred type. A column is annotated at most once.
    pub(crate) fn annotate(&mut self, column_type: ColumnType) {
        if self.column_type.is_none() {
            self.column_type = Some(column_type);
        }
    }

    pub(crate) fn into_parts(self) -> (String, Vec<Cell>, Option<ColumnType>) {
        (self.name, self.cells, self.column_type)
    }

    pub(crate) fn from_parts(name: String, cells: Vec<Cell>, column_type: ColumnType) -> Self {
        Self {
            name,
            cells,
            column_type: Some(column_type),
            native_type: None,
        }
    }
}

impl PartialEq for Column {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.column_type == other.column_type
            && self.cells == other.cells
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Dataset {
    columns: Vec<Column>,
}

impl Dataset {
    /// Validates the equal-length and unique-name invariants.
    pub fn new(columns: Vec<Column>) -> EngineResult<Self> {
        if let Some(first) = columns.first() {
            let expected = first.len();
            let ragged = columns
                .iter()
                .filter(|column| column.len() != expected)
                .map(|column| column.name().to_string())
                .collect::<Vec<_>>();
            if !ragged.is_empty() {
                return Err(EngineError::shape(
                    format!("columns must share a row count of {expected}"),
                    ragged,
                ));
            }
        }
        let mut seen = HashSet::new();
        let duplicates = columns
            .iter()
            .filter(|column| !seen.insert(column.name()))
            .map(|column| column.name().to_string())
            .collect::<Vec<_>>();
        if !duplicates.is_empty() {
            return Err(EngineError::shape(
                "column names must be unique",
                duplicates,
            ));
        }
        Ok(Self { columns })
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|column| column.name() == name)
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name().to_string()).collect()
    }

    pub fn row_count(&self) -> usize {
        self.columns.first().map(Column::len).unwrap_or(0)
    }

    pub fn is_annotated(&self) -> bool {
        self.columns.iter().all(|c| c.column_type().is_some())
    }

    /// Cells of one row, in column order.
    pub fn row(&self, index: usize) -> Vec<&Cell> {
        self.columns
            .iter()
            .filter_map(|column| column.cells().get(index))
            .collect()
    }

    /// Names absent from this dataset, in the order given.
    pub fn missing_columns<'a, I>(&self, names: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a String>,
    {
        names
            .into_iter()
            .filter(|name| self.column(name).is_none())
            .cloned()
            .collect()
    }

    pub(crate) fn columns_mut(&mut self) -> &mut [Column] {
        &mut self.columns
    }

    pub(crate) fn into_columns(self) -> Vec<Column> {
        self.columns
    }
}
