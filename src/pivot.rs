//! Grouped aggregation: row-key tuples down, column-key tuples across.

use std::{
    collections::{HashMap, HashSet},
    fmt,
    str::FromStr,
};

use log::debug;
use serde::{Deserialize, Serialize, Serializer, ser::SerializeMap};

use crate::{
    data::{Cell, Column, Dataset},
    error::{EngineError, EngineResult},
    schema::ColumnType,
    stats::{mean, quantile},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    Sum,
    Mean,
    Count,
    CountNonNull,
    Min,
    Max,
    Median,
    Std,
    Var,
}

impl Aggregation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Aggregation::Sum => "sum",
            Aggregation::Mean => "mean",
            Aggregation::Count => "count",
            Aggregation::CountNonNull => "count_non_null",
            Aggregation::Min => "min",
            Aggregation::Max => "max",
            Aggregation::Median => "median",
            Aggregation::Std => "std",
            Aggregation::Var => "var",
        }
    }

    pub fn variants() -> &'static [&'static str] {
        &[
            "sum",
            "mean",
            "count",
            "count_non_null",
            "min",
            "max",
            "median",
            "std",
            "var",
        ]
    }

    /// Whether the aggregation can be applied to a column of this type.
    pub fn accepts(&self, column_type: ColumnType) -> bool {
        match self {
            Aggregation::Count | Aggregation::CountNonNull => true,
            Aggregation::Min | Aggregation::Max => {
                column_type.is_numeric() || column_type == ColumnType::Temporal
            }
            _ => column_type.is_numeric(),
        }
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Aggregation {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "sum" => Ok(Aggregation::Sum),
            "mean" | "avg" | "average" => Ok(Aggregation::Mean),
            "count" | "size" => Ok(Aggregation::Count),
            "count_non_null" | "count_nonnull" | "non_null" => Ok(Aggregation::CountNonNull),
            "min" => Ok(Aggregation::Min),
            "max" => Ok(Aggregation::Max),
            "median" => Ok(Aggregation::Median),
            "std" | "stddev" | "std_dev" => Ok(Aggregation::Std),
            "var" | "variance" => Ok(Aggregation::Var),
            other => Err(format!(
                "Unknown aggregation '{other}'. Use one of: {}",
                Aggregation::variants().join(", ")
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueSpec {
    pub column: String,
    pub aggregation: Aggregation,
}

impl ValueSpec {
    pub fn new(column: impl Into<String>, aggregation: Aggregation) -> Self {
        Self {
            column: column.into(),
            aggregation,
        }
    }

    fn label(&self) -> String {
        format!("{}_{}", self.column, self.aggregation)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PivotSpec {
    #[serde(default)]
    pub rows: Vec<String>,
    #[serde(default)]
    pub columns: Vec<String>,
    pub values: Vec<ValueSpec>,
    /// Replaces undefined aggregates; counts are never undefined.
    #[serde(default)]
    pub fill_value: Option<f64>,
}

/// One output row: labels in output order with their cells.
#[derive(Debug, Clone, PartialEq)]
pub struct PivotRow {
    entries: Vec<(String, Cell)>,
}

impl PivotRow {
    pub fn get(&self, label: &str) -> Option<&Cell> {
        self.entries
            .iter()
            .find(|(name, _)| name == label)
            .map(|(_, cell)| cell)
    }

    pub fn entries(&self) -> &[(String, Cell)] {
        &self.entries
    }
}

impl Serialize for PivotRow {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (label, cell) in &self.entries {
            map.serialize_entry(label, cell)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PivotResult {
    pub row_keys: Vec<String>,
    pub column_keys: Vec<Vec<Cell>>,
    pub labels: Vec<String>,
    pub rows: Vec<PivotRow>,
}

type GroupKey = Vec<Option<String>>;

/// First-seen ordered groups of key tuples.
#[derive(Debug, Default)]
struct KeyGroups {
    index: HashMap<GroupKey, usize>,
    representatives: Vec<Vec<Cell>>,
}

impl KeyGroups {
    fn assign(&mut self, columns: &[&Column], row: usize) -> usize {
        let key = columns
            .iter()
            .map(|column| {
                let cell = &column.cells()[row];
                (!cell.is_absent()).then(|| cell.key())
            })
            .collect::<GroupKey>();
        if let Some(idx) = self.index.get(&key) {
            return *idx;
        }
        let idx = self.representatives.len();
        self.index.insert(key, idx);
        self.representatives
            .push(columns.iter().map(|column| column.cells()[row].clone()).collect());
        idx
    }

    fn len(&self) -> usize {
        self.representatives.len()
    }
}

pub fn pivot(dataset: &Dataset, spec: &PivotSpec) -> EngineResult<PivotResult> {
    validate(dataset, spec)?;
    let row_columns = lookup(dataset, &spec.rows);
    let key_columns = lookup(dataset, &spec.columns);
    let value_columns = spec
        .values
        .iter()
        .filter_map(|value| dataset.column(&value.column))
        .collect::<Vec<_>>();

    let mut row_groups = KeyGroups::default();
    let mut column_groups = KeyGroups::default();
    let mut buckets: HashMap<(usize, usize), Vec<usize>> = HashMap::new();
    for row in 0..dataset.row_count() {
        let row_group = row_groups.assign(&row_columns, row);
        let column_group = column_groups.assign(&key_columns, row);
        buckets
            .entry((row_group, column_group))
            .or_default()
            .push(row);
    }

    let mut column_keys = column_groups.representatives;
    // without column keys there is exactly one unkeyed group, even with zero rows
    if spec.columns.is_empty() && column_keys.is_empty() {
        column_keys.push(Vec::new());
    }
    let mut labels = spec.rows.clone();
    let mut taken = labels.iter().cloned().collect::<HashSet<_>>();
    for value in &spec.values {
        for key in &column_keys {
            labels.push(unique_label(value_label(value, key), &mut taken));
        }
    }

    let empty = Vec::new();
    let mut rows = Vec::with_capacity(row_groups.len());
    for (row_group, key_cells) in row_groups.representatives.into_iter().enumerate() {
        let mut entries = spec
            .rows
            .iter()
            .cloned()
            .zip(key_cells)
            .collect::<Vec<_>>();
        let mut label_iter = labels.iter().skip(spec.rows.len());
        for (value, column) in spec.values.iter().zip(&value_columns) {
            for column_group in 0..column_keys.len() {
                let members = buckets.get(&(row_group, column_group)).unwrap_or(&empty);
                let mut cell = aggregate(value.aggregation, column, members);
                if let (Cell::Absent, Some(fill)) = (&cell, spec.fill_value) {
                    cell = Cell::number(fill);
                }
                let label = label_iter.next().cloned().unwrap_or_else(|| value.label());
                entries.push((label, cell));
            }
        }
        rows.push(PivotRow { entries });
    }

    debug!(
        "Pivot produced {} row(s) across {} column-key tuple(s)",
        rows.len(),
        column_keys.len()
    );
    Ok(PivotResult {
        row_keys: spec.rows.clone(),
        column_keys,
        labels,
        rows,
    })
}

fn lookup<'a>(dataset: &'a Dataset, names: &[String]) -> Vec<&'a Column> {
    names.iter().filter_map(|name| dataset.column(name)).collect()
}

fn value_label(value: &ValueSpec, key: &[Cell]) -> String {
    let mut label = value.label();
    for cell in key {
        label.push('_');
        if cell.is_absent() {
            label.push_str("null");
        } else {
            label.push_str(&cell.key());
        }
    }
    label
}

/// Appends `_2`, `_3`, ... until the label is unused.
fn unique_label(label: String, taken: &mut HashSet<String>) -> String {
    if taken.insert(label.clone()) {
        return label;
    }
    let mut suffix = 2;
    loop {
        let candidate = format!("{label}_{suffix}");
        if taken.insert(candidate.clone()) {
            return candidate;
        }
        suffix += 1;
    }
}

fn validate(dataset: &Dataset, spec: &PivotSpec) -> EngineResult<()> {
    if spec.values.is_empty() {
        return Err(EngineError::invalid_spec(
            "a pivot needs at least one value specification",
            vec!["values".to_string()],
        ));
    }
    let referenced = spec
        .rows
        .iter()
        .chain(&spec.columns)
        .chain(spec.values.iter().map(|value| &value.column));
    let missing = dataset.missing_columns(referenced);
    if !missing.is_empty() {
        return Err(EngineError::invalid_spec(
            "pivot references columns that do not exist",
            missing,
        ));
    }
    if !dataset.is_annotated() {
        return Err(EngineError::invalid_spec(
            "pivot requires an annotated dataset",
            Vec::new(),
        ));
    }
    let mut labels = HashSet::new();
    for value in &spec.values {
        if !labels.insert(value.label()) {
            return Err(EngineError::invalid_spec(
                format!("aggregation '{}' is requested twice", value.label()),
                vec![value.column.clone()],
            ));
        }
        let column_type = dataset
            .column(&value.column)
            .and_then(Column::column_type)
            .unwrap_or(ColumnType::FreeText);
        if !value.aggregation.accepts(column_type) {
            return Err(EngineError::invalid_spec(
                format!(
                    "aggregation '{}' cannot be applied to {column_type} column '{}'",
                    value.aggregation, value.column
                ),
                vec![value.column.clone()],
            ));
        }
    }
    Ok(())
}

fn aggregate(aggregation: Aggregation, column: &Column, members: &[usize]) -> Cell {
    let cells = members.iter().map(|&row| &column.cells()[row]);
    match aggregation {
        Aggregation::Count => Cell::Number(members.len() as f64),
        Aggregation::CountNonNull => {
            Cell::Number(cells.filter(|cell| !cell.is_absent()).count() as f64)
        }
        Aggregation::Min | Aggregation::Max
            if column.column_type() == Some(ColumnType::Temporal) =>
        {
            let dates = cells.filter_map(Cell::as_datetime);
            let extreme = if aggregation == Aggregation::Min {
                dates.min()
            } else {
                dates.max()
            };
            extreme.map(Cell::Date).unwrap_or(Cell::Absent)
        }
        _ => {
            let mut values = cells.filter_map(Cell::as_number).collect::<Vec<_>>();
            let result = match aggregation {
                Aggregation::Sum => (!values.is_empty()).then(|| values.iter().sum::<f64>()),
                Aggregation::Mean => mean(&values),
                Aggregation::Min => values.iter().copied().reduce(f64::min),
                Aggregation::Max => values.iter().copied().reduce(f64::max),
                Aggregation::Median => {
                    values.sort_by(f64::total_cmp);
                    quantile(&values, 0.5)
                }
                Aggregation::Var => sample_variance(&values),
                Aggregation::Std => sample_variance(&values).map(f64::sqrt),
                Aggregation::Count | Aggregation::CountNonNull => None,
            };
            result.map(Cell::number).unwrap_or(Cell::Absent)
        }
    }
}

fn sample_variance(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let mean = mean(values)?;
    let squares = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>();
    Some(squares / (values.len() - 1) as f64)
}
