//! Per-column descriptive statistics, shaped by the column's inferred type.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDateTime;
use itertools::Itertools;
use log::debug;
use serde::{Serialize, Serializer};

use crate::{
    config::StatsOptions,
    data::{Column, Dataset, format_temporal},
    error::{EngineError, EngineResult},
    frequency::{FrequencyTable, frequency_table},
    schema::ColumnType,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ColumnStats {
    Numeric(NumericStats),
    Label(LabelStats),
    Temporal(TemporalStats),
    Boolean(BooleanStats),
}

/// Undefined aggregates (no present values) are `None` and serialize as `null`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NumericStats {
    pub column_type: ColumnType,
    pub count: usize,
    pub missing: usize,
    pub mean: Option<f64>,
    pub std_dev: Option<f64>,
    pub min: Option<f64>,
    pub q1: Option<f64>,
    pub median: Option<f64>,
    pub q3: Option<f64>,
    pub max: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelStats {
    pub column_type: ColumnType,
    pub count: usize,
    pub missing: usize,
    pub cardinality: usize,
    #[serde(flatten)]
    pub frequencies: FrequencyTable,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemporalStats {
    pub count: usize,
    pub missing: usize,
    #[serde(serialize_with = "serialize_temporal")]
    pub min: Option<NaiveDateTime>,
    #[serde(serialize_with = "serialize_temporal")]
    pub max: Option<NaiveDateTime>,
    pub most_common_gap: Option<Gap>,
}

/// Spacing between consecutive sorted timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Gap {
    pub seconds: i64,
    pub occurrences: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BooleanStats {
    pub true_count: usize,
    pub false_count: usize,
    pub missing: usize,
}

/// Summarizes every column of an annotated dataset, keyed by column name.
pub fn summarize(
    dataset: &Dataset,
    options: &StatsOptions,
) -> EngineResult<BTreeMap<String, ColumnStats>> {
    let mut summary = BTreeMap::new();
    for column in dataset.columns() {
        let column_type = column.column_type().ok_or_else(|| {
            EngineError::invalid_spec(
                "statistics require an annotated dataset",
                vec![column.name().to_string()],
            )
        })?;
        let stats = summarize_column(column, column_type, options);
        summary.insert(column.name().to_string(), stats);
    }
    debug!("Summarized {} column(s)", summary.len());
    Ok(summary)
}

pub fn summarize_column(
    column: &Column,
    column_type: ColumnType,
    options: &StatsOptions,
) -> ColumnStats {
    match column_type {
        ColumnType::NumericContinuous | ColumnType::NumericDiscrete => {
            ColumnStats::Numeric(numeric_stats(column, column_type))
        }
        ColumnType::Temporal => ColumnStats::Temporal(temporal_stats(column)),
        ColumnType::Boolean => ColumnStats::Boolean(boolean_stats(column)),
        ColumnType::Categorical | ColumnType::FreeText | ColumnType::Identifier => {
            ColumnStats::Label(label_stats(column, column_type, options.top_k))
        }
    }
}

/// Cells that do not parse as numbers count as missing.
fn numeric_stats(column: &Column, column_type: ColumnType) -> NumericStats {
    let mut values = column
        .cells()
        .iter()
        .filter_map(|cell| cell.as_number())
        .collect::<Vec<_>>();
    values.sort_by(f64::total_cmp);
    let count = values.len();
    let mean = mean(&values);
    NumericStats {
        column_type,
        count,
        missing: column.len() - count,
        mean,
        std_dev: mean.map(|m| population_std_dev(&values, m)),
        min: values.first().copied(),
        q1: quantile(&values, 0.25),
        median: quantile(&values, 0.5),
        q3: quantile(&values, 0.75),
        max: values.last().copied(),
    }
}

fn label_stats(column: &Column, column_type: ColumnType, top_k: usize) -> LabelStats {
    let frequencies = frequency_table(column.cells(), top_k);
    let missing = column.missing_count();
    LabelStats {
        column_type,
        count: column.len() - missing,
        missing,
        cardinality: frequencies.distinct(),
        frequencies,
    }
}

fn temporal_stats(column: &Column) -> TemporalStats {
    let mut values = column
        .cells()
        .iter()
        .filter_map(|cell| cell.as_datetime())
        .collect::<Vec<_>>();
    values.sort();
    TemporalStats {
        count: values.len(),
        missing: column.len() - values.len(),
        min: values.first().copied(),
        max: values.last().copied(),
        most_common_gap: most_common_gap(&values),
    }
}

fn boolean_stats(column: &Column) -> BooleanStats {
    let mut stats = BooleanStats {
        true_count: 0,
        false_count: 0,
        missing: 0,
    };
    for cell in column.cells() {
        match cell.as_boolean() {
            Some(true) => stats.true_count += 1,
            Some(false) => stats.false_count += 1,
            None => stats.missing += 1,
        }
    }
    stats
}

pub(crate) fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

fn population_std_dev(values: &[f64], mean: f64) -> f64 {
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Linear interpolation between closest ranks, `pos = p * (n - 1)`.
/// `sorted` must be ascending.
pub(crate) fn quantile(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let pos = p * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let weight = pos - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * weight)
}

/// Needs at least three values; zero gaps are ignored and ties go to the gap
/// seen first in sorted order.
fn most_common_gap(sorted: &[NaiveDateTime]) -> Option<Gap> {
    if sorted.len() < 3 {
        return None;
    }
    let mut order = Vec::new();
    let mut counts: HashMap<i64, usize> = HashMap::new();
    for (earlier, later) in sorted.iter().tuple_windows() {
        let seconds = later.signed_duration_since(*earlier).num_seconds();
        if seconds == 0 {
            continue;
        }
        let count = counts.entry(seconds).or_insert(0);
        if *count == 0 {
            order.push(seconds);
        }
        *count += 1;
    }
    let mut best: Option<Gap> = None;
    for seconds in order {
        let occurrences = counts.get(&seconds).copied().unwrap_or(0);
        if best.is_none_or(|gap| occurrences > gap.occurrences) {
            best = Some(Gap {
                seconds,
                occurrences,
            });
        }
    }
    best
}

fn serialize_temporal<S>(value: &Option<NaiveDateTime>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match value {
        Some(dt) => serializer.serialize_str(&format_temporal(dt)),
        None => serializer.serialize_none(),
    }
}
