//! Chart specifications: validated axis bindings plus a bounded row sample.
//! Rendering is left to the caller.

use std::{fmt, str::FromStr};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    config::ChartOptions,
    data::{Column, Dataset},
    error::{EngineError, EngineResult},
    preview::{self, Record},
    schema::ColumnType,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    Bar,
    Line,
    Scatter,
    Pie,
    Histogram,
    Box,
}

impl ChartKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChartKind::Bar => "bar",
            ChartKind::Line => "line",
            ChartKind::Scatter => "scatter",
            ChartKind::Pie => "pie",
            ChartKind::Histogram => "histogram",
            ChartKind::Box => "box",
        }
    }

    pub fn variants() -> &'static [&'static str] {
        &["bar", "line", "scatter", "pie", "histogram", "box"]
    }
}

impl fmt::Display for ChartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChartKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "bar" | "column" => Ok(ChartKind::Bar),
            "line" => Ok(ChartKind::Line),
            "scatter" => Ok(ChartKind::Scatter),
            "pie" => Ok(ChartKind::Pie),
            "histogram" | "hist" => Ok(ChartKind::Histogram),
            "box" | "boxplot" => Ok(ChartKind::Box),
            other => Err(format!(
                "Unknown chart kind '{other}'. Use one of: {}",
                ChartKind::variants().join(", ")
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AxisRole {
    X,
    Y,
    Label,
    Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChartIntent {
    pub kind: Option<ChartKind>,
    #[serde(default)]
    pub x: Option<String>,
    #[serde(default)]
    pub y: Option<String>,
    #[serde(default)]
    pub series: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AxisBinding {
    pub column: String,
    pub role: AxisRole,
    pub column_type: ColumnType,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSpec {
    pub kind: ChartKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub bindings: Vec<AxisBinding>,
    pub series: Option<String>,
    pub data: Vec<Record>,
    pub total_rows: usize,
    pub sampled: bool,
}

/// Which kinds of value an axis slot accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AxisRule {
    Numeric,
    NumericOrTemporal,
    Category,
}

impl AxisRule {
    fn accepts(&self, column_type: ColumnType) -> bool {
        match self {
            AxisRule::Numeric => column_type.is_numeric(),
            AxisRule::NumericOrTemporal => {
                column_type.is_numeric() || column_type == ColumnType::Temporal
            }
            AxisRule::Category => column_type != ColumnType::NumericContinuous,
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            AxisRule::Numeric => "a numeric column",
            AxisRule::NumericOrTemporal => "a numeric or temporal column",
            AxisRule::Category => "a category column",
        }
    }
}

struct Slot<'a> {
    axis: &'static str,
    column: &'a Column,
    column_type: ColumnType,
    role: AxisRole,
    rule: AxisRule,
}

pub fn build(
    dataset: &Dataset,
    intent: &ChartIntent,
    options: &ChartOptions,
) -> EngineResult<ChartSpec> {
    let kind = intent.kind.ok_or_else(|| {
        EngineError::invalid_spec("a chart kind is required", vec!["kind".to_string()])
    })?;
    let referenced = [&intent.x, &intent.y, &intent.series]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>();
    let missing = dataset.missing_columns(referenced.iter().copied());
    if !missing.is_empty() {
        return Err(EngineError::invalid_spec(
            "chart binds columns that do not exist",
            missing,
        ));
    }
    if !dataset.is_annotated() {
        return Err(EngineError::invalid_spec(
            "charts require an annotated dataset",
            Vec::new(),
        ));
    }

    let x = bound(dataset, intent.x.as_deref());
    let y = bound(dataset, intent.y.as_deref());
    let (x_role, y_role) = match kind {
        ChartKind::Pie => (AxisRole::Label, AxisRole::Value),
        _ => (AxisRole::X, AxisRole::Y),
    };
    let (x_rule, y_rule, y_required) = match kind {
        ChartKind::Line => (AxisRule::NumericOrTemporal, AxisRule::Numeric, true),
        ChartKind::Scatter => (AxisRule::Numeric, AxisRule::Numeric, true),
        ChartKind::Bar | ChartKind::Pie => (AxisRule::Category, AxisRule::Numeric, true),
        ChartKind::Histogram => (AxisRule::NumericOrTemporal, AxisRule::Numeric, false),
        // x alone is a numeric distribution; with y it groups by category
        ChartKind::Box if y.is_some() => (AxisRule::Category, AxisRule::Numeric, true),
        ChartKind::Box => (AxisRule::Numeric, AxisRule::Numeric, false),
    };

    let x = x.ok_or_else(|| {
        EngineError::invalid_spec(
            format!("a {kind} chart needs an x column"),
            vec!["x".to_string()],
        )
    })?;
    let mut slots = vec![slot("x", x, x_role, x_rule)];
    match y {
        Some(column) => slots.push(slot("y", column, y_role, y_rule)),
        None if y_required => {
            return Err(EngineError::invalid_spec(
                format!("a {kind} chart needs a y column"),
                vec!["y".to_string()],
            ));
        }
        None => {}
    }

    for slot in &slots {
        if !slot.rule.accepts(slot.column_type) {
            return Err(EngineError::invalid_spec(
                format!(
                    "{} axis of a {kind} chart must be {}, but '{}' is {}",
                    slot.axis,
                    slot.rule.describe(),
                    slot.column.name(),
                    slot.column_type
                ),
                vec![slot.column.name().to_string()],
            ));
        }
        if slot.rule == AxisRule::Category {
            ensure_category_limit(slot.column, options.max_categories)?;
        }
    }
    if let Some(series) = bound(dataset, intent.series.as_deref()) {
        ensure_category_limit(series, options.max_categories)?;
    }

    let mut columns = slots
        .iter()
        .map(|slot| slot.column.name().to_string())
        .collect::<Vec<_>>();
    if let Some(series) = &intent.series
        && !columns.contains(series)
    {
        columns.push(series.clone());
    }
    let total_rows = dataset.row_count();
    let sample_rows = total_rows.min(options.sample_rows);
    let data = sample(dataset, &columns, sample_rows);
    debug!(
        "Built {kind} chart over {} column(s) with {sample_rows} of {total_rows} row(s)",
        columns.len()
    );

    Ok(ChartSpec {
        kind,
        title: intent.title.clone(),
        bindings: slots
            .iter()
            .map(|slot| AxisBinding {
                column: slot.column.name().to_string(),
                role: slot.role,
                column_type: slot.column_type,
            })
            .collect(),
        series: intent.series.clone(),
        data,
        total_rows,
        sampled: total_rows > sample_rows,
    })
}

fn bound<'a>(dataset: &'a Dataset, name: Option<&str>) -> Option<&'a Column> {
    name.and_then(|name| dataset.column(name))
}

fn slot<'a>(axis: &'static str, column: &'a Column, role: AxisRole, rule: AxisRule) -> Slot<'a> {
    Slot {
        axis,
        column,
        column_type: column.column_type().unwrap_or(ColumnType::FreeText),
        role,
        rule,
    }
}

fn ensure_category_limit(column: &Column, limit: usize) -> EngineResult<()> {
    let distinct = column.distinct_count();
    if distinct > limit {
        return Err(EngineError::TooManyCategories {
            column: column.name().to_string(),
            distinct,
            limit,
        });
    }
    Ok(())
}

fn sample(dataset: &Dataset, columns: &[String], rows: usize) -> Vec<Record> {
    let bound = columns
        .iter()
        .filter_map(|name| dataset.column(name))
        .collect::<Vec<_>>();
    (0..rows)
        .map(|row| preview::record(columns, bound.iter().map(|column| &column.cells()[row])))
        .collect()
}
