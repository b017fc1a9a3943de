//! Semantic type inference.
//!
//! Each column is classified from a sample of its present cells in a fixed
//! priority order: temporal, boolean, numeric-discrete, numeric-continuous,
//! categorical, free-text. An identifier override runs last. Thresholds come
//! from [`InferenceOptions`].

use std::{collections::HashSet, sync::OnceLock};

use log::debug;
use regex::Regex;
use uuid::Uuid;

use crate::{
    config::InferenceOptions,
    data::{Cell, Column, Dataset},
    schema::ColumnType,
};

static IDENTIFIER_NAME: OnceLock<Option<Regex>> = OnceLock::new();

fn identifier_name(name: &str) -> bool {
    IDENTIFIER_NAME
        .get_or_init(|| {
            Regex::new(r"^(?:(?i:id|uuid|guid)|.*_(?i:id|key|code)|.*[a-z0-9]Id)$").ok()
        })
        .as_ref()
        .is_some_and(|regex| regex.is_match(name.trim()))
}

/// Annotates every column that does not yet carry a type.
pub fn infer(mut dataset: Dataset, options: &InferenceOptions) -> Dataset {
    for column in dataset.columns_mut() {
        if column.column_type().is_some() {
            continue;
        }
        let column_type = classify(column, options);
        debug!("Column '{}' inferred as {column_type}", column.name());
        column.annotate(column_type);
    }
    dataset
}

pub fn classify(column: &Column, options: &InferenceOptions) -> ColumnType {
    let sample_all = column.len() <= options.sample_threshold;
    let mut candidate = TypeCandidate::default();
    let mut rows_scanned = 0usize;
    for cell in column.cells() {
        if !sample_all && candidate.sampled >= options.sample_size {
            break;
        }
        rows_scanned += 1;
        candidate.update(cell);
    }

    if candidate.sampled == 0 {
        return column.native_type().unwrap_or(ColumnType::FreeText);
    }
    let base = candidate.decide(rows_scanned, options);
    if candidate.is_identifier(column.name(), options) {
        ColumnType::Identifier
    } else {
        base
    }
}

#[derive(Debug, Default)]
struct TypeCandidate {
    sampled: usize,
    temporal_matches: usize,
    boolean_matches: usize,
    numeric_matches: usize,
    integral_matches: usize,
    uuid_matches: usize,
    distinct: HashSet<String>,
}

impl TypeCandidate {
    fn update(&mut self, cell: &Cell) {
        if cell.is_absent() {
            return;
        }
        self.sampled += 1;
        self.distinct.insert(cell.key());

        if cell.as_datetime().is_some() {
            self.temporal_matches += 1;
        }
        if cell.as_boolean().is_some() {
            self.boolean_matches += 1;
        }
        if let Some(value) = cell.as_number() {
            self.numeric_matches += 1;
            if value.fract() == 0.0 {
                self.integral_matches += 1;
            }
        }
        if let Cell::Text(text) = cell {
            let trimmed = text.trim().trim_matches(|c| matches!(c, '{' | '}'));
            if Uuid::parse_str(trimmed).is_ok() {
                self.uuid_matches += 1;
            }
        }
    }

    fn all(&self, count: usize) -> bool {
        self.sampled > 0 && count == self.sampled
    }

    fn uniqueness(&self) -> f64 {
        self.distinct.len() as f64 / self.sampled as f64
    }

    fn decide(&self, rows_scanned: usize, options: &InferenceOptions) -> ColumnType {
        if self.all(self.temporal_matches) {
            ColumnType::Temporal
        } else if self.all(self.boolean_matches) {
            ColumnType::Boolean
        } else if self.all(self.numeric_matches) {
            let discrete_ratio = self.distinct.len() as f64 / rows_scanned.max(1) as f64;
            if self.all(self.integral_matches) && discrete_ratio <= options.discrete_ratio {
                ColumnType::NumericDiscrete
            } else {
                ColumnType::NumericContinuous
            }
        } else if self.uniqueness() < options.categorical_ratio {
            ColumnType::Categorical
        } else {
            ColumnType::FreeText
        }
    }

    fn is_identifier(&self, name: &str, options: &InferenceOptions) -> bool {
        let unique_uuids = self.all(self.uuid_matches) && self.distinct.len() == self.sampled;
        unique_uuids
            || (identifier_name(name) && self.uniqueness() >= options.identifier_uniqueness)
    }
}
