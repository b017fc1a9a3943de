//! Semantic column types and the schema view reported to callers.

use std::{fmt, str::FromStr};

use anyhow::anyhow;
use serde::{Deserialize, Serialize};

use crate::data::Dataset;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ColumnType {
    Categorical,
    NumericContinuous,
    NumericDiscrete,
    Temporal,
    Boolean,
    FreeText,
    Identifier,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Categorical => "categorical",
            ColumnType::NumericContinuous => "numeric-continuous",
            ColumnType::NumericDiscrete => "numeric-discrete",
            ColumnType::Temporal => "temporal",
            ColumnType::Boolean => "boolean",
            ColumnType::FreeText => "free-text",
            ColumnType::Identifier => "identifier",
        }
    }

    pub fn variants() -> &'static [ColumnType] {
        &[
            ColumnType::Categorical,
            ColumnType::NumericContinuous,
            ColumnType::NumericDiscrete,
            ColumnType::Temporal,
            ColumnType::Boolean,
            ColumnType::FreeText,
            ColumnType::Identifier,
        ]
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            ColumnType::NumericContinuous | ColumnType::NumericDiscrete
        )
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ColumnType {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase().replace('_', "-");
        ColumnType::variants()
            .iter()
            .copied()
            .find(|ty| ty.as_str() == normalized)
            .or(match normalized.as_str() {
                "text" | "string" => Some(ColumnType::FreeText),
                "numeric" | "float" => Some(ColumnType::NumericContinuous),
                "integer" | "int" => Some(ColumnType::NumericDiscrete),
                "date" | "datetime" => Some(ColumnType::Temporal),
                "id" => Some(ColumnType::Identifier),
                _ => None,
            })
            .ok_or_else(|| anyhow!("Unknown column type '{value}'"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemaEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: Option<ColumnType>,
}

/// Name and inferred type of every column, in dataset order.
pub fn describe(dataset: &Dataset) -> Vec<SchemaEntry> {
    dataset
        .columns()
        .iter()
        .map(|column| SchemaEntry {
            name: column.name().to_string(),
            column_type: column.column_type(),
        })
        .collect()
}
