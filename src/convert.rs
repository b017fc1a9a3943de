//! Format-to-format re-encoding with a representability check.

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::{
    config::InferenceOptions,
    data::{Cell, Column, Dataset},
    error::{EngineError, EngineResult},
    format::{FormatTag, ReadOptions, adapter_for},
    infer,
    schema::ColumnType,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Fidelity {
    #[default]
    Strict,
    Lenient,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConversionRequest {
    pub source: FormatTag,
    pub target: FormatTag,
    pub fidelity: Fidelity,
}

/// A column whose type the target cannot carry, and what it became.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Coercion {
    pub column: String,
    pub original: ColumnType,
    pub coerced: ColumnType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Conversion {
    pub bytes: Vec<u8>,
    pub coercions: Vec<Coercion>,
    pub rows: usize,
}

pub fn convert(
    bytes: &[u8],
    request: &ConversionRequest,
    read: &ReadOptions,
    inference: &InferenceOptions,
) -> EngineResult<Conversion> {
    let source = adapter_for(request.source);
    let dataset = infer::infer(source.read(bytes, read)?, inference);
    convert_dataset(dataset, request.target, request.fidelity)
}

/// Writes an annotated dataset to `target`, coercing or refusing columns
/// the target cannot represent.
pub fn convert_dataset(
    dataset: Dataset,
    target: FormatTag,
    fidelity: Fidelity,
) -> EngineResult<Conversion> {
    let writer = adapter_for(target);
    let lossy = dataset
        .columns()
        .iter()
        .filter_map(|column| {
            column
                .column_type()
                .filter(|ty| !writer.represents(*ty))
                .map(|ty| (column.name().to_string(), ty))
        })
        .collect::<Vec<_>>();

    let (dataset, coercions) = if lossy.is_empty() {
        (dataset, Vec::new())
    } else if fidelity == Fidelity::Strict {
        return Err(EngineError::LossyConversion {
            target,
            columns: lossy.into_iter().map(|(name, _)| name).collect(),
        });
    } else {
        coerce(dataset, &lossy)?
    };

    let rows = dataset.row_count();
    let bytes = writer.write(&dataset)?;
    debug!("Encoded {rows} row(s) as {target} ({} bytes)", bytes.len());
    Ok(Conversion {
        bytes,
        coercions,
        rows,
    })
}

fn coerce(
    dataset: Dataset,
    lossy: &[(String, ColumnType)],
) -> EngineResult<(Dataset, Vec<Coercion>)> {
    let mut coercions = Vec::with_capacity(lossy.len());
    let columns = dataset
        .into_columns()
        .into_iter()
        .map(|column| {
            let Some((_, original)) = lossy.iter().find(|(name, _)| name == column.name()) else {
                return column;
            };
            let coerced = ColumnType::FreeText;
            warn!(
                "Coercing column '{}' from {original} to {coerced}",
                column.name()
            );
            coercions.push(Coercion {
                column: column.name().to_string(),
                original: *original,
                coerced,
            });
            let (name, cells, _) = column.into_parts();
            let cells = cells
                .into_iter()
                .map(|cell| match cell {
                    Cell::Absent => Cell::Absent,
                    other => Cell::Text(other.as_display()),
                })
                .collect();
            Column::from_parts(name, cells, coerced)
        })
        .collect();
    Ok((Dataset::new(columns)?, coercions))
}
