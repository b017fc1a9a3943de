//! Error taxonomy shared by every engine component.
//!
//! Each variant carries the offending column or field names so the request
//! layer can surface them verbatim. Nothing in the engine retries on these.

use std::fmt;

use thiserror::Error;

use crate::format::FormatTag;

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitUnit {
    Bytes,
    Rows,
}

impl fmt::Display for LimitUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LimitUnit::Bytes => f.write_str("bytes"),
            LimitUnit::Rows => f.write_str("rows"),
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{format} input could not be parsed: {message}")]
    Format { format: FormatTag, message: String },

    #[error("input exceeds the configured ceiling of {limit} {unit}")]
    SizeLimit { unit: LimitUnit, limit: u64 },

    #[error("unsupported shape: {reason}")]
    UnsupportedShape { reason: String, fields: Vec<String> },

    #[error("invalid spec: {reason}")]
    InvalidSpec { reason: String, fields: Vec<String> },

    #[error(
        "conversion to {target} would lose information in column(s): {}",
        columns.join(", ")
    )]
    LossyConversion {
        target: FormatTag,
        columns: Vec<String>,
    },

    #[error(
        "column '{column}' has {distinct} distinct values; a chart category axis allows at most {limit}"
    )]
    TooManyCategories {
        column: String,
        distinct: usize,
        limit: usize,
    },

    #[error("read cancelled by caller")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub fn format(format: FormatTag, message: impl Into<String>) -> Self {
        EngineError::Format {
            format,
            message: message.into(),
        }
    }

    pub fn shape(reason: impl Into<String>, fields: Vec<String>) -> Self {
        EngineError::UnsupportedShape {
            reason: reason.into(),
            fields,
        }
    }

    pub fn invalid_spec(reason: impl Into<String>, fields: Vec<String>) -> Self {
        EngineError::InvalidSpec {
            reason: reason.into(),
            fields,
        }
    }

    /// Stable error code reported to the request layer.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Format { .. } => "FormatError",
            EngineError::SizeLimit { .. } => "SizeLimitError",
            EngineError::UnsupportedShape { .. } => "UnsupportedShapeError",
            EngineError::InvalidSpec { .. } => "InvalidSpecError",
            EngineError::LossyConversion { .. } => "LossyConversionError",
            EngineError::TooManyCategories { .. } => "TooManyCategoriesError",
            EngineError::Cancelled => "Cancelled",
            EngineError::Io(_) => "IoError",
        }
    }

    /// Column or field names the error refers to.
    pub fn fields(&self) -> Vec<String> {
        match self {
            EngineError::UnsupportedShape { fields, .. } | EngineError::InvalidSpec { fields, .. } => {
                fields.clone()
            }
            EngineError::LossyConversion { columns, .. } => columns.clone(),
            EngineError::TooManyCategories { column, .. } => vec![column.clone()],
            _ => Vec::new(),
        }
    }
}
