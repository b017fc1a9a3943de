//! Callable tool operations and the response envelope around them.
//!
//! Each operation is independent: it sources bytes, reads them through the
//! matching adapter, annotates the dataset and hands it to one component.
//! Nothing is cached between calls.

use std::{
    borrow::Cow,
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use chrono::{SecondsFormat, Utc};
use log::info;
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::{
    chart::{self, ChartIntent, ChartSpec},
    config::EngineConfig,
    convert::{self, Coercion, Conversion, ConversionRequest, Fidelity},
    data::Dataset,
    error::{EngineError, EngineResult, LimitUnit},
    format::{FormatTag, ReadOptions, adapter_for},
    infer, io_utils,
    io_utils::CancelFlag,
    pivot::{self, PivotResult, PivotSpec},
    preview::{Preview, Sample},
    schema::{self, SchemaEntry},
    stats::{self, ColumnStats},
};

/// Where a tool reads its data from. A path of `-` means stdin.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolInput {
    Path(PathBuf),
    Bytes { bytes: Vec<u8>, name: Option<String> },
}

impl ToolInput {
    pub fn path(path: impl Into<PathBuf>) -> Self {
        ToolInput::Path(path.into())
    }

    pub fn bytes(bytes: impl Into<Vec<u8>>, name: Option<&str>) -> Self {
        ToolInput::Bytes {
            bytes: bytes.into(),
            name: name.map(str::to_string),
        }
    }

    /// Path-like name used for extension-based format and delimiter hints.
    fn name_hint(&self) -> Option<&Path> {
        match self {
            ToolInput::Path(path) if !io_utils::is_dash(path) => Some(path.as_path()),
            ToolInput::Path(_) => None,
            ToolInput::Bytes { name, .. } => name.as_deref().map(Path::new),
        }
    }

    fn load(&self, max_bytes: u64) -> EngineResult<Cow<'_, [u8]>> {
        match self {
            ToolInput::Path(path) => Ok(Cow::Owned(io_utils::read_path(path, max_bytes)?)),
            ToolInput::Bytes { bytes, .. } => {
                io_utils::ensure_byte_ceiling(bytes.len(), max_bytes)?;
                Ok(Cow::Borrowed(bytes))
            }
        }
    }
}

/// Configuration plus the cancellation switch shared with the caller.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    pub config: EngineConfig,
    cancel: CancelFlag,
}

impl ToolContext {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            cancel: CancelFlag::new(),
        }
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    fn read_options(&self, input: &ToolInput) -> EngineResult<ReadOptions> {
        let mut options = ReadOptions::from_settings(&self.config.read, &self.config.limits)?
            .with_cancel(self.cancel.clone());
        options.delimiter = io_utils::resolve_input_delimiter(input.name_hint(), options.delimiter);
        Ok(options)
    }
}

struct Loaded<'a> {
    format: FormatTag,
    bytes: Cow<'a, [u8]>,
    options: ReadOptions,
}

fn load<'a>(
    ctx: &ToolContext,
    input: &'a ToolInput,
    format_hint: Option<FormatTag>,
) -> EngineResult<Loaded<'a>> {
    let bytes = input.load(ctx.config.limits.max_bytes)?;
    let format = FormatTag::resolve(format_hint, input.name_hint(), &bytes);
    let options = ctx.read_options(input)?;
    Ok(Loaded {
        format,
        bytes,
        options,
    })
}

fn read_annotated(
    ctx: &ToolContext,
    input: &ToolInput,
    format_hint: Option<FormatTag>,
) -> EngineResult<(FormatTag, Dataset)> {
    let loaded = load(ctx, input, format_hint)?;
    let dataset = adapter_for(loaded.format).read(&loaded.bytes, &loaded.options)?;
    Ok((loaded.format, infer::infer(dataset, &ctx.config.inference)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalyzeOptions {
    /// Attach the first and last `preview_rows` rows.
    pub include_sample: bool,
    /// Answer with a [`Preview`] instead of failing when the row ceiling is hit.
    pub preview_on_limit: bool,
}

impl Default for AnalyzeOptions {
    fn default() -> Self {
        Self {
            include_sample: true,
            preview_on_limit: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Analysis {
    pub format: FormatTag,
    pub rows: usize,
    pub schema: Vec<SchemaEntry>,
    pub stats: BTreeMap<String, ColumnStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample: Option<Sample>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum AnalyzeOutput {
    Full(Analysis),
    Preview(Preview),
}

pub fn analyze_dataset(
    ctx: &ToolContext,
    input: &ToolInput,
    format_hint: Option<FormatTag>,
    options: &AnalyzeOptions,
) -> EngineResult<AnalyzeOutput> {
    let loaded = load(ctx, input, format_hint)?;
    let adapter = adapter_for(loaded.format);
    let dataset = match adapter.read(&loaded.bytes, &loaded.options) {
        Ok(dataset) => dataset,
        Err(EngineError::SizeLimit {
            unit: LimitUnit::Rows,
            limit,
        }) if options.preview_on_limit => {
            info!("Row ceiling of {limit} exceeded; answering with a preview");
            let preview =
                adapter.preview(&loaded.bytes, &loaded.options, ctx.config.limits.preview_rows)?;
            return Ok(AnalyzeOutput::Preview(preview));
        }
        Err(err) => return Err(err),
    };
    let dataset = infer::infer(dataset, &ctx.config.inference);
    let stats = stats::summarize(&dataset, &ctx.config.stats)?;
    let sample = options
        .include_sample
        .then(|| Sample::from_dataset(&dataset, ctx.config.limits.preview_rows));
    info!(
        "Analyzed {} row(s) across {} column(s) from {} input",
        dataset.row_count(),
        dataset.columns().len(),
        loaded.format
    );
    Ok(AnalyzeOutput::Full(Analysis {
        format: loaded.format,
        rows: dataset.row_count(),
        schema: schema::describe(&dataset),
        stats,
        sample,
    }))
}

pub fn build_pivot(
    ctx: &ToolContext,
    input: &ToolInput,
    format_hint: Option<FormatTag>,
    spec: &PivotSpec,
) -> EngineResult<PivotResult> {
    let (_, dataset) = read_annotated(ctx, input, format_hint)?;
    let result = pivot::pivot(&dataset, spec)?;
    info!(
        "Pivoted {} row(s) into {} group(s)",
        dataset.row_count(),
        result.rows.len()
    );
    Ok(result)
}

/// What a conversion produced, without the encoded bytes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversionReport {
    pub source: FormatTag,
    pub target: FormatTag,
    pub fidelity: Fidelity,
    pub rows: usize,
    pub bytes: usize,
    pub coercions: Vec<Coercion>,
}

pub fn convert_format(
    ctx: &ToolContext,
    input: &ToolInput,
    source: Option<FormatTag>,
    target: FormatTag,
    fidelity: Fidelity,
) -> EngineResult<(Conversion, ConversionReport)> {
    let loaded = load(ctx, input, source)?;
    let request = ConversionRequest {
        source: loaded.format,
        target,
        fidelity,
    };
    let conversion = convert::convert(
        &loaded.bytes,
        &request,
        &loaded.options,
        &ctx.config.inference,
    )?;
    info!(
        "Converted {} row(s) from {} to {} with {} coercion(s)",
        conversion.rows,
        request.source,
        request.target,
        conversion.coercions.len()
    );
    let report = ConversionReport {
        source: request.source,
        target,
        fidelity,
        rows: conversion.rows,
        bytes: conversion.bytes.len(),
        coercions: conversion.coercions.clone(),
    };
    Ok((conversion, report))
}

pub fn build_chart_spec(
    ctx: &ToolContext,
    input: &ToolInput,
    format_hint: Option<FormatTag>,
    intent: &ChartIntent,
) -> EngineResult<ChartSpec> {
    let (_, dataset) = read_annotated(ctx, input, format_hint)?;
    let spec = chart::build(&dataset, intent, &ctx.config.chart)?;
    info!(
        "Built {} chart spec embedding {} of {} row(s)",
        spec.kind,
        spec.data.len(),
        spec.total_rows
    );
    Ok(spec)
}

pub fn preview_dataset(
    ctx: &ToolContext,
    input: &ToolInput,
    format_hint: Option<FormatTag>,
) -> EngineResult<Preview> {
    let loaded = load(ctx, input, format_hint)?;
    let preview = adapter_for(loaded.format).preview(
        &loaded.bytes,
        &loaded.options,
        ctx.config.limits.preview_rows,
    )?;
    info!(
        "Previewed {} of {} row(s)",
        preview.head.len(),
        preview.total_rows
    );
    Ok(preview)
}

/// Uniform reply shape for every tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ToolResponse {
    Success {
        success: bool,
        data: JsonValue,
        message: String,
        timestamp: String,
    },
    Failure {
        success: bool,
        error: String,
        kind: String,
        fields: Vec<String>,
        timestamp: String,
    },
}

impl ToolResponse {
    pub fn success<T: Serialize>(data: &T, message: impl Into<String>) -> Self {
        match serde_json::to_value(data) {
            Ok(data) => ToolResponse::Success {
                success: true,
                data,
                message: message.into(),
                timestamp: timestamp(),
            },
            Err(err) => ToolResponse::Failure {
                success: false,
                error: format!("failed to serialize response: {err}"),
                kind: "SerializationError".to_string(),
                fields: Vec::new(),
                timestamp: timestamp(),
            },
        }
    }

    pub fn failure(err: &EngineError) -> Self {
        ToolResponse::Failure {
            success: false,
            error: err.to_string(),
            kind: err.kind().to_string(),
            fields: err.fields(),
            timestamp: timestamp(),
        }
    }

    pub fn from_result<T, F>(result: EngineResult<T>, message: F) -> Self
    where
        T: Serialize,
        F: FnOnce(&T) -> String,
    {
        match result {
            Ok(data) => {
                let message = message(&data);
                ToolResponse::success(&data, message)
            }
            Err(err) => ToolResponse::failure(&err),
        }
    }
}

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SizeLimits;

    const PEOPLE: &str = "name,age\nAlice,30\nBob,\nCara,25\n";

    #[test]
    fn analyze_reports_schema_and_stats() {
        let ctx = ToolContext::default();
        let input = ToolInput::bytes(PEOPLE, Some("people.csv"));
        let AnalyzeOutput::Full(analysis) =
            analyze_dataset(&ctx, &input, None, &AnalyzeOptions::default()).unwrap()
        else {
            panic!("expected a full analysis");
        };
        assert_eq!(analysis.rows, 3);
        assert_eq!(analysis.format, FormatTag::DelimitedText);
        let ColumnStats::Numeric(age) = &analysis.stats["age"] else {
            panic!("age should be numeric");
        };
        assert_eq!(age.missing, 1);
        assert_eq!(age.mean, Some(27.5));
        assert_eq!(analysis.sample.as_ref().map(|s| s.head.len()), Some(3));
    }

    #[test]
    fn analyze_falls_back_to_preview_over_row_ceiling() {
        let config = EngineConfig {
            limits: SizeLimits {
                max_rows: 2,
                preview_rows: 1,
                ..SizeLimits::default()
            },
            ..EngineConfig::default()
        };
        let ctx = ToolContext::new(config);
        let input = ToolInput::bytes(PEOPLE, None);
        let strict = analyze_dataset(&ctx, &input, None, &AnalyzeOptions::default());
        assert_eq!(strict.unwrap_err().kind(), "SizeLimitError");

        let options = AnalyzeOptions {
            preview_on_limit: true,
            ..AnalyzeOptions::default()
        };
        let AnalyzeOutput::Preview(preview) = analyze_dataset(&ctx, &input, None, &options).unwrap()
        else {
            panic!("expected a preview");
        };
        assert_eq!(preview.total_rows, 3);
        assert_eq!(preview.head.len(), 1);
        assert!(preview.exceeds_ceiling);
    }

    #[test]
    fn byte_ceiling_applies_to_in_memory_input() {
        let config = EngineConfig {
            limits: SizeLimits {
                max_bytes: 8,
                ..SizeLimits::default()
            },
            ..EngineConfig::default()
        };
        let err = preview_dataset(&ToolContext::new(config), &ToolInput::bytes(PEOPLE, None), None)
            .unwrap_err();
        assert_eq!(err.kind(), "SizeLimitError");
    }

    #[test]
    fn cancelled_context_stops_reads() {
        let ctx = ToolContext::default();
        ctx.cancel_flag().cancel();
        let err = build_pivot(
            &ctx,
            &ToolInput::bytes(PEOPLE, None),
            None,
            &PivotSpec::default(),
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::Cancelled));
    }

    #[test]
    fn envelope_shapes() {
        let ok = ToolResponse::success(&vec![1, 2], "two values");
        let json = serde_json::to_value(&ok).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["message"], "two values");
        assert!(json["timestamp"].as_str().unwrap().ends_with('Z'));

        let err = EngineError::invalid_spec("bad", vec!["x".into()]);
        let json = serde_json::to_value(ToolResponse::failure(&err)).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["kind"], "InvalidSpecError");
        assert_eq!(json["fields"][0], "x");
    }
}
