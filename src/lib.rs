pub mod chart;
pub mod cli;
pub mod config;
pub mod convert;
pub mod data;
pub mod error;
pub mod format;
pub mod frequency;
pub mod infer;
pub mod io_utils;
pub mod pivot;
pub mod preview;
pub mod schema;
pub mod stats;
pub mod tools;

use std::{env, sync::OnceLock};

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use log::{LevelFilter, debug, info};

use crate::{
    chart::ChartIntent,
    cli::{Cli, Commands},
    error::EngineError,
    pivot::PivotSpec,
    tools::{AnalyzeOptions, AnalyzeOutput, ToolContext, ToolInput, ToolResponse},
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("tabular_insight", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Analyze(args) => handle_analyze(&args),
        Commands::Preview(args) => handle_preview(&args),
        Commands::Pivot(args) => handle_pivot(&args),
        Commands::Convert(args) => handle_convert(&args),
        Commands::Chart(args) => handle_chart(&args),
    }
}

fn handle_analyze(args: &cli::AnalyzeArgs) -> Result<()> {
    let mut config = args.input.engine_config()?;
    if let Some(top_k) = args.top_k {
        config.stats.top_k = top_k;
    }
    let ctx = ToolContext::new(config);
    let options = AnalyzeOptions {
        include_sample: !args.no_sample,
        preview_on_limit: args.preview_on_limit,
    };
    info!("Analyzing {:?}", args.input.input);
    let result = tools::analyze_dataset(
        &ctx,
        &ToolInput::path(&args.input.input),
        args.input.format,
        &options,
    );
    respond(result, |output| match output {
        AnalyzeOutput::Full(analysis) => format!(
            "Analyzed {} row(s) across {} column(s)",
            analysis.rows,
            analysis.schema.len()
        ),
        AnalyzeOutput::Preview(preview) => format!(
            "Input has {} row(s), above the ceiling of {}; showing a preview",
            preview.total_rows, preview.row_ceiling
        ),
    })
}

fn handle_preview(args: &cli::PreviewArgs) -> Result<()> {
    let mut config = args.input.engine_config()?;
    if let Some(rows) = args.rows {
        config.limits.preview_rows = rows;
    }
    let ctx = ToolContext::new(config);
    let result = tools::preview_dataset(&ctx, &ToolInput::path(&args.input.input), args.input.format);
    respond(result, |preview| {
        format!(
            "Showing {} of {} row(s)",
            preview.head.len(),
            preview.total_rows
        )
    })
}

fn handle_pivot(args: &cli::PivotArgs) -> Result<()> {
    let ctx = ToolContext::new(args.input.engine_config()?);
    let spec = PivotSpec {
        rows: trimmed(&args.rows),
        columns: trimmed(&args.columns),
        values: args.values.clone(),
        fill_value: args.fill_value,
    };
    debug!("Pivot spec: {spec:?}");
    let result = tools::build_pivot(
        &ctx,
        &ToolInput::path(&args.input.input),
        args.input.format,
        &spec,
    );
    respond(result, |pivot| {
        format!(
            "Pivot produced {} row(s) with {} output column(s)",
            pivot.rows.len(),
            pivot.labels.len()
        )
    })
}

fn handle_convert(args: &cli::ConvertArgs) -> Result<()> {
    let ctx = ToolContext::new(args.input.engine_config()?);
    let to_stdout = io_utils::is_dash(&args.output);
    let result = tools::convert_format(
        &ctx,
        &ToolInput::path(&args.input.input),
        args.input.format,
        args.to,
        args.fidelity,
    );
    let (conversion, report) = match result {
        Ok(pair) => pair,
        Err(err) => return fail(err, to_stdout),
    };
    io_utils::write_output(&args.output, &conversion.bytes)
        .with_context(|| format!("Writing converted output to {:?}", args.output))?;
    let message = format!(
        "Wrote {} row(s) as {} to {:?}",
        report.rows, report.target, args.output
    );
    let response = ToolResponse::success(&report, message);
    if to_stdout {
        info!("{}", render(&response)?);
    } else {
        println!("{}", render(&response)?);
    }
    Ok(())
}

fn handle_chart(args: &cli::ChartArgs) -> Result<()> {
    let mut config = args.input.engine_config()?;
    if let Some(sample_rows) = args.sample_rows {
        config.chart.sample_rows = sample_rows;
    }
    if let Some(max_categories) = args.max_categories {
        config.chart.max_categories = max_categories;
    }
    let ctx = ToolContext::new(config);
    let intent = ChartIntent {
        kind: Some(args.kind),
        x: Some(args.x.clone()),
        y: args.y.clone(),
        series: args.series.clone(),
        title: args.title.clone(),
    };
    let result = tools::build_chart_spec(
        &ctx,
        &ToolInput::path(&args.input.input),
        args.input.format,
        &intent,
    );
    respond(result, |spec| {
        format!(
            "Built {} chart spec with {} of {} row(s)",
            spec.kind,
            spec.data.len(),
            spec.total_rows
        )
    })
}

/// Prints the envelope to stdout; a failed operation also fails the process.
fn respond<T, F>(result: error::EngineResult<T>, message: F) -> Result<()>
where
    T: serde::Serialize,
    F: FnOnce(&T) -> String,
{
    let response = ToolResponse::from_result(result, message);
    println!("{}", render(&response)?);
    match response {
        ToolResponse::Success { .. } => Ok(()),
        ToolResponse::Failure { error, .. } => Err(anyhow!(error)),
    }
}

fn fail(err: EngineError, stdout_reserved: bool) -> Result<()> {
    let response = ToolResponse::failure(&err);
    if stdout_reserved {
        log::error!("{}", render(&response)?);
    } else {
        println!("{}", render(&response)?);
    }
    Err(anyhow!(err))
}

fn render(response: &ToolResponse) -> Result<String> {
    serde_json::to_string_pretty(response).context("Serializing tool response")
}

fn trimmed(values: &[String]) -> Vec<String> {
    values
        .iter()
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .collect()
}
