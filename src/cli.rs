use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use crate::{
    chart::ChartKind,
    config::EngineConfig,
    convert::Fidelity,
    format::FormatTag,
    pivot::{Aggregation, ValueSpec},
};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Analyze, pivot, convert and chart tabular data files",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Infer column types and summarize every column
    Analyze(AnalyzeArgs),
    /// Show the first rows and the true row count without loading a dataset
    Preview(PreviewArgs),
    /// Group rows and aggregate value columns
    Pivot(PivotArgs),
    /// Re-encode a file in another format, checking for lossy columns
    Convert(ConvertArgs),
    /// Build a chart specification from column bindings
    Chart(ChartArgs),
}

/// Input selection and per-call overrides shared by every subcommand.
#[derive(Debug, Args)]
pub struct InputArgs {
    /// Input file (`-` reads stdin)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Input format; taken from the extension or sniffed when omitted
    #[arg(short = 'f', long = "format", value_parser = parse_format)]
    pub format: Option<FormatTag>,
    /// YAML configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Byte ceiling for the input
    #[arg(long = "max-bytes")]
    pub max_bytes: Option<u64>,
    /// Row ceiling for the input
    #[arg(long = "max-rows")]
    pub max_rows: Option<usize>,
    /// Present cells sampled per column for type inference on large columns
    #[arg(long = "sample-size")]
    pub sample_size: Option<usize>,
    /// Zero-based worksheet index for spreadsheet input
    #[arg(long)]
    pub sheet: Option<usize>,
    /// Delimiter for delimited text (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of delimited text input (defaults to utf-8)
    #[arg(long = "encoding")]
    pub encoding: Option<String>,
}

impl InputArgs {
    /// Loads `--config` when given, then applies the per-call flags.
    pub fn engine_config(&self) -> Result<EngineConfig> {
        let mut config = match &self.config {
            Some(path) => EngineConfig::load(path)
                .with_context(|| format!("Loading configuration from {path:?}"))?,
            None => EngineConfig::default(),
        };
        if let Some(max_bytes) = self.max_bytes {
            config.limits.max_bytes = max_bytes;
        }
        if let Some(max_rows) = self.max_rows {
            config.limits.max_rows = max_rows;
        }
        if let Some(sample_size) = self.sample_size {
            config.inference.sample_size = sample_size;
        }
        if let Some(sheet) = self.sheet {
            config.read.sheet = sheet;
        }
        if let Some(delimiter) = self.delimiter {
            config.read.delimiter = Some(delimiter as char);
        }
        if let Some(encoding) = &self.encoding {
            config.read.encoding = Some(encoding.clone());
        }
        Ok(config)
    }
}

#[derive(Debug, Args)]
pub struct AnalyzeArgs {
    #[command(flatten)]
    pub input: InputArgs,
    /// Omit the head/tail row sample from the analysis
    #[arg(long = "no-sample")]
    pub no_sample: bool,
    /// Answer with a preview instead of failing when the row ceiling is exceeded
    #[arg(long = "preview-on-limit")]
    pub preview_on_limit: bool,
    /// Entries kept in each frequency table
    #[arg(long = "top-k")]
    pub top_k: Option<usize>,
}

#[derive(Debug, Args)]
pub struct PreviewArgs {
    #[command(flatten)]
    pub input: InputArgs,
    /// Rows to show
    #[arg(long)]
    pub rows: Option<usize>,
}

#[derive(Debug, Args)]
pub struct PivotArgs {
    #[command(flatten)]
    pub input: InputArgs,
    /// Row-key columns, in grouping order
    #[arg(long = "rows", value_delimiter = ',')]
    pub rows: Vec<String>,
    /// Column-key columns spread across the output
    #[arg(long = "columns", value_delimiter = ',')]
    pub columns: Vec<String>,
    /// Value specifications of the form `column:aggregation`
    #[arg(long = "value", required = true, action = clap::ArgAction::Append, value_parser = parse_value_spec)]
    pub values: Vec<ValueSpec>,
    /// Number used for undefined aggregates
    #[arg(long = "fill-value")]
    pub fill_value: Option<f64>,
}

#[derive(Debug, Args)]
pub struct ConvertArgs {
    #[command(flatten)]
    pub input: InputArgs,
    /// Target format
    #[arg(short = 't', long = "to", value_parser = parse_format)]
    pub to: FormatTag,
    /// Destination file (`-` writes to stdout)
    #[arg(short = 'o', long = "output")]
    pub output: PathBuf,
    /// `strict` refuses lossy columns, `lenient` coerces them to text
    #[arg(long, default_value = "strict", value_parser = parse_fidelity)]
    pub fidelity: Fidelity,
}

#[derive(Debug, Args)]
pub struct ChartArgs {
    #[command(flatten)]
    pub input: InputArgs,
    /// Chart kind (bar, line, scatter, pie, histogram, box)
    #[arg(short = 'k', long = "kind", value_parser = parse_chart_kind)]
    pub kind: ChartKind,
    /// Column bound to the x (or label) axis
    #[arg(long)]
    pub x: String,
    /// Column bound to the y (or value) axis
    #[arg(long)]
    pub y: Option<String>,
    /// Column that splits the data into series
    #[arg(long)]
    pub series: Option<String>,
    /// Chart title
    #[arg(long)]
    pub title: Option<String>,
    /// Maximum rows embedded in the chart specification
    #[arg(long = "sample-rows")]
    pub sample_rows: Option<usize>,
    /// Maximum distinct values on a category axis
    #[arg(long = "max-categories")]
    pub max_categories: Option<usize>,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" | "\\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}

pub fn parse_format(value: &str) -> Result<FormatTag, String> {
    value.parse()
}

pub fn parse_chart_kind(value: &str) -> Result<ChartKind, String> {
    value.parse()
}

pub fn parse_fidelity(value: &str) -> Result<Fidelity, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "strict" => Ok(Fidelity::Strict),
        "lenient" => Ok(Fidelity::Lenient),
        other => Err(format!(
            "Unknown fidelity '{other}'. Use 'strict' or 'lenient'"
        )),
    }
}

/// Parses `column:aggregation`; the last `:` separates the aggregation so
/// column names may contain colons.
pub fn parse_value_spec(value: &str) -> Result<ValueSpec, String> {
    let (column, aggregation) = value
        .rsplit_once(':')
        .ok_or_else(|| format!("Value '{value}' must look like column:aggregation"))?;
    let column = column.trim();
    if column.is_empty() {
        return Err(format!("Value '{value}' is missing a column name"));
    }
    let aggregation = aggregation.parse::<Aggregation>()?;
    Ok(ValueSpec::new(column, aggregation))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_specs_split_on_last_colon() {
        assert_eq!(
            parse_value_spec("sales:sum"),
            Ok(ValueSpec::new("sales", Aggregation::Sum))
        );
        assert_eq!(
            parse_value_spec("ratio:a:mean"),
            Ok(ValueSpec::new("ratio:a", Aggregation::Mean))
        );
        assert!(parse_value_spec("sales").is_err());
        assert!(parse_value_spec(":sum").is_err());
        assert!(parse_value_spec("sales:mode").is_err());
    }

    #[test]
    fn delimiter_names_resolve() {
        assert_eq!(parse_delimiter("tab"), Ok(b'\t'));
        assert_eq!(parse_delimiter(";"), Ok(b';'));
        assert!(parse_delimiter("ab").is_err());
    }

    #[test]
    fn cli_parses_pivot_invocation() {
        let cli = Cli::try_parse_from([
            "tabular-insight",
            "pivot",
            "-i",
            "sales.csv",
            "--rows",
            "region,channel",
            "--value",
            "sales:sum",
            "--value",
            "sales:count",
        ])
        .expect("parse cli");
        let Commands::Pivot(args) = cli.command else {
            panic!("expected pivot");
        };
        assert_eq!(args.rows, vec!["region", "channel"]);
        assert_eq!(args.values.len(), 2);
        assert_eq!(args.input.engine_config().unwrap(), EngineConfig::default());
    }
}
