mod common;

use proptest::prelude::*;
use tabular_insight::{
    config::{InferenceOptions, StatsOptions},
    data::{Cell, Column, Dataset},
    format::{FormatAdapter, columnar::ColumnarAdapter},
    infer,
    schema::ColumnType,
    stats::{self, ColumnStats},
    tools::{self, AnalyzeOptions, AnalyzeOutput, ToolContext, ToolInput},
};

use common::{PEOPLE_CSV, TestWorkspace, annotated_csv};

fn full(output: AnalyzeOutput) -> tools::Analysis {
    match output {
        AnalyzeOutput::Full(analysis) => analysis,
        AnalyzeOutput::Preview(_) => panic!("expected a full analysis"),
    }
}

#[test]
fn people_scenario_types_and_summarizes_age() {
    let workspace = TestWorkspace::new();
    let path = workspace.write("people.csv", PEOPLE_CSV);
    let analysis = full(
        tools::analyze_dataset(
            &ToolContext::default(),
            &ToolInput::path(&path),
            None,
            &AnalyzeOptions::default(),
        )
        .expect("analyze"),
    );

    let age_type = analysis
        .schema
        .iter()
        .find(|entry| entry.name == "age")
        .and_then(|entry| entry.column_type);
    assert_eq!(age_type, Some(ColumnType::NumericDiscrete));

    let ColumnStats::Numeric(age) = &analysis.stats["age"] else {
        panic!("age should have numeric stats");
    };
    assert_eq!(age.count, 2);
    assert_eq!(age.missing, 1);
    assert_eq!(age.mean, Some(27.5));
    assert_eq!(age.min, Some(25.0));
    assert_eq!(age.max, Some(30.0));

    let json = serde_json::to_value(&analysis).unwrap();
    assert_eq!(json["schema"][1]["type"], "numeric-discrete");
    assert_eq!(json["stats"]["name"]["kind"], "label");
    assert_eq!(json["sample"]["head"][1]["age"], serde_json::Value::Null);
}

#[test]
fn all_absent_numeric_column_reports_null_aggregates() {
    let score = Column::new("score", vec![Cell::Absent, Cell::Absent])
        .with_native_type(ColumnType::NumericContinuous);
    let label = Column::new("who", vec![Cell::text("a"), Cell::text("b")]);
    let parquet = ColumnarAdapter
        .write(&Dataset::new(vec![label, score]).unwrap())
        .expect("write parquet");

    let analysis = full(
        tools::analyze_dataset(
            &ToolContext::default(),
            &ToolInput::bytes(parquet, Some("scores.parquet")),
            None,
            &AnalyzeOptions::default(),
        )
        .expect("analyze parquet"),
    );
    let json = serde_json::to_value(&analysis.stats["score"]).unwrap();
    assert_eq!(json["kind"], "numeric");
    assert_eq!(json["count"], 0);
    assert_eq!(json["missing"], 2);
    for field in ["mean", "std_dev", "min", "q1", "median", "q3", "max"] {
        assert!(json[field].is_null(), "{field} should be null");
    }
}

#[test]
fn zero_row_dataset_summarizes_cleanly() {
    let dataset = annotated_csv("region,sales\n");
    assert_eq!(dataset.row_count(), 0);
    let summary = stats::summarize(&dataset, &StatsOptions::default()).expect("summarize");
    assert_eq!(summary.len(), 2);
    for stats in summary.values() {
        let json = serde_json::to_value(stats).unwrap();
        assert_eq!(json["count"], 0);
    }
}

fn csv_from(rows: &[(Option<String>, Option<i64>)]) -> String {
    let mut text = String::from("label,value\n");
    for (label, value) in rows {
        text.push_str(label.as_deref().unwrap_or(""));
        text.push(',');
        if let Some(value) = value {
            text.push_str(&value.to_string());
        }
        text.push('\n');
    }
    text
}

fn row_strategy() -> impl Strategy<Value = (Option<String>, Option<i64>)> {
    (
        proptest::option::of(prop::sample::select(vec!["north", "south", "east", "west"]))
            .prop_map(|label| label.map(str::to_string)),
        proptest::option::of(-500i64..500),
    )
}

proptest! {
    #[test]
    fn inference_and_summaries_are_deterministic(rows in prop::collection::vec(row_strategy(), 0..40)) {
        let text = csv_from(&rows);
        let first = annotated_csv(&text);
        let second = annotated_csv(&text);
        prop_assert_eq!(&first, &second);

        let options = StatsOptions::default();
        let a = stats::summarize(&first, &options).unwrap();
        let b = stats::summarize(&second, &options).unwrap();
        prop_assert_eq!(a, b);
    }

    #[test]
    fn annotation_covers_every_column(rows in prop::collection::vec(row_strategy(), 0..40)) {
        let dataset = annotated_csv(&csv_from(&rows));
        prop_assert!(dataset.is_annotated());
        let again = infer::infer(dataset.clone(), &InferenceOptions::default());
        prop_assert_eq!(again, dataset);
    }
}
