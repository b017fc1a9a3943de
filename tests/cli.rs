mod common;

use std::fs;

use assert_cmd::Command;
use predicates::str::contains;
use serde_json::Value as JsonValue;

use common::{PEOPLE_CSV, SALES_CSV, TestWorkspace};

const SHIPMENTS_CSV: &str = "order,shipped\nA-1,2024-03-01\nA-2,2024-03-04\nA-3,2024-03-09\n";

fn binary() -> Command {
    Command::cargo_bin("tabular-insight").expect("binary exists")
}

fn envelope(stdout: &[u8]) -> JsonValue {
    serde_json::from_slice(stdout).expect("stdout holds a JSON envelope")
}

#[test]
fn analyze_reports_types_and_statistics() {
    let workspace = TestWorkspace::new();
    let path = workspace.write("people.csv", PEOPLE_CSV);
    let output = binary()
        .args(["analyze", "-i", path.to_str().unwrap()])
        .assert()
        .success()
        .stdout(contains("numeric-discrete"))
        .get_output()
        .stdout
        .clone();

    let json = envelope(&output);
    assert_eq!(json["success"], true);
    assert_eq!(json["data"]["mode"], "full");
    assert_eq!(json["data"]["format"], "delimited-text");
    assert_eq!(json["data"]["stats"]["age"]["mean"], 27.5);
    assert_eq!(json["data"]["stats"]["age"]["missing"], 1);
    assert!(json["timestamp"].as_str().unwrap().ends_with('Z'));
}

#[test]
fn analyze_reads_stdin_and_applies_config_file() {
    let workspace = TestWorkspace::new();
    let config = workspace.write("engine.yaml", "stats:\n  top_k: 1\n");
    let output = binary()
        .args([
            "analyze",
            "-i",
            "-",
            "--config",
            config.to_str().unwrap(),
            "--no-sample",
        ])
        .write_stdin(SALES_CSV)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let json = envelope(&output);
    let region = &json["data"]["stats"]["region"];
    assert_eq!(region["top"].as_array().unwrap().len(), 1);
    assert_eq!(region["top"][0]["value"], "EU");
    assert_eq!(region["other"]["count"], 1);
    assert!(json["data"].get("sample").is_none());
}

#[test]
fn analyze_over_row_ceiling_fails_or_previews() {
    let workspace = TestWorkspace::new();
    let path = workspace.write("people.csv", PEOPLE_CSV);
    binary()
        .args(["analyze", "-i", path.to_str().unwrap(), "--max-rows", "2"])
        .assert()
        .failure()
        .stdout(contains("SizeLimitError"))
        .stderr(contains("error:"));

    let output = binary()
        .args([
            "analyze",
            "-i",
            path.to_str().unwrap(),
            "--max-rows",
            "2",
            "--preview-on-limit",
        ])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let json = envelope(&output);
    assert_eq!(json["data"]["mode"], "preview");
    assert_eq!(json["data"]["total_rows"], 3);
    assert_eq!(json["data"]["exceeds_ceiling"], true);
}

#[test]
fn preview_limits_head_rows() {
    let workspace = TestWorkspace::new();
    let path = workspace.write("sales.csv", SALES_CSV);
    let output = binary()
        .args(["preview", "-i", path.to_str().unwrap(), "--rows", "1"])
        .assert()
        .success()
        .stdout(contains("Showing 1 of 3 row(s)"))
        .get_output()
        .stdout
        .clone();
    let json = envelope(&output);
    assert_eq!(json["data"]["head"][0]["region"], "EU");
    assert_eq!(json["data"]["columns"][1], "sales");
}

#[test]
fn pivot_sums_sales_by_region() {
    let workspace = TestWorkspace::new();
    let path = workspace.write("sales.csv", SALES_CSV);
    let output = binary()
        .args([
            "pivot",
            "-i",
            path.to_str().unwrap(),
            "--rows",
            "region",
            "--value",
            "sales:sum",
        ])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let json = envelope(&output);
    assert_eq!(
        json["data"]["rows"],
        serde_json::json!([
            {"region": "EU", "sales_sum": 30},
            {"region": "US", "sales_sum": 5},
        ])
    );
}

#[test]
fn pivot_rejects_unknown_aggregation() {
    binary()
        .args(["pivot", "-i", "sales.csv", "--value", "sales:mode"])
        .assert()
        .failure()
        .stderr(contains("Unknown aggregation 'mode'"));
}

#[test]
fn convert_writes_parquet_that_analyzes_back() {
    let workspace = TestWorkspace::new();
    let input = workspace.write("people.csv", PEOPLE_CSV);
    let parquet = workspace.join("people.parquet");
    binary()
        .args([
            "convert",
            "-i",
            input.to_str().unwrap(),
            "-t",
            "parquet",
            "-o",
            parquet.to_str().unwrap(),
        ])
        .assert()
        .success()
        .stdout(contains("\"coercions\": []"));
    assert!(fs::metadata(&parquet).unwrap().len() > 0);

    binary()
        .args(["analyze", "-i", parquet.to_str().unwrap()])
        .assert()
        .success()
        .stdout(contains("\"format\": \"columnar\""))
        .stdout(contains("\"mean\": 27.5"));
}

#[test]
fn convert_to_stdout_emits_only_the_encoded_bytes() {
    let workspace = TestWorkspace::new();
    let input = workspace.write("sales.csv", SALES_CSV);
    binary()
        .args([
            "convert",
            "-i",
            input.to_str().unwrap(),
            "-t",
            "csv",
            "-o",
            "-",
        ])
        .assert()
        .success()
        .stdout("\"region\",\"sales\"\n\"EU\",\"10\"\n\"US\",\"5\"\n\"EU\",\"20\"\n");
}

#[test]
fn strict_convert_refuses_dates_and_lenient_coerces_them() {
    let workspace = TestWorkspace::new();
    let input = workspace.write("shipments.csv", SHIPMENTS_CSV);
    let strict = workspace.join("strict.json");
    binary()
        .args([
            "convert",
            "-i",
            input.to_str().unwrap(),
            "-t",
            "json",
            "-o",
            strict.to_str().unwrap(),
        ])
        .assert()
        .code(1)
        .stdout(contains("LossyConversionError"))
        .stdout(contains("shipped"));
    assert!(!strict.exists());

    let lenient = workspace.join("lenient.json");
    binary()
        .args([
            "convert",
            "-i",
            input.to_str().unwrap(),
            "-t",
            "json",
            "-o",
            lenient.to_str().unwrap(),
            "--fidelity",
            "lenient",
        ])
        .assert()
        .success()
        .stdout(contains("\"original\": \"temporal\""));
    let records: JsonValue =
        serde_json::from_str(&fs::read_to_string(&lenient).unwrap()).unwrap();
    assert_eq!(records[1]["shipped"], "2024-03-04");
}

#[test]
fn chart_builds_bar_spec() {
    let workspace = TestWorkspace::new();
    let path = workspace.write("sales.csv", SALES_CSV);
    let output = binary()
        .args([
            "chart",
            "-i",
            path.to_str().unwrap(),
            "-k",
            "bar",
            "--x",
            "region",
            "--y",
            "sales",
        ])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let json = envelope(&output);
    assert_eq!(json["data"]["kind"], "bar");
    assert_eq!(json["data"]["bindings"][0]["role"], "x");
    assert_eq!(json["data"]["total_rows"], 3);
}

#[test]
fn chart_over_category_limit_fails() {
    let workspace = TestWorkspace::new();
    let path = workspace.write("sales.csv", SALES_CSV);
    binary()
        .args([
            "chart",
            "-i",
            path.to_str().unwrap(),
            "-k",
            "bar",
            "--x",
            "region",
            "--y",
            "sales",
            "--max-categories",
            "1",
        ])
        .assert()
        .failure()
        .stdout(contains("TooManyCategoriesError"));
}
