mod common;

use proptest::prelude::*;
use tabular_insight::{
    config::InferenceOptions,
    convert::{self, Coercion, ConversionRequest, Fidelity},
    data::{Cell, Column, Dataset, parse_temporal},
    format::{
        FormatAdapter, FormatTag, ReadOptions, columnar::ColumnarAdapter,
        delimited::DelimitedAdapter, spreadsheet::SpreadsheetAdapter,
    },
    schema::ColumnType,
    tools::{self, ToolContext, ToolInput},
};

use common::{PEOPLE_CSV, TestWorkspace};

const MIXED_CSV: &str = "name,age,active\nAlice,30,true\nBob,,false\nCara,25.5,\n";

fn orders_workbook() -> Vec<u8> {
    let shipped = ["2024-03-01", "2024-03-04", "2024-03-09"]
        .iter()
        .map(|value| Cell::Date(parse_temporal(value).unwrap()))
        .collect();
    let dataset = Dataset::new(vec![
        Column::new(
            "order",
            vec![Cell::text("A-1"), Cell::text("A-2"), Cell::text("A-3")],
        ),
        Column::new("shipped", shipped),
    ])
    .unwrap();
    SpreadsheetAdapter.write(&dataset).expect("write workbook")
}

fn through(bytes: &[u8], source: FormatTag, target: FormatTag) -> Vec<u8> {
    let request = ConversionRequest {
        source,
        target,
        fidelity: Fidelity::Strict,
    };
    convert::convert(
        bytes,
        &request,
        &ReadOptions::default(),
        &InferenceOptions::default(),
    )
    .unwrap_or_else(|err| panic!("{source} -> {target}: {err}"))
    .bytes
}

fn read_csv(bytes: &[u8]) -> Dataset {
    DelimitedAdapter
        .read(bytes, &ReadOptions::default())
        .expect("read csv")
}

#[test]
fn strict_conversion_of_dates_to_delimited_text_names_the_column() {
    let input = ToolInput::bytes(orders_workbook(), Some("orders.xlsx"));
    let err = tools::convert_format(
        &ToolContext::default(),
        &input,
        None,
        FormatTag::DelimitedText,
        Fidelity::Strict,
    )
    .unwrap_err();
    assert_eq!(err.kind(), "LossyConversionError");
    assert_eq!(err.fields(), vec!["shipped"]);
}

#[test]
fn lenient_conversion_records_each_coercion() {
    let input = ToolInput::bytes(orders_workbook(), Some("orders.xlsx"));
    let (conversion, report) = tools::convert_format(
        &ToolContext::default(),
        &input,
        None,
        FormatTag::DelimitedText,
        Fidelity::Lenient,
    )
    .expect("lenient conversion");
    assert_eq!(report.source, FormatTag::Spreadsheet);
    assert_eq!(report.rows, 3);
    assert_eq!(
        report.coercions,
        vec![Coercion {
            column: "shipped".to_string(),
            original: ColumnType::Temporal,
            coerced: ColumnType::FreeText,
        }]
    );
    let text = String::from_utf8(conversion.bytes).unwrap();
    assert!(text.contains("\"A-2\",\"2024-03-04\""));
}

#[test]
fn representable_conversion_reports_no_coercions() {
    let workspace = TestWorkspace::new();
    let path = workspace.write("people.csv", PEOPLE_CSV);
    let (conversion, report) = tools::convert_format(
        &ToolContext::default(),
        &ToolInput::path(&path),
        None,
        FormatTag::Columnar,
        Fidelity::Strict,
    )
    .expect("convert to parquet");
    assert!(report.coercions.is_empty());
    assert_eq!(report.bytes, conversion.bytes.len());
    assert_eq!(FormatTag::sniff(&conversion.bytes), FormatTag::Columnar);
}

#[test]
fn delimited_text_survives_every_target_format() {
    let original = read_csv(MIXED_CSV.as_bytes());
    for target in [
        FormatTag::Columnar,
        FormatTag::Spreadsheet,
        FormatTag::StructuredRecord,
    ] {
        let encoded = through(MIXED_CSV.as_bytes(), FormatTag::DelimitedText, target);
        let back = through(&encoded, target, FormatTag::DelimitedText);
        assert_eq!(read_csv(&back), original, "round trip through {target}");
    }
}

#[test]
fn leading_zeros_and_yes_no_tokens_survive_typed_formats() {
    let text = "zip_code,ok\n0150,yes\n0150,no\n5003,yes\n";
    let original = read_csv(text.as_bytes());
    for target in [
        FormatTag::Columnar,
        FormatTag::Spreadsheet,
        FormatTag::StructuredRecord,
    ] {
        let encoded = through(text.as_bytes(), FormatTag::DelimitedText, target);
        let back = through(&encoded, target, FormatTag::DelimitedText);
        let dataset = read_csv(&back);
        assert_eq!(dataset, original, "round trip through {target}");
        assert_eq!(
            dataset.column("zip_code").unwrap().cells()[0],
            Cell::text("0150")
        );
        assert_eq!(dataset.column("ok").unwrap().cells()[1], Cell::text("no"));
    }
}

#[test]
fn canonical_numbers_still_store_natively() {
    let parquet = through(
        b"zip_code,amount\n0150,10\n5003,2.5\n",
        FormatTag::DelimitedText,
        FormatTag::Columnar,
    );
    let dataset = ColumnarAdapter
        .read(&parquet, &ReadOptions::default())
        .expect("read parquet");
    assert_eq!(
        dataset.column("zip_code").unwrap().native_type(),
        Some(ColumnType::FreeText)
    );
    assert_eq!(
        dataset.column("amount").unwrap().cells(),
        &[Cell::Number(10.0), Cell::Number(2.5)]
    );
}

#[test]
fn dates_survive_spreadsheet_and_columnar_round_trips() {
    let workbook = orders_workbook();
    let parquet = through(&workbook, FormatTag::Spreadsheet, FormatTag::Columnar);
    let again = through(&parquet, FormatTag::Columnar, FormatTag::Spreadsheet);
    let dataset = SpreadsheetAdapter
        .read(&again, &ReadOptions::default())
        .expect("read workbook");
    assert_eq!(
        dataset.column("shipped").unwrap().cells()[2],
        Cell::Date(parse_temporal("2024-03-09").unwrap())
    );

    let columnar = ColumnarAdapter
        .read(&parquet, &ReadOptions::default())
        .expect("read parquet");
    assert_eq!(
        columnar.column("shipped").unwrap().native_type(),
        Some(ColumnType::Temporal)
    );
}

#[test]
fn header_only_input_keeps_its_columns() {
    let parquet = through(b"region,sales\n", FormatTag::DelimitedText, FormatTag::Columnar);
    let back = through(&parquet, FormatTag::Columnar, FormatTag::DelimitedText);
    assert_eq!(back, b"\"region\",\"sales\"\n");
}

fn table_text(rows: &[(Option<&'static str>, Option<i32>)]) -> String {
    let mut text = String::from("label,value\n");
    for (label, value) in rows {
        let value = value.map(|v| v.to_string()).unwrap_or_default();
        text.push_str(&format!("{},{value}\n", label.unwrap_or("")));
    }
    text
}

fn table_rows() -> impl Strategy<Value = Vec<(Option<&'static str>, Option<i32>)>> {
    prop::collection::vec(
        (
            proptest::option::of(prop::sample::select(vec!["alpha", "beta", "gamma"])),
            proptest::option::of(-10_000i32..10_000),
        ),
        1..30,
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn representable_tables_round_trip(rows in table_rows()) {
        let text = table_text(&rows);
        let original = read_csv(text.as_bytes());
        for target in [FormatTag::Columnar, FormatTag::StructuredRecord] {
            let encoded = through(text.as_bytes(), FormatTag::DelimitedText, target);
            let back = through(&encoded, target, FormatTag::DelimitedText);
            prop_assert_eq!(read_csv(&back), original.clone());
        }
    }
}
