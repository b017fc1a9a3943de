use std::collections::{BTreeSet, HashMap};

use itertools::Itertools;
use log::debug;
use serde_json::{Map, Value as JsonValue};

use crate::{
    data::{Cell, Column, Dataset},
    error::{EngineError, EngineResult},
    format::{FormatAdapter, FormatTag, ReadOptions, physical_cells},
    io_utils,
    schema::ColumnType,
};

/// JSON records: an array of objects, or one object per line.
pub struct RecordsAdapter;

impl FormatAdapter for RecordsAdapter {
    fn tag(&self) -> FormatTag {
        FormatTag::StructuredRecord
    }

    fn read(&self, bytes: &[u8], options: &ReadOptions) -> EngineResult<Dataset> {
        let values = parse_values(bytes)?;
        debug!("Parsed {} JSON record(s)", values.len());

        let mut names: Vec<String> = Vec::new();
        let mut expected: BTreeSet<String> = BTreeSet::new();
        let mut columns: Vec<Vec<Cell>> = Vec::new();
        for (idx, value) in values.into_iter().enumerate() {
            options.cancel.check()?;
            io_utils::ensure_row_ceiling(idx + 1, options.max_rows)?;
            let flat = flatten(idx, value)?;
            if idx == 0 {
                names = flat.iter().map(|(name, _)| name.clone()).collect();
                let duplicates = names.iter().duplicates().cloned().collect::<Vec<_>>();
                if !duplicates.is_empty() {
                    return Err(EngineError::shape(
                        "flattened record has duplicate field names",
                        duplicates,
                    ));
                }
                expected = names.iter().cloned().collect();
                columns = flat.into_iter().map(|(_, cell)| vec![cell]).collect();
                continue;
            }

            let mut by_name = flat.into_iter().collect::<HashMap<_, _>>();
            let keys = by_name.keys().cloned().collect::<BTreeSet<_>>();
            if keys != expected {
                let differing = expected
                    .symmetric_difference(&keys)
                    .cloned()
                    .collect::<Vec<_>>();
                return Err(EngineError::shape(
                    format!("record {} has a different set of fields", idx + 1),
                    differing,
                ));
            }
            for (name, cells) in names.iter().zip(columns.iter_mut()) {
                cells.push(by_name.remove(name).unwrap_or(Cell::Absent));
            }
        }

        Dataset::new(
            names
                .into_iter()
                .zip(columns)
                .map(|(name, cells)| Column::new(name, cells))
                .collect(),
        )
    }

    fn write(&self, dataset: &Dataset) -> EngineResult<Vec<u8>> {
        let columns = dataset
            .columns()
            .iter()
            .map(|column| physical_cells(column).1)
            .collect::<Vec<_>>();
        let layout = nesting_layout(&dataset.column_names());

        let mut records = Vec::with_capacity(dataset.row_count());
        for row in 0..dataset.row_count() {
            let mut record = Map::new();
            for (slot, cells) in layout.iter().zip(&columns) {
                let value = serde_json::to_value(&cells[row]).unwrap_or(JsonValue::Null);
                match slot {
                    Slot::Flat(name) => {
                        record.insert(name.clone(), value);
                    }
                    Slot::Nested(parent, child) => {
                        let entry = record
                            .entry(parent.clone())
                            .or_insert_with(|| JsonValue::Object(Map::new()));
                        if let JsonValue::Object(inner) = entry {
                            inner.insert(child.clone(), value);
                        }
                    }
                }
            }
            records.push(JsonValue::Object(record));
        }
        serde_json::to_vec_pretty(&records)
            .map_err(|err| EngineError::format(FormatTag::StructuredRecord, err.to_string()))
    }

    fn represents(&self, column_type: ColumnType) -> bool {
        !matches!(column_type, ColumnType::Temporal)
    }
}

fn parse_values(bytes: &[u8]) -> EngineResult<Vec<JsonValue>> {
    let body = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    let mut values = Vec::new();
    for value in serde_json::Deserializer::from_slice(body).into_iter::<JsonValue>() {
        values.push(
            value.map_err(|err| EngineError::format(FormatTag::StructuredRecord, err.to_string()))?,
        );
    }
    if values.len() == 1 && values[0].is_array() {
        if let Some(JsonValue::Array(items)) = values.pop() {
            return Ok(items);
        }
    }
    Ok(values)
}

/// One record as `(column name, cell)` pairs, nested objects flattened to `parent.child`.
fn flatten(idx: usize, value: JsonValue) -> EngineResult<Vec<(String, Cell)>> {
    let JsonValue::Object(map) = value else {
        return Err(EngineError::shape(
            format!("record {} is not an object", idx + 1),
            Vec::new(),
        ));
    };
    let mut flat = Vec::with_capacity(map.len());
    for (key, value) in map {
        match value {
            JsonValue::Object(inner) => {
                for (child, value) in inner {
                    let name = format!("{key}.{child}");
                    match scalar_cell(value) {
                        Some(cell) => flat.push((name, cell)),
                        None => {
                            return Err(EngineError::shape(
                                "records nested more than one level cannot be flattened",
                                vec![name],
                            ));
                        }
                    }
                }
            }
            value => match scalar_cell(value) {
                Some(cell) => flat.push((key, cell)),
                None => {
                    return Err(EngineError::shape(
                        "array values cannot be represented as cells",
                        vec![key],
                    ));
                }
            },
        }
    }
    Ok(flat)
}

fn scalar_cell(value: JsonValue) -> Option<Cell> {
    match value {
        JsonValue::Null => Some(Cell::Absent),
        JsonValue::Bool(b) => Some(Cell::Boolean(b)),
        JsonValue::Number(n) => Some(n.as_f64().map(Cell::number).unwrap_or(Cell::Absent)),
        JsonValue::String(s) => Some(Cell::text(s)),
        JsonValue::Array(_) | JsonValue::Object(_) => None,
    }
}

#[derive(Debug, PartialEq)]
enum Slot {
    Flat(String),
    Nested(String, String),
}

/// Dotted names are re-nested under their prefix only when the prefix group
/// is contiguous and does not collide with a plain column name.
fn nesting_layout(names: &[String]) -> Vec<Slot> {
    let split = names
        .iter()
        .map(|name| {
            name.split_once('.')
                .filter(|(parent, child)| !parent.is_empty() && !child.is_empty())
        })
        .collect::<Vec<_>>();

    let nestable = |parent: &str| {
        if names.iter().any(|name| name == parent) {
            return false;
        }
        let positions = split
            .iter()
            .enumerate()
            .filter(|(_, parts)| parts.is_some_and(|(p, _)| p == parent))
            .map(|(idx, _)| idx)
            .collect::<Vec<_>>();
        positions.windows(2).all(|pair| pair[1] == pair[0] + 1)
    };

    names
        .iter()
        .zip(&split)
        .map(|(name, parts)| match parts {
            Some((parent, child)) if nestable(*parent) => {
                Slot::Nested(parent.to_string(), child.to_string())
            }
            _ => Slot::Flat(name.clone()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read(text: &str) -> EngineResult<Dataset> {
        RecordsAdapter.read(text.as_bytes(), &ReadOptions::default())
    }

    #[test]
    fn reads_array_and_flattens_one_level() {
        let dataset = read(
            r#"[{"id": 1, "address": {"city": "Oslo", "zip": "0150"}, "vip": true},
                {"id": 2, "address": {"city": null, "zip": "5003"}, "vip": false}]"#,
        )
        .expect("read records");
        assert_eq!(
            dataset.column_names(),
            vec!["id", "address.city", "address.zip", "vip"]
        );
        let city = dataset.column("address.city").unwrap();
        assert_eq!(city.cells(), &[Cell::text("Oslo"), Cell::Absent]);
        assert!(dataset.column("zip").is_none());
    }

    #[test]
    fn reads_newline_delimited_records() {
        let dataset = read("{\"a\": 1}\n{\"a\": 2.5}\n").expect("read ndjson");
        assert_eq!(
            dataset.column("a").unwrap().cells(),
            &[Cell::Number(1.0), Cell::Number(2.5)]
        );
    }

    #[test]
    fn deep_nesting_is_unsupported() {
        let err = read(r#"[{"a": {"b": {"c": 1}}}]"#).unwrap_err();
        assert_eq!(err.kind(), "UnsupportedShapeError");
        assert_eq!(err.fields(), vec!["a.b"]);
    }

    #[test]
    fn arrays_and_scalars_are_unsupported() {
        assert_eq!(
            read(r#"[{"tags": [1, 2]}]"#).unwrap_err().fields(),
            vec!["tags"]
        );
        assert_eq!(
            read("[1, 2]").unwrap_err().kind(),
            "UnsupportedShapeError"
        );
    }

    #[test]
    fn differing_key_sets_name_the_fields() {
        let err = read(r#"[{"a": 1, "b": 2}, {"a": 3, "c": 4}]"#).unwrap_err();
        assert_eq!(err.kind(), "UnsupportedShapeError");
        assert_eq!(err.fields(), vec!["b", "c"]);
    }

    #[test]
    fn flattening_collisions_name_the_duplicate() {
        let err = read(r#"[{"geo.lat": 1, "geo": {"lat": 2}, "id": 3}]"#).unwrap_err();
        assert_eq!(err.kind(), "UnsupportedShapeError");
        assert_eq!(err.fields(), vec!["geo.lat"]);
    }

    #[test]
    fn invalid_json_is_a_format_error() {
        assert_eq!(read("[{\"a\": ").unwrap_err().kind(), "FormatError");
    }

    #[test]
    fn write_renests_and_round_trips() {
        let source = r#"[{"id": "a1", "geo": {"lat": 59.9, "lon": 10.7}}]"#;
        let dataset = read(source).unwrap();
        let bytes = RecordsAdapter.write(&dataset).unwrap();
        let value: JsonValue = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value[0]["geo"]["lat"], JsonValue::from(59.9));
        assert_eq!(read(std::str::from_utf8(&bytes).unwrap()).unwrap(), dataset);
    }

    #[test]
    fn layout_keeps_colliding_prefixes_flat() {
        let names = ["a", "a.b", "c.x", "d", "c.y"].map(String::from);
        assert_eq!(
            nesting_layout(&names),
            vec![
                Slot::Flat("a".into()),
                Slot::Flat("a.b".into()),
                Slot::Flat("c.x".into()),
                Slot::Flat("d".into()),
                Slot::Flat("c.y".into()),
            ]
        );
    }

    #[test]
    fn empty_array_is_an_empty_dataset() {
        let dataset = read("[]").unwrap();
        assert_eq!(dataset.row_count(), 0);
        assert_eq!(RecordsAdapter.write(&dataset).unwrap(), b"[]");
    }
}
