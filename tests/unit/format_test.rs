use querygate::format::{cell_to_json, to_json_document, to_toon, unique_keys};
use querygate::table::{CellValue, ColumnMeta, ResultTable};
use serde_json::json;

/// Helper: encode to TOON and decode back to serde_json::Value (no type coercion)
fn round_trip(table: &ResultTable) -> serde_json::Value {
    let toon = to_toon(table).unwrap();
    toon_format::decode_no_coerce(&toon).unwrap()
}

fn text(s: &str) -> CellValue {
    CellValue::Text(s.to_string())
}

#[test]
fn test_3_column_2_row_result() {
    let table = ResultTable::new(
        vec![
            ColumnMeta::new("id", "INT"),
            ColumnMeta::new("name", "STRING"),
            ColumnMeta::new("email", "STRING"),
        ],
        vec![
            vec![text("1"), text("Alice"), text("alice@co.com")],
            vec![text("2"), text("Bob"), text("bob@co.com")],
        ],
    )
    .unwrap();

    let decoded = round_trip(&table);
    let obj = decoded.as_object().expect("output should be a root object");

    let types = obj.get("types").expect("should have 'types' key")
        .as_array().expect("types should be an array");
    assert_eq!(types.len(), 3);
    assert_eq!(types[0], "INT");
    assert_eq!(types[1], "STRING");

    let rows = obj.get("rows").expect("should have 'rows' key")
        .as_array().expect("rows should be an array");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["id"], "1");
    assert_eq!(rows[0]["name"], "Alice");
    assert_eq!(rows[1]["email"], "bob@co.com");
}

#[test]
fn test_null_cell_value() {
    let table = ResultTable::new(
        vec![ColumnMeta::new("val", "STRING")],
        vec![vec![CellValue::Null]],
    )
    .unwrap();

    let decoded = round_trip(&table);
    let rows = decoded["rows"].as_array().expect("rows should be an array");
    assert_eq!(rows.len(), 1);
    assert!(rows[0]["val"].is_null(), "NULL cell should decode as null");
}

#[test]
fn test_databricks_types_pass_through() {
    let table = ResultTable::new(
        vec![
            ColumnMeta::new("amount", "DECIMAL(10,2)"),
            ColumnMeta::new("tags", "ARRAY<STRING>"),
        ],
        vec![vec![text("9.99"), text("[\"a\"]")]],
    )
    .unwrap();

    let decoded = round_trip(&table);
    assert_eq!(decoded["types"][0], "DECIMAL(10,2)");
    assert_eq!(decoded["types"][1], "ARRAY<STRING>");
}

#[test]
fn test_json_document_keeps_typed_cells() {
    let table = ResultTable::new(
        vec![
            ColumnMeta::new("id", "INT"),
            ColumnMeta::new("ratio", "DOUBLE"),
            ColumnMeta::new("ok", "BOOLEAN"),
        ],
        vec![vec![
            CellValue::Integer(1),
            CellValue::Float(0.25),
            CellValue::Bool(true),
        ]],
    )
    .unwrap();

    assert_eq!(
        to_json_document(&table),
        json!({
            "columns": ["id", "ratio", "ok"],
            "types": ["INT", "DOUBLE", "BOOLEAN"],
            "rows": [{"id": 1, "ratio": 0.25, "ok": true}]
        })
    );
}

#[test]
fn test_json_document_for_zero_rows_keeps_types() {
    let table = ResultTable::new(
        vec![ColumnMeta::new("a", "INT"), ColumnMeta::new("b", "STRING")],
        vec![],
    )
    .unwrap();

    let doc = to_json_document(&table);
    assert_eq!(doc["columns"], json!(["a", "b"]));
    assert_eq!(doc["types"], json!(["INT", "STRING"]));
    assert_eq!(doc["rows"], json!([]));
}

#[test]
fn test_zero_row_result_keeps_column_names_in_toon() {
    let table = ResultTable::new(
        vec![ColumnMeta::new("id", "INT"), ColumnMeta::new("name", "STRING")],
        vec![],
    )
    .unwrap();

    let decoded = round_trip(&table);
    assert_eq!(decoded["columns"], json!(["id", "name"]));
    assert_eq!(decoded["types"], json!(["INT", "STRING"]));
}

#[test]
fn test_duplicate_column_names_keep_every_cell() {
    let table = ResultTable::new(
        vec![ColumnMeta::new("x", "STRING"), ColumnMeta::new("x", "STRING")],
        vec![vec![text("1"), text("2")]],
    )
    .unwrap();

    let decoded = round_trip(&table);
    assert_eq!(decoded["columns"], json!(["x", "x_1"]));
    let row = decoded["rows"][0].as_object().expect("row should be an object");
    assert_eq!(row.len(), 2);
    assert_eq!(row["x"], "1");
    assert_eq!(row["x_1"], "2");
}

#[test]
fn test_unique_keys_skip_names_already_taken() {
    let columns = vec![
        ColumnMeta::new("x", "INT"),
        ColumnMeta::new("x", "INT"),
        ColumnMeta::new("x_1", "INT"),
        ColumnMeta::new("x", "INT"),
    ];
    assert_eq!(unique_keys(&columns), vec!["x", "x_2", "x_1", "x_3"]);
}

#[test]
fn test_non_finite_float_becomes_null() {
    assert!(cell_to_json(&CellValue::Float(f64::NAN)).is_null());
    assert_eq!(cell_to_json(&CellValue::Float(1.5)), json!(1.5));
}
