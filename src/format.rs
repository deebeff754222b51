use std::collections::HashSet;

use serde_json::{Map, Number, Value};

use crate::error::GatewayError;
use crate::table::{CellValue, ColumnMeta, ResultTable};

/// JSON form of a cell. Non-finite floats have no JSON form and become null.
pub fn cell_to_json(cell: &CellValue) -> Value {
    match cell {
        CellValue::Null => Value::Null,
        CellValue::Integer(i) => Value::Number((*i).into()),
        CellValue::Float(f) => Number::from_f64(*f).map(Value::Number).unwrap_or(Value::Null),
        CellValue::Text(s) => Value::String(s.clone()),
        CellValue::Bool(b) => Value::Bool(*b),
    }
}

/// Row keys for `columns`: the column names, with repeats suffixed `_1`,
/// `_2`, ... so that no cell shares a key with another.
pub fn unique_keys(columns: &[ColumnMeta]) -> Vec<String> {
    let names: HashSet<&str> = columns.iter().map(|c| c.name.as_str()).collect();
    let mut used: HashSet<String> = HashSet::with_capacity(columns.len());

    columns
        .iter()
        .map(|column| {
            let mut key = column.name.clone();
            let mut n = 0;
            // A suffixed key must not take another column's real name.
            while used.contains(&key) || (n > 0 && names.contains(key.as_str())) {
                n += 1;
                key = format!("{}_{}", column.name, n);
            }
            used.insert(key.clone());
            key
        })
        .collect()
}

/// Build the `{columns, types, rows}` document for a table.
///
/// `columns` and `types` list the row keys and declared types in column
/// order, so a zero-row result still carries its header. Each row is an
/// object keyed by [`unique_keys`].
pub fn to_json_document(table: &ResultTable) -> Value {
    let keys = unique_keys(table.columns());

    let types = table
        .columns()
        .iter()
        .map(|c| Value::String(c.type_name.clone()))
        .collect();

    let rows = table
        .rows()
        .iter()
        .map(|row| {
            let map: Map<String, Value> = keys
                .iter()
                .zip(row)
                .map(|(key, cell)| (key.clone(), cell_to_json(cell)))
                .collect();
            Value::Object(map)
        })
        .collect();

    let mut doc = Map::new();
    doc.insert(
        "columns".to_string(),
        Value::Array(keys.into_iter().map(Value::String).collect()),
    );
    doc.insert("types".to_string(), Value::Array(types));
    doc.insert("rows".to_string(), Value::Array(rows));
    Value::Object(doc)
}

/// Convert a table to a TOON-formatted string.
pub fn to_toon(table: &ResultTable) -> Result<String, GatewayError> {
    toon_format::encode_default(&to_json_document(table)).map_err(|e| GatewayError::Format {
        message: e.to_string(),
    })
}
