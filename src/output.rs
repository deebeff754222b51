use std::path::Path;

use serde_json::{Map, Number, Value};

use crate::error::GatewayError;

/// Print TOON result to stdout.
pub fn print_result(toon_string: &str) {
    print!("{}", toon_string);
}

/// Print error to stderr in the contract format: error: <category>: <message>
pub fn print_error(err: &GatewayError) {
    eprintln!("error: {}", err);
}

/// Build the file output summary: rows_written, file and truncated.
pub fn summary_document(rows: usize, path: &Path, truncated: bool) -> Value {
    let mut map = Map::new();
    map.insert("rows_written".to_string(), Value::Number(Number::from(rows)));
    map.insert(
        "file".to_string(),
        Value::String(path.display().to_string()),
    );
    map.insert("truncated".to_string(), Value::Bool(truncated));
    Value::Object(map)
}

/// Print the file output summary to stdout as a TOON object.
pub fn print_summary(rows: usize, path: &Path, truncated: bool) -> Result<(), GatewayError> {
    let toon = toon_format::encode_default(&summary_document(rows, path, truncated)).map_err(
        |e| GatewayError::Format {
            message: e.to_string(),
        },
    )?;
    print!("{}", toon);
    Ok(())
}

/// Print a truncation warning to stderr for interactive visibility.
pub fn print_truncation_warning(rows: usize) {
    eprintln!(
        "warning: result truncated by the warehouse after {} rows",
        rows
    );
}

/// Write a string to a file whose parent directory must already exist.
pub fn write_file(contents: &str, path: &Path) -> Result<(), GatewayError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        return Err(GatewayError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("parent directory does not exist: {}", parent.display()),
        )));
    }
    std::fs::write(path, contents)?;
    Ok(())
}
