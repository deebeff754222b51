use std::io::Write;
use std::path::Path;

use crate::error::GatewayError;
use crate::table::{CellValue, ResultTable};

fn csv_error(e: csv::Error) -> GatewayError {
    GatewayError::Format {
        message: format!("CSV write failed: {e}"),
    }
}

fn cell_field(cell: &CellValue) -> String {
    match cell {
        CellValue::Null => String::new(),
        CellValue::Integer(i) => i.to_string(),
        CellValue::Float(f) => f.to_string(),
        CellValue::Text(s) => s.clone(),
        CellValue::Bool(b) => b.to_string(),
    }
}

/// Write a table as RFC 4180 CSV with CRLF line endings. Nulls become
/// empty fields.
pub fn write_csv_to_writer<W: Write>(table: &ResultTable, writer: W) -> Result<(), GatewayError> {
    let mut csv_writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::CRLF)
        .from_writer(writer);

    csv_writer
        .write_record(table.columns().iter().map(|c| c.name.as_str()))
        .map_err(csv_error)?;

    for row in table.rows() {
        csv_writer
            .write_record(row.iter().map(cell_field))
            .map_err(csv_error)?;
    }

    csv_writer.flush()?;
    Ok(())
}

/// Write a table to a CSV file.
pub fn write_csv(table: &ResultTable, path: &Path) -> Result<(), GatewayError> {
    let file = std::fs::File::create(path)?;
    write_csv_to_writer(table, std::io::BufWriter::new(file))
}
