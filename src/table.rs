use serde_json::Value;

use crate::error::GatewayError;

/// Metadata for a single result column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMeta {
    pub name: String,
    /// Type name as declared by the warehouse, e.g. `INT` or `DECIMAL(10,2)`.
    pub type_name: String,
}

impl ColumnMeta {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
        }
    }
}

/// A single cell value, kept exactly as the wire delivered it.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Integer(i64),
    Float(f64),
    Text(String),
    Bool(bool),
}

impl CellValue {
    /// Map a JSON wire value onto a cell without any coercion.
    ///
    /// Nested arrays and objects (complex column types) are kept as their
    /// JSON text.
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Null => CellValue::Null,
            Value::Bool(b) => CellValue::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => CellValue::Integer(i),
                None if n.is_f64() => CellValue::Float(n.as_f64().unwrap_or(f64::NAN)),
                // Unsigned values past i64::MAX would lose digits as a float.
                None => CellValue::Text(n.to_string()),
            },
            Value::String(s) => CellValue::Text(s),
            other => CellValue::Text(other.to_string()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Convert a text cell according to the column's declared type.
    ///
    /// Only `Text` cells are touched. Text that does not parse as the
    /// declared type is returned unchanged.
    pub fn coerce(&self, type_name: &str) -> CellValue {
        let CellValue::Text(text) = self else {
            return self.clone();
        };
        let trimmed = text.trim();
        let coerced = match TypeFamily::of(type_name) {
            TypeFamily::Integer => trimmed.parse::<i64>().ok().map(CellValue::Integer),
            TypeFamily::Float => trimmed.parse::<f64>().ok().map(CellValue::Float),
            TypeFamily::Bool => match trimmed.to_ascii_lowercase().as_str() {
                "true" => Some(CellValue::Bool(true)),
                "false" => Some(CellValue::Bool(false)),
                _ => None,
            },
            TypeFamily::Other => None,
        };
        coerced.unwrap_or_else(|| self.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TypeFamily {
    Integer,
    Float,
    Bool,
    Other,
}

impl TypeFamily {
    fn of(type_name: &str) -> Self {
        let normalized = type_name.trim().to_uppercase();
        let base = match normalized.find('(') {
            Some(pos) => normalized[..pos].trim_end(),
            None => normalized.as_str(),
        };
        match base {
            "TINYINT" | "BYTE" | "SMALLINT" | "SHORT" | "INT" | "INTEGER" | "BIGINT" | "LONG" => {
                TypeFamily::Integer
            }
            "FLOAT" | "DOUBLE" | "REAL" | "DECIMAL" | "NUMERIC" | "DEC" => TypeFamily::Float,
            "BOOLEAN" | "BOOL" => TypeFamily::Bool,
            _ => TypeFamily::Other,
        }
    }
}

/// An ordered, immutable column/row result.
///
/// Every row has exactly one cell per column and rows keep the order the
/// warehouse returned them in.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultTable {
    columns: Vec<ColumnMeta>,
    rows: Vec<Vec<CellValue>>,
    truncated: bool,
}

impl ResultTable {
    pub fn new(columns: Vec<ColumnMeta>, rows: Vec<Vec<CellValue>>) -> Result<Self, GatewayError> {
        if let Some((index, row)) = rows
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != columns.len())
        {
            return Err(GatewayError::remote(format!(
                "row {index} has {} cells but the schema declares {} columns",
                row.len(),
                columns.len()
            )));
        }
        Ok(Self {
            columns,
            rows,
            truncated: false,
        })
    }

    /// Mark the table as cut short by a server-side result cap.
    pub fn with_truncated(mut self, truncated: bool) -> Self {
        self.truncated = truncated;
        self
    }

    pub fn columns(&self) -> &[ColumnMeta] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<CellValue>] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Vec<CellValue>> {
        self.rows
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Position of the first column called `name`.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// All values of column `name`, top to bottom.
    pub fn column_values(&self, name: &str) -> Option<Vec<&CellValue>> {
        let index = self.column_index(name)?;
        Some(self.rows.iter().map(|row| &row[index]).collect())
    }

    /// A copy of the table with every text cell coerced by its column type.
    pub fn coerced(&self) -> ResultTable {
        let rows = self
            .rows
            .iter()
            .map(|row| {
                row.iter()
                    .zip(&self.columns)
                    .map(|(cell, column)| cell.coerce(&column.type_name))
                    .collect()
            })
            .collect();
        ResultTable {
            columns: self.columns.clone(),
            rows,
            truncated: self.truncated,
        }
    }
}
