pub mod csv_out;
pub mod json;
pub mod minimal;
pub mod table;

use crate::OutputFormat;
use serde_json::Value;

/// Dispatch output to the appropriate formatter.
pub fn format_output(format: &OutputFormat, value: &Value) {
    match format {
        OutputFormat::Json => json::print_json(value),
        OutputFormat::Table => table::print_table(value),
        OutputFormat::Csv => csv_out::print_csv(value),
        OutputFormat::Minimal => minimal::print_minimal(value),
    }
}

/// The `matrix` of a sensitivity grid as header plus rows, with the first
/// column holding variable 1 values.
pub(crate) fn grid_rows(result: &serde_json::Map<String, Value>) -> Option<Vec<Vec<String>>> {
    let matrix = result.get("matrix")?.as_array()?;
    let v1 = result.get("variable_1_values")?.as_array()?;
    let v2 = result.get("variable_2_values")?.as_array()?;
    let corner = format!(
        "{} \\ {}",
        result.get("variable_1_name").and_then(Value::as_str).unwrap_or(""),
        result.get("variable_2_name").and_then(Value::as_str).unwrap_or("")
    );

    let mut rows = Vec::with_capacity(matrix.len() + 1);
    let mut header = vec![corner];
    header.extend(v2.iter().map(scalar_text));
    rows.push(header);

    for (label, row) in v1.iter().zip(matrix) {
        let mut cells = vec![scalar_text(label)];
        if let Some(row) = row.as_array() {
            cells.extend(row.iter().map(scalar_text));
        }
        rows.push(cells);
    }
    Some(rows)
}

pub(crate) fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}
