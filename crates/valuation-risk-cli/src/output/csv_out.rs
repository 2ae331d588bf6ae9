use serde_json::{Map, Value};
use std::io;

use super::{grid_rows, scalar_text};

/// Row-list fields written as a CSV table, in order of preference.
const ROW_KEYS: [&str; 3] = ["ranges", "tornado_data", "sensitivities"];

/// Write output as CSV to stdout.
///
/// Grids become a matrix with a header row, row lists (football-field
/// ranges, tornado bars) become one record per row, and anything else a
/// two-column field/value listing.
pub fn print_csv(value: &Value) {
    let stdout = io::stdout();
    let mut wtr = csv::Writer::from_writer(stdout.lock());

    match value {
        Value::Object(map) => match map.get("result") {
            Some(Value::Object(result)) => write_result(&mut wtr, result),
            _ => write_fields(&mut wtr, map),
        },
        Value::Array(arr) => write_array_csv(&mut wtr, arr),
        _ => {
            let _ = wtr.write_record([&scalar_text(value)]);
        }
    }

    let _ = wtr.flush();
}

fn write_result(wtr: &mut csv::Writer<io::StdoutLock<'_>>, result: &Map<String, Value>) {
    if let Some(rows) = grid_rows(result) {
        for row in rows {
            let _ = wtr.write_record(&row);
        }
        return;
    }
    for key in ROW_KEYS {
        if let Some(Value::Array(rows)) = result.get(key) {
            write_array_csv(wtr, rows);
            return;
        }
    }
    write_fields(wtr, result);
}

fn write_fields(wtr: &mut csv::Writer<io::StdoutLock<'_>>, map: &Map<String, Value>) {
    let _ = wtr.write_record(["field", "value"]);
    for (key, val) in map {
        match val {
            // Flatten one level of nesting: share_price.median, ...
            Value::Object(inner) => {
                for (k, v) in inner {
                    if !v.is_array() {
                        let _ = wtr.write_record([format!("{key}.{k}"), scalar_text(v)]);
                    }
                }
            }
            _ => {
                let _ = wtr.write_record([key.as_str(), &scalar_text(val)]);
            }
        }
    }
}

fn write_array_csv(wtr: &mut csv::Writer<io::StdoutLock<'_>>, arr: &[Value]) {
    if arr.is_empty() {
        return;
    }

    if let Some(Value::Object(first)) = arr.first() {
        let headers: Vec<&str> = first.keys().map(|k| k.as_str()).collect();
        let _ = wtr.write_record(&headers);

        for item in arr {
            if let Value::Object(map) = item {
                let row: Vec<String> = headers
                    .iter()
                    .map(|h| map.get(*h).map(scalar_text).unwrap_or_default())
                    .collect();
                let _ = wtr.write_record(&row);
            }
        }
    } else {
        for item in arr {
            let _ = wtr.write_record([&scalar_text(item)]);
        }
    }
}
