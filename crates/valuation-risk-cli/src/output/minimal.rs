use serde_json::Value;

/// Result fields that carry the headline answer, in order of priority.
const PRIORITY_KEYS: [&str; 6] = [
    "rating",
    "probability_above_current",
    "confidence_interval_90",
    "base_case_value",
    "target_price",
    "base_share_price",
];

/// Print just the key answer from the output.
///
/// A football field reports its rating (from the summary), a simulation
/// its probability of beating the current price, a data table its
/// reference cell and a tornado the first-ranked driver.
pub fn print_minimal(value: &Value) {
    let result_obj = value
        .as_object()
        .and_then(|m| m.get("result"))
        .unwrap_or(value);

    println!("{}", headline(result_obj));
}

fn headline(result: &Value) -> String {
    let Value::Object(map) = result else {
        return format_minimal(result);
    };

    if let Some(Value::Object(summary)) = map.get("summary") {
        if let (Some(rating), Some(target)) = (summary.get("rating"), summary.get("target_price")) {
            return format!("{} ({})", format_minimal(rating), format_minimal(target));
        }
    }
    if let Some(Value::Array(sens)) = map.get("sensitivities") {
        if let Some(top) = sens.first().and_then(|s| s.get("assumption")) {
            return format_minimal(top);
        }
    }
    for key in PRIORITY_KEYS {
        if let Some(val) = map.get(key) {
            if !val.is_null() {
                return format_minimal(val);
            }
        }
    }

    match map.iter().next() {
        Some((key, val)) => format!("{}: {}", key, format_minimal(val)),
        None => String::new(),
    }
}

fn format_minimal(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        Value::Array(arr) => arr.iter().map(format_minimal).collect::<Vec<_>>().join(" - "),
        Value::Object(_) => serde_json::to_string(value).unwrap_or_default(),
    }
}
