use serde_json::Value;
use std::io;

use super::{format_cell, result_of, ROW_KEYS};

/// Write output as CSV to stdout: the per-row records when the result has
/// them (frontier points, sampled portfolios), otherwise field/value pairs.
pub fn print_csv(value: &Value) {
    let stdout = io::stdout();
    let mut wtr = csv::Writer::from_writer(stdout.lock());
    let result = result_of(value);

    match result {
        Value::Object(map) => {
            if let Some(Value::Array(rows)) = ROW_KEYS.iter().find_map(|k| map.get(*k)) {
                write_array_csv(&mut wtr, rows);
            } else {
                let _ = wtr.write_record(["field", "value"]);
                for (key, val) in map {
                    let _ = wtr.write_record([key.as_str(), &format_csv_value(val)]);
                }
            }
        }
        Value::Array(arr) => write_array_csv(&mut wtr, arr),
        _ => {
            let _ = wtr.write_record([&format_csv_value(result)]);
        }
    }

    let _ = wtr.flush();
}

fn write_array_csv(wtr: &mut csv::Writer<io::StdoutLock<'_>>, arr: &[Value]) {
    let Some(Value::Object(first)) = arr.first() else {
        for item in arr {
            let _ = wtr.write_record([&format_csv_value(item)]);
        }
        return;
    };

    // Weight arrays expand to one column per asset.
    let width = first
        .get("weights")
        .and_then(Value::as_array)
        .map_or(0, Vec::len);
    let headers: Vec<&str> = first
        .keys()
        .map(|k| k.as_str())
        .filter(|k| *k != "weights")
        .collect();
    let mut header_row: Vec<String> = headers.iter().map(|h| h.to_string()).collect();
    header_row.extend((0..width).map(|j| format!("w{}", j)));
    let _ = wtr.write_record(&header_row);

    for item in arr {
        if let Value::Object(map) = item {
            let mut row: Vec<String> = headers
                .iter()
                .map(|h| map.get(*h).map(format_csv_value).unwrap_or_default())
                .collect();
            if let Some(Value::Array(w)) = map.get("weights") {
                row.extend(w.iter().map(format_csv_value));
            }
            let _ = wtr.write_record(&row);
        }
    }
}

fn format_csv_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Number(n) => n.to_string(),
        Value::Array(_) | Value::Object(_) => serde_json::to_string(value).unwrap_or_default(),
        _ => format_cell(value),
    }
}
