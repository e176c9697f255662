use serde_json::{Map, Value};
use tabled::{builder::Builder, Table};

use super::{format_cell, is_portfolio, ROW_KEYS};

/// Format output as tables using the tabled crate: scalar fields, then the
/// named portfolios, then the per-row records.
pub fn print_table(value: &Value) {
    match value {
        Value::Object(map) => {
            if let Some(result) = map.get("result") {
                print_result_table(result, map);
            } else {
                print_object(map);
            }
        }
        Value::Array(arr) => print_rows(arr),
        _ => println!("{}", value),
    }
}

fn print_result_table(result: &Value, envelope: &Map<String, Value>) {
    let Value::Object(res_map) = result else {
        println!("{}", format_cell(result));
        return;
    };

    if is_portfolio(result) {
        // The result itself is a single selection (match-risk).
        print_portfolios(&[("selection", result)], res_map);
    } else {
        print_object(res_map);
        let named: Vec<(&str, &Value)> = res_map
            .iter()
            .filter(|(_, v)| is_portfolio(v))
            .map(|(k, v)| (k.as_str(), v))
            .collect();
        if !named.is_empty() {
            println!();
            print_portfolios(&named, res_map);
        }
        if let Some(Value::Array(rows)) = ROW_KEYS.iter().find_map(|k| res_map.get(*k)) {
            println!();
            print_rows(rows);
        }
    }

    if let Some(Value::Array(warnings)) = envelope.get("warnings") {
        if !warnings.is_empty() {
            println!("\nWarnings:");
            for w in warnings {
                if let Value::String(s) = w {
                    println!("  - {}", s);
                }
            }
        }
    }

    if let Some(Value::String(meth)) = envelope.get("methodology") {
        println!("\nMethodology: {}", meth);
    }
}

/// Scalar fields as a Field/Value table; nested records are skipped.
fn print_object(map: &Map<String, Value>) {
    let mut builder = Builder::default();
    builder.push_record(["Field", "Value"]);
    for (key, val) in map {
        if is_portfolio(val) || matches!(val, Value::Array(a) if a.iter().any(Value::is_object)) {
            continue;
        }
        builder.push_record([key.as_str(), &format_cell(val)]);
    }
    println!("{}", Table::from(builder));
}

fn print_portfolios(named: &[(&str, &Value)], result: &Map<String, Value>) {
    let assets: Option<Vec<String>> = result
        .get("asset_names")
        .and_then(Value::as_array)
        .map(|a| a.iter().map(format_cell).collect());

    let mut builder = Builder::default();
    let mut header = vec!["Portfolio".to_string(), "Return".into(), "Volatility".into(), "Sharpe".into()];
    match &assets {
        Some(names) => header.extend(names.iter().cloned()),
        None => header.push("Weights".into()),
    }
    builder.push_record(header);

    for (name, p) in named {
        let mut row = vec![
            name.to_string(),
            p.get("return").map(format_cell).unwrap_or_default(),
            p.get("volatility").map(format_cell).unwrap_or_default(),
            p.get("sharpe").map(format_cell).unwrap_or_default(),
        ];
        let weights = p.get("weights").and_then(Value::as_array);
        match (&assets, weights) {
            (Some(_), Some(w)) => row.extend(w.iter().map(format_cell)),
            (None, Some(w)) => row.push(format_cell(&Value::Array(w.clone()))),
            _ => {}
        }
        builder.push_record(row);
    }
    println!("{}", Table::from(builder));
}

fn print_rows(arr: &[Value]) {
    if arr.is_empty() {
        println!("(empty)");
        return;
    }

    if let Some(Value::Object(first)) = arr.first() {
        let headers: Vec<String> = first.keys().cloned().collect();
        let mut builder = Builder::default();
        builder.push_record(&headers);

        for item in arr {
            if let Value::Object(map) = item {
                let row: Vec<String> = headers
                    .iter()
                    .map(|h| map.get(h.as_str()).map(format_cell).unwrap_or_default())
                    .collect();
                builder.push_record(row);
            }
        }

        println!("{}", Table::from(builder));
    } else {
        for item in arr {
            println!("{}", format_cell(item));
        }
    }
}
