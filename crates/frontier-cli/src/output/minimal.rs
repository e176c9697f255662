use serde_json::Value;

use super::{format_cell, is_portfolio, result_of};

/// Print just the key answer: the chosen weights.
///
/// Looks for the investor selection first, then the max-Sharpe sample,
/// then a bare selection, and falls back to the first result field.
pub fn print_minimal(value: &Value) {
    let result = result_of(value);

    let priority_keys = ["investor", "max_sharpe", "min_volatility"];

    if let Value::Object(map) = result {
        for key in &priority_keys {
            if let Some(val) = map.get(*key).filter(|v| is_portfolio(v)) {
                println!("{}", minimal_selection(val, map.get("asset_names")));
                return;
            }
        }

        if is_portfolio(result) {
            println!("{}", minimal_selection(result, None));
            return;
        }

        if let Some(converged) = map.get("converged_points") {
            println!("converged_points: {}", format_cell(converged));
            return;
        }

        if let Some((key, val)) = map.iter().next() {
            println!("{}: {}", key, format_cell(val));
            return;
        }
    }

    println!("{}", format_cell(result));
}

fn minimal_selection(selection: &Value, asset_names: Option<&Value>) -> String {
    let weights: Vec<String> = selection
        .get("weights")
        .and_then(Value::as_array)
        .map(|w| w.iter().map(format_cell).collect())
        .unwrap_or_default();
    match asset_names.and_then(Value::as_array) {
        Some(names) if names.len() == weights.len() => names
            .iter()
            .zip(weights.iter())
            .map(|(n, w)| format!("{}={}", format_cell(n), w))
            .collect::<Vec<_>>()
            .join(" "),
        _ => weights.join(" "),
    }
}
