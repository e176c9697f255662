use chrono::NaiveDate;
use frontier_core::returns::matrix::ReturnMatrix;
use std::io;

use super::file::resolve_path;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Load a CSV price table and convert it to daily log returns.
///
/// The header names the assets. A leading `Date` column (YYYY-MM-DD) is
/// optional; every other cell must be a positive price.
pub fn read_prices(path: &str) -> Result<ReturnMatrix, Box<dyn std::error::Error>> {
    let canonical = resolve_path(path)?;
    let file = std::fs::File::open(&canonical)
        .map_err(|e| format!("Failed to read '{}': {}", canonical.display(), e))?;
    parse_prices(file).map_err(|e| format!("'{}': {}", canonical.display(), e).into())
}

pub fn parse_prices<R: io::Read>(reader: R) -> Result<ReturnMatrix, Box<dyn std::error::Error>> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let headers = rdr.headers()?.clone();
    let has_dates = headers
        .get(0)
        .is_some_and(|h| h.eq_ignore_ascii_case("date"));
    let first_asset = usize::from(has_dates);
    let asset_names: Vec<String> = headers.iter().skip(first_asset).map(String::from).collect();
    if asset_names.is_empty() {
        return Err("Price table has no asset columns".into());
    }

    let mut dates: Vec<NaiveDate> = Vec::new();
    let mut prices: Vec<Vec<f64>> = Vec::new();
    for (row, record) in rdr.records().enumerate() {
        let record = record?;
        let line = row + 2;
        if has_dates {
            let raw = record.get(0).unwrap_or_default();
            let date = NaiveDate::parse_from_str(raw, DATE_FORMAT)
                .map_err(|e| format!("line {}: invalid date '{}': {}", line, raw, e))?;
            dates.push(date);
        }
        let values = record
            .iter()
            .skip(first_asset)
            .enumerate()
            .map(|(j, cell)| {
                cell.parse::<f64>().map_err(|_| {
                    format!(
                        "line {}: missing or invalid price '{}' for {}",
                        line, cell, asset_names[j]
                    )
                })
            })
            .collect::<Result<Vec<f64>, String>>()?;
        prices.push(values);
    }

    let returns = ReturnMatrix::from_prices(asset_names, &prices, has_dates.then_some(dates))?;
    Ok(returns)
}
