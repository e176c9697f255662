use serde_json::{Map, Value};
use tracing::debug;

use super::{file, prices, stdin};

/// Where a command's request comes from.
pub struct RequestSource<'a> {
    /// Full JSON request file.
    pub input: Option<&'a str>,
    /// CSV price table, converted to a `returns` matrix.
    pub prices: Option<&'a str>,
    /// YAML/JSON run settings, overridden by the request itself.
    pub config: Option<&'a str>,
}

/// Assemble a request object from the config file, then the request file,
/// price table or piped stdin (in that order of precedence).
pub fn load_request(
    source: &RequestSource<'_>,
    command: &str,
) -> Result<Map<String, Value>, Box<dyn std::error::Error>> {
    let mut request = match source.config {
        Some(path) => into_object(file::read_config(path)?, path)?,
        None => Map::new(),
    };

    let body = if let Some(path) = source.input {
        into_object(file::read_json_value(path)?, path)?
    } else if let Some(path) = source.prices {
        let returns = prices::read_prices(path)?;
        let mut map = Map::new();
        map.insert("returns".into(), serde_json::to_value(returns)?);
        map
    } else if let Some(value) = stdin::read_stdin()? {
        into_object(value, "stdin")?
    } else {
        return Err(format!(
            "--input <file.json>, --prices <file.csv> or stdin required for {}",
            command
        )
        .into());
    };

    request.extend(body);
    debug!(command, fields = request.len(), "request assembled");
    Ok(request)
}

/// Overwrite request fields with the flags the user actually passed.
pub fn apply_overrides(request: &mut Map<String, Value>, overrides: Vec<(&str, Option<Value>)>) {
    for (key, value) in overrides {
        if let Some(v) = value {
            request.insert(key.to_string(), v);
        }
    }
}

fn into_object(value: Value, origin: &str) -> Result<Map<String, Value>, Box<dyn std::error::Error>> {
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(format!("Request from '{}' must be a JSON object", origin).into()),
    }
}
