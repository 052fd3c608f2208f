//! CSV and JSON flattening.
//!
//! Tabular and nested data is rendered as `key: value` text so each line
//! stays meaningful when it lands in a chunk on its own.

use serde_json::Value;

use super::ExtractError;

/// One line per record: `header: value` pairs joined by `; `.
///
/// The first row is the header. Empty fields are omitted; fields beyond
/// the header are labelled `column N`.
pub fn extract_csv(text: &str) -> Result<String, ExtractError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| ExtractError::Structured(format!("CSV header: {e}")))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut lines = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record =
            record.map_err(|e| ExtractError::Structured(format!("CSV row {}: {e}", row + 1)))?;
        let pairs: Vec<String> = record
            .iter()
            .enumerate()
            .filter(|(_, v)| !v.trim().is_empty())
            .map(|(i, v)| {
                let key = headers
                    .get(i)
                    .filter(|h| !h.is_empty())
                    .cloned()
                    .unwrap_or_else(|| format!("column {}", i + 1));
                format!("{key}: {}", v.trim())
            })
            .collect();
        if !pairs.is_empty() {
            lines.push(pairs.join("; "));
        }
    }
    Ok(lines.join("\n"))
}

/// One `path: value` line per scalar, in document order.
///
/// Object keys are joined with `.`, array positions appear as `[i]`.
pub fn extract_json(text: &str) -> Result<String, ExtractError> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| ExtractError::Structured(format!("invalid JSON: {e}")))?;
    let mut lines = Vec::new();
    flatten(&value, String::new(), &mut lines);
    Ok(lines.join("\n"))
}

fn flatten(value: &Value, path: String, out: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            for (k, v) in map {
                let child = if path.is_empty() {
                    k.clone()
                } else {
                    format!("{path}.{k}")
                };
                flatten(v, child, out);
            }
        }
        Value::Array(items) => {
            for (i, v) in items.iter().enumerate() {
                flatten(v, format!("{path}[{i}]"), out);
            }
        }
        Value::Null => {}
        scalar => {
            let rendered = match scalar {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            if path.is_empty() {
                out.push(rendered);
            } else {
                out.push(format!("{path}: {rendered}"));
            }
        }
    }
}
