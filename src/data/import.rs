//! JSON-lines import/export of event records

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use crate::{EventRecord, GameId, OverlineError, Result};

/// Deserialize a map of numeric fields, coercing booleans to 0/1 and
/// numeric strings to numbers. Nulls and non-numeric values are dropped.
pub fn numeric_map<'de, D>(deserializer: D) -> std::result::Result<BTreeMap<String, f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<BTreeMap<String, Value>> = Option::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(key, value)| coerce_numeric(&value).map(|v| (key, v)))
        .collect())
}

fn coerce_numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::Number(n) => n.as_f64(),
        Value::String(s) => match s.trim().to_uppercase().as_str() {
            "TRUE" => Some(1.0),
            "FALSE" => Some(0.0),
            other => other.parse::<f64>().ok(),
        },
        _ => None,
    }
    .filter(|v| v.is_finite())
}

/// Parse a single JSON line into a record with a normalized game id
pub fn parse_record(line: &str) -> Result<EventRecord> {
    let mut record: EventRecord = serde_json::from_str(line)?;
    record.game_id = GameId::normalized(&record.game_id.0);
    Ok(record)
}

/// Read records from a JSON-lines file, skipping blank lines
pub fn read_jsonl<P: AsRef<Path>>(path: P) -> Result<Vec<EventRecord>> {
    let file = File::open(path.as_ref())?;
    let mut records = Vec::new();

    for (line_no, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record = parse_record(&line).map_err(|e| {
            OverlineError::Parse(format!(
                "{}:{}: {}",
                path.as_ref().display(),
                line_no + 1,
                e
            ))
        })?;
        records.push(record);
    }

    log::info!(
        "Read {} records from {}",
        records.len(),
        path.as_ref().display()
    );
    Ok(records)
}

/// Write records as JSON lines
pub fn write_jsonl<P: AsRef<Path>>(path: P, records: &[EventRecord]) -> Result<()> {
    if let Some(parent) = path.as_ref().parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = BufWriter::new(File::create(path.as_ref())?);
    for record in records {
        serde_json::to_writer(&mut writer, record)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}
