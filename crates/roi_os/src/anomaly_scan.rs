#![forbid(unsafe_code)]

use roi_kernel_contracts::anomaly::SeriesPoint;
use serde_json::Value;

pub const ANOMALY_FLAG_FIELD: &str = "isAnomaly";

/// Builds the `(timestamp, roi)` series in history order.
pub fn build_series(history: &[Value]) -> Result<Vec<SeriesPoint>, String> {
    history
        .iter()
        .enumerate()
        .map(|(idx, entry)| {
            let timestamp = entry
                .get("timestamp")
                .and_then(Value::as_str)
                .ok_or_else(|| format!("history entry {idx} has no string 'timestamp'"))?;
            let value = entry
                .get("roi")
                .and_then(Value::as_f64)
                .ok_or_else(|| format!("history entry {idx} has no numeric 'roi'"))?;
            Ok(SeriesPoint {
                timestamp: timestamp.to_string(),
                value,
            })
        })
        .collect()
}

/// Entries whose flag is `true`, each tagged with `isAnomaly: true`.
///
/// History entries past the end of the flags are never flagged, and `false`
/// flags past the end of the history are ignored. A `true` flag with no
/// history entry at its index fails the scan.
pub fn select_flagged(history: &[Value], flags: &[bool]) -> Result<Vec<Value>, String> {
    flags
        .iter()
        .enumerate()
        .filter(|(_, flagged)| **flagged)
        .map(|(idx, _)| {
            let mut entry = history.get(idx).cloned().ok_or_else(|| {
                format!(
                    "detector flagged point {idx} but history has {} entries",
                    history.len()
                )
            })?;
            if let Value::Object(fields) = &mut entry {
                fields.insert(ANOMALY_FLAG_FIELD.to_string(), Value::Bool(true));
            }
            Ok(entry)
        })
        .collect()
}
