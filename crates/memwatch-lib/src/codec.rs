//! Line codec for the ingestion feed
//!
//! Reporting agents write one JSON document per line. A line carries either
//! an array of records or a single record object.

use crate::error::{EngineError, Result};
use crate::models::RawRecord;

/// Decode one feed line into raw records
///
/// Blank lines decode to no records. Records without a timestamp (absent or
/// `0`) are stamped with `received_at` (unix seconds). A line that is neither
/// a record nor an array of records is rejected as a whole.
pub fn decode_line(line: &str, received_at: i64) -> Result<Vec<RawRecord>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(Vec::new());
    }

    let mut records = match serde_json::from_str::<Vec<RawRecord>>(line) {
        Ok(records) => records,
        Err(batch_err) => match serde_json::from_str::<RawRecord>(line) {
            Ok(record) => vec![record],
            Err(_) => {
                return Err(EngineError::malformed(format!(
                    "invalid JSON: {}",
                    batch_err
                )))
            }
        },
    };

    for record in &mut records {
        stamp_if_missing(record, received_at);
    }

    Ok(records)
}

/// Fill in the receive time when the agent sent no timestamp
pub fn stamp_if_missing(record: &mut RawRecord, received_at: i64) {
    if matches!(record.timestamp, None | Some(0)) {
        record.timestamp = Some(received_at);
    }
}
