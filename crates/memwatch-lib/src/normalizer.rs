//! Snapshot normalization
//!
//! Turns raw feed records into engine-owned [`Snapshot`] values. Conversion
//! is exact; rounding only happens when summaries are presented.

use crate::error::{EngineError, Result};
use crate::models::{RawRecord, Snapshot};

/// Derive the ratio from KB fields: `allocated / max(free, 1) * 100`
pub fn derive_ratio(allocated_kb: u64, free_kb: u64) -> f64 {
    allocated_kb as f64 / free_kb.max(1) as f64 * 100.0
}

/// Validate a raw record and convert it into a canonical snapshot
///
/// Fails with [`EngineError::MalformedRecord`] when the system id is empty,
/// any numeric field is negative or non-finite, the timestamp is missing, or
/// neither the allocation fields nor a ratio are present.
pub fn normalize(raw: &RawRecord) -> Result<Snapshot> {
    let system_id = raw.system_id.trim();
    if system_id.is_empty() {
        return Err(EngineError::malformed("empty system id"));
    }

    let timestamp_secs = match raw.timestamp {
        Some(ts) if ts < 0 => {
            return Err(EngineError::malformed(format!(
                "negative timestamp {} for system {}",
                ts, system_id
            )))
        }
        Some(ts) => ts,
        None => {
            return Err(EngineError::malformed(format!(
                "missing timestamp for system {}",
                system_id
            )))
        }
    };

    let allocated_kb = non_negative_kb(raw.alloc_kb, "AllocKB", system_id)?;
    let free_kb = non_negative_kb(raw.free_kb, "FreeKB", system_id)?;

    if let Some(ratio) = raw.ratio {
        if !ratio.is_finite() || ratio < 0.0 {
            return Err(EngineError::malformed(format!(
                "ratio {} out of range for system {}",
                ratio, system_id
            )));
        }
    }

    let ratio = match (raw.ratio, allocated_kb) {
        (Some(ratio), _) => ratio,
        (None, Some(alloc)) => derive_ratio(alloc, free_kb.unwrap_or(0)),
        (None, None) => {
            return Err(EngineError::malformed(format!(
                "system {} reported neither allocation fields nor a ratio",
                system_id
            )))
        }
    };

    Ok(Snapshot {
        system_id: system_id.to_string(),
        timestamp_secs,
        allocated_kb: allocated_kb.unwrap_or(0),
        free_kb: free_kb.unwrap_or(0),
        process_name: raw
            .process
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string),
        pid: raw.pid,
        ratio,
        leak_suspect: raw.leak_suspect.unwrap_or(false),
    })
}

fn non_negative_kb(value: Option<i64>, field: &str, system_id: &str) -> Result<Option<u64>> {
    match value {
        Some(v) if v < 0 => Err(EngineError::malformed(format!(
            "negative {} ({}) for system {}",
            field, v, system_id
        ))),
        Some(v) => Ok(Some(v as u64)),
        None => Ok(None),
    }
}
