use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration, Utc};
use csv::{ReaderBuilder, Trim};
use serde::Deserialize;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::signal::{timestamp_from_nanos, timestamp_to_nanos, PatientId, Sample};

#[derive(Debug, Deserialize)]
struct SampleRow {
    timestamp: String,
    value: f64,
}

/// RFC 3339, or integer milliseconds since the Unix epoch. Times outside the
/// storable nanosecond range are rejected.
pub fn parse_timestamp(text: &str) -> Result<DateTime<Utc>> {
    let trimmed = text.trim();
    if let Ok(ms) = trimmed.parse::<i64>() {
        let nanos = ms
            .checked_mul(1_000_000)
            .with_context(|| format!("epoch milliseconds out of range: {}", trimmed))?;
        return Ok(timestamp_from_nanos(nanos));
    }
    let ts = DateTime::parse_from_rfc3339(trimmed)
        .with_context(|| format!("not an RFC 3339 timestamp or epoch milliseconds: {}", trimmed))?;
    let ts = ts.with_timezone(&Utc);
    if timestamp_to_nanos(ts).is_none() {
        bail!("timestamp {} is outside 1677-09-21 .. 2262-04-11", trimmed);
    }
    Ok(ts)
}

/// Read `timestamp,value` rows for `patient`, in file order.
pub fn read_samples<R: Read>(reader: R, patient: PatientId) -> Result<Vec<Sample>> {
    let mut reader = ReaderBuilder::new()
        .trim(Trim::All)
        .has_headers(true)
        .from_reader(reader);
    let mut samples = Vec::new();
    for (idx, row) in reader.deserialize::<SampleRow>().enumerate() {
        let row = row.with_context(|| format!("parsing sample row {}", idx + 1))?;
        let timestamp =
            parse_timestamp(&row.timestamp).with_context(|| format!("sample row {}", idx + 1))?;
        samples.push(Sample {
            patient_id: patient,
            timestamp,
            value: row.value,
        });
    }
    Ok(samples)
}

pub fn read_samples_csv(path: &Path, patient: PatientId) -> Result<Vec<Sample>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    read_samples(file, patient).with_context(|| format!("reading {}", path.display()))
}

/// Timestamp a bare value series at `sample_rate`, starting at `start`.
pub fn stamp_uniform(
    values: &[f64],
    start: DateTime<Utc>,
    sample_rate: f64,
    patient: PatientId,
) -> Vec<Sample> {
    let period_ns = 1e9 / sample_rate;
    values
        .iter()
        .enumerate()
        .map(|(i, &value)| Sample {
            patient_id: patient,
            timestamp: start + Duration::nanoseconds((i as f64 * period_ns).round() as i64),
            value,
        })
        .collect()
}
