use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Opaque patient identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatientId(pub Uuid);

impl PatientId {
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for PatientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for PatientId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// One of the two independently stored sample streams per patient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Ecg,
    Resp,
}

impl Channel {
    pub const ALL: [Channel; 2] = [Channel::Ecg, Channel::Resp];

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Ecg => "ecg",
            Channel::Resp => "resp",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ecg" => Ok(Channel::Ecg),
            "resp" | "respiration" => Ok(Channel::Resp),
            other => Err(format!("unknown channel: {} (expected ecg or resp)", other)),
        }
    }
}

/// A single time-stamped reading on one channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub patient_id: PatientId,
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// Closed time interval used to bound a query and a chart view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Window {
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts <= self.end
    }
}

/// Values of both channels for one window, each ascending by timestamp.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WindowedSignals {
    pub ecg: Vec<f64>,
    pub resp: Vec<f64>,
}

impl WindowedSignals {
    pub fn channel(&self, channel: Channel) -> &[f64] {
        match channel {
            Channel::Ecg => &self.ecg,
            Channel::Resp => &self.resp,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ecg.is_empty() && self.resp.is_empty()
    }
}

/// Basic typed time series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeSeries {
    /// Uniform sampling frequency in Hz
    pub fs: f64,
    /// Samples
    pub data: Vec<f64>,
}

/// Nanoseconds since the Unix epoch; `None` outside 1677-09-21 .. 2262-04-11.
pub fn timestamp_to_nanos(ts: DateTime<Utc>) -> Option<i64> {
    ts.timestamp_nanos_opt()
}

/// Saturating [`timestamp_to_nanos`]. Only for query bounds, never stored values.
pub fn clamped_nanos(ts: DateTime<Utc>) -> i64 {
    timestamp_to_nanos(ts).unwrap_or(if ts.timestamp() < 0 {
        i64::MIN
    } else {
        i64::MAX
    })
}

pub fn timestamp_from_nanos(nanos: i64) -> DateTime<Utc> {
    Utc.timestamp_nanos(nanos)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_parses_names() {
        assert_eq!("ECG".parse::<Channel>().unwrap(), Channel::Ecg);
        assert_eq!("respiration".parse::<Channel>().unwrap(), Channel::Resp);
        assert!("eeg".parse::<Channel>().is_err());
    }

    #[test]
    fn nanos_round_trip_keeps_millis() {
        let ts = DateTime::parse_from_rfc3339("2024-12-14T22:04:51.760Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(timestamp_from_nanos(timestamp_to_nanos(ts).unwrap()), ts);
    }

    #[test]
    fn nanos_outside_range_are_refused_not_saturated() {
        let early = DateTime::parse_from_rfc3339("1600-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let late = DateTime::parse_from_rfc3339("2300-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(timestamp_to_nanos(early), None);
        assert_eq!(timestamp_to_nanos(late), None);
        assert_eq!(clamped_nanos(early), i64::MIN);
        assert_eq!(clamped_nanos(late), i64::MAX);
    }

    #[test]
    fn window_contains_is_inclusive() {
        let start = timestamp_from_nanos(0);
        let end = timestamp_from_nanos(1_000);
        let w = Window { start, end };
        assert!(w.contains(start));
        assert!(w.contains(end));
        assert!(!w.contains(timestamp_from_nanos(1_001)));
    }
}
