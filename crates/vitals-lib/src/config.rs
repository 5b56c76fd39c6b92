use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::signal::timestamp_to_nanos;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("sample rate must be a finite value greater than zero, got {0}")]
    InvalidSampleRate(f64),
    #[error("window size must be a finite number of seconds greater than zero, got {0}")]
    InvalidWindowSize(f64),
    #[error("dataset end {end} is before origin {origin}")]
    EndBeforeOrigin {
        origin: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    #[error("{field} {value} is outside the supported range (1677-09-21 .. 2262-04-11)")]
    TimestampOutOfRange {
        field: &'static str,
        value: DateTime<Utc>,
    },
    #[error("step_policy = \"clamp\" needs the dataset `end` to bound the step")]
    ClampWithoutEnd,
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// How the window resolver treats a step outside the dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepPolicy {
    /// Pass the step through; out-of-range windows simply come back empty.
    #[default]
    Unclamped,
    /// Clamp the step to `0..=total_samples`.
    Clamp,
}

/// Per-deployment constants for window resolution and slope detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentConfig {
    /// Earliest sample time of the active dataset; step 0 starts here.
    pub origin: DateTime<Utc>,
    /// Last sample time of the active dataset, if known.
    #[serde(default)]
    pub end: Option<DateTime<Utc>>,
    /// Samples per second, assumed uniform on every channel.
    pub sample_rate: f64,
    /// Seconds of data covered by one window.
    pub window_size_s: f64,
    #[serde(default)]
    pub step_policy: StepPolicy,
    /// SQLite file holding patients and samples.
    #[serde(default)]
    pub database: Option<PathBuf>,
}

impl DeploymentConfig {
    pub fn new(origin: DateTime<Utc>, sample_rate: f64, window_size_s: f64) -> Self {
        Self {
            origin,
            end: None,
            sample_rate,
            window_size_s,
            step_policy: StepPolicy::default(),
            database: None,
        }
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut cfg = Self::from_toml_str(&contents)?;
        // Relative database paths are relative to the config file.
        if let (Some(db), Some(dir)) = (cfg.database.as_ref(), path.parent()) {
            if db.is_relative() {
                cfg.database = Some(dir.join(db));
            }
        }
        Ok(cfg)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let cfg: DeploymentConfig = toml::from_str(contents)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.sample_rate.is_finite() || self.sample_rate <= 0.0 {
            return Err(ConfigError::InvalidSampleRate(self.sample_rate));
        }
        if !self.window_size_s.is_finite() || self.window_size_s <= 0.0 {
            return Err(ConfigError::InvalidWindowSize(self.window_size_s));
        }
        if timestamp_to_nanos(self.origin).is_none() {
            return Err(ConfigError::TimestampOutOfRange {
                field: "origin",
                value: self.origin,
            });
        }
        if let Some(end) = self.end {
            if timestamp_to_nanos(end).is_none() {
                return Err(ConfigError::TimestampOutOfRange {
                    field: "end",
                    value: end,
                });
            }
            if end < self.origin {
                return Err(ConfigError::EndBeforeOrigin {
                    origin: self.origin,
                    end,
                });
            }
        }
        if self.step_policy == StepPolicy::Clamp && self.end.is_none() {
            return Err(ConfigError::ClampWithoutEnd);
        }
        Ok(())
    }

    pub fn sample_period_s(&self) -> f64 {
        1.0 / self.sample_rate
    }

    pub fn window_samples(&self) -> i64 {
        (self.window_size_s * self.sample_rate).round() as i64
    }

    /// Number of samples between `origin` and `end`.
    pub fn total_samples(&self) -> Option<i64> {
        let end = self.end?;
        let span = end - self.origin;
        let span_s = match span.num_nanoseconds() {
            Some(ns) => ns as f64 / 1e9,
            None => span.num_milliseconds() as f64 / 1e3,
        };
        Some((span_s * self.sample_rate).round() as i64)
    }

    /// Initial slider position: half a window past the origin.
    pub fn default_step(&self) -> i64 {
        self.window_samples() / 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SNAPSHOT: &str = r#"
origin = "2024-12-14T22:04:51.760Z"
end = "2024-12-14T22:07:21.720Z"
sample_rate = 250.0
window_size_s = 15.0
"#;

    #[test]
    fn parses_snapshot_and_derives_counts() {
        let cfg = DeploymentConfig::from_toml_str(SNAPSHOT).unwrap();
        assert_eq!(cfg.step_policy, StepPolicy::Unclamped);
        assert_eq!(cfg.window_samples(), 3750);
        assert_eq!(cfg.default_step(), 1875);
        assert_eq!(cfg.total_samples(), Some(37490));
        assert!((cfg.sample_period_s() - 0.004).abs() < 1e-12);
    }

    #[test]
    fn rejects_non_positive_sample_rate() {
        let text = SNAPSHOT.replace("sample_rate = 250.0", "sample_rate = 0.0");
        assert!(matches!(
            DeploymentConfig::from_toml_str(&text),
            Err(ConfigError::InvalidSampleRate(_))
        ));
    }

    #[test]
    fn rejects_non_positive_window() {
        let text = SNAPSHOT.replace("window_size_s = 15.0", "window_size_s = -1.0");
        assert!(matches!(
            DeploymentConfig::from_toml_str(&text),
            Err(ConfigError::InvalidWindowSize(_))
        ));
    }

    #[test]
    fn clamp_requires_end() {
        let text = r#"
origin = "2024-12-14T22:04:51.760Z"
sample_rate = 250.0
window_size_s = 15.0
step_policy = "clamp"
"#;
        assert!(matches!(
            DeploymentConfig::from_toml_str(text),
            Err(ConfigError::ClampWithoutEnd)
        ));
    }

    #[test]
    fn end_before_origin_is_rejected() {
        let text = SNAPSHOT.replace("22:07:21.720Z", "22:00:00.000Z");
        assert!(matches!(
            DeploymentConfig::from_toml_str(&text),
            Err(ConfigError::EndBeforeOrigin { .. })
        ));
    }

    #[test]
    fn origin_before_nanosecond_range_is_rejected() {
        let text = SNAPSHOT.replace("2024-12-14T22:04:51.760Z", "1600-01-01T00:00:00Z");
        assert!(matches!(
            DeploymentConfig::from_toml_str(&text),
            Err(ConfigError::TimestampOutOfRange { field: "origin", .. })
        ));
        let text = SNAPSHOT.replace("2024-12-14T22:07:21.720Z", "2300-01-01T00:00:00Z");
        assert!(matches!(
            DeploymentConfig::from_toml_str(&text),
            Err(ConfigError::TimestampOutOfRange { field: "end", .. })
        ));
    }

    #[test]
    fn total_samples_spans_any_dates_without_overflow() {
        let origin = DateTime::parse_from_rfc3339("1600-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let mut cfg = DeploymentConfig::new(origin, 1.0, 15.0);
        cfg.end = Some(
            DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
        );
        let total = cfg.total_samples().unwrap();
        assert!(total > 13_000_000_000, "got {}", total);
        let resolver = crate::window::WindowResolver::new(&cfg);
        assert_eq!(resolver.bounds(), Some((0, total)));
    }

    #[test]
    fn load_resolves_database_next_to_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vitals.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "{}\ndatabase = \"vitals.db\"", SNAPSHOT).unwrap();
        let cfg = DeploymentConfig::load(&path).unwrap();
        assert_eq!(cfg.database, Some(dir.path().join("vitals.db")));
    }
}
