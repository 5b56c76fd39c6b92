use chrono::{DateTime, Duration, Utc};
use log::debug;

use crate::config::{DeploymentConfig, StepPolicy};
use crate::signal::Window;

/// Turn a step (sample count past `origin`) into a fixed-length window.
///
/// `start = origin + step * (1000 / sample_rate)` ms and
/// `end = start + window_size_s * 1000` ms. Offsets are carried as whole
/// nanoseconds, so every window has exactly the same duration. Steps that land
/// outside the stored data are not an error; the query just comes back empty.
/// Results saturate at the limits of `DateTime<Utc>`.
pub fn resolve_window(
    step: i64,
    origin: DateTime<Utc>,
    sample_rate: f64,
    window_size_s: f64,
) -> Window {
    let offset = Duration::nanoseconds((step as f64 * (1e9 / sample_rate)).round() as i64);
    let length = Duration::nanoseconds((window_size_s * 1e9).round() as i64);
    let start = saturating_add(origin, offset);
    let end = saturating_add(start, length);
    Window { start, end }
}

fn saturating_add(ts: DateTime<Utc>, delta: Duration) -> DateTime<Utc> {
    ts.checked_add_signed(delta).unwrap_or(if delta < Duration::zero() {
        DateTime::<Utc>::MIN_UTC
    } else {
        DateTime::<Utc>::MAX_UTC
    })
}

/// Window resolution bound to one deployment's constants.
#[derive(Debug, Clone)]
pub struct WindowResolver {
    origin: DateTime<Utc>,
    sample_rate: f64,
    window_size_s: f64,
    policy: StepPolicy,
    total_samples: Option<i64>,
}

impl WindowResolver {
    pub fn new(cfg: &DeploymentConfig) -> Self {
        Self {
            origin: cfg.origin,
            sample_rate: cfg.sample_rate,
            window_size_s: cfg.window_size_s,
            policy: cfg.step_policy,
            total_samples: cfg.total_samples(),
        }
    }

    /// Valid slider range, when the dataset end is known.
    pub fn bounds(&self) -> Option<(i64, i64)> {
        self.total_samples.map(|total| (0, total))
    }

    /// The step actually used for `step` under the configured policy.
    pub fn effective_step(&self, step: i64) -> i64 {
        match (self.policy, self.total_samples) {
            (StepPolicy::Clamp, Some(total)) => step.clamp(0, total),
            _ => step,
        }
    }

    pub fn resolve(&self, step: i64) -> Window {
        let effective = self.effective_step(step);
        let window = resolve_window(effective, self.origin, self.sample_rate, self.window_size_s);
        debug!(
            "step {} (effective {}) -> window {} .. {}",
            step, effective, window.start, window.end
        );
        window
    }
}
