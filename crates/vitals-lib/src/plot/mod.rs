use serde::{Deserialize, Serialize};

use crate::signal::{TimeSeries, WindowedSignals};

const ECG_COLOR: u32 = 0xE4572E;
const RESP_COLOR: u32 = 0x2E86AB;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Axis {
    pub label: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Style {
    pub width: f32,
    pub color: Color,
}

#[derive(Debug, Copy, Clone, Serialize, Deserialize)]
pub struct Color(pub u32);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineSeries {
    pub name: String,
    pub points: Vec<[f64; 2]>,
    pub style: Style,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Figure {
    pub title: Option<String>,
    pub x: Axis,
    pub y: Axis,
    pub series: Vec<LineSeries>,
}

impl Figure {
    pub fn new(title: impl Into<Option<String>>) -> Self {
        Self {
            title: title.into(),
            x: Axis { label: None },
            y: Axis { label: None },
            series: Vec::new(),
        }
    }

    pub fn add_series(&mut self, series: LineSeries) {
        self.series.push(series);
    }
}

pub fn decimate_points(points: &[[f64; 2]], max_points: usize) -> Vec<[f64; 2]> {
    if points.len() <= max_points {
        return points.to_vec();
    }
    let bucket_size = points.len() as f64 / max_points as f64;
    let mut result = Vec::with_capacity(max_points);
    for i in 0..max_points {
        let start = (i as f64 * bucket_size).floor() as usize;
        if start >= points.len() {
            break;
        }
        result.push(points[start]);
    }
    result
}

/// Chart one window of a channel: x is milliseconds into the window
/// (`index * 1000 / fs`), y is the raw amplitude.
pub fn figure_from_window(title: &str, series: &TimeSeries, max_points: usize, color: u32) -> Figure {
    let dt_ms = 1000.0 / series.fs;
    let points: Vec<[f64; 2]> = series
        .data
        .iter()
        .enumerate()
        .map(|(i, value)| [i as f64 * dt_ms, *value])
        .collect();
    let mut fig = Figure::new(Some(title.to_string()));
    fig.x.label = Some("ms".into());
    fig.y.label = Some("amplitude".into());
    fig.add_series(LineSeries {
        name: title.into(),
        points: decimate_points(&points, max_points),
        style: Style {
            width: 1.4,
            color: Color(color),
        },
    });
    fig
}

/// ECG and respiration figures for a fetched window.
pub fn figures_for_signals(
    signals: &WindowedSignals,
    sample_rate: f64,
    max_points: usize,
) -> [Figure; 2] {
    let ecg = TimeSeries {
        fs: sample_rate,
        data: signals.ecg.clone(),
    };
    let resp = TimeSeries {
        fs: sample_rate,
        data: signals.resp.clone(),
    };
    [
        figure_from_window("ECG", &ecg, max_points, ECG_COLOR),
        figure_from_window("Respiratory", &resp, max_points, RESP_COLOR),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn x_axis_is_milliseconds_per_sample() {
        let ts = TimeSeries {
            fs: 250.0,
            data: vec![0.0, 1.0, 0.5],
        };
        let fig = figure_from_window("ECG", &ts, 1024, ECG_COLOR);
        let xs: Vec<f64> = fig.series[0].points.iter().map(|p| p[0]).collect();
        assert_eq!(xs, vec![0.0, 4.0, 8.0]);
    }

    #[test]
    fn decimation_caps_point_count() {
        let points: Vec<[f64; 2]> = (0..10_000).map(|i| [i as f64, 0.0]).collect();
        let out = decimate_points(&points, 500);
        assert_eq!(out.len(), 500);
        assert_eq!(out[0], [0.0, 0.0]);
    }

    #[test]
    fn both_channels_get_a_figure() {
        let signals = WindowedSignals {
            ecg: vec![0.0; 4],
            resp: vec![0.0; 2],
        };
        let [ecg, resp] = figures_for_signals(&signals, 250.0, 1024);
        assert_eq!(ecg.series[0].points.len(), 4);
        assert_eq!(resp.title.as_deref(), Some("Respiratory"));
    }
}
