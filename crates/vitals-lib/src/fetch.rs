use log::debug;
use thiserror::Error;

use crate::signal::{Channel, PatientId, Window, WindowedSignals};
use crate::store::{SampleStore, StoreError};
use crate::window::WindowResolver;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("storage unavailable while reading {channel}: {source}")]
    StorageUnavailable {
        channel: Channel,
        #[source]
        source: StoreError,
    },
}

/// Values of one channel inside `window`, ascending by timestamp.
pub fn fetch_channel<S: SampleStore + ?Sized>(
    store: &S,
    channel: Channel,
    patient: PatientId,
    window: &Window,
) -> Result<Vec<f64>, FetchError> {
    let mut rows = store
        .samples_in_range(channel, patient, window.start, window.end)
        .map_err(|source| FetchError::StorageUnavailable { channel, source })?;
    rows.sort_by_key(|s| s.timestamp);
    Ok(rows.into_iter().map(|s| s.value).collect())
}

/// ECG and respiration values for `patient` inside `window`.
///
/// The two channels are read by independent queries and need not have the
/// same length. An empty window is not an error. Nothing is retried.
pub fn fetch_window<S: SampleStore + ?Sized>(
    store: &S,
    patient: PatientId,
    window: &Window,
) -> Result<WindowedSignals, FetchError> {
    let ecg = fetch_channel(store, Channel::Ecg, patient, window)?;
    let resp = fetch_channel(store, Channel::Resp, patient, window)?;
    debug!(
        "patient {} window {} .. {}: {} ecg, {} resp",
        patient,
        window.start,
        window.end,
        ecg.len(),
        resp.len()
    );
    Ok(WindowedSignals { ecg, resp })
}

/// Store handle plus window resolution for one deployment.
pub struct SignalFetcher<S> {
    store: S,
    resolver: WindowResolver,
}

impl<S: SampleStore> SignalFetcher<S> {
    pub fn new(store: S, resolver: WindowResolver) -> Self {
        Self { store, resolver }
    }

    pub fn fetch_window(
        &self,
        patient: PatientId,
        window: &Window,
    ) -> Result<WindowedSignals, FetchError> {
        fetch_window(&self.store, patient, window)
    }

    /// Resolve `step` to a window and fetch both channels for it.
    pub fn get_windowed_signals(
        &self,
        patient: PatientId,
        step: i64,
    ) -> Result<WindowedSignals, FetchError> {
        let window = self.resolver.resolve(step);
        self.fetch_window(patient, &window)
    }
}
