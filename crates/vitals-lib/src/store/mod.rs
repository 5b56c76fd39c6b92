//! Storage collaborators: where samples, patients and detections live.
//!
//! The window fetch only needs [`SampleStore`]; ingestion and patient
//! bookkeeping use [`SampleSink`] and [`PatientRegistry`]. Handles are opened
//! by the application and passed in explicitly.

pub mod memory;
pub mod sqlite;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::patient::{Detection, NewPatient, Patient};
use crate::signal::{timestamp_to_nanos, Channel, PatientId, Sample};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("stored record could not be decoded: {0}")]
    Corrupt(String),
    #[error("unknown patient {0}")]
    UnknownPatient(PatientId),
    #[error("invalid input: {0}")]
    Invalid(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        StoreError::Unavailable(value.to_string())
    }
}

/// Nanosecond key a sample is stored under. Timestamps that do not fit are
/// rejected rather than clamped.
pub fn storable_nanos(sample: &Sample) -> Result<i64, StoreError> {
    timestamp_to_nanos(sample.timestamp).ok_or_else(|| {
        StoreError::Invalid(format!(
            "timestamp {} is outside the storable range",
            sample.timestamp
        ))
    })
}

/// First/last timestamp and row count of one patient's channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleExtent {
    pub first: DateTime<Utc>,
    pub last: DateTime<Utc>,
    pub count: usize,
}

/// Read access to stored samples.
pub trait SampleStore {
    /// Samples of `patient` on `channel` with `start <= timestamp <= end`,
    /// ascending by timestamp. Rows sharing a timestamp keep insertion order.
    fn samples_in_range(
        &self,
        channel: Channel,
        patient: PatientId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Sample>, StoreError>;

    /// `None` when the patient has no samples on `channel`.
    fn extent(&self, channel: Channel, patient: PatientId)
        -> Result<Option<SampleExtent>, StoreError>;
}

impl<T: SampleStore + ?Sized> SampleStore for &T {
    fn samples_in_range(
        &self,
        channel: Channel,
        patient: PatientId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Sample>, StoreError> {
        (**self).samples_in_range(channel, patient, start, end)
    }

    fn extent(
        &self,
        channel: Channel,
        patient: PatientId,
    ) -> Result<Option<SampleExtent>, StoreError> {
        (**self).extent(channel, patient)
    }
}

/// Append-only ingestion of samples.
pub trait SampleSink {
    /// Store `samples` on `channel`; every sample must belong to a known patient
    /// and carry a storable timestamp. Nothing is written if any sample is rejected.
    fn append(&mut self, channel: Channel, samples: &[Sample]) -> Result<usize, StoreError>;
}

pub trait PatientRegistry {
    fn create_patient(&mut self, form: NewPatient) -> Result<Patient, StoreError>;
    fn list_patients(&self) -> Result<Vec<Patient>, StoreError>;
    fn find_patient(&self, id: PatientId) -> Result<Option<Patient>, StoreError>;
    fn record_detection(&mut self, patient: PatientId) -> Result<Detection, StoreError>;
    /// Detections for `patient`, oldest first.
    fn detections(&self, patient: PatientId) -> Result<Vec<Detection>, StoreError>;
}
