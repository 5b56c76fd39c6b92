use chrono::{DateTime, Utc};

use super::{
    storable_nanos, PatientRegistry, SampleExtent, SampleSink, SampleStore, StoreError,
};
use crate::patient::{Detection, NewPatient, Patient};
use crate::signal::{Channel, PatientId, Sample};

/// In-process store, kept in insertion order.
#[derive(Debug, Default)]
pub struct MemoryStore {
    patients: Vec<Patient>,
    detections: Vec<Detection>,
    ecg: Vec<Sample>,
    resp: Vec<Sample>,
    offline: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation fail with [`StoreError::Unavailable`] until reset.
    pub fn set_offline(&mut self, offline: bool) {
        self.offline = offline;
    }

    fn check_online(&self) -> Result<(), StoreError> {
        if self.offline {
            Err(StoreError::Unavailable("memory store is offline".into()))
        } else {
            Ok(())
        }
    }

    fn rows(&self, channel: Channel) -> &[Sample] {
        match channel {
            Channel::Ecg => &self.ecg,
            Channel::Resp => &self.resp,
        }
    }

    fn has_patient(&self, id: PatientId) -> bool {
        self.patients.iter().any(|p| p.id == id)
    }
}

impl SampleStore for MemoryStore {
    fn samples_in_range(
        &self,
        channel: Channel,
        patient: PatientId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Sample>, StoreError> {
        self.check_online()?;
        let mut out: Vec<Sample> = self
            .rows(channel)
            .iter()
            .filter(|s| s.patient_id == patient && s.timestamp >= start && s.timestamp <= end)
            .copied()
            .collect();
        // stable: equal timestamps stay in insertion order
        out.sort_by_key(|s| s.timestamp);
        Ok(out)
    }

    fn extent(
        &self,
        channel: Channel,
        patient: PatientId,
    ) -> Result<Option<SampleExtent>, StoreError> {
        self.check_online()?;
        let mut rows = self.rows(channel).iter().filter(|s| s.patient_id == patient);
        let Some(first) = rows.next() else {
            return Ok(None);
        };
        let mut extent = SampleExtent {
            first: first.timestamp,
            last: first.timestamp,
            count: 1,
        };
        for s in rows {
            extent.first = extent.first.min(s.timestamp);
            extent.last = extent.last.max(s.timestamp);
            extent.count += 1;
        }
        Ok(Some(extent))
    }
}

impl SampleSink for MemoryStore {
    fn append(&mut self, channel: Channel, samples: &[Sample]) -> Result<usize, StoreError> {
        self.check_online()?;
        if let Some(unknown) = samples.iter().find(|s| !self.has_patient(s.patient_id)) {
            return Err(StoreError::UnknownPatient(unknown.patient_id));
        }
        for sample in samples {
            storable_nanos(sample)?;
        }
        let rows = match channel {
            Channel::Ecg => &mut self.ecg,
            Channel::Resp => &mut self.resp,
        };
        rows.extend_from_slice(samples);
        Ok(samples.len())
    }
}

impl PatientRegistry for MemoryStore {
    fn create_patient(&mut self, form: NewPatient) -> Result<Patient, StoreError> {
        self.check_online()?;
        let patient = form.into_patient(Utc::now())?;
        self.patients.push(patient.clone());
        Ok(patient)
    }

    fn list_patients(&self) -> Result<Vec<Patient>, StoreError> {
        self.check_online()?;
        Ok(self.patients.clone())
    }

    fn find_patient(&self, id: PatientId) -> Result<Option<Patient>, StoreError> {
        self.check_online()?;
        Ok(self.patients.iter().find(|p| p.id == id).cloned())
    }

    fn record_detection(&mut self, patient: PatientId) -> Result<Detection, StoreError> {
        self.check_online()?;
        if !self.has_patient(patient) {
            return Err(StoreError::UnknownPatient(patient));
        }
        let detection = Detection::new(patient, Utc::now());
        self.detections.push(detection.clone());
        Ok(detection)
    }

    fn detections(&self, patient: PatientId) -> Result<Vec<Detection>, StoreError> {
        self.check_online()?;
        Ok(self
            .detections
            .iter()
            .filter(|d| d.patient_id == patient)
            .cloned()
            .collect())
    }
}
