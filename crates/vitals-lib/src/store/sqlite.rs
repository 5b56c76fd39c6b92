use chrono::{DateTime, NaiveDate, Utc};
use log::{debug, info};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};
use std::path::Path;
use std::str::FromStr;
use uuid::Uuid;

use super::{
    storable_nanos, PatientRegistry, SampleExtent, SampleSink, SampleStore, StoreError,
};
use crate::patient::{Detection, Gender, NewPatient, Patient};
use crate::signal::{clamped_nanos, timestamp_from_nanos, Channel, PatientId, Sample};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS patients (
    id TEXT PRIMARY KEY,
    first_name TEXT NOT NULL,
    last_name TEXT NOT NULL,
    birth_date TEXT NOT NULL,
    gender TEXT NOT NULL CHECK (gender IN ('male', 'female', 'other')),
    notes TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS detections (
    id TEXT PRIMARY KEY,
    patient_id TEXT NOT NULL REFERENCES patients(id),
    created_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS ecg (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    patient_id TEXT NOT NULL REFERENCES patients(id),
    timestamp_ns INTEGER NOT NULL,
    value REAL NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_ecg_patient_timestamp ON ecg(patient_id, timestamp_ns);
CREATE TABLE IF NOT EXISTS resp (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    patient_id TEXT NOT NULL REFERENCES patients(id),
    timestamp_ns INTEGER NOT NULL,
    value REAL NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_resp_patient_timestamp ON resp(patient_id, timestamp_ns);
";

/// SQLite-backed store. One table per channel, indexed on `(patient_id, timestamp_ns)`.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open or create the database at `path` and make sure the schema exists.
    pub fn create(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let store = Self::from_connection(conn)?;
        info!("initialised sample store at {}", path.display());
        Ok(store)
    }

    /// Open an existing database; a missing file is reported as unavailable.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| StoreError::Unavailable(format!("{}: {}", path.display(), e)))?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    fn has_patient(&self, id: PatientId) -> Result<bool, StoreError> {
        let found = self
            .conn
            .query_row(
                "SELECT 1 FROM patients WHERE id = ?1",
                params![id.to_string()],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }
}

impl SampleStore for SqliteStore {
    fn samples_in_range(
        &self,
        channel: Channel,
        patient: PatientId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Sample>, StoreError> {
        let sql = format!(
            "SELECT timestamp_ns, value FROM {} \
             WHERE patient_id = ?1 AND timestamp_ns >= ?2 AND timestamp_ns <= ?3 \
             ORDER BY timestamp_ns ASC, id ASC",
            channel.as_str()
        );
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let rows = stmt.query_map(
            params![
                patient.to_string(),
                clamped_nanos(start),
                clamped_nanos(end)
            ],
            |row| {
                Ok(Sample {
                    patient_id: patient,
                    timestamp: timestamp_from_nanos(row.get(0)?),
                    value: row.get(1)?,
                })
            },
        )?;
        let samples = rows.collect::<Result<Vec<_>, _>>()?;
        debug!(
            "{} rows from {} for patient {}",
            samples.len(),
            channel,
            patient
        );
        Ok(samples)
    }

    fn extent(
        &self,
        channel: Channel,
        patient: PatientId,
    ) -> Result<Option<SampleExtent>, StoreError> {
        let sql = format!(
            "SELECT MIN(timestamp_ns), MAX(timestamp_ns), COUNT(*) FROM {} WHERE patient_id = ?1",
            channel.as_str()
        );
        let (first, last, count): (Option<i64>, Option<i64>, i64) =
            self.conn
                .query_row(&sql, params![patient.to_string()], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
                })?;
        Ok(match (first, last) {
            (Some(first), Some(last)) => Some(SampleExtent {
                first: timestamp_from_nanos(first),
                last: timestamp_from_nanos(last),
                count: count as usize,
            }),
            _ => None,
        })
    }
}

impl SampleSink for SqliteStore {
    fn append(&mut self, channel: Channel, samples: &[Sample]) -> Result<usize, StoreError> {
        let mut known: Vec<PatientId> = Vec::new();
        for sample in samples {
            if known.contains(&sample.patient_id) {
                continue;
            }
            if !self.has_patient(sample.patient_id)? {
                return Err(StoreError::UnknownPatient(sample.patient_id));
            }
            known.push(sample.patient_id);
        }
        let keys = samples
            .iter()
            .map(storable_nanos)
            .collect::<Result<Vec<_>, _>>()?;
        let sql = format!(
            "INSERT INTO {} (patient_id, timestamp_ns, value) VALUES (?1, ?2, ?3)",
            channel.as_str()
        );
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(&sql)?;
            for (sample, key) in samples.iter().zip(keys) {
                stmt.execute(params![sample.patient_id.to_string(), key, sample.value])?;
            }
        }
        tx.commit()?;
        debug!("appended {} rows to {}", samples.len(), channel);
        Ok(samples.len())
    }
}

impl PatientRegistry for SqliteStore {
    fn create_patient(&mut self, form: NewPatient) -> Result<Patient, StoreError> {
        let patient = form.into_patient(Utc::now())?;
        self.conn.execute(
            "INSERT INTO patients (id, first_name, last_name, birth_date, gender, notes, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                patient.id.to_string(),
                patient.first_name,
                patient.last_name,
                patient.birth_date.format("%Y-%m-%d").to_string(),
                patient.gender.as_str(),
                patient.notes,
                patient.created_at.to_rfc3339(),
            ],
        )?;
        info!("registered patient {}", patient.id);
        Ok(patient)
    }

    fn list_patients(&self) -> Result<Vec<Patient>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, first_name, last_name, birth_date, gender, notes, created_at \
             FROM patients ORDER BY rowid ASC",
        )?;
        let rows = stmt.query_map([], PatientRow::from_row)?;
        let mut patients = Vec::new();
        for row in rows {
            patients.push(row?.decode()?);
        }
        Ok(patients)
    }

    fn find_patient(&self, id: PatientId) -> Result<Option<Patient>, StoreError> {
        let row = self
            .conn
            .query_row(
                "SELECT id, first_name, last_name, birth_date, gender, notes, created_at \
                 FROM patients WHERE id = ?1",
                params![id.to_string()],
                PatientRow::from_row,
            )
            .optional()?;
        row.map(PatientRow::decode).transpose()
    }

    fn record_detection(&mut self, patient: PatientId) -> Result<Detection, StoreError> {
        if !self.has_patient(patient)? {
            return Err(StoreError::UnknownPatient(patient));
        }
        let detection = Detection::new(patient, Utc::now());
        self.conn.execute(
            "INSERT INTO detections (id, patient_id, created_at) VALUES (?1, ?2, ?3)",
            params![
                detection.id.to_string(),
                patient.to_string(),
                detection.created_at.to_rfc3339()
            ],
        )?;
        info!("recorded detection {} for patient {}", detection.id, patient);
        Ok(detection)
    }

    fn detections(&self, patient: PatientId) -> Result<Vec<Detection>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, created_at FROM detections WHERE patient_id = ?1 \
             ORDER BY rowid ASC",
        )?;
        let rows = stmt.query_map(params![patient.to_string()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (id, created_at) = row?;
            out.push(Detection {
                id: Uuid::parse_str(&id).map_err(|e| StoreError::Corrupt(e.to_string()))?,
                patient_id: patient,
                created_at: parse_rfc3339(&created_at)?,
            });
        }
        Ok(out)
    }
}

struct PatientRow {
    id: String,
    first_name: String,
    last_name: String,
    birth_date: String,
    gender: String,
    notes: String,
    created_at: String,
}

impl PatientRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            first_name: row.get(1)?,
            last_name: row.get(2)?,
            birth_date: row.get(3)?,
            gender: row.get(4)?,
            notes: row.get(5)?,
            created_at: row.get(6)?,
        })
    }

    fn decode(self) -> Result<Patient, StoreError> {
        Ok(Patient {
            id: PatientId::from_str(&self.id).map_err(|e| StoreError::Corrupt(e.to_string()))?,
            first_name: self.first_name,
            last_name: self.last_name,
            birth_date: NaiveDate::parse_from_str(&self.birth_date, "%Y-%m-%d")
                .map_err(|e| StoreError::Corrupt(format!("birth_date: {}", e)))?,
            gender: Gender::from_str(&self.gender)
                .map_err(|e| StoreError::Corrupt(e.to_string()))?,
            notes: self.notes,
            created_at: parse_rfc3339(&self.created_at)?,
        })
    }
}

fn parse_rfc3339(text: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(text)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("timestamp {:?}: {}", text, e)))
}
