use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::signal::PatientId;
use crate::store::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Other,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
            Gender::Other => "other",
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Gender {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "male" => Ok(Gender::Male),
            "female" => Ok(Gender::Female),
            "other" => Ok(Gender::Other),
            other => Err(StoreError::Invalid(format!(
                "gender must be male, female or other, got {:?}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    pub id: PatientId,
    pub first_name: String,
    pub last_name: String,
    pub birth_date: NaiveDate,
    pub gender: Gender,
    pub notes: String,
    pub created_at: DateTime<Utc>,
}

impl Patient {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Registration form for a new patient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPatient {
    pub first_name: String,
    pub last_name: String,
    pub birth_date: NaiveDate,
    pub gender: Gender,
    #[serde(default)]
    pub notes: Option<String>,
}

impl NewPatient {
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.first_name.trim().is_empty() {
            return Err(StoreError::Invalid("first name is required".into()));
        }
        if self.last_name.trim().is_empty() {
            return Err(StoreError::Invalid("last name is required".into()));
        }
        Ok(())
    }

    /// Validate and stamp the record with a fresh id and creation time.
    pub fn into_patient(self, created_at: DateTime<Utc>) -> Result<Patient, StoreError> {
        self.validate()?;
        Ok(Patient {
            id: PatientId::new_v4(),
            first_name: self.first_name.trim().to_string(),
            last_name: self.last_name.trim().to_string(),
            birth_date: self.birth_date,
            gender: self.gender,
            notes: self.notes.unwrap_or_default(),
            created_at,
        })
    }
}

/// A flagged window recorded against a patient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub id: Uuid,
    pub patient_id: PatientId,
    pub created_at: DateTime<Utc>,
}

impl Detection {
    pub fn new(patient_id: PatientId, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            patient_id,
            created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form() -> NewPatient {
        NewPatient {
            first_name: " Ada ".into(),
            last_name: "Lovelace".into(),
            birth_date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            gender: Gender::Female,
            notes: None,
        }
    }

    #[test]
    fn blank_names_are_rejected() {
        let mut f = form();
        f.first_name = "   ".into();
        assert!(matches!(f.validate(), Err(StoreError::Invalid(_))));
        let mut f = form();
        f.last_name = String::new();
        assert!(matches!(f.validate(), Err(StoreError::Invalid(_))));
    }

    #[test]
    fn into_patient_trims_and_defaults_notes() {
        let patient = form().into_patient(Utc::now()).unwrap();
        assert_eq!(patient.first_name, "Ada");
        assert_eq!(patient.notes, "");
        assert_eq!(patient.full_name(), "Ada Lovelace");
    }

    #[test]
    fn gender_parses_closed_set() {
        assert_eq!("Other".parse::<Gender>().unwrap(), Gender::Other);
        assert!("unknown".parse::<Gender>().is_err());
    }
}
