use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ObjectIdError {
    #[error("object id must be 24 hex characters, got {0} characters")]
    Length(usize),
    #[error("object id contains a non-hex character: {0:?}")]
    NonHex(String),
}

/// 24-character lowercase hex identifier, the portal's primary key format.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectId(String);

impl ObjectId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for ObjectId {
    type Err = ObjectIdError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value.len() != 24 {
            return Err(ObjectIdError::Length(value.len()));
        }
        if !value.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ObjectIdError::NonHex(value.to_string()));
        }
        Ok(Self(value.to_ascii_lowercase()))
    }
}

impl TryFrom<String> for ObjectId {
    type Error = ObjectIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ObjectId> for String {
    fn from(id: ObjectId) -> Self {
        id.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocStatus {
    Approved,
    Pending,
    Rejected,
}

impl DocStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DocStatus::Approved => "Approved",
            DocStatus::Pending => "Pending",
            DocStatus::Rejected => "Rejected",
        }
    }
}

impl FromStr for DocStatus {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "Approved" => Ok(DocStatus::Approved),
            "Pending" => Ok(DocStatus::Pending),
            "Rejected" => Ok(DocStatus::Rejected),
            other => Err(anyhow::anyhow!("unknown document status {other:?}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub step_id: i32,
    pub step_name: String,
    pub status: bool,
    pub completed_by: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Appointment {
    pub id: ObjectId,
    pub reference: String,
    pub user_id: String,
    pub sub_service_id: ObjectId,
    pub steps: Vec<Step>,
    pub created_at: DateTime<Utc>,
    pub appointment_date: Option<DateTime<Utc>>,
    pub appointment_time: Option<DateTime<Utc>>,
    pub predicted_duration: i32,
    pub is_fully_completed: bool,
    pub payment_status: bool,
    pub appointment_confirmed: bool,
}

#[derive(Debug, Clone)]
pub struct SubService {
    pub id: ObjectId,
    pub service_name: String,
    pub payment_amount: f64,
    pub required_docs: Vec<ObjectId>,
    pub description: String,
}

#[derive(Debug, Clone)]
pub struct RequiredDocument {
    pub id: ObjectId,
    pub doc_name: String,
    pub description: String,
}

#[derive(Debug, Clone)]
pub struct UploadedDocument {
    pub id: ObjectId,
    pub booking_id: ObjectId,
    pub required_doc_id: ObjectId,
    pub user_id: String,
    pub file_name: String,
    pub file_path: String,
    pub accuracy: Option<f64>,
    pub doc_status: DocStatus,
    pub uploaded_at: DateTime<Utc>,
}

/// Row shape shared by the three status views.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppointmentSummary {
    pub appointment_id: String,
    pub service_name: String,
    pub appointment_date: Option<DateTime<Utc>>,
    pub is_fully_completed: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FixtureCounts {
    pub appointments: i64,
    pub sub_services: i64,
    pub required_documents: i64,
    pub uploaded_documents: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_id_accepts_mongo_hex() {
        let id: ObjectId = "689CD830EF2618D4DFE5A595".parse().unwrap();
        assert_eq!(id.as_str(), "689cd830ef2618d4dfe5a595");
    }

    #[test]
    fn object_id_rejects_bad_input() {
        assert_eq!(
            "abc".parse::<ObjectId>(),
            Err(ObjectIdError::Length(3))
        );
        assert!(matches!(
            "689cd830ef2618d4dfe5a59z".parse::<ObjectId>(),
            Err(ObjectIdError::NonHex(_))
        ));
    }

    #[test]
    fn doc_status_parses_stored_values() {
        assert_eq!("Rejected".parse::<DocStatus>().unwrap(), DocStatus::Rejected);
        assert!("pending".parse::<DocStatus>().is_err());
    }
}
