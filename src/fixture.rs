use anyhow::Context;
use chrono::{DateTime, Utc};
use tracing::info;

use crate::models::{
    Appointment, DocStatus, FixtureCounts, ObjectId, RequiredDocument, Step, SubService,
    UploadedDocument,
};
use crate::store::PortalStore;

pub const FIXTURE_USER: &str = "user123";

pub const APT_2024_001: &str = "689db25103b6e08e79db7d7f";
pub const APT_2024_002: &str = "689db25203b6e08e79db7d80";
pub const APT_2024_003: &str = "689db25303b6e08e79db7d81";

pub const BUSINESS_LICENSE: &str = "689cd830ef2618d4dfe5a595";
pub const PASSPORT_RENEWAL: &str = "689cd840ef2618d4dfe5a600";
pub const DRIVERS_LICENSE_RENEWAL: &str = "689cd850ef2618d4dfe5a610";

pub const BUSINESS_REGISTRATION_DOC: &str = "689cd831ef2618d4dfe5a596";
pub const TAX_ID_DOC: &str = "689cd832ef2618d4dfe5a597";
pub const PASSPORT_DOC: &str = "689cd835ef2618d4dfe5a600";
pub const MEDICAL_CERTIFICATE_DOC: &str = "689cd836ef2618d4dfe5a601";

/// Sample data set, listed in insert order.
#[derive(Debug, Clone)]
pub struct Fixture {
    pub user_id: String,
    pub required_documents: Vec<RequiredDocument>,
    pub sub_services: Vec<SubService>,
    pub appointments: Vec<Appointment>,
    pub uploaded_documents: Vec<UploadedDocument>,
}

impl Fixture {
    pub fn standard() -> anyhow::Result<Self> {
        let required_documents = vec![
            required_doc(
                BUSINESS_REGISTRATION_DOC,
                "Business Registration Certificate",
                "Official business registration document",
            )?,
            required_doc(TAX_ID_DOC, "Tax Identification Number", "Valid TIN certificate")?,
            required_doc(PASSPORT_DOC, "Current Passport", "Valid current passport")?,
            required_doc(
                MEDICAL_CERTIFICATE_DOC,
                "Medical Certificate",
                "Valid medical fitness certificate",
            )?,
        ];

        let sub_services = vec![
            SubService {
                id: BUSINESS_LICENSE.parse()?,
                service_name: "Business License Application".to_string(),
                payment_amount: 150.00,
                required_docs: vec![BUSINESS_REGISTRATION_DOC.parse()?, TAX_ID_DOC.parse()?],
                description: "Complete business license application process".to_string(),
            },
            SubService {
                id: PASSPORT_RENEWAL.parse()?,
                service_name: "Passport Renewal".to_string(),
                payment_amount: 200.00,
                required_docs: vec![PASSPORT_DOC.parse()?],
                description: "Passport renewal service".to_string(),
            },
            SubService {
                id: DRIVERS_LICENSE_RENEWAL.parse()?,
                service_name: "Driver's License Renewal".to_string(),
                payment_amount: 75.00,
                required_docs: vec![MEDICAL_CERTIFICATE_DOC.parse()?],
                description: "Driver's license renewal service".to_string(),
            },
        ];

        let appointments = vec![
            Appointment {
                id: APT_2024_001.parse()?,
                reference: "APT-2024-001".to_string(),
                user_id: FIXTURE_USER.to_string(),
                sub_service_id: BUSINESS_LICENSE.parse()?,
                steps: vec![
                    step(1, "Document Verification", None),
                    step(2, "Certificate Issuance", None),
                ],
                created_at: at("2024-08-14T09:53:54.109Z")?,
                appointment_date: Some(at("2024-12-15T10:00:00Z")?),
                appointment_time: Some(at("2024-12-15T10:00:00Z")?),
                predicted_duration: 60,
                is_fully_completed: false,
                payment_status: false,
                appointment_confirmed: true,
            },
            Appointment {
                id: APT_2024_002.parse()?,
                reference: "APT-2024-002".to_string(),
                user_id: FIXTURE_USER.to_string(),
                sub_service_id: PASSPORT_RENEWAL.parse()?,
                steps: vec![step(1, "Document Review", None)],
                created_at: at("2024-08-14T10:00:00Z")?,
                appointment_date: None,
                appointment_time: None,
                predicted_duration: 45,
                is_fully_completed: false,
                payment_status: false,
                appointment_confirmed: false,
            },
            Appointment {
                id: APT_2024_003.parse()?,
                reference: "APT-2024-003".to_string(),
                user_id: FIXTURE_USER.to_string(),
                sub_service_id: DRIVERS_LICENSE_RENEWAL.parse()?,
                steps: vec![
                    step(1, "Medical Check", Some("doctor123")),
                    step(2, "License Issuance", Some("admin123")),
                ],
                created_at: at("2024-07-10T09:00:00Z")?,
                appointment_date: Some(at("2024-07-15T14:30:00Z")?),
                appointment_time: Some(at("2024-07-15T14:30:00Z")?),
                predicted_duration: 30,
                is_fully_completed: true,
                payment_status: true,
                appointment_confirmed: true,
            },
        ];

        let uploaded_documents = vec![
            upload(
                "689cd833ef2618d4dfe5a598",
                APT_2024_001,
                BUSINESS_REGISTRATION_DOC,
                "business_registration.pdf",
                0.95,
                DocStatus::Approved,
                "2024-08-14T10:30:00Z",
            )?,
            upload(
                "689cd834ef2618d4dfe5a599",
                APT_2024_001,
                TAX_ID_DOC,
                "tin_certificate.pdf",
                0.88,
                DocStatus::Pending,
                "2024-08-14T11:15:00Z",
            )?,
            upload(
                "689cd837ef2618d4dfe5a602",
                APT_2024_003,
                MEDICAL_CERTIFICATE_DOC,
                "medical_certificate.pdf",
                0.92,
                DocStatus::Approved,
                "2024-07-10T09:00:00Z",
            )?,
        ];

        Ok(Self {
            user_id: FIXTURE_USER.to_string(),
            required_documents,
            sub_services,
            appointments,
            uploaded_documents,
        })
    }

    pub fn sub_service_ids(&self) -> Vec<ObjectId> {
        self.sub_services.iter().map(|s| s.id.clone()).collect()
    }

    pub fn required_doc_ids(&self) -> Vec<ObjectId> {
        self.required_documents.iter().map(|d| d.id.clone()).collect()
    }

    pub fn expected_counts(&self) -> FixtureCounts {
        FixtureCounts {
            appointments: self.appointments.len() as i64,
            sub_services: self.sub_services.len() as i64,
            required_documents: self.required_documents.len() as i64,
            uploaded_documents: self.uploaded_documents.len() as i64,
        }
    }
}

/// Clears and re-inserts the fixture, then reads back its counts.
pub async fn load(store: &dyn PortalStore) -> anyhow::Result<FixtureCounts> {
    let fixture = Fixture::standard()?;
    store
        .replace_fixture(&fixture)
        .await
        .context("failed to load fixture")?;

    let counts = store.fixture_counts(&fixture).await?;
    info!(
        user_id = %fixture.user_id,
        appointments = counts.appointments,
        sub_services = counts.sub_services,
        required_documents = counts.required_documents,
        uploaded_documents = counts.uploaded_documents,
        "fixture loaded"
    );
    Ok(counts)
}

pub async fn verify(store: &dyn PortalStore) -> anyhow::Result<FixtureCounts> {
    let fixture = Fixture::standard()?;
    store.fixture_counts(&fixture).await
}

fn at(value: &str) -> anyhow::Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)
        .with_context(|| format!("invalid timestamp {value}"))?
        .with_timezone(&Utc))
}

fn required_doc(id: &str, name: &str, description: &str) -> anyhow::Result<RequiredDocument> {
    Ok(RequiredDocument {
        id: id.parse()?,
        doc_name: name.to_string(),
        description: description.to_string(),
    })
}

fn step(step_id: i32, name: &str, completed_by: Option<&str>) -> Step {
    Step {
        step_id,
        step_name: name.to_string(),
        status: completed_by.is_some(),
        completed_by: completed_by.map(str::to_string),
    }
}

fn upload(
    id: &str,
    booking_id: &str,
    required_doc_id: &str,
    file_name: &str,
    accuracy: f64,
    doc_status: DocStatus,
    uploaded_at: &str,
) -> anyhow::Result<UploadedDocument> {
    Ok(UploadedDocument {
        id: id.parse()?,
        booking_id: booking_id.parse()?,
        required_doc_id: required_doc_id.parse()?,
        user_id: FIXTURE_USER.to_string(),
        file_name: file_name.to_string(),
        file_path: format!("/uploads/{FIXTURE_USER}/{file_name}"),
        accuracy: Some(accuracy),
        doc_status,
        uploaded_at: at(uploaded_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;

    #[tokio::test]
    async fn loading_twice_leaves_one_copy() {
        let store = MemoryStore::default();
        load(&store).await.unwrap();
        let counts = load(&store).await.unwrap();

        assert_eq!(
            counts,
            FixtureCounts {
                appointments: 3,
                sub_services: 3,
                required_documents: 4,
                uploaded_documents: 3,
            }
        );
        assert_eq!(verify(&store).await.unwrap(), counts);
    }

    #[tokio::test]
    async fn reload_replaces_stale_rows_for_the_fixture_user() {
        let store = MemoryStore::default();
        load(&store).await.unwrap();

        let mut stray = Fixture::standard().unwrap().appointments[0].clone();
        stray.id = "aaaaaaaaaaaaaaaaaaaaaaaa".parse().unwrap();
        store.push_appointment(stray);
        assert_eq!(verify(&store).await.unwrap().appointments, 4);

        load(&store).await.unwrap();
        assert_eq!(verify(&store).await.unwrap().appointments, 3);
    }

    #[test]
    fn insert_order_keeps_references_pointing_backwards() {
        let fixture = Fixture::standard().unwrap();
        let doc_ids = fixture.required_doc_ids();
        let service_ids = fixture.sub_service_ids();

        for service in &fixture.sub_services {
            assert!(service.required_docs.iter().all(|id| doc_ids.contains(id)));
        }
        for appointment in &fixture.appointments {
            assert!(service_ids.contains(&appointment.sub_service_id));
        }
        assert_eq!(fixture.expected_counts().required_documents, 4);
    }

    #[test]
    fn completed_steps_record_their_completer() {
        let fixture = Fixture::standard().unwrap();
        let previous = &fixture.appointments[2];
        assert!(previous.steps.iter().all(|s| s.status && s.completed_by.is_some()));
        let ongoing = &fixture.appointments[0];
        assert!(ongoing.steps.iter().all(|s| !s.status && s.completed_by.is_none()));
    }
}
