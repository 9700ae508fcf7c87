//! Per-document review and the appointment document checklist.

use tracing::warn;

use crate::models::{
    Appointment, DocStatus, ObjectId, RequiredDocument, SubService, UploadedDocument,
};
use crate::store::PortalStore;

/// Uploads scoring below this must be resubmitted whatever their stored status.
pub const RESUBMIT_THRESHOLD: f64 = 0.70;
pub const HIGH_ACCURACY: f64 = 0.85;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccuracyBand {
    Unscored,
    Low,
    Fair,
    High,
}

impl AccuracyBand {
    pub fn label(self) -> &'static str {
        match self {
            AccuracyBand::Unscored => "unscored",
            AccuracyBand::Low => "low",
            AccuracyBand::Fair => "fair",
            AccuracyBand::High => "high",
        }
    }
}

pub fn accuracy_band(accuracy: Option<f64>) -> AccuracyBand {
    match accuracy {
        None => AccuracyBand::Unscored,
        Some(value) if value < RESUBMIT_THRESHOLD => AccuracyBand::Low,
        Some(value) if value < HIGH_ACCURACY => AccuracyBand::Fair,
        Some(_) => AccuracyBand::High,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    LowAccuracy,
    Rejected,
    AwaitingOfficer,
    Clear,
}

impl Verdict {
    pub fn needs_resubmission(self) -> bool {
        matches!(self, Verdict::LowAccuracy | Verdict::Rejected)
    }

    pub fn message(self) -> Option<&'static str> {
        match self {
            Verdict::LowAccuracy => Some("accuracy is too low, please resubmit"),
            Verdict::Rejected => Some("please resubmit"),
            Verdict::AwaitingOfficer => Some("officer sign-off pending"),
            Verdict::Clear => None,
        }
    }
}

/// Low accuracy wins over the stored status.
pub fn review(upload: &UploadedDocument) -> Verdict {
    if upload
        .accuracy
        .is_some_and(|accuracy| accuracy < RESUBMIT_THRESHOLD)
    {
        return Verdict::LowAccuracy;
    }
    match upload.doc_status {
        DocStatus::Rejected => Verdict::Rejected,
        DocStatus::Approved => Verdict::AwaitingOfficer,
        DocStatus::Pending => Verdict::Clear,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingViolation {
    pub upload_id: ObjectId,
    pub required_doc_id: ObjectId,
    pub sub_service_id: ObjectId,
}

/// Checks that an upload targets one of its sub-service's required documents.
pub fn validate_binding(
    sub_service: &SubService,
    upload: &UploadedDocument,
) -> Result<(), BindingViolation> {
    if sub_service.required_docs.contains(&upload.required_doc_id) {
        Ok(())
    } else {
        Err(BindingViolation {
            upload_id: upload.id.clone(),
            required_doc_id: upload.required_doc_id.clone(),
            sub_service_id: sub_service.id.clone(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct ChecklistEntry {
    pub required_doc_id: ObjectId,
    pub doc_name: String,
    pub description: String,
    pub upload: Option<UploadedDocument>,
    pub band: AccuracyBand,
    pub verdict: Option<Verdict>,
}

impl ChecklistEntry {
    pub fn status_label(&self) -> &'static str {
        self.upload
            .as_ref()
            .map(|upload| upload.doc_status.as_str())
            .unwrap_or("Not Uploaded")
    }
}

#[derive(Debug, Clone)]
pub struct AppointmentDetails {
    pub appointment_id: ObjectId,
    pub reference: String,
    pub service_name: String,
    pub payment_amount: f64,
    pub payment_status: bool,
    pub steps_completed: usize,
    pub steps_total: usize,
    pub checklist: Vec<ChecklistEntry>,
    pub unbound_uploads: Vec<BindingViolation>,
}

impl AppointmentDetails {
    /// Share of required documents with an upload, 0-100.
    pub fn upload_progress(&self) -> u8 {
        let uploaded = self.checklist.iter().filter(|e| e.upload.is_some()).count();
        percent(uploaded as u64, self.checklist.len() as u64)
    }

    pub fn needs_resubmission(&self) -> Vec<&ChecklistEntry> {
        self.checklist
            .iter()
            .filter(|entry| entry.verdict.is_some_and(Verdict::needs_resubmission))
            .collect()
    }
}

pub fn percent(done: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    ((done.min(total) * 100) / total) as u8
}

pub fn build_details(
    appointment: &Appointment,
    sub_service: &SubService,
    required_docs: &[RequiredDocument],
    uploads: &[UploadedDocument],
) -> AppointmentDetails {
    let checklist = sub_service
        .required_docs
        .iter()
        .map(|doc_id| {
            let required = required_docs.iter().find(|doc| &doc.id == doc_id);
            let upload = uploads
                .iter()
                .filter(|upload| &upload.required_doc_id == doc_id)
                .max_by_key(|upload| upload.uploaded_at)
                .cloned();
            ChecklistEntry {
                required_doc_id: doc_id.clone(),
                doc_name: required
                    .map(|doc| doc.doc_name.clone())
                    .unwrap_or_else(|| "Unknown document".to_string()),
                description: required
                    .map(|doc| doc.description.clone())
                    .unwrap_or_default(),
                band: accuracy_band(upload.as_ref().and_then(|u| u.accuracy)),
                verdict: upload.as_ref().map(review),
                upload,
            }
        })
        .collect();

    let unbound_uploads = uploads
        .iter()
        .filter_map(|upload| validate_binding(sub_service, upload).err())
        .collect();

    AppointmentDetails {
        appointment_id: appointment.id.clone(),
        reference: appointment.reference.clone(),
        service_name: sub_service.service_name.clone(),
        payment_amount: sub_service.payment_amount,
        payment_status: appointment.payment_status,
        steps_completed: appointment.steps.iter().filter(|step| step.status).count(),
        steps_total: appointment.steps.len(),
        checklist,
        unbound_uploads,
    }
}

/// Loads one appointment with its checklist. An appointment whose
/// sub-service does not resolve yields `None`, like the status views.
pub async fn appointment_details(
    store: &dyn PortalStore,
    user_id: &str,
    appointment_id: &ObjectId,
) -> anyhow::Result<Option<AppointmentDetails>> {
    let Some(appointment) = store.fetch_appointment(user_id, appointment_id).await? else {
        return Ok(None);
    };
    let Some(sub_service) = store.fetch_sub_service(&appointment.sub_service_id).await? else {
        warn!(
            appointment_id = %appointment.id,
            sub_service_id = %appointment.sub_service_id,
            "appointment references a missing sub-service"
        );
        return Ok(None);
    };

    let required_docs = store
        .fetch_required_documents(&sub_service.required_docs)
        .await?;
    let uploads = store.fetch_uploads(&appointment.id).await?;

    let details = build_details(&appointment, &sub_service, &required_docs, &uploads);
    for violation in &details.unbound_uploads {
        warn!(
            upload_id = %violation.upload_id,
            required_doc_id = %violation.required_doc_id,
            "upload targets a document the sub-service does not require"
        );
    }
    Ok(Some(details))
}

/// Why [`appointment_details`] returned `None` for this appointment.
pub async fn details_unavailable(
    store: &dyn PortalStore,
    user_id: &str,
    appointment_id: &ObjectId,
) -> anyhow::Result<String> {
    Ok(match store.fetch_appointment(user_id, appointment_id).await? {
        Some(_) => format!("appointment {appointment_id} references a missing sub-service"),
        None => format!("appointment {appointment_id} not found for {user_id}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{self, Fixture};
    use crate::store::memory::MemoryStore;

    fn upload_with(accuracy: Option<f64>, status: DocStatus) -> UploadedDocument {
        let mut upload = Fixture::standard().unwrap().uploaded_documents[0].clone();
        upload.accuracy = accuracy;
        upload.doc_status = status;
        upload
    }

    #[test]
    fn low_accuracy_needs_resubmission_whatever_the_status() {
        for status in [DocStatus::Approved, DocStatus::Pending, DocStatus::Rejected] {
            let verdict = review(&upload_with(Some(0.6336), status));
            assert_eq!(verdict, Verdict::LowAccuracy);
            assert!(verdict.needs_resubmission());
        }
    }

    #[test]
    fn threshold_is_exclusive() {
        assert_eq!(
            review(&upload_with(Some(0.70), DocStatus::Pending)),
            Verdict::Clear
        );
        assert_eq!(accuracy_band(Some(0.70)), AccuracyBand::Fair);
        assert_eq!(accuracy_band(Some(0.6999)), AccuracyBand::Low);
    }

    #[test]
    fn status_drives_verdict_above_threshold() {
        assert_eq!(
            review(&upload_with(Some(0.8036), DocStatus::Rejected)),
            Verdict::Rejected
        );
        assert_eq!(
            review(&upload_with(Some(0.95), DocStatus::Approved)),
            Verdict::AwaitingOfficer
        );
        assert_eq!(review(&upload_with(None, DocStatus::Pending)), Verdict::Clear);
    }

    #[test]
    fn bands_follow_thresholds() {
        assert_eq!(accuracy_band(None), AccuracyBand::Unscored);
        assert_eq!(accuracy_band(Some(0.8336)), AccuracyBand::Fair);
        assert_eq!(accuracy_band(Some(0.8636)), AccuracyBand::High);
    }

    #[test]
    fn percent_handles_empty_and_partial() {
        assert_eq!(percent(0, 0), 100);
        assert_eq!(percent(1, 3), 33);
        assert_eq!(percent(5, 4), 100);
    }

    #[tokio::test]
    async fn checklist_pairs_required_docs_with_uploads() {
        let store = MemoryStore::default();
        fixture::load(&store).await.unwrap();
        let id: ObjectId = fixture::APT_2024_001.parse().unwrap();

        let details = appointment_details(&store, fixture::FIXTURE_USER, &id)
            .await
            .unwrap()
            .expect("fixture appointment");

        assert_eq!(details.service_name, "Business License Application");
        assert_eq!(details.payment_amount, 150.0);
        assert_eq!(details.checklist.len(), 2);
        assert_eq!(details.checklist[0].doc_name, "Business Registration Certificate");
        assert_eq!(details.checklist[0].status_label(), "Approved");
        assert_eq!(details.checklist[1].status_label(), "Pending");
        assert_eq!(details.checklist[1].band, AccuracyBand::High);
        assert_eq!(details.upload_progress(), 100);
        assert_eq!((details.steps_completed, details.steps_total), (0, 2));
        assert!(details.unbound_uploads.is_empty());
        assert!(details.needs_resubmission().is_empty());
    }

    #[tokio::test]
    async fn missing_upload_shows_not_uploaded() {
        let store = MemoryStore::default();
        fixture::load(&store).await.unwrap();
        let id: ObjectId = fixture::APT_2024_002.parse().unwrap();

        let details = appointment_details(&store, fixture::FIXTURE_USER, &id)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(details.checklist.len(), 1);
        assert_eq!(details.checklist[0].status_label(), "Not Uploaded");
        assert_eq!(details.checklist[0].verdict, None);
        assert_eq!(details.upload_progress(), 0);
    }

    #[tokio::test]
    async fn upload_outside_required_set_is_reported() {
        let store = MemoryStore::default();
        fixture::load(&store).await.unwrap();

        let mut stray = Fixture::standard().unwrap().uploaded_documents[0].clone();
        stray.id = "dddddddddddddddddddddddd".parse().unwrap();
        stray.required_doc_id = fixture::PASSPORT_DOC.parse().unwrap();
        store.push_upload(stray.clone());

        let id: ObjectId = fixture::APT_2024_001.parse().unwrap();
        let details = appointment_details(&store, fixture::FIXTURE_USER, &id)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(details.unbound_uploads.len(), 1);
        assert_eq!(details.unbound_uploads[0].upload_id, stray.id);
    }

    #[tokio::test]
    async fn latest_upload_wins_for_a_required_doc() {
        let store = MemoryStore::default();
        fixture::load(&store).await.unwrap();

        let mut resubmitted = Fixture::standard().unwrap().uploaded_documents[1].clone();
        resubmitted.id = "eeeeeeeeeeeeeeeeeeeeeeee".parse().unwrap();
        resubmitted.accuracy = Some(0.41);
        resubmitted.uploaded_at += chrono::Duration::days(1);
        store.push_upload(resubmitted);

        let id: ObjectId = fixture::APT_2024_001.parse().unwrap();
        let details = appointment_details(&store, fixture::FIXTURE_USER, &id)
            .await
            .unwrap()
            .unwrap();

        let flagged = details.needs_resubmission();
        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0].doc_name, "Tax Identification Number");
        assert_eq!(flagged[0].band, AccuracyBand::Low);
    }

    #[tokio::test]
    async fn dangling_sub_service_is_explained() {
        let store = MemoryStore::default();
        fixture::load(&store).await.unwrap();

        let mut orphan = Fixture::standard().unwrap().appointments[0].clone();
        orphan.id = "ffffffffffffffffffffffff".parse().unwrap();
        orphan.sub_service_id = "cccccccccccccccccccccccc".parse().unwrap();
        store.push_appointment(orphan.clone());

        assert!(appointment_details(&store, fixture::FIXTURE_USER, &orphan.id)
            .await
            .unwrap()
            .is_none());
        assert_eq!(
            details_unavailable(&store, fixture::FIXTURE_USER, &orphan.id)
                .await
                .unwrap(),
            "appointment ffffffffffffffffffffffff references a missing sub-service"
        );
        assert_eq!(
            details_unavailable(&store, "intruder", &orphan.id)
                .await
                .unwrap(),
            "appointment ffffffffffffffffffffffff not found for intruder"
        );
    }

    #[tokio::test]
    async fn other_users_cannot_read_details() {
        let store = MemoryStore::default();
        fixture::load(&store).await.unwrap();
        let id: ObjectId = fixture::APT_2024_001.parse().unwrap();

        assert!(appointment_details(&store, "intruder", &id)
            .await
            .unwrap()
            .is_none());
    }
}
