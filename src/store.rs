use async_trait::async_trait;

use crate::classify::{Bucket, Classification};
use crate::fixture::Fixture;
use crate::models::{
    Appointment, AppointmentSummary, FixtureCounts, ObjectId, RequiredDocument, SubService,
    UploadedDocument,
};

/// Persistence seam for the portal collections.
#[async_trait]
pub trait PortalStore: Send + Sync {
    /// Deletes the fixture user's appointments and uploads plus the fixture's
    /// sub-services and required documents, then inserts required documents,
    /// sub-services, appointments and uploads in that order.
    async fn replace_fixture(&self, fixture: &Fixture) -> anyhow::Result<()>;

    async fn fixture_counts(&self, fixture: &Fixture) -> anyhow::Result<FixtureCounts>;

    async fn fetch_bucket(
        &self,
        user_id: &str,
        bucket: Bucket,
    ) -> anyhow::Result<Vec<AppointmentSummary>>;

    async fn fetch_orphans(&self, user_id: &str) -> anyhow::Result<Vec<ObjectId>>;

    async fn fetch_appointment(
        &self,
        user_id: &str,
        appointment_id: &ObjectId,
    ) -> anyhow::Result<Option<Appointment>>;

    async fn fetch_sub_service(&self, id: &ObjectId) -> anyhow::Result<Option<SubService>>;

    async fn fetch_required_documents(
        &self,
        ids: &[ObjectId],
    ) -> anyhow::Result<Vec<RequiredDocument>>;

    async fn fetch_uploads(&self, booking_id: &ObjectId) -> anyhow::Result<Vec<UploadedDocument>>;
}

/// Runs all three bucket queries plus the orphan query for one user.
pub async fn classify_user(
    store: &dyn PortalStore,
    user_id: &str,
) -> anyhow::Result<Classification> {
    let mut classification = Classification {
        orphaned: store.fetch_orphans(user_id).await?,
        ..Classification::default()
    };
    for bucket in Bucket::ALL {
        *classification.bucket_mut(bucket) = store.fetch_bucket(user_id, bucket).await?;
    }
    crate::classify::log_orphans(user_id, &classification.orphaned);
    Ok(classification)
}

#[cfg(test)]
pub mod memory {
    use std::sync::Mutex;

    use super::*;
    use crate::classify;

    #[derive(Debug, Default)]
    struct Collections {
        required_documents: Vec<RequiredDocument>,
        sub_services: Vec<SubService>,
        appointments: Vec<Appointment>,
        uploaded_documents: Vec<UploadedDocument>,
    }

    /// In-memory stand-in for the Postgres store.
    #[derive(Debug, Default)]
    pub struct MemoryStore {
        inner: Mutex<Collections>,
    }

    impl MemoryStore {
        pub fn push_appointment(&self, appointment: Appointment) {
            self.inner.lock().unwrap().appointments.push(appointment);
        }

        pub fn push_upload(&self, upload: UploadedDocument) {
            self.inner.lock().unwrap().uploaded_documents.push(upload);
        }
    }

    #[async_trait]
    impl PortalStore for MemoryStore {
        async fn replace_fixture(&self, fixture: &Fixture) -> anyhow::Result<()> {
            let mut db = self.inner.lock().unwrap();
            let service_ids = fixture.sub_service_ids();
            let doc_ids = fixture.required_doc_ids();

            db.appointments.retain(|a| a.user_id != fixture.user_id);
            db.sub_services.retain(|s| !service_ids.contains(&s.id));
            db.required_documents.retain(|d| !doc_ids.contains(&d.id));
            db.uploaded_documents.retain(|u| u.user_id != fixture.user_id);

            db.required_documents
                .extend(fixture.required_documents.iter().cloned());
            db.sub_services.extend(fixture.sub_services.iter().cloned());
            db.appointments.extend(fixture.appointments.iter().cloned());
            db.uploaded_documents
                .extend(fixture.uploaded_documents.iter().cloned());
            Ok(())
        }

        async fn fixture_counts(&self, fixture: &Fixture) -> anyhow::Result<FixtureCounts> {
            let db = self.inner.lock().unwrap();
            let service_ids = fixture.sub_service_ids();
            let doc_ids = fixture.required_doc_ids();
            let count = |n: usize| n as i64;

            Ok(FixtureCounts {
                appointments: count(
                    db.appointments
                        .iter()
                        .filter(|a| a.user_id == fixture.user_id)
                        .count(),
                ),
                sub_services: count(
                    db.sub_services
                        .iter()
                        .filter(|s| service_ids.contains(&s.id))
                        .count(),
                ),
                required_documents: count(
                    db.required_documents
                        .iter()
                        .filter(|d| doc_ids.contains(&d.id))
                        .count(),
                ),
                uploaded_documents: count(
                    db.uploaded_documents
                        .iter()
                        .filter(|u| u.user_id == fixture.user_id)
                        .count(),
                ),
            })
        }

        async fn fetch_bucket(
            &self,
            user_id: &str,
            bucket: Bucket,
        ) -> anyhow::Result<Vec<AppointmentSummary>> {
            let db = self.inner.lock().unwrap();
            Ok(classify::classify(
                bucket,
                user_id,
                &db.appointments,
                &db.sub_services,
            ))
        }

        async fn fetch_orphans(&self, user_id: &str) -> anyhow::Result<Vec<ObjectId>> {
            let db = self.inner.lock().unwrap();
            Ok(classify::orphaned(user_id, &db.appointments, &db.sub_services))
        }

        async fn fetch_appointment(
            &self,
            user_id: &str,
            appointment_id: &ObjectId,
        ) -> anyhow::Result<Option<Appointment>> {
            let db = self.inner.lock().unwrap();
            Ok(db
                .appointments
                .iter()
                .find(|a| &a.id == appointment_id && a.user_id == user_id)
                .cloned())
        }

        async fn fetch_sub_service(&self, id: &ObjectId) -> anyhow::Result<Option<SubService>> {
            let db = self.inner.lock().unwrap();
            Ok(db.sub_services.iter().find(|s| &s.id == id).cloned())
        }

        async fn fetch_required_documents(
            &self,
            ids: &[ObjectId],
        ) -> anyhow::Result<Vec<RequiredDocument>> {
            let db = self.inner.lock().unwrap();
            Ok(db
                .required_documents
                .iter()
                .filter(|d| ids.contains(&d.id))
                .cloned()
                .collect())
        }

        async fn fetch_uploads(
            &self,
            booking_id: &ObjectId,
        ) -> anyhow::Result<Vec<UploadedDocument>> {
            let db = self.inner.lock().unwrap();
            Ok(db
                .uploaded_documents
                .iter()
                .filter(|u| &u.booking_id == booking_id)
                .cloned()
                .collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::memory::MemoryStore;
    use super::*;
    use crate::fixture::{self, APT_2024_001, APT_2024_002, APT_2024_003};

    #[tokio::test]
    async fn classify_user_matches_fixture_expectations() {
        let store = MemoryStore::default();
        fixture::load(&store).await.unwrap();

        let classification = classify_user(&store, fixture::FIXTURE_USER).await.unwrap();
        assert_eq!(classification.ongoing.len(), 1);
        assert_eq!(classification.incomplete.len(), 1);
        assert_eq!(classification.previous.len(), 1);
        assert_eq!(classification.ongoing[0].appointment_id, APT_2024_001);
        assert_eq!(classification.incomplete[0].appointment_id, APT_2024_002);
        assert_eq!(classification.previous[0].appointment_id, APT_2024_003);
        assert_eq!(classification.previous[0].service_name, "Driver's License Renewal");
    }

    #[tokio::test]
    async fn dangling_sub_service_surfaces_as_orphan() {
        let store = MemoryStore::default();
        fixture::load(&store).await.unwrap();

        let mut orphan = Fixture::standard().unwrap().appointments[0].clone();
        orphan.id = "bbbbbbbbbbbbbbbbbbbbbbbb".parse().unwrap();
        orphan.sub_service_id = "cccccccccccccccccccccccc".parse().unwrap();
        store.push_appointment(orphan.clone());

        let classification = classify_user(&store, fixture::FIXTURE_USER).await.unwrap();
        assert_eq!(classification.ongoing.len(), 1);
        assert_eq!(classification.orphaned, vec![orphan.id]);
    }

    #[tokio::test]
    async fn unknown_user_has_empty_views() {
        let store = MemoryStore::default();
        fixture::load(&store).await.unwrap();

        let classification = classify_user(&store, "nobody").await.unwrap();
        assert!(Bucket::ALL
            .into_iter()
            .all(|bucket| classification.bucket(bucket).is_empty()));
    }
}
