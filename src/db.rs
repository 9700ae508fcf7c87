use anyhow::Context;
use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::debug;

use crate::classify::{self, Bucket};
use crate::fixture::Fixture;
use crate::models::{
    Appointment, AppointmentSummary, FixtureCounts, ObjectId, RequiredDocument, Step, SubService,
    UploadedDocument,
};
use crate::store::PortalStore;

pub async fn connect(database_url: &str) -> anyhow::Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .context("failed to connect to Postgres")
}

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn ids_as_strings(ids: &[ObjectId]) -> Vec<String> {
    ids.iter().map(ObjectId::to_string).collect()
}

fn object_id(row: &PgRow, column: &str) -> anyhow::Result<ObjectId> {
    let raw: String = row.try_get(column)?;
    raw.parse()
        .with_context(|| format!("column {column} holds an invalid object id"))
}

async fn clear_fixture(tx: &mut Transaction<'_, Postgres>, fixture: &Fixture) -> anyhow::Result<()> {
    let service_ids = ids_as_strings(&fixture.sub_service_ids());
    let doc_ids = ids_as_strings(&fixture.required_doc_ids());

    sqlx::query("DELETE FROM portal.appointments WHERE user_id = $1")
        .bind(&fixture.user_id)
        .execute(&mut **tx)
        .await?;
    sqlx::query("DELETE FROM portal.sub_services WHERE id = ANY($1)")
        .bind(&service_ids)
        .execute(&mut **tx)
        .await?;
    sqlx::query("DELETE FROM portal.required_documents WHERE id = ANY($1)")
        .bind(&doc_ids)
        .execute(&mut **tx)
        .await?;
    sqlx::query("DELETE FROM portal.uploaded_documents WHERE user_id = $1")
        .bind(&fixture.user_id)
        .execute(&mut **tx)
        .await?;

    Ok(())
}

async fn insert_required_documents(
    tx: &mut Transaction<'_, Postgres>,
    docs: &[RequiredDocument],
) -> anyhow::Result<()> {
    for doc in docs {
        sqlx::query(
            r#"
            INSERT INTO portal.required_documents (id, doc_name, description)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(doc.id.as_str())
        .bind(&doc.doc_name)
        .bind(&doc.description)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

async fn insert_sub_services(
    tx: &mut Transaction<'_, Postgres>,
    services: &[SubService],
) -> anyhow::Result<()> {
    for service in services {
        sqlx::query(
            r#"
            INSERT INTO portal.sub_services (id, service_name, payment_amount, description)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(service.id.as_str())
        .bind(&service.service_name)
        .bind(service.payment_amount)
        .bind(&service.description)
        .execute(&mut **tx)
        .await?;

        for (position, doc_id) in service.required_docs.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO portal.sub_service_required_docs (sub_service_id, position, required_doc_id)
                VALUES ($1, $2, $3)
                "#,
            )
            .bind(service.id.as_str())
            .bind(position as i32)
            .bind(doc_id.as_str())
            .execute(&mut **tx)
            .await?;
        }
    }
    Ok(())
}

async fn insert_appointments(
    tx: &mut Transaction<'_, Postgres>,
    appointments: &[Appointment],
) -> anyhow::Result<()> {
    for appointment in appointments {
        sqlx::query(
            r#"
            INSERT INTO portal.appointments
            (id, reference, user_id, sub_service_id, created_at, appointment_date,
             appointment_time, predicted_duration, is_fully_completed, payment_status,
             appointment_confirmed)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(appointment.id.as_str())
        .bind(&appointment.reference)
        .bind(&appointment.user_id)
        .bind(appointment.sub_service_id.as_str())
        .bind(appointment.created_at)
        .bind(appointment.appointment_date)
        .bind(appointment.appointment_time)
        .bind(appointment.predicted_duration)
        .bind(appointment.is_fully_completed)
        .bind(appointment.payment_status)
        .bind(appointment.appointment_confirmed)
        .execute(&mut **tx)
        .await?;

        for step in &appointment.steps {
            sqlx::query(
                r#"
                INSERT INTO portal.appointment_steps
                (appointment_id, step_id, step_name, status, completed_by)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(appointment.id.as_str())
            .bind(step.step_id)
            .bind(&step.step_name)
            .bind(step.status)
            .bind(step.completed_by.as_deref())
            .execute(&mut **tx)
            .await?;
        }
    }
    Ok(())
}

async fn insert_uploaded_documents(
    tx: &mut Transaction<'_, Postgres>,
    uploads: &[UploadedDocument],
) -> anyhow::Result<()> {
    for upload in uploads {
        sqlx::query(
            r#"
            INSERT INTO portal.uploaded_documents
            (id, booking_id, required_doc_id, user_id, file_name, file_path, accuracy,
             doc_status, uploaded_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(upload.id.as_str())
        .bind(upload.booking_id.as_str())
        .bind(upload.required_doc_id.as_str())
        .bind(&upload.user_id)
        .bind(&upload.file_name)
        .bind(&upload.file_path)
        .bind(upload.accuracy)
        .bind(upload.doc_status.as_str())
        .bind(upload.uploaded_at)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

#[async_trait]
impl PortalStore for PgStore {
    async fn replace_fixture(&self, fixture: &Fixture) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;

        clear_fixture(&mut tx, fixture).await?;
        debug!("cleared existing fixture rows");

        insert_required_documents(&mut tx, &fixture.required_documents).await?;
        insert_sub_services(&mut tx, &fixture.sub_services).await?;
        insert_appointments(&mut tx, &fixture.appointments).await?;
        insert_uploaded_documents(&mut tx, &fixture.uploaded_documents).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn fixture_counts(&self, fixture: &Fixture) -> anyhow::Result<FixtureCounts> {
        let service_ids = ids_as_strings(&fixture.sub_service_ids());
        let doc_ids = ids_as_strings(&fixture.required_doc_ids());

        let row = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM portal.appointments WHERE user_id = $1) AS appointments,
                (SELECT COUNT(*) FROM portal.sub_services WHERE id = ANY($2)) AS sub_services,
                (SELECT COUNT(*) FROM portal.required_documents WHERE id = ANY($3)) AS required_documents,
                (SELECT COUNT(*) FROM portal.uploaded_documents WHERE user_id = $1) AS uploaded_documents
            "#,
        )
        .bind(&fixture.user_id)
        .bind(&service_ids)
        .bind(&doc_ids)
        .fetch_one(&self.pool)
        .await?;

        Ok(FixtureCounts {
            appointments: row.get("appointments"),
            sub_services: row.get("sub_services"),
            required_documents: row.get("required_documents"),
            uploaded_documents: row.get("uploaded_documents"),
        })
    }

    async fn fetch_bucket(
        &self,
        user_id: &str,
        bucket: Bucket,
    ) -> anyhow::Result<Vec<AppointmentSummary>> {
        let rows = sqlx::query(&classify::summary_query(bucket))
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("failed to query {} appointments", bucket.label()))?;

        let mut summaries = Vec::new();
        for row in rows {
            summaries.push(AppointmentSummary {
                appointment_id: row.get("appointment_id"),
                service_name: row.get("service_name"),
                appointment_date: row.get("appointment_date"),
                is_fully_completed: row.get("is_fully_completed"),
            });
        }

        Ok(summaries)
    }

    async fn fetch_orphans(&self, user_id: &str) -> anyhow::Result<Vec<ObjectId>> {
        let rows = sqlx::query(classify::orphans_query())
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(|row| object_id(row, "id")).collect()
    }

    async fn fetch_appointment(
        &self,
        user_id: &str,
        appointment_id: &ObjectId,
    ) -> anyhow::Result<Option<Appointment>> {
        let Some(row) = sqlx::query(
            r#"
            SELECT id, reference, user_id, sub_service_id, created_at, appointment_date,
                   appointment_time, predicted_duration, is_fully_completed, payment_status,
                   appointment_confirmed
            FROM portal.appointments
            WHERE id = $1 AND user_id = $2
            "#,
        )
        .bind(appointment_id.as_str())
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        let step_rows = sqlx::query(
            r#"
            SELECT step_id, step_name, status, completed_by
            FROM portal.appointment_steps
            WHERE appointment_id = $1
            ORDER BY step_id
            "#,
        )
        .bind(appointment_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        let steps = step_rows
            .iter()
            .map(|step| Step {
                step_id: step.get("step_id"),
                step_name: step.get("step_name"),
                status: step.get("status"),
                completed_by: step.get("completed_by"),
            })
            .collect();

        Ok(Some(Appointment {
            id: object_id(&row, "id")?,
            reference: row.get("reference"),
            user_id: row.get("user_id"),
            sub_service_id: object_id(&row, "sub_service_id")?,
            steps,
            created_at: row.get("created_at"),
            appointment_date: row.get("appointment_date"),
            appointment_time: row.get("appointment_time"),
            predicted_duration: row.get("predicted_duration"),
            is_fully_completed: row.get("is_fully_completed"),
            payment_status: row.get("payment_status"),
            appointment_confirmed: row.get("appointment_confirmed"),
        }))
    }

    async fn fetch_sub_service(&self, id: &ObjectId) -> anyhow::Result<Option<SubService>> {
        let Some(row) = sqlx::query(
            "SELECT id, service_name, payment_amount, description FROM portal.sub_services WHERE id = $1",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        let doc_rows = sqlx::query(
            r#"
            SELECT required_doc_id
            FROM portal.sub_service_required_docs
            WHERE sub_service_id = $1
            ORDER BY position
            "#,
        )
        .bind(id.as_str())
        .fetch_all(&self.pool)
        .await?;

        let required_docs = doc_rows
            .iter()
            .map(|doc| object_id(doc, "required_doc_id"))
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(Some(SubService {
            id: object_id(&row, "id")?,
            service_name: row.get("service_name"),
            payment_amount: row.get("payment_amount"),
            required_docs,
            description: row.get("description"),
        }))
    }

    async fn fetch_required_documents(
        &self,
        ids: &[ObjectId],
    ) -> anyhow::Result<Vec<RequiredDocument>> {
        let rows = sqlx::query(
            "SELECT id, doc_name, description FROM portal.required_documents WHERE id = ANY($1)",
        )
        .bind(ids_as_strings(ids))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(RequiredDocument {
                    id: object_id(row, "id")?,
                    doc_name: row.get("doc_name"),
                    description: row.get("description"),
                })
            })
            .collect()
    }

    async fn fetch_uploads(&self, booking_id: &ObjectId) -> anyhow::Result<Vec<UploadedDocument>> {
        let rows = sqlx::query(
            r#"
            SELECT id, booking_id, required_doc_id, user_id, file_name, file_path, accuracy,
                   doc_status, uploaded_at
            FROM portal.uploaded_documents
            WHERE booking_id = $1
            ORDER BY uploaded_at
            "#,
        )
        .bind(booking_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        let mut uploads = Vec::new();
        for row in rows {
            let status: String = row.get("doc_status");
            uploads.push(UploadedDocument {
                id: object_id(&row, "id")?,
                booking_id: object_id(&row, "booking_id")?,
                required_doc_id: object_id(&row, "required_doc_id")?,
                user_id: row.get("user_id"),
                file_name: row.get("file_name"),
                file_path: row.get("file_path"),
                accuracy: row.get("accuracy"),
                doc_status: status.parse()?,
                uploaded_at: row.get("uploaded_at"),
            });
        }

        Ok(uploads)
    }
}
