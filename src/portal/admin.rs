use std::fmt::Display;

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer};
use tracing::{error, info, warn};

use super::{check_status, PortalClient, PortalError, Session};
use crate::models::ObjectId;

pub const LOAD_ERROR_MESSAGE: &str = "Could not load appointment data. Please try again later.";
pub const MISSING: &str = "N/A";

/// One record from `appointments_by_subservice`. The backend spells the time
/// field `appoinment_time`.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiAppointment {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default = "unknown_user")]
    pub user_name: String,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub appoinment_time: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub appointment_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_fully_completed: bool,
}

#[derive(Debug, Deserialize)]
struct AppointmentsResponse {
    #[serde(default)]
    appointments: Vec<ApiAppointment>,
}

fn unknown_user() -> String {
    "Unknown User".to_string()
}

/// Accepts RFC 3339 or the naive ISO form the backend emits, read as UTC.
/// Anything else becomes `None` so only that row shows [`MISSING`].
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(raw) = Option::<String>::deserialize(deserializer)? else {
        return Ok(None);
    };
    Ok(parse_timestamp(&raw))
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    match NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        Ok(naive) => Some(naive.and_utc()),
        Err(err) => {
            warn!(value = raw, error = %err, "unreadable appointment timestamp");
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowStatus {
    Approved,
    Pending,
}

impl RowStatus {
    pub fn label(self) -> &'static str {
        match self {
            RowStatus::Approved => "approved",
            RowStatus::Pending => "pending",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminRow {
    pub id: String,
    pub name: String,
    pub time: String,
    pub date: String,
    pub status: RowStatus,
}

impl AdminRow {
    pub fn from_api<Tz>(appointment: &ApiAppointment, tz: &Tz) -> Self
    where
        Tz: TimeZone,
        Tz::Offset: Display,
    {
        Self {
            id: appointment.id.clone(),
            name: appointment.user_name.clone(),
            time: format_in(appointment.appoinment_time, tz, "%H:%M"),
            date: format_in(appointment.appointment_date, tz, "%d/%m/%Y"),
            status: if appointment.is_fully_completed {
                RowStatus::Approved
            } else {
                RowStatus::Pending
            },
        }
    }
}

fn format_in<Tz>(value: Option<DateTime<Utc>>, tz: &Tz, pattern: &str) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    value
        .map(|at| at.with_timezone(tz).format(pattern).to_string())
        .unwrap_or_else(|| MISSING.to_string())
}

/// What the admin appointment list shows: rows, or one message and no rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdminView {
    pub rows: Vec<AdminRow>,
    pub error: Option<String>,
}

impl AdminView {
    pub fn from_result<Tz>(result: Result<Vec<ApiAppointment>, PortalError>, tz: &Tz) -> Self
    where
        Tz: TimeZone,
        Tz::Offset: Display,
    {
        match result {
            Ok(appointments) => Self {
                rows: appointments
                    .iter()
                    .map(|appointment| AdminRow::from_api(appointment, tz))
                    .collect(),
                error: None,
            },
            Err(err) => {
                error!(error = %err, "failed to fetch appointments");
                Self {
                    rows: Vec::new(),
                    error: Some(LOAD_ERROR_MESSAGE.to_string()),
                }
            }
        }
    }
}

impl PortalClient {
    pub async fn appointments_by_sub_service(
        &self,
        session: Option<&Session>,
        sub_service_id: &ObjectId,
    ) -> Result<Vec<ApiAppointment>, PortalError> {
        let url = self.url(&format!(
            "/api/admin/dashboard-full/appointments_by_subservice/{sub_service_id}"
        ));
        let mut request = self.http.get(url);
        if let Some(session) = session {
            request = session.authorize(request);
        }

        let response = check_status(request.send().await?).await?;
        let body: AppointmentsResponse = response.json().await?;
        info!(
            sub_service_id = %sub_service_id,
            count = body.appointments.len(),
            "fetched appointments"
        );
        Ok(body.appointments)
    }

    /// Never fails: errors collapse into [`LOAD_ERROR_MESSAGE`].
    pub async fn admin_view(
        &self,
        session: Option<&Session>,
        sub_service_id: &ObjectId,
    ) -> AdminView {
        let result = self
            .appointments_by_sub_service(session, sub_service_id)
            .await;
        AdminView::from_result(result, &Local)
    }
}
