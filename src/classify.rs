use std::collections::HashMap;

use tracing::warn;

use crate::models::{Appointment, AppointmentSummary, ObjectId, SubService};

/// The three activity views a citizen sees.
///
/// Each variant carries its predicate twice: once as SQL for the Postgres
/// store and once as [`Bucket::matches`] for in-memory data. Both must agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bucket {
    Ongoing,
    Incomplete,
    Previous,
}

impl Bucket {
    pub const ALL: [Bucket; 3] = [Bucket::Ongoing, Bucket::Incomplete, Bucket::Previous];

    pub fn label(self) -> &'static str {
        match self {
            Bucket::Ongoing => "ongoing",
            Bucket::Incomplete => "incomplete",
            Bucket::Previous => "previous",
        }
    }

    pub fn matches(self, appointment: &Appointment) -> bool {
        match self {
            Bucket::Ongoing => {
                appointment.appointment_date.is_some()
                    && !appointment.is_fully_completed
                    && appointment.appointment_confirmed
            }
            Bucket::Incomplete => {
                appointment.appointment_date.is_none() || !appointment.appointment_confirmed
            }
            Bucket::Previous => appointment.is_fully_completed,
        }
    }

    /// Predicate over the `a` alias of `portal.appointments`.
    pub fn predicate_sql(self) -> &'static str {
        match self {
            Bucket::Ongoing => {
                "a.appointment_date IS NOT NULL AND a.is_fully_completed = FALSE \
                 AND a.appointment_confirmed = TRUE"
            }
            Bucket::Incomplete => "(a.appointment_date IS NULL OR a.appointment_confirmed = FALSE)",
            Bucket::Previous => "a.is_fully_completed = TRUE",
        }
    }
}

/// Join + projection for one bucket. `$1` binds the user id.
///
/// The inner join drops appointments whose sub-service does not resolve; see
/// [`orphans_query`] for the complement.
pub fn summary_query(bucket: Bucket) -> String {
    format!(
        "SELECT a.id AS appointment_id, s.service_name, a.appointment_date, a.is_fully_completed \
         FROM portal.appointments a \
         JOIN portal.sub_services s ON s.id = a.sub_service_id \
         WHERE a.user_id = $1 AND {} \
         ORDER BY a.created_at, a.id",
        bucket.predicate_sql()
    )
}

pub fn orphans_query() -> &'static str {
    "SELECT a.id \
     FROM portal.appointments a \
     LEFT JOIN portal.sub_services s ON s.id = a.sub_service_id \
     WHERE a.user_id = $1 AND s.id IS NULL \
     ORDER BY a.created_at, a.id"
}

#[derive(Debug, Clone, Default)]
pub struct Classification {
    pub ongoing: Vec<AppointmentSummary>,
    pub incomplete: Vec<AppointmentSummary>,
    pub previous: Vec<AppointmentSummary>,
    /// Appointments whose sub-service reference did not resolve.
    pub orphaned: Vec<ObjectId>,
}

impl Classification {
    pub fn bucket(&self, bucket: Bucket) -> &[AppointmentSummary] {
        match bucket {
            Bucket::Ongoing => &self.ongoing,
            Bucket::Incomplete => &self.incomplete,
            Bucket::Previous => &self.previous,
        }
    }

    pub fn bucket_mut(&mut self, bucket: Bucket) -> &mut Vec<AppointmentSummary> {
        match bucket {
            Bucket::Ongoing => &mut self.ongoing,
            Bucket::Incomplete => &mut self.incomplete,
            Bucket::Previous => &mut self.previous,
        }
    }
}

pub fn classify(
    bucket: Bucket,
    user_id: &str,
    appointments: &[Appointment],
    sub_services: &[SubService],
) -> Vec<AppointmentSummary> {
    let names = service_names(sub_services);

    let mut matching: Vec<&Appointment> = appointments
        .iter()
        .filter(|appointment| appointment.user_id == user_id && bucket.matches(appointment))
        .collect();
    matching.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));

    matching
        .into_iter()
        .filter_map(|appointment| {
            let service_name = names.get(&appointment.sub_service_id)?;
            Some(AppointmentSummary {
                appointment_id: appointment.id.to_string(),
                service_name: (*service_name).to_string(),
                appointment_date: appointment.appointment_date,
                is_fully_completed: appointment.is_fully_completed,
            })
        })
        .collect()
}

pub fn classify_ongoing(
    user_id: &str,
    appointments: &[Appointment],
    sub_services: &[SubService],
) -> Vec<AppointmentSummary> {
    classify(Bucket::Ongoing, user_id, appointments, sub_services)
}

pub fn classify_incomplete(
    user_id: &str,
    appointments: &[Appointment],
    sub_services: &[SubService],
) -> Vec<AppointmentSummary> {
    classify(Bucket::Incomplete, user_id, appointments, sub_services)
}

pub fn classify_previous(
    user_id: &str,
    appointments: &[Appointment],
    sub_services: &[SubService],
) -> Vec<AppointmentSummary> {
    classify(Bucket::Previous, user_id, appointments, sub_services)
}

pub fn orphaned(
    user_id: &str,
    appointments: &[Appointment],
    sub_services: &[SubService],
) -> Vec<ObjectId> {
    let names = service_names(sub_services);

    let mut orphans: Vec<&Appointment> = appointments
        .iter()
        .filter(|appointment| {
            appointment.user_id == user_id && !names.contains_key(&appointment.sub_service_id)
        })
        .collect();
    orphans.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
    orphans.into_iter().map(|appointment| appointment.id.clone()).collect()
}

pub fn classify_all(
    user_id: &str,
    appointments: &[Appointment],
    sub_services: &[SubService],
) -> Classification {
    let mut classification = Classification {
        orphaned: orphaned(user_id, appointments, sub_services),
        ..Classification::default()
    };
    for bucket in Bucket::ALL {
        *classification.bucket_mut(bucket) = classify(bucket, user_id, appointments, sub_services);
    }
    log_orphans(user_id, &classification.orphaned);
    classification
}

pub fn log_orphans(user_id: &str, orphaned: &[ObjectId]) {
    for id in orphaned {
        warn!(user_id, appointment_id = %id, "appointment references a missing sub-service");
    }
}

fn service_names(sub_services: &[SubService]) -> HashMap<&ObjectId, &str> {
    sub_services
        .iter()
        .map(|service| (&service.id, service.service_name.as_str()))
        .collect()
}
