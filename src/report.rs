use std::fmt::Write;
use std::path::Path;

use serde::Serialize;

use crate::classify::{Bucket, Classification};
use crate::documents::AppointmentDetails;
use crate::models::AppointmentSummary;

fn date_label(summary: &AppointmentSummary) -> String {
    summary
        .appointment_date
        .map(|date| date.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| "not scheduled".to_string())
}

fn section_title(bucket: Bucket) -> &'static str {
    match bucket {
        Bucket::Ongoing => "Ongoing Activities",
        Bucket::Incomplete => "Incomplete Activities",
        Bucket::Previous => "Previous Activities",
    }
}

pub fn build_report(
    user_id: &str,
    classification: &Classification,
    details: &[AppointmentDetails],
) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Activity Report");
    let _ = writeln!(output, "Generated for {}", user_id);

    for bucket in Bucket::ALL {
        let rows = classification.bucket(bucket);
        let _ = writeln!(output);
        let _ = writeln!(output, "## {}", section_title(bucket));

        if rows.is_empty() {
            let _ = writeln!(output, "No {} appointments.", bucket.label());
        } else {
            for row in rows {
                let _ = writeln!(
                    output,
                    "- {} ({}) on {}{}",
                    row.service_name,
                    row.appointment_id,
                    date_label(row),
                    if row.is_fully_completed { ", completed" } else { "" }
                );
            }
        }
    }

    if !classification.orphaned.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Unclassified");
        for id in &classification.orphaned {
            let _ = writeln!(output, "- {} references a missing sub-service", id);
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Documents");

    if details.is_empty() {
        let _ = writeln!(output, "No appointments with document requirements.");
    }

    for detail in details {
        let _ = writeln!(
            output,
            "### {} {} ({}% uploaded, steps {}/{}, fee {:.2}{})",
            detail.reference,
            detail.service_name,
            detail.upload_progress(),
            detail.steps_completed,
            detail.steps_total,
            detail.payment_amount,
            if detail.payment_status { " paid" } else { " unpaid" }
        );
        for entry in &detail.checklist {
            let accuracy = entry
                .upload
                .as_ref()
                .and_then(|upload| upload.accuracy)
                .map(|value| format!("{:.2}%", value * 100.0))
                .unwrap_or_else(|| "-".to_string());
            let _ = write!(
                output,
                "- {}: {} (accuracy {}, {})",
                entry.doc_name,
                entry.status_label(),
                accuracy,
                entry.band.label()
            );
            match entry.verdict.and_then(|verdict| verdict.message()) {
                Some(note) => {
                    let _ = writeln!(output, " !{}", note);
                }
                None => {
                    let _ = writeln!(output);
                }
            }
        }
        for violation in &detail.unbound_uploads {
            let _ = writeln!(
                output,
                "- upload {} targets {}, which this service does not require",
                violation.upload_id, violation.required_doc_id
            );
        }
    }

    output
}

#[derive(Serialize)]
struct CsvRow<'a> {
    bucket: &'static str,
    appointment_id: &'a str,
    service_name: &'a str,
    appointment_date: Option<String>,
    is_fully_completed: bool,
}

/// One row per (bucket, appointment); returns rows written.
pub fn write_csv(path: &Path, classification: &Classification) -> anyhow::Result<usize> {
    let mut writer = csv::Writer::from_path(path)?;
    let mut written = 0usize;

    for bucket in Bucket::ALL {
        for row in classification.bucket(bucket) {
            writer.serialize(CsvRow {
                bucket: bucket.label(),
                appointment_id: &row.appointment_id,
                service_name: &row.service_name,
                appointment_date: row.appointment_date.map(|date| date.to_rfc3339()),
                is_fully_completed: row.is_fully_completed,
            })?;
            written += 1;
        }
    }

    writer.flush()?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::documents;
    use crate::fixture::{self, Fixture};
    use crate::store::memory::MemoryStore;
    use crate::store::classify_user;

    async fn fixture_inputs() -> (Classification, Vec<AppointmentDetails>) {
        let store = MemoryStore::default();
        fixture::load(&store).await.unwrap();
        let classification = classify_user(&store, fixture::FIXTURE_USER).await.unwrap();

        let mut details = Vec::new();
        for appointment in Fixture::standard().unwrap().appointments {
            if let Some(detail) =
                documents::appointment_details(&store, fixture::FIXTURE_USER, &appointment.id)
                    .await
                    .unwrap()
            {
                details.push(detail);
            }
        }
        (classification, details)
    }

    #[tokio::test]
    async fn report_lists_each_view() {
        let (classification, details) = fixture_inputs().await;
        let report = build_report(fixture::FIXTURE_USER, &classification, &details);

        assert!(report.contains("## Ongoing Activities"));
        assert!(report.contains("- Business License Application (689db25103b6e08e79db7d7f) on 2024-12-15 10:00 UTC"));
        assert!(report.contains("- Passport Renewal (689db25203b6e08e79db7d80) on not scheduled"));
        assert!(report.contains("Driver's License Renewal (689db25303b6e08e79db7d81) on 2024-07-15 14:30 UTC, completed"));
        assert!(report.contains("- Current Passport: Not Uploaded (accuracy -, unscored)"));
        assert!(report.contains("### APT-2024-003 Driver's License Renewal (100% uploaded, steps 2/2, fee 75.00 paid)"));
        assert!(!report.contains("## Unclassified"));
    }

    #[test]
    fn empty_views_are_called_out() {
        let report = build_report("nobody", &Classification::default(), &[]);
        assert!(report.contains("No ongoing appointments."));
        assert!(report.contains("No incomplete appointments."));
        assert!(report.contains("No previous appointments."));
        assert!(report.contains("No appointments with document requirements."));
    }

    #[tokio::test]
    async fn csv_has_one_row_per_bucket_entry() {
        let (classification, _) = fixture_inputs().await;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("activities.csv");

        let written = write_csv(&path, &classification).unwrap();
        assert_eq!(written, 3);

        let contents = std::fs::read_to_string(&path).unwrap();
        let mut lines = contents.lines();
        assert_eq!(
            lines.next(),
            Some("bucket,appointment_id,service_name,appointment_date,is_fully_completed")
        );
        assert_eq!(
            lines.next(),
            Some("ongoing,689db25103b6e08e79db7d7f,Business License Application,2024-12-15T10:00:00+00:00,false")
        );
        assert!(contents.contains("incomplete,689db25203b6e08e79db7d80,Passport Renewal,,false"));
    }
}
