use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use portal_activity::classify::Bucket;
use portal_activity::db::{self, PgStore};
use portal_activity::documents;
use portal_activity::fixture::{self, FIXTURE_USER};
use portal_activity::models::ObjectId;
use portal_activity::portal::{self, PortalClient, Session, UploadOutcome, UploadRequest};
use portal_activity::report;
use portal_activity::store;

#[derive(Parser)]
#[command(name = "portal-activity")]
#[command(about = "Appointment and document-status tracker for the citizen services portal", long_about = None)]
struct Cli {
    /// Postgres connection string for the portal data store
    #[arg(long, global = true, env = "DATABASE_URL", hide_env_values = true)]
    database_url: Option<String>,

    /// Base URL of the portal API
    #[arg(long, global = true, env = "PORTAL_API_URL", default_value = portal::DEFAULT_API_URL)]
    api_url: String,

    /// User whose activities are read
    #[arg(long, global = true, env = "PORTAL_USER_ID", default_value = FIXTURE_USER)]
    user_id: String,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum BucketArg {
    Ongoing,
    Incomplete,
    Previous,
    All,
}

impl BucketArg {
    fn buckets(self) -> Vec<Bucket> {
        match self {
            BucketArg::Ongoing => vec![Bucket::Ongoing],
            BucketArg::Incomplete => vec![Bucket::Incomplete],
            BucketArg::Previous => vec![Bucket::Previous],
            BucketArg::All => Bucket::ALL.to_vec(),
        }
    }
}

#[derive(clap::Args)]
struct Credentials {
    /// Pre-issued bearer token
    #[arg(long, env = "PORTAL_TOKEN", hide_env_values = true)]
    token: Option<String>,
    /// Sign-in email, used when no token is given
    #[arg(long, env = "PORTAL_EMAIL")]
    email: Option<String>,
    /// Sign-in passcode
    #[arg(long, env = "PORTAL_PASSCODE", hide_env_values = true)]
    passcode: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load the sample appointments, services and documents
    Seed,
    /// Count the sample rows currently stored
    Verify,
    /// List a user's appointments by status view
    Classify {
        #[arg(long, value_enum, default_value_t = BucketArg::All)]
        bucket: BucketArg,
        /// Also write the rows to a CSV file
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Show the document checklist for one appointment
    Details {
        appointment_id: ObjectId,
    },
    /// Generate a markdown activity report
    Report {
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// List appointments for a sub-service as the admin dashboard shows them
    Admin {
        #[arg(
            long,
            env = "PORTAL_ADMIN_SUB_SERVICE",
            default_value = fixture::BUSINESS_LICENSE
        )]
        sub_service: ObjectId,
        #[command(flatten)]
        credentials: Credentials,
    },
    /// Upload a file against an appointment's required document
    Upload {
        #[arg(long)]
        booking_id: ObjectId,
        #[arg(long)]
        required_doc_id: ObjectId,
        #[arg(long)]
        file: PathBuf,
        #[command(flatten)]
        credentials: Credentials,
    },
}

fn require_url(database_url: Option<&str>) -> anyhow::Result<&str> {
    database_url.context("DATABASE_URL must be set to the portal Postgres instance")
}

async fn open_store(database_url: Option<&str>) -> anyhow::Result<PgStore> {
    Ok(PgStore::new(db::connect(require_url(database_url)?).await?))
}

async fn open_session(
    client: &PortalClient,
    credentials: &Credentials,
) -> anyhow::Result<Option<Session>> {
    if let Some(token) = &credentials.token {
        return Ok(Some(Session::from_token(token)));
    }
    match (&credentials.email, &credentials.passcode) {
        (Some(email), Some(passcode)) => Ok(Some(
            client
                .sign_in(email, passcode)
                .await
                .context("sign-in failed")?,
        )),
        _ => Ok(None),
    }
}

fn print_rows(bucket: Bucket, rows: &[portal_activity::models::AppointmentSummary]) {
    println!("{} ({}):", bucket.label(), rows.len());
    for row in rows {
        let date = row
            .appointment_date
            .map(|date| date.to_rfc3339())
            .unwrap_or_else(|| "unscheduled".to_string());
        println!(
            "- {} {} on {} completed={}",
            row.appointment_id, row.service_name, date, row.is_fully_completed
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "portal_activity=debug"
    } else {
        "portal_activity=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let database_url = cli.database_url.as_deref();

    match cli.command {
        Commands::InitDb => {
            let pool = db::connect(require_url(database_url)?).await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let store = open_store(database_url).await?;
            let counts = fixture::load(&store).await?;
            println!("Seed data inserted.");
            println!(
                "Appointments: {}, sub services: {}, required documents: {}, uploaded documents: {}",
                counts.appointments,
                counts.sub_services,
                counts.required_documents,
                counts.uploaded_documents
            );
        }
        Commands::Verify => {
            let store = open_store(database_url).await?;
            let counts = fixture::verify(&store).await?;
            let expected = fixture::Fixture::standard()?.expected_counts();
            println!(
                "Appointments: {}, sub services: {}, required documents: {}, uploaded documents: {}",
                counts.appointments,
                counts.sub_services,
                counts.required_documents,
                counts.uploaded_documents
            );
            if counts != expected {
                anyhow::bail!("sample data is incomplete; run `seed` again");
            }
        }
        Commands::Classify { bucket, csv } => {
            let store = open_store(database_url).await?;
            let classification = store::classify_user(&store, &cli.user_id).await?;

            for bucket in bucket.buckets() {
                print_rows(bucket, classification.bucket(bucket));
            }
            if !classification.orphaned.is_empty() {
                println!("unclassified ({}):", classification.orphaned.len());
                for id in &classification.orphaned {
                    println!("- {id} references a missing sub-service");
                }
            }
            if let Some(path) = csv {
                let written = report::write_csv(&path, &classification)?;
                println!("Wrote {written} rows to {}.", path.display());
            }
        }
        Commands::Details { appointment_id } => {
            let store = open_store(database_url).await?;
            let Some(details) =
                documents::appointment_details(&store, &cli.user_id, &appointment_id).await?
            else {
                let reason =
                    documents::details_unavailable(&store, &cli.user_id, &appointment_id).await?;
                anyhow::bail!("{reason}");
            };

            println!(
                "{} {} fee {:.2} ({}), steps {}/{}, documents {}% uploaded",
                details.reference,
                details.service_name,
                details.payment_amount,
                if details.payment_status { "paid" } else { "unpaid" },
                details.steps_completed,
                details.steps_total,
                details.upload_progress()
            );
            for entry in &details.checklist {
                let note = entry
                    .verdict
                    .and_then(|verdict| verdict.message())
                    .map(|message| format!(" !{message}"))
                    .unwrap_or_default();
                println!(
                    "- {} [{}] {}: {}{}",
                    entry.doc_name,
                    entry.required_doc_id,
                    entry.status_label(),
                    entry.band.label(),
                    note
                );
            }
            for violation in &details.unbound_uploads {
                println!(
                    "- upload {} targets {}, not required by {}",
                    violation.upload_id, violation.required_doc_id, violation.sub_service_id
                );
            }
        }
        Commands::Report { out } => {
            let store = open_store(database_url).await?;
            let classification = store::classify_user(&store, &cli.user_id).await?;

            let mut details: Vec<documents::AppointmentDetails> = Vec::new();
            for bucket in Bucket::ALL {
                for row in classification.bucket(bucket) {
                    let id: ObjectId = row.appointment_id.parse()?;
                    if details.iter().any(|detail| detail.appointment_id == id) {
                        continue;
                    }
                    if let Some(detail) =
                        documents::appointment_details(&store, &cli.user_id, &id).await?
                    {
                        details.push(detail);
                    }
                }
            }

            let report = report::build_report(&cli.user_id, &classification, &details);
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
        Commands::Admin {
            sub_service,
            credentials,
        } => {
            let client = PortalClient::new(&cli.api_url)?;
            let session = open_session(&client, &credentials).await?;
            let view = client.admin_view(session.as_ref(), &sub_service).await;

            if let Some(message) = &view.error {
                println!("{message}");
            } else if view.rows.is_empty() {
                println!("No appointments for {sub_service}.");
            }
            for row in &view.rows {
                println!(
                    "- {} {} {} {} {}",
                    row.id,
                    row.name,
                    row.date,
                    row.time,
                    row.status.label()
                );
            }
            if let Some(session) = session {
                session.end();
            }
        }
        Commands::Upload {
            booking_id,
            required_doc_id,
            file,
            credentials,
        } => {
            let client = PortalClient::new(&cli.api_url)?;
            let session = open_session(&client, &credentials)
                .await?
                .context("uploading requires --token or --email/--passcode")?;

            let bar = ProgressBar::new(100);
            bar.set_style(ProgressStyle::with_template("{bar:40} {pos:>3}%")?);
            let ticker = bar.clone();

            let request = UploadRequest {
                booking_id,
                required_doc_id,
                path: file,
            };
            let outcome = client
                .upload_document(&session, &request, move |percent| {
                    ticker.set_position(u64::from(percent))
                })
                .await;
            bar.finish_and_clear();
            session.end();

            match &outcome {
                UploadOutcome::Succeeded(payload) => {
                    println!("{}", outcome.message());
                    println!("{}", serde_json::to_string_pretty(payload)?);
                }
                UploadOutcome::Failed(message) => {
                    anyhow::bail!("{message}");
                }
            }
        }
    }

    Ok(())
}
