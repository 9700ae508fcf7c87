use std::path::PathBuf;

use futures::TryStreamExt;
use reqwest::multipart::{Form, Part};
use reqwest::Body;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tracing::{error, info};

use super::{check_status, PortalClient, PortalError, Session};
use crate::documents::percent;
use crate::models::ObjectId;

const CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub booking_id: ObjectId,
    pub required_doc_id: ObjectId,
    pub path: PathBuf,
}

impl UploadRequest {
    fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload.bin".to_string())
    }
}

/// Binary result of one submission.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadOutcome {
    Succeeded(serde_json::Value),
    Failed(String),
}

impl UploadOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, UploadOutcome::Succeeded(_))
    }

    pub fn message(&self) -> &str {
        match self {
            UploadOutcome::Succeeded(_) => "Document uploaded successfully",
            UploadOutcome::Failed(message) => message,
        }
    }
}

impl PortalClient {
    /// Streams the file as multipart `file`, `booking_id`, `required_doc_id`.
    /// `on_progress` receives 0-100 as the body is sent.
    pub async fn upload_document<F>(
        &self,
        session: &Session,
        request: &UploadRequest,
        on_progress: F,
    ) -> UploadOutcome
    where
        F: Fn(u8) + Send + Sync + 'static,
    {
        match self.try_upload(session, request, on_progress).await {
            Ok(payload) => {
                info!(
                    booking_id = %request.booking_id,
                    required_doc_id = %request.required_doc_id,
                    "document uploaded"
                );
                UploadOutcome::Succeeded(payload)
            }
            Err(err) => {
                error!(error = %err, path = %request.path.display(), "document upload failed");
                UploadOutcome::Failed(format!("Document upload failed: {err}"))
            }
        }
    }

    async fn try_upload<F>(
        &self,
        session: &Session,
        request: &UploadRequest,
        on_progress: F,
    ) -> Result<serde_json::Value, PortalError>
    where
        F: Fn(u8) + Send + Sync + 'static,
    {
        let file = File::open(&request.path).await?;
        let total = file.metadata().await?.len();
        on_progress(0);
        if total == 0 {
            on_progress(100);
        }

        let mut sent = 0u64;
        let stream = futures::stream::try_unfold(file, read_chunk).map_ok(move |chunk| {
            sent += chunk.len() as u64;
            on_progress(percent(sent, total));
            chunk
        });

        let file = Part::stream_with_length(Body::wrap_stream(stream), total)
            .file_name(request.file_name());
        let form = Form::new()
            .part("file", file)
            .text("booking_id", request.booking_id.to_string())
            .text("required_doc_id", request.required_doc_id.to_string());

        let response = session
            .authorize(self.http.post(self.url("/user/documents/upload")))
            .multipart(form)
            .send()
            .await?;
        let payload = check_status(response).await?.json().await?;
        Ok(payload)
    }
}

async fn read_chunk(mut file: File) -> std::io::Result<Option<(Vec<u8>, File)>> {
    let mut chunk = vec![0u8; CHUNK_SIZE];
    let read = file.read(&mut chunk).await?;
    if read == 0 {
        return Ok(None);
    }
    chunk.truncate(read);
    Ok(Some((chunk, file)))
}
