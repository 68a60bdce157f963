//! Job submission, polling and cancellation.

use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use slidecast_models::{Job, JobId, JobStatus, NewJob};
use slidecast_storage::UploadedImage;
use slidecast_worker::{CancelOutcome, JobFailure, SubmitOutcome};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Multipart field carrying an image. May repeat.
const FILES_FIELD: &str = "files";

const NO_IMAGES_DETAIL: &str = "No usable images were uploaded";

/// Response to a job submission.
#[derive(Debug, Serialize)]
pub struct CreateJobResponse {
    pub job_id: JobId,
    pub status: JobStatus,
    /// Why the job was failed at submission
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Public view of a job.
///
/// The failure cause stays in the logs; clients only see `failed`.
#[derive(Debug, Serialize)]
pub struct JobResponse {
    pub id: JobId,
    pub title: String,
    pub status: JobStatus,
    pub video_path: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<Job> for JobResponse {
    fn from(job: Job) -> Self {
        Self {
            id: job.id,
            title: job.title,
            status: job.status,
            video_path: job.video_path,
            created_at: job.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CancelJobResponse {
    pub job_id: JobId,
    pub status: JobStatus,
    pub message: String,
}

/// Fields read from a job submission form.
#[derive(Default)]
struct JobForm {
    title: Option<String>,
    text_content: Option<String>,
    images: Vec<UploadedImage>,
}

async fn read_form(mut multipart: Multipart) -> ApiResult<JobForm> {
    let mut form = JobForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid multipart body: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "title" => {
                form.title = Some(field.text().await.map_err(|e| {
                    ApiError::bad_request(format!("Invalid title field: {}", e))
                })?);
            }
            "text_content" => {
                form.text_content = Some(field.text().await.map_err(|e| {
                    ApiError::bad_request(format!("Invalid text_content field: {}", e))
                })?);
            }
            FILES_FIELD => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await.map_err(|e| {
                    ApiError::bad_request(format!("Invalid file field: {}", e))
                })?;
                // Browsers send an empty part when no file was picked.
                if filename.is_empty() && bytes.is_empty() {
                    continue;
                }
                form.images.push(UploadedImage::new(filename, bytes.to_vec()));
            }
            other => {
                warn!(field = other, "Ignoring unknown multipart field");
            }
        }
    }

    Ok(form)
}

/// Create a job from a multipart upload.
///
/// Returns `202` once the job is queued. A submission without usable images
/// still creates a job, which is failed right away (`422`). Other intake
/// failures also fail the job but are server errors.
pub async fn create_job(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<Response> {
    let form = read_form(multipart).await?;

    let title = form
        .title
        .ok_or_else(|| ApiError::bad_request("Missing field: title"))?;
    let text_content = form
        .text_content
        .ok_or_else(|| ApiError::bad_request("Missing field: text_content"))?;

    let image_count = form.images.len();
    let outcome = state
        .jobs
        .submit(NewJob::new(title, text_content), form.images)
        .await?;

    let response = match outcome {
        SubmitOutcome::Queued(job) => {
            info!(job_id = %job.id, images = image_count, "Job accepted");
            (
                StatusCode::ACCEPTED,
                Json(CreateJobResponse {
                    job_id: job.id,
                    status: job.status,
                    detail: None,
                }),
            )
        }
        SubmitOutcome::Rejected {
            job,
            failure: JobFailure::Validation(_),
        } => {
            warn!(job_id = %job.id, "Job rejected at submission: no usable images");
            (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(CreateJobResponse {
                    job_id: job.id,
                    status: job.status,
                    detail: Some(NO_IMAGES_DETAIL.to_string()),
                }),
            )
        }
        SubmitOutcome::Rejected { job, failure } => {
            // The cause is logged and stored on the job, not returned.
            error!(
                job_id = %job.id,
                reason = failure.reason(),
                "Job failed at submission: {}", failure
            );
            return Err(ApiError::internal(format!(
                "job {} could not be stored",
                job.id
            )));
        }
    };

    Ok(response.into_response())
}

/// Get a job's current state.
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<i64>,
) -> ApiResult<Json<JobResponse>> {
    let job = state.store.get(JobId(job_id)).await?;
    Ok(Json(job.into()))
}

/// Request cancellation of a job.
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<i64>,
) -> ApiResult<(StatusCode, Json<CancelJobResponse>)> {
    let job_id = JobId(job_id);

    match state.pool.cancel(job_id).await? {
        CancelOutcome::Withdrawn(job) => Ok((
            StatusCode::ACCEPTED,
            Json(CancelJobResponse {
                job_id,
                status: job.status,
                message: "Job cancelled before it started".to_string(),
            }),
        )),
        CancelOutcome::Signalled(status) => Ok((
            StatusCode::ACCEPTED,
            Json(CancelJobResponse {
                job_id,
                status,
                message: "Cancellation requested".to_string(),
            }),
        )),
        CancelOutcome::AlreadyFinished(status) => Err(ApiError::Conflict(format!(
            "job {} is already {}",
            job_id, status
        ))),
    }
}
