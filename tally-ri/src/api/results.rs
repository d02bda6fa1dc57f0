//! Results submission and read-back endpoints

use crate::error::{ApiError, ApiResult};
use crate::results::{IngestReceipt, Record, Upload};
use crate::AppState;
use axum::{
    extract::{Multipart, Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use tracing::debug;

/// Body of a successful submission
#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub message: &'static str,
    #[serde(flatten)]
    pub receipt: IngestReceipt,
}

/// POST /api/surveys/:id/results
///
/// Multipart form: one text part per question label, plus file parts.
/// A label posted more than once (multi-select) is joined with `", "`.
/// Empty file parts (no file chosen) are ignored.
pub async fn submit_results(
    State(state): State<AppState>,
    Path(survey_id): Path<String>,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<SubmitResponse>)> {
    let mut fields = Record::new();
    let mut uploads = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Malformed form data: {}", e)))?
    {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        if let Some(file_name) = field.file_name().map(str::to_string) {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::BadRequest(format!("Failed to read upload {}: {}", name, e)))?;
            if file_name.is_empty() && bytes.is_empty() {
                continue;
            }
            debug!(field = %name, file = %file_name, bytes = bytes.len(), "Upload received");
            uploads.push(Upload {
                field: name,
                file_name,
                bytes: bytes.to_vec(),
            });
            continue;
        }

        let value = field
            .text()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Failed to read field {}: {}", name, e)))?;
        let joined = match fields.get(&name) {
            Some(previous) => format!("{}, {}", previous, value),
            None => value,
        };
        fields.insert(name, joined);
    }

    let receipt = state
        .engine
        .ingest(&survey_id, fields, uploads)
        .await
        .map_err(ApiError::ingestion)?;

    Ok((
        StatusCode::CREATED,
        Json(SubmitResponse {
            message: "Results saved successfully",
            receipt,
        }),
    ))
}

/// GET /api/surveys/:id/results - decoded rows, header order
pub async fn get_results(
    State(state): State<AppState>,
    Path(survey_id): Path<String>,
) -> ApiResult<Json<Vec<Record>>> {
    let set = state.reader.rows(&survey_id).await?;
    Ok(Json(set.rows))
}

/// GET /api/surveys/:id/results-csv - the table exactly as stored
pub async fn get_results_csv(
    State(state): State<AppState>,
    Path(survey_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let text = state.reader.raw_table(&survey_id).await?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("inline; filename=\"{}-results.csv\"", survey_id),
            ),
        ],
        text,
    ))
}
