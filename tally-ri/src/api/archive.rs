//! Results archive download
//!
//! The archive is assembled in memory; progress is published on the event
//! bus as `ArchiveProgress` percentages for SSE clients.

use crate::error::{ApiError, ApiResult};
use crate::AppState;
use axum::{
    extract::{Path, State},
    http::header,
    response::IntoResponse,
};
use tally_common::TallyEvent;

/// GET /api/surveys/:id/archive
pub async fn download_archive(
    State(state): State<AppState>,
    Path(survey_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let bus = state.event_bus.clone();
    let progress_id = survey_id.clone();
    let mut last_percent: Option<u8> = None;
    let mut report = move |fraction: f64| {
        let percent = (fraction.clamp(0.0, 1.0) * 100.0).round() as u8;
        if last_percent.map_or(true, |last| percent > last) {
            last_percent = Some(percent);
            bus.emit_lossy(TallyEvent::ArchiveProgress {
                survey_id: progress_id.clone(),
                percent,
            });
        }
    };

    let archive = state
        .assembler
        .build_archive(&survey_id, &mut report)
        .await
        .map_err(ApiError::export)?;

    state.event_bus.emit_lossy(TallyEvent::ArchiveCompleted {
        survey_id: survey_id.clone(),
        file_name: archive.file_name.clone(),
        bytes: archive.bytes.len(),
        attachment_count: archive.attachment_count,
    });

    Ok((
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", archive.file_name),
            ),
        ],
        archive.bytes,
    ))
}
