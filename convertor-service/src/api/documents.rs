//! Document conversion endpoints.
//!
//! Handlers for office and HTML to PDF conversion, plus the plain PDF upload.

use axum::{
    Json,
    extract::State,
    http::StatusCode,
};
use serde::Serialize;
use std::sync::Arc;

use crate::error::TransformError;
use crate::service::Artifact;

use super::AppState;
use super::forms::FormData;

/// Response for a staged upload
#[derive(Serialize)]
pub struct UploadResponse {
    pub file_path: String,
}

/// Convert a .docx, .xlsx or .ppt/.pptx upload to PDF
pub async fn office_to_pdf_handler(
    State(state): State<Arc<AppState>>,
    mut form: FormData,
) -> Result<Artifact, TransformError> {
    let upload = form
        .take_file("file")
        .ok_or_else(|| TransformError::validation("No file provided"))?;

    state.service.office_to_pdf(upload).await
}

/// Render the `html_content` field to PDF
pub async fn html_to_pdf_handler(
    State(state): State<Arc<AppState>>,
    form: FormData,
) -> Result<Artifact, TransformError> {
    let html = form
        .field("html_content")
        .filter(|html| !html.trim().is_empty())
        .ok_or_else(|| TransformError::validation("No HTML content provided"))?;

    state.service.html_to_pdf(html).await
}

/// Accept a PDF upload
pub async fn upload_pdf_handler(
    State(state): State<Arc<AppState>>,
    mut form: FormData,
) -> Result<(StatusCode, Json<UploadResponse>), TransformError> {
    let upload = form
        .take_file("file")
        .ok_or_else(|| TransformError::validation("No file provided"))?;

    let file_path = state.service.stage_upload(upload).await?;
    Ok((StatusCode::CREATED, Json(UploadResponse { file_path })))
}
