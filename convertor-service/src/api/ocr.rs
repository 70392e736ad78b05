//! PDF OCR endpoints.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{Json, extract::State};
use serde::Serialize;

use crate::error::TransformError;
use crate::pages::PageSelection;

use super::AppState;
use super::forms::FormData;

#[derive(Serialize)]
pub struct OcrResponse {
    pub ocr_text: String,
}

/// Extracted text keyed by 1-based page number
#[derive(Serialize)]
pub struct PagesResponse {
    pub pages: BTreeMap<u64, String>,
}

/// OCR a whole PDF into one text block
pub async fn pdf_ocr_handler(
    State(state): State<Arc<AppState>>,
    mut form: FormData,
) -> Result<Json<OcrResponse>, TransformError> {
    let upload = form
        .take_file("file")
        .ok_or_else(|| TransformError::validation("No file provided"))?;

    let ocr_text = state.service.ocr_document(upload).await?;
    Ok(Json(OcrResponse { ocr_text }))
}

/// OCR selected pages of a PDF
pub async fn extract_pages_handler(
    State(state): State<Arc<AppState>>,
    mut form: FormData,
) -> Result<Json<PagesResponse>, TransformError> {
    let upload = form
        .take_file("file")
        .ok_or_else(|| TransformError::validation("No file provided"))?;
    let selection =
        PageSelection::from_form(form.field("extract_all"), form.field_values("pages"))?;

    let pages = state.service.extract_pages(upload, selection).await?;
    Ok(Json(PagesResponse { pages }))
}
