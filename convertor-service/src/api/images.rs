//! Image endpoints.

use std::sync::Arc;

use axum::extract::State;

use crate::error::TransformError;
use crate::service::Artifact;

use super::AppState;
use super::forms::FormData;

/// Cut the subject out of the `image` upload
pub async fn remove_background_handler(
    State(state): State<Arc<AppState>>,
    mut form: FormData,
) -> Result<Artifact, TransformError> {
    let upload = form
        .take_file("image")
        .ok_or_else(|| TransformError::validation("No image provided"))?;

    state.service.remove_background(upload).await
}
