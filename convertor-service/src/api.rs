//! HTTP API for the convertor service.
//!
//! This module provides the REST endpoints for:
//! - Office and HTML to PDF conversion
//! - PDF OCR and page extraction
//! - Image background removal
//! - Health and metrics monitoring

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, State},
    http::{HeaderValue, StatusCode, header},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::service::{Artifact, ConvertorService};

pub mod auth;
pub mod documents;
pub mod forms;
pub mod images;
pub mod ocr;
use auth::require_client_secret;
use documents::{html_to_pdf_handler, office_to_pdf_handler, upload_pdf_handler};
use images::remove_background_handler;
use ocr::{extract_pages_handler, pdf_ocr_handler};

/// Application state
pub struct AppState {
    pub service: Arc<ConvertorService>,
    pub start_time: Instant,
    pub metrics: Option<PrometheusHandle>,
}

/// Build the API router
pub fn router(service: Arc<ConvertorService>, metrics: Option<PrometheusHandle>) -> Router {
    let cors = cors_layer(&service.config().server.cors_allowed_origins);
    let max_body_size = service.config().limits.max_upload_bytes as usize;

    let state = Arc::new(AppState {
        service,
        start_time: Instant::now(),
        metrics,
    });

    let transform_routes = Router::new()
        .route("/convert/docx-to-pdf/", post(office_to_pdf_handler))
        .route("/convert/xlsx-to-pdf/", post(office_to_pdf_handler))
        .route("/convert/ppt-to-pdf/", post(office_to_pdf_handler))
        .route("/convert/html-to-pdf/", post(html_to_pdf_handler))
        .route("/convert/pdf-ocr/", post(pdf_ocr_handler))
        .route("/convert/pdf-extract-pages/", post(extract_pages_handler))
        .route("/remove-background/", post(remove_background_handler))
        .route("/upload/", post(upload_pdf_handler))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_client_secret,
        ))
        .layer(DefaultBodyLimit::max(max_body_size));

    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .merge(transform_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Allow the configured origins, or any origin when none are configured
fn cors_layer(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        return cors.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    cors.allow_origin(AllowOrigin::list(allowed))
}

impl IntoResponse for Artifact {
    fn into_response(self) -> Response {
        let disposition = format!(
            "attachment; filename=\"{}\"",
            self.file_name.replace(['"', '\\'], "_")
        );

        (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, self.content_type.to_string()),
                (header::CONTENT_DISPOSITION, disposition),
            ],
            self.bytes,
        )
            .into_response()
    }
}

// === Health & Metrics ===

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
    })
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    uptime_seconds: u64,
}

async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let body = state
        .metrics
        .as_ref()
        .map(PrometheusHandle::render)
        .unwrap_or_default();

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
}
