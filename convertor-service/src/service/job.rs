//! Per-request transform lifecycle: logging, tracing span and metrics.

use std::time::Instant;

use tracing::{Span, debug, info, info_span, warn};
use uuid::Uuid;

use crate::error::{ErrorStage, TransformResult, format_error_chain};

/// Which transformation a request asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformKind {
    OfficeToPdf,
    HtmlToPdf,
    PdfOcr,
    PdfPageExtract,
    ImageBackgroundRemoval,
    Upload,
}

impl TransformKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransformKind::OfficeToPdf => "office_to_pdf",
            TransformKind::HtmlToPdf => "html_to_pdf",
            TransformKind::PdfOcr => "pdf_ocr",
            TransformKind::PdfPageExtract => "page_extraction",
            TransformKind::ImageBackgroundRemoval => "background_removal",
            TransformKind::Upload => "upload",
        }
    }
}

/// Lifecycle phases every transform request walks through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Received,
    Staged,
    EngineInvoked,
    Succeeded,
    Failed,
    Released,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Received => "received",
            Phase::Staged => "staged",
            Phase::EngineInvoked => "engine_invoked",
            Phase::Succeeded => "succeeded",
            Phase::Failed => "failed",
            Phase::Released => "released",
        }
    }
}

/// Tracks one request from receipt to release
pub(crate) struct TransformJob {
    kind: TransformKind,
    started: Instant,
    span: Span,
}

impl TransformJob {
    pub fn start(kind: TransformKind) -> Self {
        let request_id = Uuid::new_v4();
        let job = Self {
            kind,
            started: Instant::now(),
            span: info_span!(
                "transform",
                kind = kind.as_str(),
                request_id = %request_id,
                file = tracing::field::Empty
            ),
        };
        job.advance(Phase::Received);
        job
    }

    pub fn span(&self) -> Span {
        self.span.clone()
    }

    /// Attach the staged file name to every later event of this request
    pub fn record_file(&self, name: &str) {
        self.span.record("file", name);
    }

    pub fn advance(&self, phase: Phase) {
        debug!(parent: &self.span, phase = phase.as_str(), "Transform phase");
    }

    /// Record the outcome. Call after every staged file has been released.
    pub fn finish<T>(self, result: &TransformResult<T>) {
        let _entered = self.span.enter();
        let elapsed = self.started.elapsed();
        let elapsed_ms = elapsed.as_millis() as u64;

        let outcome = match result {
            Ok(_) => {
                info!(phase = Phase::Succeeded.as_str(), elapsed_ms, "Transform succeeded");
                "success"
            }
            Err(e) => {
                let stage = e.stage();
                if stage == ErrorStage::Validation {
                    info!(
                        phase = Phase::Failed.as_str(),
                        stage = stage.as_str(),
                        elapsed_ms,
                        error = %e,
                        "Transform rejected"
                    );
                } else {
                    warn!(
                        phase = Phase::Failed.as_str(),
                        stage = stage.as_str(),
                        elapsed_ms,
                        error = %format_error_chain(e),
                        "Transform failed"
                    );
                }
                stage.as_str()
            }
        };

        metrics::counter!(
            "transforms_total",
            "kind" => self.kind.as_str(),
            "outcome" => outcome
        )
        .increment(1);
        metrics::histogram!("transform_duration_seconds", "kind" => self.kind.as_str())
            .record(elapsed.as_secs_f64());

        debug!(phase = Phase::Released.as_str(), "Transform scratch released");
    }
}
