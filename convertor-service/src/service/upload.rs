//! Plain PDF upload into scratch space.

use tracing::Instrument;

use super::job::{Phase, TransformJob, TransformKind};
use super::{ConvertorService, Upload};
use crate::error::{TransformError, TransformResult};

impl ConvertorService {
    /// Accept a PDF and report where it was staged.
    ///
    /// The file is released before the response goes out, so the returned
    /// path only identifies the upload; it cannot be fetched afterwards.
    pub async fn stage_upload(&self, upload: Upload) -> TransformResult<String> {
        let job = TransformJob::start(TransformKind::Upload);
        let result = self.run_stage_upload(&job, upload).instrument(job.span()).await;
        job.finish(&result);
        result
    }

    async fn run_stage_upload(&self, job: &TransformJob, upload: Upload) -> TransformResult<String> {
        if !is_pdf(upload.content_type.as_deref()) {
            return Err(TransformError::validation("Only PDF files are allowed"));
        }

        let staged = self.staging.stage(&upload.file_name, &upload.data).await?;
        job.record_file(staged.file_name());
        job.advance(Phase::Staged);

        let file_path = staged.staged_path().to_string_lossy().replace('\\', "/");
        self.staging.release(staged);
        Ok(file_path)
    }
}

fn is_pdf(content_type: Option<&str>) -> bool {
    content_type
        .and_then(|ct| ct.parse::<mime::Mime>().ok())
        .is_some_and(|m| m.essence_str() == mime::APPLICATION_PDF.essence_str())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tempfile::TempDir;

    use super::*;
    use crate::service::testing::*;

    #[test]
    fn test_is_pdf() {
        assert!(is_pdf(Some("application/pdf")));
        assert!(is_pdf(Some("application/pdf; name=x.pdf")));
        assert!(!is_pdf(Some("image/png")));
        assert!(!is_pdf(Some("garbage")));
        assert!(!is_pdf(None));
    }

    #[tokio::test]
    async fn test_pdf_upload_reports_relative_path() {
        let scratch = TempDir::new().unwrap();
        let stub = Arc::new(StubEngine::default());
        let service = service_with(&stub, scratch.path());

        let path = service
            .stage_upload(upload("invoice.pdf", "application/pdf", b"%PDF"))
            .await
            .unwrap();

        assert!(path.ends_with("/invoice.pdf"));
        assert!(!path.contains(&*scratch.path().to_string_lossy()));
        assert_eq!(scratch_entries(scratch.path()), 0);
    }

    #[tokio::test]
    async fn test_non_pdf_rejected() {
        let scratch = TempDir::new().unwrap();
        let stub = Arc::new(StubEngine::default());
        let service = service_with(&stub, scratch.path());

        let err = service
            .stage_upload(upload("photo.png", "image/png", b"png"))
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "Only PDF files are allowed");
        assert_eq!(scratch_entries(scratch.path()), 0);
    }
}
