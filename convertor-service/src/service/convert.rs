//! Office document and HTML conversion to PDF.

use tracing::Instrument;

use super::job::{Phase, TransformJob, TransformKind};
use super::{Artifact, ConvertorService, Upload};
use crate::error::{TransformError, TransformResult};

/// Download name of every HTML rendering
pub const HTML_OUTPUT_NAME: &str = "converted_html.pdf";

impl ConvertorService {
    /// Convert a word-processor, spreadsheet or presentation file to PDF
    pub async fn office_to_pdf(&self, upload: Upload) -> TransformResult<Artifact> {
        let job = TransformJob::start(TransformKind::OfficeToPdf);
        let result = self
            .run_office_to_pdf(&job, upload)
            .instrument(job.span())
            .await;
        job.finish(&result);
        result
    }

    async fn run_office_to_pdf(&self, job: &TransformJob, upload: Upload) -> TransformResult<Artifact> {
        let input = self.staging.stage(&upload.file_name, &upload.data).await?;
        job.record_file(input.file_name());
        job.advance(Phase::Staged);

        job.advance(Phase::EngineInvoked);
        let output = self.engines.office.convert(&input).await?;
        let bytes = self.read_artifact(&output, "Converted PDF").await?;
        let file_name = output.file_name().to_string();

        self.staging.release(output);
        self.staging.release(input);
        Ok(Artifact::pdf(bytes, file_name))
    }

    /// Render inline HTML markup to PDF
    pub async fn html_to_pdf(&self, html: &str) -> TransformResult<Artifact> {
        let job = TransformJob::start(TransformKind::HtmlToPdf);
        let result = self.run_html_to_pdf(&job, html).instrument(job.span()).await;
        job.finish(&result);
        result
    }

    async fn run_html_to_pdf(&self, job: &TransformJob, html: &str) -> TransformResult<Artifact> {
        if html.trim().is_empty() {
            return Err(TransformError::validation("No HTML content provided"));
        }

        let output = self.staging.reserve(HTML_OUTPUT_NAME).await?;
        job.record_file(output.file_name());
        job.advance(Phase::Staged);

        job.advance(Phase::EngineInvoked);
        self.engines.html.render(html, &output).await?;
        let bytes = self.read_artifact(&output, "Rendered PDF").await?;

        self.staging.release(output);
        Ok(Artifact::pdf(bytes, HTML_OUTPUT_NAME))
    }
}
