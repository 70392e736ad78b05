//! PDF text recognition: whole-document OCR and per-page extraction.

use std::collections::BTreeMap;

use tracing::{Instrument, warn};

use super::job::{Phase, TransformJob, TransformKind};
use super::{ConvertorService, Upload};
use crate::error::TransformResult;
use crate::pages::PageSelection;
use crate::text;

/// Value reported for a page that yielded no text
pub const NO_TEXT: &str = "No text detected.";

impl ConvertorService {
    /// Recognize every page in order; any page failure fails the request
    pub async fn ocr_document(&self, upload: Upload) -> TransformResult<String> {
        let job = TransformJob::start(TransformKind::PdfOcr);
        let result = self
            .run_ocr_document(&job, upload)
            .instrument(job.span())
            .await;
        job.finish(&result);
        result
    }

    async fn run_ocr_document(&self, job: &TransformJob, upload: Upload) -> TransformResult<String> {
        let pdf = self.staging.stage(&upload.file_name, &upload.data).await?;
        job.record_file(pdf.file_name());
        job.advance(Phase::Staged);

        job.advance(Phase::EngineInvoked);
        let page_count = self.page_count(&pdf).await?;
        let pages = self
            .rasterize(&pdf, (0..page_count).collect(), self.config.ocr.default_dpi)
            .await?;

        let mut ocr_text = String::new();
        for page in pages {
            let png = page.png?;
            let page_text = self.engines.recognizer.recognize(&png).await?;
            ocr_text.push_str(&format!("\n\nPage {}:\n{}", page.index + 1, page_text));
        }

        self.staging.release(pdf);
        Ok(ocr_text)
    }

    /// Recognize selected pages, keyed by 1-based page number.
    ///
    /// Selection problems fail the request before any page is rendered. After
    /// that each page stands alone: a failed page reports `Error: ...` and a
    /// page without text reports [`NO_TEXT`].
    pub async fn extract_pages(
        &self,
        upload: Upload,
        selection: PageSelection,
    ) -> TransformResult<BTreeMap<u64, String>> {
        let job = TransformJob::start(TransformKind::PdfPageExtract);
        let result = self
            .run_extract_pages(&job, upload, selection)
            .instrument(job.span())
            .await;
        job.finish(&result);
        result
    }

    async fn run_extract_pages(
        &self,
        job: &TransformJob,
        upload: Upload,
        selection: PageSelection,
    ) -> TransformResult<BTreeMap<u64, String>> {
        let pdf = self.staging.stage(&upload.file_name, &upload.data).await?;
        job.record_file(pdf.file_name());
        job.advance(Phase::Staged);

        let page_count = self.page_count(&pdf).await?;
        let indices = selection.resolve(page_count)?;

        job.advance(Phase::EngineInvoked);
        let pages = self
            .rasterize(&pdf, indices, self.config.ocr.extraction_dpi)
            .await?;

        let mut extracted = BTreeMap::new();
        for page in pages {
            let number = page.index as u64 + 1;
            let recognized = match page.png {
                Ok(png) => self.engines.recognizer.recognize(&png).await,
                Err(e) => Err(e),
            };

            let value = match recognized {
                Ok(raw) => {
                    let cleaned = text::normalize(&raw);
                    if cleaned.is_empty() {
                        NO_TEXT.to_string()
                    } else {
                        cleaned
                    }
                }
                Err(e) => {
                    warn!(page = number, error = %e, "Page extraction failed");
                    format!("Error: {}", e)
                }
            };
            extracted.insert(number, value);
        }

        self.staging.release(pdf);
        Ok(extracted)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::Ordering;

    use tempfile::TempDir;

    use super::*;
    use crate::error::TransformError;
    use crate::service::testing::*;

    fn pdf() -> Upload {
        upload("scan.pdf", "application/pdf", b"%PDF-1.4")
    }

    #[tokio::test]
    async fn test_document_ocr_concatenates_pages_in_order() {
        let scratch = TempDir::new().unwrap();
        let stub = Arc::new(StubEngine::with_pages(2));
        let service = service_with(&stub, scratch.path());

        let text = service.ocr_document(pdf()).await.unwrap();

        assert_eq!(
            text,
            "\n\nPage 1:\nText of\n\tpage   1\n\x0c\n\nPage 2:\nText of\n\tpage   2\n\x0c"
        );
        assert_eq!(scratch_entries(scratch.path()), 0);
    }

    #[tokio::test]
    async fn test_document_ocr_fails_on_any_page() {
        let scratch = TempDir::new().unwrap();
        let stub = Arc::new(StubEngine {
            page_count: 3,
            unreadable: vec![1],
            ..Default::default()
        });
        let service = service_with(&stub, scratch.path());

        let err = service.ocr_document(pdf()).await.unwrap_err();

        assert!(matches!(err, TransformError::EngineInvocation { .. }));
        // Recognition stops at the failing page
        assert_eq!(stub.calls.recognize.load(Ordering::SeqCst), 2);
        assert_eq!(scratch_entries(scratch.path()), 0);
    }

    #[tokio::test]
    async fn test_extraction_normalizes_and_keys_by_page_number() {
        let scratch = TempDir::new().unwrap();
        let stub = Arc::new(StubEngine::with_pages(5));
        let service = service_with(&stub, scratch.path());

        let selection = PageSelection::parse("[3, 1]").unwrap();
        let pages = service.extract_pages(pdf(), selection).await.unwrap();

        assert_eq!(pages.len(), 2);
        assert_eq!(pages[&1], "Text of page 1");
        assert_eq!(pages[&3], "Text of page 3");
        assert_eq!(scratch_entries(scratch.path()), 0);
    }

    #[tokio::test]
    async fn test_extraction_isolates_page_failures() {
        let scratch = TempDir::new().unwrap();
        let stub = Arc::new(StubEngine {
            page_count: 4,
            unrenderable: vec![1],
            unreadable: vec![2],
            blank: vec![3],
            ..Default::default()
        });
        let service = service_with(&stub, scratch.path());

        let pages = service
            .extract_pages(pdf(), PageSelection::All)
            .await
            .unwrap();

        assert_eq!(pages[&1], "Text of page 1");
        assert_eq!(pages[&2], "Error: PDF rendering failed: corrupt page");
        assert_eq!(pages[&3], "Error: OCR failed: exit status: 1");
        assert_eq!(pages[&4], NO_TEXT);
        assert_eq!(scratch_entries(scratch.path()), 0);
    }

    #[tokio::test]
    async fn test_out_of_range_page_rejected_before_rendering() {
        let scratch = TempDir::new().unwrap();
        let stub = Arc::new(StubEngine::with_pages(5));
        let service = service_with(&stub, scratch.path());

        let selection = PageSelection::parse("[6]").unwrap();
        let err = service.extract_pages(pdf(), selection).await.unwrap_err();

        assert!(matches!(err, TransformError::Validation { .. }));
        assert_eq!(stub.calls.rasterize.load(Ordering::SeqCst), 0);
        assert_eq!(stub.calls.recognize.load(Ordering::SeqCst), 0);
        assert_eq!(scratch_entries(scratch.path()), 0);
    }
}
