//! External transformation engines.
//!
//! Each capability sits behind a trait so the orchestrator can be exercised
//! with stubs. The production implementations are:
//! - [`office::SofficeConverter`]: LibreOffice headless conversion
//! - [`html::ChromiumRenderer`]: headless Chromium print-to-PDF
//! - [`pdf::PdfiumRasterizer`]: PDFium page rendering
//! - [`ocr::TesseractRecognizer`]: Tesseract CLI
//! - [`matting::load_background_remover`]: U2-Net through ONNX Runtime

pub mod html;
pub mod matting;
pub mod ocr;
pub mod office;
pub mod pdf;
pub mod process;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use image::{GrayImage, RgbaImage};

use crate::config::ServiceConfig;
use crate::error::TransformResult;
use crate::staging::{StagedFile, StagingStore};

pub use process::ProcessRunner;

/// Converts word-processor, spreadsheet and presentation files to PDF
#[async_trait]
pub trait OfficeConverter: Send + Sync {
    /// Convert `input`, returning the handle of the PDF written beside it
    async fn convert(&self, input: &StagedFile) -> TransformResult<StagedFile>;
}

/// Renders inline HTML markup to a PDF file
#[async_trait]
pub trait HtmlRenderer: Send + Sync {
    async fn render(&self, html: &str, output: &StagedFile) -> TransformResult<()>;
}

/// A rendered page, or the reason it could not be rendered
#[derive(Debug)]
pub struct PageImage {
    /// Zero-based page index
    pub index: usize,
    /// PNG-encoded page bitmap
    pub png: TransformResult<Vec<u8>>,
}

/// Renders PDF pages to bitmaps. Blocking; call from the blocking pool.
pub trait PdfRasterizer: Send + Sync {
    fn page_count(&self, pdf: &Path) -> TransformResult<usize>;

    /// Render `pages` (zero-based, in the given order) at `dpi`.
    ///
    /// Fails as a whole only when the document cannot be opened; individual
    /// page failures are reported per [`PageImage`].
    fn rasterize(&self, pdf: &Path, pages: &[usize], dpi: f32) -> TransformResult<Vec<PageImage>>;
}

/// Optical character recognition over a single page image
#[async_trait]
pub trait TextRecognizer: Send + Sync {
    async fn recognize(&self, png: &[u8]) -> TransformResult<String>;
}

/// Foreground matting. Blocking; call from the blocking pool.
pub trait BackgroundRemover: Send + Sync {
    /// Foreground alpha mask for `image`, any size (resized by the caller)
    fn foreground_mask(&self, image: &RgbaImage) -> TransformResult<GrayImage>;
}

/// The full set of engines one service instance uses
#[derive(Clone)]
pub struct Engines {
    pub office: Arc<dyn OfficeConverter>,
    pub html: Arc<dyn HtmlRenderer>,
    pub rasterizer: Arc<dyn PdfRasterizer>,
    pub recognizer: Arc<dyn TextRecognizer>,
    pub matting: Arc<dyn BackgroundRemover>,
}

impl Engines {
    /// Build the production engines. Loads the matting model once.
    pub fn from_config(config: &ServiceConfig, staging: &StagingStore) -> Self {
        let runner = ProcessRunner::new(config.engines.max_concurrent, config.engines.timeout());

        Self {
            office: Arc::new(office::SofficeConverter::new(
                config.office.resolve_binary(),
                staging.clone(),
                runner.clone(),
            )),
            html: Arc::new(html::ChromiumRenderer::new(
                config.html.chrome_path.clone(),
                staging.clone(),
                runner.clone(),
            )),
            rasterizer: Arc::new(pdf::PdfiumRasterizer::new(
                config.ocr.pdfium_library_dir.clone(),
            )),
            recognizer: Arc::new(ocr::TesseractRecognizer::new(
                config.ocr.tesseract_binary.clone(),
                config.ocr.language.clone(),
                staging.clone(),
                runner,
            )),
            matting: matting::load_background_remover(&config.matting),
        }
    }
}
