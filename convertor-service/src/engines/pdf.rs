//! PDF page rendering with PDFium.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::{DynamicImage, ImageFormat};
use pdfium_render::prelude::*;
use tracing::{debug, warn};

use super::{PageImage, PdfRasterizer};
use crate::error::{TransformError, TransformResult};

const ENGINE: &str = "PDF rendering";

/// PDF points per inch
const POINTS_PER_INCH: f32 = 72.0;

/// Renders pages with a dynamically loaded libpdfium
pub struct PdfiumRasterizer {
    library_dir: Option<PathBuf>,
}

impl PdfiumRasterizer {
    pub fn new(library_dir: Option<PathBuf>) -> Self {
        Self { library_dir }
    }

    /// Bind libpdfium.
    ///
    /// Searches, in order:
    /// 1. The configured library directory
    /// 2. Current directory (./libpdfium.so)
    /// 3. vendor/pdfium/lib/
    /// 4. System library paths
    fn create_pdfium(&self) -> TransformResult<Pdfium> {
        let mut dirs: Vec<PathBuf> = self.library_dir.iter().cloned().collect();
        dirs.push(PathBuf::from("./"));
        dirs.push(PathBuf::from("./vendor/pdfium/lib/"));

        for dir in &dirs {
            if let Ok(bindings) =
                Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir))
            {
                return Ok(Pdfium::new(bindings));
            }
        }

        let bindings = Pdfium::bind_to_system_library().map_err(|e| {
            TransformError::engine(ENGINE, format!("PDFium library not available: {:?}", e))
        })?;
        Ok(Pdfium::new(bindings))
    }
}

fn load_document<'a>(pdfium: &'a Pdfium, pdf: &Path) -> TransformResult<PdfDocument<'a>> {
    pdfium
        .load_pdf_from_file(pdf, None)
        .map_err(|e| TransformError::engine(ENGINE, format!("Failed to open PDF: {:?}", e)))
}

/// Pixel size of a page rendered at `dpi`
fn target_size(width_pts: f32, height_pts: f32, dpi: f32) -> (i32, i32) {
    let scale = dpi / POINTS_PER_INCH;
    (
        ((width_pts * scale).ceil() as i32).max(1),
        ((height_pts * scale).ceil() as i32).max(1),
    )
}

fn render_page(document: &PdfDocument, index: usize, dpi: f32) -> TransformResult<Vec<u8>> {
    let page_index = u16::try_from(index)
        .map_err(|_| TransformError::engine(ENGINE, format!("page index {} too large", index)))?;
    let page = document.pages().get(page_index).map_err(|e| {
        TransformError::engine(ENGINE, format!("Failed to get page {}: {:?}", index + 1, e))
    })?;

    let (width, height) = target_size(page.width().value, page.height().value, dpi);
    let config = PdfRenderConfig::new()
        .set_target_width(width)
        .set_target_height(height);

    let bitmap = page.render_with_config(&config).map_err(|e| {
        TransformError::engine(ENGINE, format!("Failed to render page {}: {:?}", index + 1, e))
    })?;

    let image: DynamicImage = bitmap.as_image();
    let mut png = Vec::new();
    DynamicImage::ImageRgb8(image.to_rgb8())
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .map_err(|e| {
            TransformError::engine(ENGINE, format!("Failed to encode page {}: {}", index + 1, e))
        })?;

    debug!(page = index + 1, width, height, size = png.len(), "Rendered page");
    Ok(png)
}

impl PdfRasterizer for PdfiumRasterizer {
    fn page_count(&self, pdf: &Path) -> TransformResult<usize> {
        let pdfium = self.create_pdfium()?;
        let document = load_document(&pdfium, pdf)?;
        Ok(document.pages().len() as usize)
    }

    fn rasterize(&self, pdf: &Path, pages: &[usize], dpi: f32) -> TransformResult<Vec<PageImage>> {
        let pdfium = self.create_pdfium()?;
        let document = load_document(&pdfium, pdf)?;

        Ok(pages
            .iter()
            .map(|&index| {
                let png = render_page(&document, index, dpi);
                if let Err(e) = &png {
                    warn!(page = index + 1, error = %e, "Page render failed");
                }
                PageImage { index, png }
            })
            .collect())
    }
}
