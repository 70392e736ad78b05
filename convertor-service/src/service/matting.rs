//! Image background removal.

use std::sync::Arc;

use tracing::Instrument;

use super::job::{Phase, TransformJob, TransformKind};
use super::{Artifact, ConvertorService, Upload};
use crate::engines::BackgroundRemover;
use crate::error::{TransformError, TransformResult};
use crate::imaging;

/// Download name of every cutout
pub const CUTOUT_NAME: &str = "image_without_bg.png";

impl ConvertorService {
    /// Remove the background from an uploaded image, returning an enhanced PNG
    pub async fn remove_background(&self, upload: Upload) -> TransformResult<Artifact> {
        let job = TransformJob::start(TransformKind::ImageBackgroundRemoval);
        let result = self
            .run_remove_background(&job, upload)
            .instrument(job.span())
            .await;
        job.finish(&result);
        result
    }

    async fn run_remove_background(
        &self,
        job: &TransformJob,
        upload: Upload,
    ) -> TransformResult<Artifact> {
        // Decoded straight from the request body; nothing touches scratch space
        job.advance(Phase::Staged);

        let remover = Arc::clone(&self.engines.matting);
        let max_dimension = self.config.matting.max_dimension;
        let data = upload.data;

        job.advance(Phase::EngineInvoked);
        let png = tokio::task::spawn_blocking(move || {
            cut_out(remover.as_ref(), &data, max_dimension)
        })
        .await??;

        Ok(Artifact {
            bytes: png,
            content_type: mime::IMAGE_PNG,
            file_name: CUTOUT_NAME.to_string(),
        })
    }
}

/// Decode, downscale, matte, enhance and encode one image
fn cut_out(remover: &dyn BackgroundRemover, data: &[u8], max_dimension: u32) -> TransformResult<Vec<u8>> {
    let image = image::load_from_memory(data)
        .map_err(|_| TransformError::validation("Uploaded file is not a supported image"))?;

    let image = imaging::resize_to_fit(image, max_dimension).to_rgba8();
    let mask = remover.foreground_mask(&image)?;
    let cutout = imaging::apply_mask(&image, &mask);
    imaging::encode_png(&imaging::enhance(&cutout))
}
