//! U2-Net salient-object matting.
//!
//! The model takes a 320x320 RGB tensor normalized with ImageNet statistics
//! and predicts a saliency map, which is min-max scaled into an 8-bit mask.
//! Inference runs through ONNX Runtime when the `onnx-matting` feature is on.

use std::sync::Arc;

use image::imageops::FilterType;
use image::{GrayImage, Luma, RgbaImage};
use tracing::warn;

use super::BackgroundRemover;
use crate::config::MattingConfig;
use crate::error::{TransformError, TransformResult};

const ENGINE: &str = "Background removal";

/// Square input edge the model was trained on
pub const MODEL_INPUT_SIZE: u32 = 320;

const MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Build the NCHW input tensor data for `image`
pub fn prepare_input(image: &RgbaImage) -> Vec<f32> {
    let side = MODEL_INPUT_SIZE;
    let resized = image::imageops::resize(image, side, side, FilterType::Lanczos3);

    let max_value = resized
        .pixels()
        .flat_map(|p| p.0[..3].iter().copied())
        .max()
        .unwrap_or(0) as f32;
    let scale = max_value.max(1e-6);

    let plane = (side * side) as usize;
    let mut data = vec![0.0f32; 3 * plane];
    for (i, pixel) in resized.pixels().enumerate() {
        for c in 0..3 {
            data[c * plane + i] = (pixel[c] as f32 / scale - MEAN[c]) / STD[c];
        }
    }
    data
}

/// Turn raw model output into an 8-bit mask of `width` x `height`
pub fn mask_from_prediction(prediction: &[f32], width: u32, height: u32) -> TransformResult<GrayImage> {
    let expected = width as usize * height as usize;
    if prediction.len() < expected {
        return Err(TransformError::engine(
            ENGINE,
            format!(
                "model produced {} values, expected {}",
                prediction.len(),
                expected
            ),
        ));
    }
    let prediction = &prediction[..expected];

    let (min, max) = prediction
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let range = max - min;

    let mut mask = GrayImage::new(width, height);
    for (pixel, &value) in mask.pixels_mut().zip(prediction) {
        let level = if range > 0.0 {
            ((value - min) / range * 255.0) as u8
        } else {
            0
        };
        *pixel = Luma([level]);
    }
    Ok(mask)
}

#[cfg(feature = "onnx-matting")]
mod onnx {
    use super::{BackgroundRemover, ENGINE, MODEL_INPUT_SIZE, mask_from_prediction, prepare_input};
    use crate::error::{StartupError, TransformError, TransformResult};
    use image::{GrayImage, RgbaImage};
    use ort::session::Session;
    use std::path::Path;
    use std::sync::Mutex;

    /// U2-Net session shared by all requests.
    ///
    /// `Session::run` needs `&mut self`, so inference is serialized.
    pub struct U2NetRemover {
        session: Mutex<Session>,
    }

    impl U2NetRemover {
        pub fn load(model_path: &Path, intra_threads: usize) -> Result<Self, StartupError> {
            if !model_path.exists() {
                return Err(StartupError::ModelInit {
                    message: format!("model file {} not found", model_path.display()),
                });
            }

            let session = Session::builder()
                .map_err(|e: ort::Error| StartupError::ModelInit {
                    message: e.to_string(),
                })?
                .with_intra_threads(intra_threads.max(1))
                .map_err(|e: ort::Error| StartupError::ModelInit {
                    message: e.to_string(),
                })?
                .commit_from_file(model_path)
                .map_err(|e: ort::Error| StartupError::ModelInit {
                    message: format!("ONNX load failed: {e}"),
                })?;

            tracing::info!(model = %model_path.display(), "Matting model loaded");

            Ok(Self {
                session: Mutex::new(session),
            })
        }
    }

    impl BackgroundRemover for U2NetRemover {
        fn foreground_mask(&self, image: &RgbaImage) -> TransformResult<GrayImage> {
            use ort::value::TensorRef;

            let side = MODEL_INPUT_SIZE as usize;
            let input = ndarray::Array4::from_shape_vec((1, 3, side, side), prepare_input(image))
                .map_err(|e| TransformError::engine(ENGINE, e.to_string()))?;
            let tensor = TensorRef::from_array_view(&input)
                .map_err(|e| TransformError::engine(ENGINE, e.to_string()))?;

            let mut session = self
                .session
                .lock()
                .map_err(|_| TransformError::engine(ENGINE, "session lock poisoned"))?;

            let outputs = session
                .run(ort::inputs![tensor])
                .map_err(|e| TransformError::engine(ENGINE, format!("inference failed: {e}")))?;

            // First output is the fused saliency map, [1, 1, 320, 320]
            let (shape, data) = outputs[0]
                .try_extract_tensor::<f32>()
                .map_err(|e| TransformError::engine(ENGINE, format!("output extraction: {e}")))?;

            if shape.len() != 4 || shape[2] as usize != side || shape[3] as usize != side {
                return Err(TransformError::engine(
                    ENGINE,
                    format!("unexpected output shape {shape:?}"),
                ));
            }

            mask_from_prediction(data, MODEL_INPUT_SIZE, MODEL_INPUT_SIZE)
        }
    }
}

#[cfg(feature = "onnx-matting")]
pub use onnx::U2NetRemover;

/// Stands in when the model could not be loaded; every request fails cleanly
pub struct UnavailableRemover {
    reason: String,
}

impl UnavailableRemover {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl BackgroundRemover for UnavailableRemover {
    fn foreground_mask(&self, _image: &RgbaImage) -> TransformResult<GrayImage> {
        Err(TransformError::engine(
            ENGINE,
            format!("model not available ({})", self.reason),
        ))
    }
}

/// Load the matting model once for the lifetime of the service.
///
/// A missing or broken model disables background removal without stopping
/// the other transforms.
pub fn load_background_remover(config: &MattingConfig) -> Arc<dyn BackgroundRemover> {
    #[cfg(feature = "onnx-matting")]
    {
        match U2NetRemover::load(&config.model_path, config.intra_threads) {
            Ok(remover) => Arc::new(remover),
            Err(e) => {
                warn!(error = %e, "Background removal disabled");
                Arc::new(UnavailableRemover::new("model failed to load"))
            }
        }
    }

    #[cfg(not(feature = "onnx-matting"))]
    {
        warn!(
            model = %config.model_path.display(),
            "Built without onnx-matting; background removal disabled"
        );
        Arc::new(UnavailableRemover::new("built without onnx-matting"))
    }
}
