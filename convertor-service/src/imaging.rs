//! Image preparation and enhancement around background removal.
//!
//! Enhancement factors follow PIL's `ImageEnhance` semantics: each step blends
//! the image with a degenerate version of itself (mean grey for contrast,
//! black for brightness, greyscale for saturation). Alpha is never touched.

use std::io::Cursor;

use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, ImageFormat, Rgba, RgbaImage};
use imageproc::filter::gaussian_blur_f32;

use crate::error::{TransformError, TransformResult};

const SHARPEN_SIGMA: f32 = 1.0;
const SHARPEN_AMOUNT: f32 = 1.25;
const SHARPEN_THRESHOLD: i16 = 3;
const CONTRAST_FACTOR: f32 = 1.2;
const BRIGHTNESS_FACTOR: f32 = 1.05;
const SATURATION_FACTOR: f32 = 1.1;

/// Downsample so the longer edge is at most `max_dimension`, keeping aspect ratio
pub fn resize_to_fit(image: DynamicImage, max_dimension: u32) -> DynamicImage {
    let (width, height) = (image.width(), image.height());
    let longer = width.max(height);
    if longer <= max_dimension {
        return image;
    }

    let factor = max_dimension as f64 / longer as f64;
    let new_width = ((width as f64 * factor) as u32).max(1);
    let new_height = ((height as f64 * factor) as u32).max(1);
    image.resize_exact(new_width, new_height, FilterType::Lanczos3)
}

/// Composite `image` over transparent black through a foreground mask.
///
/// Every channel, alpha included, is scaled by `mask / 255`, so background
/// pixels become `(0, 0, 0, 0)` and soft edges fade toward black.
pub fn apply_mask(image: &RgbaImage, mask: &GrayImage) -> RgbaImage {
    let mask = if mask.dimensions() == image.dimensions() {
        mask.clone()
    } else {
        image::imageops::resize(mask, image.width(), image.height(), FilterType::Lanczos3)
    };

    let mut cutout = image.clone();
    for (pixel, m) in cutout.pixels_mut().zip(mask.pixels()) {
        for c in 0..4 {
            pixel[c] = ((pixel[c] as u16 * m[0] as u16 + 127) / 255) as u8;
        }
    }
    cutout
}

/// Run the fixed post-matting chain: sharpen, contrast, brightness, saturation
pub fn enhance(image: &RgbaImage) -> RgbaImage {
    let sharpened = unsharp_mask(image, SHARPEN_SIGMA, SHARPEN_AMOUNT, SHARPEN_THRESHOLD);
    let contrasted = adjust_contrast(&sharpened, CONTRAST_FACTOR);
    let brightened = adjust_brightness(&contrasted, BRIGHTNESS_FACTOR);
    adjust_saturation(&brightened, SATURATION_FACTOR)
}

/// Encode as PNG, keeping the alpha channel
pub fn encode_png(image: &RgbaImage) -> TransformResult<Vec<u8>> {
    let mut buffer = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
        .map_err(|e| TransformError::Unknown {
            message: format!("PNG encoding failed: {}", e),
        })?;
    Ok(buffer)
}

/// Sharpen colour channels where they differ from a blurred copy by more than `threshold`
pub fn unsharp_mask(image: &RgbaImage, sigma: f32, amount: f32, threshold: i16) -> RgbaImage {
    let blurred = gaussian_blur_f32(image, sigma);
    let mut output = image.clone();

    for (pixel, blur) in output.pixels_mut().zip(blurred.pixels()) {
        for c in 0..3 {
            let diff = pixel[c] as i16 - blur[c] as i16;
            if diff.abs() > threshold {
                pixel[c] = clamp_channel(pixel[c] as f32 + diff as f32 * amount);
            }
        }
    }
    output
}

/// Scale distance from the mean luminance by `factor`
pub fn adjust_contrast(image: &RgbaImage, factor: f32) -> RgbaImage {
    let mean = mean_luma(image);
    map_rgb(image, |pixel| {
        let mut out = pixel;
        for c in 0..3 {
            out[c] = clamp_channel(mean + factor * (pixel[c] as f32 - mean));
        }
        out
    })
}

/// Scale every colour channel by `factor`
pub fn adjust_brightness(image: &RgbaImage, factor: f32) -> RgbaImage {
    map_rgb(image, |pixel| {
        let mut out = pixel;
        for c in 0..3 {
            out[c] = clamp_channel(pixel[c] as f32 * factor);
        }
        out
    })
}

/// Scale distance from each pixel's own luminance by `factor`
pub fn adjust_saturation(image: &RgbaImage, factor: f32) -> RgbaImage {
    map_rgb(image, |pixel| {
        let grey = luma(pixel) as f32;
        let mut out = pixel;
        for c in 0..3 {
            out[c] = clamp_channel(grey + factor * (pixel[c] as f32 - grey));
        }
        out
    })
}

fn map_rgb(image: &RgbaImage, f: impl Fn(Rgba<u8>) -> Rgba<u8>) -> RgbaImage {
    let mut output = image.clone();
    for pixel in output.pixels_mut() {
        *pixel = f(*pixel);
    }
    output
}

/// ITU-R 601-2 luma in the same fixed-point form PIL uses
fn luma(pixel: Rgba<u8>) -> u8 {
    let [r, g, b, _] = pixel.0;
    ((r as u32 * 19595 + g as u32 * 38470 + b as u32 * 7471 + 0x8000) >> 16) as u8
}

fn mean_luma(image: &RgbaImage) -> f32 {
    let count = image.width() as usize * image.height() as usize;
    if count == 0 {
        return 0.0;
    }
    let total: u64 = image.pixels().map(|p| luma(*p) as u64).sum();
    // PIL rounds the mean to an integer grey level
    (total as f64 / count as f64).round() as f32
}

fn clamp_channel(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}
