//! Mask smoothing, colour blending and hard alpha derivation
//!
//! These are the final steps every alpha-producing strategy shares: a soft
//! mask blends the source against a fill colour, then the alpha channel is
//! re-derived from the blended result (any non-zero luma is opaque).

#![allow(clippy::indexing_slicing)]

use crate::error::{RemoveBgError, Result};
use image::{GrayImage, ImageBuffer, Luma, RgbImage, RgbaImage};
use imageproc::filter::separable_filter_equal;
use ndarray::{Array2, Array3, Zip};

/// Binomial kernels used for small kernel sizes when no sigma is given
const SMALL_GAUSSIAN_KERNELS: [&[f32]; 4] = [
    &[1.0],
    &[0.25, 0.5, 0.25],
    &[0.0625, 0.25, 0.375, 0.25, 0.0625],
    &[0.031_25, 0.109_375, 0.218_75, 0.281_25, 0.218_75, 0.109_375, 0.031_25],
];

/// 1-D Gaussian kernel of odd size `ksize` with automatic sigma
///
/// Sizes up to 7 use fixed binomial weights, larger sizes use
/// `sigma = 0.3 * ((ksize - 1) * 0.5 - 1) + 0.8`.
///
/// # Errors
/// - `ksize` is even or zero
pub fn gaussian_kernel(ksize: u32) -> Result<Vec<f32>> {
    if ksize == 0 || ksize % 2 == 0 {
        return Err(RemoveBgError::config_value_error("blur_size", ksize, "odd values >= 1"));
    }
    if ksize <= 7 {
        return Ok(SMALL_GAUSSIAN_KERNELS[(ksize / 2) as usize].to_vec());
    }

    let sigma = 0.3 * ((ksize as f64 - 1.0) * 0.5 - 1.0) + 0.8;
    let scale = -0.5 / (sigma * sigma);
    let center = (ksize / 2) as f64;
    let raw: Vec<f64> = (0..ksize)
        .map(|i| {
            let x = i as f64 - center;
            (scale * x * x).exp()
        })
        .collect();
    let sum: f64 = raw.iter().sum();
    Ok(raw.into_iter().map(|v| (v / sum) as f32).collect())
}

/// Smooth a 0/255 mask into blend weights in 0-1
///
/// Borders are padded by replicating the edge pixel.
///
/// # Errors
/// - `ksize` is even or zero
pub fn smooth_mask(mask: &GrayImage, ksize: u32) -> Result<Array2<f32>> {
    let kernel = gaussian_kernel(ksize)?;
    let (width, height) = mask.dimensions();
    let weights: ImageBuffer<Luma<f32>, Vec<f32>> =
        ImageBuffer::from_fn(width, height, |x, y| Luma([f32::from(mask.get_pixel(x, y)[0]) / 255.0]));

    let smoothed = separable_filter_equal(&weights, &kernel);
    Ok(Array2::from_shape_fn((height as usize, width as usize), |(y, x)| {
        smoothed.get_pixel(x as u32, y as u32)[0].clamp(0.0, 1.0)
    }))
}

/// Blend `image` over a solid colour: `out = w * image + (1 - w) * color`
///
/// `color` is RGB normalized to 0-1. The 8-bit result is truncated, not rounded.
///
/// # Errors
/// - `weights` shape differs from the image
pub fn blend_with_color(image: &RgbImage, weights: &Array2<f32>, color: [f32; 3]) -> Result<RgbImage> {
    let (width, height) = image.dimensions();
    let shape = (height as usize, width as usize);
    if weights.dim() != shape {
        return Err(RemoveBgError::processing_stage_error(
            "blending",
            &format!("mask shape {:?} does not match image shape {:?}", weights.dim(), shape),
            None,
        ));
    }

    let pixels = Array3::from_shape_vec((shape.0, shape.1, 3), image.as_raw().clone())
        .map_err(|e| RemoveBgError::processing(format!("Failed to view image as array: {}", e)))?
        .mapv(|v| f32::from(v) / 255.0);

    let mut blended = Array3::<u8>::zeros((shape.0, shape.1, 3));
    Zip::indexed(&mut blended).and(&pixels).for_each(|(y, x, c), out, &value| {
        let w = weights[[y, x]];
        let mixed = w * value + (1.0 - w) * color[c];
        *out = (mixed * 255.0).clamp(0.0, 255.0) as u8;
    });

    let (raw, _offset) = blended.into_raw_vec_and_offset();
    RgbImage::from_raw(width, height, raw)
        .ok_or_else(|| RemoveBgError::processing("Blended buffer has unexpected length"))
}

/// Hard alpha: grayscale of `image` thresholded at 0 (non-zero luma is opaque)
#[must_use]
pub fn derive_alpha(image: &RgbImage) -> GrayImage {
    let gray = image::imageops::grayscale(image);
    GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        if gray.get_pixel(x, y)[0] > 0 {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}

/// Merge three colour channels with an alpha channel
///
/// # Errors
/// - Colour and alpha dimensions differ
pub fn merge_rgba(image: &RgbImage, alpha: &GrayImage) -> Result<RgbaImage> {
    if image.dimensions() != alpha.dimensions() {
        return Err(RemoveBgError::processing_stage_error(
            "channel merge",
            "alpha channel dimensions differ from colour image",
            Some(&format!("{:?} vs {:?}", image.dimensions(), alpha.dimensions())),
        ));
    }
    Ok(RgbaImage::from_fn(image.width(), image.height(), |x, y| {
        let [r, g, b] = image.get_pixel(x, y).0;
        image::Rgba([r, g, b, alpha.get_pixel(x, y)[0]])
    }))
}

/// Derive a hard alpha from `image` and attach it
///
/// # Errors
/// - See [`merge_rgba`]
pub fn with_hard_alpha(image: &RgbImage) -> Result<RgbaImage> {
    merge_rgba(image, &derive_alpha(image))
}
