//! Contour compositing: the largest edge contour becomes a soft foreground mask
//!
//! Pipeline: grayscale → Canny → close small gaps (3×3 dilate then erode) →
//! trace every border → keep the largest by area → fill it → grow and shrink
//! the filled mask → Gaussian smoothing. The smoothed weights are blended
//! against the configured fill colour by the compositor.

use super::{Segmentation, Segmenter};
use crate::{
    compositing,
    config::BlendParams,
    error::{RemoveBgError, Result},
    services::DebugSink,
    types::{ContourInfo, SegmentationMethod},
};
use image::{DynamicImage, GrayImage, Luma, RgbImage};
use imageproc::{
    contours::find_contours,
    distance_transform::Norm,
    drawing::{draw_line_segment_mut, draw_polygon_mut},
    edges::canny,
    morphology::{dilate, erode},
    point::Point,
};
use ndarray::Array2;
use tracing::{debug, instrument};

/// Contour-based strategy
#[derive(Debug, Clone)]
pub struct ContourSegmenter {
    params: BlendParams,
}

impl ContourSegmenter {
    #[must_use]
    pub fn new(params: BlendParams) -> Self {
        Self { params }
    }

    #[must_use]
    pub fn params(&self) -> &BlendParams {
        &self.params
    }
}

impl Segmenter for ContourSegmenter {
    fn method(&self) -> SegmentationMethod {
        SegmentationMethod::Contour
    }

    #[instrument(skip_all, fields(width = image.width(), height = image.height()))]
    fn segment(&mut self, image: &RgbImage, debug_sink: &dyn DebugSink) -> Result<Segmentation> {
        let weights = foreground_weights(image, &self.params, debug_sink)?;
        Ok(Segmentation::SoftMask(weights))
    }
}

/// Soft foreground weights (0-1) for `image`
///
/// # Errors
/// - [`RemoveBgError::NoForeground`] when the edge map has no contour
/// - Invalid blur size
pub fn foreground_weights(
    image: &RgbImage,
    params: &BlendParams,
    debug_sink: &dyn DebugSink,
) -> Result<Array2<f32>> {
    let gray = image::imageops::grayscale(image);
    let edges = detect_edges(&gray, params.canny_low, params.canny_high);
    debug_sink.dump("edges", &DynamicImage::ImageLuma8(edges.clone()));

    let contours = trace_contours(&edges);
    debug!(count = contours.len(), "Traced contours");

    let largest = select_largest(&contours).ok_or(RemoveBgError::NoForeground)?;
    debug!(
        area = largest.area,
        convex = largest.convex,
        points = largest.points.len(),
        "Selected largest contour"
    );

    let (width, height) = gray.dimensions();
    let filled = rasterize(largest, width, height);
    let mask = refine_mask(&filled, params.mask_dilate_iter, params.mask_erode_iter);
    debug_sink.dump("mask", &DynamicImage::ImageLuma8(mask.clone()));

    compositing::smooth_mask(&mask, params.blur_size)
}

/// Canny edges with small gaps closed by one 3×3 dilation and one 3×3 erosion
#[must_use]
pub fn detect_edges(gray: &GrayImage, low: f32, high: f32) -> GrayImage {
    let (low, high) = if low > high { (high, low) } else { (low, high) };
    let edges = canny(gray, low, high);
    erode(&dilate(&edges, Norm::LInf, 1), Norm::LInf, 1)
}

/// Every outer and hole border of the edge map, with area and convexity
#[must_use]
pub fn trace_contours(edges: &GrayImage) -> Vec<ContourInfo> {
    find_contours::<i32>(edges)
        .into_iter()
        .map(|contour| ContourInfo::from_points(contour.points))
        .collect()
}

/// Largest contour by area; the first one wins a tie
#[must_use]
pub fn select_largest(contours: &[ContourInfo]) -> Option<&ContourInfo> {
    contours.iter().fold(None, |best: Option<&ContourInfo>, candidate| match best {
        Some(current) if current.area >= candidate.area => Some(current),
        _ => Some(candidate),
    })
}

/// Fill `contour` with 255 on a zeroed `width`×`height` mask
#[must_use]
pub fn rasterize(contour: &ContourInfo, width: u32, height: u32) -> GrayImage {
    let mut mask = GrayImage::new(width, height);
    let white = Luma([255u8]);

    let mut points: Vec<Point<i32>> = contour.points.clone();
    // Polygon fill rejects an explicitly closed ring
    while points.len() > 1 && points.first() == points.last() {
        points.pop();
    }

    match points.as_slice() {
        [] => {},
        [p] => put_if_inside(&mut mask, *p, white),
        [a, b] => draw_line_segment_mut(
            &mut mask,
            (a.x as f32, a.y as f32),
            (b.x as f32, b.y as f32),
            white,
        ),
        _ => draw_polygon_mut(&mut mask, &points, white),
    }
    mask
}

fn put_if_inside(mask: &mut GrayImage, p: Point<i32>, value: Luma<u8>) {
    if p.x >= 0 && p.y >= 0 && (p.x as u32) < mask.width() && (p.y as u32) < mask.height() {
        mask.put_pixel(p.x as u32, p.y as u32, value);
    }
}

/// Dilate `dilate_iter` times then erode `erode_iter` times with a 3×3 square
#[must_use]
pub fn refine_mask(mask: &GrayImage, dilate_iter: u8, erode_iter: u8) -> GrayImage {
    // n passes of a 3×3 square equal one pass with an L∞ radius of n
    let grown = if dilate_iter > 0 {
        dilate(mask, Norm::LInf, dilate_iter)
    } else {
        mask.clone()
    };
    if erode_iter > 0 {
        erode(&grown, Norm::LInf, erode_iter)
    } else {
        grown
    }
}
