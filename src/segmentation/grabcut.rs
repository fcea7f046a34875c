//! Interactive cut: iterative graph-cut segmentation seeded by a rectangle
//!
//! Two colour mixtures (background and foreground) are fitted from the current
//! labelling, every pixel becomes a graph node with terminal capacities from
//! the mixtures and neighbour capacities from colour contrast, and a minimum
//! cut relabels the undecided pixels. Definite labels never change.

#![allow(clippy::indexing_slicing)]

use super::{
    gmm::{Color, Gmm},
    graph::FlowGraph,
    Segmentation, Segmenter,
};
use crate::{
    error::{RemoveBgError, Result},
    services::DebugSink,
    types::SegmentationMethod,
};
use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage};
use ndarray::Array2;
use tracing::{debug, instrument};

/// Smoothness weight between equal neighbours
const GAMMA: f64 = 50.0;
/// Capacity tying definite pixels to their terminal
const LAMBDA: f64 = 9.0 * GAMMA;

/// Per-pixel state of the cut
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CutLabel {
    Background,
    Foreground,
    ProbableBackground,
    ProbableForeground,
}

impl CutLabel {
    #[must_use]
    pub fn is_foreground(self) -> bool {
        matches!(self, Self::Foreground | Self::ProbableForeground)
    }

    #[must_use]
    pub fn is_probable(self) -> bool {
        matches!(self, Self::ProbableBackground | Self::ProbableForeground)
    }
}

/// Axis-aligned hint rectangle; pixels outside it are definite background
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CutRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CutRect {
    /// The rectangle used for a whole image: offset by one pixel, full size
    #[must_use]
    pub fn inset(width: u32, height: u32) -> Self {
        Self { x: 1, y: 1, width, height }
    }
}

/// Label mask of `width`×`height` with `rect` (clipped) as probable foreground
#[must_use]
pub fn initial_mask(width: u32, height: u32, rect: CutRect) -> Array2<CutLabel> {
    let x_end = rect.x.saturating_add(rect.width).min(width);
    let y_end = rect.y.saturating_add(rect.height).min(height);
    Array2::from_shape_fn((height as usize, width as usize), |(y, x)| {
        let inside = (rect.x..x_end).contains(&(x as u32)) && (rect.y..y_end).contains(&(y as u32));
        if inside {
            CutLabel::ProbableForeground
        } else {
            CutLabel::Background
        }
    })
}

fn color_at(image: &RgbImage, x: usize, y: usize) -> Color {
    let Rgb([r, g, b]) = *image.get_pixel(x as u32, y as u32);
    [f64::from(r), f64::from(g), f64::from(b)]
}

fn color_distance_sq(a: Color, b: Color) -> f64 {
    (a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)
}

/// Neighbour offsets already visited in scan order: left, up-left, up, up-right
const NEIGHBOURS: [(isize, isize); 4] = [(-1, 0), (-1, -1), (0, -1), (1, -1)];

fn neighbour(x: usize, y: usize, (dx, dy): (isize, isize), width: usize) -> Option<(usize, usize)> {
    let nx = x.checked_add_signed(dx)?;
    let ny = y.checked_add_signed(dy)?;
    (nx < width).then_some((nx, ny))
}

/// Contrast scale: inverse of twice the mean squared neighbour difference
fn calc_beta(image: &RgbImage) -> f64 {
    let (width, height) = (image.width() as usize, image.height() as usize);
    let mut sum = 0.0;
    let mut count = 0usize;
    for y in 0..height {
        for x in 0..width {
            let color = color_at(image, x, y);
            for offset in NEIGHBOURS {
                if let Some((nx, ny)) = neighbour(x, y, offset, width) {
                    sum += color_distance_sq(color, color_at(image, nx, ny));
                    count += 1;
                }
            }
        }
    }
    if sum <= f64::EPSILON || count == 0 {
        0.0
    } else {
        1.0 / (2.0 * sum / count as f64)
    }
}

/// Neighbour capacities, one array per entry of [`NEIGHBOURS`]
fn calc_n_weights(image: &RgbImage, beta: f64) -> [Array2<f64>; 4] {
    let (width, height) = (image.width() as usize, image.height() as usize);
    let diagonal = GAMMA / std::f64::consts::SQRT_2;
    let scales = [GAMMA, diagonal, GAMMA, diagonal];

    std::array::from_fn(|k| {
        Array2::from_shape_fn((height, width), |(y, x)| {
            neighbour(x, y, NEIGHBOURS[k], width).map_or(0.0, |(nx, ny)| {
                let d = color_distance_sq(color_at(image, x, y), color_at(image, nx, ny));
                scales[k] * (-beta * d).exp()
            })
        })
    })
}

fn split_samples(image: &RgbImage, mask: &Array2<CutLabel>) -> (Vec<Color>, Vec<Color>) {
    let mut background = Vec::new();
    let mut foreground = Vec::new();
    for ((y, x), label) in mask.indexed_iter() {
        let color = color_at(image, x, y);
        if label.is_foreground() {
            foreground.push(color);
        } else {
            background.push(color);
        }
    }
    (background, foreground)
}

fn check_samples(background: &[Color], foreground: &[Color]) -> Result<()> {
    if background.is_empty() {
        return Err(RemoveBgError::segmentation("interactive cut has no background samples"));
    }
    if foreground.is_empty() {
        return Err(RemoveBgError::segmentation("interactive cut has no foreground samples"));
    }
    Ok(())
}

/// Re-fit both mixtures using each pixel's most likely component
fn relearn(
    image: &RgbImage,
    mask: &Array2<CutLabel>,
    background: &Gmm,
    foreground: &Gmm,
) -> Result<(Gmm, Gmm)> {
    let (bg_samples, fg_samples) = split_samples(image, mask);
    check_samples(&bg_samples, &fg_samples)?;
    let bg_labels: Vec<usize> = bg_samples.iter().map(|c| background.which_component(*c)).collect();
    let fg_labels: Vec<usize> = fg_samples.iter().map(|c| foreground.which_component(*c)).collect();
    Ok((Gmm::learn(&bg_samples, &bg_labels)?, Gmm::learn(&fg_samples, &fg_labels)?))
}

fn data_cost(model: &Gmm, color: Color) -> f64 {
    -model.probability(color).max(f64::MIN_POSITIVE).ln()
}

fn build_graph(
    image: &RgbImage,
    mask: &Array2<CutLabel>,
    background: &Gmm,
    foreground: &Gmm,
    n_weights: &[Array2<f64>; 4],
) -> FlowGraph {
    let (height, width) = mask.dim();
    let mut graph = FlowGraph::with_capacity(width * height, 4 * width * height);
    graph.add_nodes(width * height);

    for ((y, x), &label) in mask.indexed_iter() {
        let node = y * width + x;
        let (from_source, to_sink) = match label {
            CutLabel::Background => (0.0, LAMBDA),
            CutLabel::Foreground => (LAMBDA, 0.0),
            CutLabel::ProbableBackground | CutLabel::ProbableForeground => {
                let color = color_at(image, x, y);
                (data_cost(background, color), data_cost(foreground, color))
            },
        };
        graph.add_term_weights(node, from_source, to_sink);

        for (k, offset) in NEIGHBOURS.iter().enumerate() {
            if let Some((nx, ny)) = neighbour(x, y, *offset, width) {
                let w = n_weights[k][[y, x]];
                graph.add_edge(node, ny * width + nx, w, w);
            }
        }
    }
    graph
}

/// Refine `mask` in place with `iterations` rounds of model fitting and min-cut
///
/// Only probable labels are rewritten.
///
/// # Errors
/// - Either the background or the foreground label set is empty
/// - `mask` shape differs from the image
#[instrument(skip(image, mask))]
pub fn grabcut(image: &RgbImage, mask: &mut Array2<CutLabel>, iterations: u32) -> Result<()> {
    let shape = (image.height() as usize, image.width() as usize);
    if mask.dim() != shape {
        return Err(RemoveBgError::segmentation(format!(
            "label mask shape {:?} does not match image shape {:?}",
            mask.dim(),
            shape
        )));
    }

    let (bg_samples, fg_samples) = split_samples(image, mask);
    check_samples(&bg_samples, &fg_samples)?;
    let mut background = Gmm::fit(&bg_samples)?;
    let mut foreground = Gmm::fit(&fg_samples)?;

    let beta = calc_beta(image);
    let n_weights = calc_n_weights(image, beta);
    debug!(beta, "Computed neighbour weights");

    for iteration in 0..iterations {
        (background, foreground) = relearn(image, mask, &background, &foreground)?;
        let mut graph = build_graph(image, mask, &background, &foreground, &n_weights);
        let flow = graph.max_flow();

        let width = shape.1;
        let mut changed = 0usize;
        for ((y, x), label) in mask.indexed_iter_mut() {
            if !label.is_probable() {
                continue;
            }
            let next = if graph.in_source_segment(y * width + x) {
                CutLabel::ProbableForeground
            } else {
                CutLabel::ProbableBackground
            };
            if next != *label {
                changed += 1;
                *label = next;
            }
        }
        debug!(iteration, flow, changed, "Graph cut iteration");
    }
    Ok(())
}

/// 255 where the label is (probable) foreground
#[must_use]
pub fn mask_image(mask: &Array2<CutLabel>) -> GrayImage {
    let (height, width) = mask.dim();
    GrayImage::from_fn(width as u32, height as u32, |x, y| {
        if mask[[y as usize, x as usize]].is_foreground() {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}

/// `image` with every pixel outside `binary` set to black
#[must_use]
pub fn keep_foreground(image: &RgbImage, binary: &GrayImage) -> RgbImage {
    RgbImage::from_fn(image.width(), image.height(), |x, y| {
        if binary.get_pixel(x, y)[0] > 0 {
            *image.get_pixel(x, y)
        } else {
            Rgb([0, 0, 0])
        }
    })
}

/// Interactive-cut strategy over the whole image
#[derive(Debug, Clone)]
pub struct GrabCutSegmenter {
    iterations: u32,
}

impl GrabCutSegmenter {
    #[must_use]
    pub fn new(iterations: u32) -> Self {
        Self { iterations }
    }
}

impl Segmenter for GrabCutSegmenter {
    fn method(&self) -> SegmentationMethod {
        SegmentationMethod::InteractiveCut
    }

    #[instrument(skip_all, fields(width = image.width(), height = image.height()))]
    fn segment(&mut self, image: &RgbImage, debug_sink: &dyn DebugSink) -> Result<Segmentation> {
        let (width, height) = image.dimensions();
        let mut mask = initial_mask(width, height, CutRect::inset(width, height));
        grabcut(image, &mut mask, self.iterations)?;

        let binary = mask_image(&mask);
        debug_sink.dump("grabcut_mask", &DynamicImage::ImageLuma8(binary.clone()));

        Ok(Segmentation::Masked(keep_foreground(image, &binary)))
    }
}
