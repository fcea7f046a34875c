//! Marker flooding: seeds from a distance transform, grown by watershed
//!
//! Markers are signed labels per pixel: `0` is unknown, `1` is the
//! background seed, `2..` are foreground seeds, and [`BOUNDARY`] marks
//! pixels where two different floods meet (and the image border).

#![allow(clippy::indexing_slicing)]

use super::{Segmentation, Segmenter};
use crate::{
    config::WatershedParams,
    error::Result,
    services::DebugSink,
    types::SegmentationMethod,
};
use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage};
use imageproc::{
    contrast::otsu_level,
    distance_transform::{euclidean_squared_distance_transform, Norm},
    morphology::{dilate, open},
    region_labelling::{connected_components, Connectivity},
};
use ndarray::Array2;
use std::{cmp::Reverse, collections::BinaryHeap};
use tracing::{debug, instrument};

/// Marker of pixels separating two floods
pub const BOUNDARY: i32 = -1;
/// Marker of the background seed region
pub const BACKGROUND_MARKER: i32 = 1;
const IN_QUEUE: i32 = -2;

/// Otsu threshold with inverted output: dark pixels become 255
#[must_use]
pub fn otsu_inverse_binary(gray: &GrayImage) -> GrayImage {
    let level = otsu_level(gray);
    GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        if gray.get_pixel(x, y)[0] > level {
            Luma([0])
        } else {
            Luma([255])
        }
    })
}

/// Euclidean distance from every non-zero pixel of `binary` to the nearest zero pixel
///
/// When `binary` has no zero pixel the image diagonal is used.
#[must_use]
pub fn distance_to_background(binary: &GrayImage) -> Array2<f64> {
    let (width, height) = binary.dimensions();
    let diagonal = f64::from(width).hypot(f64::from(height));
    let shape = (height as usize, width as usize);
    if binary.pixels().all(|p| p[0] > 0) {
        return Array2::from_elem(shape, diagonal);
    }

    let inverted = GrayImage::from_fn(width, height, |x, y| {
        Luma([if binary.get_pixel(x, y)[0] > 0 { 0 } else { 255 }])
    });
    let squared = euclidean_squared_distance_transform(&inverted);

    Array2::from_shape_fn(shape, |(y, x)| {
        let d = squared.get_pixel(x as u32, y as u32)[0].sqrt();
        if d.is_finite() {
            d
        } else {
            diagonal
        }
    })
}

/// Seed markers for `image`: background 1, each sure-foreground blob 2.., unknown 0
#[instrument(skip_all)]
pub fn compute_markers(
    image: &RgbImage,
    params: &WatershedParams,
    debug_sink: &dyn DebugSink,
) -> Array2<i32> {
    let (width, height) = image.dimensions();
    let gray = image::imageops::grayscale(image);

    let thresh = otsu_inverse_binary(&gray);
    let opening = if params.opening_iterations > 0 {
        open(&thresh, Norm::LInf, params.opening_iterations)
    } else {
        thresh.clone()
    };
    let sure_bg = if params.sure_bg_iterations > 0 {
        dilate(&opening, Norm::LInf, params.sure_bg_iterations)
    } else {
        opening.clone()
    };

    let distance = distance_to_background(&opening);
    let max_distance = distance.iter().copied().fold(0.0, f64::max);
    let cutoff = f64::from(params.foreground_distance_ratio) * max_distance;
    let sure_fg = GrayImage::from_fn(width, height, |x, y| {
        Luma([if distance[[y as usize, x as usize]] > cutoff { 255 } else { 0 }])
    });

    let unknown = GrayImage::from_fn(width, height, |x, y| {
        Luma([sure_bg.get_pixel(x, y)[0].saturating_sub(sure_fg.get_pixel(x, y)[0])])
    });

    debug_sink.dump("threshold", &DynamicImage::ImageLuma8(thresh));
    debug_sink.dump("sure_background", &DynamicImage::ImageLuma8(sure_bg));
    debug_sink.dump("sure_foreground", &DynamicImage::ImageLuma8(sure_fg.clone()));
    debug_sink.dump("unknown", &DynamicImage::ImageLuma8(unknown.clone()));

    let labels = connected_components(&sure_fg, Connectivity::Eight, Luma([0u8]));
    let markers = Array2::from_shape_fn((height as usize, width as usize), |(y, x)| {
        if unknown.get_pixel(x as u32, y as u32)[0] == 255 {
            0
        } else {
            labels.get_pixel(x as u32, y as u32)[0] as i32 + 1
        }
    });
    debug!(
        seeds = markers.iter().copied().max().unwrap_or(0) - 1,
        max_distance,
        "Computed watershed markers"
    );
    markers
}

fn color_diff(a: &Rgb<u8>, b: &Rgb<u8>) -> u8 {
    a.0.iter()
        .zip(b.0.iter())
        .map(|(p, q)| p.abs_diff(*q))
        .max()
        .unwrap_or(0)
}

/// Flood `markers` over `image` in place
///
/// Pixels are processed in order of colour difference to the neighbour that
/// queued them (ties in arrival order), over the 4-neighbourhood. The image
/// border becomes [`BOUNDARY`]. Negative markers inside the border are
/// treated as unknown.
pub fn watershed(image: &RgbImage, markers: &mut Array2<i32>) {
    let (height, width) = markers.dim();
    if height == 0 || width == 0 {
        return;
    }
    let color = |y: usize, x: usize| image.get_pixel(x as u32, y as u32);

    for ((y, x), m) in markers.indexed_iter_mut() {
        if y == 0 || x == 0 || y == height - 1 || x == width - 1 {
            *m = BOUNDARY;
        } else if *m < 0 {
            *m = 0;
        }
    }

    let mut queue: BinaryHeap<Reverse<(u8, u64, usize)>> = BinaryHeap::new();
    let mut arrival = 0u64;
    let mut push = |queue: &mut BinaryHeap<Reverse<(u8, u64, usize)>>, priority: u8, index: usize| {
        queue.push(Reverse((priority, arrival, index)));
        arrival += 1;
    };
    let neighbours = |index: usize| {
        let (y, x) = (index / width, index % width);
        [(y, x - 1), (y, x + 1), (y - 1, x), (y + 1, x)]
    };

    for y in 1..height.saturating_sub(1) {
        for x in 1..width.saturating_sub(1) {
            if markers[[y, x]] != 0 {
                continue;
            }
            let here = color(y, x);
            let priority = neighbours(y * width + x)
                .into_iter()
                .filter(|&(ny, nx)| markers[[ny, nx]] > 0)
                .map(|(ny, nx)| color_diff(here, color(ny, nx)))
                .min();
            if let Some(priority) = priority {
                push(&mut queue, priority, y * width + x);
                markers[[y, x]] = IN_QUEUE;
            }
        }
    }

    while let Some(Reverse((_, _, index))) = queue.pop() {
        let (y, x) = (index / width, index % width);
        let mut label = 0;
        for (ny, nx) in neighbours(index) {
            let t = markers[[ny, nx]];
            if t > 0 {
                if label == 0 {
                    label = t;
                } else if t != label {
                    label = BOUNDARY;
                }
            }
        }
        // a queued pixel always has a labelled neighbour
        if label == 0 {
            continue;
        }
        markers[[y, x]] = label;
        if label == BOUNDARY {
            continue;
        }

        let here = color(y, x);
        for (ny, nx) in neighbours(index) {
            if markers[[ny, nx]] == 0 {
                push(&mut queue, color_diff(here, color(ny, nx)), ny * width + nx);
                markers[[ny, nx]] = IN_QUEUE;
            }
        }
    }
}

/// Copy of `image` with every [`BOUNDARY`] marker painted `color`
#[must_use]
pub fn paint_boundaries(image: &RgbImage, markers: &Array2<i32>, color: Rgb<u8>) -> RgbImage {
    let mut output = image.clone();
    for (x, y, pixel) in output.enumerate_pixels_mut() {
        if markers.get([y as usize, x as usize]) == Some(&BOUNDARY) {
            *pixel = color;
        }
    }
    output
}

/// Marker-flooding strategy
#[derive(Debug, Clone)]
pub struct WatershedSegmenter {
    params: WatershedParams,
}

impl WatershedSegmenter {
    #[must_use]
    pub fn new(params: WatershedParams) -> Self {
        Self { params }
    }
}

impl Segmenter for WatershedSegmenter {
    fn method(&self) -> SegmentationMethod {
        SegmentationMethod::MarkerFlooding
    }

    #[instrument(skip_all, fields(width = image.width(), height = image.height()))]
    fn segment(&mut self, image: &RgbImage, debug_sink: &dyn DebugSink) -> Result<Segmentation> {
        let mut markers = compute_markers(image, &self.params, debug_sink);
        watershed(image, &mut markers);

        let output = paint_boundaries(image, &markers, Rgb(self.params.boundary_color));
        debug_sink.dump("watershed", &DynamicImage::ImageRgb8(output.clone()));
        Ok(Segmentation::Masked(output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segmentation::test_utils::{scene, BACKGROUND, OBJECT};
    use crate::services::NoOpDebugSink;

    #[test]
    fn test_otsu_inverse_marks_dark_pixels() {
        let gray = GrayImage::from_fn(10, 1, |x, _| Luma([if x < 5 { 20 } else { 220 }]));
        let binary = otsu_inverse_binary(&gray);
        assert_eq!(binary.get_pixel(0, 0)[0], 255);
        assert_eq!(binary.get_pixel(9, 0)[0], 0);
    }

    #[test]
    fn test_distance_to_background() {
        let mut binary = GrayImage::new(9, 9);
        for y in 2..7 {
            for x in 2..7 {
                binary.put_pixel(x, y, Luma([255]));
            }
        }
        let distance = distance_to_background(&binary);
        assert_eq!(distance[[0, 0]], 0.0);
        assert!((distance[[2, 2]] - 1.0).abs() < 1e-9);
        assert!((distance[[4, 4]] - 3.0).abs() < 1e-9);

        let full = GrayImage::from_pixel(3, 4, Luma([255]));
        assert!((distance_to_background(&full)[[1, 1]] - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_markers_for_scene() {
        let markers = compute_markers(&scene(), &WatershedParams::default(), &NoOpDebugSink);
        assert_eq!(markers[[2, 2]], BACKGROUND_MARKER);
        assert_eq!(markers[[50, 50]], 2);
        // ring between the blob core and sure background is undecided
        assert_eq!(markers[[31, 50]], 0);
    }

    #[test]
    fn test_flood_two_seeds() {
        let image = RgbImage::from_fn(7, 5, |x, _| if x < 3 { Rgb([0, 0, 0]) } else { Rgb([200, 200, 200]) });
        let mut markers = Array2::zeros((5, 7));
        markers[[2, 1]] = 1;
        markers[[2, 5]] = 2;
        watershed(&image, &mut markers);

        assert!(markers.row(0).iter().all(|&m| m == BOUNDARY));
        assert!(markers.column(6).iter().all(|&m| m == BOUNDARY));
        for y in 1..4 {
            assert_eq!(markers[[y, 1]], 1);
            assert_eq!(markers[[y, 5]], 2);
        }
        assert!(markers.iter().all(|&m| m != 0 && m != IN_QUEUE));
    }

    #[test]
    fn test_distance_ratio_controls_seed_size() {
        let image = scene();
        let default_markers = compute_markers(&image, &WatershedParams::default(), &NoOpDebugSink);
        assert_eq!(default_markers[[50, 36]], 0);

        let loose = WatershedParams {
            foreground_distance_ratio: 0.3,
            ..WatershedParams::default()
        };
        let markers = compute_markers(&image, &loose, &NoOpDebugSink);
        assert_eq!(markers[[50, 36]], 2);
        assert_eq!(markers[[50, 33]], 0);
    }

    #[test]
    fn test_segmenter_keeps_background_and_paints_border() {
        let params = WatershedParams::default();
        let mut segmenter = WatershedSegmenter::new(params.clone());
        let Segmentation::Masked(output) = segmenter.segment(&scene(), &NoOpDebugSink).unwrap()
        else {
            panic!("marker flooding must return a masked image");
        };
        assert_eq!(*output.get_pixel(5, 5), BACKGROUND);
        assert_eq!(*output.get_pixel(50, 50), OBJECT);
        assert_eq!(*output.get_pixel(0, 0), Rgb(params.boundary_color));
        assert_eq!(*output.get_pixel(99, 40), Rgb(params.boundary_color));
    }
}
