//! Synthetic fixtures shared by the segmentation unit tests

use image::{Rgb, RgbImage};

pub(crate) const BACKGROUND: Rgb<u8> = Rgb([230, 230, 230]);
pub(crate) const OBJECT: Rgb<u8> = Rgb([200, 40, 40]);

/// A `size`×`size` light image with one red square covering `lo..hi` on both axes
pub(crate) fn single_object_image(size: u32, lo: u32, hi: u32) -> RgbImage {
    RgbImage::from_fn(size, size, |x, y| {
        if (lo..hi).contains(&x) && (lo..hi).contains(&y) {
            OBJECT
        } else {
            BACKGROUND
        }
    })
}

/// The standard 100×100 scene: one object in the middle
pub(crate) fn scene() -> RgbImage {
    single_object_image(100, 30, 70)
}

/// Uniform image with nothing to segment
pub(crate) fn blank(size: u32) -> RgbImage {
    RgbImage::from_pixel(size, size, BACKGROUND)
}
