//! Shared fixtures for integration tests

#![allow(dead_code)]

use image::{Rgb, RgbImage};
use std::path::{Path, PathBuf};

pub const BACKGROUND: Rgb<u8> = Rgb([235, 235, 235]);
pub const OBJECT: Rgb<u8> = Rgb([190, 35, 35]);

/// 100×100 light image with one dark red square covering 30..70 on both axes
pub fn single_object_image() -> RgbImage {
    RgbImage::from_fn(100, 100, |x, y| {
        if (30..70).contains(&x) && (30..70).contains(&y) {
            OBJECT
        } else {
            BACKGROUND
        }
    })
}

pub fn uniform_image() -> RgbImage {
    RgbImage::from_pixel(100, 100, BACKGROUND)
}

/// Save `image` as `<dir>/<name>.<ext>` and return the path
pub fn write_image(image: &RgbImage, dir: &Path, name: &str, ext: &str) -> PathBuf {
    std::fs::create_dir_all(dir).unwrap();
    let path = dir.join(format!("{}.{}", name, ext));
    image.save(&path).unwrap();
    path
}
