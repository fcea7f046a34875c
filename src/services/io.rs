//! Image I/O operations service
//!
//! This module separates file I/O operations from the segmentation logic,
//! making the pipelines testable on in-memory images.

use crate::error::{RemoveBgError, Result};
use image::DynamicImage;
use std::path::Path;
use tracing::debug;

/// Service for handling image file input/output operations
pub struct ImageIOService;

impl ImageIOService {
    /// Load an image from a file path
    ///
    /// A missing file is reported as [`RemoveBgError::ImageNotFound`] before any
    /// decoding is attempted.
    ///
    /// # Examples
    /// ```rust,no_run
    /// use removebg::services::ImageIOService;
    ///
    /// let image = ImageIOService::load_image("../public/image/test5.jpg")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load_image<P: AsRef<Path>>(path: P) -> Result<DynamicImage> {
        let path_ref = path.as_ref();

        if !path_ref.exists() {
            return Err(RemoveBgError::image_not_found(path_ref));
        }

        match image::open(path_ref) {
            Ok(img) => Self::ensure_non_empty(img, path_ref),
            Err(e) => {
                // Extension may lie about the content; retry with content sniffing
                debug!(
                    path = %path_ref.display(),
                    error = %e,
                    "Extension-based loading failed, attempting content-based detection"
                );

                let data = std::fs::read(path_ref).map_err(|io_err| {
                    RemoveBgError::file_io_error("read image data", path_ref, &io_err)
                })?;

                let img = image::load_from_memory(&data).map_err(|content_err| {
                    let extension = path_ref
                        .extension()
                        .and_then(|s| s.to_str())
                        .unwrap_or("unknown");

                    RemoveBgError::processing_stage_error(
                        "image loading",
                        &format!(
                            "Failed to load image with both extension-based ({}) and content-based detection. Extension error: {}. Content error: {}",
                            extension, e, content_err
                        ),
                        Some(&format!("path: {}, size: {} bytes", path_ref.display(), data.len())),
                    )
                })?;
                Self::ensure_non_empty(img, path_ref)
            },
        }
    }

    /// Load an image from bytes
    pub fn load_from_bytes(bytes: &[u8]) -> Result<DynamicImage> {
        let img = image::load_from_memory(bytes).map_err(|e| {
            RemoveBgError::processing(format!("Failed to decode image from bytes: {}", e))
        })?;
        Self::ensure_non_empty(img, Path::new("<memory>"))
    }

    /// Save an image as PNG, creating the parent directory if it does not exist
    pub fn save_png<P: AsRef<Path>>(image: &DynamicImage, path: P) -> Result<()> {
        let path_ref = path.as_ref();

        if let Some(parent) = path_ref.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    RemoveBgError::file_io_error("create output directory", parent, &e)
                })?;
            }
        }

        image
            .save_with_format(path_ref, image::ImageFormat::Png)
            .map_err(|e| {
                RemoveBgError::processing_stage_error(
                    "image save",
                    &format!("Failed to save as PNG: {}", e),
                    Some(&format!("path: {}", path_ref.display())),
                )
            })?;

        debug!(path = %path_ref.display(), "Saved PNG output");
        Ok(())
    }

    fn ensure_non_empty(img: DynamicImage, path: &Path) -> Result<DynamicImage> {
        if img.width() == 0 || img.height() == 0 {
            return Err(RemoveBgError::processing_stage_error(
                "image loading",
                "decoded image is empty",
                Some(&path.display().to_string()),
            ));
        }
        Ok(img)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_not_found() {
        let err = ImageIOService::load_image("/definitely/not/here.jpg").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_save_creates_directory_and_round_trips() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("result").join("out.png");
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 3, Rgb([10, 20, 30])));

        ImageIOService::save_png(&image, &path).unwrap();
        assert!(path.exists());

        let loaded = ImageIOService::load_image(&path).unwrap();
        assert_eq!((loaded.width(), loaded.height()), (4, 3));
        assert_eq!(loaded.to_rgb8().get_pixel(1, 1), &Rgb([10, 20, 30]));
    }

    #[test]
    fn test_content_detection_with_wrong_extension() {
        let temp = TempDir::new().unwrap();
        let png_path = temp.path().join("real.png");
        let jpg_path = temp.path().join("mislabelled.jpg");
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(2, 2, Rgb([1, 2, 3])));
        ImageIOService::save_png(&image, &png_path).unwrap();
        std::fs::copy(&png_path, &jpg_path).unwrap();

        let loaded = ImageIOService::load_image(&jpg_path).unwrap();
        assert_eq!((loaded.width(), loaded.height()), (2, 2));
    }

    #[test]
    fn test_garbage_bytes_fail_to_decode() {
        assert!(ImageIOService::load_from_bytes(&[0, 1, 2, 3]).is_err());
    }
}
