//! Unified background removal processor
//!
//! `BackgroundRemovalProcessor` drives one strategy through the whole
//! pipeline: decode, segment, composite and (optionally) save. The library
//! entry points and the CLI both go through it so every frontend behaves the
//! same way.

use crate::{
    compositing,
    config::RemovalConfig,
    error::Result,
    segmentation::{DefaultSegmenterFactory, Segmentation, Segmenter, SegmenterFactory},
    services::{DebugSink, ImageIOService, NoOpDebugSink},
    types::{ProcessingTimings, RemovalResult, SegmentationMethod},
};
use image::{DynamicImage, GenericImageView};
use instant::Instant;
use std::path::Path;
use tracing::{debug, info, instrument, span, Level};

/// Runs one segmentation strategy end to end
pub struct BackgroundRemovalProcessor {
    method: SegmentationMethod,
    config: RemovalConfig,
    segmenter: Box<dyn Segmenter>,
    debug_sink: Box<dyn DebugSink>,
}

impl std::fmt::Debug for BackgroundRemovalProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundRemovalProcessor")
            .field("method", &self.method)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl BackgroundRemovalProcessor {
    /// Create a processor for `method` using the built-in strategies
    ///
    /// # Errors
    /// - Invalid configuration
    pub fn new(method: SegmentationMethod, config: RemovalConfig) -> Result<Self> {
        Self::with_factory(method, config, &DefaultSegmenterFactory)
    }

    /// Create a processor whose strategy comes from a custom factory
    ///
    /// # Errors
    /// - Invalid configuration
    /// - The factory cannot build a strategy for `method`
    pub fn with_factory(
        method: SegmentationMethod,
        config: RemovalConfig,
        factory: &dyn SegmenterFactory,
    ) -> Result<Self> {
        config.validate()?;
        let segmenter = factory.create_segmenter(method, &config)?;
        debug!(%method, "Created segmentation strategy");
        Ok(Self {
            method,
            config,
            segmenter,
            debug_sink: Box::new(NoOpDebugSink),
        })
    }

    /// Attach a sink for intermediate stage images
    ///
    /// Dumps are only emitted when `config.debug` is set.
    #[must_use]
    pub fn with_debug_sink(mut self, sink: Box<dyn DebugSink>) -> Self {
        self.debug_sink = sink;
        self
    }

    #[must_use]
    pub fn method(&self) -> SegmentationMethod {
        self.method
    }

    #[must_use]
    pub fn config(&self) -> &RemovalConfig {
        &self.config
    }

    /// Load an image file and process it
    ///
    /// # Errors
    /// - [`crate::RemoveBgError::ImageNotFound`] when the file does not exist
    /// - Decode failures
    /// - Segmentation failures (e.g. no foreground contour)
    pub fn process_file<P: AsRef<Path>>(&mut self, input_path: P) -> Result<RemovalResult> {
        let total_start = Instant::now();
        let decode_start = Instant::now();
        let image = ImageIOService::load_image(input_path.as_ref())?;
        let decode_ms = decode_start.elapsed().as_millis() as u64;

        let mut result = self.process_image(&image)?;
        result.timings.image_decode_ms = decode_ms;
        result.timings.total_ms = total_start.elapsed().as_millis() as u64;
        Ok(result)
    }

    /// Process an input file and write the PNG result to `output_path`
    ///
    /// Nothing is written when any stage before encoding fails.
    ///
    /// # Errors
    /// - Any error from [`Self::process_file`]
    /// - Output directory or file cannot be written
    #[instrument(skip(self, input_path, output_path), fields(method = %self.method))]
    pub fn process_file_to<P: AsRef<Path>, Q: AsRef<Path>>(
        &mut self,
        input_path: P,
        output_path: Q,
    ) -> Result<RemovalResult> {
        let total_start = Instant::now();
        let mut result = self.process_file(input_path)?;

        let encode_start = Instant::now();
        result.save_png(output_path.as_ref())?;
        result.timings.image_encode_ms = Some(encode_start.elapsed().as_millis() as u64);
        result.timings.total_ms = total_start.elapsed().as_millis() as u64;

        info!(
            output = %output_path.as_ref().display(),
            summary = %result.timing_summary(),
            "Wrote result"
        );
        Ok(result)
    }

    /// Decode image bytes and process them
    ///
    /// # Errors
    /// - Unrecognised or corrupt image data
    /// - Segmentation failures
    pub fn process_bytes(&mut self, image_bytes: &[u8]) -> Result<RemovalResult> {
        let total_start = Instant::now();
        let decode_start = Instant::now();
        let image = ImageIOService::load_from_bytes(image_bytes)?;
        let decode_ms = decode_start.elapsed().as_millis() as u64;

        let mut result = self.process_image(&image)?;
        result.timings.image_decode_ms = decode_ms;
        result.timings.total_ms = total_start.elapsed().as_millis() as u64;
        Ok(result)
    }

    /// Segment and composite an already decoded image
    ///
    /// # Errors
    /// - Segmentation failures (no foreground, degenerate sample sets)
    /// - Mask/image shape mismatches from a custom strategy
    #[instrument(
        skip(self, image),
        fields(
            method = %self.method,
            dimensions = %format!("{}x{}", image.width(), image.height())
        )
    )]
    pub fn process_image(&mut self, image: &DynamicImage) -> Result<RemovalResult> {
        let total_start = Instant::now();
        let mut timings = ProcessingTimings::default();
        let original_dimensions = image.dimensions();
        let rgb = image.to_rgb8();

        let sink: &dyn DebugSink = if self.config.debug {
            self.debug_sink.as_ref()
        } else {
            &NoOpDebugSink
        };

        let segmentation = {
            let _span = span!(Level::DEBUG, "segmentation").entered();
            let start = Instant::now();
            let segmentation = self.segmenter.segment(&rgb, sink)?;
            timings.segmentation_ms = start.elapsed().as_millis() as u64;
            segmentation
        };

        let output = {
            let _span = span!(Level::DEBUG, "compositing").entered();
            let start = Instant::now();
            let output = composite(&rgb, segmentation, &self.config)?;
            timings.compositing_ms = start.elapsed().as_millis() as u64;
            output
        };

        timings.total_ms = total_start.elapsed().as_millis() as u64;
        debug!(
            segmentation_ms = timings.segmentation_ms,
            compositing_ms = timings.compositing_ms,
            "Processed image"
        );
        Ok(RemovalResult::new(output, self.method, original_dimensions, timings))
    }
}

/// Turn a strategy's output into the final image
///
/// Soft masks are blended against the configured colour, masked images keep
/// their pixels; both then get a hard alpha channel. Raw masks pass through
/// as grayscale.
///
/// # Errors
/// - Soft mask shape differs from the image
pub fn composite(
    image: &image::RgbImage,
    segmentation: Segmentation,
    config: &RemovalConfig,
) -> Result<DynamicImage> {
    Ok(match segmentation {
        Segmentation::SoftMask(weights) => {
            let blended =
                compositing::blend_with_color(image, &weights, config.blend.background_color)?;
            DynamicImage::ImageRgba8(compositing::with_hard_alpha(&blended)?)
        },
        Segmentation::Masked(masked) => {
            DynamicImage::ImageRgba8(compositing::with_hard_alpha(&masked)?)
        },
        Segmentation::RawMask(mask) => DynamicImage::ImageLuma8(mask),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segmentation::test_utils::{blank, scene};
    use crate::{error::RemoveBgError, services::DirectoryDebugSink};
    use image::{GrayImage, Luma, Rgb, RgbImage};
    use ndarray::Array2;

    struct FixedMask;

    impl Segmenter for FixedMask {
        fn method(&self) -> SegmentationMethod {
            SegmentationMethod::Contour
        }

        fn segment(&mut self, image: &RgbImage, _debug: &dyn DebugSink) -> Result<Segmentation> {
            let (w, h) = image.dimensions();
            Ok(Segmentation::SoftMask(Array2::from_shape_fn(
                (h as usize, w as usize),
                |(_, x)| if x < w as usize / 2 { 1.0 } else { 0.0 },
            )))
        }
    }

    struct FixedFactory;

    impl SegmenterFactory for FixedFactory {
        fn create_segmenter(
            &self,
            _method: SegmentationMethod,
            _config: &RemovalConfig,
        ) -> Result<Box<dyn Segmenter>> {
            Ok(Box::new(FixedMask))
        }
    }

    #[test]
    fn test_custom_factory_is_used() {
        let mut processor = BackgroundRemovalProcessor::with_factory(
            SegmentationMethod::Contour,
            RemovalConfig::default(),
            &FixedFactory,
        )
        .unwrap();
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 2, Rgb([100, 100, 100])));
        let result = processor.process_image(&image).unwrap();
        let rgba = result.image.to_rgba8();
        assert_eq!(rgba.get_pixel(0, 0)[3], 255);
        assert_eq!(rgba.get_pixel(3, 0).0, [0, 0, 0, 0]);
    }

    #[test]
    fn test_contour_pipeline_keeps_dimensions() {
        let mut processor =
            BackgroundRemovalProcessor::new(SegmentationMethod::Contour, RemovalConfig::default())
                .unwrap();
        let result = processor
            .process_image(&DynamicImage::ImageRgb8(scene()))
            .unwrap();
        assert_eq!(result.dimensions(), (100, 100));
        assert_eq!(result.original_dimensions, (100, 100));
        assert_eq!(result.method, SegmentationMethod::Contour);

        let rgba = result.image.to_rgba8();
        assert!(rgba.pixels().all(|p| p[3] == 0 || p[3] == 255));
        assert_eq!(rgba.get_pixel(50, 50)[3], 255);
        assert_eq!(rgba.get_pixel(2, 2)[3], 0);
    }

    #[test]
    fn test_no_foreground_is_reported() {
        let mut processor =
            BackgroundRemovalProcessor::new(SegmentationMethod::Contour, RemovalConfig::default())
                .unwrap();
        let err = processor
            .process_image(&DynamicImage::ImageRgb8(blank(30)))
            .unwrap_err();
        assert!(matches!(err, RemoveBgError::NoForeground));
    }

    #[test]
    fn test_background_subtraction_writes_grayscale() {
        let mut processor = BackgroundRemovalProcessor::new(
            SegmentationMethod::BackgroundSubtraction,
            RemovalConfig::default(),
        )
        .unwrap();
        let result = processor
            .process_image(&DynamicImage::ImageRgb8(scene()))
            .unwrap();
        assert!(matches!(result.image, DynamicImage::ImageLuma8(_)));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = RemovalConfig::default();
        config.blend.blur_size = 4;
        assert!(BackgroundRemovalProcessor::new(SegmentationMethod::Contour, config).is_err());
    }

    #[test]
    fn test_debug_dumps_require_debug_flag() {
        let temp = tempfile::tempdir().unwrap();
        let image = DynamicImage::ImageRgb8(scene());

        let mut quiet =
            BackgroundRemovalProcessor::new(SegmentationMethod::Contour, RemovalConfig::default())
                .unwrap()
                .with_debug_sink(Box::new(DirectoryDebugSink::new(temp.path(), "quiet")));
        quiet.process_image(&image).unwrap();
        assert!(!temp.path().join("quiet_mask.png").exists());

        let config = RemovalConfig::builder().debug(true).build().unwrap();
        let mut verbose = BackgroundRemovalProcessor::new(SegmentationMethod::Contour, config)
            .unwrap()
            .with_debug_sink(Box::new(DirectoryDebugSink::new(temp.path(), "verbose")));
        verbose.process_image(&image).unwrap();
        assert!(temp.path().join("verbose_edges.png").exists());
        assert!(temp.path().join("verbose_mask.png").exists());
    }

    #[test]
    fn test_composite_raw_mask_passthrough() {
        let mask = GrayImage::from_pixel(3, 3, Luma([127]));
        let out = composite(
            &RgbImage::new(3, 3),
            Segmentation::RawMask(mask.clone()),
            &RemovalConfig::default(),
        )
        .unwrap();
        assert_eq!(out.to_luma8(), mask);
    }

    #[test]
    fn test_process_file_to_writes_png() {
        let temp = tempfile::tempdir().unwrap();
        let input = temp.path().join("scene.png");
        scene().save(&input).unwrap();
        let output = temp.path().join("out").join("1_scene_rst.png");

        let mut processor =
            BackgroundRemovalProcessor::new(SegmentationMethod::Contour, RemovalConfig::default())
                .unwrap();
        let result = processor.process_file_to(&input, &output).unwrap();
        assert!(output.exists());
        assert!(result.timings.image_encode_ms.is_some());

        let missing = processor.process_file(temp.path().join("missing.jpg"));
        assert!(missing.unwrap_err().is_not_found());
    }
}
