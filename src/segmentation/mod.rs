//! Segmentation strategies
//!
//! Each strategy turns a decoded colour image into a [`Segmentation`]: soft
//! blend weights, a colour image with the background already zeroed, or a raw
//! mask that is written out untouched. Compositing of the first two kinds is
//! shared and lives in [`crate::compositing`].

pub mod contour;
pub mod gmm;
pub mod grabcut;
pub mod graph;
pub mod mog2;
#[cfg(feature = "opencv")]
pub mod opencv_backend;
pub mod watershed;

#[cfg(test)]
pub(crate) mod test_utils;

use crate::{
    config::RemovalConfig,
    error::Result,
    services::DebugSink,
    types::{BackendType, SegmentationMethod},
};
use image::{GrayImage, RgbImage};
use ndarray::Array2;

pub use contour::ContourSegmenter;
pub use grabcut::GrabCutSegmenter;
pub use mog2::{Mog2Model, Mog2Segmenter};
#[cfg(feature = "opencv")]
pub use opencv_backend::{OpenCvGrabCutSegmenter, OpenCvMog2Segmenter, OpenCvWatershedSegmenter};
pub use watershed::WatershedSegmenter;

/// What a strategy hands back to the compositor
#[derive(Debug, Clone)]
pub enum Segmentation {
    /// Per-pixel foreground weights in 0-1, blended against the fill colour
    SoftMask(Array2<f32>),
    /// Colour image whose background pixels are already zeroed
    Masked(RgbImage),
    /// Single-channel mask emitted without compositing
    RawMask(GrayImage),
}

/// A foreground/background separation strategy
pub trait Segmenter {
    /// Method implemented by this strategy
    fn method(&self) -> SegmentationMethod;

    /// Segment one image
    ///
    /// # Errors
    /// - The strategy cannot find any foreground
    /// - The image is too degenerate for the algorithm (e.g. no background samples)
    fn segment(&mut self, image: &RgbImage, debug: &dyn DebugSink) -> Result<Segmentation>;
}

/// Factory trait for creating segmentation strategies
pub trait SegmenterFactory {
    /// Create the strategy for `method` configured from `config`
    ///
    /// # Errors
    /// - Strategy-specific configuration is invalid
    fn create_segmenter(
        &self,
        method: SegmentationMethod,
        config: &RemovalConfig,
    ) -> Result<Box<dyn Segmenter>>;
}

/// Factory producing the built-in strategies
///
/// Strategy 1 is always native; strategies 2-4 follow `config.backend`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultSegmenterFactory;

impl DefaultSegmenterFactory {
    fn create_native(method: SegmentationMethod, config: &RemovalConfig) -> Box<dyn Segmenter> {
        match method {
            SegmentationMethod::Contour => Box::new(ContourSegmenter::new(config.blend.clone())),
            SegmentationMethod::InteractiveCut => {
                Box::new(GrabCutSegmenter::new(config.grabcut_iterations))
            },
            SegmentationMethod::MarkerFlooding => {
                Box::new(WatershedSegmenter::new(config.watershed.clone()))
            },
            SegmentationMethod::BackgroundSubtraction => {
                Box::new(Mog2Segmenter::new(config.mog2.clone()))
            },
        }
    }

    #[cfg(feature = "opencv")]
    fn create_opencv(
        method: SegmentationMethod,
        config: &RemovalConfig,
    ) -> Result<Box<dyn Segmenter>> {
        Ok(match method {
            SegmentationMethod::Contour => Self::create_native(method, config),
            SegmentationMethod::InteractiveCut => {
                Box::new(OpenCvGrabCutSegmenter::new(config.grabcut_iterations))
            },
            SegmentationMethod::MarkerFlooding => {
                Box::new(OpenCvWatershedSegmenter::new(config.watershed.clone()))
            },
            SegmentationMethod::BackgroundSubtraction => {
                Box::new(OpenCvMog2Segmenter::new(&config.mog2)?)
            },
        })
    }

    #[cfg(not(feature = "opencv"))]
    fn create_opencv(
        _method: SegmentationMethod,
        _config: &RemovalConfig,
    ) -> Result<Box<dyn Segmenter>> {
        Err(crate::error::RemoveBgError::invalid_config(
            "the opencv backend requires the \"opencv\" feature",
        ))
    }
}

impl SegmenterFactory for DefaultSegmenterFactory {
    fn create_segmenter(
        &self,
        method: SegmentationMethod,
        config: &RemovalConfig,
    ) -> Result<Box<dyn Segmenter>> {
        match config.backend {
            BackendType::Native => Ok(Self::create_native(method, config)),
            BackendType::OpenCv => Self::create_opencv(method, config),
        }
    }
}
