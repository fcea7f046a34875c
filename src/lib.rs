#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]

//! # removebg
//!
//! Classical (non-neural) background removal for still images. Four
//! strategies are available, selected by [`SegmentationMethod`]:
//!
//! 1. **Contour compositing**: Canny edges, largest contour, filled and
//!    smoothed into a soft mask, blended against a fill colour.
//! 2. **Interactive cut**: iterative GMM + min-cut segmentation seeded by a
//!    rectangle covering the image.
//! 3. **Marker flooding**: Otsu threshold, distance-transform seeds and a
//!    marker watershed.
//! 4. **Background subtraction**: an adaptive per-pixel Gaussian mixture
//!    whose raw foreground mask is the output.
//!
//! Strategies 1-3 produce RGBA PNGs whose alpha is binary: any pixel whose
//! composited colour is not pure black is opaque.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use removebg::{remove_background, RemovalConfig, SegmentationMethod};
//!
//! # fn example() -> anyhow::Result<()> {
//! let config = RemovalConfig::builder()
//!     .background_color([1.0, 1.0, 1.0])
//!     .build()?;
//! let result = remove_background(
//!     "input.jpg",
//!     "output.png",
//!     SegmentationMethod::Contour,
//!     &config,
//! )?;
//! println!("{}", result.timing_summary());
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `cli` (default): command-line interface and tracing subscriber setup
//! - `tracing-json`: JSON log output for the CLI
//! - `opencv`: OpenCV implementations of strategies 2-4, selected by
//!   [`BackendType::OpenCv`] (requires a system OpenCV 4 install)
//!
//! ### Library-Only Usage
//!
//! ```toml
//! [dependencies]
//! removebg = { version = "0.1", default-features = false }
//! ```

#[cfg(feature = "cli")]
pub mod cli;
pub mod compositing;
pub mod config;
pub mod error;
pub mod processor;
pub mod segmentation;
pub mod services;
#[cfg(feature = "cli")]
pub mod tracing_config;
pub mod types;

use std::path::Path;

// Public API exports
pub use config::{BlendParams, Mog2Settings, RemovalConfig, RemovalConfigBuilder, WatershedParams};
pub use error::{RemoveBgError, Result};
pub use processor::BackgroundRemovalProcessor;
pub use segmentation::{
    DefaultSegmenterFactory, Mog2Model, Segmentation, Segmenter, SegmenterFactory,
};
pub use services::{DebugSink, DirectoryDebugSink, ImageIOService, NoOpDebugSink};
pub use types::{BackendType, ContourInfo, ProcessingTimings, RemovalResult, SegmentationMethod};

#[cfg(feature = "cli")]
pub use tracing_config::{init_cli_tracing, TracingConfig, TracingFormat};

/// Remove the background of the image at `input` and write a PNG to `output`
///
/// The output directory is created if needed. Nothing is written when the
/// input is missing, cannot be decoded, or the strategy finds no foreground.
///
/// # Examples
///
/// ```rust,no_run
/// use removebg::{remove_background, RemovalConfig, SegmentationMethod};
///
/// # fn example() -> removebg::Result<()> {
/// remove_background(
///     "../public/image/test5.jpg",
///     "../public/result/2_test5_rst.png",
///     SegmentationMethod::InteractiveCut,
///     &RemovalConfig::default(),
/// )?;
/// # Ok(())
/// # }
/// ```
pub fn remove_background<P: AsRef<Path>, Q: AsRef<Path>>(
    input: P,
    output: Q,
    method: SegmentationMethod,
    config: &RemovalConfig,
) -> Result<RemovalResult> {
    let mut processor = BackgroundRemovalProcessor::new(method, config.clone())?;
    processor.process_file_to(input, output)
}

/// Contour compositing with explicit blend parameters
///
/// Same as [`remove_background`] with [`SegmentationMethod::Contour`] and a
/// default configuration carrying `params`.
///
/// # Errors
/// - [`RemoveBgError::NoForeground`] when the edge map has no contour
/// - Invalid parameters, missing input, decode or write failures
pub fn remove_background_by_contour<P: AsRef<Path>, Q: AsRef<Path>>(
    input: P,
    output: Q,
    params: BlendParams,
) -> Result<RemovalResult> {
    let config = RemovalConfig::builder().blend(params).build()?;
    remove_background(input, output, SegmentationMethod::Contour, &config)
}

/// Remove the background of an already decoded image
///
/// No file I/O happens; save the returned result with
/// [`RemovalResult::save_png`] or encode it with [`RemovalResult::to_png_bytes`].
pub fn remove_background_from_image(
    image: &image::DynamicImage,
    method: SegmentationMethod,
    config: &RemovalConfig,
) -> Result<RemovalResult> {
    let mut processor = BackgroundRemovalProcessor::new(method, config.clone())?;
    processor.process_image(image)
}

/// Remove the background of an encoded image held in memory (PNG, JPEG, TIFF)
pub fn remove_background_from_bytes(
    image_bytes: &[u8],
    method: SegmentationMethod,
    config: &RemovalConfig,
) -> Result<RemovalResult> {
    let mut processor = BackgroundRemovalProcessor::new(method, config.clone())?;
    processor.process_bytes(image_bytes)
}
