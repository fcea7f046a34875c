//! Core types for background removal operations

use crate::error::Result;
use image::{DynamicImage, GenericImageView};
use imageproc::point::Point;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Segmentation strategy, selected on the command line by an integer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SegmentationMethod {
    /// Largest Canny contour, smoothed and blended against a fill colour
    Contour,
    /// GrabCut seeded with a full-image rectangle
    InteractiveCut,
    /// Marker-based watershed flooding
    MarkerFlooding,
    /// Adaptive Gaussian-mixture background subtraction
    BackgroundSubtraction,
}

impl SegmentationMethod {
    /// All methods in selector order
    pub const ALL: [Self; 4] = [
        Self::Contour,
        Self::InteractiveCut,
        Self::MarkerFlooding,
        Self::BackgroundSubtraction,
    ];

    /// Parse a command-line selector (`"1"` to `"4"`)
    #[must_use]
    pub fn from_selector(selector: &str) -> Option<Self> {
        match selector.trim() {
            "1" => Some(Self::Contour),
            "2" => Some(Self::InteractiveCut),
            "3" => Some(Self::MarkerFlooding),
            "4" => Some(Self::BackgroundSubtraction),
            _ => None,
        }
    }

    /// The selector this method answers to
    #[must_use]
    pub fn selector(self) -> u8 {
        match self {
            Self::Contour => 1,
            Self::InteractiveCut => 2,
            Self::MarkerFlooding => 3,
            Self::BackgroundSubtraction => 4,
        }
    }

    /// Whether the output carries a derived alpha channel
    #[must_use]
    pub fn derives_alpha(self) -> bool {
        !matches!(self, Self::BackgroundSubtraction)
    }
}

impl std::fmt::Display for SegmentationMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Contour => write!(f, "contour"),
            Self::InteractiveCut => write!(f, "interactive-cut"),
            Self::MarkerFlooding => write!(f, "marker-flooding"),
            Self::BackgroundSubtraction => write!(f, "background-subtraction"),
        }
    }
}

/// Implementation used for the interactive cut, marker flooding and
/// background subtraction strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    /// Pure Rust, no external dependencies
    Native,
    /// OpenCV `grabCut`, `watershed` and `BackgroundSubtractorMOG2` (requires the "opencv" feature)
    OpenCv,
}

impl BackendType {
    /// Backends compiled into this build
    #[must_use]
    pub fn available() -> Vec<Self> {
        let mut backends = vec![Self::Native];
        if cfg!(feature = "opencv") {
            backends.push(Self::OpenCv);
        }
        backends
    }

    #[must_use]
    pub fn is_available(self) -> bool {
        Self::available().contains(&self)
    }

    /// OpenCV when compiled in, otherwise the native backend
    #[must_use]
    pub fn preferred() -> Self {
        if cfg!(feature = "opencv") {
            Self::OpenCv
        } else {
            Self::Native
        }
    }
}

impl Default for BackendType {
    fn default() -> Self {
        Self::preferred()
    }
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Native => write!(f, "native"),
            Self::OpenCv => write!(f, "opencv"),
        }
    }
}

impl std::str::FromStr for BackendType {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "native" => Ok(Self::Native),
            "opencv" => Ok(Self::OpenCv),
            other => Err(format!("unknown backend '{}' (native, opencv)", other)),
        }
    }
}

/// A closed boundary traced from a binary edge map
#[derive(Debug, Clone, PartialEq)]
pub struct ContourInfo {
    /// Boundary points in tracing order
    pub points: Vec<Point<i32>>,
    /// Enclosed area (shoelace formula, absolute)
    pub area: f64,
    /// Whether the polygon is convex; informational only
    pub convex: bool,
}

impl ContourInfo {
    /// Build contour info from traced points
    #[must_use]
    pub fn from_points(points: Vec<Point<i32>>) -> Self {
        let area = polygon_area(&points);
        let convex = is_convex(&points);
        Self {
            points,
            area,
            convex,
        }
    }
}

/// Absolute polygon area using the shoelace formula
#[must_use]
pub fn polygon_area(points: &[Point<i32>]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let twice: i64 = points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .map(|(a, b)| i64::from(a.x) * i64::from(b.y) - i64::from(b.x) * i64::from(a.y))
        .sum();
    (twice as f64 / 2.0).abs()
}

/// Whether every turn of the polygon has the same orientation
#[must_use]
pub fn is_convex(points: &[Point<i32>]) -> bool {
    if points.len() < 3 {
        return false;
    }
    let mut orientation = 0i64;
    let turns = points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .zip(points.iter().cycle().skip(2));
    for ((a, b), c) in turns {
        let cross = i64::from(b.x - a.x) * i64::from(c.y - b.y)
            - i64::from(b.y - a.y) * i64::from(c.x - b.x);
        if cross == 0 {
            continue;
        }
        if orientation == 0 {
            orientation = cross.signum();
        } else if cross.signum() != orientation {
            return false;
        }
    }
    orientation != 0
}

/// Result of a background removal operation
#[derive(Debug, Clone)]
pub struct RemovalResult {
    /// The processed image (RGBA, or grayscale for background subtraction)
    pub image: DynamicImage,

    /// Strategy that produced the image
    pub method: SegmentationMethod,

    /// Original image dimensions
    pub original_dimensions: (u32, u32),

    /// Stage timings
    pub timings: ProcessingTimings,
}

impl RemovalResult {
    /// Create a new removal result
    #[must_use]
    pub fn new(
        image: DynamicImage,
        method: SegmentationMethod,
        original_dimensions: (u32, u32),
        timings: ProcessingTimings,
    ) -> Self {
        Self {
            image,
            method,
            original_dimensions,
            timings,
        }
    }

    /// Save the result as PNG, creating the parent directory if needed
    pub fn save_png<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        crate::services::ImageIOService::save_png(&self.image, path)
    }

    /// Get the image as encoded PNG bytes
    pub fn to_png_bytes(&self) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        let mut cursor = std::io::Cursor::new(&mut buffer);
        self.image.write_to(&mut cursor, image::ImageFormat::Png)?;
        Ok(buffer)
    }

    /// Get image dimensions
    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Get timing summary for display
    #[must_use]
    pub fn timing_summary(&self) -> String {
        let t = &self.timings;
        let mut summary = format!(
            "Total: {}ms | Decode: {}ms | Segmentation: {}ms | Compositing: {}ms",
            t.total_ms, t.image_decode_ms, t.segmentation_ms, t.compositing_ms
        );
        if let Some(encode_ms) = t.image_encode_ms {
            summary.push_str(&format!(" | Encode: {}ms", encode_ms));
        }
        summary
    }
}

/// Timing breakdown for one pipeline invocation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingTimings {
    /// Image loading and decoding from file
    pub image_decode_ms: u64,

    /// Mask or label production by the segmentation strategy
    pub segmentation_ms: u64,

    /// Blending, alpha derivation and channel merge
    pub compositing_ms: u64,

    /// Final image encoding (if saving to file)
    pub image_encode_ms: Option<u64>,

    /// Total end-to-end processing time
    pub total_ms: u64,
}
