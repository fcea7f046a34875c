//! Configuration types for background removal operations

use crate::error::{RemoveBgError, Result};
use crate::types::BackendType;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Tuning for the contour compositing pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlendParams {
    /// Gaussian kernel size for mask smoothing (odd, both dimensions)
    pub blur_size: u32,

    /// Lower Canny hysteresis threshold
    pub canny_low: f32,

    /// Upper Canny hysteresis threshold
    pub canny_high: f32,

    /// 3x3 dilation passes applied to the filled contour mask
    pub mask_dilate_iter: u8,

    /// 3x3 erosion passes applied after dilation
    pub mask_erode_iter: u8,

    /// Fill colour behind the foreground, RGB normalized to 0-1
    pub background_color: [f32; 3],
}

impl Default for BlendParams {
    fn default() -> Self {
        Self {
            blur_size: 5,
            canny_low: 10.0,
            canny_high: 10.0,
            mask_dilate_iter: 10,
            mask_erode_iter: 10,
            background_color: [0.0, 0.0, 0.0],
        }
    }
}

impl BlendParams {
    /// Validate blend parameters
    ///
    /// # Errors
    /// - Even or zero blur size
    /// - Negative or non-finite Canny thresholds
    /// - Background colour components outside 0-1
    pub fn validate(&self) -> Result<()> {
        if self.blur_size == 0 || self.blur_size % 2 == 0 {
            return Err(RemoveBgError::config_value_error(
                "blur_size",
                self.blur_size,
                "odd values >= 1",
            ));
        }
        for (name, value) in [("canny_low", self.canny_low), ("canny_high", self.canny_high)] {
            if !value.is_finite() || value < 0.0 {
                return Err(RemoveBgError::config_value_error(name, value, "finite, >= 0"));
            }
        }
        if self
            .background_color
            .iter()
            .any(|c| !c.is_finite() || !(0.0..=1.0).contains(c))
        {
            return Err(RemoveBgError::config_value_error(
                "background_color",
                format!("{:?}", self.background_color),
                "each component in 0.0-1.0",
            ));
        }
        Ok(())
    }
}

/// Tuning for marker-based flooding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatershedParams {
    /// 3x3 opening passes used to remove threshold noise
    pub opening_iterations: u8,

    /// 3x3 dilation passes producing the confident background
    pub sure_bg_iterations: u8,

    /// Fraction of the maximum distance above which pixels are confident foreground
    pub foreground_distance_ratio: f32,

    /// RGB colour painted on flood boundaries
    pub boundary_color: [u8; 3],
}

impl Default for WatershedParams {
    fn default() -> Self {
        Self {
            opening_iterations: 2,
            sure_bg_iterations: 3,
            foreground_distance_ratio: 0.5,
            boundary_color: [0, 0, 255],
        }
    }
}

/// Tuning for the adaptive Gaussian-mixture background model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Mog2Settings {
    /// Number of frames the model remembers
    pub history: u32,

    /// Squared Mahalanobis distance deciding whether a pixel fits a mode
    pub var_threshold: f32,

    /// Squared distance used when spawning a new mode instead of updating one
    pub var_threshold_gen: f32,

    /// Maximum Gaussian modes per pixel
    pub max_components: usize,

    /// Share of total weight treated as background
    pub background_ratio: f32,

    /// Variance assigned to newly created modes
    pub initial_variance: f32,

    /// Lower variance clamp
    pub min_variance: f32,

    /// Upper variance clamp
    pub max_variance: f32,

    /// Weight decay pulling unused modes towards zero
    pub complexity_reduction: f32,

    /// Mark shadows with `shadow_value` instead of foreground
    pub detect_shadows: bool,

    /// Mask value written for shadow pixels
    pub shadow_value: u8,

    /// Minimum brightness ratio for a pixel to count as shadow
    pub shadow_threshold: f32,
}

impl Default for Mog2Settings {
    fn default() -> Self {
        Self {
            history: 500,
            var_threshold: 16.0,
            var_threshold_gen: 9.0,
            max_components: 5,
            background_ratio: 0.9,
            initial_variance: 15.0,
            min_variance: 4.0,
            max_variance: 75.0,
            complexity_reduction: 0.05,
            detect_shadows: true,
            shadow_value: 127,
            shadow_threshold: 0.5,
        }
    }
}

/// Configuration for background removal operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemovalConfig {
    /// Contour compositing parameters
    pub blend: BlendParams,

    /// Refinement iterations for the interactive cut
    pub grabcut_iterations: u32,

    /// Marker flooding parameters
    pub watershed: WatershedParams,

    /// Background subtraction parameters
    pub mog2: Mog2Settings,

    /// Implementation of strategies 2-4
    pub backend: BackendType,

    /// Enable debug mode (intermediate stage dumps when a sink is attached)
    pub debug: bool,
}

impl Default for RemovalConfig {
    fn default() -> Self {
        Self {
            blend: BlendParams::default(),
            grabcut_iterations: 5,
            watershed: WatershedParams::default(),
            mog2: Mog2Settings::default(),
            backend: BackendType::default(),
            debug: false,
        }
    }
}

impl RemovalConfig {
    /// Create a new configuration builder
    #[must_use]
    pub fn builder() -> RemovalConfigBuilder {
        RemovalConfigBuilder::new()
    }

    /// Load a configuration from a JSON file; missing fields take defaults
    ///
    /// # Errors
    /// - File cannot be read
    /// - JSON is malformed
    /// - Resulting configuration fails validation
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| RemoveBgError::file_io_error("read config file", path, &e))?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    ///
    /// # Errors
    /// - Any invalid blend parameter
    /// - Zero interactive-cut iterations
    /// - Distance ratio outside (0, 1)
    /// - Degenerate background model settings
    /// - A backend that is not compiled into this build
    pub fn validate(&self) -> Result<()> {
        self.blend.validate()?;

        if !self.backend.is_available() {
            return Err(RemoveBgError::invalid_config(format!(
                "backend '{}' is not available in this build (available: {:?})",
                self.backend,
                BackendType::available()
            )));
        }

        if self.grabcut_iterations == 0 {
            return Err(RemoveBgError::config_value_error(
                "grabcut_iterations",
                self.grabcut_iterations,
                ">= 1",
            ));
        }

        let ratio = self.watershed.foreground_distance_ratio;
        if !(ratio > 0.0 && ratio < 1.0) {
            return Err(RemoveBgError::config_value_error(
                "foreground_distance_ratio",
                ratio,
                "0.0 < ratio < 1.0",
            ));
        }

        if self.mog2.max_components == 0 {
            return Err(RemoveBgError::config_value_error(
                "max_components",
                self.mog2.max_components,
                ">= 1",
            ));
        }
        if self.mog2.history == 0 {
            return Err(RemoveBgError::config_value_error("history", self.mog2.history, ">= 1"));
        }
        if self.mog2.min_variance <= 0.0 || self.mog2.min_variance > self.mog2.max_variance {
            return Err(RemoveBgError::invalid_config(format!(
                "MOG2 variance bounds must satisfy 0 < min ({}) <= max ({})",
                self.mog2.min_variance, self.mog2.max_variance
            )));
        }

        Ok(())
    }
}

/// Builder for `RemovalConfig`
pub struct RemovalConfigBuilder {
    config: RemovalConfig,
}

impl RemovalConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: RemovalConfig::default(),
        }
    }

    /// Start from an existing configuration (e.g. one loaded from a file)
    #[must_use]
    pub fn from_config(config: RemovalConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn blend(mut self, blend: BlendParams) -> Self {
        self.config.blend = blend;
        self
    }

    #[must_use]
    pub fn blur_size(mut self, size: u32) -> Self {
        self.config.blend.blur_size = size;
        self
    }

    #[must_use]
    pub fn canny_thresholds(mut self, low: f32, high: f32) -> Self {
        self.config.blend.canny_low = low;
        self.config.blend.canny_high = high;
        self
    }

    #[must_use]
    pub fn mask_iterations(mut self, dilate: u8, erode: u8) -> Self {
        self.config.blend.mask_dilate_iter = dilate;
        self.config.blend.mask_erode_iter = erode;
        self
    }

    #[must_use]
    pub fn background_color(mut self, color: [f32; 3]) -> Self {
        self.config.blend.background_color = color;
        self
    }

    #[must_use]
    pub fn grabcut_iterations(mut self, iterations: u32) -> Self {
        self.config.grabcut_iterations = iterations;
        self
    }

    #[must_use]
    pub fn watershed(mut self, params: WatershedParams) -> Self {
        self.config.watershed = params;
        self
    }

    #[must_use]
    pub fn mog2(mut self, settings: Mog2Settings) -> Self {
        self.config.mog2 = settings;
        self
    }

    #[must_use]
    pub fn backend(mut self, backend: BackendType) -> Self {
        self.config.backend = backend;
        self
    }

    #[must_use]
    pub fn debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }

    /// Build and validate the configuration
    ///
    /// # Errors
    /// - Any validation failure from [`RemovalConfig::validate`]
    pub fn build(self) -> Result<RemovalConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for RemovalConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = RemovalConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.blend.blur_size, 5);
        assert_eq!(config.blend.mask_dilate_iter, 10);
        assert_eq!(config.grabcut_iterations, 5);
    }

    #[test]
    fn test_builder_overrides() {
        let config = RemovalConfig::builder()
            .blur_size(21)
            .canny_thresholds(10.0, 200.0)
            .background_color([1.0, 1.0, 1.0])
            .grabcut_iterations(3)
            .build()
            .unwrap();

        assert_eq!(config.blend.blur_size, 21);
        assert_eq!(config.blend.canny_high, 200.0);
        assert_eq!(config.blend.background_color, [1.0, 1.0, 1.0]);
        assert_eq!(config.grabcut_iterations, 3);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        assert!(RemovalConfig::builder().blur_size(4).build().is_err());
        assert!(RemovalConfig::builder().blur_size(0).build().is_err());
        assert!(RemovalConfig::builder()
            .canny_thresholds(-1.0, 10.0)
            .build()
            .is_err());
        assert!(RemovalConfig::builder()
            .background_color([1.5, 0.0, 0.0])
            .build()
            .is_err());
        assert!(RemovalConfig::builder().grabcut_iterations(0).build().is_err());

        let err = RemovalConfig::builder().blur_size(8).build().unwrap_err();
        assert!(err.to_string().contains("blur_size"));
    }

    #[test]
    fn test_backend_must_be_compiled_in() {
        assert_eq!(RemovalConfig::default().backend, BackendType::preferred());
        assert!(RemovalConfig::builder().backend(BackendType::Native).build().is_ok());

        let opencv = RemovalConfig::builder().backend(BackendType::OpenCv).build();
        assert_eq!(opencv.is_ok(), cfg!(feature = "opencv"));
    }

    #[test]
    fn test_json_partial_config_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("params.json");
        std::fs::write(
            &path,
            r#"{ "blend": { "blur_size": 21, "background_color": [0.0, 0.0, 1.0] } }"#,
        )
        .unwrap();

        let config = RemovalConfig::from_json_file(&path).unwrap();
        assert_eq!(config.blend.blur_size, 21);
        assert_eq!(config.blend.canny_low, 10.0);
        assert_eq!(config.blend.background_color, [0.0, 0.0, 1.0]);
        assert_eq!(config.grabcut_iterations, 5);
    }

    #[test]
    fn test_json_invalid_config_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("params.json");
        std::fs::write(&path, r#"{ "blend": { "blur_size": 6 } }"#).unwrap();
        assert!(RemovalConfig::from_json_file(&path).is_err());

        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            RemovalConfig::from_json_file(&path),
            Err(RemoveBgError::Serialization(_))
        ));
    }
}
