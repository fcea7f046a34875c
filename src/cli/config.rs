//! Conversion of CLI arguments into library configuration and file paths

use crate::cli::main_impl::Cli;
use crate::config::{RemovalConfig, RemovalConfigBuilder};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Default directory holding `<name>.jpg` inputs
pub const DEFAULT_IMAGE_DIR: &str = "../public/image";
/// Default directory receiving `<selector>_<name>_rst.png` results
pub const DEFAULT_RESULT_DIR: &str = "../public/result";

/// Input and output naming convention shared with the web frontend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageLayout {
    image_dir: PathBuf,
    result_dir: PathBuf,
}

impl ImageLayout {
    pub fn new<P: Into<PathBuf>, Q: Into<PathBuf>>(image_dir: P, result_dir: Q) -> Self {
        Self {
            image_dir: image_dir.into(),
            result_dir: result_dir.into(),
        }
    }

    pub(crate) fn from_cli(cli: &Cli) -> Self {
        Self::new(&cli.image_dir, &cli.result_dir)
    }

    #[must_use]
    pub fn image_dir(&self) -> &Path {
        &self.image_dir
    }

    #[must_use]
    pub fn result_dir(&self) -> &Path {
        &self.result_dir
    }

    /// `<image_dir>/<name>.jpg`
    #[must_use]
    pub fn input_path(&self, name: &str) -> PathBuf {
        self.image_dir.join(format!("{}.jpg", name))
    }

    /// `<result_dir>/<selector>_<name>_rst.png`
    #[must_use]
    pub fn output_path(&self, selector: &str, name: &str) -> PathBuf {
        self.result_dir.join(format!("{}_{}_rst.png", selector, name))
    }
}

impl Default for ImageLayout {
    fn default() -> Self {
        Self::new(DEFAULT_IMAGE_DIR, DEFAULT_RESULT_DIR)
    }
}

/// Parse `R,G,B` with each component in 0-1
///
/// # Errors
/// - Not exactly three comma-separated numbers
/// - A component outside 0-1
pub fn parse_background_color(value: &str) -> std::result::Result<[f32; 3], String> {
    let parts: Vec<&str> = value.split(',').map(str::trim).collect();
    let [r, g, b] = parts.as_slice() else {
        return Err(format!("expected R,G,B but got '{}'", value));
    };

    let mut color = [0.0f32; 3];
    for (slot, part) in color.iter_mut().zip([r, g, b]) {
        let component: f32 = part
            .parse()
            .map_err(|_| format!("'{}' is not a number", part))?;
        if !(0.0..=1.0).contains(&component) {
            return Err(format!("component {} is outside 0-1", component));
        }
        *slot = component;
    }
    Ok(color)
}

/// Convert CLI arguments to a validated `RemovalConfig`
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Config file values first, then flag overrides
    pub(crate) fn from_cli(cli: &Cli) -> Result<RemovalConfig> {
        let base = match &cli.config {
            Some(path) => RemovalConfig::from_json_file(path)
                .with_context(|| format!("Failed to load config file {}", path.display()))?,
            None => RemovalConfig::default(),
        };

        let mut builder = RemovalConfigBuilder::from_config(base);
        if let Some(color) = cli.background_color {
            builder = builder.background_color(color);
        }
        if let Some(backend) = cli.backend {
            builder = builder.backend(backend);
        }
        if cli.debug_dir.is_some() {
            builder = builder.debug(true);
        }
        builder.build().context("Invalid configuration")
    }
}
