//! Background removal CLI
//!
//! `removebg <SELECTOR> <NAME>` reads `<image-dir>/<NAME>.jpg`, runs the
//! strategy picked by SELECTOR and writes `<result-dir>/<SELECTOR>_<NAME>_rst.png`.
//! Status lines on stdout are fixed strings that callers match on; logs go
//! to stderr.

use super::config::{parse_background_color, CliConfigBuilder, ImageLayout, DEFAULT_IMAGE_DIR, DEFAULT_RESULT_DIR};
use crate::{
    processor::BackgroundRemovalProcessor,
    services::DirectoryDebugSink,
    tracing_config::{init_cli_tracing, spans, TracingFormat},
    types::{BackendType, SegmentationMethod},
};
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, info};

/// Printed when SELECTOR or NAME is missing
pub const MSG_ARGS_REQUIRED: &str = "ERROR:EnvVarialbleRequired";
/// Printed when the input image does not exist
pub const MSG_IMAGE_NOT_EXISTS: &str = "ERROR:ImageNotExists";
/// Printed for a selector outside 1-4
pub const MSG_UNKNOWN_SELECTOR: &str = "else";

/// Classical background removal for a single image
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "removebg")]
pub struct Cli {
    /// Strategy: 1 contour, 2 interactive cut, 3 marker flooding, 4 background subtraction
    #[arg(value_name = "SELECTOR")]
    pub selector: Option<String>,

    /// Image base name without extension
    #[arg(value_name = "NAME")]
    pub name: Option<String>,

    /// Directory holding `<NAME>.jpg`
    #[arg(long, value_name = "DIR", default_value = DEFAULT_IMAGE_DIR)]
    pub image_dir: PathBuf,

    /// Directory receiving the result PNG
    #[arg(long, value_name = "DIR", default_value = DEFAULT_RESULT_DIR)]
    pub result_dir: PathBuf,

    /// JSON file with pipeline parameters
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Fill colour behind the foreground for strategy 1, as R,G,B in 0-1
    #[arg(long, value_name = "R,G,B", value_parser = parse_background_color)]
    pub background_color: Option<[f32; 3]>,

    /// Write intermediate stage images into this directory
    #[arg(long, value_name = "DIR")]
    pub debug_dir: Option<PathBuf>,

    /// Implementation for strategies 2-4: native or opencv
    #[arg(long, value_name = "BACKEND")]
    pub backend: Option<BackendType>,

    /// Log output format: console, compact or json (default: compact under CI)
    #[arg(long, value_name = "FORMAT")]
    pub log_format: Option<TracingFormat>,

    /// Enable verbose logging (-v: INFO, -vv: DEBUG, -vvv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// How a CLI invocation ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The result was written here
    Written(PathBuf),
    /// SELECTOR or NAME was missing
    MissingArguments,
    /// The input image does not exist
    ImageNotFound(PathBuf),
    /// SELECTOR is not 1-4; nothing was done
    UnknownSelector(String),
}

impl Outcome {
    /// Fixed status line for stdout, if any
    #[must_use]
    pub fn message(&self) -> Option<&'static str> {
        match self {
            Self::Written(_) => None,
            Self::MissingArguments => Some(MSG_ARGS_REQUIRED),
            Self::ImageNotFound(_) => Some(MSG_IMAGE_NOT_EXISTS),
            Self::UnknownSelector(_) => Some(MSG_UNKNOWN_SELECTOR),
        }
    }

    #[must_use]
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::Written(_) | Self::UnknownSelector(_) => ExitCode::SUCCESS,
            Self::MissingArguments | Self::ImageNotFound(_) => ExitCode::FAILURE,
        }
    }
}

/// Main entry point for the CLI application
///
/// # Errors
/// - Tracing cannot be initialised
/// - Any processing failure (invalid configuration, no foreground, write errors)
pub fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let session_id = init_cli_tracing(cli.verbose, cli.log_format).context("Failed to initialize tracing")?;
    let _session = spans::session(
        &session_id,
        cli.selector.as_deref().unwrap_or_default(),
        cli.name.as_deref().unwrap_or_default(),
    )
    .entered();

    let outcome = run(&cli)?;
    if let Some(message) = outcome.message() {
        println!("{}", message);
    }
    Ok(outcome.exit_code())
}

/// Execute one invocation without touching stdout
///
/// # Errors
/// - Invalid configuration file or flags
/// - Processing failures, including a contour strategy that finds no foreground
pub fn run(cli: &Cli) -> Result<Outcome> {
    let (Some(selector), Some(name)) = (cli.selector.as_deref(), cli.name.as_deref()) else {
        return Ok(Outcome::MissingArguments);
    };

    let layout = ImageLayout::from_cli(cli);
    let input = layout.input_path(name);
    if !input.is_file() {
        debug!(input = %input.display(), "Input image missing");
        return Ok(Outcome::ImageNotFound(input));
    }

    let Some(method) = SegmentationMethod::from_selector(selector) else {
        debug!(selector, "Unknown selector");
        return Ok(Outcome::UnknownSelector(selector.to_string()));
    };

    let config = CliConfigBuilder::from_cli(cli)?;
    let output = layout.output_path(selector, name);

    let mut processor = BackgroundRemovalProcessor::new(method, config)
        .context("Failed to create background removal processor")?;
    if let Some(dir) = &cli.debug_dir {
        processor = processor.with_debug_sink(Box::new(DirectoryDebugSink::new(
            dir,
            format!("{}_{}", selector, name),
        )));
    }

    let _file_span = spans::file_processing(&input, &output).entered();
    let result = processor
        .process_file_to(&input, &output)
        .with_context(|| format!("Failed to process {}", input.display()))?;

    info!(%method, summary = %result.timing_summary(), "Background removal complete");
    Ok(Outcome::Written(output))
}
