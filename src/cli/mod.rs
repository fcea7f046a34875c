//! Command-line frontend
//!
//! This module is only available when the "cli" feature is enabled.

mod config;
#[path = "main.rs"]
mod main_impl;

pub use config::{parse_background_color, ImageLayout, DEFAULT_IMAGE_DIR, DEFAULT_RESULT_DIR};
pub use main_impl::{
    main, run, Cli, Outcome, MSG_ARGS_REQUIRED, MSG_IMAGE_NOT_EXISTS, MSG_UNKNOWN_SELECTOR,
};
