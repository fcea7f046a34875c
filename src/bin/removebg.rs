//! removebg CLI
//!
//! Thin wrapper around `removebg::cli::main`.

use std::process::ExitCode;

#[cfg(feature = "cli")]
use removebg::cli;

#[cfg(feature = "cli")]
fn main() -> ExitCode {
    match cli::main() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        },
    }
}

#[cfg(not(feature = "cli"))]
fn main() -> ExitCode {
    eprintln!("CLI feature not enabled. Please rebuild with --features cli");
    ExitCode::FAILURE
}
