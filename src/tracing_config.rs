//! Tracing subscriber setup for the command-line frontend
//!
//! The library only emits events and spans; the binary decides where they
//! go. All log output is written to stderr because stdout carries the fixed
//! status messages scripts match on.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Log line format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TracingFormat {
    /// Coloured compact output (default for interactive use)
    Console,
    /// Plain compact output for CI logs
    Compact,
    /// JSON lines
    #[cfg(feature = "tracing-json")]
    Json,
}

impl TracingFormat {
    /// Compact output under CI, coloured console output otherwise
    #[must_use]
    pub fn detect() -> Self {
        if std::env::var_os("CI").is_some() {
            Self::Compact
        } else {
            Self::Console
        }
    }
}

impl std::str::FromStr for TracingFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "console" => Ok(Self::Console),
            "compact" => Ok(Self::Compact),
            #[cfg(feature = "tracing-json")]
            "json" => Ok(Self::Json),
            #[cfg(not(feature = "tracing-json"))]
            "json" => Err("json log format requires the tracing-json feature".to_string()),
            other => Err(format!("unknown log format '{}' (console, compact, json)", other)),
        }
    }
}

/// Tracing configuration builder
#[derive(Debug)]
pub struct TracingConfig {
    /// Verbosity level from repeated `-v` flags
    pub verbosity: u8,
    /// Output format
    pub format: TracingFormat,
    /// Session ID for correlation
    pub session_id: Option<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            verbosity: 0,
            format: TracingFormat::Console,
            session_id: None,
        }
    }
}

impl TracingConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: TracingFormat) -> Self {
        self.format = format;
        self
    }

    #[must_use]
    pub fn with_session_id<S: Into<String>>(mut self, session_id: S) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Filter directive for the configured verbosity
    #[must_use]
    pub fn verbosity_to_filter(&self) -> &'static str {
        match self.verbosity {
            0 => "warn",  // quiet by default: stdout belongs to status lines
            1 => "info",  // -v: one line per processed image
            2 => "debug", // -vv: per-stage details
            _ => "trace", // -vvv+: everything
        }
    }

    fn filter(&self) -> anyhow::Result<EnvFilter> {
        if self.verbosity == 0 {
            if let Ok(from_env) = EnvFilter::try_from_default_env() {
                return Ok(from_env);
            }
        }
        Ok(EnvFilter::try_new(self.verbosity_to_filter())?)
    }

    /// Install the global subscriber
    ///
    /// # Errors
    /// - Invalid `RUST_LOG` directives
    /// - A global subscriber is already installed
    pub fn init(self) -> anyhow::Result<()> {
        let registry = Registry::default().with(self.filter()?);

        match self.format {
            TracingFormat::Console => {
                let layer = fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(true)
                    .with_target(false)
                    .with_level(true)
                    .compact();
                registry.with(layer).try_init()?;
            },
            TracingFormat::Compact => {
                let layer = fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(false)
                    .with_target(false)
                    .compact();
                registry.with(layer).try_init()?;
            },
            #[cfg(feature = "tracing-json")]
            TracingFormat::Json => {
                let layer = fmt::layer()
                    .with_writer(std::io::stderr)
                    .json()
                    .with_current_span(true)
                    .with_span_list(true);
                registry.with(layer).try_init()?;
            },
        }

        if let Some(session_id) = &self.session_id {
            tracing::debug!(session_id = %session_id, "Background removal session started");
        }
        Ok(())
    }
}

/// Initialize tracing with CLI defaults; returns the new session id
///
/// Without an explicit `format` the output style is picked by [`TracingFormat::detect`].
///
/// # Errors
/// - See [`TracingConfig::init`]
pub fn init_cli_tracing(verbosity: u8, format: Option<TracingFormat>) -> anyhow::Result<String> {
    let format = format.unwrap_or_else(TracingFormat::detect);
    let session_id = uuid::Uuid::new_v4().to_string();
    TracingConfig::new()
        .with_verbosity(verbosity)
        .with_format(format)
        .with_session_id(session_id.clone())
        .init()?;
    Ok(session_id)
}

/// Span helpers for CLI operations
pub mod spans {
    use tracing::{Level, Span};

    /// Span covering one CLI invocation
    pub fn session(session_id: &str, selector: &str, name: &str) -> Span {
        tracing::span!(
            Level::INFO,
            "session",
            session_id = %session_id,
            selector = %selector,
            name = %name
        )
    }

    /// Span covering one input file
    pub fn file_processing(input: &std::path::Path, output: &std::path::Path) -> Span {
        tracing::span!(
            Level::INFO,
            "file_processing",
            input = %input.display(),
            output = %output.display()
        )
    }
}
