//! Logging setup for the CLI
//!
//! Verbosity comes from the `-v/--verbose` and `--debug` flags unless
//! `RUST_LOG` is set, in which case it wins. Logs go to stderr so that
//! `--json` output on stdout stays machine-readable.

use clap::ValueEnum;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Verbosity level selected by CLI flags
///
/// Levels are ordered: Normal < Verbose < Debug
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum LogLevel {
    /// Run milestones and per-record failures
    #[default]
    Normal,
    /// Every planned and applied action
    Verbose,
    /// Everything, including directory protocol traffic
    Debug,
}

impl LogLevel {
    /// Create a LogLevel from CLI flags; debug takes precedence over verbose
    pub fn from_flags(verbose: bool, debug: bool) -> Self {
        if debug {
            Self::Debug
        } else if verbose {
            Self::Verbose
        } else {
            Self::Normal
        }
    }

    /// Filter directives used when `RUST_LOG` is not set
    pub fn filter(&self) -> &'static str {
        match self {
            Self::Normal => "warn,tierwarden=info",
            Self::Verbose => "info,tierwarden=debug",
            Self::Debug => "debug",
        }
    }
}

/// Log line format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

/// Install the global subscriber.
pub fn init_logging(level: LogLevel, format: LogFormat) {
    let filter_layer = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level.filter()))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    match format {
        LogFormat::Json => {
            let fmt_layer = fmt::layer()
                .json()
                .with_target(true)
                .flatten_event(true)
                .with_writer(std::io::stderr);
            tracing_subscriber::registry()
                .with(filter_layer)
                .with(fmt_layer)
                .init();
        }
        LogFormat::Text => {
            let fmt_layer = fmt::layer()
                .with_target(level >= LogLevel::Verbose)
                .with_writer(std::io::stderr);
            tracing_subscriber::registry()
                .with(filter_layer)
                .with(fmt_layer)
                .init();
        }
    }
}
