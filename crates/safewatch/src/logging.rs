//! Tracing setup for the `safewatch` binary.
//!
//! Logs go to stderr so command output on stdout stays machine-readable.
//! `RUST_LOG`, when set, replaces the directives derived from the CLI flags.

use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Verbosity level for logging output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    /// Errors only.
    Quiet,
    /// Lifecycle events (info and above).
    #[default]
    Normal,
    /// Store and dispatch detail (debug and above).
    Verbose,
    /// Everything.
    Trace,
}

impl Verbosity {
    /// Derive the verbosity from `-v` count and `-q`; quiet wins.
    #[must_use]
    pub fn from_flags(verbose: u8, quiet: bool) -> Self {
        match (quiet, verbose) {
            (true, _) => Self::Quiet,
            (false, 0) => Self::Normal,
            (false, 1) => Self::Verbose,
            (false, _) => Self::Trace,
        }
    }

    /// The most detailed level emitted for this crate.
    #[must_use]
    pub fn level(self) -> Level {
        match self {
            Self::Quiet => Level::ERROR,
            Self::Normal => Level::INFO,
            Self::Verbose => Level::DEBUG,
            Self::Trace => Level::TRACE,
        }
    }
}

/// HTTP stack crates pulled in by the Twilio client; capped at `warn`.
const NOISY_TARGETS: &[&str] = &["hyper", "hyper_util", "reqwest", "rustls"];

/// Filter directives used when `RUST_LOG` is not set.
#[must_use]
pub fn default_directives(verbosity: Verbosity) -> String {
    let mut directives = format!("safewatch={}", verbosity.level());
    for target in NOISY_TARGETS {
        directives.push(',');
        directives.push_str(target);
        directives.push_str("=warn");
    }
    directives
}

/// Install the global subscriber.
///
/// Call once at startup; later calls are ignored.
///
/// # Examples
///
/// ```no_run
/// use safewatch::{init_logging, logging::Verbosity};
///
/// init_logging(Verbosity::from_flags(1, false));
/// ```
pub fn init_logging(verbosity: Verbosity) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(verbosity)));

    let subscriber = tracing_subscriber::registry().with(env_filter).with(
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false),
    );

    let _ = subscriber.try_init();
}

/// Initialize logging for tests: warnings and errors, captured per test.
#[cfg(test)]
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("warn")
        .with_test_writer()
        .try_init();
}
