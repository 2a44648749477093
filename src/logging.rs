//! Logging setup for statusdex.
//!
//! Structured logging through `tracing`. Output goes to stderr so that
//! machine-readable command output on stdout stays clean.
//!
//! # Usage
//!
//! ```rust
//! use statusdex::logging::{init_logging, LogConfig};
//!
//! init_logging(&LogConfig::default());
//! tracing::info!("Application started");
//! ```

use std::time::Instant;

use tracing_subscriber::{
    EnvFilter, Layer, Registry,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum level for statusdex's own events.
    pub level: LogLevel,
    /// Output format for log messages.
    pub format: LogFormat,
    /// Include timestamps in log output.
    pub timestamps: bool,
    /// Include target (module path) in log output.
    pub target: bool,
    /// Include span enter/exit events.
    pub spans: bool,
    /// Enable ANSI colors in output.
    pub colors: bool,
}

/// Log level configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable multi-line format.
    Pretty,
    /// Compact single-line format.
    Compact,
    /// Single-line format with thread and source location.
    Full,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Warn,
            format: LogFormat::Compact,
            timestamps: false,
            target: false,
            spans: false,
            colors: true,
        }
    }
}

impl LogConfig {
    /// Errors only.
    #[must_use]
    pub fn quiet() -> Self {
        Self {
            level: LogLevel::Error,
            ..Self::default()
        }
    }

    /// Debug level with timestamps and targets.
    #[must_use]
    pub fn verbose() -> Self {
        Self {
            level: LogLevel::Debug,
            format: LogFormat::Compact,
            timestamps: true,
            target: true,
            ..Self::default()
        }
    }

    /// Everything, including span events.
    #[must_use]
    pub fn trace() -> Self {
        Self {
            level: LogLevel::Trace,
            format: LogFormat::Full,
            timestamps: true,
            target: true,
            spans: true,
            colors: true,
        }
    }

    /// Pick a preset from CLI flags; `-v` shows progress, `-vv` debug, `-vvv` trace.
    #[must_use]
    pub fn from_flags(quiet: bool, verbose: u8) -> Self {
        match (quiet, verbose) {
            (true, _) => Self::quiet(),
            (false, 0) => Self::default(),
            (false, 1) => Self {
                level: LogLevel::Info,
                ..Self::default()
            },
            (false, 2) => Self::verbose(),
            (false, _) => Self::trace(),
        }
    }

    #[must_use]
    pub const fn with_colors(mut self, colors: bool) -> Self {
        self.colors = colors;
        self
    }

    /// Env-filter directive used when `RUST_LOG` is unset.
    ///
    /// Dependencies stay at `warn` unless tracing everything.
    #[must_use]
    pub fn directive(&self) -> String {
        let own = self.level.to_filter_string();
        if self.level == LogLevel::Trace {
            format!("statusdex={own},tantivy=info")
        } else {
            format!("statusdex={own},tantivy=warn")
        }
    }
}

impl LogLevel {
    /// Convert to env filter directive string.
    const fn to_filter_string(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
            Self::Off => "off",
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "error" | "e" => Ok(Self::Error),
            "warn" | "warning" | "w" => Ok(Self::Warn),
            "info" | "i" => Ok(Self::Info),
            "debug" | "d" => Ok(Self::Debug),
            "trace" | "t" => Ok(Self::Trace),
            "off" | "none" | "quiet" => Ok(Self::Off),
            _ => Err(format!("Invalid log level: {s}")),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" | "p" => Ok(Self::Pretty),
            "compact" | "c" => Ok(Self::Compact),
            "full" | "f" => Ok(Self::Full),
            _ => Err(format!("Invalid log format: {s}")),
        }
    }
}

fn fmt_layer(config: &LogConfig) -> Box<dyn Layer<Registry> + Send + Sync> {
    let span_events = if config.spans {
        FmtSpan::ENTER | FmtSpan::EXIT
    } else {
        FmtSpan::NONE
    };

    let base = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(config.colors)
        .with_target(config.target)
        .with_span_events(span_events);

    match (config.format, config.timestamps) {
        (LogFormat::Pretty, true) => base.pretty().boxed(),
        (LogFormat::Pretty, false) => base.pretty().without_time().boxed(),
        (LogFormat::Compact, true) => base.compact().boxed(),
        (LogFormat::Compact, false) => base.compact().without_time().boxed(),
        (LogFormat::Full, _) => base
            .with_thread_ids(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
    }
}

/// Initialize the logging system with the given configuration.
///
/// `RUST_LOG`, when set, replaces the level from `config`. Only the first
/// call installs a subscriber; later calls are ignored.
pub fn init_logging(config: &LogConfig) {
    let env_filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::new(config.directive())
    };

    tracing_subscriber::registry()
        .with(fmt_layer(config))
        .with(env_filter)
        .try_init()
        .ok();
}

/// Initialize logging for tests (silent).
pub fn init_test_logging() {
    init_logging(&LogConfig {
        level: LogLevel::Off,
        ..LogConfig::default()
    });
}

/// Logs the start and end of a long-running operation.
pub struct OperationGuard {
    name: &'static str,
    start: Instant,
}

impl OperationGuard {
    /// Start tracking an operation.
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        tracing::info!(operation = name, "Starting operation");
        Self {
            name,
            start: Instant::now(),
        }
    }

    /// Time since the operation started.
    #[must_use]
    pub fn elapsed(&self) -> std::time::Duration {
        self.start.elapsed()
    }

    /// Complete the operation, recording how many items it processed.
    pub fn complete(self, items: usize) {
        let duration = self.start.elapsed();
        tracing::info!(
            operation = self.name,
            items,
            duration_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
            "Operation completed"
        );
    }

    /// Mark the operation as failed.
    pub fn fail(self, error: &dyn std::error::Error) {
        let duration = self.start.elapsed();
        tracing::error!(
            operation = self.name,
            duration_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
            error = %error,
            "Operation failed"
        );
    }
}

/// Log a progress update for a long-running operation.
#[macro_export]
macro_rules! log_progress {
    ($current:expr, $total:expr, $($arg:tt)*) => {{
        let total = ($total).max(1);
        tracing::info!(
            current = $current,
            total = $total,
            percent = (($current) as f64 / total as f64 * 100.0) as u32,
            $($arg)*
        );
    }};
}

/// Log a performance metric.
#[macro_export]
macro_rules! log_metric {
    ($name:expr, $value:expr) => {
        tracing::info!(metric = $name, value = $value, "Performance metric");
    };
    ($name:expr, $value:expr, $unit:expr) => {
        tracing::info!(
            metric = $name,
            value = $value,
            unit = $unit,
            "Performance metric"
        );
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_from_str() {
        assert_eq!("error".parse::<LogLevel>().unwrap(), LogLevel::Error);
        assert_eq!("W".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!("debug".parse::<LogLevel>().unwrap(), LogLevel::Debug);
        assert_eq!("none".parse::<LogLevel>().unwrap(), LogLevel::Off);
        assert!("loud".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_log_format_from_str() {
        assert_eq!("pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert_eq!("c".parse::<LogFormat>().unwrap(), LogFormat::Compact);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn flags_pick_presets() {
        assert_eq!(LogConfig::from_flags(true, 3).level, LogLevel::Error);
        assert_eq!(LogConfig::from_flags(false, 0).level, LogLevel::Warn);
        assert_eq!(LogConfig::from_flags(false, 1).level, LogLevel::Info);
        assert_eq!(LogConfig::from_flags(false, 2).level, LogLevel::Debug);
        assert_eq!(LogConfig::from_flags(false, 9).level, LogLevel::Trace);
    }

    #[test]
    fn directive_scopes_dependencies() {
        assert_eq!(
            LogConfig::verbose().directive(),
            "statusdex=debug,tantivy=warn"
        );
        assert_eq!(LogConfig::trace().directive(), "statusdex=trace,tantivy=info");
    }

    #[test]
    fn levels_are_ordered() {
        assert!(LogLevel::Trace > LogLevel::Info);
        assert!(LogLevel::Off < LogLevel::Error);
    }

    #[test]
    fn init_is_idempotent() {
        init_test_logging();
        init_test_logging();
        let guard = OperationGuard::new("test");
        guard.complete(0);
    }
}
