//! Logging utilities and configuration for term-outlier.
//!
//! Detectors log through `tracing`. Per-element decisions are frequent, so the
//! noisy categories (cluster formation/dissolution, window slides) are gated by
//! [`LogConfig`] flags in addition to the subscriber's level filter.

use tracing::Level;

/// Which detector events are emitted at all.
///
/// Checked before the subscriber's filter, so disabled categories cost a
/// branch per element and nothing more.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Most verbose level used for per-element decisions
    pub base_level: Level,
    /// Whether to log micro-cluster formation and dissolution
    pub log_cluster_events: bool,
    /// Whether to log window slides and expirations
    pub log_window_ops: bool,
    /// Whether to log summary counters on flush
    pub log_stats: bool,
    /// Maximum length for logged field values (coordinate vectors can be long)
    pub max_field_length: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            base_level: Level::INFO,
            log_cluster_events: false,
            log_window_ops: true,
            log_stats: true,
            max_field_length: 256,
        }
    }
}

impl LogConfig {
    /// Everything, with long coordinate fields.
    pub fn verbose() -> Self {
        Self {
            base_level: Level::DEBUG,
            log_cluster_events: true,
            log_window_ops: true,
            log_stats: true,
            max_field_length: 1024,
        }
    }

    /// Warnings and errors only.
    pub fn production() -> Self {
        Self {
            base_level: Level::WARN,
            log_cluster_events: false,
            log_window_ops: false,
            log_stats: false,
            max_field_length: 128,
        }
    }

    /// Slides and flush summaries, no per-element events.
    pub fn balanced() -> Self {
        Self::default()
    }
}

/// Per-element debug event, skipped entirely unless `base_level` admits debug.
#[macro_export]
macro_rules! perf_debug {
    ($config:expr, $($arg:tt)*) => {
        if $config.base_level >= tracing::Level::DEBUG {
            tracing::debug!($($arg)*);
        }
    };
}

/// Cluster formation and dissolution, gated by `log_cluster_events`.
#[macro_export]
macro_rules! log_cluster_event {
    ($config:expr, $($arg:tt)*) => {
        if $config.log_cluster_events {
            tracing::debug!($($arg)*);
        }
    };
}

/// Slides and expirations, gated by `log_window_ops`.
#[macro_export]
macro_rules! log_window_op {
    ($config:expr, $($arg:tt)*) => {
        if $config.log_window_ops {
            tracing::debug!($($arg)*);
        }
    };
}

/// Cuts `value` to at most `max_length` bytes on a char boundary.
pub fn truncate_field(value: &str, max_length: usize) -> String {
    if value.len() <= max_length {
        return value.to_string();
    }
    let cut = (0..=max_length)
        .rev()
        .find(|&i| value.is_char_boundary(i))
        .unwrap_or(0);
    format!("{}...(truncated)", &value[..cut])
}

/// Formats a coordinate vector for log output, respecting `max_field_length`.
pub fn format_coords(coords: &[f64], max_length: usize) -> String {
    truncate_field(&format!("{coords:?}"), max_length)
}

/// Installing a `tracing` subscriber for binaries, demos and benchmarks.
///
/// The library itself never installs a subscriber.
pub mod setup {
    use tracing::Level;

    /// Line format of the fmt layer.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum LogFormat {
        /// Multi-field human-readable lines
        Full,
        /// One short line per event
        Compact,
        /// Newline-delimited JSON
        Json,
    }

    /// Subscriber configuration.
    #[derive(Debug, Clone)]
    pub struct LoggingConfig {
        /// Level for everything outside this crate
        pub level: Level,
        /// Level for `term_outlier` targets
        pub detector_level: Level,
        pub format: LogFormat,
        /// Extra `EnvFilter` directives, e.g. `term_outlier::engine::mcod=trace`
        pub directives: Vec<String>,
    }

    impl Default for LoggingConfig {
        fn default() -> Self {
            Self {
                level: Level::INFO,
                detector_level: Level::INFO,
                format: LogFormat::Compact,
                directives: Vec::new(),
            }
        }
    }

    impl LoggingConfig {
        /// JSON lines, detector events at `info`, everything else at `warn`.
        pub fn production() -> Self {
            Self {
                level: Level::WARN,
                format: LogFormat::Json,
                ..Self::default()
            }
        }

        /// Full format with per-element detector decisions.
        pub fn development() -> Self {
            Self {
                level: Level::DEBUG,
                detector_level: Level::DEBUG,
                format: LogFormat::Full,
                directives: Vec::new(),
            }
        }

        pub fn with_level(mut self, level: Level) -> Self {
            self.level = level;
            self
        }

        pub fn with_detector_level(mut self, level: Level) -> Self {
            self.detector_level = level;
            self
        }

        pub fn with_format(mut self, format: LogFormat) -> Self {
            self.format = format;
            self
        }

        /// Appends a raw `EnvFilter` directive.
        pub fn with_directive(mut self, directive: impl Into<String>) -> Self {
            self.directives.push(directive.into());
            self
        }

        /// Filter string handed to `EnvFilter` when `RUST_LOG` is unset.
        pub fn env_filter(&self) -> String {
            let mut parts = vec![
                self.level.as_str().to_lowercase(),
                format!("term_outlier={}", self.detector_level.as_str().to_lowercase()),
            ];
            parts.extend(self.directives.iter().cloned());
            parts.join(",")
        }
    }

    /// Installs a global fmt subscriber filtered by `RUST_LOG`, or by
    /// [`LoggingConfig::env_filter`] when the variable is unset.
    ///
    /// Fails if a global subscriber is already installed.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use term_outlier::logging::setup::{init_logging, LogFormat, LoggingConfig};
    ///
    /// let config = LoggingConfig::development()
    ///     .with_format(LogFormat::Json)
    ///     .with_directive("term_outlier::events=trace");
    /// init_logging(config).unwrap();
    /// ```
    pub fn init_logging(config: LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

        let filter = match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => EnvFilter::try_new(config.env_filter())?,
        };
        let layer = match config.format {
            LogFormat::Full => tracing_subscriber::fmt::layer().boxed(),
            LogFormat::Compact => tracing_subscriber::fmt::layer().compact().boxed(),
            LogFormat::Json => tracing_subscriber::fmt::layer().json().boxed(),
        };

        tracing_subscriber::registry().with(filter).with(layer).try_init()?;
        Ok(())
    }
}
