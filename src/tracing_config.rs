//! Tracing configuration for structured logging
//!
//! The binary configures the subscriber; the library only emits events and
//! spans. Engine backends log through the `log` crate, which the subscriber
//! picks up through its `log` bridge. Console output goes to stderr so stdout
//! stays free for the JSON run report.

#[cfg(feature = "cli")]
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Configuration for tracing output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TracingFormat {
    /// Human-readable console output with colors (default for CLI)
    Console,
    /// Compact console output without colors, for CI environments
    Compact,
    /// JSON structured logging
    #[cfg(feature = "tracing-json")]
    Json,
}

/// Configuration for tracing output destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TracingOutput {
    /// Output to stderr (default)
    Console,
    /// Output to a file
    #[cfg(feature = "tracing-files")]
    File(std::path::PathBuf),
}

/// Tracing configuration builder
#[derive(Debug)]
pub struct TracingConfig {
    /// Verbosity level (maps to log levels)
    pub verbosity: u8,
    pub format: TracingFormat,
    pub output: TracingOutput,
    /// Session ID for correlation
    pub session_id: Option<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            verbosity: 0,
            format: TracingFormat::Console,
            output: TracingOutput::Console,
            session_id: None,
        }
    }
}

/// Keeps background log writers alive until dropped
#[derive(Debug, Default)]
pub struct TracingGuard {
    #[cfg(feature = "tracing-files")]
    _file_guard: Option<tracing_appender::non_blocking::WorkerGuard>,
}

impl TracingConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set verbosity level (0-2+)
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
    pub fn with_output(mut self, output: TracingOutput) -> Self {
        self.output = output;
        self
    }

    /// Set session ID for correlation
    #[must_use]
    pub fn with_session_id<S: Into<String>>(mut self, session_id: S) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Convert verbosity level to tracing filter string
    #[must_use]
    pub fn verbosity_to_filter(&self) -> &'static str {
        match self.verbosity {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }

    /// Install the global subscriber
    ///
    /// # Errors
    /// - Log file cannot be created
    /// - A global subscriber is already installed
    #[cfg(feature = "cli")]
    pub fn init(self) -> anyhow::Result<TracingGuard> {
        use tracing_subscriber::fmt;

        let filter = EnvFilter::try_new(self.verbosity_to_filter())?;
        let registry = Registry::default().with(filter);
        #[allow(unused_mut)]
        let mut guard = TracingGuard::default();

        match (&self.format, &self.output) {
            (TracingFormat::Console, TracingOutput::Console) => {
                let fmt_layer = fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(true)
                    .with_target(false)
                    .with_level(true)
                    .compact();
                registry.with(fmt_layer).try_init()?;
            },

            (TracingFormat::Compact, TracingOutput::Console) => {
                let fmt_layer = fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(false)
                    .with_target(false)
                    .compact();
                registry.with(fmt_layer).try_init()?;
            },

            #[cfg(feature = "tracing-json")]
            (TracingFormat::Json, TracingOutput::Console) => {
                let fmt_layer = fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_current_span(true)
                    .with_span_list(true);
                registry.with(fmt_layer).try_init()?;
            },

            #[cfg(feature = "tracing-files")]
            (format, TracingOutput::File(path)) => {
                use tracing_appender::{
                    non_blocking,
                    rolling::{RollingFileAppender, Rotation},
                };

                let directory = match path.parent() {
                    Some(parent) if !parent.as_os_str().is_empty() => parent,
                    _ => std::path::Path::new("."),
                };
                let file_name = path
                    .file_name()
                    .map_or_else(|| "image-infer.log".into(), |name| name.to_string_lossy());
                let file_appender = RollingFileAppender::builder()
                    .rotation(Rotation::NEVER)
                    .filename_prefix(file_name)
                    .build(directory)?;
                let (file_writer, file_guard) = non_blocking(file_appender);
                guard._file_guard = Some(file_guard);

                match format {
                    TracingFormat::Console | TracingFormat::Compact => {
                        let fmt_layer = fmt::layer()
                            .with_ansi(false)
                            .with_writer(file_writer)
                            .compact();
                        registry.with(fmt_layer).try_init()?;
                    },
                    #[cfg(feature = "tracing-json")]
                    TracingFormat::Json => {
                        let fmt_layer = fmt::layer()
                            .json()
                            .with_writer(file_writer)
                            .with_current_span(true)
                            .with_span_list(true);
                        registry.with(fmt_layer).try_init()?;
                    },
                }
            },
        }

        if let Some(session_id) = &self.session_id {
            tracing::debug!(session_id = %session_id, "Inference session started");
        }

        Ok(guard)
    }
}

/// Install `config` with a fresh session id
///
/// # Errors
/// - Subscriber installation failures, see [`TracingConfig::init`]
#[cfg(feature = "cli")]
pub fn init_cli_tracing(config: TracingConfig) -> anyhow::Result<TracingGuard> {
    let session_id = uuid::Uuid::new_v4().to_string();
    config.with_session_id(session_id).init()
}

/// Span creation helpers for the pipeline stages
pub mod spans {
    use tracing::{Level, Span};

    /// Span covering model load and delegate attachment
    pub fn model_loading(model_path: &std::path::Path, provider: &str) -> Span {
        tracing::span!(
            Level::INFO,
            "model_loading",
            model_path = %model_path.display(),
            provider = %provider
        )
    }

    /// Span covering decode or encode of one image file
    pub fn file_processing(file_path: &std::path::Path, operation: &str) -> Span {
        tracing::span!(
            Level::INFO,
            "file_processing",
            file_path = %file_path.display(),
            operation = %operation
        )
    }

    /// Span covering one forward pass
    pub fn inference(backend: &str, dimensions: (usize, usize)) -> Span {
        tracing::span!(
            Level::DEBUG,
            "inference",
            backend = %backend,
            width = %dimensions.0,
            height = %dimensions.1
        )
    }
}

/// Event helpers for common logging patterns
pub mod events {
    use tracing::{debug, error};

    /// Log an error with the stage it came from
    pub fn error_with_context(error: &dyn std::fmt::Display, context: &str) {
        error!(error = %error, context = %context, "Operation failed");
    }

    /// Log a timing measurement
    pub fn performance_metric(operation: &str, duration_ms: f64) {
        debug!(operation = %operation, duration_ms = %format!("{duration_ms:.2}"), "Performance metric");
    }
}
