//! Log output for the runtime and its adapters.
//!
//! [`ParleyRuntime`](crate::ParleyRuntime) installs a subscriber from the
//! `logging` section when it is built. `RUST_LOG` replaces the configured
//! level; the per-target `filters` still apply on top of it.
//!
//! Every routed event runs inside a `route` span carrying its platform and
//! event type, so span close events show how long an event took to route:
//!
//! ```rust,ignore
//! use parley_runtime::{LoggingBuilder, SpanEvents};
//!
//! LoggingBuilder::new()
//!     .directive("parley_runtime::router=debug")
//!     .span_events(SpanEvents::lifecycle())
//!     .init();
//! ```

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use tracing::Level;
use tracing_appender::rolling::RollingFileAppender;
use tracing_subscriber::filter::{Directive, LevelFilter};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::{self, MakeWriter, format::FmtSpan};
use tracing_subscriber::layer::Layer;
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::Registry;
use tracing_subscriber::util::TryInitError;

use crate::config::{LogFormat, LogOutput, LoggingConfig, SpanEventConfig};

/// Log file name when `file_path` names only a directory.
const FALLBACK_LOG_FILE: &str = "parley.log";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Span events to log, as an [`FmtSpan`] mask.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpanEvents(FmtSpan);

impl SpanEvents {
    pub fn none() -> Self {
        Self(FmtSpan::NONE)
    }

    /// Creation and close. The close line carries the span's busy time.
    pub fn lifecycle() -> Self {
        Self(FmtSpan::NEW | FmtSpan::CLOSE)
    }

    pub fn full() -> Self {
        Self(FmtSpan::FULL)
    }

    /// Returns the mask handed to the fmt layer.
    pub fn mask(&self) -> FmtSpan {
        self.0.clone()
    }
}

impl Default for SpanEvents {
    fn default() -> Self {
        Self::none()
    }
}

impl From<&SpanEventConfig> for SpanEvents {
    fn from(config: &SpanEventConfig) -> Self {
        let flags = [
            (config.new, FmtSpan::NEW),
            (config.enter, FmtSpan::ENTER),
            (config.exit, FmtSpan::EXIT),
            (config.close, FmtSpan::CLOSE),
        ];
        Self(
            flags
                .into_iter()
                .filter(|(on, _)| *on)
                .fold(FmtSpan::NONE, |mask, (_, flag)| mask | flag),
        )
    }
}

/// Installs the subscriber described by the `logging` section.
///
/// A subscriber installed earlier, by a test harness or the embedding
/// binary, is kept.
pub fn init_from_config(config: &LoggingConfig) {
    if LoggingBuilder::from_config(config).try_init().is_err() {
        tracing::debug!("global subscriber already installed; keeping it");
    }
}

/// Builds the global subscriber.
#[derive(Debug)]
pub struct LoggingBuilder {
    level: Level,
    directives: Vec<String>,
    format: LogFormat,
    output: LogOutput,
    file_path: Option<PathBuf>,
    span_events: SpanEvents,
    targets: bool,
    thread_ids: bool,
    locations: bool,
}

impl Default for LoggingBuilder {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            directives: Vec::new(),
            format: LogFormat::Compact,
            output: LogOutput::Stdout,
            file_path: None,
            span_events: SpanEvents::none(),
            targets: true,
            thread_ids: false,
            locations: false,
        }
    }
}

impl LoggingBuilder {
    /// Compact `info` output on stdout, with targets.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &LoggingConfig) -> Self {
        Self {
            level: config.level.to_tracing_level(),
            directives: config
                .filters
                .iter()
                .map(|(target, level)| format!("{target}={level}"))
                .collect(),
            format: config.format,
            output: config.output,
            file_path: config.file_path.clone(),
            span_events: SpanEvents::from(&config.span_events),
            targets: true,
            thread_ids: config.thread_ids,
            locations: config.file_location,
        }
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Adds a filter directive such as `parley_adapter_discord=trace`.
    pub fn directive(mut self, directive: &str) -> Self {
        self.directives.push(directive.to_string());
        self
    }

    pub fn span_events(mut self, events: SpanEvents) -> Self {
        self.span_events = events;
        self
    }

    pub fn format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn output(mut self, output: LogOutput) -> Self {
        self.output = output;
        self
    }

    /// Used when the output is [`LogOutput::File`].
    pub fn file_path(mut self, path: PathBuf) -> Self {
        self.file_path = Some(path);
        self
    }

    pub fn with_target(mut self, enabled: bool) -> Self {
        self.targets = enabled;
        self
    }

    pub fn with_thread_ids(mut self, enabled: bool) -> Self {
        self.thread_ids = enabled;
        self
    }

    /// Adds source file and line to every record.
    pub fn with_file_location(mut self, enabled: bool) -> Self {
        self.locations = enabled;
        self
    }

    fn filter(&self) -> EnvFilter {
        let mut filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::default().add_directive(LevelFilter::from_level(self.level).into())
        });
        for directive in &self.directives {
            match directive.parse::<Directive>() {
                Ok(parsed) => filter = filter.add_directive(parsed),
                Err(e) => eprintln!("skipping log filter {directive:?}: {e}"),
            }
        }
        filter
    }

    fn fmt_layer<W>(&self, writer: W) -> BoxedLayer
    where
        W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
    {
        macro_rules! decorated {
            ($layer:expr) => {
                $layer
                    .with_span_events(self.span_events.mask())
                    .with_target(self.targets)
                    .with_thread_ids(self.thread_ids)
                    .with_file(self.locations)
                    .with_line_number(self.locations)
                    .with_writer(writer)
                    .boxed()
            };
        }

        match self.format {
            LogFormat::Compact => decorated!(fmt::layer().compact()),
            LogFormat::Full => decorated!(fmt::layer()),
            LogFormat::Pretty => decorated!(fmt::layer().pretty()),
            #[cfg(feature = "json-log")]
            LogFormat::Json => fmt::layer()
                .json()
                .with_span_events(self.span_events.mask())
                .with_writer(writer)
                .boxed(),
            #[cfg(not(feature = "json-log"))]
            LogFormat::Json => {
                eprintln!("json logs need the `json-log` feature; writing compact logs");
                decorated!(fmt::layer().compact())
            }
        }
    }

    /// Installs the subscriber, keeping an existing one.
    pub fn init(self) {
        let _ = self.try_init();
    }

    /// Installs the subscriber. Fails if one is already installed.
    pub fn try_init(self) -> Result<(), TryInitError> {
        let layer = match (self.output, self.file_path.as_deref()) {
            (LogOutput::Stdout, _) => self.fmt_layer(std::io::stdout),
            (LogOutput::Stderr, _) => self.fmt_layer(std::io::stderr),
            (LogOutput::File, Some(path)) => self.fmt_layer(file_appender(path)),
            (LogOutput::File, None) => {
                eprintln!("log output is `file` but no file_path is set; writing to stdout");
                self.fmt_layer(std::io::stdout)
            }
        };
        tracing_subscriber::registry()
            .with(layer)
            .with(self.filter())
            .try_init()
    }
}

/// Appends to `path` without rotation.
fn file_appender(path: &Path) -> RollingFileAppender {
    let directory = path.parent().unwrap_or_else(|| Path::new("."));
    let file_name = path.file_name().unwrap_or(OsStr::new(FALLBACK_LOG_FILE));
    tracing_appender::rolling::never(directory, file_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogLevel;

    #[test]
    fn test_builder_follows_logging_section() {
        let mut config = LoggingConfig {
            level: LogLevel::Debug,
            thread_ids: true,
            format: LogFormat::Pretty,
            ..LoggingConfig::default()
        };
        config.span_events.close = true;
        config
            .filters
            .insert("parley_adapter_facebook".into(), LogLevel::Trace);

        let builder = LoggingBuilder::from_config(&config);

        assert_eq!(builder.level, Level::DEBUG);
        assert_eq!(builder.format, LogFormat::Pretty);
        assert!(builder.thread_ids);
        assert!(!builder.locations);
        assert_eq!(builder.span_events, SpanEvents(FmtSpan::CLOSE));
        assert_eq!(builder.directives, vec!["parley_adapter_facebook=trace"]);
    }

    #[test]
    fn test_span_event_masks() {
        let config = SpanEventConfig {
            new: true,
            close: true,
            ..SpanEventConfig::default()
        };
        assert_eq!(SpanEvents::from(&config), SpanEvents::lifecycle());
        assert_eq!(SpanEvents::default().mask(), FmtSpan::NONE);
        assert_eq!(SpanEvents::full().mask(), FmtSpan::FULL);
    }

    #[test]
    fn test_file_appender_writes_under_parent() {
        let dir = std::env::temp_dir().join("parley-logging-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("bot.log");
        let _appender = file_appender(&path);
        assert!(path.exists());
    }
}
