//! Logger builder implementation

use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};

use crate::config::{Config, Format};
use crate::{LogError, Result};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Logger builder
#[derive(Debug)]
pub struct LoggerBuilder {
    config: Config,
}

/// Guard that keeps the logger alive
///
/// Holds the root span carrying the configured global fields.
#[derive(Debug)]
pub struct LoggerGuard {
    _root_span: Option<tracing::span::EnteredSpan>,
}

impl LoggerGuard {
    pub(crate) fn noop() -> Self {
        Self { _root_span: None }
    }
}

impl LoggerBuilder {
    /// Create builder from config
    pub fn from_config(config: Config) -> Self {
        Self { config }
    }

    /// Build and install the global subscriber
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Filter string cannot be parsed
    /// - A global subscriber is already installed
    pub fn build(self) -> Result<LoggerGuard> {
        let filter = EnvFilter::try_new(&self.config.level).map_err(|e| LogError::Filter {
            filter: self.config.level.clone(),
            reason: e.to_string(),
        })?;

        Registry::default()
            .with(fmt_layer(&self.config).with_filter(filter))
            .try_init()
            .map_err(|_| LogError::AlreadyInitialized)?;

        let fields = &self.config.fields;
        let root_span = (!fields.is_empty()).then(|| {
            tracing::info_span!(
                "app",
                service = fields.service.as_deref().unwrap_or(""),
                env = fields.env.as_deref().unwrap_or(""),
                version = fields.version.as_deref().unwrap_or(env!("CARGO_PKG_VERSION"))
            )
            .entered()
        });

        Ok(LoggerGuard {
            _root_span: root_span,
        })
    }
}

fn fmt_layer(config: &Config) -> BoxedLayer {
    let display = &config.display;
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(display.colors)
        .with_target(display.target)
        .with_file(display.source)
        .with_line_number(display.source)
        .with_thread_ids(display.thread_ids)
        .with_thread_names(display.thread_names);

    match (config.format, display.time) {
        (Format::Pretty, true) => layer.pretty().boxed(),
        (Format::Pretty, false) => layer.pretty().without_time().boxed(),
        (Format::Compact, true) => layer.compact().boxed(),
        (Format::Compact, false) => layer.compact().without_time().boxed(),
        (Format::Json, time) => {
            let layer = layer
                .json()
                .with_current_span(true)
                .with_span_list(display.span_list)
                .flatten_event(display.flatten);
            if time {
                layer.boxed()
            } else {
                layer.without_time().boxed()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_filter_is_rejected_before_install() {
        let config = Config {
            level: "codenode=notalevel".to_string(),
            ..Config::test()
        };
        let error = LoggerBuilder::from_config(config).build().unwrap_err();
        assert!(matches!(error, LogError::Filter { .. }), "{error}");
    }

    #[test]
    fn every_format_builds_a_layer() {
        for format in [Format::Pretty, Format::Compact, Format::Json] {
            for time in [true, false] {
                let mut config = Config::test();
                config.format = format;
                config.display.time = time;
                let _layer = fmt_layer(&config);
            }
        }
    }
}
