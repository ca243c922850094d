use tracing_subscriber::{
    EnvFilter, Layer, Registry, layer::SubscriberExt, util::SubscriberInitExt,
};

use crate::config::{LogFormat, LogLevel, LoggingConfig, ObservabilityConfig};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Initialize the global tracing subscriber.
///
/// Fails if a subscriber has already been installed for this process.
pub fn init_tracing(config: &ObservabilityConfig) -> Result<(), TracingError> {
    let logging = &config.logging;
    let filter = build_env_filter(logging);

    tracing_subscriber::registry()
        .with(fmt_layer(logging).with_filter(filter))
        .try_init()
        .map_err(|e| TracingError::Init(e.to_string()))
}

fn fmt_layer(logging: &LoggingConfig) -> BoxedLayer {
    let base = tracing_subscriber::fmt::layer()
        .with_file(logging.file_line)
        .with_line_number(logging.file_line);

    match (&logging.format, logging.timestamps) {
        (LogFormat::Pretty, true) => base.pretty().with_target(true).boxed(),
        (LogFormat::Pretty, false) => base.pretty().with_target(true).without_time().boxed(),
        (LogFormat::Compact, true) => base.compact().with_target(true).boxed(),
        (LogFormat::Compact, false) => base.compact().with_target(true).without_time().boxed(),
        (LogFormat::Json, true) => base
            .json()
            .with_current_span(logging.include_spans)
            .boxed(),
        (LogFormat::Json, false) => base
            .json()
            .with_current_span(logging.include_spans)
            .without_time()
            .boxed(),
    }
}

fn build_env_filter(config: &LoggingConfig) -> EnvFilter {
    let base_level = level_directive(&config.level);

    if let Ok(env_filter) = std::env::var("RUST_LOG") {
        EnvFilter::try_new(env_filter).unwrap_or_else(|_| EnvFilter::new(base_level))
    } else if let Some(filter) = &config.filter {
        let combined = format!("{},{}", base_level, filter);
        EnvFilter::try_new(combined).unwrap_or_else(|_| EnvFilter::new(base_level))
    } else {
        // Quiet the noisy transport and pool crates
        EnvFilter::new(format!(
            "{},hyper=warn,h2=warn,tower=info,sqlx=warn",
            base_level
        ))
    }
}

fn level_directive(level: &LogLevel) -> &'static str {
    match level {
        LogLevel::Trace => "trace",
        LogLevel::Debug => "debug",
        LogLevel::Info => "info",
        LogLevel::Warn => "warn",
        LogLevel::Error => "error",
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TracingError {
    #[error("Failed to initialize tracing: {0}")]
    Init(String),
}
