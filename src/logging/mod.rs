/*!
 * Logging Module
 * Subscriber setup and HTTP request logging
 */
pub mod middleware;

use std::io;
use tracing::Subscriber;
use tracing_appender::{
    non_blocking,
    non_blocking::{NonBlocking, WorkerGuard},
    rolling,
};
use tracing_subscriber::{
    filter::LevelFilter, fmt, layer::SubscriberExt, registry::LookupSpan,
    util::SubscriberInitExt, EnvFilter, Layer,
};

const LOG_DIR: &str = "logs";

/// Writer guards for the non-blocking appenders. Keep alive until shutdown.
#[must_use = "dropping the guards stops the log writers"]
pub struct LogGuards {
    _guards: Vec<WorkerGuard>,
}

/// Filter used when RUST_LOG is unset.
fn default_filter(log_level: &str) -> String {
    format!("folio_cms={},tower_http=info,axum=info,sqlx=warn", log_level)
}

/// JSON layer that only passes errors. Generic over the stack it joins, so
/// each branch of [`init`] gets its own instance.
fn error_file_layer<S>(writer: NonBlocking) -> impl Layer<S> + Send + Sync + 'static
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fmt::layer()
        .json()
        .with_writer(writer)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_filter(LevelFilter::ERROR)
}

/// Initialize the logging system
pub fn init() -> LogGuards {
    let environment = std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());
    let is_production = environment == "production";

    if let Err(e) = std::fs::create_dir_all(LOG_DIR) {
        eprintln!("could not create {}: {}", LOG_DIR, e);
    }

    let (file_writer, file_guard) = non_blocking(rolling::daily(LOG_DIR, "app.log"));
    let (error_writer, error_guard) = non_blocking(rolling::daily(LOG_DIR, "error.log"));
    let (console_writer, console_guard) = non_blocking(io::stdout());

    let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| {
        if is_production { "info" } else { "debug" }.to_string()
    });
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(&log_level)));

    let subscriber = tracing_subscriber::registry().with(env_filter);

    if is_production {
        let file_layer = fmt::layer()
            .json()
            .with_writer(file_writer)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true);

        let console_layer = fmt::layer()
            .json()
            .with_writer(console_writer)
            .with_target(false);

        subscriber
            .with(file_layer)
            .with(error_file_layer(error_writer))
            .with(console_layer)
            .init();
    } else {
        let file_layer = fmt::layer()
            .with_writer(file_writer)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .with_ansi(false);

        let console_layer = fmt::layer()
            .with_writer(console_writer)
            .with_target(true)
            .compact();

        subscriber
            .with(file_layer)
            .with(error_file_layer(error_writer))
            .with(console_layer)
            .init();
    }

    tracing::info!(environment = %environment, "logging initialized");

    LogGuards {
        _guards: vec![file_guard, error_guard, console_guard],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_layer_joins_json_and_plain_stacks() {
        let (json_writer, _json_guard) = non_blocking(io::sink());
        let (plain_writer, _plain_guard) = non_blocking(io::sink());

        let json = tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(io::sink))
            .with(error_file_layer(json_writer));
        let plain = tracing_subscriber::registry()
            .with(fmt::layer().with_writer(io::sink).with_ansi(false))
            .with(error_file_layer(plain_writer));

        tracing::subscriber::with_default(json, || tracing::error!("json stack"));
        tracing::subscriber::with_default(plain, || tracing::error!("plain stack"));
    }

    #[test]
    fn test_default_filter_targets_crate() {
        let filter = default_filter("debug");
        assert!(filter.starts_with("folio_cms=debug"));
        assert!(EnvFilter::try_new(filter).is_ok());
    }
}
