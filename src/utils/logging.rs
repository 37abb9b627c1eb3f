use std::fs;
use std::path::Path;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

use crate::config::CONFIG;
use crate::utils::timing::TIMING_TARGET;

const LOGS_DIR: &str = "logs";

/// Flush guards for the background log writers; keep alive for the whole run.
pub struct LoggingGuards {
    _guards: Vec<WorkerGuard>,
}

fn parse_log_level(value: &str) -> LevelFilter {
    match value.trim().to_lowercase().as_str() {
        "trace" => LevelFilter::TRACE,
        "debug" => LevelFilter::DEBUG,
        "info" => LevelFilter::INFO,
        "warn" | "warning" => LevelFilter::WARN,
        "error" => LevelFilter::ERROR,
        "off" => LevelFilter::OFF,
        _ => LevelFilter::INFO,
    }
}

/// Application events at the configured level, with noisy HTTP crates muted
/// and timing events routed elsewhere.
fn application_filter(level: LevelFilter) -> Targets {
    Targets::new()
        .with_default(level)
        .with_target(TIMING_TARGET, LevelFilter::OFF)
        .with_target("hyper", LevelFilter::WARN)
        .with_target("hyper_util", LevelFilter::WARN)
        .with_target("reqwest", LevelFilter::WARN)
        .with_target("teloxide", LevelFilter::WARN)
}

fn timing_filter() -> Targets {
    Targets::new()
        .with_default(LevelFilter::OFF)
        .with_target(TIMING_TARGET, LevelFilter::INFO)
}

fn daily_writer(logs_dir: &Path, file_name: &str, guards: &mut Vec<WorkerGuard>) -> NonBlocking {
    let appender = tracing_appender::rolling::daily(logs_dir, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    guards.push(guard);
    writer
}

/// Installs the global subscriber: stdout plus daily-rolled text and JSON
/// files, with command and model timings kept in their own files.
pub fn init_logging() -> LoggingGuards {
    let logs_dir = Path::new(LOGS_DIR);
    if let Err(err) = fs::create_dir_all(logs_dir) {
        eprintln!("Failed to create logs directory: {err}");
    }

    let mut guards = Vec::with_capacity(4);
    let app_filter = application_filter(parse_log_level(&CONFIG.log_level));

    let layers = vec![
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stdout)
            .with_filter(app_filter.clone())
            .boxed(),
        tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(daily_writer(logs_dir, "designer.log", &mut guards))
            .with_filter(app_filter.clone())
            .boxed(),
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(daily_writer(logs_dir, "designer.jsonl", &mut guards))
            .with_filter(app_filter)
            .boxed(),
        tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(daily_writer(logs_dir, "timing.log", &mut guards))
            .with_filter(timing_filter())
            .boxed(),
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(daily_writer(logs_dir, "timing.jsonl", &mut guards))
            .with_filter(timing_filter())
            .boxed(),
    ];

    tracing_subscriber::registry().with(layers).init();

    LoggingGuards { _guards: guards }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_levels_default_to_info() {
        assert_eq!(parse_log_level("WARNING"), LevelFilter::WARN);
        assert_eq!(parse_log_level(" debug "), LevelFilter::DEBUG);
        assert_eq!(parse_log_level("chatty"), LevelFilter::INFO);
    }

    #[test]
    fn timing_events_stay_out_of_application_logs() {
        use tracing::Level;

        let app = application_filter(LevelFilter::DEBUG);
        assert!(!app.would_enable(TIMING_TARGET, &Level::INFO));
        assert!(app.would_enable("nursery_designer_bot::state", &Level::DEBUG));
        assert!(!app.would_enable("reqwest::connect", &Level::INFO));
        assert!(timing_filter().would_enable(TIMING_TARGET, &Level::INFO));
    }
}
