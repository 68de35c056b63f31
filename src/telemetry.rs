//! Logging infrastructure
//!
//! - Console logging (human-readable, or JSON when running under a collector)
//! - Optional JSON file logging (daily-rolled, for analysis)
//!
//! Model calls are logged under the `llm` target with token usage and
//! latency attached, so `RUST_LOG=llm=debug` isolates provider traffic.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Holds the background log writer alive for the process lifetime.
pub struct Telemetry {
    _file_guard: Option<WorkerGuard>,
}

/// Initialize the tracing stack.
///
/// `log_dir` enables a daily-rolled JSON log file alongside the console
/// output; `json_console` switches the console layer itself to JSON.
pub fn init(log_dir: Option<&Path>, json_console: bool) -> anyhow::Result<Telemetry> {
    let make_env_filter = || {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,hyper=warn,reqwest=warn,h2=warn,rustls=warn"))
    };

    let file_guard = if let Some(dir) = log_dir {
        std::fs::create_dir_all(dir)?;
        let file_appender = tracing_appender::rolling::daily(dir, "switchboard.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if json_console {
            let subscriber = tracing_subscriber::registry()
                .with(make_env_filter())
                .with(fmt::layer().json())
                .with(fmt::layer().json().with_writer(non_blocking));
            subscriber.try_init().ok();
        } else {
            let subscriber = tracing_subscriber::registry()
                .with(make_env_filter())
                .with(fmt::layer().with_target(false).compact())
                .with(fmt::layer().json().with_writer(non_blocking));
            subscriber.try_init().ok();
        }
        Some(guard)
    } else {
        if json_console {
            let subscriber = tracing_subscriber::registry()
                .with(make_env_filter())
                .with(fmt::layer().json());
            subscriber.try_init().ok();
        } else {
            let subscriber = tracing_subscriber::registry()
                .with(make_env_filter())
                .with(fmt::layer().with_target(false).compact());
            subscriber.try_init().ok();
        }
        None
    };

    tracing::info!(
        log_dir = ?log_dir.map(|d| d.display().to_string()),
        json_console,
        "telemetry initialized"
    );

    Ok(Telemetry {
        _file_guard: file_guard,
    })
}
