use annie_core::config::LoggingConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Filter from `ANNIE_LOG`, then `RUST_LOG`, then the configured level.
/// `--verbose` raises the fallback to `debug`.
fn build_filter(cfg: &LoggingConfig, verbose: bool) -> EnvFilter {
    if let Ok(directive) = std::env::var("ANNIE_LOG") {
        if let Ok(filter) = EnvFilter::try_new(&directive) {
            return filter;
        }
    }
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    let level = if verbose { "debug" } else { cfg.level.as_str() };
    EnvFilter::try_new(format!("{level},hyper=warn,reqwest=warn,rustyline=warn"))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber. Logs go to stderr so chat output on stdout
/// stays clean. The returned guard flushes the file sink and must be held
/// until exit.
pub fn init(cfg: &LoggingConfig, format: &str, verbose: bool) -> Option<WorkerGuard> {
    let filter = build_filter(cfg, verbose);
    let json = format.eq_ignore_ascii_case("json");

    let console = if json {
        fmt::layer().json().with_writer(std::io::stderr).boxed()
    } else {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .boxed()
    };

    let (file_layer, guard) = match &cfg.file_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "annie.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = if json {
                fmt::layer().json().with_writer(writer).boxed()
            } else {
                fmt::layer().with_ansi(false).with_writer(writer).boxed()
            };
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file_layer)
        .try_init();
    guard
}
