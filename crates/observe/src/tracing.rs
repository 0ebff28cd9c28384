//! `tracing-subscriber` setup. Every binary calls [`initialize`] once, as
//! early in `main` as possible, before anything else can emit a log line.

use tracing_subscriber::{
    EnvFilter,
    filter::LevelFilter,
    fmt::{self, writer::MakeWriterExt},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Initializes the global `tracing` subscriber.
///
/// `env_filter` follows the usual `tracing_subscriber::EnvFilter` directive
/// syntax (e.g. `"dispatcher=debug,hot_state=info"`) and is overridden by the
/// `RUST_LOG` environment variable when set. Events at or above
/// `stderr_threshold` are written to stderr so they survive stdout being
/// piped somewhere with different buffering; everything else goes to
/// stdout. When `json` is set, events are emitted as newline-delimited JSON
/// instead of the human-readable format.
pub fn initialize(env_filter: &str, stderr_threshold: LevelFilter, json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(env_filter));

    let stdout_layer = fmt::layer().with_writer(std::io::stdout.with_max_level(
        downgrade(stderr_threshold),
    ));
    let stderr_layer = fmt::layer().with_writer(std::io::stderr.with_min_level(stderr_threshold));

    let registry = tracing_subscriber::registry().with(filter);
    let result = if json {
        registry
            .with(stdout_layer.json())
            .with(stderr_layer.json())
            .try_init()
    } else {
        registry.with(stdout_layer).with(stderr_layer).try_init()
    };

    if let Err(err) = result {
        eprintln!(
            "failed to initialize tracing subscriber, a previous one may already be set: {err}"
        );
    }
}

/// The level immediately below `level`, so the stdout writer's range
/// excludes whatever the stderr writer already handles.
fn downgrade(level: LevelFilter) -> LevelFilter {
    match level {
        LevelFilter::OFF => LevelFilter::OFF,
        LevelFilter::ERROR => LevelFilter::OFF,
        LevelFilter::WARN => LevelFilter::ERROR,
        LevelFilter::INFO => LevelFilter::WARN,
        LevelFilter::DEBUG => LevelFilter::INFO,
        LevelFilter::TRACE => LevelFilter::DEBUG,
    }
}
