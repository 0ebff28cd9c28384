//! Everything the `dispatcher` binary reads from the command line / process
//! environment. Connection strings, TTLs and the rest of the tunable stack
//! live in a separate TOML file (see [`crate::config`]) loaded from the path
//! given here, the same split `configs`'s own doc comment calls for.

use {clap::Parser, std::net::SocketAddr, tracing_subscriber::filter::LevelFilter};

#[derive(Debug, Parser)]
pub struct Args {
    /// Path to the TOML file holding broker/hot-store/rate-limit/database
    /// connection details and every dispatcher tuning knob.
    #[clap(long, env, default_value = "dispatcher.toml")]
    pub config: std::path::PathBuf,

    /// `tracing_subscriber::EnvFilter` directive string, overridden by
    /// `RUST_LOG` when set.
    #[clap(long, env, default_value = "info")]
    pub log_filter: String,

    /// Events at or above this level are written to stderr instead of
    /// stdout.
    #[clap(long, env, default_value = "warn")]
    pub log_stderr_threshold: LevelFilter,

    /// Emit logs as newline-delimited JSON instead of the human-readable
    /// format.
    #[clap(long, env)]
    pub log_json: bool,

    /// Address the Prometheus `/metrics` and `/healthz` endpoints bind to.
    #[clap(long, env, default_value = "0.0.0.0:9589")]
    pub metrics_address: SocketAddr,

    /// Address the control API (`POST /batches`, pause/resume, ...) binds
    /// to.
    #[clap(long, env, default_value = "0.0.0.0:8080")]
    pub api_address: SocketAddr,

    /// Upper bound on the whole graceful-shutdown sequence before the
    /// watchdog force-exits the process.
    #[clap(long, env, default_value = "30s", value_parser = humantime::parse_duration)]
    pub shutdown_timeout: std::time::Duration,
}
