//! Ensures a panic in any tokio task is logged through `tracing` (so it ends
//! up wherever the rest of the service's logs go) and aborts the process
//! instead of silently killing one task. A send dispatcher with a poisoned
//! orchestrator task but a still-running process is worse than a crash loop
//! a supervisor can restart.

use std::panic::PanicHookInfo;

/// Installs the process-wide panic hook. Call once at startup, after
/// [`crate::tracing::initialize`].
pub fn install() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info: &PanicHookInfo| {
        tracing::error!(panic = %format_panic(info), "thread panicked");
        default_hook(info);
        std::process::exit(1);
    }));
}

fn format_panic(info: &PanicHookInfo) -> String {
    let location = info
        .location()
        .map(|location| location.to_string())
        .unwrap_or_else(|| "unknown location".to_string());
    let payload = info
        .payload()
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| info.payload().downcast_ref::<String>().map(String::as_str))
        .unwrap_or("Box<dyn Any>");
    format!("{location}: {payload}")
}
