use crate::config::DaemonConfig;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Console logging to stderr. stdout carries IPC responses only.
///
/// `RUST_LOG` wins when set; otherwise this crate logs at `LOG_LEVEL`
/// (default "info") and rusqlite stays at warn.
pub fn init_logging(cfg: &DaemonConfig) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "{}={},rusqlite=warn",
            env!("CARGO_PKG_NAME"),
            cfg.log_level
        ))
    });

    let console_layer = fmt::layer()
        .compact()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_ansi(false)
        .with_filter(env_filter);

    // Ignore a second init.
    let _ = tracing_subscriber::registry().with(console_layer).try_init();
}
