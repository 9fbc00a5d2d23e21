//! Tracing initialisation for worker binaries.
//!
//! Call [`init_tracing`] once at program start. Later calls are ignored
//! because the global subscriber can only be set once per process.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Crates whose events follow the requested verbosity. Everything else
/// (reqwest, hyper, rustls) stays at `warn`.
const WORKER_TARGETS: [&str; 3] = ["ews_domain", "ews_steps", "ews_worker"];

/// Filter directives used when `RUST_LOG` is unset.
pub fn default_directives(level: Level) -> String {
    let level = level.as_str().to_ascii_lowercase();
    let mut directives = String::from("warn");
    for target in WORKER_TARGETS {
        directives.push_str(&format!(",{target}={level}"));
    }
    directives
}

/// Initialise the global tracing subscriber.
///
/// * `json`: emit newline-delimited JSON log lines, tagged with the target
///   so build and step events can be told apart downstream.
/// * `level`: verbosity of the worker crates when `RUST_LOG` is not set.
pub fn init_tracing(json: bool, level: Level) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(true).json())
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false))
            .try_init()
            .ok();
    }
}
