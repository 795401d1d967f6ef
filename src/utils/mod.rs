pub mod retry;

use chrono::{SecondsFormat, Utc};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// Source of ledger timestamps.
pub trait Clock: Send + Sync {
    /// Current time as an ISO-8601 UTC string.
    fn now(&self) -> String;
}

/// Source of request and request-group identifiers.
pub trait IdGenerator: Send + Sync {
    fn new_id(&self) -> String;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> String {
        Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn new_id(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

/// Installs the global tracing subscriber. `RUST_LOG` overrides the `info` default.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
