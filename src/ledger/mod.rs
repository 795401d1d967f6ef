pub(crate) mod connect;   // Connection parameter resolution (env / parameter store)
pub(crate) mod database;  // Single-statement execution on short-lived connections
pub(crate) mod requests;  // Append-only restore attempt log

pub use connect::{ConnectionResolver, DbParamSpec, SsmParameterStore};
pub use requests::{LedgerClient, PgLedger, RequestStatus, RestoreAttempt, StatusQuery};
