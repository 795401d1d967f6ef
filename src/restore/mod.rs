pub(crate) mod logic;      // Per-file probe / retry / ledger state machine
pub(crate) mod results;    // Folding per-file outcomes into the granule verdict
pub(crate) mod s3_glacier; // Archival storage client (S3 Glacier)

use serde_json::Value;
use std::sync::Arc;
use tracing::info;

use crate::config::{RestoreSettings, load_restore_request_from_json};
use crate::errors::RestoreRequestError;
use crate::ledger::connect::ConnectionInfo;
use crate::ledger::{
    ConnectionResolver, DbParamSpec, PgLedger, RestoreAttempt, SsmParameterStore, StatusQuery,
};
use logic::RestoreOrchestrator;
use results::GranuleResult;
use s3_glacier::S3ArchiveClient;

/// Public entry point for one restore invocation.
///
/// The envelope is validated before any AWS or database call; connection
/// info is resolved once and dropped when the invocation ends.
pub async fn run_restore_flow(invocation: &Value) -> Result<GranuleResult, RestoreRequestError> {
    let request = load_restore_request_from_json(invocation)?;
    let settings = RestoreSettings::from_env();
    info!(
        expire_days = settings.expire_days,
        max_attempts = settings.max_attempts,
        retrieval_tier = %settings.retrieval_tier,
        "Loaded restore settings"
    );

    let sdk_config = s3_glacier::load_sdk_config().await;
    let connection_info = resolve_connection_info(&sdk_config).await?;

    let orchestrator = RestoreOrchestrator::new(
        Arc::new(S3ArchiveClient::new(&sdk_config)),
        Arc::new(PgLedger::new(connection_info)),
        settings,
    );
    orchestrator.restore(&request).await
}

/// Reads recorded attempts back out of the ledger, oldest first.
pub async fn run_status_flow(
    query: &StatusQuery,
) -> Result<Vec<RestoreAttempt>, RestoreRequestError> {
    let sdk_config = s3_glacier::load_sdk_config().await;
    let connection_info = resolve_connection_info(&sdk_config).await?;
    let attempts = PgLedger::new(connection_info).attempts(query).await?;
    info!(rows = attempts.len(), "Read restore attempts from ledger");
    Ok(attempts)
}

async fn resolve_connection_info(
    sdk_config: &aws_config::SdkConfig,
) -> Result<ConnectionInfo, RestoreRequestError> {
    let param_spec = DbParamSpec::from_env()?;
    let resolver = ConnectionResolver::new(Arc::new(SsmParameterStore::new(sdk_config)));
    Ok(resolver.resolve(&param_spec).await?)
}
