// restoretool/src/ledger/requests.rs
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::errors::DbError;
use crate::ledger::connect::ConnectionInfo;
use crate::ledger::database::{self, RowMap};

pub const JOB_TYPE_RESTORE: &str = "restore";

// Rows are only ever inserted; there is no update or delete path.
const INSERT_REQUEST_SQL: &str = r#"
    INSERT INTO request_status (
        request_id, request_group_id, granule_id, file_key, job_type,
        archive_bucket, status, timestamp, error_message)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8::timestamptz, $9)
"#;

const ATTEMPTS_FOR_GROUP_SQL: &str = r#"
    SELECT request_id, request_group_id, granule_id, file_key, job_type,
           archive_bucket, status, timestamp, error_message
    FROM request_status
    WHERE request_group_id = $1
    ORDER BY timestamp, request_id
"#;

const ATTEMPTS_FOR_GRANULE_SQL: &str = r#"
    SELECT request_id, request_group_id, granule_id, file_key, job_type,
           archive_bucket, status, timestamp, error_message
    FROM request_status
    WHERE granule_id = $1
    ORDER BY timestamp, request_id
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Inprogress,
    Error,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Inprogress => "inprogress",
            RequestStatus::Error => "error",
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One ledger row: a single recorded restore attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreAttempt {
    pub request_id: String,
    pub request_group_id: String,
    pub granule_id: String,
    pub file_key: String,
    pub job_type: String,
    pub archive_bucket: String,
    pub status: RequestStatus,
    pub timestamp: String,
    pub error_message: Option<String>,
}

impl RestoreAttempt {
    fn bind_params(&self) -> Vec<Option<String>> {
        vec![
            Some(self.request_id.clone()),
            Some(self.request_group_id.clone()),
            Some(self.granule_id.clone()),
            Some(self.file_key.clone()),
            Some(self.job_type.clone()),
            Some(self.archive_bucket.clone()),
            Some(self.status.as_str().to_string()),
            Some(self.timestamp.clone()),
            self.error_message.clone(),
        ]
    }
}

/// Which slice of the ledger to read back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusQuery {
    /// Every attempt for one file of one invocation.
    Group(String),
    /// Every attempt ever recorded for a granule.
    Granule(String),
}

/// Append-only store of restore attempts.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    async fn append(&self, attempt: &RestoreAttempt) -> Result<(), DbError>;
}

/// Postgres-backed ledger; one short-lived connection per write.
pub struct PgLedger {
    info: ConnectionInfo,
}

impl PgLedger {
    pub fn new(info: ConnectionInfo) -> Self {
        PgLedger { info }
    }

    /// Reads attempts back, oldest first.
    #[tracing::instrument(skip(self), err)]
    pub async fn attempts(&self, query: &StatusQuery) -> Result<Vec<RestoreAttempt>, DbError> {
        let (sql, id) = match query {
            StatusQuery::Group(id) => (ATTEMPTS_FOR_GROUP_SQL, id),
            StatusQuery::Granule(id) => (ATTEMPTS_FOR_GRANULE_SQL, id),
        };
        let rows = database::execute(sql, &self.info, &[Some(id.clone())]).await?;
        attempts_from_rows(rows)
    }
}

fn attempts_from_rows(rows: Vec<RowMap>) -> Result<Vec<RestoreAttempt>, DbError> {
    rows.into_iter()
        .map(|row| {
            serde_json::from_value(Value::Object(row))
                .map_err(|e| DbError::new(format!("malformed request_status row: {}", e)))
        })
        .collect()
}

#[async_trait]
impl LedgerClient for PgLedger {
    #[tracing::instrument(
        skip_all,
        fields(request_id = %attempt.request_id, status = %attempt.status),
        err
    )]
    async fn append(&self, attempt: &RestoreAttempt) -> Result<(), DbError> {
        database::execute(INSERT_REQUEST_SQL, &self.info, &attempt.bind_params()).await?;
        Ok(())
    }
}
