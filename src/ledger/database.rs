// restoretool/src/ledger/database.rs
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};
use sqlx::postgres::{PgConnectOptions, PgConnection, PgRow};
use sqlx::{Column, Connection, Postgres, Row};
use tracing::{debug, warn};

use crate::errors::DbError;
use crate::ledger::connect::ConnectionInfo;

/// One result row, keyed by column name.
pub type RowMap = Map<String, Value>;

fn connect_options(info: &ConnectionInfo) -> Result<PgConnectOptions, DbError> {
    let port: u16 = info
        .port
        .trim()
        .parse()
        .map_err(|_| DbError::new(format!("invalid port \"{}\"", info.port)))?;

    Ok(PgConnectOptions::new()
        .host(&info.host)
        .port(port)
        .database(&info.name)
        .username(&info.user)
        .password(&info.password))
}

/// Opens a dedicated connection to the ledger database.
pub async fn acquire_connection(info: &ConnectionInfo) -> Result<PgConnection, DbError> {
    let options = connect_options(info)?;
    let connection = PgConnection::connect_with(&options).await?;
    debug!(host = %info.host, name = %info.name, "Opened ledger connection");
    Ok(connection)
}

/// Closes the connection. A failed graceful close still drops the socket.
pub async fn release_connection(connection: PgConnection) {
    if let Err(e) = connection.close().await {
        warn!("Ledger connection did not close cleanly: {}", e);
    }
}

/// Runs exactly one statement and returns its fully materialized result set.
///
/// Parameters are bound positionally (`$1`, `$2`, ...) as nullable text; the
/// statement casts where a column needs another type. The connection is
/// released before returning, whether or not the statement succeeded.
pub async fn execute(
    sql: &str,
    info: &ConnectionInfo,
    params: &[Option<String>],
) -> Result<Vec<RowMap>, DbError> {
    let mut connection = acquire_connection(info).await?;

    let mut query = sqlx::query::<Postgres>(sql);
    for param in params {
        query = query.bind(param.clone());
    }
    let outcome = query.fetch_all(&mut connection).await;

    release_connection(connection).await;

    let rows = outcome?;
    Ok(rows.iter().map(row_to_map).collect())
}

fn row_to_map(row: &PgRow) -> RowMap {
    row.columns()
        .iter()
        .map(|column| (column.name().to_string(), decode_column(row, column.ordinal())))
        .collect()
}

// The ledger only holds TEXT and TIMESTAMPTZ columns; anything else comes back as null.
fn decode_column(row: &PgRow, index: usize) -> Value {
    if let Ok(value) = row.try_get::<Option<String>, _>(index) {
        return value.map(Value::String).unwrap_or(Value::Null);
    }
    if let Ok(value) = row.try_get::<Option<DateTime<Utc>>, _>(index) {
        return value
            .map(|ts| Value::String(format_timestamp(ts)))
            .unwrap_or(Value::Null);
    }
    Value::Null
}

/// Same shape the ledger writes: UTC, microseconds, `Z` suffix.
fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}
