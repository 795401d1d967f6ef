// restoretool/src/config/mod.rs
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::env;
use std::fmt;
use std::time::Duration;
use tracing::warn;

use crate::errors::RestoreRequestError;
use crate::utils::retry::RetryPolicy;

pub const ARCHIVE_BUCKET_KEY: &str = "glacier-bucket";

const DEFAULT_EXPIRE_DAYS: i32 = 5;
const DEFAULT_REQUEST_RETRIES: usize = 3;
const DEFAULT_RETRY_SLEEP_SECS: f64 = 0.5;

/// Speed/cost class requested for a restore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetrievalTier {
    #[default]
    Standard,
    Bulk,
    Expedited,
}

impl RetrievalTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetrievalTier::Standard => "Standard",
            RetrievalTier::Bulk => "Bulk",
            RetrievalTier::Expedited => "Expedited",
        }
    }

    /// Unrecognized names fall back to `Standard`.
    pub fn parse_or_default(value: &str) -> Self {
        match value {
            "Standard" => RetrievalTier::Standard,
            "Bulk" => RetrievalTier::Bulk,
            "Expedited" => RetrievalTier::Expedited,
            other => {
                warn!(
                    retrieval_type = other,
                    "Unrecognized RESTORE_RETRIEVAL_TYPE, using {}",
                    RetrievalTier::default().as_str()
                );
                RetrievalTier::default()
            }
        }
    }
}

impl fmt::Display for RetrievalTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Restore tuning read from the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct RestoreSettings {
    pub expire_days: i32,
    pub max_attempts: usize,
    pub retry_sleep: Duration,
    pub retrieval_tier: RetrievalTier,
    pub time_budget: Option<Duration>,
}

impl Default for RestoreSettings {
    fn default() -> Self {
        RestoreSettings {
            expire_days: DEFAULT_EXPIRE_DAYS,
            max_attempts: DEFAULT_REQUEST_RETRIES,
            retry_sleep: Duration::from_secs_f64(DEFAULT_RETRY_SLEEP_SECS),
            retrieval_tier: RetrievalTier::default(),
            time_budget: None,
        }
    }
}

impl RestoreSettings {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = RestoreSettings::default();

        let expire_days = match parse_or(&lookup, "RESTORE_EXPIRE_DAYS", defaults.expire_days) {
            days if days >= 1 => days,
            days => {
                warn!(
                    variable = "RESTORE_EXPIRE_DAYS",
                    value = days,
                    "Restore must last at least one day, using default {}",
                    defaults.expire_days
                );
                defaults.expire_days
            }
        };
        let max_attempts =
            parse_or(&lookup, "RESTORE_REQUEST_RETRIES", defaults.max_attempts).max(1);
        let retry_sleep = parse_seconds(&lookup, "RESTORE_RETRY_SLEEP_SECS")
            .unwrap_or(defaults.retry_sleep);
        let retrieval_tier = lookup("RESTORE_RETRIEVAL_TYPE")
            .map(|value| RetrievalTier::parse_or_default(value.trim()))
            .unwrap_or_default();
        let time_budget = parse_seconds(&lookup, "RESTORE_TIME_BUDGET_SECS")
            .filter(|budget| !budget.is_zero());

        RestoreSettings {
            expire_days,
            max_attempts,
            retry_sleep,
            retrieval_tier,
            time_budget,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(self.max_attempts, self.retry_sleep).with_time_budget(self.time_budget)
    }
}

fn parse_or<F, T>(lookup: &F, name: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr + Copy + fmt::Display,
{
    match lookup(name) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(variable = name, value = %raw, "Unparseable value, using default {}", default);
            default
        }),
        None => default,
    }
}

fn parse_seconds<F>(lookup: &F, name: &str) -> Option<Duration>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(name)?;
    match raw.trim().parse::<f64>() {
        Ok(secs) => match Duration::try_from_secs_f64(secs) {
            Ok(duration) => Some(duration),
            Err(_) => {
                warn!(variable = name, value = %raw, "Out of range duration, using default");
                None
            }
        },
        Err(_) => {
            warn!(variable = name, value = %raw, "Unparseable duration, using default");
            None
        }
    }
}

// Structs for deserializing the invocation envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileKey {
    pub key: String,
    #[serde(default)]
    pub dest_bucket: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GranuleRequest {
    #[serde(rename = "granuleId")]
    pub granule_id: String,
    #[serde(default)]
    pub keys: Vec<FileKey>,
}

/// A validated invocation: one granule and the archive bucket to restore from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreRequest {
    pub granule: GranuleRequest,
    pub archive_bucket: String,
}

/// Validates the invocation envelope.
///
/// The archive bucket is checked first, then granule cardinality. Both the
/// `{"input": {"granules": [...]}}` list form and the singular
/// `{"granule": {...}}` form are accepted.
pub fn load_restore_request_from_json(
    invocation: &Value,
) -> Result<RestoreRequest, RestoreRequestError> {
    let archive_bucket = invocation
        .get("config")
        .and_then(|config| config.get(ARCHIVE_BUCKET_KEY))
        .and_then(Value::as_str)
        .filter(|bucket| !bucket.trim().is_empty())
        .ok_or_else(|| RestoreRequestError::Configuration {
            invocation: invocation.to_string(),
            key: ARCHIVE_BUCKET_KEY,
        })?
        .to_string();

    let mut granules = granules_from_invocation(invocation)?;
    if granules.len() != 1 {
        return Err(RestoreRequestError::Cardinality {
            count: granules.len(),
        });
    }
    let granule = granules.remove(0);

    Ok(RestoreRequest {
        granule,
        archive_bucket,
    })
}

fn granules_from_invocation(
    invocation: &Value,
) -> Result<Vec<GranuleRequest>, RestoreRequestError> {
    let parse = |value: &Value| {
        serde_json::from_value::<GranuleRequest>(value.clone()).map_err(|e| {
            RestoreRequestError::InvalidInvocation(format!("malformed granule: {}", e))
        })
    };

    let list = invocation
        .get("input")
        .and_then(|input| input.get("granules"))
        .or_else(|| invocation.get("granules"));

    match (list, invocation.get("granule")) {
        (Some(Value::Array(items)), _) => items.iter().map(parse).collect(),
        (Some(_), _) => Err(RestoreRequestError::InvalidInvocation(
            "granules must be a list".to_string(),
        )),
        (None, Some(single)) => Ok(vec![parse(single)?]),
        (None, None) => Ok(Vec::new()),
    }
}
