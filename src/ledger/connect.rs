// restoretool/src/ledger/connect.rs
use async_trait::async_trait;
use aws_sdk_ssm as ssm;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::env;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::errors::ParameterResolutionError;

/// Where one connection field is read from.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamSource {
    Env(String),
    #[serde(alias = "ssm")]
    Secure(String),
}

/// Field name -> source for `db_host`, `db_port`, `db_name`, `db_user`, `db_pw`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct DbParamSpec(pub BTreeMap<String, ParamSource>);

pub const DB_FIELDS: [&str; 5] = ["db_host", "db_port", "db_name", "db_user", "db_pw"];

impl Default for DbParamSpec {
    fn default() -> Self {
        let env_names = [
            "DATABASE_HOST",
            "DATABASE_PORT",
            "DATABASE_NAME",
            "DATABASE_USER",
            "DATABASE_PW",
        ];
        DbParamSpec(
            DB_FIELDS
                .iter()
                .zip(env_names)
                .map(|(field, name)| (field.to_string(), ParamSource::Env(name.to_string())))
                .collect(),
        )
    }
}

impl DbParamSpec {
    pub fn from_json(raw: &str) -> Result<Self, ParameterResolutionError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Reads `RESTORE_DB_PARAMS` if set, otherwise every field comes from `DATABASE_*`.
    pub fn from_env() -> Result<Self, ParameterResolutionError> {
        match env::var("RESTORE_DB_PARAMS") {
            Ok(raw) if !raw.trim().is_empty() => Self::from_json(&raw),
            _ => Ok(Self::default()),
        }
    }
}

/// Concrete ledger connection details, held for one invocation only.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub host: String,
    pub port: String,
    pub name: String,
    pub user: String,
    pub password: String,
}

impl fmt::Debug for ConnectionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionInfo")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("name", &self.name)
            .field("user", &self.user)
            .field("password", &"********")
            .finish()
    }
}

/// A secure key/value store for connection secrets.
#[async_trait]
pub trait ParameterStore: Send + Sync {
    async fn get_parameter(&self, name: &str) -> Result<String, String>;
}

/// AWS Systems Manager Parameter Store, read with decryption.
pub struct SsmParameterStore {
    client: ssm::Client,
}

impl SsmParameterStore {
    pub fn new(sdk_config: &aws_config::SdkConfig) -> Self {
        SsmParameterStore {
            client: ssm::Client::new(sdk_config),
        }
    }
}

#[async_trait]
impl ParameterStore for SsmParameterStore {
    async fn get_parameter(&self, name: &str) -> Result<String, String> {
        let output = self
            .client
            .get_parameter()
            .name(name)
            .with_decryption(true)
            .send()
            .await
            .map_err(|e| ssm::error::DisplayErrorContext(e).to_string())?;

        output
            .parameter()
            .and_then(|parameter| parameter.value())
            .map(str::to_string)
            .ok_or_else(|| format!("parameter {} has no value", name))
    }
}

type EnvLookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Turns a [`DbParamSpec`] into [`ConnectionInfo`]. No caching between calls.
pub struct ConnectionResolver {
    store: Arc<dyn ParameterStore>,
    env: EnvLookup,
}

impl ConnectionResolver {
    pub fn new(store: Arc<dyn ParameterStore>) -> Self {
        Self::with_env_lookup(store, |name| env::var(name).ok())
    }

    pub fn with_env_lookup<F>(store: Arc<dyn ParameterStore>, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        ConnectionResolver {
            store,
            env: Box::new(lookup),
        }
    }

    pub async fn resolve(
        &self,
        spec: &DbParamSpec,
    ) -> Result<ConnectionInfo, ParameterResolutionError> {
        let host = self.field(spec, "db_host").await?;
        let port = self.field(spec, "db_port").await?;
        let name = self.field(spec, "db_name").await?;
        let user = self.field(spec, "db_user").await?;
        let password = self.field(spec, "db_pw").await?;
        debug!(host = %host, port = %port, name = %name, "Resolved ledger connection info");

        Ok(ConnectionInfo {
            host,
            port,
            name,
            user,
            password,
        })
    }

    async fn field(
        &self,
        spec: &DbParamSpec,
        field: &'static str,
    ) -> Result<String, ParameterResolutionError> {
        let source = spec
            .0
            .get(field)
            .ok_or(ParameterResolutionError::Unconfigured(field))?;
        match source {
            ParamSource::Env(name) => {
                (self.env)(name).ok_or_else(|| ParameterResolutionError::MissingEnv {
                    field: field.to_string(),
                    name: name.clone(),
                })
            }
            ParamSource::Secure(name) => self.store.get_parameter(name).await.map_err(|message| {
                ParameterResolutionError::Store {
                    field: field.to_string(),
                    name: name.clone(),
                    message,
                }
            }),
        }
    }
}
