// restoretool/src/restore/s3_glacier.rs
use async_trait::async_trait;
use aws_sdk_s3 as s3;
use s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use s3::types::{GlacierJobParameters, RestoreRequest, Tier};
use tracing::debug;

use crate::config::RetrievalTier;
use crate::errors::StorageError;

/// The archival object store: an eligibility probe and the restore command.
#[async_trait]
pub trait ArchivalStorageClient: Send + Sync {
    /// `Ok(false)` when the object is not present in the archive bucket.
    async fn object_exists(&self, bucket: &str, key: &str) -> Result<bool, StorageError>;

    async fn restore_object(
        &self,
        bucket: &str,
        key: &str,
        days: i32,
        tier: RetrievalTier,
    ) -> Result<(), StorageError>;
}

/// Loads region, credentials and endpoint overrides from the ambient AWS configuration.
pub async fn load_sdk_config() -> aws_config::SdkConfig {
    aws_config::defaults(s3::config::BehaviorVersion::latest())
        .load()
        .await
}

pub struct S3ArchiveClient {
    client: s3::Client,
}

impl S3ArchiveClient {
    pub fn new(sdk_config: &aws_config::SdkConfig) -> Self {
        S3ArchiveClient {
            client: s3::Client::new(sdk_config),
        }
    }
}

fn sdk_tier(tier: RetrievalTier) -> Tier {
    match tier {
        RetrievalTier::Standard => Tier::Standard,
        RetrievalTier::Bulk => Tier::Bulk,
        RetrievalTier::Expedited => Tier::Expedited,
    }
}

/// Maps an SDK failure onto a vendor-coded [`StorageError`].
fn classify<E>(operation: &str, err: SdkError<E>) -> StorageError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    match &err {
        SdkError::ServiceError(context) => {
            let service_err = context.err();
            let code = match service_err.code() {
                Some(code) => code.to_string(),
                None if context.raw().status().as_u16() == 404 => "NotFound".to_string(),
                None => context.raw().status().as_u16().to_string(),
            };
            let message = service_err.message().unwrap_or("Unknown").to_string();
            StorageError::new(code, operation, message)
        }
        SdkError::TimeoutError(_) => {
            StorageError::new("TimeoutError", operation, DisplayErrorContext(&err).to_string())
        }
        SdkError::DispatchFailure(_) => {
            StorageError::new("DispatchFailure", operation, DisplayErrorContext(&err).to_string())
        }
        SdkError::ResponseError(_) => {
            StorageError::new("ResponseError", operation, DisplayErrorContext(&err).to_string())
        }
        SdkError::ConstructionFailure(_) => StorageError::new(
            "ConstructionFailure",
            operation,
            DisplayErrorContext(&err).to_string(),
        ),
        _ => StorageError::new("Unknown", operation, DisplayErrorContext(&err).to_string()),
    }
}

#[async_trait]
impl ArchivalStorageClient for S3ArchiveClient {
    async fn object_exists(&self, bucket: &str, key: &str) -> Result<bool, StorageError> {
        match self.client.head_object().bucket(bucket).key(key).send().await {
            Ok(_) => Ok(true),
            Err(e) => {
                let err = classify("head_object", e);
                if err.is_not_found() {
                    debug!(bucket, key, "Object not found in archive bucket");
                    Ok(false)
                } else {
                    Err(err)
                }
            }
        }
    }

    async fn restore_object(
        &self,
        bucket: &str,
        key: &str,
        days: i32,
        tier: RetrievalTier,
    ) -> Result<(), StorageError> {
        let job_parameters = GlacierJobParameters::builder()
            .tier(sdk_tier(tier))
            .build()
            .map_err(|e| {
                StorageError::new("ConstructionFailure", "restore_object", e.to_string())
            })?;
        let restore_request = RestoreRequest::builder()
            .days(days)
            .glacier_job_parameters(job_parameters)
            .build();

        self.client
            .restore_object()
            .bucket(bucket)
            .key(key)
            .restore_request(restore_request)
            .send()
            .await
            .map_err(|e| classify("restore_object", e))?;
        Ok(())
    }
}
