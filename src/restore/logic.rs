// restoretool/src/restore/logic.rs
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::{FileKey, RestoreRequest, RestoreSettings};
use crate::errors::RestoreRequestError;
use crate::ledger::{LedgerClient, RequestStatus, RestoreAttempt};
use crate::ledger::requests::JOB_TYPE_RESTORE;
use crate::restore::results::{self, FileRequest, GranuleResult};
use crate::restore::s3_glacier::ArchivalStorageClient;
use crate::utils::{Clock, IdGenerator, SystemClock, UuidGenerator};

/// Drives the probe -> retry -> ledger sequence for every file of one granule.
pub struct RestoreOrchestrator {
    storage: Arc<dyn ArchivalStorageClient>,
    ledger: Arc<dyn LedgerClient>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    settings: RestoreSettings,
}

/// Identifiers shared by every ledger row written for one file.
struct FileContext<'a> {
    granule_id: &'a str,
    archive_bucket: &'a str,
    key: &'a str,
    request_group_id: String,
}

impl RestoreOrchestrator {
    pub fn new(
        storage: Arc<dyn ArchivalStorageClient>,
        ledger: Arc<dyn LedgerClient>,
        settings: RestoreSettings,
    ) -> Self {
        RestoreOrchestrator {
            storage,
            ledger,
            clock: Arc::new(SystemClock),
            ids: Arc::new(UuidGenerator),
            settings,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    /// Restores every file of the granule, in input order.
    ///
    /// Files are independent: a failure never stops later files from being
    /// attempted, and the aggregate error is raised only once all are done.
    pub async fn restore(
        &self,
        request: &RestoreRequest,
    ) -> Result<GranuleResult, RestoreRequestError> {
        let granule_id = request.granule.granule_id.as_str();
        info!(
            granule_id,
            archive_bucket = %request.archive_bucket,
            files = request.granule.keys.len(),
            "Requesting restore of granule"
        );

        let mut file_requests = Vec::with_capacity(request.granule.keys.len());
        for file in &request.granule.keys {
            let outcome = self
                .restore_file(granule_id, &request.archive_bucket, file)
                .await;
            file_requests.push(outcome);
        }

        let result = results::aggregate(granule_id, file_requests);
        match &result {
            Ok(granule) => info!(
                granule_id,
                files = granule.files.len(),
                "All restore requests submitted"
            ),
            Err(RestoreRequestError::Aggregate { result: granule }) => error!(
                granule_id,
                failed = granule.failed().count(),
                "One or more files failed to be requested"
            ),
            Err(_) => {}
        }
        result
    }

    async fn restore_file(
        &self,
        granule_id: &str,
        archive_bucket: &str,
        file: &FileKey,
    ) -> FileRequest {
        let mut request = FileRequest::new(file);

        match self.storage.object_exists(archive_bucket, &file.key).await {
            Ok(true) => {}
            Ok(false) => {
                info!(granule_id, key = %file.key, "File not found in archive bucket, skipping");
                request.mark_ineligible();
                return request;
            }
            Err(e) => {
                error!(granule_id, key = %file.key, "Eligibility probe failed: {}", e);
                request.mark_failed(e.to_string());
                return request;
            }
        }

        let context = FileContext {
            granule_id,
            archive_bucket,
            key: &file.key,
            request_group_id: self.ids.new_id(),
        };
        let mut retry = self.settings.retry_policy().handle();

        // One ledger row per attempt: `inprogress` once the command is
        // accepted, `error` when it is not.
        loop {
            let attempt = retry.attempt();
            let outcome = self
                .storage
                .restore_object(
                    archive_bucket,
                    &file.key,
                    self.settings.expire_days,
                    self.settings.retrieval_tier,
                )
                .await;

            let err = match outcome {
                Ok(()) => {
                    info!(
                        granule_id,
                        key = %file.key,
                        request_group_id = %context.request_group_id,
                        attempt,
                        "Restore requested"
                    );
                    request.mark_succeeded();
                    self.record(&context, RequestStatus::Inprogress, None).await;
                    return request;
                }
                Err(e) => e,
            };

            warn!(
                granule_id,
                key = %file.key,
                request_group_id = %context.request_group_id,
                attempt,
                "Restore request failed: {}", err
            );
            self.record(&context, RequestStatus::Error, Some(err.to_string()))
                .await;

            if !err.is_retriable() {
                request.mark_failed(err.to_string());
                return request;
            }
            match retry.next_delay() {
                Some(delay) => tokio::time::sleep(delay).await,
                None => {
                    error!(
                        granule_id,
                        key = %file.key,
                        attempts = attempt,
                        "Giving up on restore request"
                    );
                    request.mark_failed(err.to_string());
                    return request;
                }
            }
        }
    }

    /// Best-effort ledger write; failures are logged and never abort the attempt.
    async fn record(
        &self,
        context: &FileContext<'_>,
        status: RequestStatus,
        error_message: Option<String>,
    ) {
        let attempt = RestoreAttempt {
            request_id: self.ids.new_id(),
            request_group_id: context.request_group_id.clone(),
            granule_id: context.granule_id.to_string(),
            file_key: context.key.to_string(),
            job_type: JOB_TYPE_RESTORE.to_string(),
            archive_bucket: context.archive_bucket.to_string(),
            status,
            timestamp: self.clock.now(),
            error_message,
        };

        if let Err(e) = self.ledger.append(&attempt).await {
            error!(
                request_id = %attempt.request_id,
                key = context.key,
                status = %status,
                "Failed to record restore attempt: {}", e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RetrievalTier, load_restore_request_from_json};
    use crate::errors::{DbError, StorageError};
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use std::collections::{HashMap, HashSet, VecDeque};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const GRANULE_ID: &str = "MOD09GQ.A0219114.N5aUCG.006.0656338553321";
    const FILE1: &str = "MOD09GQ___006/2017/MOD/MOD09GQ.A0219114.N5aUCG.006.0656338553321.h5";
    const FILE2: &str = "MOD09GQ___006/MOD/MOD09GQ.A0219114.N5aUCG.006.0656338553321.h5.met";
    const FILE3: &str = "MOD09GQ___006/MOD/MOD09GQ.A0219114.N5aUCG.006.0656338553321_ndvi.jpg";
    const FILE4: &str = "MOD09GQ___006/MOD/MOD09GQ.A0219114.N5aUCG.006.0656338553321.cmr.xml";
    const PROTECTED_BUCKET: &str = "sndbx-cumulus-protected";
    const PUBLIC_BUCKET: &str = "sndbx-cumulus-public";
    const ARCHIVE_BUCKET: &str = "my-dr-fake-glacier-bucket";
    const UTC_NOW: &str = "2019-07-17T17:36:38.494918Z";

    #[derive(Debug, Clone, PartialEq)]
    struct RestoreCall {
        bucket: String,
        key: String,
        days: i32,
        tier: RetrievalTier,
    }

    /// Scripted archive: keys in `missing` probe as absent, keys in
    /// `probe_errors` fail the probe, and `restore_outcomes` are consumed in
    /// order per key (an empty script means success).
    #[derive(Default)]
    struct FakeArchive {
        missing: HashSet<String>,
        probe_errors: HashMap<String, StorageError>,
        restore_outcomes: Mutex<HashMap<String, VecDeque<Result<(), StorageError>>>>,
        probes: Mutex<Vec<(String, String)>>,
        restores: Mutex<Vec<RestoreCall>>,
    }

    impl FakeArchive {
        fn script(self, key: &str, outcomes: Vec<Result<(), StorageError>>) -> Self {
            self.restore_outcomes
                .lock()
                .unwrap()
                .insert(key.to_string(), outcomes.into());
            self
        }

        fn restores_for(&self, key: &str) -> usize {
            self.restores.lock().unwrap().iter().filter(|c| c.key == key).count()
        }
    }

    #[async_trait]
    impl ArchivalStorageClient for FakeArchive {
        async fn object_exists(&self, bucket: &str, key: &str) -> Result<bool, StorageError> {
            self.probes
                .lock()
                .unwrap()
                .push((bucket.to_string(), key.to_string()));
            if let Some(err) = self.probe_errors.get(key) {
                return Err(err.clone());
            }
            Ok(!self.missing.contains(key))
        }

        async fn restore_object(
            &self,
            bucket: &str,
            key: &str,
            days: i32,
            tier: RetrievalTier,
        ) -> Result<(), StorageError> {
            self.restores.lock().unwrap().push(RestoreCall {
                bucket: bucket.to_string(),
                key: key.to_string(),
                days,
                tier,
            });
            self.restore_outcomes
                .lock()
                .unwrap()
                .get_mut(key)
                .and_then(VecDeque::pop_front)
                .unwrap_or(Ok(()))
        }
    }

    #[derive(Default)]
    struct FakeLedger {
        rows: Mutex<Vec<RestoreAttempt>>,
        fail_writes: bool,
    }

    impl FakeLedger {
        fn failing() -> Self {
            FakeLedger {
                rows: Mutex::new(Vec::new()),
                fail_writes: true,
            }
        }

        fn rows(&self) -> Vec<RestoreAttempt> {
            self.rows.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LedgerClient for FakeLedger {
        async fn append(&self, attempt: &RestoreAttempt) -> Result<(), DbError> {
            if self.fail_writes {
                return Err(DbError::new("mock insert failed error"));
            }
            self.rows.lock().unwrap().push(attempt.clone());
            Ok(())
        }
    }

    struct FixedClock;

    impl Clock for FixedClock {
        fn now(&self) -> String {
            UTC_NOW.to_string()
        }
    }

    #[derive(Default)]
    struct SequentialIds(AtomicUsize);

    impl IdGenerator for SequentialIds {
        fn new_id(&self) -> String {
            format!("id-{}", self.0.fetch_add(1, Ordering::SeqCst) + 1)
        }
    }

    trait RestoreInvocation {
        async fn restore_invocation(
            &self,
            invocation: &Value,
        ) -> Result<GranuleResult, RestoreRequestError>;
    }

    impl RestoreInvocation for RestoreOrchestrator {
        async fn restore_invocation(
            &self,
            invocation: &Value,
        ) -> Result<GranuleResult, RestoreRequestError> {
            let request = load_restore_request_from_json(invocation)?;
            self.restore(&request).await
        }
    }

    fn settings() -> RestoreSettings {
        RestoreSettings {
            retry_sleep: Duration::ZERO,
            ..RestoreSettings::default()
        }
    }

    fn orchestrator(
        archive: &Arc<FakeArchive>,
        ledger: &Arc<FakeLedger>,
        settings: RestoreSettings,
    ) -> RestoreOrchestrator {
        RestoreOrchestrator::new(archive.clone(), ledger.clone(), settings)
            .with_clock(Arc::new(FixedClock))
            .with_id_generator(Arc::new(SequentialIds::default()))
    }

    fn invocation(keys: Value) -> Value {
        json!({
            "input": {"granules": [{"granuleId": GRANULE_ID, "keys": keys}]},
            "config": {"glacier-bucket": ARCHIVE_BUCKET}
        })
    }

    fn no_such(code: &str) -> StorageError {
        StorageError::new(code, "restore_object", "Unknown")
    }

    fn four_keys() -> Value {
        json!([
            {"key": FILE1, "dest_bucket": PROTECTED_BUCKET},
            {"key": FILE2, "dest_bucket": PROTECTED_BUCKET},
            {"key": FILE3, "dest_bucket": null},
            {"key": FILE4, "dest_bucket": PUBLIC_BUCKET}
        ])
    }

    #[tokio::test]
    async fn test_one_granule_four_files_success() -> anyhow::Result<()> {
        let archive = Arc::new(FakeArchive::default());
        let ledger = Arc::new(FakeLedger::default());

        let result = orchestrator(&archive, &ledger, settings())
            .restore_invocation(&invocation(four_keys()))
            .await?;

        assert_eq!(
            serde_json::to_value(&result)?,
            json!({
                "granuleId": GRANULE_ID,
                "files": [
                    {"key": FILE1, "dest_bucket": PROTECTED_BUCKET, "success": true, "err_msg": ""},
                    {"key": FILE2, "dest_bucket": PROTECTED_BUCKET, "success": true, "err_msg": ""},
                    {"key": FILE3, "dest_bucket": null, "success": true, "err_msg": ""},
                    {"key": FILE4, "dest_bucket": PUBLIC_BUCKET, "success": true, "err_msg": ""}
                ]
            })
        );

        let probes = archive.probes.lock().unwrap().clone();
        assert_eq!(probes.len(), 4);
        assert!(probes.iter().all(|(bucket, _)| bucket == ARCHIVE_BUCKET));

        let restores = archive.restores.lock().unwrap().clone();
        let keys: Vec<&str> = restores.iter().map(|c| c.key.as_str()).collect();
        assert_eq!(keys, vec![FILE1, FILE2, FILE3, FILE4]);
        assert!(restores.iter().all(|c| c.days == 5 && c.tier == RetrievalTier::Standard));

        let rows = ledger.rows();
        assert_eq!(rows.len(), 4);
        assert!(rows.iter().all(|r| r.status == RequestStatus::Inprogress));
        assert!(rows.iter().all(|r| r.job_type == "restore" && r.archive_bucket == ARCHIVE_BUCKET));
        assert!(rows.iter().all(|r| r.timestamp == UTC_NOW && r.error_message.is_none()));
        Ok(())
    }

    #[tokio::test]
    async fn test_ledger_failure_does_not_change_outcome() -> anyhow::Result<()> {
        let archive = Arc::new(FakeArchive::default());
        let ledger = Arc::new(FakeLedger::failing());

        let result = orchestrator(&archive, &ledger, settings())
            .restore_invocation(&invocation(json!([
                {"key": FILE1, "dest_bucket": PROTECTED_BUCKET}
            ])))
            .await?;

        assert_eq!(result.files.len(), 1);
        assert!(result.files[0].success);
        assert_eq!(result.files[0].err_msg, "");
        assert_eq!(archive.restores_for(FILE1), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_file_not_in_archive_is_dropped() -> anyhow::Result<()> {
        let missing = "MOD09GQ___006/2017/MOD/MOD09GQ.A0219114.N5aUCG.006.0656338553321.xyz";
        let archive = Arc::new(FakeArchive {
            missing: [missing.to_string()].into_iter().collect(),
            ..FakeArchive::default()
        });
        let ledger = Arc::new(FakeLedger::default());

        let result = orchestrator(&archive, &ledger, settings())
            .restore_invocation(&invocation(json!([{"key": missing, "dest_bucket": null}])))
            .await?;

        assert_eq!(serde_json::to_value(&result)?, json!({"granuleId": GRANULE_ID, "files": []}));
        assert_eq!(
            *archive.probes.lock().unwrap(),
            vec![(ARCHIVE_BUCKET.to_string(), missing.to_string())]
        );
        assert!(archive.restores.lock().unwrap().is_empty());
        assert!(ledger.rows().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_ineligible_file_keeps_surrounding_order() -> anyhow::Result<()> {
        let archive = Arc::new(FakeArchive {
            missing: [FILE2.to_string()].into_iter().collect(),
            ..FakeArchive::default()
        });
        let ledger = Arc::new(FakeLedger::default());

        let result = orchestrator(&archive, &ledger, settings())
            .restore_invocation(&invocation(four_keys()))
            .await?;

        let keys: Vec<&str> = result.files.iter().map(|f| f.key.as_str()).collect();
        assert_eq!(keys, vec![FILE1, FILE3, FILE4]);
        assert_eq!(ledger.rows().len(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_retry_then_success() -> anyhow::Result<()> {
        let archive = Arc::new(FakeArchive::default().script(
            FILE2,
            vec![Err(no_such("NoSuchBucket")), Err(no_such("NoSuchBucket")), Ok(())],
        ));
        let ledger = Arc::new(FakeLedger::default());

        let result = orchestrator(&archive, &ledger, settings())
            .restore_invocation(&invocation(json!([
                {"key": FILE1, "dest_bucket": PROTECTED_BUCKET},
                {"key": FILE2, "dest_bucket": PROTECTED_BUCKET}
            ])))
            .await?;

        assert!(result.all_succeeded());
        assert_eq!(result.files[1].err_msg, "");
        assert_eq!(archive.restores_for(FILE1), 1);
        assert_eq!(archive.restores_for(FILE2), 3);

        let rows = ledger.rows();
        let file2_rows: Vec<&RestoreAttempt> =
            rows.iter().filter(|r| r.file_key == FILE2).collect();
        let statuses: Vec<RequestStatus> = file2_rows.iter().map(|r| r.status).collect();
        // One row per attempt: k-1 errors, then the accepted request.
        assert_eq!(
            statuses,
            vec![RequestStatus::Error, RequestStatus::Error, RequestStatus::Inprogress]
        );
        assert_eq!(file2_rows[2].error_message, None);
        let no_such_bucket = no_such("NoSuchBucket").to_string();
        assert_eq!(
            file2_rows[0].error_message.as_deref(),
            Some(no_such_bucket.as_str())
        );
        assert!(no_such_bucket.starts_with("An error occurred (NoSuchBucket) when calling"));
        Ok(())
    }

    #[tokio::test]
    async fn test_identifiers_group_attempts_per_file() -> anyhow::Result<()> {
        let archive = Arc::new(
            FakeArchive::default()
                .script(FILE1, vec![Err(no_such("NoSuchBucket")), Ok(())])
                .script(
                    FILE2,
                    vec![Err(no_such("NoSuchBucket")), Err(no_such("NoSuchKey")), Ok(())],
                ),
        );
        let ledger = Arc::new(FakeLedger::default());

        orchestrator(&archive, &ledger, settings())
            .restore_invocation(&invocation(json!([
                {"key": FILE1, "dest_bucket": null},
                {"key": FILE2, "dest_bucket": null}
            ])))
            .await?;

        let rows = ledger.rows();
        let request_ids: HashSet<&str> = rows.iter().map(|r| r.request_id.as_str()).collect();
        assert_eq!(request_ids.len(), rows.len());

        let groups_for = |key: &str| -> HashSet<String> {
            rows.iter()
                .filter(|r| r.file_key == key)
                .map(|r| r.request_group_id.clone())
                .collect()
        };
        let file1_groups = groups_for(FILE1);
        let file2_groups = groups_for(FILE2);
        assert_eq!(file1_groups.len(), 1);
        assert_eq!(file2_groups.len(), 1);
        assert!(file1_groups.is_disjoint(&file2_groups));
        assert!(
            !request_ids
                .iter()
                .any(|id| file1_groups.contains(*id) || file2_groups.contains(*id))
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_exhausted_retries_raise_aggregate_error() {
        let archive = Arc::new(FakeArchive::default().script(
            FILE3,
            vec![
                Err(no_such("NoSuchBucket")),
                Err(no_such("NoSuchBucket")),
                Err(no_such("NoSuchKey")),
            ],
        ));
        let ledger = Arc::new(FakeLedger::default());

        let err = orchestrator(&archive, &ledger, settings())
            .restore_invocation(&invocation(json!([
                {"key": FILE1, "dest_bucket": PROTECTED_BUCKET},
                {"key": FILE3, "dest_bucket": null},
                {"key": FILE4, "dest_bucket": PUBLIC_BUCKET}
            ])))
            .await
            .unwrap_err();

        let expected = GranuleResult {
            granule_id: GRANULE_ID.to_string(),
            files: vec![
                results::FileResult {
                    key: FILE1.to_string(),
                    dest_bucket: Some(PROTECTED_BUCKET.to_string()),
                    success: true,
                    err_msg: String::new(),
                },
                results::FileResult {
                    key: FILE3.to_string(),
                    dest_bucket: None,
                    success: false,
                    err_msg: concat!(
                        "An error occurred (NoSuchKey) when calling the ",
                        "restore_object operation: Unknown"
                    )
                    .to_string(),
                },
                results::FileResult {
                    key: FILE4.to_string(),
                    dest_bucket: Some(PUBLIC_BUCKET.to_string()),
                    success: true,
                    err_msg: String::new(),
                },
            ],
        };
        assert_eq!(
            err.to_string(),
            format!("One or more files failed to be requested. {}", expected)
        );
        assert!(matches!(
            err,
            RestoreRequestError::Aggregate { ref result } if *result == expected
        ));

        // The file after the failure was still attempted.
        assert_eq!(archive.restores_for(FILE3), 3);
        assert_eq!(archive.restores_for(FILE4), 1);

        let file3_errors = ledger
            .rows()
            .iter()
            .filter(|r| r.file_key == FILE3 && r.status == RequestStatus::Error)
            .count();
        assert_eq!(file3_errors, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_wait_the_configured_delay() -> anyhow::Result<()> {
        let archive = Arc::new(FakeArchive::default().script(
            FILE1,
            vec![Err(no_such("NoSuchBucket")), Err(no_such("NoSuchBucket")), Ok(())],
        ));
        let ledger = Arc::new(FakeLedger::default());
        let delay = Duration::from_secs(2);
        let settings = RestoreSettings {
            retry_sleep: delay,
            ..RestoreSettings::default()
        };

        let start = tokio::time::Instant::now();
        let result = orchestrator(&archive, &ledger, settings)
            .restore_invocation(&invocation(json!([{"key": FILE1, "dest_bucket": null}])))
            .await?;
        let elapsed = start.elapsed();

        assert!(result.all_succeeded());
        assert_eq!(archive.restores_for(FILE1), 3);
        // Three attempts, two sleeps.
        assert!(elapsed >= delay * 2, "elapsed {:?}", elapsed);
        assert!(elapsed < delay * 3, "elapsed {:?}", elapsed);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_shorter_than_delay_allows_one_attempt() {
        let archive = Arc::new(
            FakeArchive::default().script(FILE1, vec![Err(no_such("NoSuchBucket")), Ok(())]),
        );
        let ledger = Arc::new(FakeLedger::default());
        let settings = RestoreSettings {
            retry_sleep: Duration::from_secs(10),
            time_budget: Some(Duration::from_secs(5)),
            ..RestoreSettings::default()
        };

        let start = tokio::time::Instant::now();
        let err = orchestrator(&archive, &ledger, settings)
            .restore_invocation(&invocation(json!([{"key": FILE1, "dest_bucket": null}])))
            .await
            .unwrap_err();

        let RestoreRequestError::Aggregate { result } = err else {
            panic!("expected aggregate error");
        };
        assert!(!result.files[0].success);
        assert_eq!(result.files[0].err_msg, no_such("NoSuchBucket").to_string());
        assert_eq!(archive.restores_for(FILE1), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);

        let rows = ledger.rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, RequestStatus::Error);
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_cuts_retries_before_max_attempts() {
        let failures = (0..5).map(|_| Err(no_such("NoSuchKey"))).collect();
        let archive = Arc::new(FakeArchive::default().script(FILE1, failures));
        let ledger = Arc::new(FakeLedger::default());
        let settings = RestoreSettings {
            max_attempts: 5,
            retry_sleep: Duration::from_secs(2),
            time_budget: Some(Duration::from_secs(3)),
            ..RestoreSettings::default()
        };

        let start = tokio::time::Instant::now();
        orchestrator(&archive, &ledger, settings)
            .restore_invocation(&invocation(json!([{"key": FILE1, "dest_bucket": null}])))
            .await
            .unwrap_err();

        // A second attempt starts at 2s; a third would start at 4s, past the budget.
        assert_eq!(archive.restores_for(FILE1), 2);
        assert!(start.elapsed() >= Duration::from_secs(2));
        assert!(start.elapsed() < Duration::from_secs(3));
        assert_eq!(ledger.rows().len(), 2);
    }

    #[tokio::test]
    async fn test_terminal_error_is_not_retried() {
        let denied = StorageError::new("AccessDenied", "restore_object", "Access Denied");
        let archive =
            Arc::new(FakeArchive::default().script(FILE1, vec![Err(denied.clone()), Ok(())]));
        let ledger = Arc::new(FakeLedger::default());

        let err = orchestrator(&archive, &ledger, settings())
            .restore_invocation(&invocation(json!([{"key": FILE1, "dest_bucket": null}])))
            .await
            .unwrap_err();

        let RestoreRequestError::Aggregate { result } = err else {
            panic!("expected aggregate error");
        };
        assert_eq!(result.files[0].err_msg, denied.to_string());
        assert_eq!(archive.restores_for(FILE1), 1);
        let rows = ledger.rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, RequestStatus::Error);
    }

    #[tokio::test]
    async fn test_probe_failure_is_contained_to_file() {
        let archive = Arc::new(FakeArchive {
            probe_errors: [(
                FILE1.to_string(),
                StorageError::new("AccessDenied", "head_object", "Forbidden"),
            )]
            .into_iter()
            .collect(),
            ..FakeArchive::default()
        });
        let ledger = Arc::new(FakeLedger::default());

        let err = orchestrator(&archive, &ledger, settings())
            .restore_invocation(&invocation(json!([
                {"key": FILE1, "dest_bucket": null},
                {"key": FILE2, "dest_bucket": null}
            ])))
            .await
            .unwrap_err();

        let RestoreRequestError::Aggregate { result } = err else {
            panic!("expected aggregate error");
        };
        assert!(!result.files[0].success);
        assert!(result.files[1].success);
        assert_eq!(archive.restores_for(FILE1), 0);
        assert!(ledger.rows().iter().all(|r| r.file_key == FILE2));
    }

    #[tokio::test]
    async fn test_settings_flow_into_restore_command() -> anyhow::Result<()> {
        let archive = Arc::new(FakeArchive::default());
        let ledger = Arc::new(FakeLedger::default());
        let settings = RestoreSettings {
            expire_days: 9,
            retrieval_tier: RetrievalTier::Expedited,
            ..settings()
        };

        orchestrator(&archive, &ledger, settings)
            .restore_invocation(&invocation(json!([{"key": FILE1, "dest_bucket": null}])))
            .await?;

        assert_eq!(
            *archive.restores.lock().unwrap(),
            vec![RestoreCall {
                bucket: ARCHIVE_BUCKET.to_string(),
                key: FILE1.to_string(),
                days: 9,
                tier: RetrievalTier::Expedited,
            }]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_bucket_makes_no_external_calls() {
        let archive = Arc::new(FakeArchive::default());
        let ledger = Arc::new(FakeLedger::default());
        let invocation = json!({
            "input": {"granules": [{"granuleId": GRANULE_ID, "keys": [{"key": FILE1}]}]}
        });

        let err = orchestrator(&archive, &ledger, settings())
            .restore_invocation(&invocation)
            .await
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            format!("request: {} does not contain a config value for glacier-bucket", invocation)
        );
        assert!(archive.probes.lock().unwrap().is_empty());
        assert!(ledger.rows().is_empty());
    }

    #[tokio::test]
    async fn test_two_granules_make_no_external_calls() {
        let archive = Arc::new(FakeArchive::default());
        let ledger = Arc::new(FakeLedger::default());
        let invocation = json!({
            "input": {"granules": [
                {"granuleId": GRANULE_ID, "keys": [{"key": FILE1}]},
                {"granuleId": GRANULE_ID, "keys": [{"key": FILE2}]}
            ]},
            "config": {"glacier-bucket": "my-bucket"}
        });

        let err = orchestrator(&archive, &ledger, settings())
            .restore_invocation(&invocation)
            .await
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "request_files can only accept 1 granule in the list. This input contains 2"
        );
        assert!(archive.probes.lock().unwrap().is_empty());
    }
}
