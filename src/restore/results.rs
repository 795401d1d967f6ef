// restoretool/src/restore/results.rs
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::FileKey;
use crate::errors::RestoreRequestError;

/// Working state for one file during an invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRequest {
    pub key: String,
    pub dest_bucket: Option<String>,
    pub eligible: bool,
    pub success: bool,
    pub err_msg: String,
}

impl FileRequest {
    pub fn new(file: &FileKey) -> Self {
        FileRequest {
            key: file.key.clone(),
            dest_bucket: file.dest_bucket.clone(),
            eligible: true,
            success: false,
            err_msg: String::new(),
        }
    }

    pub fn mark_ineligible(&mut self) {
        self.eligible = false;
    }

    pub fn mark_succeeded(&mut self) {
        self.success = true;
        self.err_msg.clear();
    }

    pub fn mark_failed(&mut self, err_msg: impl Into<String>) {
        self.success = false;
        self.err_msg = err_msg.into();
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileResult {
    pub key: String,
    pub dest_bucket: Option<String>,
    pub success: bool,
    pub err_msg: String,
}

/// Per-granule verdict, in input key order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GranuleResult {
    #[serde(rename = "granuleId")]
    pub granule_id: String,
    pub files: Vec<FileResult>,
}

impl GranuleResult {
    pub fn all_succeeded(&self) -> bool {
        self.files.iter().all(|file| file.success)
    }

    pub fn failed(&self) -> impl Iterator<Item = &FileResult> {
        self.files.iter().filter(|file| !file.success)
    }
}

impl fmt::Display for GranuleResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        f.write_str(&rendered)
    }
}

/// Folds per-file outcomes into the granule result.
///
/// Ineligible files are omitted. Any remaining failure turns the whole
/// result into [`RestoreRequestError::Aggregate`].
pub fn aggregate(
    granule_id: &str,
    requests: Vec<FileRequest>,
) -> Result<GranuleResult, RestoreRequestError> {
    let files = requests
        .into_iter()
        .filter(|request| request.eligible)
        .map(|request| FileResult {
            key: request.key,
            dest_bucket: request.dest_bucket,
            success: request.success,
            err_msg: request.err_msg,
        })
        .collect();

    let result = GranuleResult {
        granule_id: granule_id.to_string(),
        files,
    };

    if result.all_succeeded() {
        Ok(result)
    } else {
        Err(RestoreRequestError::Aggregate { result })
    }
}
