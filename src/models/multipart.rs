//! Bulk-upload form entries and per-file outcomes.

use bytes::Bytes;
use serde::Serialize;

/// One part of a `multipart/form-data` body, classified once at parse time.
#[derive(Debug, Clone)]
pub enum FormEntry {
    /// A plain form field without a filename.
    Field { name: String, value: String },

    /// A file-bearing field.
    File {
        name: String,
        filename: String,
        content_type: Option<String>,
        data: Bytes,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Success,
    Failed,
}

/// Outcome of one file in a bulk upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadOutcome {
    pub filename: String,
    pub status: UploadStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UploadOutcome {
    pub fn success(filename: impl Into<String>, content_type: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            status: UploadStatus::Success,
            content_type: Some(content_type.into()),
            error: None,
        }
    }

    pub fn failed(filename: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            status: UploadStatus::Failed,
            content_type: None,
            error: Some(error.into()),
        }
    }
}
