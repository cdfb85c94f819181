//! Bulk upload through `multipart/form-data`.
//!
//! The form is parsed once into [`FormEntry`] values. Each file part is then
//! stored on its own: one failing file is reported in the outcome list and
//! never aborts the others.

use crate::{
    errors::AppError,
    models::{
        key::{CollectionPath, StorageKey},
        multipart::{FormEntry, UploadOutcome},
    },
    services::content_type::{DEFAULT_CONTENT_TYPE, content_type_for},
    state::AppState,
};
use axum::{
    Json,
    extract::{Multipart, State},
    http::Uri,
};
use tracing::{debug, info, warn};

/// `POST /` or `POST /{*dir}` — store every file part under the target
/// directory. Always 200 once the form is accepted, even if every file failed.
pub async fn bulk_upload(
    State(state): State<AppState>,
    uri: Uri,
    multipart: Multipart,
) -> Result<Json<Vec<UploadOutcome>>, AppError> {
    let target = CollectionPath::from_request_path(uri.path())?;
    let entries = read_form(multipart).await?;

    if let Some(filename) = entries.iter().find_map(|entry| match entry {
        FormEntry::File { filename, .. } if filename.contains("..") => Some(filename),
        _ => None,
    }) {
        return Err(AppError::bad_request(format!(
            "invalid filename `{}`",
            filename
        )));
    }

    let prefix = target.store_prefix();
    let mut outcomes = Vec::new();
    for entry in entries {
        let (field, filename, declared_type, data) = match entry {
            FormEntry::File {
                name,
                filename,
                content_type,
                data,
            } => (name, filename, content_type, data),
            FormEntry::Field { name, value } => {
                debug!(field = %name, bytes = value.len(), "ignoring non-file form field");
                continue;
            }
        };

        let name = sanitize_filename(&filename);
        if name.is_empty() {
            outcomes.push(UploadOutcome::failed(filename, "empty filename"));
            continue;
        }

        let key = match StorageKey::new(&format!("{}{}", prefix, name)) {
            Ok(key) => key,
            Err(err) => {
                outcomes.push(UploadOutcome::failed(name, err.to_string()));
                continue;
            }
        };

        let content_type = resolve_content_type(name, declared_type);
        let data_len = data.len();
        match state
            .store
            .put(&key, data, Some(content_type.clone()))
            .await
        {
            Ok(()) => {
                state.evict_parent_listing(&key);
                debug!(field = %field, key = %key, size = data_len, "bulk upload item stored");
                outcomes.push(UploadOutcome::success(name, content_type));
            }
            Err(err) => {
                warn!(field = %field, key = %key, error = %err, "bulk upload item failed");
                outcomes.push(UploadOutcome::failed(name, err.to_string()));
            }
        }
    }

    info!(
        directory = %target.listing_url(),
        files = outcomes.len(),
        "bulk upload finished"
    );
    Ok(Json(outcomes))
}

/// Drain the multipart stream, classifying each part exactly once.
pub async fn read_form(mut multipart: Multipart) -> Result<Vec<FormEntry>, AppError> {
    let mut entries = Vec::new();
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match field.file_name().map(str::to_string) {
            Some(filename) => {
                let content_type = field.content_type().map(str::to_string);
                let data = field.bytes().await?;
                entries.push(FormEntry::File {
                    name,
                    filename,
                    content_type,
                    data,
                });
            }
            None => {
                let value = field.text().await?;
                entries.push(FormEntry::Field { name, value });
            }
        }
    }
    Ok(entries)
}

fn sanitize_filename(filename: &str) -> &str {
    filename.trim().trim_start_matches('/')
}

/// Extension lookup first; the part's declared type only fills in when the
/// extension is unknown.
fn resolve_content_type(name: &str, declared: Option<String>) -> String {
    let by_extension = content_type_for(name);
    if by_extension != DEFAULT_CONTENT_TYPE {
        return by_extension;
    }
    declared
        .filter(|value| !value.trim().is_empty())
        .unwrap_or(by_extension)
}
