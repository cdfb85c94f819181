//! HTTP handlers for single-object operations.
//!
//! Every handler receives the raw request URI rather than axum's decoded
//! `Path`, so percent-decoding happens exactly once, inside
//! `StorageKey::canonicalize`.

use crate::{
    errors::AppError,
    handlers::dav_handlers,
    models::{
        key::{ROOT_LISTING_URL, StorageKey},
        object::StoredObject,
    },
    services::{content_type::content_type_for, object_store::StoreError, webdav::http_date},
    state::AppState,
};
use axum::{
    Json,
    body::{Body, Bytes},
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode, Uri, header},
    response::{IntoResponse, Response},
};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::Serialize;
use tracing::debug;

/// RFC 5987 `attr-char` complement.
const FILENAME_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'.')
    .remove(b'-')
    .remove(b'_')
    .remove(b'~');

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreResponse {
    pub key: String,
    pub size: usize,
    pub content_type: String,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub key: String,
    pub deleted: bool,
}

/// `GET /` — browsers land on the root listing.
pub async fn redirect_root() -> impl IntoResponse {
    (StatusCode::FOUND, [(header::LOCATION, ROOT_LISTING_URL)])
}

/// `GET /{*key}` — download an object. Paths ending in `/` are collections
/// and are answered with their listing.
pub async fn fetch_object(
    State(state): State<AppState>,
    uri: Uri,
) -> Result<Response, AppError> {
    if uri.path().ends_with('/') {
        return Ok(dav_handlers::render_listing(&state, uri.path()).await);
    }

    let key = StorageKey::canonicalize(uri.path())?;
    let object = state.store.get(&key).await?;
    debug!("serving {} ({} bytes)", key, object.size);

    let mut response = Response::new(Body::from(object.content.clone()));
    *response.status_mut() = StatusCode::OK;
    set_object_headers(response.headers_mut(), &object);
    Ok(response)
}

/// `PUT /{*key}` — store the full request body, replacing any previous object.
pub async fn store_object(
    State(state): State<AppState>,
    uri: Uri,
    body: Bytes,
) -> Result<Response, AppError> {
    let key = StorageKey::canonicalize(uri.path())?;
    let content_type = content_type_for(key.as_str());
    let size = body.len();

    state
        .store
        .put(&key, body, Some(content_type.clone()))
        .await?;
    state.evict_parent_listing(&key);
    debug!("stored {} ({} bytes, {})", key, size, content_type);

    Ok((
        StatusCode::CREATED,
        Json(StoreResponse {
            key: key.to_string(),
            size,
            content_type,
        }),
    )
        .into_response())
}

/// `DELETE /{*key}` — idempotent; a missing object is still a success.
pub async fn delete_object(
    State(state): State<AppState>,
    uri: Uri,
) -> Result<Response, AppError> {
    let key = StorageKey::canonicalize(uri.path())?;
    match state.store.delete(&key).await {
        Ok(()) | Err(StoreError::NotFound(_)) => {}
        Err(err) => return Err(err.into()),
    }
    state.evict_parent_listing(&key);
    debug!("deleted {}", key);

    Ok((
        StatusCode::OK,
        Json(DeleteResponse {
            key: key.to_string(),
            deleted: true,
        }),
    )
        .into_response())
}

/// `MKCOL /{*path}` — create an empty folder marker (`path/`).
pub async fn make_collection(state: &AppState, raw_path: &str) -> Result<Response, AppError> {
    let key = StorageKey::canonicalize(raw_path)?;
    let key = if key.is_folder_marker() {
        key
    } else {
        StorageKey::new(&format!("{}/", key))?
    };

    state.store.put(&key, Bytes::new(), None).await?;
    state.evict_parent_listing(&key);
    debug!("created collection {}", key);

    Ok(StatusCode::CREATED.into_response())
}

fn set_object_headers(headers: &mut HeaderMap, object: &StoredObject) {
    let content_type = content_type_for(object.key.as_str());
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );

    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(object.size));

    let quoted = format!("\"{}\"", object.etag);
    if let Ok(value) = HeaderValue::from_str(&quoted) {
        headers.insert(header::ETAG, value);
    }

    if let Ok(value) = HeaderValue::from_str(&http_date(object.uploaded_at)) {
        headers.insert(header::LAST_MODIFIED, value);
    }

    if let Ok(value) = HeaderValue::from_str(&content_disposition(object.key.file_name())) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
}

/// `inline` disposition with an ASCII fallback name and the exact UTF-8 name.
fn content_disposition(filename: &str) -> String {
    let fallback: String = filename
        .chars()
        .map(|c| {
            if c.is_ascii() && !c.is_ascii_control() && c != '"' && c != '\\' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!(
        "inline; filename=\"{}\"; filename*=UTF-8''{}",
        fallback,
        utf8_percent_encode(filename, FILENAME_ENCODE_SET)
    )
}
