//! WebDAV collection listings and cache maintenance.
//!
//! - `GET|PROPFIND /dav[/{*path}]`, `PROPFIND /{*path}`, `GET /{*path}/` -> 207 multistatus
//! - `OPTIONS` anywhere -> capability discovery (`DAV`, `Allow`)
//! - `POST|GET /_cache/evict` -> drop the cached root listing

use crate::{
    errors::AppError,
    handlers::object_handlers,
    models::key::CollectionPath,
    services::{edge_cache::CacheLookup, webdav},
    state::AppState,
};
use axum::{
    Json,
    body::{Body, Bytes},
    extract::{Request, State},
    http::{HeaderName, HeaderValue, Method, StatusCode, Uri, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde_json::json;
use tracing::{debug, info, warn};

pub const DAV: HeaderName = HeaderName::from_static("dav");
pub const X_CACHE: HeaderName = HeaderName::from_static("x-cache");
pub const DAV_COMPLIANCE: &str = "1, 2";
pub const XML_CONTENT_TYPE: &str = "application/xml; charset=utf-8";
pub const ALLOWED_METHODS: &str = "OPTIONS, GET, HEAD, PUT, DELETE, POST, PROPFIND, MKCOL";

/// `GET /dav[/{*path}]`
pub async fn list_collection(State(state): State<AppState>, uri: Uri) -> Response {
    render_listing(&state, uri.path()).await
}

/// Method fallback for object paths: WebDAV verbs axum has no filter for.
pub async fn dav_methods(State(state): State<AppState>, method: Method, uri: Uri) -> Response {
    match method.as_str() {
        "PROPFIND" => render_listing(&state, uri.path()).await,
        "MKCOL" => object_handlers::make_collection(&state, uri.path())
            .await
            .into_response(),
        "OPTIONS" => StatusCode::OK.into_response(),
        _ => method_not_allowed(),
    }
}

/// Method fallback for the listing namespace, which is read-only.
pub async fn listing_methods(State(state): State<AppState>, method: Method, uri: Uri) -> Response {
    match method.as_str() {
        "PROPFIND" => render_listing(&state, uri.path()).await,
        "OPTIONS" => StatusCode::OK.into_response(),
        _ => method_not_allowed(),
    }
}

/// Outermost middleware: every response advertises DAV compliance, and
/// `OPTIONS` answers (including CORS preflights) list the allowed methods.
pub async fn advertise_dav(request: Request, next: Next) -> Response {
    let is_options = request.method() == Method::OPTIONS;
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers
        .entry(DAV)
        .or_insert(HeaderValue::from_static(DAV_COMPLIANCE));
    if is_options {
        headers.insert(header::ALLOW, HeaderValue::from_static(ALLOWED_METHODS));
    }
    response
}

/// `POST /_cache/evict` — only the root listing is evicted; nested listings
/// stay cached until their own contents change.
pub async fn evict_root_cache(State(state): State<AppState>) -> Result<Response, AppError> {
    let url = CollectionPath::root().listing_url();
    state.invalidator.schedule_evict(url.clone())?;
    info!(url = %url, "scheduled root listing eviction");

    Ok((StatusCode::OK, Json(json!({ "status": "ok", "evicted": url }))).into_response())
}

/// Build the 207 listing for a raw collection path, reading through the edge
/// cache. Failures past path validation become XML error documents.
pub async fn render_listing(state: &AppState, raw_path: &str) -> Response {
    let collection = match CollectionPath::from_request_path(raw_path) {
        Ok(collection) => collection,
        Err(err) => return AppError::from(err).into_response(),
    };

    let url = collection.listing_url();
    let ticket = match state.cache.lookup(&url).await {
        CacheLookup::Hit(body) => {
            debug!(url = %url, "serving cached listing");
            return multistatus(body, "HIT");
        }
        CacheLookup::Miss(ticket) => ticket,
    };

    let entries = match state.store.list(&collection.store_prefix()).await {
        Ok(entries) => entries,
        Err(err) => {
            warn!(url = %url, error = %err, "listing failed");
            return dav_error(&err.to_string());
        }
    };

    match webdav::render(&collection, &entries, Utc::now()) {
        Ok(document) => {
            let body = Bytes::from(document);
            let cached = state.cache.store(&url, ticket, body.clone()).await;
            debug!(url = %url, entries = entries.len(), cached, "rendered listing");
            multistatus(body, "MISS")
        }
        Err(err) => {
            warn!(url = %url, error = %err, "listing render failed");
            dav_error(&err.to_string())
        }
    }
}

fn multistatus(body: Bytes, cache_status: &'static str) -> Response {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = StatusCode::MULTI_STATUS;
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(XML_CONTENT_TYPE),
    );
    headers.insert(DAV, HeaderValue::from_static(DAV_COMPLIANCE));
    headers.insert(X_CACHE, HeaderValue::from_static(cache_status));
    response
}

fn dav_error(message: &str) -> Response {
    let mut response = Response::new(Body::from(webdav::render_error(message)));
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(XML_CONTENT_TYPE),
    );
    headers.insert(DAV, HeaderValue::from_static(DAV_COMPLIANCE));
    response
}

fn method_not_allowed() -> Response {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        [(header::ALLOW, HeaderValue::from_static(ALLOWED_METHODS))],
    )
        .into_response()
}
