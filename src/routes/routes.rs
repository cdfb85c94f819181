//! Defines routes for the WebDAV gateway.
//!
//! ## Structure
//! - **Listing namespace**
//!   - `GET|PROPFIND /dav` — root collection listing
//!   - `GET|PROPFIND /dav/{*path}` — nested collection listing
//!   - read-only: other methods answer 405, so `dav/` is reserved
//!
//! - **Object paths**
//!   - `GET    /` — redirect to `/dav`
//!   - `GET    /{*key}` — download object (`/`-terminated paths list instead)
//!   - `PUT    /{*key}` — store object
//!   - `DELETE /{*key}` — delete object
//!   - `POST   /` or `/{*dir}` — multipart bulk upload
//!   - `PROPFIND /{*path}` — collection listing
//!   - `MKCOL  /{*path}` — create folder marker
//!
//! - **Maintenance**
//!   - `POST|GET /_cache/evict` — evict the cached root listing
//!   - `GET /healthz`, `GET /readyz`

use crate::{
    handlers::{
        dav_handlers::{
            DAV, advertise_dav, dav_methods, evict_root_cache, list_collection,
            listing_methods,
        },
        health_handlers::{healthz, readyz},
        object_handlers::{delete_object, fetch_object, redirect_root, store_object},
        upload_handlers::bulk_upload,
    },
    state::AppState,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::header,
    middleware,
    routing::{MethodRouter, get},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Build the router for every gateway route, carrying `AppState`.
pub fn routes() -> Router<AppState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route(
            "/_cache/evict",
            get(evict_root_cache).post(evict_root_cache),
        )
        // Listing namespace
        .route("/dav", listing_route())
        .route("/dav/{*path}", listing_route())
        // Object paths
        .route(
            "/",
            get(redirect_root)
                .put(store_object)
                .delete(delete_object)
                .post(bulk_upload)
                .fallback(dav_methods),
        )
        .route(
            "/{*key}",
            get(fetch_object)
                .put(store_object)
                .delete(delete_object)
                .post(bulk_upload)
                .fallback(dav_methods),
        )
}

/// The full application: routes, body limit, CORS, DAV headers and request
/// tracing.
pub fn app(state: AppState, max_upload_bytes: usize) -> Router {
    routes()
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(cors_layer())
        .layer(middleware::from_fn(advertise_dav))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn listing_route() -> MethodRouter<AppState> {
    get(list_collection).fallback(listing_methods)
}

/// Origin-agnostic CORS so browser front-ends on any host can talk WebDAV.
fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers([
            DAV,
            header::LOCATION,
            header::CONTENT_DISPOSITION,
            header::ETAG,
        ])
}
