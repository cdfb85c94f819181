//! WebDAV gateway over a flat key-value object store.
//!
//! Object keys are exposed as a browsable hierarchy: `GET`/`PUT`/`DELETE`
//! address single objects, `PROPFIND` (or `GET /dav/...`) renders collection
//! listings, and every mutation evicts the cached listing it affects.

pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
