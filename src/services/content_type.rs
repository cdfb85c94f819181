//! Content type resolution by file extension.

pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// MIME type for a key or filename, matched case-insensitively on the
/// extension. Unknown or missing extensions fall back to octet-stream.
pub fn content_type_for(name: &str) -> String {
    mime_guess::from_path(name)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}
