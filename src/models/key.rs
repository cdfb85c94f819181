//! Storage keys and collection paths.
//!
//! Every resource path that reaches the object store goes through
//! [`StorageKey::canonicalize`]. A `StorageKey` can only be built by the
//! checks in this module, so holding one means the value is free of
//! traversal sequences and safe to hand to the store as an opaque id.

use percent_encoding::percent_decode_str;
use std::fmt;
use thiserror::Error;

/// Logical URL of the root collection listing.
pub const ROOT_LISTING_URL: &str = "/dav";

const MAX_KEY_LEN: usize = 1024;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("path is empty")]
    Empty,
    #[error("path contains a traversal sequence")]
    Traversal,
    #[error("path is not valid UTF-8 after decoding")]
    InvalidEncoding,
    #[error("path is still percent-encoded after decoding")]
    DoubleEncoded,
    #[error("path contains control characters or backslashes")]
    ForbiddenCharacter,
    #[error("path exceeds {MAX_KEY_LEN} bytes")]
    TooLong,
}

/// A normalized, traversal-free object identifier (no leading `/`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StorageKey(String);

impl StorageKey {
    /// Canonicalize a raw (still percent-encoded) request path.
    ///
    /// Decodes once, then applies the same checks as [`StorageKey::new`].
    pub fn canonicalize(raw_path: &str) -> Result<Self, PathError> {
        let decoded = percent_decode_str(raw_path)
            .decode_utf8()
            .map_err(|_| PathError::InvalidEncoding)?;
        if contains_percent_escape(&decoded) {
            return Err(PathError::DoubleEncoded);
        }
        Self::new(&decoded)
    }

    /// Validate an already-decoded path, e.g. an uploaded filename.
    pub fn new(decoded: &str) -> Result<Self, PathError> {
        if decoded.trim().is_empty() {
            return Err(PathError::Empty);
        }
        if decoded.contains("..") {
            return Err(PathError::Traversal);
        }
        if decoded.chars().any(|c| c.is_control() || c == '\\') {
            return Err(PathError::ForbiddenCharacter);
        }

        // Empty and `.` segments collapse: `//a//./b` is `a/b`.
        let mut key = decoded
            .split('/')
            .filter(|segment| !segment.is_empty() && *segment != ".")
            .collect::<Vec<_>>()
            .join("/");
        if key.is_empty() {
            return Err(PathError::Empty);
        }
        if decoded.ends_with('/') {
            key.push('/');
        }
        if key.len() > MAX_KEY_LEN {
            return Err(PathError::TooLong);
        }
        Ok(Self(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Keys ending in `/` are folder markers.
    pub fn is_folder_marker(&self) -> bool {
        self.0.ends_with('/')
    }

    /// Last non-empty `/`-delimited segment.
    pub fn file_name(&self) -> &str {
        last_segment(&self.0).unwrap_or(&self.0)
    }

    /// The collection that lists this key as a direct child.
    pub fn parent(&self) -> CollectionPath {
        let trimmed = self.0.trim_end_matches('/');
        match trimmed.rsplit_once('/') {
            Some((parent, _)) => CollectionPath::from_trusted(parent),
            None => CollectionPath::root(),
        }
    }

    /// Logical URL of the parent listing, the cache entry a mutation of this
    /// key makes stale.
    pub fn parent_listing_url(&self) -> String {
        self.parent().listing_url()
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for StorageKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A virtual directory: `""` for the root, otherwise a key path without
/// leading or trailing slashes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionPath(String);

impl CollectionPath {
    pub fn root() -> Self {
        Self(String::new())
    }

    /// Resolve a raw request path addressed at a collection.
    ///
    /// Accepts both the listing namespace (`/dav`, `/dav/a/b`) and plain
    /// collection paths (`/a/b/`). Anything that is not the root is
    /// canonicalized like a storage key.
    pub fn from_request_path(raw_path: &str) -> Result<Self, PathError> {
        let path = strip_listing_prefix(raw_path);
        if path.trim_matches('/').is_empty() {
            return Ok(Self::root());
        }
        let key = StorageKey::canonicalize(path)?;
        let trimmed = key.as_str().trim_end_matches('/');
        if trimmed.is_empty() {
            return Ok(Self::root());
        }
        Ok(Self(trimmed.to_string()))
    }

    fn from_trusted(path: &str) -> Self {
        Self(path.trim_matches('/').to_string())
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Prefix handed to the store's `list`.
    pub fn store_prefix(&self) -> String {
        if self.is_root() {
            String::new()
        } else {
            format!("{}/", self.0)
        }
    }

    /// Path used as the collection's own href (`/` or `/a/b`).
    pub fn href_path(&self) -> String {
        format!("/{}", self.0)
    }

    /// Canonical logical URL of this collection's listing; the cache key.
    pub fn listing_url(&self) -> String {
        if self.is_root() {
            ROOT_LISTING_URL.to_string()
        } else {
            format!("{}/{}", ROOT_LISTING_URL, self.0)
        }
    }

    pub fn display_name(&self) -> &str {
        last_segment(&self.0).unwrap_or("root")
    }
}

/// Last non-empty `/`-delimited segment of a key.
pub fn last_segment(path: &str) -> Option<&str> {
    path.split('/').filter(|segment| !segment.is_empty()).next_back()
}

fn strip_listing_prefix(raw_path: &str) -> &str {
    match raw_path.strip_prefix(ROOT_LISTING_URL) {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => rest,
        _ => raw_path,
    }
}

fn contains_percent_escape(value: &str) -> bool {
    value
        .as_bytes()
        .windows(3)
        .any(|w| w[0] == b'%' && w[1].is_ascii_hexdigit() && w[2].is_ascii_hexdigit())
}
