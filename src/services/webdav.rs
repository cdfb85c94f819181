//! WebDAV multistatus rendering for collection listings.
//!
//! The store hands back a flat, unordered list of every key under a prefix.
//! Rendering reduces that to the collection's immediate children: deeper keys
//! collapse into a synthetic folder entry, and the collection's own folder
//! marker is skipped. Children are emitted in key order.

use crate::models::{
    key::{CollectionPath, last_segment},
    object::ObjectEntry,
};
use chrono::{DateTime, SecondsFormat, Utc};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use std::{collections::BTreeMap, fmt::Write};
use thiserror::Error;

/// Everything except unreserved characters and the path separator.
const HREF_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~')
    .remove(b'/');

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("entry `{key}` is outside collection prefix `{prefix}`")]
    ForeignEntry { key: String, prefix: String },
    #[error("failed to write listing document")]
    Format(#[from] std::fmt::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Child {
    /// Folder marker, or a folder implied by deeper keys (no timestamp).
    Folder { uploaded_at: Option<DateTime<Utc>> },
    File { size: u64, uploaded_at: DateTime<Utc> },
}

/// Render the multistatus document for `collection` and its children.
///
/// `now` supplies the synthetic dates of the collection itself and of implied
/// folders.
pub fn render(
    collection: &CollectionPath,
    entries: &[ObjectEntry],
    now: DateTime<Utc>,
) -> Result<String, RenderError> {
    let prefix = collection.store_prefix();
    let children = immediate_children(&prefix, entries)?;

    let mut xml = String::from(r#"<?xml version="1.0" encoding="utf-8"?>"#);
    xml.push_str(r#"<D:multistatus xmlns:D="DAV:">"#);

    write_response(
        &mut xml,
        &collection.href_path(),
        collection.display_name(),
        true,
        now,
        None,
    )?;

    for (key, child) in &children {
        let name = last_segment(key).unwrap_or(key);
        let href = format!("/{}", key);
        match *child {
            Child::Folder { uploaded_at } => {
                write_response(&mut xml, &href, name, true, uploaded_at.unwrap_or(now), None)?
            }
            Child::File { size, uploaded_at } => {
                write_response(&mut xml, &href, name, false, uploaded_at, Some(size))?
            }
        }
    }

    xml.push_str("</D:multistatus>");
    Ok(xml)
}

/// Top-level XML error document for failures while producing a listing.
pub fn render_error(message: &str) -> String {
    format!(
        concat!(
            r#"<?xml version="1.0" encoding="utf-8"?>"#,
            r#"<D:error xmlns:D="DAV:">"#,
            r#"<D:message>{}</D:message>"#,
            r#"</D:error>"#
        ),
        xml_escape(message)
    )
}

/// RFC 1123 date in GMT, as used by `getlastmodified`.
pub fn http_date(ts: DateTime<Utc>) -> String {
    ts.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Reduce a flat prefix listing to the direct children of `prefix`.
///
/// Adapted from S3 common-prefix grouping with `/` as the delimiter.
fn immediate_children(
    prefix: &str,
    entries: &[ObjectEntry],
) -> Result<BTreeMap<String, Child>, RenderError> {
    let mut children = BTreeMap::new();
    for entry in entries {
        let rest = entry
            .key
            .strip_prefix(prefix)
            .ok_or_else(|| RenderError::ForeignEntry {
                key: entry.key.clone(),
                prefix: prefix.to_string(),
            })?;
        if rest.is_empty() {
            continue;
        }

        match rest.find('/') {
            Some(pos) if pos + 1 == rest.len() => {
                children.insert(
                    entry.key.clone(),
                    Child::Folder {
                        uploaded_at: Some(entry.uploaded_at),
                    },
                );
            }
            Some(pos) => {
                let folder = format!("{}{}", prefix, &rest[..=pos]);
                children
                    .entry(folder)
                    .or_insert(Child::Folder { uploaded_at: None });
            }
            None => {
                children.insert(
                    entry.key.clone(),
                    Child::File {
                        size: entry.size,
                        uploaded_at: entry.uploaded_at,
                    },
                );
            }
        }
    }
    Ok(children)
}

fn write_response(
    xml: &mut String,
    href: &str,
    name: &str,
    is_collection: bool,
    modified: DateTime<Utc>,
    content_length: Option<u64>,
) -> Result<(), RenderError> {
    let href = utf8_percent_encode(href, HREF_ENCODE_SET).to_string();
    xml.push_str("<D:response>");
    write!(xml, "<D:href>{}</D:href>", xml_escape(&href))?;
    xml.push_str("<D:propstat><D:prop>");
    if is_collection {
        xml.push_str("<D:resourcetype><D:collection/></D:resourcetype>");
    } else {
        xml.push_str("<D:resourcetype/>");
    }
    write!(xml, "<D:displayname>{}</D:displayname>", xml_escape(name))?;
    write!(
        xml,
        "<D:creationdate>{}</D:creationdate>",
        modified.to_rfc3339_opts(SecondsFormat::Secs, true)
    )?;
    write!(
        xml,
        "<D:getlastmodified>{}</D:getlastmodified>",
        http_date(modified)
    )?;
    if let Some(length) = content_length {
        write!(xml, "<D:getcontentlength>{}</D:getcontentlength>", length)?;
    }
    xml.push_str("</D:prop><D:status>HTTP/1.1 200 OK</D:status></D:propstat>");
    xml.push_str("</D:response>");
    Ok(())
}

fn xml_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 5, 14, 7, 9).unwrap()
    }

    fn entry(key: &str, size: u64) -> ObjectEntry {
        ObjectEntry {
            key: key.to_string(),
            size,
            uploaded_at: ts(),
        }
    }

    fn responses(xml: &str) -> Vec<&str> {
        xml.split("<D:response>").skip(1).collect()
    }

    #[test]
    fn renders_collection_then_children() {
        let collection = CollectionPath::from_request_path("/dav/x").unwrap();
        let xml = render(&collection, &[entry("x/sub/", 0), entry("x/a.txt", 10)], ts()).unwrap();

        let parts = responses(&xml);
        assert_eq!(parts.len(), 3);

        assert!(parts[0].contains("<D:href>/x</D:href>"));
        assert!(parts[0].contains("<D:collection/>"));
        assert!(parts[0].contains("<D:displayname>x</D:displayname>"));

        assert!(parts[1].contains("<D:href>/x/a.txt</D:href>"));
        assert!(parts[1].contains("<D:resourcetype/>"));
        assert!(parts[1].contains("<D:getcontentlength>10</D:getcontentlength>"));
        assert!(parts[1].contains("<D:getlastmodified>Tue, 05 Mar 2024 14:07:09 GMT</D:getlastmodified>"));

        assert!(parts[2].contains("<D:href>/x/sub/</D:href>"));
        assert!(parts[2].contains("<D:collection/>"));
        assert!(parts[2].contains("<D:displayname>sub</D:displayname>"));
        assert!(!parts[2].contains("getcontentlength"));
    }

    #[test]
    fn root_collection_is_named_root() {
        let xml = render(&CollectionPath::root(), &[], ts()).unwrap();
        let parts = responses(&xml);
        assert_eq!(parts.len(), 1);
        assert!(parts[0].contains("<D:href>/</D:href>"));
        assert!(parts[0].contains("<D:displayname>root</D:displayname>"));
        assert!(parts[0].contains("<D:creationdate>2024-03-05T14:07:09Z</D:creationdate>"));
    }

    #[test]
    fn deep_keys_collapse_into_one_folder_and_self_marker_is_skipped() {
        let collection = CollectionPath::from_request_path("/x").unwrap();
        let entries = [
            entry("x/", 0),
            entry("x/deep/one.txt", 1),
            entry("x/deep/two/three.txt", 1),
            entry("x/deep/", 0),
        ];
        let xml = render(&collection, &entries, ts()).unwrap();
        let parts = responses(&xml);
        assert_eq!(parts.len(), 2);
        assert!(parts[1].contains("<D:href>/x/deep/</D:href>"));
    }

    #[test]
    fn escapes_names_and_hrefs() {
        let collection = CollectionPath::root();
        let xml = render(&collection, &[entry("<b>&co \"q\".txt", 3)], ts()).unwrap();
        assert!(xml.contains("<D:displayname>&lt;b&gt;&amp;co &quot;q&quot;.txt</D:displayname>"));
        assert!(xml.contains("<D:href>/%3Cb%3E%26co%20%22q%22.txt</D:href>"));
        assert!(!xml.contains("<b>"));
    }

    #[test]
    fn entries_outside_the_prefix_are_an_error() {
        let collection = CollectionPath::from_request_path("/x").unwrap();
        let err = render(&collection, &[entry("y/a.txt", 1)], ts()).unwrap_err();
        assert!(matches!(err, RenderError::ForeignEntry { .. }));
    }

    #[test]
    fn error_document_is_top_level() {
        let doc = render_error("disk <full>");
        assert!(doc.contains(r#"<D:error xmlns:D="DAV:"><D:message>disk &lt;full&gt;</D:message></D:error>"#));
        assert!(!doc.contains("multistatus"));
    }
}
