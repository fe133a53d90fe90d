//! Path and URL helpers
//!
//! Descriptors point at other documents by relative path or URL. These
//! helpers decide which of the two a string is, derive the base a document's
//! own references are relative to, and join references onto a base.

use std::path::{Component, Path};

use url::Url;

/// Whether `location` is a fully-qualified HTTP(S) URL
pub fn is_url(location: &str) -> bool {
    match Url::parse(location) {
        Ok(url) => matches!(url.scheme(), "http" | "https"),
        Err(_) => false,
    }
}

/// The base that references inside the document at `location` resolve against.
///
/// URLs yield `scheme://host/dirname` without a trailing slash, directories
/// yield themselves and files yield their containing directory. An empty
/// location has no base.
pub fn base_of(location: &str) -> Option<String> {
    if location.is_empty() {
        return None;
    }

    if is_url(location) {
        let url = Url::parse(location).ok()?;
        let host = url.host_str().unwrap_or("");
        let port = url.port().map(|p| format!(":{}", p)).unwrap_or_default();
        let dir = match url.path().rfind('/') {
            Some(idx) => &url.path()[..idx],
            None => "",
        };
        let base = format!("{}://{}{}{}", url.scheme(), host, port, dir);
        return Some(base.trim_end_matches('/').to_string());
    }

    let path = Path::new(location);
    if path.is_dir() {
        return Some(location.to_string());
    }

    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => Path::new(".").to_path_buf(),
    };
    let absolute = if parent.is_absolute() {
        parent
    } else {
        std::env::current_dir().unwrap_or_default().join(parent)
    };
    Some(absolute.to_string_lossy().to_string())
}

/// Join `reference` onto `base`.
///
/// - empty base: the reference as-is
/// - URL base: URL join, treating the base as a directory
/// - existing directory: filesystem join
/// - existing file: the file itself
pub fn join_location(base: &str, reference: &str) -> String {
    if base.is_empty() || is_url(reference) {
        return reference.to_string();
    }

    if is_url(base) {
        let dir = format!("{}/", base.trim_end_matches('/'));
        return match Url::parse(&dir).and_then(|b| b.join(reference)) {
            Ok(joined) => joined.to_string(),
            Err(_) => format!("{}{}", dir, reference),
        };
    }

    let base_path = Path::new(base);
    if base_path.is_file() {
        return base.to_string();
    }
    if Path::new(reference).is_absolute() {
        return reference.to_string();
    }
    base_path.join(reference).to_string_lossy().to_string()
}

/// Join a resource path onto a package base without the file-target rule.
///
/// Resource paths are always relative to the package directory or URL, even
/// when the directory does not exist yet.
pub fn join_resource_path(base: &str, path: &str) -> String {
    if base.is_empty() || is_url(path) {
        return path.to_string();
    }
    if is_url(base) {
        return format!("{}/{}", base.trim_end_matches('/'), path);
    }
    Path::new(base).join(path).to_string_lossy().to_string()
}

/// Whether a resource path is safe to join onto a package base.
///
/// URLs are safe. Filesystem paths must be relative, must not start with `~`
/// and must not contain `..` segments.
pub fn is_safe_path(path: &str) -> bool {
    if is_url(path) {
        return true;
    }
    if path.is_empty() || path.starts_with('~') || path.starts_with('/') || path.starts_with('\\') {
        return false;
    }
    Path::new(path).components().all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
        && !path.split(|c: char| c == '/' || c == '\\').any(|segment| segment == "..")
}

/// Strip the last segment of a URL: `http://a/b/datapackage.json` → `http://a/b`
pub fn url_parent(location: &str) -> String {
    match location.trim_end_matches('/').rfind('/') {
        Some(idx) => location[..idx].to_string(),
        None => location.to_string(),
    }
}
