//! URL to file-system path resolution.
//!
//! Resolution is purely lexical: it never touches the disk, so it can be
//! tested without fixtures. `..` components are clamped at the allowed root,
//! which keeps every result under either the server root or the shared data
//! directory.

use std::path::{Component, Path, PathBuf};

/// Literal segment that generated pages use to reach the shared data folder.
const SHARED_DATA_SEGMENT: &str = "../../data/";

/// Map a request path onto a file path.
///
/// - `/` (and an empty path) resolves to `entry_name` inside `root`
/// - query strings and fragments are discarded before decoding
/// - a path containing `../../data/` resolves inside [`shared_data_dir`]
/// - everything else resolves inside `root`
pub fn resolve_request_path(root: &Path, entry_name: &str, request_path: &str) -> PathBuf {
    let raw = request_path
        .split(['?', '#'])
        .next()
        .unwrap_or_default();

    if raw.is_empty() || raw == "/" {
        return root.join(entry_name);
    }

    let decoded = match urlencoding::decode(raw) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => raw.to_string(),
    };

    if let Some(pos) = decoded.rfind(SHARED_DATA_SEGMENT) {
        let rest = &decoded[pos + SHARED_DATA_SEGMENT.len()..];
        return clamp_join(&shared_data_dir(root), rest);
    }

    clamp_join(root, &decoded)
}

/// The `data` directory one level above the parent of `root`.
///
/// Roots too shallow to have a grandparent fall back to `root/data`.
pub fn shared_data_dir(root: &Path) -> PathBuf {
    root.parent()
        .and_then(Path::parent)
        .unwrap_or(root)
        .join("data")
}

/// Join a `/`-separated relative path onto `base` without ever leaving it.
fn clamp_join(base: &Path, relative: &str) -> PathBuf {
    let mut segments: Vec<&str> = Vec::new();

    for segment in relative.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => {
                // Drive prefixes and roots would replace `base` on push.
                let plain = Path::new(other)
                    .components()
                    .all(|c| matches!(c, Component::Normal(_)));
                if plain {
                    segments.push(other);
                }
            }
        }
    }

    let mut path = base.to_path_buf();
    path.extend(segments);
    path
}

/// MIME type for a file, by extension.
pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match ext.as_deref() {
        Some("html") => "text/html",
        Some("js") => "application/javascript",
        Some("css") => "text/css",
        Some("json") => "application/json",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        _ => "text/plain",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root() -> PathBuf {
        PathBuf::from("/work/out/visualizations/viz")
    }

    #[test]
    fn test_root_maps_to_entry() {
        assert_eq!(
            resolve_request_path(&root(), "index.html", "/"),
            root().join("index.html")
        );
        assert_eq!(
            resolve_request_path(&root(), "chart.html", "/?t=123"),
            root().join("chart.html")
        );
    }

    #[test]
    fn test_plain_paths_join_root() {
        assert_eq!(
            resolve_request_path(&root(), "index.html", "/js/app.js"),
            root().join("js").join("app.js")
        );
        assert_eq!(
            resolve_request_path(&root(), "index.html", "/data.json?t=99#top"),
            root().join("data.json")
        );
    }

    #[test]
    fn test_percent_decoding() {
        assert_eq!(
            resolve_request_path(&root(), "index.html", "/my%20chart.json"),
            root().join("my chart.json")
        );
    }

    #[test]
    fn test_traversal_is_clamped_at_root() {
        let resolved = resolve_request_path(&root(), "index.html", "/../../../../etc/passwd");
        assert_eq!(resolved, root().join("etc").join("passwd"));
        assert!(resolved.starts_with(root()));

        let encoded = resolve_request_path(&root(), "index.html", "/%2e%2e/%2e%2e/secret.txt");
        assert!(encoded.starts_with(root()));

        let mixed = resolve_request_path(&root(), "index.html", "/a/../../b\\..\\..\\c");
        assert_eq!(mixed, root().join("c"));
    }

    #[test]
    fn test_shared_data_segment_redirects() {
        let resolved = resolve_request_path(&root(), "index.html", "/../../data/metrics.json");
        assert_eq!(resolved, PathBuf::from("/work/out/data/metrics.json"));
    }

    #[test]
    fn test_shared_data_segment_cannot_escape() {
        let resolved =
            resolve_request_path(&root(), "index.html", "/../../data/../../../etc/passwd");
        let data_dir = shared_data_dir(&root());
        assert!(resolved.starts_with(&data_dir));
    }

    #[test]
    fn test_shared_data_dir_for_shallow_root() {
        assert_eq!(shared_data_dir(Path::new("viz")), PathBuf::from("viz/data"));
    }

    #[test]
    fn test_content_types() {
        assert_eq!(content_type_for(Path::new("index.html")), "text/html");
        assert_eq!(content_type_for(Path::new("app.js")), "application/javascript");
        assert_eq!(content_type_for(Path::new("style.css")), "text/css");
        assert_eq!(content_type_for(Path::new("data.json")), "application/json");
        assert_eq!(content_type_for(Path::new("a.png")), "image/png");
        assert_eq!(content_type_for(Path::new("a.jpg")), "image/jpeg");
        assert_eq!(content_type_for(Path::new("a.JPEG")), "image/jpeg");
        assert_eq!(content_type_for(Path::new("a.gif")), "image/gif");
        assert_eq!(content_type_for(Path::new("data.csv")), "text/plain");
        assert_eq!(content_type_for(Path::new("README")), "text/plain");
    }
}
