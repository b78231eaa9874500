//! Small extension/content-based MIME sniffer for file previews (spec.md
//! §4.2: "MIME is detected from extension/content; binary files may return a
//! placeholder content and a binary MIME"). Deliberately not a dependency —
//! the mapping the registry needs is a handful of text formats plus a
//! binary/UTF-8 fallback, not the full IANA registry.

use std::path::Path;

const BINARY_PLACEHOLDER: &[u8] = b"[binary file]";

pub fn sniff(path: &Path, content: &[u8]) -> String {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();

    if let Some(mime) = by_extension(&ext) {
        return mime.to_string();
    }

    if is_binary(content) {
        "application/octet-stream".to_string()
    } else {
        "text/plain; charset=utf-8".to_string()
    }
}

/// Replace non-UTF8 / NUL-containing file content with a placeholder, as
/// spec.md §4.2 allows for binary files.
pub fn placeholder_if_binary(content: Vec<u8>) -> Vec<u8> {
    if is_binary(&content) {
        BINARY_PLACEHOLDER.to_vec()
    } else {
        content
    }
}

fn by_extension(ext: &str) -> Option<&'static str> {
    Some(match ext {
        "md" | "markdown" => "text/markdown; charset=utf-8",
        "proto" => "text/x-protobuf; charset=utf-8",
        "json" => "application/json",
        "yaml" | "yml" => "application/yaml",
        "toml" => "application/toml",
        "go" => "text/x-go; charset=utf-8",
        "ts" | "js" => "text/javascript; charset=utf-8",
        "rs" => "text/rust; charset=utf-8",
        "txt" => "text/plain; charset=utf-8",
        "html" | "htm" => "text/html; charset=utf-8",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        _ => return None,
    })
}

fn is_binary(content: &[u8]) -> bool {
    if content.contains(&0) {
        return true;
    }
    std::str::from_utf8(content).is_err()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn markdown_extension_is_detected() {
        let mime = sniff(&PathBuf::from("README.md"), b"# A\n");
        assert!(mime.contains("markdown"));
    }

    #[test]
    fn nul_bytes_are_treated_as_binary() {
        assert!(is_binary(&[0, 1, 2]));
        assert!(!is_binary(b"hello"));
    }
}
