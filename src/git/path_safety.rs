//! Path validation for everything crossing a shell-out boundary (spec.md
//! §4.2's closing paragraph and §9's "subprocess injection surface" note).
//! Rejects `..` segments and absolute paths; the caller always expects a
//! path relative to a repository or checkout root.

use std::path::{Component, Path, PathBuf};

use crate::errors::RegistryError;
use path_absolutize::Absolutize;

pub fn safe_relative_path(raw: &str) -> Result<PathBuf, RegistryError> {
    let candidate = Path::new(raw);

    if candidate.is_absolute() {
        return Err(RegistryError::invalid_argument(format!(
            "path must be relative: {raw}"
        )));
    }

    for component in candidate.components() {
        match component {
            Component::ParentDir => {
                return Err(RegistryError::invalid_argument(format!(
                    "path must not contain '..': {raw}"
                )));
            }
            Component::Prefix(_) | Component::RootDir => {
                return Err(RegistryError::invalid_argument(format!(
                    "path must be relative: {raw}"
                )));
            }
            _ => {}
        }
    }

    // Belt-and-suspenders: absolutizing against a fixed virtual root and
    // re-checking the result still starts with that root catches any
    // platform-specific traversal trick `Component` parsing alone might miss.
    let root = Path::new("/virtual-root");
    let absolutized = candidate
        .absolutize_from(root)
        .map_err(|e| RegistryError::invalid_argument(format!("invalid path {raw}: {e}")))?;
    if !absolutized.starts_with(root) {
        return Err(RegistryError::invalid_argument(format!(
            "path escapes its root: {raw}"
        )));
    }

    Ok(candidate.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_relative_paths() {
        assert!(safe_relative_path("a/b/c.proto").is_ok());
        assert!(safe_relative_path("").is_ok());
    }

    #[test]
    fn rejects_parent_dir_segments() {
        assert!(safe_relative_path("../secret").is_err());
        assert!(safe_relative_path("a/../../b").is_err());
    }

    #[test]
    fn rejects_absolute_paths() {
        assert!(safe_relative_path("/etc/passwd").is_err());
    }
}
