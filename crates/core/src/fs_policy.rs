//! Filesystem containment policy.
//!
//! Validates and normalizes paths used by sandbox tools so that every file
//! operation stays inside the sandbox workspace root. Rejects `..` traversal
//! and absolute paths that point outside the root.
//!
//! The same check is re-implemented inside the in-container executor program:
//! host code is never shipped into container images, so the containment logic
//! cannot be imported there.

use crate::{Error, Result};
use std::path::{Component, Path, PathBuf};

/// Resolve a tool-supplied path against a workspace root.
///
/// Accepts relative paths (resolved under `root`) and absolute paths that
/// already lie inside `root`. Returns the full host path on success.
///
/// The check is purely lexical: `.` components are dropped, `..` components
/// pop the previous segment, and a `..` that would climb above the root is a
/// containment error. Symlinks are not followed here; workspace directories
/// are created by the environment builders and contain no links out.
pub fn resolve_within_root(root: &Path, input_path: &str) -> Result<PathBuf> {
    // Cross-platform check: reject Windows-style drive paths on any OS
    if input_path.len() >= 2
        && input_path.as_bytes()[1] == b':'
        && input_path.as_bytes()[0].is_ascii_alphabetic()
    {
        return Err(Error::security_violation(format!(
            "Absolute path {} is outside workspace root {}",
            input_path,
            root.display()
        )));
    }

    let candidate = Path::new(input_path);

    if candidate.is_absolute() {
        let normalized = normalize_lexically(candidate);
        if !normalized.starts_with(root) {
            return Err(Error::security_violation(format!(
                "Absolute path {} is outside workspace root {}",
                input_path,
                root.display()
            )));
        }
        return Ok(normalized);
    }

    let mut normalized = PathBuf::new();
    for component in candidate.components() {
        match component {
            Component::Normal(c) => normalized.push(c),
            Component::ParentDir => {
                if !normalized.pop() {
                    return Err(Error::security_violation(format!(
                        "Path traversal detected in path: {}",
                        input_path
                    )));
                }
            }
            Component::CurDir => {}
            Component::RootDir | Component::Prefix(_) => {
                return Err(Error::security_violation(format!(
                    "Absolute path {} is outside workspace root {}",
                    input_path,
                    root.display()
                )));
            }
        }
    }

    let full_path = root.join(&normalized);

    // Redundant guard against edge cases in join() on odd inputs.
    if !full_path.starts_with(root) {
        return Err(Error::security_violation(format!(
            "Access denied: path {} is outside of root {}",
            input_path,
            root.display()
        )));
    }

    Ok(full_path)
}

fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::RootDir | Component::Prefix(_) => out.push(component),
            Component::Normal(c) => out.push(c),
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
        }
    }
    out
}
