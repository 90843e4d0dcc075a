//! Filename sanitization and path-containment checks.
//!
//! Remote manifests name files we will create on disk; everything here
//! exists to keep those names from escaping the target directory.

use std::path::{Component, Path, PathBuf};

/// Longest accepted filename in bytes. Linux NAME_MAX is 255; the margin
/// leaves room for the `.part` suffix and scratch-file decorations.
const FILENAME_MAX: usize = 240;

/// Reduce a candidate filename to a safe basename, or reject it.
///
/// - Takes only the final path component (both `/` and `\` separators)
/// - Strips `..` sequences and NUL bytes, trims surrounding whitespace
/// - Accepts only names matching `[A-Za-z0-9_.-]+`, at most
///   `FILENAME_MAX` bytes
///
/// Returns `None` when nothing safe remains. A traversal-laden name whose
/// basename is itself clean (`../../etc/passwd` -> `passwd`) is accepted;
/// the containment check below still confines the write to the target dir.
pub fn sanitize_filename(raw: &str) -> Option<String> {
    if raw.is_empty() {
        return None;
    }

    let unified = raw.replace('\\', "/");
    let basename = unified.rsplit('/').next().unwrap_or("");
    let cleaned: String = basename.replace("..", "").replace('\0', "");
    let cleaned = cleaned.trim();

    if cleaned.is_empty() {
        return None;
    }
    if cleaned.len() > FILENAME_MAX {
        tracing::warn!(name = %truncate(cleaned, 50), len = cleaned.len(), "filename too long");
        return None;
    }
    if !is_safe_filename(cleaned) {
        tracing::warn!(name = %truncate(cleaned, 50), "filename rejected after sanitization");
        return None;
    }
    Some(cleaned.to_string())
}

/// True when every byte is in `[A-Za-z0-9_.-]`.
pub fn is_safe_filename(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-' || b == b'.')
}

/// True when `path` resolves strictly within `dir`.
///
/// Works on lexically-normalized absolute paths so the check does not
/// require either path to exist yet.
pub fn path_within_dir(path: &Path, dir: &Path) -> bool {
    let path = normalize(path);
    let dir = normalize(dir);
    path.starts_with(&dir)
}

/// Validate a storage key: relative, slash-separated, no `..` components.
/// Returns the key unchanged on success.
pub fn validate_key(key: &str) -> Result<&str, InvalidKey> {
    if key.is_empty() {
        return Err(InvalidKey::Empty);
    }
    let path = Path::new(key);
    if path.is_absolute() || key.starts_with('/') || key.starts_with('\\') {
        return Err(InvalidKey::Absolute);
    }
    for component in path.components() {
        match component {
            Component::ParentDir => return Err(InvalidKey::Traversal),
            Component::Prefix(_) | Component::RootDir => return Err(InvalidKey::Absolute),
            Component::CurDir | Component::Normal(_) => {}
        }
    }
    Ok(key)
}

/// Why a storage key was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum InvalidKey {
    #[error("storage key is empty")]
    Empty,
    #[error("storage key must be relative")]
    Absolute,
    #[error("storage key contains a parent-directory component")]
    Traversal,
}

/// Lexical normalization: resolve `.` and `..` without touching the
/// filesystem. `..` at the root is dropped, matching how the resolved
/// target could never climb above it.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn truncate(s: &str, max: usize) -> &str {
    let mut end = max.min(s.len());
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_fits_name_passes() {
        assert_eq!(
            sanitize_filename("jw02733-o001_t001_nircam_clear-f090w_i2d.fits").as_deref(),
            Some("jw02733-o001_t001_nircam_clear-f090w_i2d.fits")
        );
    }

    #[test]
    fn traversal_reduces_to_basename() {
        assert_eq!(sanitize_filename("../../etc/passwd").as_deref(), Some("passwd"));
        assert_eq!(sanitize_filename("..\\..\\win\\f.fits").as_deref(), Some("f.fits"));
    }

    #[test]
    fn disallowed_characters_rejected() {
        assert!(sanitize_filename("bad|file.fits").is_none());
        assert!(sanitize_filename("name with space.fits").is_none());
        assert!(sanitize_filename("semi;colon").is_none());
    }

    #[test]
    fn empty_and_dot_only_rejected() {
        assert!(sanitize_filename("").is_none());
        assert!(sanitize_filename("..").is_none());
        assert!(sanitize_filename("   ").is_none());
    }

    #[test]
    fn overlong_names_rejected() {
        let long = "a".repeat(239) + ".fits";
        assert!(sanitize_filename(&long).is_none());
        let fits = "a".repeat(235) + ".fits";
        assert_eq!(sanitize_filename(&fits).as_deref(), Some(fits.as_str()));
    }

    #[test]
    fn nul_bytes_stripped() {
        assert_eq!(sanitize_filename("file\0name.fits").as_deref(), Some("filename.fits"));
    }

    #[test]
    fn containment_check() {
        let dir = Path::new("/data/mast/obs1");
        assert!(path_within_dir(Path::new("/data/mast/obs1/a.fits"), dir));
        assert!(!path_within_dir(Path::new("/data/mast/obs2/a.fits"), dir));
        assert!(!path_within_dir(Path::new("/data/mast/obs1/../../etc/passwd"), dir));
    }

    #[test]
    fn key_validation() {
        assert!(validate_key("mast/obs1/file.fits").is_ok());
        assert_eq!(validate_key("/abs/key"), Err(InvalidKey::Absolute));
        assert_eq!(validate_key("a/../b"), Err(InvalidKey::Traversal));
        assert_eq!(validate_key(""), Err(InvalidKey::Empty));
    }
}
