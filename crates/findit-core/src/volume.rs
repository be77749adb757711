//! Volume UUID → mount-point resolution for removable media.
//!
//! A registered folder on a removable volume records the volume's UUID at
//! registration time. If the folder's recorded path is unreachable on a
//! later scan, the watcher/scanner calls [`resolve_by_uuid`] to check
//! whether the volume remounted at a different path before treating the
//! folder's contents as orphaned.

use std::path::{Path, PathBuf};

/// A currently-mounted volume, as enumerated by the platform.
#[derive(Debug, Clone, PartialEq)]
pub struct MountedVolume {
    pub uuid: String,
    pub mount_point: PathBuf,
}

/// Enumerate currently mounted volumes. Backed by a platform-specific
/// mount table reader; this default covers the common `/media/<uuid>` and
/// `/run/media/<user>/<uuid>` removable-media mount conventions.
pub fn list_mounted_volumes() -> Vec<MountedVolume> {
    let mut volumes = Vec::new();
    for root in ["/media", "/run/media"] {
        collect_uuid_like_mounts(Path::new(root), &mut volumes, 2);
    }
    volumes
}

fn collect_uuid_like_mounts(dir: &Path, out: &mut Vec<MountedVolume>, depth: usize) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            if looks_like_uuid(name) {
                out.push(MountedVolume {
                    uuid: name.to_string(),
                    mount_point: path.clone(),
                });
                continue;
            }
        }
        if depth > 0 {
            collect_uuid_like_mounts(&path, out, depth - 1);
        }
    }
}

fn looks_like_uuid(s: &str) -> bool {
    let s = s.trim();
    matches!(s.len(), 32 | 36) && s.chars().all(|c| c.is_ascii_hexdigit() || c == '-')
}

/// Resolve a volume's current mount point by its recorded UUID, if it is
/// mounted right now.
pub fn resolve_by_uuid(uuid: &str) -> Option<PathBuf> {
    list_mounted_volumes()
        .into_iter()
        .find(|v| v.uuid == uuid)
        .map(|v| v.mount_point)
}

/// Given a folder's original absolute path and its recorded volume UUID,
/// reconcile to a currently-reachable path: the original path if it still
/// exists, else the UUID's current mount point joined with the path's
/// tail relative to its old mount root, else `None` (folder is orphaned
/// until the volume reappears).
pub fn reconcile_path(original: &Path, volume_uuid: Option<&str>, old_mount_root: &Path) -> Option<PathBuf> {
    if original.exists() {
        return Some(original.to_path_buf());
    }
    let uuid = volume_uuid?;
    let new_root = resolve_by_uuid(uuid)?;
    let relative = original.strip_prefix(old_mount_root).ok()?;
    Some(new_root.join(relative))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn looks_like_uuid_accepts_hyphenated_and_bare_forms() {
        assert!(looks_like_uuid("4F3A9E21-8B2C-4D11-9C77-1234567890AB"));
        assert!(looks_like_uuid("4f3a9e2100000000000000000000000a"));
        assert!(!looks_like_uuid("My Drive"));
    }

    #[test]
    fn reconcile_path_prefers_original_when_reachable() {
        let dir = tempfile::tempdir().unwrap();
        let result = reconcile_path(dir.path(), Some("anything"), Path::new("/old"));
        assert_eq!(result.as_deref(), Some(dir.path()));
    }

    #[test]
    fn reconcile_path_returns_none_without_uuid_when_unreachable() {
        let missing = Path::new("/nonexistent/path/for/findit/test");
        assert!(reconcile_path(missing, None, Path::new("/old")).is_none());
    }
}
