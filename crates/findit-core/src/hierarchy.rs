//! Hierarchy Resolver (§8 invariants, §3 Folder identity): decide how a
//! newly-requested folder path relates to the set of already-registered
//! folders, and whether registering it should create a new index root or
//! a bookmark into an existing one.
//!
//! Folder identity is the normalized absolute path with no trailing
//! slash; duplicate and overlap checks all operate on that normal form.

use std::path::{Path, PathBuf};

/// How one path relates to another registered folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FolderRelation {
    /// Same normalized path.
    Duplicate,
    /// `a` contains `b`.
    Parent,
    /// `a` is contained by `b`.
    Child,
    /// Neither contains the other.
    Unrelated,
}

/// Result of planning the registration of a new folder path against the
/// existing registered set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationPlan {
    /// Not related to anything already registered: add as a new,
    /// independent index root.
    NewRoot,
    /// Exact duplicate of an already-registered folder; registration is a
    /// no-op.
    AlreadyRegistered { existing: PathBuf },
    /// Contained within an already-registered folder; per §3's invariant,
    /// record it as a bookmark rather than an independent index root.
    Bookmark { parent: PathBuf },
    /// Contains one or more already-registered folders. Those folders
    /// keep their own Folder DBs; the new outer path is still registered
    /// as its own root (the invariant only forbids *exact* overlap, not a
    /// parent enclosing existing roots).
    EnclosesExisting { enclosed: Vec<PathBuf> },
}

/// Normalize a path to the form folder identity is compared in: absolute,
/// with any trailing separator stripped. Does not touch the filesystem
/// (no symlink resolution) — registered folders are compared by lexical
/// path identity, not canonicalized inode identity.
pub fn normalize(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    let trimmed = s.trim_end_matches(std::path::MAIN_SEPARATOR);
    PathBuf::from(if trimmed.is_empty() { "/" } else { trimmed })
}

/// Relate `a` to `b` after normalizing both.
pub fn relate(a: &Path, b: &Path) -> FolderRelation {
    let a = normalize(a);
    let b = normalize(b);
    if a == b {
        FolderRelation::Duplicate
    } else if b.starts_with(&a) {
        FolderRelation::Parent
    } else if a.starts_with(&b) {
        FolderRelation::Child
    } else {
        FolderRelation::Unrelated
    }
}

/// Decide how registering `candidate` should be handled against the
/// already-registered folder set.
pub fn plan_registration(candidate: &Path, registered: &[PathBuf]) -> RegistrationPlan {
    let candidate = normalize(candidate);

    for existing in registered {
        if relate(&candidate, existing) == FolderRelation::Duplicate {
            return RegistrationPlan::AlreadyRegistered {
                existing: existing.clone(),
            };
        }
    }

    for existing in registered {
        if relate(&candidate, existing) == FolderRelation::Child {
            return RegistrationPlan::Bookmark {
                parent: existing.clone(),
            };
        }
    }

    let enclosed: Vec<PathBuf> = registered
        .iter()
        .filter(|existing| relate(&candidate, existing) == FolderRelation::Parent)
        .cloned()
        .collect();

    if enclosed.is_empty() {
        RegistrationPlan::NewRoot
    } else {
        RegistrationPlan::EnclosesExisting { enclosed }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relate_is_reflexively_duplicate() {
        let p = Path::new("/library/video");
        assert_eq!(relate(p, p), FolderRelation::Duplicate);
    }

    #[test]
    fn relate_is_symmetric_under_swap() {
        let a = Path::new("/library");
        let b = Path::new("/library/video");
        assert_eq!(relate(a, b), FolderRelation::Parent);
        assert_eq!(relate(b, a), FolderRelation::Child);
    }

    #[test]
    fn relate_trailing_slash_does_not_affect_duplicate_detection() {
        let a = Path::new("/library/video/");
        let b = Path::new("/library/video");
        assert_eq!(relate(a, b), FolderRelation::Duplicate);
    }

    #[test]
    fn relate_unrelated_paths() {
        let a = Path::new("/library/video");
        let b = Path::new("/library/photo");
        assert_eq!(relate(a, b), FolderRelation::Unrelated);
    }

    #[test]
    fn plan_registration_new_root_when_unrelated() {
        let registered = vec![PathBuf::from("/library/photo")];
        let plan = plan_registration(Path::new("/library/video"), &registered);
        assert_eq!(plan, RegistrationPlan::NewRoot);
    }

    #[test]
    fn plan_registration_detects_exact_duplicate() {
        let registered = vec![PathBuf::from("/library/video")];
        let plan = plan_registration(Path::new("/library/video/"), &registered);
        assert_eq!(
            plan,
            RegistrationPlan::AlreadyRegistered {
                existing: PathBuf::from("/library/video")
            }
        );
    }

    #[test]
    fn plan_registration_nested_inner_path_is_a_bookmark() {
        let registered = vec![PathBuf::from("/library")];
        let plan = plan_registration(Path::new("/library/video/clips"), &registered);
        assert_eq!(
            plan,
            RegistrationPlan::Bookmark {
                parent: PathBuf::from("/library")
            }
        );
    }

    #[test]
    fn plan_registration_outer_path_encloses_existing_roots() {
        let registered = vec![PathBuf::from("/library/video"), PathBuf::from("/library/photo")];
        let plan = plan_registration(Path::new("/library"), &registered);
        match plan {
            RegistrationPlan::EnclosesExisting { mut enclosed } => {
                enclosed.sort();
                assert_eq!(
                    enclosed,
                    vec![PathBuf::from("/library/photo"), PathBuf::from("/library/video")]
                );
            }
            other => panic!("expected EnclosesExisting, got {other:?}"),
        }
    }
}
