//! Path resolution against a shell working directory.

use std::path::{Component, Path, PathBuf};

use directories::BaseDirs;

/// Resolve `rel` against `base`. Absolute inputs pass through; relative
/// inputs are joined. Either way `.` and `..` components are collapsed
/// lexically, without touching the filesystem.
pub fn resolve_path(base: impl AsRef<Path>, rel: impl AsRef<Path>) -> PathBuf {
    let rel = rel.as_ref();
    if rel.is_absolute() {
        normalize(rel)
    } else {
        normalize(&base.as_ref().join(rel))
    }
}

/// Collapse `.` and `..` lexically. `..` never pops past the root; in a
/// relative path leading `..` components are preserved.
pub(crate) fn normalize(path: &Path) -> PathBuf {
    let mut parts: Vec<Component> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match parts.last() {
                Some(Component::Normal(_)) => {
                    parts.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => parts.push(component),
            },
            _ => parts.push(component),
        }
    }
    if parts.is_empty() {
        PathBuf::from(".")
    } else {
        parts.iter().collect()
    }
}

/// The user's home directory, if one can be determined.
pub(crate) fn home_dir() -> Option<PathBuf> {
    BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_joins_against_base() {
        assert_eq!(resolve_path("/a/b", "./c"), PathBuf::from("/a/b/c"));
        assert_eq!(resolve_path("/a/b", "c/d"), PathBuf::from("/a/b/c/d"));
    }

    #[test]
    fn parent_components_collapse() {
        assert_eq!(resolve_path("/a/b", "../c"), PathBuf::from("/a/c"));
        assert_eq!(resolve_path("/a/b", "../../c"), PathBuf::from("/c"));
    }

    #[test]
    fn absolute_rel_passes_through() {
        assert_eq!(resolve_path("/a/b", "/x/y"), PathBuf::from("/x/y"));
        assert_eq!(resolve_path("/a/b", "/x/./y/.."), PathBuf::from("/x"));
    }

    #[test]
    fn parent_never_pops_past_root() {
        assert_eq!(resolve_path("/", "../../x"), PathBuf::from("/x"));
    }

    #[test]
    fn current_dir_components_vanish() {
        assert_eq!(resolve_path("/a", "././b/."), PathBuf::from("/a/b"));
    }
}
