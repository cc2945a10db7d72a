//! Path helpers shared by include resolution and the shell runner

use std::io;
use std::path::{Component, Path, PathBuf};

/// Convert platform separators to forward slashes (a no-op off Windows)
pub fn to_slash(path: &str) -> String {
    if std::path::MAIN_SEPARATOR == '/' {
        path.to_string()
    } else {
        path.replace(std::path::MAIN_SEPARATOR, "/")
    }
}

/// Convert forward slashes to the platform separator
pub fn from_slash(path: &str) -> String {
    if std::path::MAIN_SEPARATOR == '/' {
        path.to_string()
    } else {
        path.replace('/', std::path::MAIN_SEPARATOR_STR)
    }
}

/// Join `path` onto `base` unless `path` is already absolute
pub fn smart_join(base: &Path, path: &str) -> PathBuf {
    let candidate = Path::new(path);
    if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        base.join(candidate)
    }
}

/// Lexically normalise a path: drop `.` components and fold `..`
pub fn clean(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let can_pop = matches!(
                    out.components().next_back(),
                    Some(Component::Normal(_))
                );
                if can_pop {
                    out.pop();
                } else if !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

/// Absolute, cleaned form of `path` resolved against the process directory
pub fn absolute(path: &Path) -> io::Result<PathBuf> {
    std::path::absolute(path).map(|p| clean(&p))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean() {
        assert_eq!(clean(Path::new("/proj/./sub/Taskfile.yml")), PathBuf::from("/proj/sub/Taskfile.yml"));
        assert_eq!(clean(Path::new("/proj/a/../b")), PathBuf::from("/proj/b"));
        assert_eq!(clean(Path::new("/..")), PathBuf::from("/"));
        assert_eq!(clean(Path::new("../x")), PathBuf::from("../x"));
        assert_eq!(clean(Path::new("./")), PathBuf::from("."));
    }

    #[test]
    fn test_smart_join() {
        assert_eq!(smart_join(Path::new("/proj"), "sub"), PathBuf::from("/proj/sub"));
        assert_eq!(smart_join(Path::new("/proj"), ""), PathBuf::from("/proj/"));
        #[cfg(unix)]
        assert_eq!(smart_join(Path::new("/proj"), "/abs"), PathBuf::from("/abs"));
    }

    #[test]
    fn test_absolute_rejects_empty() {
        assert!(absolute(Path::new("")).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_slash_noop_on_unix() {
        assert_eq!(to_slash("a\\b"), "a\\b");
        assert_eq!(from_slash("a/b"), "a/b");
    }
}
