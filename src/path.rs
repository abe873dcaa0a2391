//! Path normalization helpers.
//!
//! Pure, filesystem-free utilities: joining and lexically normalizing
//! paths, and converting to the forward-slash form used for key
//! comparisons (package.json `exports`/`browser` maps, cache keys).

use std::path::{Component, Path, PathBuf};

/// Lexical path normalization and joining, adapted from the `normalize-path`
/// pattern used throughout the resolver ecosystem: `..` pops a preceding
/// `Normal` component instead of being preserved, and `.` components are
/// dropped. Does not touch the filesystem.
pub trait PathUtil {
    fn normalize(&self) -> PathBuf;
    fn normalize_with<P: AsRef<Path>>(&self, path: P) -> PathBuf;
}

impl PathUtil for Path {
    fn normalize(&self) -> PathBuf {
        let mut components = self.components().peekable();
        let mut ret = if let Some(c @ Component::Prefix(..)) = components.peek().copied() {
            components.next();
            PathBuf::from(c.as_os_str())
        } else {
            PathBuf::new()
        };
        for component in components {
            match component {
                Component::Prefix(..) => unreachable!(),
                Component::RootDir => ret.push(component.as_os_str()),
                Component::CurDir => {}
                Component::ParentDir => {
                    if !ret.pop() {
                        ret.push("..");
                    }
                }
                Component::Normal(segment) => ret.push(segment),
            }
        }
        if ret.as_os_str().is_empty() {
            ret.push(".");
        }
        ret
    }

    fn normalize_with<P: AsRef<Self>>(&self, path: P) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            return path.normalize();
        }
        self.join(path).normalize()
    }
}

/// Replace backslashes with forward slashes so Windows and POSIX paths
/// compare equal in `exports`/`browser` field lookups.
#[must_use]
pub fn to_posix(path: &str) -> std::borrow::Cow<'_, str> {
    if path.contains('\\') {
        std::borrow::Cow::Owned(path.replace('\\', "/"))
    } else {
        std::borrow::Cow::Borrowed(path)
    }
}

/// `node_modules/` tail used to recognize the on-disk root of a dependency.
pub const NODE_MODULES: &str = "node_modules/";

/// Leading slash(es); used to strip a root-absolute url prefix.
pub const SLASH_START: [char; 2] = ['/', '\\'];
