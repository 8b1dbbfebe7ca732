//! Lexically normalized absolute paths.
//!
//! Mount roots, the plugin socket and the mount table location all arrive as
//! user input (CLI, env, TOML). [`AbsolutePath`] anchors them to `/` and strips
//! `.`/`..` so that paths compared against the live mount table line up with
//! what the kernel reports.

use serde::{Deserialize, Serialize};
use std::ops::Deref;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

/// A path that is guaranteed to be absolute and normalized.
///
/// This type does not verify existence on disk.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AbsolutePath(PathBuf);

impl AbsolutePath {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self(path.as_ref().absolute())
    }
    pub fn into_inner(self) -> PathBuf {
        self.0
    }
    pub fn as_path(&self) -> &Path {
        &self.0
    }
    pub fn parent(&self) -> Option<AbsolutePath> {
        self.0.parent().map(AbsolutePath::new)
    }
    pub fn join(&self, path: impl AsRef<Path>) -> AbsolutePath {
        AbsolutePath::new(self.0.join(path))
    }
}

trait PathExt {
    /// Resolves `.` and `..` without touching the filesystem.
    fn clean(&self) -> PathBuf;
    /// Anchors the path to the current working directory, then cleans it.
    fn absolute(&self) -> PathBuf;
}

impl PathExt for Path {
    fn clean(&self) -> PathBuf {
        let mut ret = PathBuf::new();
        for component in self.components() {
            match component {
                Component::Prefix(p) => ret.push(p.as_os_str()),
                Component::RootDir => ret.push(component.as_os_str()),
                Component::CurDir => {}
                Component::ParentDir => {
                    ret.pop();
                }
                Component::Normal(c) => ret.push(c),
            }
        }
        ret
    }
    fn absolute(&self) -> PathBuf {
        let anchored = std::path::absolute(self).unwrap_or_else(|_| self.to_path_buf());
        anchored.clean()
    }
}

impl From<PathBuf> for AbsolutePath {
    fn from(p: PathBuf) -> Self {
        Self::new(p)
    }
}

impl From<&Path> for AbsolutePath {
    fn from(p: &Path) -> Self {
        Self::new(p)
    }
}

impl From<AbsolutePath> for String {
    fn from(p: AbsolutePath) -> Self {
        p.0.to_string_lossy().into_owned()
    }
}

impl TryFrom<String> for AbsolutePath {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl FromStr for AbsolutePath {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err("path cannot be empty".to_string());
        }
        Ok(AbsolutePath(Path::new(s).absolute()))
    }
}

impl Deref for AbsolutePath {
    type Target = Path;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<Path> for AbsolutePath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl std::borrow::Borrow<Path> for AbsolutePath {
    fn borrow(&self) -> &Path {
        &self.0
    }
}

impl std::fmt::Display for AbsolutePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.display().fmt(f)
    }
}

impl PartialEq<Path> for AbsolutePath {
    fn eq(&self, other: &Path) -> bool {
        self.0 == other
    }
}

impl PartialEq<PathBuf> for AbsolutePath {
    fn eq(&self, other: &PathBuf) -> bool {
        self.0 == *other
    }
}
