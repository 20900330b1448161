//! Mapping between client-visible paths and host paths.
//!
//! Clients see the served folder as a virtual filesystem rooted at `/`.
//! Virtual paths are normalised lexically before they are joined onto the
//! host root, so `..` components can never climb above it.

use std::path::{Component, Path, PathBuf};

/// Resolves client paths beneath a fixed host directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualRoot {
    root: PathBuf,
}

impl VirtualRoot {
    /// Creates a resolver serving `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the host directory being served.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Normalises a client path into an absolute virtual path.
    ///
    /// Relative paths are taken relative to `/`. Empty paths and `.` name
    /// the root itself.
    pub fn normalize(path: &str) -> String {
        let mut parts: Vec<&str> = Vec::new();
        for component in Path::new(path).components() {
            match component {
                Component::Normal(part) => {
                    if let Some(part) = part.to_str() {
                        parts.push(part);
                    }
                }
                Component::ParentDir => {
                    parts.pop();
                }
                Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
            }
        }
        format!("/{}", parts.join("/"))
    }

    /// Resolves a client path to the host path it names.
    pub fn resolve(&self, path: &str) -> PathBuf {
        let virtual_path = Self::normalize(path);
        let relative = virtual_path.trim_start_matches('/');
        if relative.is_empty() {
            self.root.clone()
        } else {
            self.root.join(relative)
        }
    }

    /// Maps a host path back to the virtual path clients see.
    ///
    /// Paths outside the root are returned unchanged.
    pub fn to_virtual(&self, host_path: &Path) -> String {
        match host_path.strip_prefix(&self.root) {
            Ok(relative) => Self::normalize(&relative.to_string_lossy()),
            Err(_) => host_path.to_string_lossy().into_owned(),
        }
    }
}
