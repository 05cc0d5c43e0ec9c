//! Tree walker: flat, ordered manifests of filesystem images.

use std::fmt;
use std::path::Path;

use log::debug;

use crate::error::{ImageError, Result};
use crate::vfs::{open_image, Filesystem};

/// Directory trees deeper than this are treated as malformed. Legacy
/// formats can synthesize self-referential directory entries; the guard
/// turns a runaway recursion into an error.
pub const MAX_WALK_DEPTH: usize = 64;

/// One walked path: absolute within the image, directories marked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub path: String,
    pub is_dir: bool,
}

impl ManifestEntry {
    /// Final path component.
    pub fn name(&self) -> &str {
        self.path.rsplit('/').find(|c| !c.is_empty()).unwrap_or("")
    }
}

impl fmt::Display for ManifestEntry {
    /// Directories carry a trailing separator, files do not.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_dir {
            write!(f, "{}/", self.path)
        } else {
            write!(f, "{}", self.path)
        }
    }
}

/// Ordered, flattened listing of every path in an image: each directory
/// precedes all of its descendants (preorder).
pub type Manifest = Vec<ManifestEntry>;

/// List every path in an image, walking from the root.
pub fn list_image_files(image: &Path) -> Result<Manifest> {
    let fs = open_image(image)?;
    walk(fs.as_ref(), "/")
}

/// Walk a filesystem from `start`, producing its manifest.
///
/// Enumeration order is whatever the format yields; no extra sort is
/// imposed. `.`/`..` and entries the format marks as the volume-label
/// placeholder are never materialized, nor is any entry whose joined path
/// equals its parent's own path. Recomputed from scratch on every call.
pub fn walk(fs: &dyn Filesystem, start: &str) -> Result<Manifest> {
    let mut manifest = Vec::new();
    walk_dir(fs, start, 0, &mut manifest)?;
    debug!("walked {} entries under {}", manifest.len(), start);
    Ok(manifest)
}

fn walk_dir(fs: &dyn Filesystem, dir: &str, depth: usize, out: &mut Manifest) -> Result<()> {
    if depth >= MAX_WALK_DEPTH {
        return Err(ImageError::TooDeep {
            path: dir.to_string(),
            limit: MAX_WALK_DEPTH,
        });
    }
    for entry in fs.read_dir(dir)? {
        if entry.name == "." || entry.name == ".." {
            continue;
        }
        if entry.is_volume_label {
            continue;
        }
        let joined = join(dir, &entry.name);
        if joined == dir {
            continue;
        }
        if entry.is_dir {
            out.push(ManifestEntry {
                path: joined.clone(),
                is_dir: true,
            });
            walk_dir(fs, &joined, depth + 1, out)?;
        } else {
            out.push(ManifestEntry {
                path: joined,
                is_dir: false,
            });
        }
    }
    Ok(())
}

fn join(dir: &str, name: &str) -> String {
    let base = dir.trim_end_matches('/');
    format!("{base}/{name}")
}
