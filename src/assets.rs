//! Asset scanning and staging.
//!
//! The deployment uploads one directory. Before anything is rendered, that
//! directory is walked, every file is hashed, and the per-file hashes are
//! folded into a single bundle hash:
//!
//! ```text
//! bundle = sha256( path₁ \0 sha256(file₁) \0  path₂ \0 sha256(file₂) \0 ... )
//! ```
//!
//! Paths are relative, `/`-separated, and sorted, so the bundle hash depends
//! only on file names and contents, never on walk order, mtimes, or the
//! absolute location of the project. It names the staged object
//! (`<hash>.zip`), the staging directory (`asset.<hash>`) and the
//! invalidation's caller reference.
//!
//! Hashing runs on rayon's pool; the file list is sorted afterwards.

use rayon::prelude::*;
use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum AssetError {
    #[error("asset directory {} does not exist", .0.display())]
    Missing(PathBuf),
    #[error("asset path {} is not a directory", .0.display())]
    NotADirectory(PathBuf),
    #[error("asset directory {} contains no files", .0.display())]
    Empty(PathBuf),
    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),
}

/// One file of the bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetFile {
    /// Path relative to the bundle root, `/`-separated.
    pub path: String,
    pub size: u64,
    pub sha256: String,
}

/// The scanned contents of an asset directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetBundle {
    pub source_dir: PathBuf,
    /// Sorted by `path`.
    pub files: Vec<AssetFile>,
    pub hash: String,
}

impl AssetBundle {
    /// Object key of the packaged bundle in the bootstrap assets bucket.
    pub fn object_key(&self) -> String {
        format!("{}.zip", self.hash)
    }

    /// Directory name the bundle is staged under inside the assembly.
    pub fn staging_dir_name(&self) -> String {
        format!("asset.{}", self.hash)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files
            .binary_search_by(|f| f.path.as_str().cmp(path))
            .is_ok()
    }

    pub fn total_size(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }
}

/// SHA-256 of a file's contents as lowercase hex.
pub fn hash_file(path: &Path) -> io::Result<String> {
    let bytes = fs::read(path)?;
    Ok(format!("{:x}", Sha256::digest(&bytes)))
}

/// Walk `dir` and hash every regular file.
///
/// Entries whose path contains a component listed in `exclude` are skipped
/// (e.g. `node_modules`). Symlinks are followed. The directory must exist
/// and hold at least one file.
pub fn scan_assets(dir: &Path, exclude: &[String]) -> Result<AssetBundle, AssetError> {
    if !dir.exists() {
        return Err(AssetError::Missing(dir.to_path_buf()));
    }
    if !dir.is_dir() {
        return Err(AssetError::NotADirectory(dir.to_path_buf()));
    }

    let mut paths = Vec::new();
    let walker = WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0
                || !exclude
                    .iter()
                    .any(|ex| entry.file_name().to_str() == Some(ex.as_str()))
        });
    for entry in walker {
        let entry = entry?;
        if entry.file_type().is_file() {
            paths.push(entry.into_path());
        }
    }
    if paths.is_empty() {
        return Err(AssetError::Empty(dir.to_path_buf()));
    }

    let mut files = paths
        .par_iter()
        .map(|path| describe_file(dir, path))
        .collect::<Result<Vec<_>, _>>()?;
    files.sort_by(|a, b| a.path.cmp(&b.path));

    let hash = bundle_hash(&files);
    debug!(dir = %dir.display(), files = files.len(), %hash, "scanned assets");
    Ok(AssetBundle {
        source_dir: dir.to_path_buf(),
        files,
        hash,
    })
}

fn describe_file(root: &Path, path: &Path) -> Result<AssetFile, AssetError> {
    let io_err = |source: io::Error| AssetError::Io {
        path: path.to_path_buf(),
        source,
    };
    let size = fs::metadata(path).map_err(io_err)?.len();
    let sha256 = hash_file(path).map_err(io_err)?;
    Ok(AssetFile {
        path: relative_key(root, path),
        size,
        sha256,
    })
}

/// `path` relative to `root`, joined with `/` regardless of platform.
fn relative_key(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn bundle_hash(files: &[AssetFile]) -> String {
    let mut hasher = Sha256::new();
    for file in files {
        hasher.update(file.path.as_bytes());
        hasher.update(b"\0");
        hasher.update(file.sha256.as_bytes());
        hasher.update(b"\0");
    }
    format!("{:x}", hasher.finalize())
}

/// Copy the bundle's files into `<assembly_dir>/asset.<hash>/`.
///
/// Staging is content-addressed: if the directory already exists it holds
/// exactly these files and the copy is skipped. Returns the staging path and
/// whether anything was copied.
pub fn stage_bundle(bundle: &AssetBundle, assembly_dir: &Path) -> Result<(PathBuf, bool), AssetError> {
    let target = assembly_dir.join(bundle.staging_dir_name());
    if target.is_dir() {
        debug!(dir = %target.display(), "asset already staged");
        return Ok((target, false));
    }

    // Copy into a sibling and rename, so an interrupted copy never leaves a
    // directory that looks complete.
    let partial = assembly_dir.join(format!("{}.partial", bundle.staging_dir_name()));
    if partial.exists() {
        fs::remove_dir_all(&partial).map_err(|source| AssetError::Io {
            path: partial.clone(),
            source,
        })?;
    }
    for file in &bundle.files {
        let src = bundle.source_dir.join(&file.path);
        let dst = partial.join(&file.path);
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent).map_err(|source| AssetError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::copy(&src, &dst).map_err(|source| AssetError::Io { path: src, source })?;
    }
    fs::rename(&partial, &target).map_err(|source| AssetError::Io {
        path: target.clone(),
        source,
    })?;
    debug!(dir = %target.display(), files = bundle.files.len(), "staged assets");
    Ok((target, true))
}
