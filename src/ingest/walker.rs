use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::{Result, TrajloadError};

/// A file selected for import
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredFile {
    /// Path relative to the discovery root (file name for single-file input)
    pub relative_path: String,
    pub absolute_path: PathBuf,
}

/// Resolve the set of files to import from `root`.
///
/// A regular file is returned as is, whatever its extension. A directory is
/// enumerated breadth-first through a queue: its entries are enqueued, dequeued
/// directories enqueue their own entries, and dequeued files whose name ends in
/// `.{extension}` (ASCII case-insensitive) are kept. Entries of one directory are
/// visited in file-name order. Symlinked directories are not followed.
pub fn discover_files(root: &Path, extension: &str) -> Result<Vec<DiscoveredFile>> {
    if root.is_file() {
        let relative_path = root
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| root.display().to_string());
        return Ok(vec![DiscoveredFile {
            relative_path,
            absolute_path: root.to_path_buf(),
        }]);
    }

    if !root.is_dir() {
        return Err(TrajloadError::PathNotFound(root.to_path_buf()));
    }

    let suffix = format!(".{}", extension.trim_start_matches('.').to_lowercase());
    let mut queue: VecDeque<PathBuf> = VecDeque::new();
    let mut files = Vec::new();

    inspect_directory(root, &mut queue);
    while let Some(path) = queue.pop_front() {
        if path.is_dir() {
            inspect_directory(&path, &mut queue);
            continue;
        }

        let matches = path
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase().ends_with(&suffix))
            .unwrap_or(false);
        if !matches {
            continue;
        }

        let relative_path = path
            .strip_prefix(root)
            .map_err(|_| {
                TrajloadError::Config(format!(
                    "Failed to compute relative path for: {}",
                    path.display()
                ))
            })?
            .to_string_lossy()
            .to_string();

        files.push(DiscoveredFile {
            relative_path,
            absolute_path: path,
        });
    }

    log::info!("Discovered {} {} files in {}", files.len(), suffix, root.display());
    Ok(files)
}

/// Enqueue the direct children of `dir`
fn inspect_directory(dir: &Path, queue: &mut VecDeque<PathBuf>) {
    log::debug!("Inspecting directory {}", dir.display());

    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                log::warn!("Skipping unreadable entry under {}: {}", dir.display(), e);
                continue;
            }
        };

        // Real directories are walked; symlinks only count when they point at a file
        if entry.file_type().is_dir() || entry.path().is_file() {
            queue.push_back(entry.into_path());
        }
    }
}
