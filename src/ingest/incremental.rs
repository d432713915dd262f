//! Incremental import: skip files whose content is unchanged since the last run.
//!
//! Discovered files are hashed and compared with the hashes recorded in the store.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::error::Result;

use super::metadata::{compute_file_hash, store_key};
use super::walker::DiscoveredFile;

/// A discovered file together with its current content hash
#[derive(Debug, Clone)]
pub struct HashedFile {
    pub file: DiscoveredFile,
    pub hash: String,
}

/// Result of classifying discovered files against the store
#[derive(Debug, Default)]
pub struct FileClassification {
    /// Files never imported
    pub new_files: Vec<HashedFile>,
    /// Files imported before with different content
    pub modified_files: Vec<HashedFile>,
    /// Files imported before with identical content
    pub unchanged_files: Vec<HashedFile>,
}

impl FileClassification {
    /// New and modified files, in discovery order of each group
    pub fn to_import(&self) -> Vec<HashedFile> {
        self.new_files
            .iter()
            .chain(self.modified_files.iter())
            .cloned()
            .collect()
    }
}

/// Classify files using `existing_hashes` (store key -> file hash)
pub fn classify_files(
    files: &[DiscoveredFile],
    existing_hashes: &HashMap<String, String>,
) -> Result<FileClassification> {
    let mut classification = FileClassification::default();

    for file in files {
        let hash = compute_file_hash(&file.absolute_path)?;
        let stored = existing_hashes.get(&store_key(&file.absolute_path));
        let hashed = HashedFile {
            file: file.clone(),
            hash,
        };

        match stored {
            None => classification.new_files.push(hashed),
            Some(stored) if stored != &hashed.hash => classification.modified_files.push(hashed),
            Some(_) => classification.unchanged_files.push(hashed),
        }
    }

    Ok(classification)
}

/// Stored file keys under `root` that were not discovered in this run
pub fn find_deleted_files<'a, I>(root: &Path, stored_keys: I, discovered: &[DiscoveredFile]) -> Vec<String>
where
    I: IntoIterator<Item = &'a String>,
{
    let present: HashSet<String> = discovered
        .iter()
        .map(|f| store_key(&f.absolute_path))
        .collect();

    stored_keys
        .into_iter()
        .filter(|key| Path::new(key.as_str()).starts_with(root))
        .filter(|key| !present.contains(*key))
        .cloned()
        .collect()
}
