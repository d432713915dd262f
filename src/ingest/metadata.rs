use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::Result;

/// Compute SHA256 hash of file contents, streamed in blocks
pub fn compute_file_hash(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];

    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Key under which a file is recorded in the store
pub fn store_key(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_hash_changes_with_content() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"time,lat,lon\n").unwrap();
        f.flush().unwrap();
        let first = compute_file_hash(f.path()).unwrap();
        assert_eq!(first.len(), 64);
        assert_eq!(first, compute_file_hash(f.path()).unwrap());

        f.write_all(b"2020-01-01T00:00:00Z,1,2\n").unwrap();
        f.flush().unwrap();
        assert_ne!(first, compute_file_hash(f.path()).unwrap());
    }

    #[test]
    fn test_store_key_uses_forward_slashes() {
        assert_eq!(store_key(Path::new("data/day1/a.csv")), "data/day1/a.csv");
    }
}
