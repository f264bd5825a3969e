//! IF-014: BLAKE3 hashing for generated artifacts and working directories.

use std::io::Read;
use std::path::Path;

const STREAM_BUF_SIZE: usize = 65536;

/// Hash a file's contents. Returns `"blake3:{hex}"`.
pub fn hash_file(path: &Path) -> Result<String, String> {
    let mut file =
        std::fs::File::open(path).map_err(|e| format!("cannot open {}: {}", path.display(), e))?;
    let mut hasher = blake3::Hasher::new();
    let mut buf = [0u8; STREAM_BUF_SIZE];
    loop {
        let n = file
            .read(&mut buf)
            .map_err(|e| format!("read error {}: {}", path.display(), e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("blake3:{}", hasher.finalize().to_hex()))
}

/// Hash a string. Returns `"blake3:{hex}"`.
pub fn hash_string(s: &str) -> String {
    format!("blake3:{}", blake3::hash(s.as_bytes()).to_hex())
}

/// Hash `(name, content)` pairs, in the order given.
pub fn hash_named_strings<'a>(entries: impl IntoIterator<Item = (&'a str, &'a str)>) -> String {
    combine(
        entries
            .into_iter()
            .map(|(name, body)| (name, hash_string(body))),
    )
}

/// Hash the named files under `dir`, in the order given.
///
/// Agrees with [`hash_named_strings`] over the same names and contents, so
/// a working directory can be checked against a plan's artifact digest.
/// A missing file is an error.
pub fn hash_named_files(dir: &Path, names: &[&str]) -> Result<String, String> {
    let mut hashed = Vec::with_capacity(names.len());
    for name in names {
        hashed.push((*name, hash_file(&dir.join(name))?));
    }
    Ok(combine(hashed))
}

fn combine<'a>(entries: impl IntoIterator<Item = (&'a str, String)>) -> String {
    let mut hasher = blake3::Hasher::new();
    for (name, file_hash) in entries {
        hasher.update(name.as_bytes());
        hasher.update(b"\0");
        hasher.update(file_hash.as_bytes());
        hasher.update(b"\n");
    }
    format!("blake3:{}", hasher.finalize().to_hex())
}
