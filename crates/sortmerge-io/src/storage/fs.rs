//! Local filesystem storage for spilled sort runs.

use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use blake3::Hasher;
use sortmerge_mem::error::{Error as MemError, Result as MemResult};
use sortmerge_mem::Storage;

/// Spill segments as plain files; paths are used as given.
#[derive(Debug, Clone, Default)]
pub struct FsStorage;

impl FsStorage {
    pub fn new() -> Self {
        Self
    }
}

fn storage_err(op: &str, path: &Path, e: std::io::Error) -> MemError {
    MemError::Storage(format!("{op} {}: {e}", path.display()))
}

impl Storage for FsStorage {
    fn write(&self, path: &str, bytes: &[u8]) -> MemResult<()> {
        let p = Path::new(path);
        if let Some(parent) = p.parent() {
            fs::create_dir_all(parent).map_err(|e| storage_err("create dir for", p, e))?;
        }
        let mut f = File::create(p).map_err(|e| storage_err("create", p, e))?;
        f.write_all(bytes).map_err(|e| storage_err("write", p, e))?;
        f.sync_data().map_err(|e| storage_err("sync", p, e))
    }

    fn read_range(&self, path: &str, offset: u64, len: usize) -> MemResult<Vec<u8>> {
        let p = Path::new(path);
        let mut f = File::open(p).map_err(|e| storage_err("open", p, e))?;
        f.seek(SeekFrom::Start(offset)).map_err(|e| storage_err("seek", p, e))?;
        let mut buf = Vec::with_capacity(len);
        f.take(len as u64)
            .read_to_end(&mut buf)
            .map_err(|e| storage_err("read", p, e))?;
        Ok(buf)
    }

    fn delete(&self, path: &str) -> MemResult<()> {
        let p = Path::new(path);
        match fs::remove_file(p) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(storage_err("delete", p, e)),
        }
    }

    /// Every file under `prefix` (a directory), recursively, sorted.
    fn list(&self, prefix: &str) -> MemResult<Vec<String>> {
        let root = Path::new(prefix);
        let mut out = Vec::new();
        if root.is_file() {
            out.push(prefix.to_string());
            return Ok(out);
        }
        let mut pending = vec![root.to_path_buf()];
        while let Some(dir) = pending.pop() {
            let entries = match fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(storage_err("list", &dir, e)),
            };
            for entry in entries {
                let path = entry.map_err(|e| storage_err("list", &dir, e))?.path();
                if path.is_dir() {
                    pending.push(path);
                } else {
                    out.push(path.to_string_lossy().into_owned());
                }
            }
        }
        out.sort();
        Ok(out)
    }

    fn size(&self, path: &str) -> MemResult<u64> {
        let p = Path::new(path);
        fs::metadata(p)
            .map(|m| m.len())
            .map_err(|e| storage_err("stat", p, e))
    }

    fn etag(&self, path: &str) -> MemResult<Option<String>> {
        let p = Path::new(path);
        let Ok(meta) = fs::metadata(p) else {
            return Ok(None);
        };
        // hash(size || mtime || path)
        let mut h = Hasher::new();
        h.update(&meta.len().to_le_bytes());
        if let Ok(Ok(d)) = meta.modified().map(|m| m.duration_since(std::time::UNIX_EPOCH)) {
            h.update(&d.as_nanos().to_le_bytes());
        }
        h.update(p.to_string_lossy().as_bytes());
        Ok(Some(h.finalize().to_hex().to_string()))
    }
}
