use crate::config::{NAME, URL};
use crate::error::{MirrorStatusError, Result};
use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use directories::BaseDirs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::fs;

/// Local copies of status documents, keyed by source URL.
///
/// The file modification time is the fetch time.
#[derive(Debug, Clone)]
pub struct CacheStore {
    root: PathBuf,
}

impl CacheStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Use the user cache directory (`$XDG_CACHE_HOME`, falling back to
    /// `~/.cache`).
    pub fn user_default() -> Self {
        let root = BaseDirs::new()
            .map(|dirs| dirs.cache_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from(".").join(".cache"));
        Self::new(root)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The default source shares a well-known file with other tools; any other
    /// source gets its own file named after the encoded URL.
    pub fn path_for(&self, url: &str) -> PathBuf {
        if url == URL {
            return self.root.join("mirrorstatus.json");
        }
        let name = format!("{}.json", URL_SAFE.encode(url.as_bytes()));
        self.root.join(NAME).join(name)
    }

    /// Read the cached bytes and their modification time. A missing file is
    /// `None`.
    pub async fn read(&self, url: &str) -> Result<Option<(Vec<u8>, SystemTime)>> {
        let path = self.path_for(url);
        let meta = match fs::metadata(&path).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let mtime = meta.modified()?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some((bytes, mtime))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Write through a temporary sibling and rename it into place, so an
    /// interrupted write never leaves a truncated cache file.
    pub async fn write(&self, url: &str, bytes: &[u8]) -> Result<SystemTime> {
        let path = self.path_for(url);
        let parent = path
            .parent()
            .ok_or_else(|| MirrorStatusError::Custom(format!("invalid cache path: {:?}", path)))?;
        fs::create_dir_all(parent).await?;

        publish(&path, bytes)?;
        tracing::debug!("cached status document at {:?}", path);
        Ok(fs::metadata(&path).await?.modified()?)
    }
}

/// `now - mtime <= ttl`. A modification time in the future counts as fresh.
pub fn is_fresh(mtime: SystemTime, ttl: Duration) -> bool {
    match SystemTime::now().duration_since(mtime) {
        Ok(age) => age <= ttl,
        Err(_) => true,
    }
}

/// Write `bytes` to a temporary file next to `path`, then atomically rename it.
pub fn publish(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::Builder::new()
        .prefix(".reflector")
        .suffix(".tmp")
        .tempfile_in(parent)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
