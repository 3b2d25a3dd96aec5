use crate::cache::{is_fresh, CacheStore};
use crate::error::{MirrorStatusError, Result};
use crate::traits::Transport;
use crate::types::StatusSnapshot;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

/// Retrieves the status document, preferring a fresh cached copy.
#[derive(Clone)]
pub struct StatusFetcher {
    transport: Arc<dyn Transport>,
    cache: CacheStore,
}

impl StatusFetcher {
    pub fn new(transport: Arc<dyn Transport>, cache: CacheStore) -> Self {
        Self { transport, cache }
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    /// Return the snapshot for `url` and the time it was fetched.
    ///
    /// A cached copy no older than `cache_ttl` is used as is. Otherwise the
    /// document is downloaded, stored in canonical form (pretty-printed, keys
    /// sorted) and returned with the new modification time. Failures are not
    /// retried.
    pub async fn get_status(
        &self,
        url: &str,
        connection_timeout: Duration,
        cache_ttl: Duration,
    ) -> Result<(StatusSnapshot, SystemTime)> {
        let cached = self.cache.read(url).await.map_err(retrieve_error)?;

        if let Some((bytes, mtime)) = cached {
            if is_fresh(mtime, cache_ttl) {
                match serde_json::from_slice(&bytes) {
                    Ok(snapshot) => {
                        debug!("using cached mirror status for {}", url);
                        return Ok((snapshot, mtime));
                    }
                    Err(e) => warn!("ignoring unreadable cache file for {}: {}", url, e),
                }
            } else {
                debug!("cached mirror status for {} is stale", url);
            }
        }

        debug!("retrieving mirror status from {}", url);
        let body = self.transport.fetch(url, connection_timeout).await?;
        let value: serde_json::Value = serde_json::from_slice(&body)?;

        // serde_json's map is ordered by key, so this is the sorted form.
        let canonical = serde_json::to_vec_pretty(&value)?;
        let mtime = self
            .cache
            .write(url, &canonical)
            .await
            .map_err(retrieve_error)?;

        let snapshot = serde_json::from_value(value)?;
        Ok((snapshot, mtime))
    }
}

fn retrieve_error(err: MirrorStatusError) -> MirrorStatusError {
    match err {
        MirrorStatusError::Io(e) => MirrorStatusError::Retrieve(format!("cache error: {}", e)),
        other => other,
    }
}
