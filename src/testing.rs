//! Deterministic transport and fixtures shared by the unit tests.

use crate::deadline::Deadline;
use crate::error::{MirrorStatusError, ProbeError, Result};
use crate::traits::{Transfer, Transport};
use crate::types::Mirror;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// What a probe of a given URL does.
#[derive(Debug, Clone, Copy)]
pub enum Probe {
    /// Deliver `bytes` after `took`.
    Ok { bytes: u64, took: Duration },
    /// Fail immediately.
    Fail,
    /// Never finish on its own.
    Hang,
}

#[derive(Default)]
pub struct MockTransport {
    documents: Mutex<HashMap<String, Vec<u8>>>,
    probes: HashMap<String, Probe>,
    pub fetches: AtomicUsize,
    pub downloads: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(self, url: &str, body: &str) -> Self {
        self.documents
            .lock()
            .unwrap()
            .insert(url.to_string(), body.as_bytes().to_vec());
        self
    }

    /// Register a probe outcome for a mirror base URL.
    pub fn with_probe(mut self, mirror_url: &str, probe: Probe) -> Self {
        self.probes
            .insert(format!("{}{}", mirror_url, crate::config::DB_SUBPATH), probe);
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn fetch(&self, url: &str, _connection_timeout: Duration) -> Result<Vec<u8>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.documents
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| MirrorStatusError::Retrieve(format!("connection error: {}", url)))
    }

    async fn download(
        &self,
        url: &str,
        _connection_timeout: Duration,
        deadline: Deadline,
    ) -> std::result::Result<Transfer, ProbeError> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let probe = self.probes.get(url).copied().unwrap_or(Probe::Fail);
        let res = match probe {
            Probe::Ok { bytes, took } => deadline
                .run(tokio::time::sleep(took))
                .await
                .map(|_| Transfer {
                    bytes,
                    elapsed: took,
                })
                .map_err(ProbeError::from),
            Probe::Fail => Err(ProbeError::Other(format!("unreachable: {}", url))),
            Probe::Hang => {
                let _ = deadline.run(std::future::pending::<()>()).await;
                Err(ProbeError::Timeout)
            }
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        res
    }
}

/// A synced, fully complete mirror.
pub fn mirror(url: &str, country: &str, code: &str) -> Mirror {
    let mut m = Mirror::new(url, country, code);
    m.last_sync = Some("2024-01-01T00:00:00Z".to_string());
    m.delay = Some(60);
    m.score = Some(1.0);
    m
}

pub const STATUS_JSON: &str = r#"{
  "cutoff": 86400,
  "last_check": "2024-01-01T12:00:00.123456Z",
  "num_checks": 24,
  "urls": [
    {
      "url": "https://se.mirror.example.org/archlinux/",
      "protocol": "https",
      "last_sync": "2024-01-01T11:00:00Z",
      "completion_pct": 1.0,
      "delay": 900,
      "score": 0.8,
      "country": "Sweden",
      "country_code": "SE",
      "isos": true,
      "ipv4": true,
      "ipv6": true
    },
    {
      "url": "http://fr.mirror.example.org/arch/",
      "protocol": "http",
      "last_sync": "2024-01-01T10:00:00Z",
      "completion_pct": 1.0,
      "delay": 3600,
      "score": 1.5,
      "country": "France",
      "country_code": "FR",
      "isos": false,
      "ipv4": true,
      "ipv6": false
    },
    {
      "url": "rsync://dk.mirror.example.org/archlinux/",
      "protocol": "rsync",
      "last_sync": null,
      "completion_pct": 0.4,
      "delay": null,
      "score": null,
      "country": "Denmark",
      "country_code": "DK",
      "isos": false,
      "ipv4": true,
      "ipv6": false
    }
  ]
}"#;
