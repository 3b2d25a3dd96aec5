use crate::error::{MirrorStatusError, Result};
use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// One entry of the mirror status document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mirror {
    pub url: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub country_code: String,
    #[serde(default)]
    pub protocol: String,
    #[serde(default)]
    pub completion_pct: Option<f64>,
    #[serde(default)]
    pub last_sync: Option<String>,
    #[serde(default)]
    pub delay: Option<i64>,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub isos: bool,
    #[serde(default)]
    pub ipv4: bool,
    #[serde(default)]
    pub ipv6: bool,

    /// Keys of the status entry not modelled above, kept for `--info`.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,

    /// `last_sync` as epoch seconds, filled in by the filter pass.
    #[serde(skip)]
    pub synced_at: Option<i64>,
}

impl Mirror {
    pub fn new(url: &str, country: &str, country_code: &str) -> Self {
        Self {
            url: url.to_string(),
            country: country.to_string(),
            country_code: country_code.to_string(),
            protocol: url.split("://").next().unwrap_or_default().to_string(),
            completion_pct: Some(1.0),
            last_sync: None,
            delay: None,
            score: None,
            isos: false,
            ipv4: false,
            ipv6: false,
            extra: BTreeMap::new(),
            synced_at: None,
        }
    }

    /// Parse `last_sync` into `synced_at`. Returns `None` for unsynced mirrors.
    pub fn with_parsed_sync(mut self) -> Result<Option<Self>> {
        let Some(raw) = self.last_sync.as_deref() else {
            return Ok(None);
        };
        self.synced_at = Some(parse_timestamp(raw)?);
        Ok(Some(self))
    }
}

/// The full status document: a server-side check time plus the mirrors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub last_check: String,
    #[serde(default)]
    pub urls: Option<Vec<Mirror>>,
}

impl StatusSnapshot {
    pub fn mirrors(&self) -> Result<&[Mirror]> {
        self.urls.as_deref().ok_or(MirrorStatusError::NoMirrors)
    }

    pub fn into_mirrors(self) -> Result<Vec<Mirror>> {
        self.urls.ok_or(MirrorStatusError::NoMirrors)
    }

    pub fn last_check_time(&self) -> Result<i64> {
        parse_timestamp(&self.last_check)
    }
}

/// Outcome of one rate probe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeResult {
    pub elapsed: Duration,
    /// Bytes per second.
    pub ratio: f64,
}

impl ProbeResult {
    /// Recorded for a failed or timed out probe so it sorts last.
    pub const FAILED: ProbeResult = ProbeResult {
        elapsed: Duration::ZERO,
        ratio: 0.0,
    };

    pub fn new(bytes: u64, elapsed: Duration) -> Self {
        let secs = elapsed.as_secs_f64();
        if secs <= 0.0 {
            return Self::FAILED;
        }
        Self {
            elapsed,
            ratio: bytes as f64 / secs,
        }
    }

    pub fn kibps(&self) -> f64 {
        self.ratio / 1024.0
    }

    pub fn is_failure(&self) -> bool {
        self.ratio == 0.0
    }
}

/// Parse an ISO-8601 UTC timestamp, with or without fractional seconds, into
/// epoch seconds.
pub fn parse_timestamp(raw: &str) -> Result<i64> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.timestamp());
    }
    NaiveDateTime::parse_from_str(raw.trim_end_matches('Z'), "%Y-%m-%dT%H:%M:%S%.f")
        .map(|dt| dt.and_utc().timestamp())
        .map_err(|_| MirrorStatusError::Timestamp(raw.to_string()))
}
