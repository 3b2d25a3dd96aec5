pub mod http;
pub mod rsync;

use crate::deadline::Deadline;
use crate::error::{MirrorStatusError, ProbeError, Result};
use crate::traits::{Transfer, Transport};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

/// How a probe resource is downloaded, chosen from the URL scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeKind {
    Rsync,
    Http,
}

pub fn probe_kind(url: &str) -> ProbeKind {
    match url.split_once("://") {
        Some((scheme, _)) if scheme.eq_ignore_ascii_case("rsync") => ProbeKind::Rsync,
        _ => ProbeKind::Http,
    }
}

/// Network transport: reqwest for HTTP(S) and the status document, the
/// `rsync` binary for rsync mirrors.
#[derive(Clone)]
pub struct NetTransport {
    client: Client,
}

impl NetTransport {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("reflector/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| MirrorStatusError::Custom(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for NetTransport {
    async fn fetch(&self, url: &str, connection_timeout: Duration) -> Result<Vec<u8>> {
        http::fetch(&self.client, url, connection_timeout).await
    }

    async fn download(
        &self,
        url: &str,
        connection_timeout: Duration,
        deadline: Deadline,
    ) -> std::result::Result<Transfer, ProbeError> {
        match probe_kind(url) {
            ProbeKind::Rsync => rsync::download(url, connection_timeout, deadline).await,
            ProbeKind::Http => http::download(&self.client, url, connection_timeout, deadline).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_kind_by_scheme() {
        assert_eq!(probe_kind("rsync://mirror.example.org/arch/"), ProbeKind::Rsync);
        assert_eq!(probe_kind("RSYNC://mirror.example.org/arch/"), ProbeKind::Rsync);
        assert_eq!(probe_kind("https://mirror.example.org/arch/"), ProbeKind::Http);
        assert_eq!(probe_kind("ftp://mirror.example.org/arch/"), ProbeKind::Http);
        assert_eq!(probe_kind("mirror.example.org"), ProbeKind::Http);
    }
}
