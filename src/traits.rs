use crate::deadline::Deadline;
use crate::error::{ProbeError, Result};
use async_trait::async_trait;
use std::time::Duration;

/// Bytes received by a probe and the time the transfer took.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transfer {
    pub bytes: u64,
    pub elapsed: Duration,
}

/// Transport: network access used by the fetcher and the probe runner.
///
/// The production implementation is [`crate::sources::NetTransport`]; tests
/// substitute deterministic in-memory transports.
#[async_trait]
pub trait Transport: Sync + Send {
    /// Retrieve a status document. The whole exchange is bounded by
    /// `connection_timeout`.
    async fn fetch(&self, url: &str, connection_timeout: Duration) -> Result<Vec<u8>>;

    /// Download a probe resource, giving up once `deadline` passes.
    async fn download(
        &self,
        url: &str,
        connection_timeout: Duration,
        deadline: Deadline,
    ) -> std::result::Result<Transfer, ProbeError>;
}
