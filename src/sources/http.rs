use crate::deadline::Deadline;
use crate::error::{MirrorStatusError, ProbeError, Result};
use crate::traits::Transfer;
use futures::StreamExt;
use reqwest::Client;
use std::time::Duration;
use tokio::time::Instant;

/// Fetch a status document. Failures are reported with their class so the
/// user can tell a DNS problem from a slow server.
pub async fn fetch(client: &Client, url: &str, timeout: Duration) -> Result<Vec<u8>> {
    let mut request = client.get(url);
    if !timeout.is_zero() {
        request = request.timeout(timeout);
    }

    let response = request.send().await.map_err(retrieve_error)?;
    let response = response.error_for_status().map_err(retrieve_error)?;
    let bytes = response.bytes().await.map_err(retrieve_error)?;
    Ok(bytes.to_vec())
}

fn retrieve_error(err: reqwest::Error) -> MirrorStatusError {
    let class = if err.is_timeout() {
        "timeout"
    } else if err.is_connect() {
        "connection error"
    } else if err.is_status() {
        "HTTP error"
    } else if err.is_decode() || err.is_body() {
        "read error"
    } else {
        "request error"
    };
    MirrorStatusError::Retrieve(format!("{}: {}", class, err))
}

/// Stream `url` to nowhere, counting bytes. Time is measured from the moment
/// the response headers arrive, so connection setup does not count against
/// the mirror's rate.
pub async fn download(
    client: &Client,
    url: &str,
    connection_timeout: Duration,
    deadline: Deadline,
) -> std::result::Result<Transfer, ProbeError> {
    let transfer = async {
        let send = client.get(url).send();
        let response = if connection_timeout.is_zero() {
            send.await?
        } else {
            tokio::time::timeout(connection_timeout, send)
                .await
                .map_err(|_| ProbeError::ConnectTimeout(connection_timeout))??
        };

        if !response.status().is_success() {
            return Err(ProbeError::Status(response.status()));
        }

        let start = Instant::now();
        let mut bytes = 0u64;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            deadline.check()?;
            bytes += chunk?.len() as u64;
        }

        Ok::<_, ProbeError>(Transfer {
            bytes,
            elapsed: start.elapsed(),
        })
    };

    deadline.run(transfer).await?
}
