use crate::deadline::Deadline;
use crate::error::ProbeError;
use crate::traits::Transfer;
use std::process::Stdio;
use std::time::Duration;
use tokio::fs;
use tokio::process::Command;
use tokio::time::Instant;

/// Download `url` with rsync into a scratch directory and report the size of
/// the received file. The directory is removed when this returns.
pub async fn download(
    url: &str,
    connection_timeout: Duration,
    deadline: Deadline,
) -> Result<Transfer, ProbeError> {
    download_with("rsync", url, connection_timeout, deadline).await
}

async fn download_with(
    program: &str,
    url: &str,
    connection_timeout: Duration,
    deadline: Deadline,
) -> Result<Transfer, ProbeError> {
    let file_name = file_name(url)?;
    let tmpdir = tempfile::tempdir()?;

    let mut child = Command::new(program)
        .args(["-avL", "--no-h", "--no-motd"])
        .arg(format!("--contimeout={}", connection_timeout.as_secs()))
        .arg(url)
        .arg(tmpdir.path())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()?;

    let start = Instant::now();
    let waited = deadline.run(child.wait()).await;
    let status = match waited {
        Ok(status) => status?,
        Err(expired) => {
            // Reap the process before the scratch directory goes away.
            let _ = child.kill().await;
            return Err(expired.into());
        }
    };
    let elapsed = start.elapsed();

    if !status.success() {
        return Err(ProbeError::Rsync(status));
    }

    let bytes = fs::metadata(tmpdir.path().join(&file_name)).await?.len();
    Ok(Transfer { bytes, elapsed })
}

/// Last path segment of `url`, the name rsync gives the received file.
fn file_name(url: &str) -> Result<String, ProbeError> {
    url.split_once("://")
        .map_or(url, |(_, rest)| rest)
        .trim_end_matches('/')
        .split_once('/')
        .and_then(|(_, path)| path.rsplit('/').next())
        .filter(|name| !name.is_empty())
        .map(String::from)
        .ok_or_else(|| ProbeError::Other(format!("no file name in {}", url)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::ErrorKind;

    #[test]
    fn test_file_name_from_url() {
        assert_eq!(
            file_name("rsync://mirror.example.org/archlinux/extra/os/x86_64/extra.db").unwrap(),
            "extra.db"
        );
        assert_eq!(file_name("rsync://mirror.example.org/pub/extra.db/").unwrap(), "extra.db");
        assert!(file_name("rsync://mirror.example.org/").is_err());
        assert!(file_name("rsync://mirror.example.org").is_err());
    }

    #[tokio::test]
    async fn test_missing_binary_is_io_error() {
        let res = download_with(
            "reflector-no-such-rsync",
            "rsync://mirror.example.org/archlinux/extra/os/x86_64/extra.db",
            Duration::from_secs(1),
            Deadline::after(Duration::from_secs(5)),
        )
        .await;
        assert!(matches!(res, Err(ProbeError::Io(e)) if e.kind() == ErrorKind::NotFound));
    }
}
