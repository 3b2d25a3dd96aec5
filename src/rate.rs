use crate::config::DB_SUBPATH;
use crate::deadline::Deadline;
use crate::error::{MirrorStatusError, Result};
use crate::sources::{probe_kind, ProbeKind};
use crate::traits::Transport;
use crate::types::{Mirror, ProbeResult};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

/// Rates mirrors by timing the download of a reference file from each one.
#[derive(Clone)]
pub struct ProbeRunner {
    transport: Arc<dyn Transport>,
    connection_timeout: Duration,
    download_timeout: Duration,
    workers: usize,
    total_timeout: Duration,
    show_progress: bool,
}

impl ProbeRunner {
    pub fn new(
        transport: Arc<dyn Transport>,
        connection_timeout: Duration,
        download_timeout: Duration,
    ) -> Self {
        Self {
            transport,
            connection_timeout,
            download_timeout,
            workers: 0,
            total_timeout: Duration::ZERO,
            show_progress: false,
        }
    }

    /// Number of concurrent probes. Zero rates the mirrors one after another
    /// in input order.
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Budget for a whole rating pass, starting when [`ProbeRunner::rate`] is
    /// called. Each probe's own timeout is capped by it. Zero is unbounded.
    pub fn total_timeout(mut self, timeout: Duration) -> Self {
        self.total_timeout = timeout;
        self
    }

    pub fn progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Rate `mirrors`, returning bytes per second keyed by mirror URL. Failed
    /// probes are recorded as zero.
    ///
    /// Fails only when the outer deadline runs out, after the probe in flight
    /// at that moment has finished.
    pub async fn rate(&self, mirrors: &[Mirror]) -> Result<HashMap<String, f64>> {
        if mirrors.is_empty() {
            debug!("no mirrors to rate");
            return Ok(HashMap::new());
        }

        info!("rating {} mirror(s) by download speed", mirrors.len());
        let width = mirrors.iter().map(|m| m.url.len()).max().unwrap_or(0);
        info!("{:<width$}  {:>14}  {:>9}", "Server", "Rate", "Time", width = width);

        let deadline = Deadline::after(self.total_timeout);
        let pb = self.progress_bar(mirrors.len());
        let rates = if self.workers > 0 {
            self.rate_pooled(mirrors, deadline, width, &pb).await?
        } else {
            self.rate_sequential(mirrors, deadline, width, &pb).await?
        };
        pb.finish_and_clear();

        if deadline.is_expired() {
            return Err(MirrorStatusError::DeadlineExceeded);
        }
        Ok(rates)
    }

    async fn rate_sequential(
        &self,
        mirrors: &[Mirror],
        deadline: Deadline,
        width: usize,
        pb: &ProgressBar,
    ) -> Result<HashMap<String, f64>> {
        let mut rates = HashMap::with_capacity(mirrors.len());
        for mirror in mirrors {
            if deadline.is_expired() {
                return Err(MirrorStatusError::DeadlineExceeded);
            }
            let res = self.probe_within(&mirror.url, deadline).await;
            log_probe(&mirror.url, &res, width);
            pb.inc(1);
            rates.insert(mirror.url.clone(), res.ratio);
        }
        Ok(rates)
    }

    /// Fixed pool of workers pulling URLs from a shared queue. Results come back
    /// in completion order and are collected into the map.
    async fn rate_pooled(
        &self,
        mirrors: &[Mirror],
        deadline: Deadline,
        width: usize,
        pb: &ProgressBar,
    ) -> Result<HashMap<String, f64>> {
        let queue: VecDeque<String> = mirrors.iter().map(|m| m.url.clone()).collect();
        let queue = Arc::new(Mutex::new(queue));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let mut handles = Vec::with_capacity(self.workers);
        for _ in 0..self.workers.min(mirrors.len()) {
            let queue = Arc::clone(&queue);
            let tx = tx.clone();
            let runner = self.clone();
            handles.push(tokio::spawn(async move {
                loop {
                    if deadline.is_expired() {
                        break;
                    }
                    let next = queue.lock().await.pop_front();
                    let Some(url) = next else { break };
                    let res = runner.probe_within(&url, deadline).await;
                    if tx.send((url, res)).is_err() {
                        break;
                    }
                }
            }));
        }
        drop(tx);

        let mut rates = HashMap::with_capacity(mirrors.len());
        while let Some((url, res)) = rx.recv().await {
            log_probe(&url, &res, width);
            pb.inc(1);
            rates.insert(url, res.ratio);
        }

        for handle in handles {
            handle
                .await
                .map_err(|e| MirrorStatusError::Custom(format!("rating worker failed: {}", e)))?;
        }
        Ok(rates)
    }

    /// Time one download of the reference file from `mirror_url`.
    pub async fn probe(&self, mirror_url: &str) -> ProbeResult {
        self.probe_within(mirror_url, Deadline::unbounded()).await
    }

    async fn probe_within(&self, mirror_url: &str, outer: Deadline) -> ProbeResult {
        let db_url = format!("{}{}", mirror_url, DB_SUBPATH);
        let deadline = outer.child(self.download_timeout);

        match self
            .transport
            .download(&db_url, self.connection_timeout, deadline)
            .await
        {
            Ok(transfer) => ProbeResult::new(transfer.bytes, transfer.elapsed),
            Err(e) => {
                let kind = match probe_kind(&db_url) {
                    ProbeKind::Rsync => "rsync",
                    ProbeKind::Http => "http(s)",
                };
                warn!("failed to rate {} download ({}): {}", kind, db_url, e);
                ProbeResult::FAILED
            }
        }
    }

    fn progress_bar(&self, len: usize) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(len as u64);
        if let Ok(style) = ProgressStyle::with_template("[{bar:40.cyan/blue}] {pos}/{len} {msg}") {
            pb.set_style(style.progress_chars("|| "));
        }
        pb.set_message("Rating...");
        pb
    }
}

fn log_probe(url: &str, res: &ProbeResult, width: usize) {
    info!(
        "{:<width$}  {:8.2} KiB/s  {:7.2} s",
        url,
        res.kibps(),
        res.elapsed.as_secs_f64(),
        width = width
    );
}
