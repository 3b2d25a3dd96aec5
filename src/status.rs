use crate::cache::CacheStore;
use crate::config::{
    DEFAULT_CACHE_TIMEOUT, DEFAULT_CONNECTION_TIMEOUT, DEFAULT_DOWNLOAD_TIMEOUT, URL,
};
use crate::error::Result;
use crate::fetch::StatusFetcher;
use crate::filter::{FilterCriteria, MirrorFilter};
use crate::format::{count_countries, format_mirrorlist};
use crate::rate::ProbeRunner;
use crate::sort::{self, SortBy};
use crate::traits::Transport;
use crate::types::{Mirror, StatusSnapshot};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

#[derive(Debug, Clone)]
pub struct StatusOptions {
    pub connection_timeout: Duration,
    pub download_timeout: Duration,
    pub cache_timeout: Duration,
    pub min_completion_pct: f64,
    pub threads: usize,
    pub url: String,
    /// Budget for each rating pass, counted from its start. Zero is unbounded.
    pub total_timeout: Duration,
    pub show_progress: bool,
}

impl Default for StatusOptions {
    fn default() -> Self {
        Self {
            connection_timeout: Duration::from_secs(DEFAULT_CONNECTION_TIMEOUT),
            download_timeout: Duration::from_secs(DEFAULT_DOWNLOAD_TIMEOUT),
            cache_timeout: Duration::from_secs(DEFAULT_CACHE_TIMEOUT),
            min_completion_pct: 1.0,
            threads: 0,
            url: URL.to_string(),
            total_timeout: Duration::ZERO,
            show_progress: false,
        }
    }
}

/// Convenience wrapper tying the fetcher, filter, sorter, rater and formatter
/// to one set of options. It holds no state of its own: every call goes back
/// to the (cached) status document.
pub struct MirrorStatus {
    options: StatusOptions,
    fetcher: StatusFetcher,
    runner: ProbeRunner,
}

impl MirrorStatus {
    pub fn new(options: StatusOptions, transport: Arc<dyn Transport>, cache: CacheStore) -> Self {
        let runner = ProbeRunner::new(
            Arc::clone(&transport),
            options.connection_timeout,
            options.download_timeout,
        )
        .workers(options.threads)
        .total_timeout(options.total_timeout)
        .progress(options.show_progress);
        let fetcher = StatusFetcher::new(transport, cache);
        Self {
            options,
            fetcher,
            runner,
        }
    }

    pub fn options(&self) -> &StatusOptions {
        &self.options
    }

    pub fn runner(&self) -> &ProbeRunner {
        &self.runner
    }

    pub async fn retrieve(&self) -> Result<(StatusSnapshot, SystemTime)> {
        self.fetcher
            .get_status(
                &self.options.url,
                self.options.connection_timeout,
                self.options.cache_timeout,
            )
            .await
    }

    pub async fn get_mirrors(&self) -> Result<Vec<Mirror>> {
        self.retrieve().await?.0.into_mirrors()
    }

    /// Filter with `criteria`, using this instance's completion threshold.
    pub fn filter(
        &self,
        mirrors: Vec<Mirror>,
        criteria: &FilterCriteria,
    ) -> Result<impl Iterator<Item = Mirror>> {
        let criteria = FilterCriteria {
            min_completion_pct: self.options.min_completion_pct,
            ..criteria.clone()
        };
        Ok(MirrorFilter::new(&criteria)?.apply(mirrors))
    }

    pub async fn sort(&self, mirrors: Vec<Mirror>, by: SortBy) -> Result<Vec<Mirror>> {
        sort::sort(mirrors, by, &self.runner).await
    }

    pub async fn rate(&self, mirrors: Vec<Mirror>) -> Result<Vec<Mirror>> {
        self.sort(mirrors, SortBy::Rate).await
    }

    pub async fn get_mirrorlist(
        &self,
        mirrors: &[Mirror],
        include_country: bool,
        command: Option<&[String]>,
    ) -> Result<Option<String>> {
        let (snapshot, mtime) = self.retrieve().await?;
        format_mirrorlist(
            &snapshot,
            mtime,
            mirrors,
            include_country,
            command,
            &self.options.url,
        )
    }

    pub async fn list_countries(&self) -> Result<BTreeMap<(String, String), usize>> {
        Ok(count_countries(&self.get_mirrors().await?))
    }
}
