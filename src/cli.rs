use crate::cache::{publish, CacheStore};
use crate::config::{
    Settings, DEFAULT_CACHE_TIMEOUT, DEFAULT_COMPLETION_PERCENT, DEFAULT_CONNECTION_TIMEOUT,
    DEFAULT_DOWNLOAD_TIMEOUT, URL,
};
use crate::error::Result;
use crate::filter::FilterCriteria;
use crate::format::{format_country_table, format_mirror_info};
use crate::shutdown::Shutdown;
use crate::sort::{self, country_sort_key, Field, SortBy};
use crate::sources::NetTransport;
use crate::status::{MirrorStatus, StatusOptions};
use crate::types::{Mirror, StatusSnapshot};
use anyhow::{bail, Context};
use clap::Parser;
use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug, Default)]
#[command(name = "reflector", version)]
#[command(about = "retrieve and filter a list of the latest Arch Linux mirrors", long_about = None)]
pub struct Cli {
    /// The number of seconds to wait before a connection times out. Default: 5
    #[arg(long, value_name = "n")]
    pub connection_timeout: Option<u64>,

    /// The number of seconds to wait before a download times out. Default: 5
    #[arg(long, value_name = "n")]
    pub download_timeout: Option<u64>,

    /// Display a table of the distribution of servers by country.
    #[arg(long)]
    pub list_countries: bool,

    /// The cache timeout in seconds for the mirror status data. Default: 300
    #[arg(long, value_name = "n")]
    pub cache_timeout: Option<u64>,

    /// The URL from which to retrieve the mirror data in JSON format.
    #[arg(long)]
    pub url: Option<String>,

    /// Save the mirrorlist to the given path.
    #[arg(long, value_name = "filepath")]
    pub save: Option<PathBuf>,

    /// Sort the mirrorlist: age, rate, country, score or delay.
    #[arg(long, value_parser = ["age", "rate", "country", "score", "delay"])]
    pub sort: Option<String>,

    /// Use n workers for rating mirrors.
    #[arg(long, value_name = "n")]
    pub threads: Option<usize>,

    /// Give up a rating pass after n seconds in total. The clock starts when
    /// rating begins.
    #[arg(long, value_name = "n")]
    pub total_timeout: Option<u64>,

    /// Print extra information to STDERR.
    #[arg(long)]
    pub verbose: bool,

    /// Print mirror information instead of a mirror list. Filter options apply.
    #[arg(long)]
    pub info: bool,

    /// Read default options from this TOML file.
    #[arg(long, value_name = "filepath")]
    pub config: Option<PathBuf>,

    /// Only return mirrors that have synchronized in the last n hours.
    #[arg(short, long, value_name = "n", help_heading = "Filters")]
    pub age: Option<f64>,

    /// Only return mirrors with a reported sync delay of n hours or less.
    #[arg(long, value_name = "n", help_heading = "Filters")]
    pub delay: Option<f64>,

    /// Restrict mirrors to selected countries, by name or code. "*" matches
    /// any country and only affects the order given to --sort country.
    #[arg(short = 'c', long = "country", value_delimiter = ',', help_heading = "Filters")]
    pub countries: Vec<String>,

    /// Return the n fastest mirrors that meet the other criteria.
    #[arg(short, long, value_name = "n", help_heading = "Filters")]
    pub fastest: Option<usize>,

    /// Include servers that match <regex>.
    #[arg(short, long, value_name = "regex", help_heading = "Filters")]
    pub include: Vec<String>,

    /// Exclude servers that match <regex>.
    #[arg(short = 'x', long, value_name = "regex", help_heading = "Filters")]
    pub exclude: Vec<String>,

    /// Limit the list to the n most recently synchronized servers.
    #[arg(short, long, value_name = "n", help_heading = "Filters")]
    pub latest: Option<usize>,

    /// Limit the list to the n servers with the highest score.
    #[arg(long, value_name = "n", help_heading = "Filters")]
    pub score: Option<usize>,

    /// Return at most n mirrors.
    #[arg(short, long, value_name = "n", help_heading = "Filters")]
    pub number: Option<usize>,

    /// Match one of the given protocols, e.g. "https" or "ftp".
    #[arg(short = 'p', long = "protocol", value_delimiter = ',', help_heading = "Filters")]
    pub protocols: Vec<String>,

    /// Set the minimum completion percent for the returned mirrors. Default: 100
    #[arg(long, value_name = "[0-100]", help_heading = "Filters")]
    pub completion_percent: Option<f64>,

    /// Only return mirrors that host ISOs.
    #[arg(long, help_heading = "Filters")]
    pub isos: bool,

    /// Only return mirrors that support IPv4.
    #[arg(long, help_heading = "Filters")]
    pub ipv4: bool,

    /// Only return mirrors that support IPv6.
    #[arg(long, help_heading = "Filters")]
    pub ipv6: bool,
}

/// Command-line options merged over the settings file and the defaults.
#[derive(Debug, Clone)]
pub struct Options {
    pub status: StatusOptions,
    pub criteria: FilterCriteria,
    pub sort: Option<String>,
    pub latest: usize,
    pub score: usize,
    pub fastest: usize,
    pub number: usize,
    pub save: Option<PathBuf>,
    pub info: bool,
    pub verbose: bool,
}

impl Options {
    pub fn resolve(cli: &Cli, settings: Settings) -> Result<Self> {
        let verbose = cli.verbose || settings.verbose.unwrap_or(false);

        let sort = cli.sort.clone().or(settings.sort);
        if let Some(by) = sort.as_deref() {
            by.parse::<SortBy>()?;
        }

        let completion_percent = cli
            .completion_percent
            .or(settings.completion_percent)
            .unwrap_or(DEFAULT_COMPLETION_PERCENT);

        let status = StatusOptions {
            connection_timeout: Duration::from_secs(
                cli.connection_timeout
                    .or(settings.connection_timeout)
                    .unwrap_or(DEFAULT_CONNECTION_TIMEOUT),
            ),
            download_timeout: Duration::from_secs(
                cli.download_timeout
                    .or(settings.download_timeout)
                    .unwrap_or(DEFAULT_DOWNLOAD_TIMEOUT),
            ),
            cache_timeout: Duration::from_secs(
                cli.cache_timeout
                    .or(settings.cache_timeout)
                    .unwrap_or(DEFAULT_CACHE_TIMEOUT),
            ),
            min_completion_pct: completion_percent / 100.0,
            threads: cli.threads.or(settings.threads).unwrap_or(0),
            url: cli.url.clone().or(settings.url).unwrap_or_else(|| URL.to_string()),
            total_timeout: cli
                .total_timeout
                .or(settings.total_timeout)
                .map(Duration::from_secs)
                .unwrap_or_default(),
            show_progress: !verbose,
        };

        let criteria = FilterCriteria {
            min_completion_pct: status.min_completion_pct,
            countries: split_list(prefer(&cli.countries, settings.country)),
            protocols: split_list(prefer(&cli.protocols, settings.protocol)),
            include: prefer(&cli.include, settings.include),
            exclude: prefer(&cli.exclude, settings.exclude),
            age: cli.age.or(settings.age),
            delay: cli.delay.or(settings.delay),
            isos: cli.isos || settings.isos.unwrap_or(false),
            ipv4: cli.ipv4 || settings.ipv4.unwrap_or(false),
            ipv6: cli.ipv6 || settings.ipv6.unwrap_or(false),
        };

        Ok(Self {
            status,
            criteria,
            sort,
            latest: cli.latest.or(settings.latest).unwrap_or(0),
            score: cli.score.or(settings.score).unwrap_or(0),
            fastest: cli.fastest.or(settings.fastest).unwrap_or(0),
            number: cli.number.or(settings.number).unwrap_or(0),
            save: cli.save.clone().or(settings.save),
            info: cli.info,
            verbose,
        })
    }

    /// Mirrors are grouped by country in the output only when sorted by it.
    pub fn include_country(&self) -> bool {
        self.sort.as_deref() == Some("country")
    }
}

fn prefer(cli: &[String], settings: Vec<String>) -> Vec<String> {
    if cli.is_empty() {
        settings
    } else {
        cli.to_vec()
    }
}

/// Split comma-separated entries, dropping empty pieces.
fn split_list(items: Vec<String>) -> Vec<String> {
    items
        .iter()
        .flat_map(|item| item.split(','))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Filter, then apply `--latest`, `--score` and `--fastest` in that order,
/// each re-sorting and truncating what the previous step left. `--sort` comes
/// after those and `--number` last. A count of zero leaves that step out.
pub async fn process(
    options: &Options,
    status: &MirrorStatus,
) -> Result<(StatusSnapshot, SystemTime, Vec<Mirror>)> {
    let (snapshot, mtime) = status.retrieve().await?;
    let all = snapshot.mirrors()?.to_vec();
    let mut mirrors: Vec<Mirror> = status.filter(all, &options.criteria)?.collect();

    if options.latest > 0 {
        mirrors = sort::sort_by_age(mirrors);
        mirrors.truncate(options.latest);
    }

    if options.score > 0 {
        mirrors = status.sort(mirrors, SortBy::Field(Field::Score)).await?;
        mirrors.truncate(options.score);
    }

    if options.fastest > 0 {
        mirrors = status.rate(mirrors).await?;
        mirrors.truncate(options.fastest);
    }

    if let Some(by) = options.sort.as_deref() {
        if !(by == "rate" && options.fastest > 0) {
            mirrors = if by == "country" && !options.criteria.countries.is_empty() {
                sort::sort_by_key(mirrors, country_sort_key(&options.criteria.countries))
            } else {
                status.sort(mirrors, by.parse()?).await?
            };
        }
    }

    if options.number > 0 {
        mirrors.truncate(options.number);
    }

    Ok((snapshot, mtime, mirrors))
}

/// Arguments as recorded in the mirrorlist header. Non-UTF-8 arguments are
/// converted lossily.
pub fn command_line<I: IntoIterator<Item = OsString>>(args: I) -> Vec<String> {
    args.into_iter()
        .map(|a| a.to_string_lossy().into_owned())
        .collect()
}

pub fn init_logging(verbose: bool) {
    let default = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

pub async fn run(cli: Cli, args: Vec<String>, shutdown: &Shutdown) -> anyhow::Result<()> {
    let settings = Settings::load(cli.config.as_deref())?;
    let options = Options::resolve(&cli, settings)?;
    init_logging(options.verbose);

    let transport = Arc::new(NetTransport::new()?);
    let status = MirrorStatus::new(
        options.status.clone(),
        transport,
        CacheStore::user_default(),
    );

    if cli.list_countries {
        let counts = status.list_countries().await?;
        print!("{}", format_country_table(&counts));
        return Ok(());
    }

    let (snapshot, mtime, mirrors) = process(&options, &status).await?;
    if mirrors.is_empty() {
        bail!("no mirrors found");
    }

    if options.info {
        print!("{}", format_mirror_info(&mirrors));
        return Ok(());
    }

    let Some(mirrorlist) = crate::format::format_mirrorlist(
        &snapshot,
        mtime,
        &mirrors,
        options.include_country(),
        Some(args.as_slice()),
        &options.status.url,
    )?
    else {
        bail!("no mirrors found");
    };

    // Interrupted while formatting: the interrupt handler owns the exit.
    if !shutdown.begin() {
        return Ok(());
    }

    match &options.save {
        Some(path) => publish(path, mirrorlist.as_bytes())
            .with_context(|| format!("failed to save mirrorlist to {:?}", path))?,
        None => println!("{}", mirrorlist),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockTransport, Probe};
    use tempfile::tempdir;

    const DOC: &str = r#"{
      "last_check": "2024-01-01T12:00:00Z",
      "urls": [
        {"url": "https://a.example.org/", "country": "Sweden", "country_code": "SE", "protocol": "https",
         "completion_pct": 1.0, "last_sync": "2024-01-01T10:00:00Z", "delay": 100, "score": 3.0},
        {"url": "https://b.example.org/", "country": "Denmark", "country_code": "DK", "protocol": "https",
         "completion_pct": 1.0, "last_sync": "2024-01-01T11:00:00Z", "delay": 100, "score": 1.0},
        {"url": "http://c.example.org/", "country": "Austria", "country_code": "AT", "protocol": "http",
         "completion_pct": 1.0, "last_sync": "2024-01-01T09:00:00Z", "delay": 100, "score": 2.0},
        {"url": "https://d.example.org/", "country": "France", "country_code": "FR", "protocol": "https",
         "completion_pct": 0.5, "last_sync": "2024-01-01T11:30:00Z", "delay": 100, "score": 0.1}
      ]
    }"#;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("reflector").chain(args.iter().copied()))
            .expect("valid arguments")
    }

    async fn run_process(args: &[&str], transport: MockTransport) -> Result<Vec<String>> {
        let dir = tempdir()?;
        let options = Options::resolve(&parse(args), Settings::default())?;
        let transport = Arc::new(transport.with_document(URL, DOC));
        let status = MirrorStatus::new(options.status.clone(), transport, CacheStore::new(dir.path()));
        let (_, _, mirrors) = process(&options, &status).await?;
        Ok(mirrors.into_iter().map(|m| m.url).collect())
    }

    #[test]
    fn test_parse_lists() {
        let cli = parse(&["-c", "France,de", "--country", "se", "-p", "https", "--sort", "country"]);
        assert_eq!(cli.countries, vec!["France", "de", "se"]);
        assert_eq!(cli.protocols, vec!["https"]);
        assert_eq!(cli.sort.as_deref(), Some("country"));
        assert!(Cli::try_parse_from(["reflector", "--sort", "speed"]).is_err());
    }

    #[test]
    fn test_cli_overrides_settings() -> Result<()> {
        let settings = Settings {
            connection_timeout: Some(9),
            threads: Some(3),
            country: vec!["se,dk".into()],
            completion_percent: Some(50.0),
            ..Default::default()
        };
        let options = Options::resolve(&parse(&["--threads", "6"]), settings)?;
        assert_eq!(options.status.connection_timeout, Duration::from_secs(9));
        assert_eq!(options.status.threads, 6);
        assert_eq!(options.criteria.countries, vec!["se", "dk"]);
        assert_eq!(options.criteria.min_completion_pct, 0.5);
        assert_eq!(options.status.url, URL);
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn test_command_line_tolerates_non_utf8() {
        use std::os::unix::ffi::OsStringExt;

        let args = vec![
            OsString::from("--save"),
            OsString::from_vec(b"/tmp/mirror\xfflist".to_vec()),
        ];
        let line = command_line(args);
        assert_eq!(line, vec!["--save", "/tmp/mirror\u{FFFD}list"]);
    }

    #[test]
    fn test_bad_sort_in_settings() {
        let settings = Settings {
            sort: Some("speed".into()),
            ..Default::default()
        };
        assert!(Options::resolve(&parse(&[]), settings).is_err());
    }

    #[tokio::test]
    async fn test_latest_then_score_then_number() -> Result<()> {
        // d is incomplete and filtered out; the two most recent left are b and a.
        let urls = run_process(&["--latest", "2", "--score", "1"], MockTransport::new()).await?;
        assert_eq!(urls, vec!["https://b.example.org/"]);

        let urls = run_process(&["--sort", "age", "-n", "2"], MockTransport::new()).await?;
        assert_eq!(urls, vec!["https://b.example.org/", "https://a.example.org/"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_zero_counts_impose_no_limit() -> Result<()> {
        let urls = run_process(&["-n", "0", "--latest", "0", "--score", "0"], MockTransport::new()).await?;
        assert_eq!(urls.len(), 3);

        let settings = Settings {
            number: Some(0),
            ..Default::default()
        };
        assert_eq!(Options::resolve(&parse(&[]), settings)?.number, 0);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_total_timeout_starts_with_rating() -> Result<()> {
        let dir = tempdir()?;
        let args = ["--total-timeout", "2", "-f", "1", "-p", "https"];
        let options = Options::resolve(&parse(&args), Settings::default())?;
        assert_eq!(options.status.total_timeout, Duration::from_secs(2));

        let transport = MockTransport::new()
            .with_document(URL, DOC)
            .with_probe("https://a.example.org/", Probe::Ok { bytes: 100, took: Duration::from_secs(1) });
        let status = MirrorStatus::new(options.status.clone(), Arc::new(transport), CacheStore::new(dir.path()));

        // Time spent before rating does not count against the budget.
        tokio::time::advance(Duration::from_secs(10)).await;
        let (_, _, mirrors) = process(&options, &status).await?;
        let urls: Vec<_> = mirrors.iter().map(|m| m.url.as_str()).collect();
        assert_eq!(urls, vec!["https://a.example.org/"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_country_priority_sort() -> Result<()> {
        let urls = run_process(&["--country", "dk,*", "--sort", "country"], MockTransport::new()).await?;
        assert_eq!(
            urls,
            vec!["https://b.example.org/", "http://c.example.org/", "https://a.example.org/"]
        );

        let urls = run_process(&["--sort", "country", "-p", "https"], MockTransport::new()).await?;
        assert_eq!(urls, vec!["https://b.example.org/", "https://a.example.org/"]);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_fastest_skips_second_rate_sort() -> Result<()> {
        let transport = MockTransport::new()
            .with_probe("https://a.example.org/", Probe::Ok { bytes: 100, took: Duration::from_secs(1) })
            .with_probe("https://b.example.org/", Probe::Ok { bytes: 900, took: Duration::from_secs(1) })
            .with_probe("http://c.example.org/", Probe::Ok { bytes: 500, took: Duration::from_secs(1) });
        let urls = run_process(&["--fastest", "2", "--sort", "rate"], transport).await?;
        assert_eq!(urls, vec!["https://b.example.org/", "http://c.example.org/"]);
        Ok(())
    }
}
