use crate::error::{MirrorStatusError, Result};
use crate::rate::ProbeRunner;
use crate::types::Mirror;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::str::FromStr;

/// Criteria accepted by `--sort`, with their descriptions for the help text.
pub const SORT_TYPES: &[(&str, &str)] = &[
    ("age", "last server synchronization"),
    ("rate", "download rate"),
    (
        "country",
        "country name, either alphabetically or in the order given by the --country option",
    ),
    ("score", "MirrorStatus score"),
    ("delay", "MirrorStatus delay"),
];

/// A mirror field that can be sorted on directly, ascending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Url,
    Protocol,
    Country,
    CountryCode,
    CompletionPct,
    LastSync,
    Delay,
    Score,
    Isos,
    Ipv4,
    Ipv6,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortBy {
    /// Most recently synchronized first.
    Age,
    /// Fastest first.
    Rate,
    Field(Field),
}

impl FromStr for SortBy {
    type Err = MirrorStatusError;

    fn from_str(s: &str) -> Result<Self> {
        let by = match s {
            "age" => SortBy::Age,
            "rate" => SortBy::Rate,
            "url" => SortBy::Field(Field::Url),
            "protocol" => SortBy::Field(Field::Protocol),
            "country" => SortBy::Field(Field::Country),
            "country_code" => SortBy::Field(Field::CountryCode),
            "completion_pct" => SortBy::Field(Field::CompletionPct),
            "last_sync" => SortBy::Field(Field::LastSync),
            "delay" => SortBy::Field(Field::Delay),
            "score" => SortBy::Field(Field::Score),
            "isos" => SortBy::Field(Field::Isos),
            "ipv4" => SortBy::Field(Field::Ipv4),
            "ipv6" => SortBy::Field(Field::Ipv6),
            other => return Err(MirrorStatusError::UnknownSortField(other.to_string())),
        };
        Ok(by)
    }
}

/// Sort `mirrors` by `by`. Rating by speed downloads from every mirror through
/// `runner`.
pub async fn sort(mirrors: Vec<Mirror>, by: SortBy, runner: &ProbeRunner) -> Result<Vec<Mirror>> {
    match by {
        SortBy::Age => Ok(sort_by_age(mirrors)),
        SortBy::Rate => {
            let rates = runner.rate(&mirrors).await?;
            Ok(sort_by_rates(mirrors, &rates))
        }
        SortBy::Field(field) => Ok(sort_by_field(mirrors, field)),
    }
}

pub fn sort_by_age(mut mirrors: Vec<Mirror>) -> Vec<Mirror> {
    mirrors.sort_by(|a, b| b.synced_at.cmp(&a.synced_at));
    mirrors
}

/// Descending by rate; mirrors missing from `rates` count as zero.
pub fn sort_by_rates(mut mirrors: Vec<Mirror>, rates: &HashMap<String, f64>) -> Vec<Mirror> {
    let rate = |m: &Mirror| rates.get(&m.url).copied().unwrap_or(0.0);
    mirrors.sort_by(|a, b| rate(b).total_cmp(&rate(a)));
    mirrors
}

pub fn sort_by_field(mut mirrors: Vec<Mirror>, field: Field) -> Vec<Mirror> {
    mirrors.sort_by(|a, b| compare_field(field, a, b));
    mirrors
}

/// Sort with a custom key; stable, ascending.
pub fn sort_by_key<K, F>(mut mirrors: Vec<Mirror>, key: F) -> Vec<Mirror>
where
    K: Ord,
    F: FnMut(&Mirror) -> K,
{
    mirrors.sort_by_cached_key(key);
    mirrors
}

fn compare_field(field: Field, a: &Mirror, b: &Mirror) -> Ordering {
    match field {
        Field::Url => a.url.cmp(&b.url),
        Field::Protocol => a.protocol.cmp(&b.protocol),
        Field::Country => a.country.cmp(&b.country),
        Field::CountryCode => a.country_code.cmp(&b.country_code),
        Field::CompletionPct => cmp_missing_last(a.completion_pct, b.completion_pct, f64::total_cmp),
        Field::LastSync => cmp_missing_last(a.synced_at, b.synced_at, |x, y| x.cmp(y)),
        Field::Delay => cmp_missing_last(a.delay, b.delay, |x, y| x.cmp(y)),
        Field::Score => cmp_missing_last(a.score, b.score, f64::total_cmp),
        Field::Isos => a.isos.cmp(&b.isos),
        Field::Ipv4 => a.ipv4.cmp(&b.ipv4),
        Field::Ipv6 => a.ipv6.cmp(&b.ipv6),
    }
}

fn cmp_missing_last<T>(a: Option<T>, b: Option<T>, cmp: impl Fn(&T, &T) -> Ordering) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => cmp(&x, &y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Key for ordering mirrors by a list of preferred countries, given by name or
/// code in any case.
///
/// Countries not in the list sort after it, alphabetically. A `*` entry marks
/// where those unlisted countries go instead, so `["se", "*", "dk"]` puts
/// Sweden first, Denmark last and everything else in between.
pub fn country_sort_key(priorities: &[String]) -> impl Fn(&Mirror) -> (usize, String) {
    let priorities: Vec<String> = priorities.iter().map(|c| c.trim().to_uppercase()).collect();
    let default_priority = priorities
        .iter()
        .position(|c| c == "*")
        .unwrap_or(priorities.len());

    move |mirror: &Mirror| {
        let country = mirror.country.to_uppercase();
        let code = mirror.country_code.to_uppercase();
        let priority = priorities
            .iter()
            .position(|c| *c == country)
            .or_else(|| priorities.iter().position(|c| *c == code))
            .unwrap_or(default_priority);
        (priority, country)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{mirror, MockTransport, Probe};
    use std::sync::Arc;
    use std::time::Duration;

    fn countries(mirrors: &[Mirror]) -> Vec<&str> {
        mirrors.iter().map(|m| m.country.as_str()).collect()
    }

    #[test]
    fn test_sort_by_age_most_recent_first() {
        let mirrors: Vec<_> = [100, 300, 200]
            .iter()
            .map(|t| {
                let mut m = mirror(&format!("https://{}.example.org/", t), "Sweden", "SE");
                m.synced_at = Some(*t);
                m
            })
            .collect();
        let sorted: Vec<_> = sort_by_age(mirrors).iter().map(|m| m.synced_at).collect();
        assert_eq!(sorted, vec![Some(300), Some(200), Some(100)]);
    }

    #[test]
    fn test_unknown_field_is_error() {
        assert!(matches!(
            "speed".parse::<SortBy>(),
            Err(MirrorStatusError::UnknownSortField(f)) if f == "speed"
        ));
        assert_eq!("delay".parse::<SortBy>().unwrap(), SortBy::Field(Field::Delay));
        for (name, _) in SORT_TYPES {
            assert!(name.parse::<SortBy>().is_ok());
        }
        assert_eq!("isos".parse::<SortBy>().unwrap(), SortBy::Field(Field::Isos));
        assert_eq!("ipv4".parse::<SortBy>().unwrap(), SortBy::Field(Field::Ipv4));
        assert_eq!("ipv6".parse::<SortBy>().unwrap(), SortBy::Field(Field::Ipv6));
    }

    #[test]
    fn test_sort_by_flag_false_first() {
        let mut a = mirror("https://a.example.org/", "Sweden", "SE");
        a.ipv6 = true;
        let b = mirror("https://b.example.org/", "Sweden", "SE");
        let mut c = mirror("https://c.example.org/", "Sweden", "SE");
        c.ipv6 = true;

        let sorted = sort_by_field(vec![a, b, c], Field::Ipv6);
        let urls: Vec<_> = sorted.iter().map(|m| m.url.as_str()).collect();
        assert_eq!(
            urls,
            vec!["https://b.example.org/", "https://a.example.org/", "https://c.example.org/"]
        );
    }

    #[test]
    fn test_sort_by_score_missing_last() {
        let mut a = mirror("https://a.example.org/", "Sweden", "SE");
        a.score = Some(3.0);
        let mut b = mirror("https://b.example.org/", "Sweden", "SE");
        b.score = None;
        let mut c = mirror("https://c.example.org/", "Sweden", "SE");
        c.score = Some(0.5);

        let sorted = sort_by_field(vec![a, b, c], Field::Score);
        let urls: Vec<_> = sorted.iter().map(|m| m.url.as_str()).collect();
        assert_eq!(
            urls,
            vec!["https://c.example.org/", "https://a.example.org/", "https://b.example.org/"]
        );
    }

    #[test]
    fn test_country_priority_with_wildcard() {
        let mirrors = vec![
            mirror("https://1.example.org/", "Denmark", "DK"),
            mirror("https://2.example.org/", "Germany", "DE"),
            mirror("https://3.example.org/", "Sweden", "SE"),
            mirror("https://4.example.org/", "Austria", "AT"),
            mirror("https://5.example.org/", "France", "FR"),
        ];
        let key = country_sort_key(&["se".into(), "*".into(), "dk".into()]);
        let sorted = sort_by_key(mirrors.clone(), key);
        assert_eq!(
            countries(&sorted),
            vec!["Sweden", "Austria", "France", "Germany", "Denmark"]
        );

        // Without a wildcard, unlisted countries go last.
        let key = country_sort_key(&["Denmark".into(), "fr".into()]);
        let sorted = sort_by_key(mirrors, key);
        assert_eq!(
            countries(&sorted),
            vec!["Denmark", "France", "Austria", "Germany", "Sweden"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_sort_puts_failures_last() -> Result<()> {
        let transport = Arc::new(
            MockTransport::new()
                .with_probe("https://slow.example.org/", Probe::Ok { bytes: 1024, took: Duration::from_secs(2) })
                .with_probe("https://fast.example.org/", Probe::Ok { bytes: 1024, took: Duration::from_secs(1) }),
        );
        let runner = ProbeRunner::new(transport, Duration::from_secs(5), Duration::from_secs(5));
        let mirrors = vec![
            mirror("https://broken.example.org/", "Sweden", "SE"),
            mirror("https://slow.example.org/", "Sweden", "SE"),
            mirror("https://fast.example.org/", "Sweden", "SE"),
        ];

        let sorted = sort(mirrors, SortBy::Rate, &runner).await?;
        let urls: Vec<_> = sorted.iter().map(|m| m.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://fast.example.org/",
                "https://slow.example.org/",
                "https://broken.example.org/"
            ]
        );
        Ok(())
    }
}
