use crate::error::Result;
use crate::types::Mirror;
use chrono::Utc;
use regex::Regex;
use tracing::warn;

/// Criteria for [`filter`]. Unset fields impose no constraint.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterCriteria {
    /// Minimum completion fraction in `[0, 1]`.
    pub min_completion_pct: f64,
    /// Country names or codes, case-insensitive. `*` matches every country.
    pub countries: Vec<String>,
    pub protocols: Vec<String>,
    /// Regexes searched for in the URL; at least one must match.
    pub include: Vec<String>,
    /// Regexes searched for in the URL; none may match.
    pub exclude: Vec<String>,
    /// Maximum hours since the last synchronization. Ignored unless positive.
    pub age: Option<f64>,
    /// Maximum reported sync delay in hours.
    pub delay: Option<f64>,
    pub isos: bool,
    pub ipv4: bool,
    pub ipv6: bool,
}

impl Default for FilterCriteria {
    fn default() -> Self {
        Self {
            min_completion_pct: 1.0,
            countries: Vec::new(),
            protocols: Vec::new(),
            include: Vec::new(),
            exclude: Vec::new(),
            age: None,
            delay: None,
            isos: false,
            ipv4: false,
            ipv6: false,
        }
    }
}

/// Compiled form of [`FilterCriteria`].
#[derive(Debug, Clone)]
pub struct MirrorFilter {
    min_completion_pct: f64,
    countries: Vec<String>,
    protocols: Vec<String>,
    include: Vec<Regex>,
    exclude: Vec<Regex>,
    age_secs: Option<f64>,
    delay_secs: Option<f64>,
    isos: bool,
    ipv4: bool,
    ipv6: bool,
}

impl MirrorFilter {
    /// Fails on the first malformed include/exclude expression.
    pub fn new(criteria: &FilterCriteria) -> Result<Self> {
        let countries = if criteria.countries.iter().any(|c| c.trim() == "*") {
            Vec::new()
        } else {
            criteria.countries.iter().map(|c| c.to_uppercase()).collect()
        };

        Ok(Self {
            min_completion_pct: criteria.min_completion_pct,
            countries,
            protocols: criteria.protocols.clone(),
            include: compile(&criteria.include)?,
            exclude: compile(&criteria.exclude)?,
            age_secs: criteria.age.filter(|a| *a > 0.0).map(|a| a * 3600.0),
            delay_secs: criteria.delay.map(|d| d * 3600.0),
            isos: criteria.isos,
            ipv4: criteria.ipv4,
            ipv6: criteria.ipv6,
        })
    }

    /// Lazily filter `mirrors`. Unsynced mirrors are always dropped and the
    /// survivors carry a parsed `synced_at`.
    pub fn apply<I>(self, mirrors: I) -> impl Iterator<Item = Mirror>
    where
        I: IntoIterator<Item = Mirror>,
    {
        let now = Utc::now().timestamp();
        mirrors
            .into_iter()
            .filter(|m| m.last_sync.is_some())
            .filter_map(|m| {
                let url = m.url.clone();
                match m.with_parsed_sync() {
                    Ok(parsed) => parsed,
                    Err(e) => {
                        warn!("skipping {}: {}", url, e);
                        None
                    }
                }
            })
            .filter(move |m| self.accepts(m, now))
    }

    /// The predicates after the base steps, in order.
    fn accepts(&self, m: &Mirror, now: i64) -> bool {
        if m.completion_pct.unwrap_or(0.0) < self.min_completion_pct {
            return false;
        }

        if !self.countries.is_empty() {
            let country = m.country.to_uppercase();
            let code = m.country_code.to_uppercase();
            if !self.countries.iter().any(|c| *c == country || *c == code) {
                return false;
            }
        }

        if !self.protocols.is_empty()
            && !self
                .protocols
                .iter()
                .any(|p| p.eq_ignore_ascii_case(&m.protocol))
        {
            return false;
        }

        if !self.include.is_empty() && !self.include.iter().any(|r| r.is_match(&m.url)) {
            return false;
        }

        if self.exclude.iter().any(|r| r.is_match(&m.url)) {
            return false;
        }

        if let Some(age) = self.age_secs {
            match m.synced_at {
                Some(synced) if synced as f64 + age >= now as f64 => {}
                _ => return false,
            }
        }

        if let Some(delay) = self.delay_secs {
            match m.delay {
                Some(d) if d as f64 <= delay => {}
                _ => return false,
            }
        }

        (!self.isos || m.isos) && (!self.ipv4 || m.ipv4) && (!self.ipv6 || m.ipv6)
    }
}

fn compile(patterns: &[String]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| Regex::new(p).map_err(Into::into))
        .collect()
}

/// Filter `mirrors` by `criteria`. The returned iterator is single-pass.
pub fn filter<I>(mirrors: I, criteria: &FilterCriteria) -> Result<impl Iterator<Item = Mirror>>
where
    I: IntoIterator<Item = Mirror>,
{
    Ok(MirrorFilter::new(criteria)?.apply(mirrors))
}
