use crate::error::{MirrorStatusError, Result};
use crate::types::{Mirror, StatusSnapshot};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt::Write;
use std::time::SystemTime;

pub const DISPLAY_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

const WIDTH: usize = 80;
const LABEL_WIDTH: usize = 11;

/// Render a pacman mirrorlist for `mirrors`, or `None` when there are none.
///
/// `$repo` and `$arch` are left for pacman to substitute. With
/// `include_country` a comment header is emitted whenever the country changes,
/// so the mirrors should already be sorted by country.
pub fn format_mirrorlist(
    snapshot: &StatusSnapshot,
    mtime: SystemTime,
    mirrors: &[Mirror],
    include_country: bool,
    command: Option<&[String]>,
    url: &str,
) -> Result<Option<String>> {
    if mirrors.is_empty() {
        return Ok(None);
    }

    let command = match command {
        Some(args) => {
            let quoted: Vec<String> = args.iter().map(|a| shell_quote(a)).collect();
            format!("reflector {}", quoted.join(" "))
        }
        None => "?".to_string(),
    };
    let last_check = DateTime::<Utc>::from_timestamp(snapshot.last_check_time()?, 0)
        .ok_or_else(|| MirrorStatusError::Timestamp(snapshot.last_check.clone()))?;

    let header = center("# Arch Linux mirrorlist generated by Reflector #", WIDTH, '#');
    let border = "#".repeat(header.chars().count());

    let mut out = format!("{border}\n{header}\n{border}\n\n");
    let rows = [
        ("With:", command),
        ("When:", Utc::now().format(DISPLAY_TIME_FORMAT).to_string()),
        ("From:", url.to_string()),
        ("Retrieved:", display_time(DateTime::<Utc>::from(mtime))),
        ("Last Check:", display_time(last_check)),
    ];
    for (label, value) in rows {
        let _ = writeln!(out, "# {:<width$} {}", label, value, width = LABEL_WIDTH);
    }
    out.push('\n');

    let mut country: Option<String> = None;
    for mirror in mirrors {
        if include_country {
            let ctry = format!("{} [{}]", mirror.country, mirror.country_code);
            if country.as_deref() != Some(ctry.as_str()) {
                if country.is_some() {
                    out.push('\n');
                }
                let _ = writeln!(out, "# {}", ctry);
                country = Some(ctry);
            }
        }
        let _ = writeln!(out, "Server = {}$repo/os/$arch", mirror.url);
    }

    Ok(Some(out))
}

fn display_time(t: DateTime<Utc>) -> String {
    t.format(DISPLAY_TIME_FORMAT).to_string()
}

/// Center `text` in `width` columns, putting the odd fill column on the left
/// when both lengths are odd.
fn center(text: &str, width: usize, fill: char) -> String {
    let len = text.chars().count();
    if len >= width {
        return text.to_string();
    }
    let margin = width - len;
    let left = margin / 2 + (margin & width & 1);
    let right = margin - left;
    let mut out = String::with_capacity(width);
    out.extend(std::iter::repeat(fill).take(left));
    out.push_str(text);
    out.extend(std::iter::repeat(fill).take(right));
    out
}

/// Quote an argument for a POSIX shell, leaving plain words alone.
pub fn shell_quote(arg: &str) -> String {
    if arg.is_empty() {
        return "''".to_string();
    }
    let plain = arg
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "@%+=:,./-_".contains(c));
    if plain {
        return arg.to_string();
    }
    format!("'{}'", arg.replace('\'', "'\"'\"'"))
}

/// Number of mirrors per `(country, code)`. Mirrors without either are skipped.
pub fn count_countries(mirrors: &[Mirror]) -> BTreeMap<(String, String), usize> {
    let mut counts = BTreeMap::new();
    for mirror in mirrors {
        if mirror.country.is_empty() && mirror.country_code.is_empty() {
            continue;
        }
        *counts
            .entry((mirror.country.clone(), mirror.country_code.clone()))
            .or_insert(0) += 1;
    }
    counts
}

/// Table of countries, their codes and mirror counts, sorted by country.
pub fn format_country_table(counts: &BTreeMap<(String, String), usize>) -> String {
    let headers = ("Country", "Code", "Count");
    let country_w = counts
        .keys()
        .map(|(c, _)| c.chars().count())
        .chain(std::iter::once(headers.0.len()))
        .max()
        .unwrap_or(0);
    let code_w = headers.1.len();
    let count_w = counts
        .values()
        .max()
        .map(|n| n.to_string().len())
        .unwrap_or(0)
        .max(headers.2.len());

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<country_w$} {:>code_w$} {:<count_w$}",
        headers.0, headers.1, headers.2
    );
    let _ = writeln!(
        out,
        "{} {} {}",
        "-".repeat(country_w),
        "-".repeat(code_w),
        "-".repeat(count_w)
    );
    for ((country, code), n) in counts {
        let _ = writeln!(out, "{:<country_w$} {:>code_w$} {:>count_w$}", country, code, n);
    }
    out
}

/// Per-mirror dump of every field, keys sorted, for `--info`. Keys the status
/// service sends beyond the modelled ones are included.
pub fn format_mirror_info(mirrors: &[Mirror]) -> String {
    fn opt<T: ToString>(v: Option<T>) -> String {
        v.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
    }

    let mut out = String::new();
    for m in mirrors {
        let last_sync = match m.synced_at.and_then(|t| DateTime::<Utc>::from_timestamp(t, 0)) {
            Some(t) => display_time(t),
            None => opt(m.last_sync.clone()),
        };
        let mut fields: BTreeMap<&str, String> = m
            .extra
            .iter()
            .map(|(k, v)| {
                let value = match v {
                    serde_json::Value::String(s) => s.clone(),
                    serde_json::Value::Null => "-".to_string(),
                    other => other.to_string(),
                };
                (k.as_str(), value)
            })
            .collect();
        fields.extend([
            ("completion_pct", opt(m.completion_pct)),
            ("country", m.country.clone()),
            ("country_code", m.country_code.clone()),
            ("delay", opt(m.delay)),
            ("ipv4", m.ipv4.to_string()),
            ("ipv6", m.ipv6.to_string()),
            ("isos", m.isos.to_string()),
            ("last_sync", last_sync),
            ("protocol", m.protocol.clone()),
            ("score", opt(m.score)),
        ]);
        let width = fields.keys().map(|k| k.len()).max().unwrap_or(0);

        let _ = writeln!(out, "{}$repo/os/$arch", m.url);
        for (key, value) in &fields {
            let _ = writeln!(out, "{:<width$} : {}", key, value);
        }
        out.push('\n');
    }
    out
}
