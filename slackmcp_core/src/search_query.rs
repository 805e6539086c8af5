//! Composition of Slack search queries from free text plus structured
//! filter parameters.
//!
//! The raw query is tokenised on whitespace; `key:value` tokens with a
//! known filter key are lifted out, merged with the structured filters,
//! de-duplicated, resolved against the workspace caches (`#name` -> bare
//! name, `@handle` -> `<@Uxxxx>`), and recomposed in a fixed key order so
//! identical inputs always produce identical queries.

use std::collections::HashMap;

use chrono::{Duration, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::cache::{ChannelsCache, UsersCache};
use crate::error::ServerError;

pub const FILTER_KEY_ORDER: &[&str] = &["is", "in", "from", "with", "before", "after", "on", "during"];

fn is_filter_key(key: &str) -> bool {
    FILTER_KEY_ORDER.contains(&key.to_ascii_lowercase().as_str())
}

pub type Filters = HashMap<String, Vec<String>>;

/// Split a raw query into free-text tokens and pre-existing filters.
pub fn split_query(raw: &str) -> (Vec<String>, Filters) {
    let mut free = Vec::new();
    let mut filters: Filters = HashMap::new();
    for tok in raw.split_whitespace() {
        match tok.split_once(':') {
            Some((key, value)) if is_filter_key(key) && !value.is_empty() => {
                filters
                    .entry(key.to_ascii_lowercase())
                    .or_default()
                    .push(value.to_string());
            }
            _ => free.push(tok.to_string()),
        }
    }
    (free, filters)
}

/// Add a filter value, dropping exact key+value duplicates.
pub fn add_filter(filters: &mut Filters, key: &str, value: String) {
    let values = filters.entry(key.to_string()).or_default();
    if !values.iter().any(|v| v == &value) {
        values.push(value);
    }
}

/// Recompose `free... key:value...` with keys in the fixed order.
pub fn build_query(free: &[String], filters: &Filters) -> String {
    let mut out: Vec<String> = free.to_vec();
    for key in FILTER_KEY_ORDER {
        if let Some(values) = filters.get(*key) {
            for v in values {
                out.push(format!("{}:{}", key, v));
            }
        }
    }
    out.join(" ")
}

/// Resolve a user reference to Slack's `<@Uxxxx>` form. Accepts raw IDs
/// (U/W prefixes), `@handle`, `<@handle` and bare handles.
pub fn format_user(raw: &str, users: &UsersCache) -> Result<String, ServerError> {
    let raw = raw.trim();
    if raw.starts_with('U') || raw.starts_with('W') {
        let u = users
            .users
            .get(raw)
            .ok_or_else(|| ServerError::NotFound(format!("user {:?}", raw)))?;
        return Ok(format!("<@{}>", u.id));
    }
    let mut handle = raw;
    if let Some(rest) = handle.strip_prefix("<@") {
        handle = rest.strip_suffix('>').unwrap_or(rest);
    }
    handle = handle.strip_prefix('@').unwrap_or(handle);
    let id = users
        .users_inv
        .get(handle)
        .ok_or_else(|| ServerError::NotFound(format!("user {:?}", raw)))?;
    Ok(format!("<@{}>", id))
}

/// Resolve a channel reference to the bare name Slack's search grammar
/// expects (`in:general`). Accepts `#name` and C/G channel IDs.
pub fn format_channel(raw: &str, channels: &ChannelsCache) -> Result<String, ServerError> {
    let raw = raw.trim();
    let bare = |name: &str| name.strip_prefix('#').unwrap_or(name).to_string();
    if raw.starts_with('#') {
        let id = channels
            .channels_inv
            .get(raw)
            .ok_or_else(|| ServerError::NotFound(format!("channel {:?}", raw)))?;
        return Ok(bare(&channels.channels[id].name));
    }
    if raw.starts_with('C') || raw.starts_with('G') {
        let ch = channels
            .channels
            .get(raw)
            .ok_or_else(|| ServerError::NotFound(format!("channel {:?}", raw)))?;
        return Ok(bare(&ch.name));
    }
    Err(ServerError::InvalidInput(format!(
        "invalid channel format: {:?}",
        raw
    )))
}

/// Resolve pre-existing `in:`/`from:`/`with:` values that are explicit
/// references (`#name`, `@handle`, `<@U..>`); bare values pass through
/// untouched so Slack-grammar queries keep working verbatim.
pub fn resolve_filter_values(
    filters: &mut Filters,
    users: &UsersCache,
    channels: &ChannelsCache,
) -> Result<(), ServerError> {
    if let Some(values) = filters.get_mut("in") {
        for v in values.iter_mut() {
            if v.starts_with('#') {
                *v = format_channel(v, channels)?;
            } else if v.starts_with('@') || v.starts_with("<@") {
                *v = format_user(v, users)?;
            }
        }
    }
    for key in ["from", "with"] {
        if let Some(values) = filters.get_mut(key) {
            for v in values.iter_mut() {
                if v.starts_with('@') || v.starts_with("<@") {
                    *v = format_user(v, users)?;
                }
            }
        }
    }
    Ok(())
}

static MONTH_YEAR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:(\d{4})\s+([A-Za-z]+)|([A-Za-z]+)\s+(\d{4}))$").expect("month-year regex")
});
static DAYS_AGO_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+)\s+days?\s+ago$").expect("days-ago regex"));

fn month_number(name: &str) -> Option<u32> {
    match name.to_ascii_lowercase().as_str() {
        "january" | "jan" => Some(1),
        "february" | "feb" => Some(2),
        "march" | "mar" => Some(3),
        "april" | "apr" => Some(4),
        "may" => Some(5),
        "june" | "jun" => Some(6),
        "july" | "jul" => Some(7),
        "august" | "aug" => Some(8),
        "september" | "sep" | "sept" => Some(9),
        "october" | "oct" => Some(10),
        "november" | "nov" => Some(11),
        "december" | "dec" => Some(12),
        _ => None,
    }
}

/// Parse a date in any of the accepted formats, normalised to YYYY-MM-DD.
/// Relative forms (`today`, `N days ago`) are resolved against `today`.
pub fn parse_flexible_date(input: &str, today: NaiveDate) -> Result<(NaiveDate, String), ServerError> {
    let s = input.trim();

    const FORMATS: &[&str] = &[
        "%Y-%m-%d",
        "%Y/%m/%d",
        "%m-%d-%Y",
        "%m/%d/%Y",
        "%d-%m-%Y",
        "%d/%m/%Y",
        "%b %d, %Y",
        "%B %d, %Y",
        "%d %b %Y",
        "%d %B %Y",
    ];
    for fmt in FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Ok((d, d.format("%Y-%m-%d").to_string()));
        }
    }

    if let Some(m) = MONTH_YEAR_RE.captures(s) {
        let (year, month_name) = if m.get(1).is_some() {
            (m[1].parse::<i32>().ok(), m[2].to_string())
        } else {
            (m[4].parse::<i32>().ok(), m[3].to_string())
        };
        if let (Some(year), Some(month)) = (year, month_number(&month_name)) {
            if let Some(d) = NaiveDate::from_ymd_opt(year, month, 1) {
                return Ok((d, d.format("%Y-%m-%d").to_string()));
            }
        }
    }

    let lower = s.to_ascii_lowercase();
    let relative = match lower.as_str() {
        "today" => Some(today),
        "yesterday" => Some(today - Duration::days(1)),
        "tomorrow" => Some(today + Duration::days(1)),
        _ => None,
    };
    if let Some(d) = relative {
        return Ok((d, d.format("%Y-%m-%d").to_string()));
    }

    if let Some(m) = DAYS_AGO_RE.captures(&lower) {
        if let Ok(days) = m[1].parse::<i64>() {
            let d = today - Duration::days(days);
            return Ok((d, d.format("%Y-%m-%d").to_string()));
        }
    }

    Err(ServerError::InvalidInput(format!(
        "unable to parse date: {}",
        input
    )))
}

/// Validate the date filter combination and normalise each value.
///
/// `on` excludes everything else; `during` excludes before/after; a
/// before+after pair must satisfy after <= before.
pub fn build_date_filters(
    before: &str,
    after: &str,
    on: &str,
    during: &str,
    today: NaiveDate,
) -> Result<HashMap<String, String>, ServerError> {
    let mut out = HashMap::new();
    if !on.is_empty() {
        if !during.is_empty() || !before.is_empty() || !after.is_empty() {
            return Err(ServerError::InvalidInput(
                "'on' cannot be combined with other date filters".into(),
            ));
        }
        let (_, normalized) = parse_flexible_date(on, today)?;
        out.insert("on".to_string(), normalized);
        return Ok(out);
    }
    if !during.is_empty() {
        if !before.is_empty() || !after.is_empty() {
            return Err(ServerError::InvalidInput(
                "'during' cannot be combined with 'before' or 'after'".into(),
            ));
        }
        let (_, normalized) = parse_flexible_date(during, today)?;
        out.insert("during".to_string(), normalized);
        return Ok(out);
    }

    let mut after_date = None;
    if !after.is_empty() {
        let (d, normalized) = parse_flexible_date(after, today)?;
        after_date = Some(d);
        out.insert("after".to_string(), normalized);
    }
    let mut before_date = None;
    if !before.is_empty() {
        let (d, normalized) = parse_flexible_date(before, today)?;
        before_date = Some(d);
        out.insert("before".to_string(), normalized);
    }
    if let (Some(a), Some(b)) = (after_date, before_date) {
        if a > b {
            return Err(ServerError::InvalidInput(
                "'after' date is after 'before' date".into(),
            ));
        }
    }
    Ok(out)
}

/// Structured filter parameters accompanying a raw search query.
#[derive(Debug, Clone, Default)]
pub struct SearchFilterParams {
    pub in_channel: String,
    pub in_im_or_mpim: String,
    pub users_with: String,
    pub users_from: String,
    pub date_before: String,
    pub date_after: String,
    pub date_on: String,
    pub date_during: String,
    pub threads_only: bool,
}

/// Compose the final Slack query string from a raw query plus structured
/// filters, resolved against the workspace caches.
pub fn compose_query(
    raw_query: &str,
    params: &SearchFilterParams,
    users: &UsersCache,
    channels: &ChannelsCache,
    today: NaiveDate,
) -> Result<String, ServerError> {
    let (free, mut filters) = split_query(raw_query);
    resolve_filter_values(&mut filters, users, channels)?;

    if params.threads_only {
        add_filter(&mut filters, "is", "thread".to_string());
    }
    if !params.in_channel.is_empty() {
        add_filter(&mut filters, "in", format_channel(&params.in_channel, channels)?);
    } else if !params.in_im_or_mpim.is_empty() {
        add_filter(&mut filters, "in", format_user(&params.in_im_or_mpim, users)?);
    }
    if !params.users_with.is_empty() {
        add_filter(&mut filters, "with", format_user(&params.users_with, users)?);
    }
    if !params.users_from.is_empty() {
        add_filter(&mut filters, "from", format_user(&params.users_from, users)?);
    }

    let dates = build_date_filters(
        &params.date_before,
        &params.date_after,
        &params.date_on,
        &params.date_during,
        today,
    )?;
    for (key, value) in dates {
        add_filter(&mut filters, &key, value);
    }

    Ok(build_query(&free, &filters))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slack::types as wire;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 10).unwrap()
    }

    fn fixture_caches() -> (UsersCache, ChannelsCache) {
        let users_wire = vec![wire::User {
            id: "U_ALICE".into(),
            name: "alice".into(),
            real_name: "Alice Doe".into(),
            ..Default::default()
        }];
        let users = UsersCache::from_users(&users_wire);
        let chans = vec![wire::Channel {
            id: "C_GENERAL".into(),
            name: "general".into(),
            ..Default::default()
        }];
        let channels = ChannelsCache::from_channels(&chans, &users);
        (users, channels)
    }

    #[test]
    fn split_collects_known_filter_keys() {
        let (free, filters) = split_query("hello from:@alice is:thread world");
        assert_eq!(free, vec!["hello", "world"]);
        assert_eq!(filters["from"], vec!["@alice"]);
        assert_eq!(filters["is"], vec!["thread"]);
    }

    #[test]
    fn unknown_keys_stay_free_text() {
        let (free, filters) = split_query("foo:bar baz");
        assert_eq!(free, vec!["foo:bar", "baz"]);
        assert!(filters.is_empty());
    }

    #[test]
    fn duplicate_filters_are_dropped() {
        let mut filters = Filters::new();
        add_filter(&mut filters, "in", "general".into());
        add_filter(&mut filters, "in", "general".into());
        add_filter(&mut filters, "in", "random".into());
        assert_eq!(filters["in"], vec!["general", "random"]);
    }

    #[test]
    fn compose_matches_expected_shape() {
        let (users, channels) = fixture_caches();
        let params = SearchFilterParams {
            in_channel: "#general".into(),
            date_after: "yesterday".into(),
            ..Default::default()
        };
        let q = compose_query("hello from:@alice", &params, &users, &channels, today()).unwrap();
        assert_eq!(q, "hello in:general from:<@U_ALICE> after:2025-01-09");
    }

    #[test]
    fn bare_filter_values_pass_through() {
        let (users, channels) = fixture_caches();
        let q = compose_query(
            "deploy in:general from:Ursula",
            &SearchFilterParams::default(),
            &users,
            &channels,
            today(),
        )
        .unwrap();
        assert_eq!(q, "deploy in:general from:Ursula");
    }

    #[test]
    fn user_resolution_forms() {
        let (users, _) = fixture_caches();
        assert_eq!(format_user("@alice", &users).unwrap(), "<@U_ALICE>");
        assert_eq!(format_user("alice", &users).unwrap(), "<@U_ALICE>");
        assert_eq!(format_user("U_ALICE", &users).unwrap(), "<@U_ALICE>");
        assert!(format_user("@nobody", &users).is_err());
    }

    #[test]
    fn channel_resolution_forms() {
        let (_, channels) = fixture_caches();
        assert_eq!(format_channel("#general", &channels).unwrap(), "general");
        assert_eq!(format_channel("C_GENERAL", &channels).unwrap(), "general");
        assert!(format_channel("#nope", &channels).is_err());
        assert!(format_channel("general", &channels).is_err());
    }

    #[test]
    fn flexible_dates() {
        let t = today();
        let cases = [
            ("2025-01-10", "2025-01-10"),
            ("2025/01/10", "2025-01-10"),
            ("01/10/2025", "2025-01-10"),
            ("25/12/2025", "2025-12-25"),
            ("Jan 2, 2025", "2025-01-02"),
            ("2 Jan 2025", "2025-01-02"),
            ("July 2024", "2024-07-01"),
            ("2024 July", "2024-07-01"),
            ("today", "2025-01-10"),
            ("yesterday", "2025-01-09"),
            ("tomorrow", "2025-01-11"),
            ("3 days ago", "2025-01-07"),
        ];
        for (input, expected) in cases {
            let (_, normalized) = parse_flexible_date(input, t).unwrap();
            assert_eq!(normalized, expected, "input {:?}", input);
        }
        assert!(parse_flexible_date("not a date", t).is_err());
    }

    #[test]
    fn date_filter_combinations() {
        let t = today();
        assert!(build_date_filters("", "", "today", "yesterday", t).is_err());
        assert!(build_date_filters("today", "", "", "July 2024", t).is_err());
        assert!(build_date_filters("2025-01-01", "2025-01-05", "", "", t).is_err());

        let ok = build_date_filters("2025-01-05", "2025-01-01", "", "", t).unwrap();
        assert_eq!(ok["before"], "2025-01-05");
        assert_eq!(ok["after"], "2025-01-01");

        let on = build_date_filters("", "", "yesterday", "", t).unwrap();
        assert_eq!(on["on"], "2025-01-09");
    }

    #[test]
    fn recomposition_key_order_is_fixed() {
        let mut filters = Filters::new();
        add_filter(&mut filters, "during", "2024-07-01".into());
        add_filter(&mut filters, "is", "thread".into());
        add_filter(&mut filters, "in", "general".into());
        let q = build_query(&["deploy".to_string()], &filters);
        assert_eq!(q, "deploy is:thread in:general during:2024-07-01");
    }
}
