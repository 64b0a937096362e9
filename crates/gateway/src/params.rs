//! Binding of raw form fields into [`MetricRequestParams`].
//!
//! Every field has its own parse-with-fallback function. Malformed input never
//! fails the request: the documented default is used and a [`ParamWarning`] is
//! returned for the caller to log.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};

pub const UNKNOWN_GAME_ID: &str = "UNKNOWN";

/// Window covered when neither bound is supplied.
pub fn default_window() -> Duration {
    Duration::hours(1)
}

/// Raw form fields of the compute request, urlencoded or multipart.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawMetricsForm {
    pub game_id: Option<String>,
    pub start_datetime: Option<String>,
    pub end_datetime: Option<String>,
    pub metrics: Option<String>,
}

impl RawMetricsForm {
    /// Keeps the first value of each known key. Repeated keys and unknown keys
    /// are ignored so one bad pair never discards the rest of the form.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut form = Self::default();
        for (key, value) in pairs {
            form.set_first(key.as_ref(), value.into());
        }
        form
    }

    /// Returns `false` when `key` is not a form field or already has a value.
    pub fn set_first(&mut self, key: &str, value: String) -> bool {
        let slot = match key {
            "game_id" => &mut self.game_id,
            "start_datetime" => &mut self.start_datetime,
            "end_datetime" => &mut self.end_datetime,
            "metrics" => &mut self.metrics,
            _ => return false,
        };
        if slot.is_some() {
            return false;
        }
        *slot = Some(value);
        true
    }

    pub fn is_field(key: &str) -> bool {
        matches!(
            key,
            "game_id" | "start_datetime" | "end_datetime" | "metrics"
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricRequestParams {
    pub game_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Empty means every metric enabled for population export.
    pub metric_names: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamWarning {
    MissingGameId,
    InvalidStartDatetime(String),
    InvalidEndDatetime(String),
    DroppedMetricEntries(usize),
    UnreadableMetricList(String),
}

impl std::fmt::Display for ParamWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamWarning::MissingGameId => {
                write!(f, "missing game_id, defaulting to {}", UNKNOWN_GAME_ID)
            }
            ParamWarning::InvalidStartDatetime(raw) => write!(
                f,
                "invalid starting date '{}', defaulting to 1 hour ago",
                raw
            ),
            ParamWarning::InvalidEndDatetime(raw) => write!(
                f,
                "invalid ending date '{}', defaulting to present time",
                raw
            ),
            ParamWarning::DroppedMetricEntries(count) => {
                write!(f, "dropped {} malformed metric entries", count)
            }
            ParamWarning::UnreadableMetricList(raw) => {
                write!(f, "got bad list of metrics '{}', defaulting to all", raw)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundParams {
    pub params: MetricRequestParams,
    pub warnings: Vec<ParamWarning>,
}

pub fn bind(form: &RawMetricsForm, now: DateTime<Utc>) -> BoundParams {
    let mut warnings = Vec::new();

    let (game_id, warning) = parse_game_id(form.game_id.as_deref());
    warnings.extend(warning);

    let (end_time, warning) = parse_datetime_or(form.end_datetime.as_deref(), now)
        .map_warning(ParamWarning::InvalidEndDatetime);
    warnings.extend(warning);

    let (start_time, warning) =
        parse_datetime_or(form.start_datetime.as_deref(), now - default_window())
            .map_warning(ParamWarning::InvalidStartDatetime);
    warnings.extend(warning);

    let (metric_names, warning) = parse_metric_list(form.metrics.as_deref());
    warnings.extend(warning);

    BoundParams {
        params: MetricRequestParams {
            game_id,
            start_time,
            end_time,
            metric_names,
        },
        warnings,
    }
}

pub fn parse_game_id(raw: Option<&str>) -> (String, Option<ParamWarning>) {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(game_id) => (game_id.to_string(), None),
        None => (
            UNKNOWN_GAME_ID.to_string(),
            Some(ParamWarning::MissingGameId),
        ),
    }
}

/// Parsed timestamp, or the default together with the rejected raw text.
pub struct Fallback<T> {
    pub value: T,
    pub rejected: Option<String>,
}

impl<T> Fallback<T> {
    fn map_warning(self, f: impl FnOnce(String) -> ParamWarning) -> (T, Option<ParamWarning>) {
        (self.value, self.rejected.map(f))
    }
}

/// Absent or blank input silently takes the default; unparsable input takes the
/// default and is reported.
pub fn parse_datetime_or(raw: Option<&str>, default: DateTime<Utc>) -> Fallback<DateTime<Utc>> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Fallback {
            value: default,
            rejected: None,
        };
    };

    match parse_iso8601(raw) {
        Some(value) => Fallback {
            value,
            rejected: None,
        },
        None => Fallback {
            value: default,
            rejected: Some(raw.to_string()),
        },
    }
}

/// Accepts RFC 3339, offset-less date-times (read as UTC) and bare dates.
pub fn parse_iso8601(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Accepts a JSON array of strings, a bracketed list of bare names, or a plain
/// comma-separated list. Non-string and blank entries are dropped; duplicates
/// keep their first position.
pub fn parse_metric_list(raw: Option<&str>) -> (Vec<String>, Option<ParamWarning>) {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return (Vec::new(), None);
    };

    let (candidates, mut dropped) = if raw.starts_with('[') {
        match serde_json::from_str::<Vec<serde_json::Value>>(raw) {
            Ok(values) => split_json_entries(values),
            Err(_) if raw.ends_with(']') => split_delimited(&raw[1..raw.len() - 1]),
            Err(_) => {
                return (
                    Vec::new(),
                    Some(ParamWarning::UnreadableMetricList(raw.to_string())),
                );
            }
        }
    } else {
        split_delimited(raw)
    };

    let mut names: Vec<String> = Vec::with_capacity(candidates.len());
    for name in candidates {
        if !is_valid_metric_name(&name) {
            dropped += 1;
        } else if !names.contains(&name) {
            names.push(name);
        }
    }

    let warning = (dropped > 0).then_some(ParamWarning::DroppedMetricEntries(dropped));
    (names, warning)
}

fn split_json_entries(values: Vec<serde_json::Value>) -> (Vec<String>, usize) {
    let mut names = Vec::with_capacity(values.len());
    let mut dropped = 0;
    for value in values {
        match value {
            serde_json::Value::String(name) => names.push(name.trim().to_string()),
            _ => dropped += 1,
        }
    }
    (names, dropped)
}

fn split_delimited(raw: &str) -> (Vec<String>, usize) {
    let mut names = Vec::new();
    let mut dropped = 0;
    for entry in raw.split(',') {
        let entry = entry.trim().trim_matches(|c| c == '"' || c == '\'').trim();
        if entry.is_empty() {
            if !raw.trim().is_empty() {
                dropped += 1;
            }
            continue;
        }
        names.push(entry.to_string());
    }
    (names, dropped)
}

fn is_valid_metric_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-' | '.'))
}
