use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod envelope;

pub use envelope::{Envelope, ResponseStatus};

/// Scope of an export. Serialized upper-case; parsed without regard to case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExportMode {
    Events,
    Detectors,
    Session,
    Player,
    Population,
}

impl ExportMode {
    pub const ALL: [ExportMode; 5] = [
        ExportMode::Events,
        ExportMode::Detectors,
        ExportMode::Session,
        ExportMode::Player,
        ExportMode::Population,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ExportMode::Events => "EVENTS",
            ExportMode::Detectors => "DETECTORS",
            ExportMode::Session => "SESSION",
            ExportMode::Player => "PLAYER",
            ExportMode::Population => "POPULATION",
        }
    }

    const VARIANTS: &'static [&'static str] =
        &["EVENTS", "DETECTORS", "SESSION", "PLAYER", "POPULATION"];

    /// Key under which an engine writes this mode's table into an [`OutputSink`].
    pub fn sink_key(self) -> &'static str {
        match self {
            ExportMode::Events => "events",
            ExportMode::Detectors => "detectors",
            ExportMode::Session => "sessions",
            ExportMode::Player => "players",
            ExportMode::Population => "populations",
        }
    }
}

impl FromStr for ExportMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        ExportMode::ALL
            .into_iter()
            .find(|mode| mode.as_str() == upper)
            .ok_or_else(|| s.to_string())
    }
}

impl<'de> Deserialize<'de> for ExportMode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse()
            .map_err(|raw: String| serde::de::Error::unknown_variant(&raw, Self::VARIANTS))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureDescriptor {
    pub name: String,
    pub enabled_scopes: BTreeSet<ExportMode>,
}

impl FeatureDescriptor {
    pub fn is_enabled_for(&self, mode: ExportMode) -> bool {
        self.enabled_scopes.contains(&mode)
    }
}

/// Features a game declares, in registry order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameSchema {
    pub game_id: String,
    pub per_count: Vec<FeatureDescriptor>,
    pub aggregate: Vec<FeatureDescriptor>,
}

impl GameSchema {
    /// Per-count names first, then aggregate names. A name listed in both
    /// registries is reported once, at its first position.
    pub fn enabled_feature_names(&self, mode: ExportMode) -> Vec<String> {
        let mut seen = BTreeSet::new();
        self.per_count
            .iter()
            .chain(self.aggregate.iter())
            .filter(|feature| feature.is_enabled_for(mode))
            .filter(|feature| seen.insert(feature.name.as_str()))
            .map(|feature| feature.name.clone())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub source: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultTable {
    #[serde(default, alias = "cols")]
    pub columns: Vec<String>,
    #[serde(default, alias = "vals")]
    pub rows: Vec<Vec<serde_json::Value>>,
}

/// Tables written back by the engine, keyed by [`ExportMode::sink_key`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OutputSink {
    tables: BTreeMap<String, ResultTable>,
}

impl OutputSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn table(&self, mode: ExportMode) -> Option<&ResultTable> {
        self.tables.get(mode.sink_key())
    }

    pub fn insert(&mut self, mode: ExportMode, table: ResultTable) {
        self.tables.insert(mode.sink_key().to_string(), table);
    }

    pub fn merge(&mut self, other: OutputSink) {
        self.tables.extend(other.tables);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsQuery {
    pub game_id: String,
    pub range: TimeRange,
    pub scope: ExportMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric_override: Option<Vec<String>>,
    #[serde(skip)]
    pub output_sink: OutputSink,
}

impl AnalyticsQuery {
    /// An empty metric list means "every enabled metric" and is sent as no override.
    pub fn population(game_id: &str, range: TimeRange, metric_names: &[String]) -> Self {
        Self {
            game_id: game_id.to_string(),
            range,
            scope: ExportMode::Population,
            metric_override: (!metric_names.is_empty()).then(|| metric_names.to_vec()),
            output_sink: OutputSink::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyticsOutcome {
    pub succeeded: bool,
    pub message: String,
}

impl AnalyticsOutcome {
    pub fn not_run() -> Self {
        Self {
            succeeded: false,
            message: "No Export".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feature(name: &str, modes: &[ExportMode]) -> FeatureDescriptor {
        FeatureDescriptor {
            name: name.to_string(),
            enabled_scopes: modes.iter().copied().collect(),
        }
    }

    #[test]
    fn enabled_feature_names_lists_per_count_before_aggregate() {
        let schema = GameSchema {
            game_id: "GAME42".to_string(),
            per_count: vec![
                feature("LevelTime", &[ExportMode::Session, ExportMode::Population]),
                feature("LevelClicks", &[ExportMode::Session]),
            ],
            aggregate: vec![
                feature("SessionCount", &[ExportMode::Population]),
                feature("ActiveTime", &[ExportMode::Population, ExportMode::Player]),
            ],
        };

        assert_eq!(
            schema.enabled_feature_names(ExportMode::Population),
            vec!["LevelTime", "SessionCount", "ActiveTime"]
        );
        assert_eq!(
            schema.enabled_feature_names(ExportMode::Session),
            vec!["LevelTime", "LevelClicks"]
        );
    }

    #[test]
    fn enabled_feature_names_reports_shared_names_once() {
        let schema = GameSchema {
            game_id: "GAME".to_string(),
            per_count: vec![feature("Score", &[ExportMode::Population])],
            aggregate: vec![feature("Score", &[ExportMode::Population])],
        };

        assert_eq!(
            schema.enabled_feature_names(ExportMode::Population),
            vec!["Score"]
        );
    }

    #[test]
    fn export_mode_names_parse_in_any_case() {
        let modes: Vec<ExportMode> =
            serde_json::from_str(r#"["population", "SESSION", "Player", "deTectors"]"#)
                .expect("modes should parse");
        assert_eq!(
            modes,
            vec![
                ExportMode::Population,
                ExportMode::Session,
                ExportMode::Player,
                ExportMode::Detectors
            ]
        );

        let err = serde_json::from_str::<ExportMode>(r#""Galaxy""#).unwrap_err();
        assert!(err.to_string().contains("Galaxy"));
        assert_eq!(
            serde_json::to_value(ExportMode::Population).expect("mode should serialize"),
            serde_json::json!("POPULATION")
        );
    }

    #[test]
    fn result_table_accepts_short_column_and_value_keys() {
        let table: ResultTable = serde_json::from_value(serde_json::json!({
            "cols": ["sessions"],
            "vals": [[10]]
        }))
        .expect("table should parse");

        assert_eq!(table.columns, vec!["sessions"]);
        assert_eq!(table.rows, vec![vec![serde_json::json!(10)]]);
    }

    #[test]
    fn population_query_omits_override_for_empty_metric_list() {
        let range = TimeRange {
            source: "main".to_string(),
            start: DateTime::<Utc>::UNIX_EPOCH,
            end: DateTime::<Utc>::UNIX_EPOCH,
        };

        let all = AnalyticsQuery::population("GAME", range.clone(), &[]);
        assert_eq!(all.metric_override, None);
        assert_eq!(all.scope, ExportMode::Population);

        let some = AnalyticsQuery::population("GAME", range, &["sessions".to_string()]);
        assert_eq!(some.metric_override, Some(vec!["sessions".to_string()]));

        let wire = serde_json::to_value(&all).expect("query should serialize");
        assert!(wire.get("metric_override").is_none());
        assert!(wire.get("output_sink").is_none());
        assert_eq!(wire["scope"], "POPULATION");
    }
}
