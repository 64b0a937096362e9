use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use popgate_contracts::{ExportMode, FeatureDescriptor, GameSchema};
use serde::Deserialize;

#[derive(Debug)]
pub enum SchemaError {
    InvalidGameId(String),
    NotFound(String),
    Read(std::io::Error),
    Parse(serde_json::Error),
}

impl SchemaError {
    /// Stable name reported to clients in SERVER_ERROR messages.
    pub fn kind(&self) -> &'static str {
        match self {
            SchemaError::InvalidGameId(_) => "InvalidGameId",
            SchemaError::NotFound(_) => "SchemaNotFound",
            SchemaError::Read(_) => "SchemaReadError",
            SchemaError::Parse(_) => "SchemaParseError",
        }
    }
}

impl std::fmt::Display for SchemaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchemaError::InvalidGameId(game_id) => write!(f, "invalid game id '{}'", game_id),
            SchemaError::NotFound(game_id) => write!(f, "no schema found for game '{}'", game_id),
            SchemaError::Read(err) => write!(f, "failed to read game schema: {}", err),
            SchemaError::Parse(err) => write!(f, "failed to parse game schema: {}", err),
        }
    }
}

impl std::error::Error for SchemaError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SchemaError::Read(err) => Some(err),
            SchemaError::Parse(err) => Some(err),
            _ => None,
        }
    }
}

/// Source of game schemas. Implementations may block on I/O; nothing is cached.
#[async_trait]
pub trait SchemaRegistry: Send + Sync {
    async fn load(&self, game_id: &str) -> Result<GameSchema, SchemaError>;
}

/// Answers which features a game exports at a given scope.
#[derive(Clone)]
pub struct FeatureCatalog {
    registry: Arc<dyn SchemaRegistry>,
}

impl FeatureCatalog {
    pub fn new(registry: Arc<dyn SchemaRegistry>) -> Self {
        Self { registry }
    }

    pub async fn population_features(&self, game_id: &str) -> Result<Vec<String>, SchemaError> {
        let schema = self.registry.load(game_id).await?;
        Ok(schema.enabled_feature_names(ExportMode::Population))
    }
}

/// Reads `<dir>/<GAME_ID>.json`.
pub struct FileSchemaRegistry {
    dir: PathBuf,
}

impl FileSchemaRegistry {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl SchemaRegistry for FileSchemaRegistry {
    async fn load(&self, game_id: &str) -> Result<GameSchema, SchemaError> {
        if !is_safe_game_id(game_id) {
            return Err(SchemaError::InvalidGameId(game_id.to_string()));
        }

        let path = self.dir.join(format!("{}.json", game_id));
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(SchemaError::NotFound(game_id.to_string()));
            }
            Err(err) => return Err(SchemaError::Read(err)),
        };

        parse_schema(game_id, &contents)
    }
}

#[derive(Debug, Deserialize)]
struct SchemaFile {
    #[serde(default)]
    features: FeatureSections,
}

#[derive(Debug, Default, Deserialize)]
struct FeatureSections {
    #[serde(default)]
    per_count: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    aggregate: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct FeatureEntry {
    #[serde(default)]
    enabled: Enabled,
}

/// `true` enables every mode; a missing field enables none.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Enabled {
    Flag(bool),
    Modes(Vec<ExportMode>),
}

impl Default for Enabled {
    fn default() -> Self {
        Enabled::Flag(false)
    }
}

pub fn parse_schema(game_id: &str, contents: &str) -> Result<GameSchema, SchemaError> {
    let file: SchemaFile = serde_json::from_str(contents).map_err(SchemaError::Parse)?;

    Ok(GameSchema {
        game_id: game_id.to_string(),
        per_count: descriptors(file.features.per_count)?,
        aggregate: descriptors(file.features.aggregate)?,
    })
}

fn descriptors(
    section: serde_json::Map<String, serde_json::Value>,
) -> Result<Vec<FeatureDescriptor>, SchemaError> {
    section
        .into_iter()
        .map(|(name, value)| {
            let entry: FeatureEntry = serde_json::from_value(value).map_err(SchemaError::Parse)?;
            let enabled_scopes = match entry.enabled {
                Enabled::Flag(true) => ExportMode::ALL.into_iter().collect(),
                Enabled::Flag(false) => Default::default(),
                Enabled::Modes(modes) => modes.into_iter().collect(),
            };
            Ok(FeatureDescriptor {
                name,
                enabled_scopes,
            })
        })
        .collect()
}

fn is_safe_game_id(game_id: &str) -> bool {
    const MAX_LEN: usize = 64;
    !game_id.is_empty()
        && game_id.len() <= MAX_LEN
        && game_id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const GAME42_SCHEMA: &str = r#"{
        "game_id": "GAME42",
        "features": {
            "per_count": {
                "sessions": { "enabled": ["SESSION", "POPULATION"], "count": 1 },
                "level_clicks": { "enabled": ["SESSION"] }
            },
            "aggregate": {
                "time_played": { "enabled": ["population"] },
                "quit_rate": { "enabled": true },
                "draft_feature": {}
            }
        }
    }"#;

    fn temp_schema_dir(files: &[(&str, &str)]) -> PathBuf {
        static COUNTER: AtomicUsize = AtomicUsize::new(0);
        let suffix = COUNTER.fetch_add(1, Ordering::Relaxed);

        let dir = std::env::temp_dir().join(format!(
            "popgate_catalog_{}_{}",
            std::process::id(),
            suffix
        ));
        std::fs::create_dir_all(&dir).expect("temp schema dir create should succeed");
        for (name, contents) in files {
            std::fs::write(dir.join(name), contents).expect("schema write should succeed");
        }
        dir
    }

    #[test]
    fn parse_schema_keeps_registry_order_and_modes() {
        let schema = parse_schema("GAME42", GAME42_SCHEMA).expect("schema should parse");

        let per_count = schema
            .per_count
            .iter()
            .map(|f| f.name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(per_count, vec!["sessions", "level_clicks"]);

        let aggregate = schema
            .aggregate
            .iter()
            .map(|f| f.name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(aggregate, vec!["time_played", "quit_rate", "draft_feature"]);

        assert_eq!(schema.aggregate[1].enabled_scopes.len(), ExportMode::ALL.len());
        assert!(schema.aggregate[2].enabled_scopes.is_empty());
    }

    #[test]
    fn parse_schema_rejects_unknown_modes() {
        let err = parse_schema(
            "GAME",
            r#"{"features": {"per_count": {"x": {"enabled": ["GALAXY"]}}}}"#,
        )
        .unwrap_err();
        assert_eq!(err.kind(), "SchemaParseError");
    }

    #[tokio::test]
    async fn catalog_lists_population_features_per_count_first() {
        let dir = temp_schema_dir(&[("GAME42.json", GAME42_SCHEMA)]);
        let catalog = FeatureCatalog::new(Arc::new(FileSchemaRegistry::new(&dir)));

        let names = catalog
            .population_features("GAME42")
            .await
            .expect("catalog should resolve");

        assert_eq!(names, vec!["sessions", "time_played", "quit_rate"]);
        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn catalog_returns_empty_list_when_nothing_is_enabled() {
        let dir = temp_schema_dir(&[(
            "QUIET.json",
            r#"{"features": {"per_count": {"a": {"enabled": ["SESSION"]}}}}"#,
        )]);
        let catalog = FeatureCatalog::new(Arc::new(FileSchemaRegistry::new(&dir)));

        let names = catalog
            .population_features("QUIET")
            .await
            .expect("catalog should resolve");

        assert!(names.is_empty());
        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn missing_schema_file_is_not_found() {
        let dir = temp_schema_dir(&[]);
        let registry = FileSchemaRegistry::new(&dir);

        let err = registry.load("UNKNOWN").await.unwrap_err();
        assert_eq!(err.kind(), "SchemaNotFound");
        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn path_like_game_ids_are_rejected_before_io() {
        let registry = FileSchemaRegistry::new(std::env::temp_dir());

        for game_id in ["../etc/passwd", "a/b", "", "GAME 42"] {
            let err = registry.load(game_id).await.unwrap_err();
            assert_eq!(err.kind(), "InvalidGameId", "game_id={:?}", game_id);
        }
    }
}
