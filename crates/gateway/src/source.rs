use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use popgate_contracts::TimeRange;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    Unavailable(String),
}

impl SourceError {
    pub fn kind(&self) -> &'static str {
        match self {
            SourceError::Unavailable(_) => "SourceUnavailable",
        }
    }
}

impl std::fmt::Display for SourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceError::Unavailable(reason) => write!(f, "data source unavailable: {}", reason),
        }
    }
}

impl std::error::Error for SourceError {}

/// Handle to the store an engine reads a game's events from.
pub trait DataSource: Send + Sync {
    fn name(&self) -> &str;

    /// Builds a range in this source's notion of time. Bounds are not checked
    /// against each other.
    fn range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> TimeRange;
}

/// Resolves the data source configured for a game. `Ok(None)` means the game
/// has no source and no query can run.
#[async_trait]
pub trait SourceResolver: Send + Sync {
    async fn resolve(&self, game_id: &str) -> Result<Option<Arc<dyn DataSource>>, SourceError>;
}

pub fn resolve_range(
    source: &dyn DataSource,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> TimeRange {
    source.range(start, end)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedSource {
    name: String,
}

impl NamedSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl DataSource for NamedSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> TimeRange {
        TimeRange {
            source: self.name.clone(),
            start,
            end,
        }
    }
}

/// Game → source map fixed at startup.
pub struct ConfiguredSources {
    sources: BTreeMap<String, Arc<NamedSource>>,
}

impl ConfiguredSources {
    pub fn new(game_sources: &BTreeMap<String, String>) -> Self {
        let sources = game_sources
            .iter()
            .map(|(game_id, source)| {
                (
                    game_id.clone(),
                    Arc::new(NamedSource::new(source.as_str())),
                )
            })
            .collect();
        Self { sources }
    }
}

#[async_trait]
impl SourceResolver for ConfiguredSources {
    async fn resolve(&self, game_id: &str) -> Result<Option<Arc<dyn DataSource>>, SourceError> {
        Ok(self
            .sources
            .get(game_id)
            .map(|source| source.clone() as Arc<dyn DataSource>))
    }
}
