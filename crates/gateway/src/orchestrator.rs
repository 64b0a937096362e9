use std::sync::Arc;
use std::time::Instant;

use popgate_contracts::{AnalyticsOutcome, AnalyticsQuery, OutputSink};

use crate::engine::{AnalyticsEngine, EngineError};
use crate::params::MetricRequestParams;
use crate::source::{SourceError, SourceResolver, resolve_range};

#[derive(Debug)]
pub enum QueryError {
    Source(SourceError),
    Engine(EngineError),
}

impl QueryError {
    pub fn kind(&self) -> &'static str {
        match self {
            QueryError::Source(err) => err.kind(),
            QueryError::Engine(err) => err.kind(),
        }
    }
}

impl std::fmt::Display for QueryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueryError::Source(err) => write!(f, "{}", err),
            QueryError::Engine(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for QueryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            QueryError::Source(err) => Some(err),
            QueryError::Engine(err) => Some(err),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryReport {
    pub engine_invoked: bool,
    pub outcome: AnalyticsOutcome,
    pub sink: OutputSink,
}

/// Builds one population query per request and hands it to the engine.
#[derive(Clone)]
pub struct QueryOrchestrator {
    sources: Arc<dyn SourceResolver>,
    engine: Arc<dyn AnalyticsEngine>,
}

impl QueryOrchestrator {
    pub fn new(sources: Arc<dyn SourceResolver>, engine: Arc<dyn AnalyticsEngine>) -> Self {
        Self { sources, engine }
    }

    /// A game without a data source yields an empty sink and the engine is not
    /// called. Failures are returned once, never retried.
    pub async fn run(&self, params: &MetricRequestParams) -> Result<QueryReport, QueryError> {
        let source = self
            .sources
            .resolve(&params.game_id)
            .await
            .map_err(QueryError::Source)?;

        let Some(source) = source else {
            tracing::warn!(game_id = %params.game_id, "population.data_source_missing");
            return Ok(QueryReport {
                engine_invoked: false,
                outcome: AnalyticsOutcome::not_run(),
                sink: OutputSink::new(),
            });
        };

        let range = resolve_range(source.as_ref(), params.start_time, params.end_time);
        let mut query = AnalyticsQuery::population(&params.game_id, range, &params.metric_names);

        tracing::info!(
            game_id = %query.game_id,
            source = %query.range.source,
            start = %query.range.start,
            end = %query.range.end,
            metrics = ?query.metric_override,
            "population.query"
        );

        let started = Instant::now();
        let result = self.engine.execute(&mut query).await;
        crate::metrics::observe_engine_call(
            if result.is_ok() { "ok" } else { "error" },
            started.elapsed(),
        );

        let outcome = result.map_err(QueryError::Engine)?;
        tracing::info!(
            game_id = %query.game_id,
            succeeded = outcome.succeeded,
            message = %outcome.message,
            "population.engine_result"
        );

        Ok(QueryReport {
            engine_invoked: true,
            outcome,
            sink: query.output_sink,
        })
    }
}
