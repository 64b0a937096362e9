use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use ulid::Ulid;

use crate::catalog::{FeatureCatalog, FileSchemaRegistry, SchemaRegistry};
use crate::config::{CorsOrigins, GatewayConfig, StartupError};
use crate::engine::{AnalyticsEngine, RemoteEngine};
use crate::orchestrator::QueryOrchestrator;
use crate::source::{ConfiguredSources, SourceResolver};

mod envelope;
mod form;
mod population;

pub const REQUEST_ID_HEADER: &str = "x-popgate-request-id";

/// Shared per-process state. Everything in here is read-only after startup.
#[derive(Clone)]
pub struct AppState {
    config: Arc<GatewayConfig>,
    catalog: FeatureCatalog,
    orchestrator: QueryOrchestrator,
}

impl AppState {
    pub fn new(
        config: GatewayConfig,
        schemas: Arc<dyn SchemaRegistry>,
        sources: Arc<dyn SourceResolver>,
        engine: Arc<dyn AnalyticsEngine>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            catalog: FeatureCatalog::new(schemas),
            orchestrator: QueryOrchestrator::new(sources, engine),
        }
    }
}

pub fn router(config: GatewayConfig) -> Result<Router, StartupError> {
    let engine = RemoteEngine::new(
        config.engine_url.clone(),
        Duration::from_millis(config.engine_timeout_ms),
    )
    .map_err(|err| StartupError {
        code: "ERR_ENGINE_UNAVAILABLE",
        message: format!("failed to initialize analytics engine client: {}", err),
    })?;

    let schemas = Arc::new(FileSchemaRegistry::new(config.schema_dir.clone()));
    let sources = Arc::new(ConfiguredSources::new(&config.game_sources));

    Ok(router_with_state(AppState::new(
        config,
        schemas,
        sources,
        Arc::new(engine),
    )))
}

pub fn router_with_state(state: AppState) -> Router {
    let populations = Router::new()
        .route("/populations/metrics", post(population::compute_metrics))
        .route(
            "/populations/metrics/list/{game_id}",
            get(population::list_metrics),
        )
        .layer(cors_layer(&state.config.cors_allowed_origins));

    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .merge(populations)
        .with_state(state)
}

fn cors_layer(origins: &CorsOrigins) -> CorsLayer {
    let allow_origin = match origins {
        CorsOrigins::Any => AllowOrigin::any(),
        CorsOrigins::List(origins) => AllowOrigin::list(
            origins
                .iter()
                .filter_map(|origin| HeaderValue::from_str(origin).ok()),
        ),
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn metrics() -> impl IntoResponse {
    match crate::metrics::render() {
        Ok((body, content_type)) => {
            let mut headers = HeaderMap::new();
            if let Ok(value) = HeaderValue::from_str(content_type.as_str()) {
                headers.insert(header::CONTENT_TYPE, value);
            }
            (headers, body).into_response()
        }
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

fn extract_request_id(headers: &HeaderMap) -> String {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .and_then(sanitize_request_id)
        .unwrap_or_else(|| Ulid::new().to_string())
}

fn sanitize_request_id(raw: &str) -> Option<String> {
    const MAX_LEN: usize = 64;
    let mut out = String::with_capacity(raw.len().min(MAX_LEN));

    for ch in raw.chars() {
        if out.len() >= MAX_LEN {
            break;
        }
        if ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.') {
            out.push(ch);
        }
    }

    (!out.is_empty()).then_some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_id_is_sanitized_and_bounded() {
        assert_eq!(
            sanitize_request_id("req 01/<script>"),
            Some("req01script".to_string())
        );
        assert_eq!(sanitize_request_id("///"), None);

        let long = "a".repeat(200);
        assert_eq!(sanitize_request_id(&long).map(|s| s.len()), Some(64));
    }

    #[test]
    fn missing_request_id_gets_a_ulid() {
        let generated = extract_request_id(&HeaderMap::new());
        assert!(generated.parse::<Ulid>().is_ok());

        let mut headers = HeaderMap::new();
        headers.insert(REQUEST_ID_HEADER, HeaderValue::from_static("req_abc"));
        assert_eq!(extract_request_id(&headers), "req_abc");
    }
}
