use std::backtrace::Backtrace;
use std::time::Instant;

use axum::extract::rejection::PathRejection;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use chrono::Utc;
use popgate_contracts::Envelope;
use tracing::Instrument;

use crate::flatten::flatten_populations;
use crate::params::{self, RawMetricsForm};

use super::envelope::{EnvelopeResponse, into_response};
use super::form::MetricsForm;
use super::{AppState, extract_request_id};

const LIST_ROUTE: &str = "/populations/metrics/list/{game_id}";
const COMPUTE_ROUTE: &str = "/populations/metrics";

pub(super) async fn list_metrics(
    State(state): State<AppState>,
    game_id: Result<Path<String>, PathRejection>,
    headers: HeaderMap,
) -> EnvelopeResponse {
    let request_started = Instant::now();
    let request_id = extract_request_id(&headers);

    let span = tracing::info_span!(
        "population.list",
        request_id = %request_id,
        game_id = tracing::field::Empty,
        latency_ms = tracing::field::Empty,
        outcome = tracing::field::Empty,
    );

    let game_id = match game_id {
        Ok(Path(game_id)) => game_id,
        Err(rejection) => {
            tracing::warn!(
                parent: &span,
                reason = %rejection,
                "population.path_unreadable"
            );
            return finish(
                &state,
                LIST_ROUTE,
                "GET",
                Envelope::domain_error("Could not read game id from request path"),
                &request_id,
                request_started,
                &span,
            );
        }
    };
    span.record("game_id", game_id.as_str());

    let task = {
        let state = state.clone();
        let game_id = game_id.clone();
        tokio::spawn(
            async move { list_envelope(&state, &game_id).await }.instrument(span.clone()),
        )
    };

    let envelope = match task.await {
        Ok(envelope) => envelope,
        Err(err) => task_failure_envelope(err, "FeatureList", &game_id),
    };

    finish(
        &state,
        LIST_ROUTE,
        "GET",
        envelope,
        &request_id,
        request_started,
        &span,
    )
}

pub(super) async fn compute_metrics(
    State(state): State<AppState>,
    headers: HeaderMap,
    form: MetricsForm,
) -> EnvelopeResponse {
    let request_started = Instant::now();
    let request_id = extract_request_id(&headers);

    for issue in &form.issues {
        tracing::warn!(
            request_id = %request_id,
            reason = %issue,
            "population.form_unreadable"
        );
    }
    let form = form.fields;

    let span = tracing::info_span!(
        "population.compute",
        request_id = %request_id,
        game_id = tracing::field::Empty,
        latency_ms = tracing::field::Empty,
        outcome = tracing::field::Empty,
    );

    let game_id_hint = form.game_id.clone().unwrap_or_default();
    let task = {
        let state = state.clone();
        tokio::spawn(
            async move { compute_envelope(&state, form).await }.instrument(span.clone()),
        )
    };

    let envelope = match task.await {
        Ok(envelope) => envelope,
        Err(err) => task_failure_envelope(err, "Population", &game_id_hint),
    };

    finish(
        &state,
        COMPUTE_ROUTE,
        "POST",
        envelope,
        &request_id,
        request_started,
        &span,
    )
}

async fn list_envelope(state: &AppState, game_id: &str) -> Envelope {
    tracing::info!("population.list_requested");

    match state.catalog.population_features(game_id).await {
        Ok(names) => Envelope::from_payload(
            serde_json::json!(names),
            format!("Got metric list for {}", game_id),
            format!("Did not find any metrics for {}", game_id),
        ),
        Err(err) => {
            tracing::error!(
                game_id = %game_id,
                kind = err.kind(),
                error = %err,
                backtrace = %Backtrace::force_capture(),
                "population.list_failed"
            );
            Envelope::server_error(format!(
                "{} error while processing FeatureList request",
                err.kind()
            ))
        }
    }
}

async fn compute_envelope(state: &AppState, form: RawMetricsForm) -> Envelope {
    let bound = params::bind(&form, Utc::now());
    for warning in &bound.warnings {
        tracing::warn!(warning = %warning, "population.param_defaulted");
    }

    let params = bound.params;
    tracing::Span::current().record("game_id", params.game_id.as_str());

    match state.orchestrator.run(&params).await {
        Ok(report) => {
            let values = flatten_populations(&report.sink);
            tracing::debug!(
                engine_invoked = report.engine_invoked,
                values = values.len(),
                "population.flattened"
            );
            Envelope::from_payload(
                serde_json::Value::Object(values),
                "Generated population features",
                "No valid population features",
            )
        }
        Err(err) => {
            tracing::error!(
                game_id = %params.game_id,
                kind = err.kind(),
                error = %err,
                backtrace = %Backtrace::force_capture(),
                "population.compute_failed"
            );
            Envelope::server_error(format!(
                "{} error while processing Population request",
                err.kind()
            ))
        }
    }
}

/// The spawned handler task panicked or was cancelled.
fn task_failure_envelope(
    err: tokio::task::JoinError,
    request_kind: &str,
    game_id: &str,
) -> Envelope {
    let kind = if err.is_panic() { "Panic" } else { "Cancelled" };
    tracing::error!(
        game_id = %game_id,
        kind = kind,
        error = %err,
        "population.handler_aborted"
    );
    Envelope::server_error(format!(
        "{} error while processing {} request",
        kind, request_kind
    ))
}

fn finish(
    state: &AppState,
    route: &str,
    method: &str,
    envelope: Envelope,
    request_id: &str,
    request_started: Instant,
    span: &tracing::Span,
) -> EnvelopeResponse {
    let latency = request_started.elapsed();
    let status = envelope.status.as_str();
    span.record("latency_ms", latency.as_millis() as u64);
    span.record("outcome", status);

    crate::metrics::observe_envelope(route, status);
    let response = into_response(envelope, state.config.domain_error_status, request_id);
    crate::metrics::observe_http_request(route, method, response.0.as_u16(), latency);

    response
}
