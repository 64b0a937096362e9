use std::sync::OnceLock;
use std::time::Duration;

use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};

static REGISTRY: OnceLock<Registry> = OnceLock::new();
static HTTP_REQUESTS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
static HTTP_REQUEST_DURATION_SECONDS: OnceLock<HistogramVec> = OnceLock::new();
static ENVELOPES_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
static ENGINE_CALLS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
static ENGINE_CALL_DURATION_SECONDS: OnceLock<HistogramVec> = OnceLock::new();

fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

fn register_collector<T>(collector: T) -> T
where
    T: prometheus::core::Collector + Clone + 'static,
{
    let _ = registry().register(Box::new(collector.clone()));
    collector
}

fn http_requests_total() -> &'static IntCounterVec {
    HTTP_REQUESTS_TOTAL.get_or_init(|| {
        register_collector(
            IntCounterVec::new(
                Opts::new("popgate_http_requests_total", "Gateway HTTP request count."),
                &["route", "method", "status"],
            )
            .expect("create popgate_http_requests_total"),
        )
    })
}

fn http_request_duration_seconds() -> &'static HistogramVec {
    HTTP_REQUEST_DURATION_SECONDS.get_or_init(|| {
        register_collector(
            HistogramVec::new(
                HistogramOpts::new(
                    "popgate_http_request_duration_seconds",
                    "Gateway HTTP request duration in seconds.",
                )
                .buckets(vec![
                    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
                ]),
                &["route", "method", "outcome"],
            )
            .expect("create popgate_http_request_duration_seconds"),
        )
    })
}

fn envelopes_total() -> &'static IntCounterVec {
    ENVELOPES_TOTAL.get_or_init(|| {
        register_collector(
            IntCounterVec::new(
                Opts::new(
                    "popgate_envelopes_total",
                    "Response envelopes returned, by envelope status.",
                ),
                &["route", "status"],
            )
            .expect("create popgate_envelopes_total"),
        )
    })
}

fn engine_calls_total() -> &'static IntCounterVec {
    ENGINE_CALLS_TOTAL.get_or_init(|| {
        register_collector(
            IntCounterVec::new(
                Opts::new("popgate_engine_calls_total", "Analytics engine invocations."),
                &["outcome"],
            )
            .expect("create popgate_engine_calls_total"),
        )
    })
}

fn engine_call_duration_seconds() -> &'static HistogramVec {
    ENGINE_CALL_DURATION_SECONDS.get_or_init(|| {
        register_collector(
            HistogramVec::new(
                HistogramOpts::new(
                    "popgate_engine_call_duration_seconds",
                    "Analytics engine invocation duration in seconds.",
                )
                .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
                &["outcome"],
            )
            .expect("create popgate_engine_call_duration_seconds"),
        )
    })
}

pub fn observe_http_request(route: &str, method: &str, status: u16, duration: Duration) {
    let status_str = status.to_string();
    http_requests_total()
        .with_label_values(&[route, method, status_str.as_str()])
        .inc();

    let outcome = if (200..400).contains(&status) {
        "success"
    } else {
        "error"
    };
    http_request_duration_seconds()
        .with_label_values(&[route, method, outcome])
        .observe(duration.as_secs_f64());
}

pub fn observe_envelope(route: &str, status: &str) {
    envelopes_total().with_label_values(&[route, status]).inc();
}

pub fn observe_engine_call(outcome: &str, duration: Duration) {
    engine_calls_total().with_label_values(&[outcome]).inc();
    engine_call_duration_seconds()
        .with_label_values(&[outcome])
        .observe(duration.as_secs_f64());
}

pub fn render() -> Result<(Vec<u8>, String), prometheus::Error> {
    let _ = http_requests_total();
    let _ = envelopes_total();
    let _ = engine_calls_total();

    let encoder = TextEncoder::new();
    let metric_families = registry().gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok((buffer, encoder.format_type().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_includes_observed_envelopes() {
        observe_envelope("/populations/metrics", "DOMAIN_ERROR");

        let (body, content_type) = render().expect("render should succeed");
        let text = String::from_utf8(body).expect("exposition is utf-8");

        assert!(content_type.starts_with("text/plain"));
        assert!(text.contains("popgate_envelopes_total"));
        assert!(text.contains("DOMAIN_ERROR"));
    }
}
