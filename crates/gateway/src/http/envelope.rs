use axum::Json;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use popgate_contracts::{Envelope, ResponseStatus};

use crate::config::DomainErrorStatus;

use super::REQUEST_ID_HEADER;

pub(super) type EnvelopeResponse = (StatusCode, HeaderMap, Json<Envelope>);

/// SERVER_ERROR is always a 5xx. DOMAIN_ERROR stays 200 unless configured
/// otherwise, so clients distinguish it through the body's `status` field.
pub(super) fn status_code(status: ResponseStatus, domain_error: DomainErrorStatus) -> StatusCode {
    match status {
        ResponseStatus::Success => StatusCode::OK,
        ResponseStatus::DomainError => match domain_error {
            DomainErrorStatus::Ok => StatusCode::OK,
            DomainErrorStatus::BadRequest => StatusCode::BAD_REQUEST,
        },
        ResponseStatus::ServerError => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub(super) fn into_response(
    envelope: Envelope,
    domain_error: DomainErrorStatus,
    request_id: &str,
) -> EnvelopeResponse {
    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(request_id) {
        headers.insert(REQUEST_ID_HEADER, value);
    }

    (
        status_code(envelope.status, domain_error),
        headers,
        Json(envelope),
    )
}
