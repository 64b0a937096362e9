use std::convert::Infallible;

use axum::extract::{Form, FromRequest, Multipart, Request};
use axum::http::{HeaderMap, header};

use crate::params::RawMetricsForm;

/// Compute-request form, read pair by pair from an urlencoded or multipart
/// body. Never rejects: whatever cannot be read is listed in `issues` and the
/// affected fields fall back to their defaults during binding.
#[derive(Debug, Default)]
pub(super) struct MetricsForm {
    pub(super) fields: RawMetricsForm,
    pub(super) issues: Vec<String>,
}

impl<S> FromRequest<S> for MetricsForm
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        if is_multipart(req.headers()) {
            Ok(read_multipart(req, state).await)
        } else {
            Ok(read_urlencoded(req, state).await)
        }
    }
}

fn is_multipart(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim_start().to_ascii_lowercase())
        .is_some_and(|v| v.starts_with("multipart/form-data"))
}

async fn read_urlencoded<S>(req: Request, state: &S) -> MetricsForm
where
    S: Send + Sync,
{
    match Form::<Vec<(String, String)>>::from_request(req, state).await {
        Ok(Form(pairs)) => MetricsForm {
            fields: RawMetricsForm::from_pairs(pairs),
            issues: Vec::new(),
        },
        Err(rejection) => MetricsForm {
            fields: RawMetricsForm::default(),
            issues: vec![rejection.to_string()],
        },
    }
}

async fn read_multipart<S>(req: Request, state: &S) -> MetricsForm
where
    S: Send + Sync,
{
    let mut form = MetricsForm::default();

    let mut multipart = match Multipart::from_request(req, state).await {
        Ok(multipart) => multipart,
        Err(rejection) => {
            form.issues.push(rejection.to_string());
            return form;
        }
    };

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => {
                form.issues.push(err.to_string());
                break;
            }
        };

        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        if !RawMetricsForm::is_field(&name) {
            continue;
        }

        match field.text().await {
            Ok(value) => {
                form.fields.set_first(&name, value);
            }
            Err(err) => form.issues.push(format!("{}: {}", name, err)),
        }
    }

    form
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    async fn extract(content_type: &str, body: &'static str) -> MetricsForm {
        let req = Request::builder()
            .method("POST")
            .uri("/populations/metrics")
            .header(header::CONTENT_TYPE, content_type)
            .body(Body::from(body))
            .expect("request should build");

        match MetricsForm::from_request(req, &()).await {
            Ok(form) => form,
            Err(never) => match never {},
        }
    }

    #[tokio::test]
    async fn urlencoded_repeated_keys_keep_other_fields() {
        let form = extract(
            "application/x-www-form-urlencoded",
            "game_id=GAME42&metrics=sessions&metrics=time_played",
        )
        .await;

        assert!(form.issues.is_empty());
        assert_eq!(form.fields.game_id.as_deref(), Some("GAME42"));
        assert_eq!(form.fields.metrics.as_deref(), Some("sessions"));
    }

    #[tokio::test]
    async fn multipart_fields_are_read() {
        let body = "--XYZ\r\n\
Content-Disposition: form-data; name=\"game_id\"\r\n\r\n\
GAME42\r\n\
--XYZ\r\n\
Content-Disposition: form-data; name=\"upload\"; filename=\"a.txt\"\r\n\r\n\
ignored\r\n\
--XYZ\r\n\
Content-Disposition: form-data; name=\"end_datetime\"\r\n\r\n\
2024-04-02T00:00:00Z\r\n\
--XYZ--\r\n";

        let form = extract("multipart/form-data; boundary=XYZ", body).await;

        assert!(form.issues.is_empty(), "issues={:?}", form.issues);
        assert_eq!(form.fields.game_id.as_deref(), Some("GAME42"));
        assert_eq!(
            form.fields.end_datetime.as_deref(),
            Some("2024-04-02T00:00:00Z")
        );
        assert_eq!(form.fields.metrics, None);
    }

    #[tokio::test]
    async fn unreadable_bodies_become_empty_forms_with_an_issue() {
        let form = extract("application/json", r#"{"game_id":"GAME42"}"#).await;
        assert_eq!(form.fields, RawMetricsForm::default());
        assert_eq!(form.issues.len(), 1);

        let form = extract("multipart/form-data", "no boundary").await;
        assert_eq!(form.fields, RawMetricsForm::default());
        assert_eq!(form.issues.len(), 1);
    }
}
