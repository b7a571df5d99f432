//! HTTP client for the software mention recognition service.

use std::path::Path;
use std::time::Duration;

use reqwest::{multipart, Body, Client, StatusCode};
use serde_json::Value;
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

use crate::error::ServiceError;

const ANNOTATE_PDF_PATH: &str = "/service/annotateSoftwarePDF";
const IS_ALIVE_PATH: &str = "/service/isalive";

/// Retry behavior for overload responses.
///
/// A 503 means the service is saturated, not broken, so the call is retried
/// after `base_delay * 2^attempt`, at most `max_retries` times. Exhausting
/// the budget turns the overload into a terminal failure.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_retries: u32,
}

/// Client for one annotation service instance.
pub struct AnnotationService {
    client: Client,
    base_url: String,
    retry: RetryPolicy,
}

impl AnnotationService {
    /// Build a client with a hard per-request timeout. A call that outlives
    /// the timeout is reported as [`ServiceError::Timeout`] and not retried.
    pub fn new(
        base_url: String,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self, ServiceError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ServiceError::Transport)?;
        Ok(Self {
            client,
            base_url,
            retry,
        })
    }

    /// Liveness probe. Any non-200 answer or transport error counts as down.
    pub async fn is_alive(&self) -> bool {
        let url = format!("{}{}", self.base_url, IS_ALIVE_PATH);
        match self.client.get(&url).send().await {
            Ok(response) => response.status() == StatusCode::OK,
            Err(err) => {
                debug!(error = %err, "liveness probe failed");
                false
            }
        }
    }

    /// Annotate one PDF, retrying overload responses per the retry policy.
    ///
    /// Returns the parsed response body; all failure modes map onto
    /// [`ServiceError`]. Retries perform the full upload again.
    pub async fn annotate_pdf(&self, input: &Path) -> Result<Value, ServiceError> {
        let mut attempt: u32 = 0;
        loop {
            match self.annotate_pdf_once(input).await {
                Err(ServiceError::Overloaded) if attempt < self.retry.max_retries => {
                    let delay = self.retry.base_delay * 2u32.saturating_pow(attempt);
                    attempt += 1;
                    warn!(
                        input = %input.display(),
                        attempt,
                        delay_secs = delay.as_secs(),
                        "service overloaded, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                other => return other,
            }
        }
    }

    async fn annotate_pdf_once(&self, input: &Path) -> Result<Value, ServiceError> {
        let file = tokio::fs::File::open(input).await?;
        let file_name = input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "input.pdf".to_string());
        let part = multipart::Part::stream(Body::wrap_stream(ReaderStream::new(file)))
            .file_name(file_name);
        let form = multipart::Form::new().part("input", part);

        let url = format!("{}{}", self.base_url, ANNOTATE_PDF_PATH);
        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    ServiceError::Timeout
                } else {
                    ServiceError::Transport(err)
                }
            })?;

        let status = response.status().as_u16();
        match status {
            200 => {
                let body = response.text().await.map_err(|err| {
                    if err.is_timeout() {
                        ServiceError::Timeout
                    } else {
                        ServiceError::Transport(err)
                    }
                })?;
                serde_json::from_str(&body)
                    .map_err(|err| ServiceError::MalformedResponse(err.to_string()))
            }
            503 => Err(ServiceError::Overloaded),
            404 => Err(ServiceError::EndpointNotFound),
            s if s >= 500 => Err(ServiceError::Server(s)),
            s if s >= 400 => Err(ServiceError::BadRequest {
                status: s,
                body: response.text().await.unwrap_or_default(),
            }),
            s => Err(ServiceError::UnexpectedStatus(s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn policy() -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::ZERO,
            max_retries: 2,
        }
    }

    async fn service_for(server: &MockServer) -> AnnotationService {
        AnnotationService::new(server.uri(), Duration::from_secs(5), policy()).unwrap()
    }

    fn sample_pdf(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("doc.pdf");
        std::fs::write(&path, b"%PDF-1.4 sample").unwrap();
        path
    }

    #[tokio::test]
    async fn is_alive_requires_200() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/service/isalive"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        assert!(service_for(&server).await.is_alive().await);

        let down = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/service/isalive"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&down)
            .await;
        assert!(!service_for(&down).await.is_alive().await);
    }

    #[tokio::test]
    async fn successful_annotation_returns_body() {
        let dir = tempdir().unwrap();
        let input = sample_pdf(dir.path());

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/service/annotateSoftwarePDF"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"mentions": [{"software-name": "R"}]})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let body = service_for(&server).await.annotate_pdf(&input).await.unwrap();
        assert_eq!(body["mentions"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn overload_is_retried_then_fails() {
        let dir = tempdir().unwrap();
        let input = sample_pdf(dir.path());

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/service/annotateSoftwarePDF"))
            .respond_with(ResponseTemplate::new(503))
            // initial attempt + max_retries
            .expect(3)
            .mount(&server)
            .await;

        let err = service_for(&server).await.annotate_pdf(&input).await.unwrap_err();
        assert!(matches!(err, ServiceError::Overloaded));
    }

    #[tokio::test]
    async fn overload_recovers_when_service_frees_up() {
        let dir = tempdir().unwrap();
        let input = sample_pdf(dir.path());

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/service/annotateSoftwarePDF"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/service/annotateSoftwarePDF"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"mentions": []})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let body = service_for(&server).await.annotate_pdf(&input).await.unwrap();
        assert!(body["mentions"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn error_statuses_map_to_variants() {
        let dir = tempdir().unwrap();
        let input = sample_pdf(dir.path());

        for (status, check) in [
            (404u16, "endpoint"),
            (400, "bad_request"),
            (500, "server"),
            (302, "unexpected"),
        ] {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/service/annotateSoftwarePDF"))
                .respond_with(ResponseTemplate::new(status).set_body_string("details"))
                .mount(&server)
                .await;

            let err = service_for(&server).await.annotate_pdf(&input).await.unwrap_err();
            match check {
                "endpoint" => assert!(matches!(err, ServiceError::EndpointNotFound)),
                "bad_request" => {
                    let ServiceError::BadRequest { status, body } = err else {
                        panic!("expected bad request, got {err}");
                    };
                    assert_eq!(status, 400);
                    assert_eq!(body, "details");
                }
                "server" => assert!(matches!(err, ServiceError::Server(500))),
                _ => assert!(matches!(err, ServiceError::UnexpectedStatus(302))),
            }
        }
    }

    #[tokio::test]
    async fn non_json_success_body_is_malformed() {
        let dir = tempdir().unwrap();
        let input = sample_pdf(dir.path());

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/service/annotateSoftwarePDF"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let err = service_for(&server).await.annotate_pdf(&input).await.unwrap_err();
        assert!(matches!(err, ServiceError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn unreadable_input_is_reported_without_a_request() {
        let server = MockServer::start().await;
        // No mounts: any request would 404 and fail the match below.
        let err = service_for(&server)
            .await
            .annotate_pdf(Path::new("/nonexistent/input.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Input(_)));
    }
}
