use std::time::Duration;

use async_trait::async_trait;
use oneclick_core::config::ProvisioningConfig;
use tracing::{debug, warn};

use crate::error::Result;
use crate::types::{Job, Outcome};

/// Longest response body kept in a failure detail.
const MAX_DETAIL_BODY_CHARS: usize = 2048;

/// Dispatches one claimed job to the outside world.
///
/// Implementations never touch the store; they only report what happened.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Name for logging.
    fn name(&self) -> &str;

    /// Perform one attempt for `job` and classify the result.
    async fn execute(&self, job: &Job) -> Outcome;
}

/// Why a submission to the provisioning endpoint did not succeed.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("API call timed out after {0:?}")]
    Timeout(Duration),

    #[error("API call failed: {0}")]
    Transport(String),

    #[error("API returned status {status}: {body}")]
    Status { status: u16, body: String },
}

/// POSTs the job payload as JSON to the configured provisioning endpoint.
pub struct HttpExecutor {
    client: reqwest::Client,
    api_url: String,
    timeout: Duration,
    /// Status codes classified as permanent rejections.
    permanent_statuses: Vec<u16>,
}

impl HttpExecutor {
    pub fn new(api_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            api_url: api_url.into(),
            timeout,
            permanent_statuses: Vec::new(),
        })
    }

    pub fn from_config(cfg: &ProvisioningConfig) -> Result<Self> {
        Ok(Self::new(cfg.api_url.clone(), cfg.timeout())?
            .with_permanent_statuses(cfg.permanent_statuses.clone()))
    }

    pub fn with_permanent_statuses(mut self, statuses: Vec<u16>) -> Self {
        self.permanent_statuses = statuses;
        self
    }

    /// Send the payload once. `Ok` only for a 2xx response.
    pub async fn submit(&self, job: &Job) -> std::result::Result<(), ExecutionError> {
        let resp = self
            .client
            .post(&self.api_url)
            // lets the receiver drop a replayed attempt
            .header("idempotency-key", job.id.to_string())
            .json(&job.payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ExecutionError::Timeout(self.timeout)
                } else {
                    ExecutionError::Transport(e.to_string())
                }
            })?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }

        let body = resp.text().await.unwrap_or_default();
        Err(ExecutionError::Status {
            status: status.as_u16(),
            body: truncate(body.trim(), MAX_DETAIL_BODY_CHARS),
        })
    }

    fn classify(&self, err: ExecutionError) -> Outcome {
        let permanent = matches!(
            err,
            ExecutionError::Status { status, .. } if self.permanent_statuses.contains(&status)
        );
        if permanent {
            Outcome::PermanentFailure(err.to_string())
        } else {
            Outcome::TransientFailure(err.to_string())
        }
    }
}

#[async_trait]
impl Executor for HttpExecutor {
    fn name(&self) -> &str {
        "http"
    }

    async fn execute(&self, job: &Job) -> Outcome {
        debug!(job_id = %job.id, url = %self.api_url, "submitting provisioning request");
        match self.submit(job).await {
            Ok(()) => Outcome::Success,
            Err(e) => {
                warn!(job_id = %job.id, error = %e, "provisioning request failed");
                self.classify(e)
            }
        }
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &s[..idx]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use axum::{extract::State, http::HeaderMap, http::StatusCode, routing::post, Json, Router};
    use chrono::Utc;
    use serde_json::{json, Value};
    use uuid::Uuid;

    use crate::types::JobStatus;

    type Seen = Arc<Mutex<Vec<(Option<String>, Value)>>>;

    async fn record(
        State(seen): State<Seen>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> StatusCode {
        let key = headers
            .get("idempotency-key")
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        seen.lock().unwrap().push((key, body));
        StatusCode::OK
    }

    async fn crash() -> (StatusCode, &'static str) {
        (StatusCode::INTERNAL_SERVER_ERROR, "workflow crashed")
    }

    async fn reject() -> (StatusCode, Json<Value>) {
        (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({"error": "workEmail already exists"})),
        )
    }

    async fn stall() -> StatusCode {
        tokio::time::sleep(Duration::from_secs(5)).await;
        StatusCode::OK
    }

    /// Serve a stub provisioning endpoint on an ephemeral port.
    async fn stub_endpoint(seen: Seen) -> String {
        let app = Router::new()
            .route("/ok", post(record))
            .route("/crash", post(crash))
            .route("/reject", post(reject))
            .route("/stall", post(stall))
            .with_state(seen);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn job() -> Job {
        let now = Utc::now();
        Job {
            id: Uuid::new_v4(),
            payload: json!({
                "employee": {"fullName": "Grace Hopper", "workEmail": "grace@example.com"},
                "applications": {"google": true, "microsoft": false}
            }),
            schedule_time: now,
            status: JobStatus::Executing,
            tags: vec![],
            created_at: now,
            updated_at: now,
            executed_at: None,
            error_message: None,
            retry_count: 0,
        }
    }

    #[tokio::test]
    async fn success_forwards_payload_verbatim() {
        let seen: Seen = Arc::default();
        let base = stub_endpoint(seen.clone()).await;
        let exec = HttpExecutor::new(format!("{base}/ok"), Duration::from_secs(5)).unwrap();
        let job = job();

        assert_eq!(exec.execute(&job).await, Outcome::Success);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0.as_deref(), Some(job.id.to_string().as_str()));
        assert_eq!(seen[0].1, job.payload);
    }

    #[tokio::test]
    async fn server_error_is_transient_with_status_and_body() {
        let base = stub_endpoint(Arc::default()).await;
        let exec = HttpExecutor::new(format!("{base}/crash"), Duration::from_secs(5)).unwrap();

        match exec.execute(&job()).await {
            Outcome::TransientFailure(detail) => {
                assert_eq!(detail, "API returned status 500: workflow crashed");
            }
            other => panic!("expected transient failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn configured_status_is_permanent() {
        let base = stub_endpoint(Arc::default()).await;
        let exec = HttpExecutor::new(format!("{base}/reject"), Duration::from_secs(5))
            .unwrap()
            .with_permanent_statuses(vec![422]);

        match exec.execute(&job()).await {
            Outcome::PermanentFailure(detail) => {
                assert!(detail.starts_with("API returned status 422"));
                assert!(detail.contains("workEmail already exists"));
            }
            other => panic!("expected permanent failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn rejection_without_configuration_stays_transient() {
        let base = stub_endpoint(Arc::default()).await;
        let exec = HttpExecutor::new(format!("{base}/reject"), Duration::from_secs(5)).unwrap();
        assert!(matches!(
            exec.execute(&job()).await,
            Outcome::TransientFailure(_)
        ));
    }

    #[tokio::test]
    async fn slow_endpoint_times_out_as_transient() {
        let base = stub_endpoint(Arc::default()).await;
        let exec = HttpExecutor::new(format!("{base}/stall"), Duration::from_millis(200)).unwrap();

        match exec.execute(&job()).await {
            Outcome::TransientFailure(detail) => assert!(detail.contains("timed out"), "{detail}"),
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_transient() {
        // Grab a free port, then close it.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let exec = HttpExecutor::new(format!("http://{addr}/gone"), Duration::from_secs(2)).unwrap();
        match exec.execute(&job()).await {
            Outcome::TransientFailure(detail) => assert!(detail.starts_with("API call failed")),
            other => panic!("expected transport failure, got {other:?}"),
        }
    }

    #[test]
    fn long_bodies_are_truncated_on_char_boundaries() {
        let s = "é".repeat(10);
        assert_eq!(truncate(&s, 3), "ééé…");
        assert_eq!(truncate("short", 10), "short");
    }
}
