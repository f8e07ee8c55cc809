//! JSON-over-HTTP plumbing shared by the embedding and chat clients.
//!
//! Retry strategy:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use anyhow::{bail, Result};
use std::time::Duration;

/// Build a client with the given request timeout.
pub fn build_client(timeout_secs: u64) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

/// POST `body` to `url` with bearer auth and return the parsed JSON reply.
///
/// `service` labels error messages (e.g. `"OpenAI embeddings"`).
pub async fn post_json(
    client: &reqwest::Client,
    url: &str,
    api_key: Option<&str>,
    body: &serde_json::Value,
    max_retries: u32,
    service: &str,
) -> Result<serde_json::Value> {
    let Some(api_key) = api_key else {
        bail!(
            "{}: {} environment variable not set",
            service,
            crate::config::API_KEY_ENV
        );
    };

    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tracing::warn!(service, attempt, ?delay, "retrying request");
            tokio::time::sleep(delay).await;
        }

        let resp = client
            .post(url)
            .header("Authorization", format!("Bearer {}", api_key.trim()))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await;

        match resp {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return Ok(response.json().await?);
                }

                let body_text = response.text().await.unwrap_or_default();
                if status.as_u16() == 429 || status.is_server_error() {
                    last_err = Some(anyhow::anyhow!("{} error {}: {}", service, status, body_text));
                    continue;
                }

                bail!("{} error {}: {}", service, status, body_text);
            }
            Err(e) => {
                last_err = Some(anyhow::anyhow!("{} request failed: {}", service, e));
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("{} failed after retries", service)))
}

/// Join a base URL and a path without doubling the slash.
pub fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// A local JSON endpoint that records every request body and answers with
/// whatever the responder returns for that attempt number.
#[cfg(test)]
pub(crate) mod stub {
    use axum::{body::Bytes, http::StatusCode, Json, Router};
    use serde_json::Value;
    use std::sync::{Arc, Mutex};

    type Responder = dyn Fn(usize, &Value) -> (u16, Value) + Send + Sync;

    pub(crate) struct StubServer {
        pub url: String,
        pub requests: Arc<Mutex<Vec<Value>>>,
    }

    impl StubServer {
        pub fn hits(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    pub(crate) async fn serve(
        respond: impl Fn(usize, &Value) -> (u16, Value) + Send + Sync + 'static,
    ) -> StubServer {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let respond: Arc<Responder> = Arc::new(respond);
        let seen = requests.clone();

        let app = Router::new().fallback(move |body: Bytes| {
            let seen = seen.clone();
            let respond = respond.clone();
            async move {
                let value: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
                let attempt = {
                    let mut seen = seen.lock().unwrap();
                    seen.push(value.clone());
                    seen.len() - 1
                };
                let (status, reply) = respond(attempt, &value);
                (StatusCode::from_u16(status).unwrap(), Json(reply))
            }
        });

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        StubServer { url, requests }
    }
}
