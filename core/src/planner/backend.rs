//! Chat-model back-ends behind one `call(prompt) -> text` surface, so
//! the planner never depends on a concrete provider (the source
//! implementation's global client singleton is replaced with an
//! explicit, swappable capability).

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;

use crate::error::{EngineError, EngineResult};

#[async_trait]
pub trait LlmBackend: Send + Sync {
    async fn call(&self, prompt: &str) -> EngineResult<String>;
}

/// Cloud provider: one request, one JSON response body.
pub struct CloudBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    timeout: Duration,
}

impl CloudBackend {
    pub fn new(base_url: String, api_key: String, model: String, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            api_key,
            model,
            timeout,
        }
    }
}

#[derive(Deserialize)]
struct CloudResponse {
    text: String,
}

#[async_trait]
impl LlmBackend for CloudBackend {
    async fn call(&self, prompt: &str) -> EngineResult<String> {
        let response = self
            .client
            .post(&self.base_url)
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({"model": self.model, "prompt": prompt}))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|err| EngineError::LlmUnavailable(err.to_string()))?;

        if response.status() == reqwest::StatusCode::REQUEST_TIMEOUT {
            return Err(EngineError::LlmTimeout(self.timeout));
        }

        let body: CloudResponse = response
            .json()
            .await
            .map_err(|err| EngineError::LlmMalformed(err.to_string()))?;
        Ok(body.text)
    }
}

/// Local provider: NDJSON stream of `{response, done, error?}` chunks,
/// accumulated until `done == true`.
pub struct LocalBackend {
    client: reqwest::Client,
    base_url: String,
    model: String,
    timeout: Duration,
}

impl LocalBackend {
    pub fn new(base_url: String, model: String, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            model,
            timeout,
        }
    }
}

#[derive(Deserialize)]
struct NdjsonChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[async_trait]
impl LlmBackend for LocalBackend {
    async fn call(&self, prompt: &str) -> EngineResult<String> {
        let url = format!("{}/generate", self.base_url);
        let fut = async {
            let response = self
                .client
                .post(&url)
                .json(&serde_json::json!({
                    "model": self.model,
                    "prompt": prompt,
                    "stream": true,
                }))
                .send()
                .await
                .map_err(|err| EngineError::LlmUnavailable(err.to_string()))?;

            let mut stream = response.bytes_stream();
            let mut buf = String::new();
            let mut accumulated = String::new();

            while let Some(chunk) = stream.next().await {
                let chunk = chunk.map_err(|err| EngineError::LlmUnavailable(err.to_string()))?;
                buf.push_str(&String::from_utf8_lossy(&chunk));

                while let Some(pos) = buf.find('\n') {
                    let line = buf[..pos].to_string();
                    buf.drain(..=pos);
                    if line.trim().is_empty() {
                        continue;
                    }
                    let parsed: NdjsonChunk = serde_json::from_str(&line)
                        .map_err(|err| EngineError::LlmMalformed(err.to_string()))?;
                    if let Some(error) = parsed.error {
                        return Err(EngineError::LlmMalformed(error));
                    }
                    accumulated.push_str(&parsed.response);
                    if parsed.done {
                        return Ok(accumulated);
                    }
                }
            }
            Ok(accumulated)
        };

        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(EngineError::LlmTimeout(self.timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn cloud_backend_parses_json_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"text": "hello"})))
            .mount(&server)
            .await;

        let backend = CloudBackend::new(
            format!("{}/chat", server.uri()),
            "key".into(),
            "gpt".into(),
            Duration::from_secs(5),
        );
        let text = backend.call("hi").await.expect("call succeeds");
        assert_eq!(text, "hello");
    }

    #[tokio::test]
    async fn local_backend_accumulates_ndjson_until_done() {
        let server = MockServer::start().await;
        let body = "{\"response\":\"hel\",\"done\":false}\n{\"response\":\"lo\",\"done\":true}\n";
        Mock::given(method("POST"))
            .and(path("/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/x-ndjson"))
            .mount(&server)
            .await;

        let backend = LocalBackend::new(server.uri(), "llama".into(), Duration::from_secs(5));
        let text = backend.call("hi").await.expect("call succeeds");
        assert_eq!(text, "hello");
    }

    #[tokio::test]
    async fn local_backend_surfaces_error_chunk() {
        let server = MockServer::start().await;
        let body = "{\"response\":\"\",\"done\":false,\"error\":\"model not loaded\"}\n";
        Mock::given(method("POST"))
            .and(path("/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/x-ndjson"))
            .mount(&server)
            .await;

        let backend = LocalBackend::new(server.uri(), "llama".into(), Duration::from_secs(5));
        let result = backend.call("hi").await;
        assert!(matches!(result, Err(EngineError::LlmMalformed(_))));
    }
}
