//! HTTP client for the QnA service.
//!
//! Answers come from `GET /api/qna/v1/systems/{id}/answer` with probe data
//! enabled, so the chunks fed to the LLM can be scored as retrieved context.

use super::{PipelineClient, PipelineResponse};
use crate::config::{PipelineSpec, ServiceConfig};
use crate::error::{BenchError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

/// Probe step whose input holds the chunks handed to the LLM.
const MERGE_STEP: &str = "MERGE_NEIGHBOURING_CONTEXT";

/// Answer payload, keeping only what we score.
#[derive(Debug, Deserialize)]
struct AnswerBody {
    answer: Option<String>,
    #[serde(default)]
    context: Vec<ContextEntry>,
    #[serde(default)]
    probe: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ContextEntry {
    #[serde(default)]
    data: Option<String>,
}

/// QnA service client.
#[derive(Clone)]
pub struct QnaClient {
    client: Client,
    config: ServiceConfig,
}

impl QnaClient {
    /// Create a new client. The service URL and token must already be validated.
    pub fn new(config: ServiceConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| BenchError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    fn base(&self) -> &str {
        self.config.service_url.trim_end_matches('/')
    }

    fn systems_url(&self) -> String {
        format!("{}/api/qna/v1/systems", self.base())
    }

    fn system_url(&self, system_id: &str) -> String {
        format!("{}/{}", self.systems_url(), system_id)
    }

    fn answer_url(&self, system_id: &str) -> String {
        format!("{}/answer", self.system_url(system_id))
    }

    fn authorization(&self) -> String {
        format!("{} {}", self.config.auth_scheme, self.config.api_token)
    }

    /// GET a URL and return the parsed JSON body.
    async fn get_json(&self, url: &str, query: &[(&str, &str)]) -> Result<Value> {
        let response = self
            .client
            .get(url)
            .header("Authorization", self.authorization())
            .header("Content-Type", "application/json")
            .query(query)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(BenchError::Transport(format!(
                "Request to {} failed ({}): {}",
                url, status, body
            )));
        }

        serde_json::from_str(&body)
            .map_err(|e| BenchError::MalformedResponse(format!("Body is not JSON: {}", e)))
    }

    /// All QnA systems configured on the service.
    pub async fn list_systems(&self) -> Result<Value> {
        self.get_json(&self.systems_url(), &[]).await
    }

    /// Details of one QnA system.
    pub async fn system_details(&self, system_id: &str) -> Result<Value> {
        self.get_json(&self.system_url(system_id), &[]).await
    }

    /// LLM providers available to one QnA system.
    pub async fn llm_providers(&self, system_id: &str) -> Result<Value> {
        let url = format!("{}/llm-providers", self.system_url(system_id));
        self.get_json(&url, &[]).await
    }

    async fn fetch_answer(&self, pipeline: &PipelineSpec, question: &str) -> Result<Value> {
        self.get_json(
            &self.answer_url(&pipeline.pipeline_id),
            &[
                ("questionText", question),
                ("llmProviderId", pipeline.llm_provider_id.as_str()),
                ("properties", "include_probe=true"),
            ],
        )
        .await
    }

    /// Turn an answer payload into a [`PipelineResponse`].
    ///
    /// Retrieved context is taken from the merge step of the probe when
    /// present, otherwise from the `context` list.
    pub fn parse_answer(value: Value) -> Result<PipelineResponse> {
        let chunks = value
            .get("probe")
            .and_then(|probe| find_step_input(probe, MERGE_STEP))
            .map(|input| {
                input
                    .iter()
                    .filter_map(|chunk| chunk.get("Content").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        let body: AnswerBody = serde_json::from_value(value)
            .map_err(|e| BenchError::MalformedResponse(e.to_string()))?;

        let answer = body
            .answer
            .ok_or_else(|| BenchError::MalformedResponse("missing `answer` field".to_string()))?;

        let retrieved_context = if chunks.is_empty() {
            if body.probe.is_some() {
                debug!("probe has no merge step input, using context list");
            }
            body.context.into_iter().filter_map(|c| c.data).collect()
        } else {
            chunks
        };

        Ok(PipelineResponse {
            answer,
            retrieved_context,
        })
    }
}

/// Find the object holding `marker` as a value and return its `data.Input` list.
fn find_step_input<'a>(value: &'a Value, marker: &str) -> Option<&'a Vec<Value>> {
    match value {
        Value::Object(map) => {
            if map.values().any(|v| v.as_str() == Some(marker)) {
                if let Some(input) = map
                    .get("data")
                    .and_then(|d| d.get("Input"))
                    .and_then(Value::as_array)
                {
                    return Some(input);
                }
            }
            map.values().find_map(|v| find_step_input(v, marker))
        }
        Value::Array(items) => items.iter().find_map(|v| find_step_input(v, marker)),
        _ => None,
    }
}

#[async_trait]
impl PipelineClient for QnaClient {
    async fn ask(&self, pipeline: &PipelineSpec, question: &str) -> Result<PipelineResponse> {
        let mut attempt = 0;
        loop {
            match self.fetch_answer(pipeline, question).await {
                Ok(value) => return Self::parse_answer(value),
                Err(BenchError::Transport(msg)) if attempt < self.config.max_retries => {
                    attempt += 1;
                    warn!(
                        pipeline = %pipeline.name,
                        attempt,
                        max_retries = self.config.max_retries,
                        error = %msg,
                        "answer request failed, retrying"
                    );
                    tokio::time::sleep(self.config.retry_delay()).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one canned `(status, body)` per connection, repeating the last
    /// one. Returns the base URL and the request counter.
    async fn serve(replies: Vec<(u16, &'static str)>) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();

        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let n = counter.fetch_add(1, Ordering::SeqCst);
                let (status, body) = replies[n.min(replies.len() - 1)];

                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(read) => request.extend_from_slice(&buf[..read]),
                    }
                }

                let response = format!(
                    "HTTP/1.1 {} Status\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        (url, hits)
    }

    fn retrying_client(url: &str, max_retries: u32) -> QnaClient {
        QnaClient::new(ServiceConfig {
            service_url: url.to_string(),
            api_token: "token".to_string(),
            max_retries,
            retry_delay_secs: 0,
            ..Default::default()
        })
        .unwrap()
    }

    fn pipeline() -> PipelineSpec {
        PipelineSpec::new("legal", "sys-1", "provider-1")
    }

    fn client(url: &str) -> QnaClient {
        QnaClient::new(ServiceConfig {
            service_url: url.to_string(),
            api_token: "token".to_string(),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_endpoint_construction() {
        let c = client("https://qna.example.com/");
        assert_eq!(c.systems_url(), "https://qna.example.com/api/qna/v1/systems");
        assert_eq!(
            c.answer_url("abc"),
            "https://qna.example.com/api/qna/v1/systems/abc/answer"
        );
        assert_eq!(c.authorization(), "SSWS token");

        // Without trailing slash
        let c2 = client("https://qna.example.com");
        assert_eq!(c2.system_url("abc"), "https://qna.example.com/api/qna/v1/systems/abc");
    }

    #[test]
    fn test_parse_answer_prefers_merge_step_chunks() {
        let body = json!({
            "answer": "Revenue was $4.2B.",
            "context": [{"data": "from context list"}],
            "probe": {
                "steps": [
                    {"name": "RETRIEVE", "data": {"Input": [{"Content": "wrong"}]}},
                    {
                        "name": "MERGE_NEIGHBOURING_CONTEXT",
                        "data": {"Input": [{"Content": "chunk one"}, {"Content": "chunk two"}]}
                    }
                ]
            }
        });

        let response = QnaClient::parse_answer(body).unwrap();
        assert_eq!(response.answer, "Revenue was $4.2B.");
        assert_eq!(response.retrieved_context, vec!["chunk one", "chunk two"]);
    }

    #[test]
    fn test_parse_answer_falls_back_to_context_list() {
        let body = json!({
            "answer": "Yes.",
            "context": [{"data": "passage a"}, {"other": 1}, {"data": "passage b"}]
        });
        let response = QnaClient::parse_answer(body).unwrap();
        assert_eq!(response.retrieved_context, vec!["passage a", "passage b"]);
    }

    #[test]
    fn test_parse_answer_without_answer_is_malformed() {
        let err = QnaClient::parse_answer(json!({"context": []})).unwrap_err();
        assert!(matches!(err, BenchError::MalformedResponse(_)));

        let err = QnaClient::parse_answer(json!({"answer": 42})).unwrap_err();
        assert!(matches!(err, BenchError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn test_transport_error_is_retried() {
        let (url, hits) = serve(vec![
            (503, r#"{"error": "busy"}"#),
            (200, r#"{"answer": "No.", "context": [{"data": "passage"}]}"#),
        ])
        .await;

        let response = retrying_client(&url, 3)
            .ask(&pipeline(), "Is it sold?")
            .await
            .unwrap();
        assert_eq!(response.answer, "No.");
        assert_eq!(response.retrieved_context, vec!["passage"]);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_malformed_response_is_not_retried() {
        let (url, hits) = serve(vec![(200, r#"{"context": []}"#)]).await;

        let err = retrying_client(&url, 3)
            .ask(&pipeline(), "Is it sold?")
            .await
            .unwrap_err();
        assert!(matches!(err, BenchError::MalformedResponse(_)));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_error_status_gives_up_after_max_retries() {
        let (url, hits) = serve(vec![(500, "oops")]).await;

        let err = retrying_client(&url, 2)
            .ask(&pipeline(), "Is it sold?")
            .await
            .unwrap_err();
        match err {
            BenchError::Transport(msg) => assert!(msg.contains("500")),
            other => panic!("expected Transport, got {:?}", other),
        }
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }
}
