use async_trait::async_trait;
use reqwest::Client;

use crate::error::{MultiChatError, Result};
use crate::models::{
    ChatCompletionRequest, ChatCompletionResponse, GenerateRequest, GenerateResponse,
};

/// Hosted chat-completion provider
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn chat(&self, req: &ChatCompletionRequest) -> Result<ChatCompletionResponse>;
}

/// Local inference server
#[async_trait]
pub trait GenerateTransport: Send + Sync {
    async fn generate(&self, req: &GenerateRequest) -> Result<GenerateResponse>;
}

/// OpenAI-compatible `/chat/completions` client. One request, no retries.
pub struct OpenAiCompatTransport {
    client: Client,
    url: String,
    api_key: String,
}

impl OpenAiCompatTransport {
    pub fn new(base_url: &str, api_key: String) -> Self {
        Self {
            client: Client::new(),
            url: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key,
        }
    }
}

#[async_trait]
impl ChatTransport for OpenAiCompatTransport {
    async fn chat(&self, req: &ChatCompletionRequest) -> Result<ChatCompletionResponse> {
        tracing::debug!(
            url = %self.url,
            model = %req.model,
            messages = req.messages.len(),
            "chat request"
        );

        let response = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(req)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(MultiChatError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        response.json().await.map_err(|e| {
            MultiChatError::Internal(format!("Failed to parse chat completion response: {e}"))
        })
    }
}

/// Client for an Ollama-style `/api/generate` endpoint
pub struct LocalTransport {
    client: Client,
    endpoint: String,
}

impl LocalTransport {
    pub fn new(endpoint: String) -> Self {
        Self {
            client: Client::new(),
            endpoint,
        }
    }
}

#[async_trait]
impl GenerateTransport for LocalTransport {
    async fn generate(&self, req: &GenerateRequest) -> Result<GenerateResponse> {
        tracing::debug!(endpoint = %self.endpoint, model = %req.model, "generate request");

        let response = self.client.post(&self.endpoint).json(req).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(MultiChatError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChatMessage;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn chat_request() -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: "deepseek-chat".to_string(),
            messages: vec![
                ChatMessage::system("You are a helpful assistant"),
                ChatMessage::user("What is the capital of France?"),
            ],
            max_tokens: 1024,
            temperature: 0.75,
            top_p: 0.9,
            stream: false,
        }
    }

    #[tokio::test]
    async fn test_chat_sends_bearer_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("Authorization", "Bearer sk-test"))
            .and(body_partial_json(serde_json::json!({
                "model": "deepseek-chat",
                "stream": false,
                "max_tokens": 1024,
                "messages": [
                    {"role": "system", "content": "You are a helpful assistant"},
                    {"role": "user", "content": "What is the capital of France?"}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "chatcmpl-1",
                "choices": [{
                    "index": 0,
                    "message": {"role": "assistant", "content": "Paris"},
                    "finish_reason": "stop"
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let transport =
            OpenAiCompatTransport::new(&format!("{}/v1/", server.uri()), "sk-test".to_string());
        let res = transport.chat(&chat_request()).await.unwrap();
        assert_eq!(res.choices[0].message.content.as_deref(), Some("Paris"));
    }

    #[tokio::test]
    async fn test_chat_error_status_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
            .expect(1)
            .mount(&server)
            .await;

        let transport = OpenAiCompatTransport::new(&server.uri(), "bad".to_string());
        match transport.chat(&chat_request()).await {
            Err(MultiChatError::Upstream { status, body }) => {
                assert_eq!(status, 401);
                assert_eq!(body, "invalid api key");
            }
            other => panic!("expected upstream error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_generate_reads_response_field() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_partial_json(serde_json::json!({
                "model": "deepseek-r1:1.5b",
                "prompt": "hi",
                "stream": false,
                "history": [{"role": "system", "content": "sys"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "model": "deepseek-r1:1.5b",
                "response": "<think>ok</think>hello",
                "done": true
            })))
            .mount(&server)
            .await;

        let transport = LocalTransport::new(format!("{}/api/generate", server.uri()));
        let req = GenerateRequest {
            model: "deepseek-r1:1.5b".to_string(),
            prompt: "hi".to_string(),
            stream: false,
            max_tokens: 1024,
            temperature: 0.75,
            top_p: 0.9,
            history: vec![ChatMessage::system("sys")],
        };
        let res = transport.generate(&req).await.unwrap();
        assert_eq!(res.response, "<think>ok</think>hello");
    }

    #[tokio::test]
    async fn test_generate_missing_field_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"error": "model not found"})),
            )
            .mount(&server)
            .await;

        let transport = LocalTransport::new(format!("{}/api/generate", server.uri()));
        let req = GenerateRequest {
            model: "missing".to_string(),
            prompt: "hi".to_string(),
            stream: false,
            max_tokens: 16,
            temperature: 0.0,
            top_p: 1.0,
            history: vec![],
        };
        assert!(transport.generate(&req).await.is_err());
    }
}
