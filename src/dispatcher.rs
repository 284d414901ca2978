use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::{MultiChatError, Result};
use crate::models::{ChatCompletionRequest, ChatMessage, GenerateRequest};
use crate::prompt::{compose, today};
use crate::registry::{BackendDescriptor, BackendRegistry, TransportKind};
use crate::search::WebSearch;
use crate::session::SessionState;
use crate::transport::GenerateTransport;

/// Prefix of the reply returned when a hosted call fails
pub const API_ERROR_PREFIX: &str = "API请求失败: ";

/// Routes a question to the active backend and records the exchange
pub struct Dispatcher {
    registry: BackendRegistry,
    local: Arc<dyn GenerateTransport>,
    search: Arc<dyn WebSearch>,
}

impl Dispatcher {
    pub fn new(
        registry: BackendRegistry,
        local: Arc<dyn GenerateTransport>,
        search: Arc<dyn WebSearch>,
    ) -> Self {
        Self {
            registry,
            local,
            search,
        }
    }

    pub fn registry(&self) -> &BackendRegistry {
        &self.registry
    }

    /// Ask the active backend.
    ///
    /// The raw question is always appended first. Local failures are returned
    /// as `Err`; hosted failures become an [`API_ERROR_PREFIX`] reply.
    ///
    /// `state` is locked only while it is read or written, never across a
    /// search or transport call.
    pub async fn dispatch(
        &self,
        state: &Mutex<SessionState>,
        question: &str,
        search_enabled: bool,
    ) -> Result<String> {
        let backend = {
            let mut st = state.lock().await;
            let backend = self.registry.resolve(&st.active_backend)?.clone();
            st.store.append(ChatMessage::user(question));
            backend
        };
        tracing::info!(backend = %backend.id, search_enabled, "Dispatching question");

        if search_enabled {
            let snippets = self.search.web_search(question).await;
            state.lock().await.web_context.push_str(&snippets);
        }

        match backend.transport {
            TransportKind::Local => self.dispatch_local(state, &backend, question).await,
            TransportKind::Hosted => Ok(self.dispatch_hosted(state, &backend, question).await),
        }
    }

    async fn dispatch_local(
        &self,
        state: &Mutex<SessionState>,
        backend: &BackendDescriptor,
        question: &str,
    ) -> Result<String> {
        let request = {
            let mut st = state.lock().await;
            let prompt = record_prompt(&mut st, question);
            GenerateRequest {
                model: backend.model.clone(),
                prompt,
                stream: false,
                max_tokens: st.params.max_tokens,
                temperature: st.params.temperature,
                top_p: st.params.top_p,
                history: st.store.messages().to_vec(),
            }
        };

        let answer = self.local.generate(&request).await?.response;
        state
            .lock()
            .await
            .store
            .append(ChatMessage::assistant(answer.clone()));
        Ok(answer)
    }

    async fn dispatch_hosted(
        &self,
        state: &Mutex<SessionState>,
        backend: &BackendDescriptor,
        question: &str,
    ) -> String {
        let request = {
            let mut st = state.lock().await;
            let prompt = record_prompt(&mut st, question);
            st.store.append(ChatMessage::user(prompt));
            ChatCompletionRequest {
                model: backend.model.clone(),
                messages: st.store.messages().to_vec(),
                max_tokens: st.params.max_tokens,
                temperature: st.params.temperature,
                top_p: st.params.top_p,
                stream: false,
            }
        };

        match self.complete(backend, &request).await {
            Ok(answer) => {
                state
                    .lock()
                    .await
                    .store
                    .append(ChatMessage::assistant(answer.clone()));
                answer
            }
            Err(e) => {
                tracing::error!("Hosted request to {} failed: {}", backend.id, e);
                format!("{API_ERROR_PREFIX}{e}")
            }
        }
    }

    async fn complete(
        &self,
        backend: &BackendDescriptor,
        request: &ChatCompletionRequest,
    ) -> Result<String> {
        let client = backend.client.as_ref().ok_or_else(|| {
            MultiChatError::Internal(format!("backend {} has no client", backend.id))
        })?;

        let response = client.chat(request).await?;
        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| MultiChatError::Internal("API returned empty choices".to_string()))
    }
}

/// Compose the prompt from the current web context and keep it as the last prompt
fn record_prompt(state: &mut SessionState, question: &str) -> String {
    let prompt = compose(today(), &state.web_context, question);
    state.last_prompt = prompt.clone();
    tracing::debug!("Composed prompt:\n{}", prompt);
    prompt
}
