//! Session state and the ask/result plumbing used by the shell.

use std::path::Path;
use std::sync::Arc;
use tokio::sync::{Mutex, oneshot};

use crate::dispatcher::Dispatcher;
use crate::error::Result;
use crate::params::{EditReport, ModelParams, ParamEdit};
use crate::prompt::{self, compose, today};
use crate::store::ConversationStore;

/// Everything a conversation mutates
#[derive(Debug, Clone)]
pub struct SessionState {
    pub store: ConversationStore,
    pub web_context: String,
    pub active_backend: String,
    pub params: ModelParams,
    /// Last composed prompt, shown and saved on request
    pub last_prompt: String,
}

impl SessionState {
    pub fn new(system_prompt: &str, active_backend: String, params: ModelParams) -> Self {
        Self {
            store: ConversationStore::new(system_prompt),
            web_context: String::new(),
            active_backend,
            params,
            last_prompt: compose(today(), "", ""),
        }
    }
}

/// Shared handle over one session.
///
/// Each ask runs on its own task. Asks take turns on `ask_lock`, so concurrent
/// asks are applied one after another, while the state lock is only held for
/// short reads and writes and menu actions stay available during a request.
#[derive(Clone)]
pub struct ChatSession {
    state: Arc<Mutex<SessionState>>,
    ask_lock: Arc<Mutex<()>>,
    dispatcher: Arc<Dispatcher>,
}

impl ChatSession {
    pub fn new(state: SessionState, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            state: Arc::new(Mutex::new(state)),
            ask_lock: Arc::new(Mutex::new(())),
            dispatcher,
        }
    }

    /// Start an ask; the receiver yields exactly one outcome
    pub fn ask(&self, question: String, search_enabled: bool) -> oneshot::Receiver<Result<String>> {
        let (tx, rx) = oneshot::channel();
        let state = Arc::clone(&self.state);
        let ask_lock = Arc::clone(&self.ask_lock);
        let dispatcher = Arc::clone(&self.dispatcher);

        tokio::spawn(async move {
            let _turn = ask_lock.lock().await;
            let outcome = dispatcher.dispatch(&state, &question, search_enabled).await;
            if tx.send(outcome).is_err() {
                tracing::warn!("Ask result dropped: receiver gone");
            }
        });

        rx
    }

    pub async fn snapshot(&self) -> SessionState {
        self.state.lock().await.clone()
    }

    pub fn backend_ids(&self) -> Vec<String> {
        self.dispatcher
            .registry()
            .ids()
            .map(str::to_string)
            .collect()
    }

    pub async fn active_backend(&self) -> String {
        self.state.lock().await.active_backend.clone()
    }

    /// Switch the active backend; returns the confirmation line
    pub async fn select_backend(&self, id: &str) -> Result<String> {
        self.dispatcher.registry().resolve(id)?;
        self.state.lock().await.active_backend = id.to_string();
        tracing::info!("Switched backend to {}", id);
        Ok(format!("已切换到 {id} 模型"))
    }

    pub async fn show_conversation(&self) -> Result<String> {
        self.state.lock().await.store.to_json()
    }

    pub async fn save_conversation(&self, path: &Path) -> Result<()> {
        self.state.lock().await.store.save(path)
    }

    /// Replace the conversation from `path`; unchanged on error
    pub async fn load_conversation(&self, path: &Path) -> Result<()> {
        self.state.lock().await.store.load(path)
    }

    pub async fn clear_conversation(&self) {
        self.state.lock().await.store.clear();
    }

    pub async fn web_context(&self) -> String {
        self.state.lock().await.web_context.clone()
    }

    pub async fn clear_web_context(&self) {
        self.state.lock().await.web_context.clear();
    }

    pub async fn last_prompt(&self) -> String {
        self.state.lock().await.last_prompt.clone()
    }

    pub async fn save_prompt(&self, path: &Path) -> Result<()> {
        let prompt = self.last_prompt().await;
        prompt::save_template(path, &prompt)
    }

    pub async fn load_prompt(&self, path: &Path) -> Result<()> {
        let prompt = prompt::load_template(path)?;
        self.state.lock().await.last_prompt = prompt;
        Ok(())
    }

    pub async fn params(&self) -> ModelParams {
        self.state.lock().await.params
    }

    pub async fn edit_params(&self, edit: &ParamEdit) -> EditReport {
        self.state.lock().await.params.apply_edit(edit)
    }
}
