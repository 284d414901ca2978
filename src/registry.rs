use std::fmt;
use std::sync::Arc;

use crate::config::Config;
use crate::error::{MultiChatError, Result};
use crate::transport::{ChatTransport, OpenAiCompatTransport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Local,
    Hosted,
}

/// One selectable backend. Built once at startup.
#[derive(Clone)]
pub struct BackendDescriptor {
    pub id: String,
    pub transport: TransportKind,
    /// `None` for the local backend
    pub client: Option<Arc<dyn ChatTransport>>,
    pub model: String,
}

impl fmt::Debug for BackendDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendDescriptor")
            .field("id", &self.id)
            .field("transport", &self.transport)
            .field("model", &self.model)
            .finish()
    }
}

/// Ordered backend lookup by id
#[derive(Debug, Clone, Default)]
pub struct BackendRegistry {
    backends: Vec<BackendDescriptor>,
}

impl BackendRegistry {
    pub fn from_config(cfg: &Config) -> Self {
        let mut registry = Self::default();
        registry.register(BackendDescriptor {
            id: cfg.local.id.clone(),
            transport: TransportKind::Local,
            client: None,
            model: cfg.local.model.clone(),
        });

        for provider in &cfg.providers {
            let api_key = provider.api_key.clone().unwrap_or_else(|| {
                tracing::warn!(
                    "{} not set, requests to {} will fail",
                    provider.api_key_env,
                    provider.id
                );
                String::new()
            });
            registry.register(BackendDescriptor {
                id: provider.id.clone(),
                transport: TransportKind::Hosted,
                client: Some(Arc::new(OpenAiCompatTransport::new(
                    &provider.base_url,
                    api_key,
                ))),
                model: provider.model.clone(),
            });
        }

        tracing::info!("Registered {} backends", registry.backends.len());
        registry
    }

    /// Later registrations with an existing id are ignored
    pub fn register(&mut self, backend: BackendDescriptor) {
        if self.get(&backend.id).is_some() {
            tracing::warn!("Backend {} already registered, ignoring", backend.id);
            return;
        }
        self.backends.push(backend);
    }

    pub fn get(&self, id: &str) -> Option<&BackendDescriptor> {
        self.backends.iter().find(|b| b.id == id)
    }

    pub fn resolve(&self, id: &str) -> Result<&BackendDescriptor> {
        self.get(id)
            .ok_or_else(|| MultiChatError::UnknownBackend(id.to_string()))
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.backends.iter().map(|b| b.id.as_str())
    }

    pub fn first_id(&self) -> Option<&str> {
        self.backends.first().map(|b| b.id.as_str())
    }
}
