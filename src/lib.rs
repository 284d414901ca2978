pub mod config;
pub mod dispatcher;
pub mod error;
pub mod models;
pub mod params;
pub mod prompt;
pub mod registry;
pub mod reply;
pub mod search;
pub mod session;
pub mod speech;
pub mod store;
pub mod transport;

use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::config::Config;
use crate::dispatcher::Dispatcher;
use crate::error::{MultiChatError, Result};
use crate::registry::BackendRegistry;
use crate::search::SerperClient;
use crate::session::{ChatSession, SessionState};
use crate::speech::{CommandPlayer, OpenAiSpeech, Speaker};
use crate::transport::LocalTransport;

/// A wired-up client: one session plus the speaker
pub struct MultiChat {
    pub session: ChatSession,
    pub speaker: Speaker,
}

impl MultiChat {
    /// Build everything from `cfg`. The receiver carries playback warnings.
    pub fn new(cfg: &Config) -> Result<(Self, mpsc::UnboundedReceiver<String>)> {
        let registry = BackendRegistry::from_config(cfg);

        let active = match cfg.default_backend.as_deref() {
            Some(id) if registry.get(id).is_some() => id.to_string(),
            _ => registry
                .first_id()
                .map(str::to_string)
                .ok_or_else(|| MultiChatError::Config("no backends configured".to_string()))?,
        };

        let dispatcher = Arc::new(Dispatcher::new(
            registry,
            Arc::new(LocalTransport::new(cfg.local.endpoint.clone())),
            Arc::new(SerperClient::new(&cfg.search)),
        ));

        let state = SessionState::new(&cfg.system_prompt, active, cfg.params);
        let session = ChatSession::new(state, dispatcher);

        let (speaker, warnings) = Speaker::new(
            Arc::new(OpenAiSpeech::new(&cfg.speech)),
            Arc::new(CommandPlayer::new(&cfg.speech.player)?),
            PathBuf::from(&cfg.speech.output_file),
        );

        Ok((Self { session, speaker }, warnings))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_new_uses_first_backend_by_default() {
        let (chat, _warnings) = MultiChat::new(&Config::default()).unwrap();
        assert_eq!(chat.session.active_backend().await, "local_deepseek-r1:1.5b");
        assert_eq!(chat.session.backend_ids().len(), 4);
        assert_eq!(chat.speaker.output(), std::path::Path::new("output.mp3"));
    }

    #[tokio::test]
    async fn test_new_honours_default_backend() {
        let mut cfg = Config::default();
        cfg.default_backend = Some("api_kimi".to_string());
        let (chat, _warnings) = MultiChat::new(&cfg).unwrap();
        assert_eq!(chat.session.active_backend().await, "api_kimi");

        cfg.default_backend = Some("missing".to_string());
        let (chat, _warnings) = MultiChat::new(&cfg).unwrap();
        assert_eq!(chat.session.active_backend().await, "local_deepseek-r1:1.5b");
    }

    #[test]
    fn test_new_rejects_empty_player() {
        let mut cfg = Config::default();
        cfg.speech.player.clear();
        assert!(matches!(
            MultiChat::new(&cfg),
            Err(MultiChatError::Config(_))
        ));
    }
}
