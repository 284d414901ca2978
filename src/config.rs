use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;

use crate::params::ModelParams;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant";

/// Main configuration structure for multichat
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub local: LocalConfig,
    pub providers: Vec<ProviderConfig>,
    #[serde(default)]
    pub default_backend: Option<String>,
    pub search: SearchConfig,
    pub speech: SpeechConfig,
    pub params: ModelParams,
    pub system_prompt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalConfig {
    /// Backend id shown in the model selector
    pub id: String,
    pub endpoint: String,
    pub model: String,
}

/// One hosted OpenAI-compatible chat-completion provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: String,
    pub base_url: String,
    pub model: String,
    /// Name of the environment variable holding the API key
    pub api_key_env: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    pub endpoint: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub proxy_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechConfig {
    pub base_url: String,
    pub api_key_env: String,
    #[serde(default)]
    pub api_key: Option<String>,
    pub model: String,
    pub voice: String,
    pub output_file: String,
    /// Player program followed by its arguments; the audio path is appended
    pub player: Vec<String>,
}

impl Config {
    /// Load configuration from file with environment variable overrides
    /// ALWAYS returns a valid config - never fails
    pub fn load() -> Self {
        let env_paths = [".env", "../.env"];

        let mut env_loaded = false;
        for path in &env_paths {
            if dotenvy::from_path(path).is_ok() {
                tracing::info!("Loaded .env from: {}", path);
                env_loaded = true;
                break;
            }
        }

        if !env_loaded {
            tracing::warn!("No .env file found - continuing with env vars only");
        }

        let config_path =
            env::var("MULTICHAT_CONFIG_PATH").unwrap_or_else(|_| "multichat.yaml".to_string());

        let mut config = if Path::new(&config_path).exists() {
            match fs::read_to_string(&config_path) {
                Ok(contents) => match serde_yaml::from_str::<Config>(&contents) {
                    Ok(config) => {
                        tracing::info!("Loaded configuration from {}", config_path);
                        config
                    }
                    Err(e) => {
                        tracing::error!(
                            "Failed to parse config file {}: {} - using defaults",
                            config_path,
                            e
                        );
                        Self::default()
                    }
                },
                Err(e) => {
                    tracing::error!(
                        "Failed to read config file {}: {} - using defaults",
                        config_path,
                        e
                    );
                    Self::default()
                }
            }
        } else {
            tracing::info!("Config file not found at {} - using defaults", config_path);
            Self::default()
        };

        config.apply_env_overrides();

        if let Err(e) = config.validate() {
            tracing::warn!("Config validation warnings: {} - continuing anyway", e);
        }

        config
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(endpoint) = env::var("MULTICHAT_LOCAL_ENDPOINT") {
            self.local.endpoint = endpoint;
        }
        if let Ok(model) = env::var("MULTICHAT_LOCAL_MODEL") {
            self.local.model = model;
        }
        if let Ok(backend) = env::var("MULTICHAT_DEFAULT_BACKEND") {
            self.default_backend = Some(backend);
        }

        // Provider keys come from the variable each provider names
        for provider in &mut self.providers {
            if let Ok(key) = env::var(&provider.api_key_env) {
                provider.api_key = Some(key);
            }
        }

        if let Ok(key) = env::var("SERPER_API_KEY") {
            self.search.api_key = Some(key);
        }
        if let Ok(proxy) = env::var("PROXY_URL") {
            if !proxy.is_empty() {
                self.search.proxy_url = Some(proxy);
            }
        }

        if let Ok(key) = env::var(&self.speech.api_key_env) {
            self.speech.api_key = Some(key);
        }
        if let Ok(voice) = env::var("MULTICHAT_SPEECH_VOICE") {
            self.speech.voice = voice;
        }
        if let Ok(output) = env::var("MULTICHAT_SPEECH_OUTPUT") {
            self.speech.output_file = output;
        }
        if let Ok(player) = env::var("MULTICHAT_PLAYER") {
            let parts: Vec<String> = player.split_whitespace().map(str::to_string).collect();
            if !parts.is_empty() {
                self.speech.player = parts;
            }
        }
    }

    /// Validate configuration
    fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        if self.local.endpoint.is_empty() {
            return Err("local endpoint cannot be empty".into());
        }

        let mut ids = vec![self.local.id.as_str()];
        for provider in &self.providers {
            if ids.contains(&provider.id.as_str()) {
                return Err(format!("duplicate backend id '{}'", provider.id).into());
            }
            ids.push(provider.id.as_str());
        }

        if let Some(backend) = &self.default_backend {
            if !ids.contains(&backend.as_str()) {
                return Err(format!("default backend '{backend}' is not configured").into());
            }
        }

        self.params.validate()?;

        let missing: Vec<&str> = self
            .providers
            .iter()
            .filter(|p| p.api_key.as_deref().is_none_or(str::is_empty))
            .map(|p| p.api_key_env.as_str())
            .collect();
        if !missing.is_empty() {
            return Err(format!("missing provider keys: {}", missing.join(", ")).into());
        }

        if self.search.api_key.is_none() {
            return Err("SERPER_API_KEY not set, web search will return no results".into());
        }

        Ok(())
    }
}

fn default_player() -> Vec<String> {
    if cfg!(target_os = "macos") {
        vec!["afplay".to_string()]
    } else {
        ["ffplay", "-nodisp", "-autoexit", "-loglevel", "quiet"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            local: LocalConfig {
                id: "local_deepseek-r1:1.5b".to_string(),
                endpoint: "http://localhost:11434/api/generate".to_string(),
                model: "deepseek-r1:1.5b".to_string(),
            },
            providers: vec![
                ProviderConfig {
                    id: "api_openai".to_string(),
                    base_url: "https://api.feidaapi.com/v1".to_string(),
                    model: "gpt-4o".to_string(),
                    api_key_env: "OPENAI_API_KEY".to_string(),
                    api_key: None,
                },
                ProviderConfig {
                    id: "api_deepseek".to_string(),
                    base_url: "https://api.deepseek.com".to_string(),
                    model: "deepseek-chat".to_string(),
                    api_key_env: "DEEPSEEK_API_KEY".to_string(),
                    api_key: None,
                },
                ProviderConfig {
                    id: "api_kimi".to_string(),
                    base_url: "https://api.moonshot.cn/v1".to_string(),
                    model: "moonshot-v1-8k".to_string(),
                    api_key_env: "KIMI_API_KEY".to_string(),
                    api_key: None,
                },
            ],
            default_backend: None,
            search: SearchConfig {
                endpoint: "https://google.serper.dev/search".to_string(),
                api_key: None,
                proxy_url: None,
            },
            speech: SpeechConfig {
                base_url: "https://api.openai.com/v1".to_string(),
                api_key_env: "OPENAI_API_KEY".to_string(),
                api_key: None,
                model: "tts-1".to_string(),
                voice: "alloy".to_string(),
                output_file: "output.mp3".to_string(),
                player: default_player(),
            },
            params: ModelParams::default(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}
