use async_openai::{
    Client,
    config::OpenAIConfig,
    types::{CreateSpeechRequestArgs, SpeechModel, SpeechResponseFormat, Voice},
};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::{Mutex, mpsc};

use crate::config::SpeechConfig;
use crate::error::{MultiChatError, Result};

/// Text-to-speech into an audio file
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, output: &Path) -> Result<()>;
}

/// Blocking audio playback
pub trait AudioPlayer: Send + Sync {
    fn play(&self, path: &Path) -> Result<()>;
}

/// OpenAI-compatible `/audio/speech` synthesizer
pub struct OpenAiSpeech {
    client: Client<OpenAIConfig>,
    model: SpeechModel,
    voice: Voice,
}

impl OpenAiSpeech {
    pub fn new(cfg: &SpeechConfig) -> Self {
        let api_key = cfg.api_key.clone().unwrap_or_else(|| {
            tracing::warn!("{} not set, speech synthesis will fail", cfg.api_key_env);
            String::new()
        });
        let config = OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(cfg.base_url.clone());
        Self {
            client: Client::with_config(config),
            model: parse_model(&cfg.model),
            voice: parse_voice(&cfg.voice),
        }
    }
}

fn parse_model(name: &str) -> SpeechModel {
    match name {
        "tts-1" => SpeechModel::Tts1,
        "tts-1-hd" => SpeechModel::Tts1Hd,
        other => SpeechModel::Other(other.to_string()),
    }
}

fn parse_voice(name: &str) -> Voice {
    match name.to_lowercase().as_str() {
        "alloy" => Voice::Alloy,
        "echo" => Voice::Echo,
        "fable" => Voice::Fable,
        "onyx" => Voice::Onyx,
        "nova" => Voice::Nova,
        "shimmer" => Voice::Shimmer,
        other => {
            tracing::warn!("Unknown voice '{}', using alloy", other);
            Voice::Alloy
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for OpenAiSpeech {
    async fn synthesize(&self, text: &str, output: &Path) -> Result<()> {
        let request = CreateSpeechRequestArgs::default()
            .input(text)
            .model(self.model.clone())
            .voice(self.voice.clone())
            .response_format(SpeechResponseFormat::Mp3)
            .build()
            .map_err(|e| MultiChatError::Speech(e.to_string()))?;

        let response = self
            .client
            .audio()
            .speech(request)
            .await
            .map_err(|e| MultiChatError::Speech(e.to_string()))?;

        response
            .save(output)
            .await
            .map_err(|e| MultiChatError::Speech(e.to_string()))
    }
}

/// Plays audio by running an external program with the file path appended
pub struct CommandPlayer {
    program: String,
    args: Vec<String>,
}

impl CommandPlayer {
    pub fn new(command: &[String]) -> Result<Self> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| MultiChatError::Config("player command is empty".to_string()))?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }
}

impl AudioPlayer for CommandPlayer {
    fn play(&self, path: &Path) -> Result<()> {
        let status = Command::new(&self.program)
            .args(&self.args)
            .arg(path)
            .status()?;
        if !status.success() {
            return Err(MultiChatError::Speech(format!(
                "{} exited with {}",
                self.program, status
            )));
        }
        Ok(())
    }
}

/// Synthesizes replies into one fixed file and plays them in the background.
///
/// Playback failures are also sent on the warning channel returned by
/// [`Speaker::new`].
pub struct Speaker {
    synth: Arc<dyn SpeechSynthesizer>,
    player: Arc<dyn AudioPlayer>,
    output: PathBuf,
    write_lock: Mutex<()>,
    warnings: mpsc::UnboundedSender<String>,
}

impl Speaker {
    pub fn new(
        synth: Arc<dyn SpeechSynthesizer>,
        player: Arc<dyn AudioPlayer>,
        output: PathBuf,
    ) -> (Self, mpsc::UnboundedReceiver<String>) {
        let (warnings, rx) = mpsc::unbounded_channel();
        (
            Self {
                synth,
                player,
                output,
                write_lock: Mutex::new(()),
                warnings,
            },
            rx,
        )
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Synthesize `text` then start playback on a detached thread.
    ///
    /// Returns the playback thread, or `None` when synthesis failed.
    pub async fn speak(&self, text: &str) -> Option<JoinHandle<()>> {
        {
            let _guard = self.write_lock.lock().await;
            if let Err(e) = self.synth.synthesize(text, &self.output).await {
                tracing::error!("Speech synthesis failed: {}", e);
                return None;
            }
        }
        tracing::info!("Speech saved to {}", self.output.display());

        let player = Arc::clone(&self.player);
        let path = self.output.clone();
        let warnings = self.warnings.clone();
        Some(std::thread::spawn(move || {
            if let Err(e) = player.play(&path) {
                tracing::error!("Playback failed: {}", e);
                let _ = warnings.send(e.to_string());
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FileSynth {
        fail: bool,
    }

    #[async_trait]
    impl SpeechSynthesizer for FileSynth {
        async fn synthesize(&self, text: &str, output: &Path) -> Result<()> {
            if self.fail {
                return Err(MultiChatError::Speech("quota exceeded".to_string()));
            }
            tokio::fs::write(output, text.as_bytes()).await?;
            Ok(())
        }
    }

    struct CountingPlayer {
        plays: AtomicUsize,
        fail: bool,
    }

    impl AudioPlayer for CountingPlayer {
        fn play(&self, path: &Path) -> Result<()> {
            assert!(path.exists());
            self.plays.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(MultiChatError::Speech("no audio device".to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn player(fail: bool) -> Arc<CountingPlayer> {
        Arc::new(CountingPlayer {
            plays: AtomicUsize::new(0),
            fail,
        })
    }

    #[tokio::test]
    async fn test_speak_writes_and_plays() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("output.mp3");
        let p = player(false);
        let (speaker, mut warnings) =
            Speaker::new(Arc::new(FileSynth { fail: false }), p.clone(), out.clone());

        let handle = speaker.speak("first").await.unwrap();
        handle.join().unwrap();
        let handle = speaker.speak("second").await.unwrap();
        handle.join().unwrap();

        assert_eq!(std::fs::read_to_string(&out).unwrap(), "second");
        assert_eq!(p.plays.load(Ordering::SeqCst), 2);
        assert!(warnings.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_playback_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let (speaker, mut warnings) = Speaker::new(
            Arc::new(FileSynth { fail: false }),
            player(true),
            dir.path().join("output.mp3"),
        );

        speaker.speak("hello").await.unwrap().join().unwrap();
        assert_eq!(warnings.try_recv().unwrap(), "Speech error: no audio device");
    }

    #[tokio::test]
    async fn test_synthesis_failure_skips_playback() {
        let dir = tempfile::tempdir().unwrap();
        let p = player(false);
        let (speaker, mut warnings) = Speaker::new(
            Arc::new(FileSynth { fail: true }),
            p.clone(),
            dir.path().join("output.mp3"),
        );

        assert!(speaker.speak("hello").await.is_none());
        assert_eq!(p.plays.load(Ordering::SeqCst), 0);
        assert!(warnings.try_recv().is_err());
    }

    #[test]
    fn test_command_player_rejects_empty_command() {
        assert!(CommandPlayer::new(&[]).is_err());
    }

    #[test]
    fn test_command_player_missing_program() {
        let player = CommandPlayer::new(&["definitely-not-a-player-binary".to_string()]).unwrap();
        assert!(matches!(
            player.play(Path::new("output.mp3")),
            Err(MultiChatError::Io(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_command_player_exit_status() {
        let ok = CommandPlayer::new(&["true".to_string()]).unwrap();
        assert!(ok.play(Path::new("output.mp3")).is_ok());
        let bad = CommandPlayer::new(&["false".to_string()]).unwrap();
        assert!(matches!(
            bad.play(Path::new("output.mp3")),
            Err(MultiChatError::Speech(_))
        ));
    }

    #[test]
    fn test_voice_and_model_names() {
        assert!(matches!(parse_voice("Nova"), Voice::Nova));
        assert!(matches!(parse_voice("zh-CN-XiaoyiNeural"), Voice::Alloy));
        assert!(matches!(parse_model("tts-1-hd"), SpeechModel::Tts1Hd));
        assert!(matches!(parse_model("gpt-4o-mini-tts"), SpeechModel::Other(_)));
    }
}
