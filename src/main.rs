use anyhow::Result;
use colored::Colorize;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinSet;
use tracing_subscriber::EnvFilter;

use multichat::MultiChat;
use multichat::config::Config;
use multichat::params::ParamEdit;
use multichat::reply;
use multichat::session::ChatSession;
use multichat::speech::Speaker;

const HELP: &str = "\
Commands:
  /models               list backends
  /model <id>           switch backend
  /search               toggle web search
  /think                toggle showing reasoning
  /speak                toggle speaking replies
  /params               show model parameters
  /set key=value ...    edit max_tokens, temperature, top_p
  /show                 show the conversation
  /save <file>          save the conversation
  /load <file>          load a conversation
  /clear                clear the conversation
  /web                  show accumulated search results
  /webclear             clear search results
  /prompt               show the last prompt
  /saveprompt <file>    save the last prompt
  /loadprompt <file>    load a saved prompt
  /quit                 exit
Anything else is sent to the active backend.";

#[derive(Default)]
struct Toggles {
    search: bool,
    think: bool,
    speak: bool,
}

/// Asks still waiting for a reply, tagged with the backend that was active
type InFlight = JoinSet<(String, Option<multichat::error::Result<String>>)>;

struct Shell {
    session: ChatSession,
    speaker: Arc<Speaker>,
    toggles: Toggles,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so they do not interleave with replies
    tracing_subscriber::fmt()
        .with_target(false)
        .with_ansi(false)
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let config = Config::load();
    let (chat, mut warnings) = MultiChat::new(&config)?;
    let mut shell = Shell {
        session: chat.session,
        speaker: Arc::new(chat.speaker),
        toggles: Toggles::default(),
    };
    let mut in_flight = InFlight::new();

    println!("{}", "MultiAI Assistant".bold());
    println!(
        "Active model: {}  (/help for commands)",
        shell.session.active_backend().await
    );
    show_prompt()?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                if !shell.handle_line(line.trim(), &mut in_flight).await {
                    break;
                }
                show_prompt()?;
            }
            Some(joined) = in_flight.join_next() => {
                match joined {
                    Ok((model, outcome)) => shell.show_reply(&model, outcome),
                    Err(e) => println!("{}", format!("request task failed: {e}").red()),
                }
                show_prompt()?;
            }
            Some(warning) = warnings.recv() => {
                println!("{}", format!("播放错误: 无法播放语音：{warning}").yellow());
                show_prompt()?;
            }
        }
    }

    Ok(())
}

fn show_prompt() -> Result<()> {
    print!("{} ", ">".bold());
    std::io::stdout().flush()?;
    Ok(())
}

impl Shell {
    /// Handle one input line; `false` ends the shell
    async fn handle_line(&mut self, line: &str, in_flight: &mut InFlight) -> bool {
        if line.is_empty() {
            return true;
        }

        if !line.starts_with('/') {
            let model = self.session.active_backend().await;
            let rx = self.session.ask(line.to_string(), self.toggles.search);
            in_flight.spawn(async move { (model, rx.await.ok()) });
            return true;
        }

        let session = &self.session;
        let (cmd, arg) = line.split_once(' ').unwrap_or((line, ""));
        let arg = arg.trim();
        match cmd {
            "/help" => println!("{HELP}"),
            "/quit" | "/exit" => return false,
            "/models" => {
                let active = session.active_backend().await;
                for id in session.backend_ids() {
                    let marker = if id == active { "*" } else { " " };
                    println!("{marker} {id}");
                }
            }
            "/model" => match session.select_backend(arg).await {
                Ok(msg) => println!("{msg}"),
                Err(e) => println!("{}", e.to_string().red()),
            },
            "/search" => {
                self.toggles.search = !self.toggles.search;
                println!("web search: {}", on_off(self.toggles.search));
            }
            "/think" => {
                self.toggles.think = !self.toggles.think;
                println!("show reasoning: {}", on_off(self.toggles.think));
            }
            "/speak" => {
                self.toggles.speak = !self.toggles.speak;
                println!("speak replies: {}", on_off(self.toggles.speak));
            }
            "/params" => println!("当前模型参数:\n{}", session.params().await),
            "/set" => {
                let edit = parse_edit(arg);
                let edited = session.edit_params(&edit).await;
                for e in &edited.rejected {
                    println!("{}", format!("输入无效: {e}").yellow());
                }
                if !edited.updated.is_empty() {
                    println!("模型参数已更新: {}", edited.updated.join(", "));
                }
            }
            "/show" => match session.show_conversation().await {
                Ok(json) => println!("显示对话\n{json}"),
                Err(e) => println!("{}", e.to_string().red()),
            },
            "/save" => {
                if let Some(p) = require_path(arg) {
                    report(session.save_conversation(p).await, "对话已成功保存！");
                }
            }
            "/load" => {
                if let Some(p) = require_path(arg) {
                    report(session.load_conversation(p).await, "成功加载对话！");
                }
            }
            "/clear" => {
                session.clear_conversation().await;
                println!("对话已清除！");
            }
            "/web" => println!("以下是搜索结果\n{}", session.web_context().await),
            "/webclear" => {
                session.clear_web_context().await;
                println!("搜索结果已清空");
            }
            "/prompt" => println!("显示提示词\n{}", session.last_prompt().await),
            "/saveprompt" => {
                if let Some(p) = require_path(arg) {
                    report(session.save_prompt(p).await, "提示词语已成功保存！");
                }
            }
            "/loadprompt" => {
                if let Some(p) = require_path(arg) {
                    report(session.load_prompt(p).await, "成功加载提示文件！");
                }
            }
            other => println!("unknown command {other}, try /help"),
        }
        true
    }

    fn show_reply(&self, model: &str, outcome: Option<multichat::error::Result<String>>) {
        let raw = match outcome {
            Some(Ok(raw)) => raw,
            Some(Err(e)) => {
                println!("{}", format!("{model} request failed: {e}").red());
                return;
            }
            None => {
                println!("{}", "request ended without a result".red());
                return;
            }
        };

        let parts = reply::split(&raw);
        if self.toggles.think && !parts.reasoning.is_empty() {
            let reasoning = parts.reasoning.dimmed().to_string();
            print_block(&format!("{model} THINK"), &reasoning);
        }
        if parts.answer.is_empty() {
            return;
        }
        let answer = parts.answer.green().to_string();
        print_block(&format!("{model} REPLY"), &answer);

        if self.toggles.speak {
            // Synthesis runs in the background; playback warnings arrive on the channel
            let speaker = Arc::clone(&self.speaker);
            tokio::spawn(async move {
                let _ = speaker.speak(&parts.answer).await;
            });
        }
    }
}

fn on_off(flag: bool) -> &'static str {
    if flag { "on" } else { "off" }
}

fn print_block(title: &str, body: &str) {
    println!("{}", title.bold());
    println!("{body}");
    println!();
}

fn parse_edit(arg: &str) -> ParamEdit {
    let mut edit = ParamEdit::default();
    for pair in arg.split_whitespace() {
        match pair.split_once('=') {
            Some(("max_tokens", v)) => edit.max_tokens = Some(v.to_string()),
            Some(("temperature", v)) => edit.temperature = Some(v.to_string()),
            Some(("top_p", v)) => edit.top_p = Some(v.to_string()),
            _ => println!("{}", format!("ignoring '{pair}'").yellow()),
        }
    }
    edit
}

fn require_path(arg: &str) -> Option<&Path> {
    if arg.is_empty() {
        println!("{}", "a file path is required".yellow());
        return None;
    }
    Some(Path::new(arg))
}

fn report(result: multichat::error::Result<()>, ok_msg: &str) {
    match result {
        Ok(()) => println!("{ok_msg}"),
        Err(e) => println!("{}", format!("操作失败: {e}").red()),
    }
}
