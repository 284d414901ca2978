//! Prompt composition and the prompt-template file.

use chrono::NaiveDate;
use serde::Serialize;
use std::fs;
use std::path::Path;

use crate::error::{MultiChatError, Result};
use crate::models::PromptTemplateRecord;

const WEB_BLOCK_HEADER: &str = "以下是来自网络的实时信息片段(可能不完整):";

/// Build the instruction text sent to a backend.
///
/// The web block is only emitted when `web_context` is non-empty; the context
/// is inserted verbatim and never truncated.
pub fn compose(date: NaiveDate, web_context: &str, question: &str) -> String {
    let mut prompt = format!(
        "\n[系统指令]\n你是一个AI助手, 当前日期为{}。\n",
        date.format("%Y-%m-%d")
    );
    if !web_context.is_empty() {
        prompt.push_str(WEB_BLOCK_HEADER);
        prompt.push_str("\n\n");
        prompt.push_str(web_context);
        prompt.push('\n');
    }
    prompt.push_str("\n[用户问题]\n");
    prompt.push_str(question);
    prompt.push('\n');
    prompt
}

/// Today's date on the local wall clock
pub fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

/// Serialize with 4-space indentation, keeping non-ASCII text readable
pub(crate) fn to_pretty_json<T: Serialize>(value: &T) -> Result<String> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut ser)?;
    String::from_utf8(buf).map_err(|e| MultiChatError::Internal(e.to_string()))
}

/// Snapshot `prompt` into a single-element list on disk
pub fn save_template(path: &Path, prompt: &str) -> Result<()> {
    let records = vec![PromptTemplateRecord {
        prompt_template: prompt.to_string(),
    }];
    fs::write(path, to_pretty_json(&records)?)?;
    tracing::info!("Saved prompt template to {}", path.display());
    Ok(())
}

/// Read back a file written by [`save_template`]
pub fn load_template(path: &Path) -> Result<String> {
    let contents = fs::read_to_string(path)?;
    let value: serde_json::Value = serde_json::from_str(&contents)?;
    if !value.is_array() {
        return Err(MultiChatError::Format(
            "prompt file must contain a JSON array".to_string(),
        ));
    }
    let records: Vec<PromptTemplateRecord> = serde_json::from_value(value)
        .map_err(|e| MultiChatError::Format(format!("invalid prompt record: {e}")))?;
    records
        .into_iter()
        .next()
        .map(|r| r.prompt_template)
        .ok_or_else(|| MultiChatError::Format("prompt file is empty".to_string()))
}
