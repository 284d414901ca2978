use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{MultiChatError, Result};

pub const INVALID_INTEGER: &str = "请输入有效的整数";
pub const INVALID_UNIT_FLOAT: &str = "请输入0到1之间的有效小数";

/// Sampling parameters sent with every request
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelParams {
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            max_tokens: 1024,
            temperature: 0.75,
            top_p: 0.9,
        }
    }
}

/// Raw user input for an edit; `None` means the field was left alone
#[derive(Debug, Clone, Default)]
pub struct ParamEdit {
    pub max_tokens: Option<String>,
    pub temperature: Option<String>,
    pub top_p: Option<String>,
}

/// Outcome of [`ModelParams::apply_edit`]
#[derive(Debug, Default)]
pub struct EditReport {
    pub updated: Vec<&'static str>,
    pub rejected: Vec<MultiChatError>,
}

impl EditReport {
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }
}

impl ModelParams {
    /// Each field is validated and committed on its own. A bad field is
    /// reported and left unchanged without blocking the others.
    pub fn apply_edit(&mut self, edit: &ParamEdit) -> EditReport {
        let mut report = EditReport::default();

        if let Some(raw) = &edit.max_tokens {
            match parse_max_tokens(raw) {
                Ok(v) => {
                    self.max_tokens = v;
                    report.updated.push("max_tokens");
                }
                Err(e) => report.rejected.push(e),
            }
        }

        if let Some(raw) = &edit.temperature {
            match parse_unit_float("temperature", raw) {
                Ok(v) => {
                    self.temperature = v;
                    report.updated.push("temperature");
                }
                Err(e) => report.rejected.push(e),
            }
        }

        if let Some(raw) = &edit.top_p {
            match parse_unit_float("top_p", raw) {
                Ok(v) => {
                    self.top_p = v;
                    report.updated.push("top_p");
                }
                Err(e) => report.rejected.push(e),
            }
        }

        tracing::info!(
            updated = ?report.updated,
            rejected = report.rejected.len(),
            "Model parameters edited"
        );
        report
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_tokens == 0 {
            return Err(invalid("max_tokens", INVALID_INTEGER));
        }
        for (name, val) in [("temperature", self.temperature), ("top_p", self.top_p)] {
            if !(0.0..=1.0).contains(&val) {
                return Err(invalid(name, INVALID_UNIT_FLOAT));
            }
        }
        Ok(())
    }
}

impl fmt::Display for ModelParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "max_tokens: {}", self.max_tokens)?;
        writeln!(f, "temperature: {}", self.temperature)?;
        write!(f, "top_p: {}", self.top_p)
    }
}

fn invalid(field: &str, message: &str) -> MultiChatError {
    MultiChatError::Validation {
        field: field.to_string(),
        message: message.to_string(),
    }
}

fn parse_max_tokens(raw: &str) -> Result<u32> {
    match raw.trim().parse::<u32>() {
        Ok(v) if v > 0 => Ok(v),
        _ => Err(invalid("max_tokens", INVALID_INTEGER)),
    }
}

fn parse_unit_float(field: &str, raw: &str) -> Result<f32> {
    match raw.trim().parse::<f32>() {
        Ok(v) if (0.0..=1.0).contains(&v) => Ok(v),
        _ => Err(invalid(field, INVALID_UNIT_FLOAT)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bad_max_tokens_rejects_only_that_field() {
        let mut params = ModelParams::default();
        let edit = ParamEdit {
            max_tokens: Some("abc".to_string()),
            temperature: Some("0.3".to_string()),
            top_p: None,
        };
        let report = params.apply_edit(&edit);

        assert_eq!(params.max_tokens, 1024);
        assert!((params.temperature - 0.3).abs() < 1e-6);
        assert!((params.top_p - 0.9).abs() < 1e-6);
        assert_eq!(report.updated, vec!["temperature"]);
        assert_eq!(report.rejected.len(), 1);
        assert!(report.rejected[0].to_string().contains(INVALID_INTEGER));
    }

    #[test]
    fn test_bad_max_tokens_alone_leaves_everything() {
        let mut params = ModelParams::default();
        let report = params.apply_edit(&ParamEdit {
            max_tokens: Some("abc".to_string()),
            ..Default::default()
        });
        assert_eq!(params, ModelParams::default());
        assert!(!report.is_clean());
    }

    #[test]
    fn test_out_of_range_temperature() {
        let mut params = ModelParams::default();
        let report = params.apply_edit(&ParamEdit {
            max_tokens: Some(" 512 ".to_string()),
            temperature: Some("1.5".to_string()),
            top_p: Some("0.5".to_string()),
        });
        assert_eq!(params.max_tokens, 512);
        assert!((params.temperature - 0.75).abs() < 1e-6);
        assert!((params.top_p - 0.5).abs() < 1e-6);
        assert_eq!(report.updated, vec!["max_tokens", "top_p"]);
        match &report.rejected[0] {
            MultiChatError::Validation { field, message } => {
                assert_eq!(field, "temperature");
                assert_eq!(message, INVALID_UNIT_FLOAT);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_zero_max_tokens_rejected() {
        let mut params = ModelParams::default();
        let report = params.apply_edit(&ParamEdit {
            max_tokens: Some("0".to_string()),
            ..Default::default()
        });
        assert_eq!(params.max_tokens, 1024);
        assert_eq!(report.rejected.len(), 1);
    }

    #[test]
    fn test_display_lists_each_field() {
        let text = ModelParams::default().to_string();
        assert_eq!(text, "max_tokens: 1024\ntemperature: 0.75\ntop_p: 0.9");
    }
}
