//! Per-format payload shape checks.

use rosetta_core::{Format, Result, TranslateError};
use serde_json::{Map, Value};

/// Collected validation outcome. Shape problems land in `errors`
/// (type mismatches, missing required fields); recoverable oddities in
/// `warnings` (empty collections, missing-but-defaultable fields).
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct Validation {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl Validation {
    fn finish(mut self) -> Self {
        self.valid = self.errors.is_empty();
        self
    }

    /// Collapse a failed validation into a single aggregated error.
    pub fn into_result(self, format: &Format) -> Result<Validation> {
        if self.valid {
            Ok(self)
        } else {
            Err(TranslateError::InvalidSchema {
                format: format.to_string(),
                fields: self.errors,
            })
        }
    }
}

/// Expected JSON type for a field check.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Expect {
    Array,
    String,
    Number,
    Boolean,
    /// Any JSON value; presence is all that matters.
    Any,
}

impl Expect {
    fn matches(&self, v: &Value) -> bool {
        match self {
            Self::Array => v.is_array(),
            Self::String => v.is_string(),
            Self::Number => v.is_number(),
            Self::Boolean => v.is_boolean(),
            Self::Any => true,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Array => "array",
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Any => "json",
        }
    }
}

/// Check that `payload` meets the shape required by `format`.
///
/// Empty input and malformed JSON are hard errors; an unknown format is an
/// `InvalidSchema` error. Shape findings are collected into the returned
/// [`Validation`].
pub fn validate_payload(format: &Format, payload: &[u8]) -> Result<Validation> {
    if payload.is_empty() {
        return Err(TranslateError::EmptyPayload);
    }
    let value: Value = serde_json::from_slice(payload)?;
    let Some(obj) = value.as_object() else {
        return Err(TranslateError::InvalidSchema {
            format: format.to_string(),
            fields: vec!["root: expected a JSON object".to_string()],
        });
    };

    let mut v = Validation::default();
    match format {
        Format::Gemini | Format::GeminiCli => validate_gemini(obj, &mut v, false),
        Format::Antigravity => validate_gemini(obj, &mut v, true),
        Format::Claude => validate_claude(obj, &mut v),
        Format::OpenAI | Format::OpenAIResponse | Format::Codex => validate_openai(obj, &mut v),
        Format::Kiro | Format::Other(_) => {
            return Err(TranslateError::InvalidSchema {
                format: format.to_string(),
                fields: vec!["no validation rules for this format".to_string()],
            });
        }
    }
    Ok(v.finish())
}

// ============================================================================
// Primitives
// ============================================================================

fn require(obj: &Map<String, Value>, field: &str, expect: Expect, v: &mut Validation) -> bool {
    match obj.get(field) {
        Some(val) if expect.matches(val) => true,
        Some(_) => {
            v.errors
                .push(format!("{field}: expected {}", expect.name()));
            false
        }
        None => {
            v.errors.push(format!("{field}: missing required field"));
            false
        }
    }
}

fn optional(obj: &Map<String, Value>, field: &str, expect: Expect, v: &mut Validation) {
    if let Some(val) = obj.get(field)
        && !expect.matches(val)
    {
        v.errors
            .push(format!("{field}: expected {}", expect.name()));
    }
}

// ============================================================================
// Per-format rules
// ============================================================================

fn validate_gemini(obj: &Map<String, Value>, v: &mut Validation, vertex_style: bool) {
    if require(obj, "contents", Expect::Array, v)
        && let Some(contents) = obj["contents"].as_array()
    {
        if contents.is_empty() {
            v.warnings.push("contents: empty".to_string());
        }
        for (i, element) in contents.iter().enumerate() {
            if element.get("parts").is_none() {
                v.errors.push(format!("contents[{i}]: missing parts"));
            }
            if vertex_style && element.get("role").is_none() {
                v.warnings.push(format!("contents[{i}]: missing role"));
            }
        }
    }
    optional(obj, "model", Expect::String, v);
    optional(obj, "generationConfig", Expect::Any, v);
    optional(obj, "safetySettings", Expect::Any, v);
    optional(obj, "tools", Expect::Any, v);
    optional(obj, "systemInstruction", Expect::Any, v);
    if vertex_style {
        optional(obj, "cachedContent", Expect::Any, v);
    }
}

fn validate_claude(obj: &Map<String, Value>, v: &mut Validation) {
    require(obj, "model", Expect::String, v);

    let has_messages = obj.get("messages").is_some();
    let has_prompt = obj.get("prompt").is_some();
    if has_messages {
        if require(obj, "messages", Expect::Array, v)
            && let Some(messages) = obj["messages"].as_array()
        {
            for (i, msg) in messages.iter().enumerate() {
                if msg.get("role").is_none() {
                    v.errors.push(format!("messages[{i}]: missing role"));
                }
                if msg.get("content").is_none() {
                    v.errors.push(format!("messages[{i}]: missing content"));
                }
            }
        }
    } else if !has_prompt {
        v.errors
            .push("messages: missing (and no legacy prompt)".to_string());
    }

    match obj.get("max_tokens") {
        Some(val) if !val.is_number() => {
            v.errors.push("max_tokens: expected number".to_string());
        }
        Some(_) => {}
        None => {
            if obj.get("max_tokens_to_sample").is_none() {
                v.warnings.push("max_tokens: missing".to_string());
            }
        }
    }

    optional(obj, "temperature", Expect::Number, v);
    optional(obj, "top_p", Expect::Number, v);
    optional(obj, "top_k", Expect::Number, v);
    optional(obj, "stream", Expect::Boolean, v);
    optional(obj, "system", Expect::Any, v);
    optional(obj, "tools", Expect::Any, v);
}

fn validate_openai(obj: &Map<String, Value>, v: &mut Validation) {
    require(obj, "model", Expect::String, v);
    if require(obj, "messages", Expect::Array, v)
        && let Some(messages) = obj["messages"].as_array()
    {
        if messages.is_empty() {
            v.warnings.push("messages: empty".to_string());
        }
        for (i, msg) in messages.iter().enumerate() {
            if msg.get("role").is_none() {
                v.errors.push(format!("messages[{i}]: missing role"));
            }
            if msg.get("content").is_none() && msg.get("tool_calls").is_none() {
                v.warnings
                    .push(format!("messages[{i}]: no content or tool_calls"));
            }
        }
    }

    optional(obj, "max_tokens", Expect::Number, v);
    optional(obj, "temperature", Expect::Number, v);
    optional(obj, "top_p", Expect::Number, v);
    optional(obj, "n", Expect::Number, v);
    optional(obj, "presence_penalty", Expect::Number, v);
    optional(obj, "frequency_penalty", Expect::Number, v);
    optional(obj, "tools", Expect::Any, v);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validate(format: Format, payload: &str) -> Validation {
        validate_payload(&format, payload.as_bytes()).unwrap()
    }

    #[test]
    fn test_valid_openai_request() {
        let v = validate(
            Format::OpenAI,
            r#"{"model":"gpt-4","messages":[{"role":"user","content":"hi"}]}"#,
        );
        assert!(v.valid, "errors: {:?}", v.errors);
        assert!(v.warnings.is_empty());
    }

    #[test]
    fn test_openai_missing_model() {
        let v = validate(Format::OpenAI, r#"{"messages":[]}"#);
        assert!(!v.valid);
        assert!(v.errors.iter().any(|e| e.starts_with("model:")));
        assert!(v.warnings.iter().any(|w| w.starts_with("messages: empty")));
    }

    #[test]
    fn test_openai_message_without_content_warns() {
        let v = validate(
            Format::OpenAI,
            r#"{"model":"gpt-4","messages":[{"role":"assistant"}]}"#,
        );
        assert!(v.valid);
        assert!(v.warnings.iter().any(|w| w.contains("no content")));
    }

    #[test]
    fn test_openai_type_mismatch() {
        let v = validate(
            Format::OpenAI,
            r#"{"model":"gpt-4","messages":[],"temperature":"hot"}"#,
        );
        assert!(!v.valid);
        assert!(v.errors.iter().any(|e| e.contains("temperature")));
    }

    #[test]
    fn test_valid_claude_request() {
        let v = validate(
            Format::Claude,
            r#"{"model":"claude-3","max_tokens":100,"messages":[{"role":"user","content":"hi"}]}"#,
        );
        assert!(v.valid, "errors: {:?}", v.errors);
    }

    #[test]
    fn test_claude_missing_max_tokens_warns() {
        let v = validate(
            Format::Claude,
            r#"{"model":"claude-3","messages":[{"role":"user","content":"hi"}]}"#,
        );
        assert!(v.valid);
        assert!(v.warnings.iter().any(|w| w.starts_with("max_tokens")));
    }

    #[test]
    fn test_claude_legacy_sample_field_suppresses_warning() {
        let v = validate(
            Format::Claude,
            r#"{"model":"claude-2","prompt":"\n\nHuman: hi","max_tokens_to_sample":50}"#,
        );
        assert!(v.valid, "errors: {:?}", v.errors);
        assert!(v.warnings.is_empty());
    }

    #[test]
    fn test_claude_message_missing_role() {
        let v = validate(
            Format::Claude,
            r#"{"model":"claude-3","max_tokens":5,"messages":[{"content":"hi"}]}"#,
        );
        assert!(!v.valid);
        assert!(v.errors.iter().any(|e| e.contains("missing role")));
    }

    #[test]
    fn test_valid_gemini_request() {
        let v = validate(
            Format::Gemini,
            r#"{"contents":[{"role":"user","parts":[{"text":"hi"}]}]}"#,
        );
        assert!(v.valid, "errors: {:?}", v.errors);
    }

    #[test]
    fn test_gemini_empty_contents_warns() {
        let v = validate(Format::Gemini, r#"{"contents":[]}"#);
        assert!(v.valid);
        assert!(v.warnings.iter().any(|w| w.contains("empty")));
    }

    #[test]
    fn test_gemini_element_without_parts() {
        let v = validate(Format::Gemini, r#"{"contents":[{"role":"user"}]}"#);
        assert!(!v.valid);
        assert!(v.errors.iter().any(|e| e.contains("missing parts")));
    }

    #[test]
    fn test_antigravity_missing_role_warns() {
        let v = validate(
            Format::Antigravity,
            r#"{"contents":[{"parts":[{"text":"hi"}]}]}"#,
        );
        assert!(v.valid);
        assert!(v.warnings.iter().any(|w| w.contains("missing role")));
    }

    #[test]
    fn test_unknown_format_is_invalid_schema() {
        let err = validate_payload(&Format::Other("mistral".into()), b"{}").unwrap_err();
        assert!(matches!(err, TranslateError::InvalidSchema { .. }));
    }

    #[test]
    fn test_empty_payload() {
        let err = validate_payload(&Format::OpenAI, b"").unwrap_err();
        assert!(matches!(err, TranslateError::EmptyPayload));
    }

    #[test]
    fn test_malformed_json() {
        let err = validate_payload(&Format::OpenAI, b"{not json").unwrap_err();
        assert!(matches!(err, TranslateError::InvalidJson(_)));
    }

    #[test]
    fn test_into_result_aggregates() {
        let v = validate(Format::OpenAI, r#"{"messages":"nope"}"#);
        let err = v.into_result(&Format::OpenAI).unwrap_err();
        match err {
            TranslateError::InvalidSchema { fields, .. } => {
                assert!(fields.len() >= 2);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
