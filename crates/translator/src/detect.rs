//! Structural format detection for untagged or mistagged payloads.

use rosetta_core::Format;
use serde_json::Value;

/// A detector verdict: the guessed format, how sure we are, and why.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub format: Format,
    /// In [0, 1].
    pub confidence: f64,
    pub reason: String,
}

impl Detection {
    fn new(format: Format, confidence: f64, reason: &str) -> Self {
        Self {
            format,
            confidence,
            reason: reason.to_string(),
        }
    }
}

/// Inspect a JSON payload and guess its source format.
///
/// Rules are applied in order; the first match wins. Returns `None` for
/// empty input, non-JSON, or a non-object root.
pub fn detect_format(payload: &[u8]) -> Option<Detection> {
    if payload.is_empty() {
        return None;
    }
    let value: Value = serde_json::from_slice(payload).ok()?;
    detect_value(&value)
}

/// Detection over an already-parsed payload.
pub fn detect_value(value: &Value) -> Option<Detection> {
    let obj = value.as_object()?;

    // Vertex-style envelope: the whole request nests under "request".
    if obj
        .get("request")
        .and_then(|r| r.get("contents"))
        .is_some()
    {
        return Some(Detection::new(
            Format::Antigravity,
            1.0,
            "request.contents envelope",
        ));
    }

    if obj.contains_key("contents") {
        if obj.contains_key("generationConfig") {
            return Some(Detection::new(
                Format::Gemini,
                0.95,
                "contents with generationConfig",
            ));
        }
        if let Some(first) = obj.get("contents").and_then(|c| c.as_array()).and_then(|a| a.first())
            && first.get("parts").is_some()
        {
            return Some(Detection::new(
                Format::Gemini,
                0.7,
                "contents array with parts",
            ));
        }
    }

    if obj.contains_key("input") && obj.contains_key("instructions") {
        return Some(Detection::new(
            Format::OpenAIResponse,
            0.95,
            "input with instructions",
        ));
    }

    let model = obj.get("model").and_then(|m| m.as_str()).unwrap_or("");
    let model_lower = model.to_ascii_lowercase();

    if obj.contains_key("messages") {
        if obj.contains_key("anthropic_version") {
            return Some(Detection::new(
                Format::Claude,
                1.0,
                "messages with anthropic_version",
            ));
        }
        if model_lower.contains("claude") || model_lower.contains("anthropic") {
            return Some(Detection::new(Format::Claude, 0.9, "claude model name"));
        }
        if first_message_has_tool_blocks(obj) {
            return Some(Detection::new(
                Format::Claude,
                0.85,
                "tool_use/tool_result content blocks",
            ));
        }
        const OPENAI_PARAMS: [&str; 5] =
            ["n", "presence_penalty", "frequency_penalty", "logprobs", "logit_bias"];
        if OPENAI_PARAMS.iter().any(|p| obj.contains_key(*p)) {
            return Some(Detection::new(
                Format::OpenAI,
                0.8,
                "openai-specific sampling parameters",
            ));
        }
        const OPENAI_MODELS: [&str; 5] = ["gpt", "o1", "o3", "chatgpt", "davinci"];
        if OPENAI_MODELS.iter().any(|m| model_lower.contains(m)) {
            return Some(Detection::new(Format::OpenAI, 0.9, "openai model name"));
        }
        // Pragmatic default: a messages array with nothing distinctive is
        // most likely a chat-completions payload.
        return Some(Detection::new(
            Format::OpenAI,
            0.5,
            "messages array, no distinctive markers",
        ));
    }

    if obj.contains_key("prompt") {
        return Some(Detection::new(Format::Codex, 0.8, "prompt without messages"));
    }

    None
}

fn first_message_has_tool_blocks(obj: &serde_json::Map<String, Value>) -> bool {
    let Some(first) = obj
        .get("messages")
        .and_then(|m| m.as_array())
        .and_then(|a| a.first())
    else {
        return false;
    };
    first
        .get("content")
        .and_then(|c| c.as_array())
        .is_some_and(|blocks| {
            blocks.iter().any(|b| {
                matches!(
                    b.get("type").and_then(|t| t.as_str()),
                    Some("tool_use") | Some("tool_result")
                )
            })
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn detect(value: Value) -> Option<Detection> {
        detect_value(&value)
    }

    #[test]
    fn test_antigravity_envelope() {
        let d = detect(json!({"request": {"contents": []}})).unwrap();
        assert_eq!(d.format, Format::Antigravity);
        assert_eq!(d.confidence, 1.0);
    }

    #[test]
    fn test_gemini_with_generation_config() {
        let d = detect(json!({"contents": [], "generationConfig": {}})).unwrap();
        assert_eq!(d.format, Format::Gemini);
        assert_eq!(d.confidence, 0.95);
    }

    #[test]
    fn test_gemini_contents_with_parts() {
        let d = detect(json!({"contents": [{"parts": [{"text": "hi"}]}]})).unwrap();
        assert_eq!(d.format, Format::Gemini);
        assert_eq!(d.confidence, 0.7);
    }

    #[test]
    fn test_openai_response_input_instructions() {
        let d = detect(json!({"input": "hi", "instructions": "be brief"})).unwrap();
        assert_eq!(d.format, Format::OpenAIResponse);
    }

    #[test]
    fn test_claude_anthropic_version() {
        let d = detect(json!({"messages": [], "anthropic_version": "2023-06-01"})).unwrap();
        assert_eq!(d.format, Format::Claude);
        assert_eq!(d.confidence, 1.0);
    }

    #[test]
    fn test_claude_model_name() {
        let d = detect(json!({"messages": [], "model": "Claude-3-Opus"})).unwrap();
        assert_eq!(d.format, Format::Claude);
        assert_eq!(d.confidence, 0.9);
    }

    #[test]
    fn test_claude_tool_result_blocks() {
        let d = detect(json!({
            "model": "something",
            "messages": [{
                "role": "user",
                "content": [{"type": "tool_result", "tool_use_id": "t1", "content": "ok"}]
            }]
        }))
        .unwrap();
        assert_eq!(d.format, Format::Claude);
    }

    #[test]
    fn test_openai_sampling_params() {
        let d = detect(json!({"messages": [], "model": "mystery", "presence_penalty": 0.5}))
            .unwrap();
        assert_eq!(d.format, Format::OpenAI);
        assert_eq!(d.confidence, 0.8);
    }

    #[test]
    fn test_openai_model_name() {
        let d = detect(json!({"messages": [], "model": "gpt-4o"})).unwrap();
        assert_eq!(d.format, Format::OpenAI);
        assert_eq!(d.confidence, 0.9);
    }

    #[test]
    fn test_messages_default_low_confidence() {
        let d = detect(json!({"messages": [], "model": "mystery-llm"})).unwrap();
        assert_eq!(d.format, Format::OpenAI);
        assert_eq!(d.confidence, 0.5);
    }

    #[test]
    fn test_codex_prompt() {
        let d = detect(json!({"prompt": "write a haiku", "model": "code-x"})).unwrap();
        assert_eq!(d.format, Format::Codex);
    }

    #[test]
    fn test_empty_and_non_object() {
        assert!(detect_format(b"").is_none());
        assert!(detect_format(b"[1,2,3]").is_none());
        assert!(detect_format(b"not json").is_none());
    }

    #[test]
    fn test_rule_order_antigravity_before_gemini() {
        // Both an envelope and top-level contents: the envelope rule wins.
        let d = detect(json!({
            "request": {"contents": []},
            "contents": [],
            "generationConfig": {}
        }))
        .unwrap();
        assert_eq!(d.format, Format::Antigravity);
    }
}
