//! Builtin conversions for the most-travelled format pairs.
//!
//! Each module is named for the direction it converts: `X_to_Y` rewrites
//! X-schema payloads (requests and responses alike) into the Y schema.
//! Registering the proxy path A→B therefore pairs `A_to_B`'s request
//! translator with `B_to_A`'s response translators, which the registry
//! consults at (B, A) when responses flow back.
//!
//! Stream translators emit plain JSON chunk payloads for OpenAI-bound
//! streams (the dispatcher adds SSE framing) and complete `event:`/`data:`
//! blocks for Claude-bound streams, whose protocol is event-typed.

pub mod claude_to_openai;
pub mod gemini_to_openai;
pub mod openai_to_claude;
pub mod openai_to_gemini;

use crate::fallback::FallbackRegistry;
use crate::registry::Registry;
use rosetta_core::{Format, Result, TranslateError};
use serde_json::Value;

/// Decoder state carried across the chunks of one chat stream.
#[derive(Debug, Default)]
pub struct ChatStreamState {
    pub response_id: String,
    pub model: String,
    pub created: i64,
    pub current_tool_call_index: i32,
    pub current_content_index: i32,
    pub sent_role: bool,
    /// Claude-bound streams: message_start has been emitted.
    pub message_started: bool,
    pub text_block_open: bool,
    pub tool_block_open: bool,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Build a registry pre-loaded with the builtin conversions.
///
/// The gemini-cli pairs reuse the gemini conversions and are registered
/// lazily; they materialize on first use.
pub fn build_registry() -> Registry {
    let registry = Registry::new();

    registry.register(
        Format::OpenAI,
        Format::Claude,
        Some(openai_to_claude::request_transform()),
        Some(openai_to_claude::response_transform()),
    );
    registry.register(
        Format::Claude,
        Format::OpenAI,
        Some(claude_to_openai::request_transform()),
        Some(claude_to_openai::response_transform()),
    );
    registry.register(
        Format::OpenAI,
        Format::Gemini,
        Some(openai_to_gemini::request_transform()),
        Some(openai_to_gemini::response_transform()),
    );
    registry.register(
        Format::Gemini,
        Format::OpenAI,
        Some(gemini_to_openai::request_transform()),
        Some(gemini_to_openai::response_transform()),
    );

    // The CLI variant speaks the gemini wire schema.
    registry.register_lazy_both(Format::GeminiCli, Format::OpenAI, || {
        (
            gemini_to_openai::request_transform(),
            gemini_to_openai::response_transform(),
        )
    });
    registry.register_lazy_both(Format::OpenAI, Format::GeminiCli, || {
        (
            openai_to_gemini::request_transform(),
            openai_to_gemini::response_transform(),
        )
    });

    registry
}

/// Default multi-hop chains: pairs with no direct transform bridge through
/// openai.
pub fn build_fallback_registry() -> FallbackRegistry {
    let fallback = FallbackRegistry::new();
    fallback.register_chain(Format::Claude, Format::Gemini, vec![Format::OpenAI]);
    fallback.register_chain(Format::Gemini, Format::Claude, vec![Format::OpenAI]);
    fallback.register_chain(Format::GeminiCli, Format::Claude, vec![Format::OpenAI]);
    fallback.register_chain(Format::Codex, Format::Claude, vec![Format::OpenAI]);
    fallback
}

/// Replace the `model` field in a JSON payload (alias → actual id).
/// Payloads without a model field pass through unchanged.
pub fn rewrite_model(payload: &[u8], model: &str) -> Result<Vec<u8>> {
    let mut value: Value = serde_json::from_slice(payload)?;
    if let Some(obj) = value.as_object_mut()
        && obj.contains_key("model")
    {
        obj.insert("model".to_string(), Value::String(model.to_string()));
    }
    serde_json::to_vec(&value).map_err(|e| TranslateError::Translation(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_json_diff::assert_json_include;

    #[test]
    fn test_round_through_builtin_pair_keeps_conversation() {
        let registry = build_registry();
        let payload = br#"{"model":"gpt-4","messages":[
            {"role":"system","content":"be brief"},
            {"role":"user","content":"hi"}
        ],"max_tokens":32}"#;

        let claude = registry
            .translate_request(&Format::OpenAI, &Format::Claude, "claude-3-opus", payload, false)
            .unwrap();
        let back = registry
            .translate_request(&Format::Claude, &Format::OpenAI, "gpt-4", &claude, false)
            .unwrap();

        let actual: Value = serde_json::from_slice(&back).unwrap();
        assert_json_include!(
            actual: actual,
            expected: serde_json::json!({
                "model": "gpt-4",
                "max_tokens": 32,
                "messages": [
                    {"role": "system", "content": "be brief"},
                    {"role": "user", "content": "hi"}
                ],
            })
        );
    }

    #[test]
    fn test_build_registry_covers_builtin_paths() {
        let registry = build_registry();
        for (from, to) in [
            (Format::OpenAI, Format::Claude),
            (Format::Claude, Format::OpenAI),
            (Format::OpenAI, Format::Gemini),
            (Format::Gemini, Format::OpenAI),
        ] {
            assert!(
                registry.validate_translation_path(&from, &to).is_ok(),
                "path {from} -> {to} incomplete"
            );
        }
    }

    #[test]
    fn test_gemini_cli_registered_lazily() {
        let registry = build_registry();
        assert!(registry.has_request_translator(&Format::GeminiCli, &Format::OpenAI));
        // First use materializes the gemini transforms.
        let payload = br#"{"contents":[{"role":"user","parts":[{"text":"hi"}]}]}"#;
        let out = registry
            .translate_request(&Format::GeminiCli, &Format::OpenAI, "gpt-4", payload, false)
            .unwrap();
        let value: Value = serde_json::from_slice(&out).unwrap();
        assert!(value.get("messages").is_some());
    }

    #[test]
    fn test_rewrite_model() {
        let out = rewrite_model(br#"{"model":"alias","messages":[]}"#, "real-model").unwrap();
        let value: Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["model"], "real-model");
    }

    #[test]
    fn test_rewrite_model_absent_field_untouched() {
        let out = rewrite_model(br#"{"contents":[]}"#, "real-model").unwrap();
        let value: Value = serde_json::from_slice(&out).unwrap();
        assert!(value.get("model").is_none());
    }

    #[test]
    fn test_default_fallback_chains() {
        let fallback = build_fallback_registry();
        assert_eq!(
            fallback.get_chain(&Format::Claude, &Format::Gemini).unwrap(),
            vec![Format::OpenAI]
        );
        assert!(fallback.get_chain(&Format::OpenAI, &Format::Claude).is_none());
    }
}
