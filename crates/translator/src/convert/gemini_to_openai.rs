//! Gemini-schema payloads rewritten into the OpenAI schema.
//!
//! The request side feeds OpenAI-speaking upstreams; the response side
//! serves OpenAI-speaking clients proxied to a Gemini upstream.

use super::ChatStreamState;
use crate::{Carry, RequestTransform, ResponseTransform};
use rosetta_core::{Result, TransformCtx, TranslateError};
use serde_json::{Value, json};
use std::sync::Arc;

pub fn request_transform() -> RequestTransform {
    Arc::new(translate_request)
}

pub fn response_transform() -> ResponseTransform {
    ResponseTransform::new()
        .with_stream(Arc::new(translate_stream))
        .with_non_stream(Arc::new(translate_non_stream))
        .with_token_count(Arc::new(render_token_count))
}

// ============================================================================
// Request: Gemini generateContent -> OpenAI chat
// ============================================================================

fn translate_request(model: &str, payload: &[u8], stream: bool) -> Result<Vec<u8>> {
    let req: Value = serde_json::from_slice(payload)?;

    let mut messages: Vec<Value> = Vec::new();

    if let Some(text) = system_instruction_text(&req) {
        messages.push(json!({"role": "system", "content": text}));
    }

    let contents = req
        .get("contents")
        .and_then(|c| c.as_array())
        .ok_or_else(|| TranslateError::Translation("missing contents field".to_string()))?;
    for content in contents {
        convert_content(content, &mut messages);
    }

    let mut out = json!({
        "model": model,
        "messages": messages,
    });

    if let Some(config) = req.get("generationConfig") {
        if let Some(v) = config.get("temperature") {
            out["temperature"] = v.clone();
        }
        if let Some(v) = config.get("topP") {
            out["top_p"] = v.clone();
        }
        if let Some(v) = config.get("maxOutputTokens") {
            out["max_tokens"] = v.clone();
        }
        if let Some(v) = config.get("stopSequences") {
            out["stop"] = v.clone();
        }
    }
    if let Some(tools) = convert_tools(&req) {
        out["tools"] = tools;
    }
    if stream {
        out["stream"] = Value::Bool(true);
    }

    serde_json::to_vec(&out).map_err(|e| TranslateError::Translation(e.to_string()))
}

fn system_instruction_text(req: &Value) -> Option<String> {
    let parts = req
        .get("systemInstruction")
        .and_then(|si| si.get("parts"))
        .and_then(|p| p.as_array())?;
    let text: Vec<&str> = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect();
    if text.is_empty() {
        None
    } else {
        Some(text.join("\n\n"))
    }
}

fn convert_content(content: &Value, messages: &mut Vec<Value>) {
    let role = match content.get("role").and_then(|r| r.as_str()) {
        Some("model") => "assistant",
        _ => "user",
    };
    let Some(parts) = content.get("parts").and_then(|p| p.as_array()) else {
        return;
    };

    let mut text_parts = Vec::new();
    let mut tool_calls = Vec::new();
    for part in parts {
        if let Some(text) = part.get("text").and_then(|t| t.as_str()) {
            text_parts.push(text.to_string());
        } else if let Some(fc) = part.get("functionCall") {
            let args = fc.get("args").cloned().unwrap_or_else(|| json!({}));
            tool_calls.push(json!({
                "id": format!("call_{}", uuid::Uuid::new_v4()),
                "type": "function",
                "function": {
                    "name": fc.get("name").and_then(|n| n.as_str()).unwrap_or(""),
                    "arguments": serde_json::to_string(&args).unwrap_or_default(),
                },
                "index": tool_calls.len(),
            }));
        } else if let Some(fr) = part.get("functionResponse") {
            let response = fr.get("response").cloned().unwrap_or_else(|| json!({}));
            messages.push(json!({
                "role": "tool",
                "name": fr.get("name").and_then(|n| n.as_str()).unwrap_or("function"),
                "content": serde_json::to_string(&response).unwrap_or_default(),
            }));
        }
    }

    if text_parts.is_empty() && tool_calls.is_empty() {
        return;
    }
    let content_str = text_parts.join("");
    let mut message = json!({
        "role": role,
        "content": if content_str.is_empty() && !tool_calls.is_empty() {
            Value::Null
        } else {
            Value::String(content_str)
        },
    });
    if !tool_calls.is_empty() {
        message["tool_calls"] = Value::Array(tool_calls);
    }
    messages.push(message);
}

fn convert_tools(req: &Value) -> Option<Value> {
    let tools = req.get("tools")?.as_array()?;
    let mut converted = Vec::new();
    for tool in tools {
        let Some(declarations) = tool.get("functionDeclarations").and_then(|d| d.as_array())
        else {
            continue;
        };
        for decl in declarations {
            let mut function = json!({
                "name": decl.get("name").and_then(|n| n.as_str()).unwrap_or(""),
                "description": decl.get("description").and_then(|d| d.as_str()).unwrap_or(""),
            });
            if let Some(params) = decl.get("parameters") {
                function["parameters"] = params.clone();
            }
            converted.push(json!({"type": "function", "function": function}));
        }
    }
    if converted.is_empty() {
        None
    } else {
        Some(Value::Array(converted))
    }
}

// ============================================================================
// Response: Gemini generateContent response -> OpenAI chat completion
// ============================================================================

fn translate_non_stream(
    _ctx: &TransformCtx,
    _model: &str,
    _original_request: &[u8],
    _translated_request: &[u8],
    body: &[u8],
) -> Result<String> {
    let resp: Value = serde_json::from_slice(body)?;
    let created = chrono::Utc::now().timestamp();
    let id = format!("chatcmpl-{}", uuid::Uuid::new_v4());
    let model = resp
        .get("modelVersion")
        .and_then(|v| v.as_str())
        .unwrap_or("gemini");

    let candidate = resp
        .get("candidates")
        .and_then(|c| c.as_array())
        .and_then(|arr| arr.first());

    let (content_str, tool_calls, finish_reason) = match candidate {
        Some(candidate) => {
            let (text, tool_calls) = collect_candidate_parts(candidate);
            let finish = map_finish_reason(
                candidate.get("finishReason").and_then(|v| v.as_str()),
            );
            (text, tool_calls, finish)
        }
        None => (String::new(), Vec::new(), "stop"),
    };

    let content_val = if content_str.is_empty() && !tool_calls.is_empty() {
        Value::Null
    } else {
        Value::String(content_str)
    };
    let mut message = json!({"role": "assistant", "content": content_val});
    if !tool_calls.is_empty() {
        message["tool_calls"] = Value::Array(tool_calls);
    }

    let mut out = json!({
        "id": id,
        "object": "chat.completion",
        "created": created,
        "model": model,
        "choices": [{
            "index": 0,
            "message": message,
            "finish_reason": finish_reason,
        }],
    });

    if let Some(u) = resp.get("usageMetadata") {
        let prompt = u.get("promptTokenCount").and_then(|v| v.as_u64()).unwrap_or(0);
        let completion = u
            .get("candidatesTokenCount")
            .and_then(|v| v.as_u64())
            .unwrap_or(0);
        let total = u
            .get("totalTokenCount")
            .and_then(|v| v.as_u64())
            .unwrap_or(prompt + completion);
        out["usage"] = json!({
            "prompt_tokens": prompt,
            "completion_tokens": completion,
            "total_tokens": total,
        });
    }

    serde_json::to_string(&out).map_err(|e| TranslateError::Translation(e.to_string()))
}

fn collect_candidate_parts(candidate: &Value) -> (String, Vec<Value>) {
    let mut text_parts = Vec::new();
    let mut tool_calls = Vec::new();
    if let Some(parts) = candidate
        .get("content")
        .and_then(|c| c.get("parts"))
        .and_then(|p| p.as_array())
    {
        for part in parts {
            if let Some(text) = part.get("text").and_then(|t| t.as_str()) {
                text_parts.push(text.to_string());
            } else if let Some(fc) = part.get("functionCall") {
                let args = fc.get("args").cloned().unwrap_or_else(|| json!({}));
                tool_calls.push(json!({
                    "id": format!("call_{}", uuid::Uuid::new_v4()),
                    "type": "function",
                    "function": {
                        "name": fc.get("name").and_then(|n| n.as_str()).unwrap_or(""),
                        "arguments": serde_json::to_string(&args).unwrap_or_default(),
                    },
                    "index": tool_calls.len(),
                }));
            }
        }
    }
    (text_parts.join(""), tool_calls)
}

fn map_finish_reason(finish: Option<&str>) -> &'static str {
    match finish {
        Some("MAX_TOKENS") => "length",
        Some("SAFETY") | Some("RECITATION") => "content_filter",
        _ => "stop",
    }
}

/// Gemini chunks are self-contained; the OpenAI side expects a role
/// preamble first and a `[DONE]` sentinel last.
fn translate_stream(
    _ctx: &TransformCtx,
    _model: &str,
    _original_request: &[u8],
    _translated_request: &[u8],
    _event: Option<&str>,
    data: &[u8],
    carry: &mut Carry,
) -> Result<Vec<String>> {
    let state = carry.get_or_default::<ChatStreamState>();
    let resp: Value = serde_json::from_slice(data)?;
    let mut chunks = Vec::new();

    if state.response_id.is_empty() {
        state.response_id = format!("chatcmpl-{}", uuid::Uuid::new_v4());
        state.created = chrono::Utc::now().timestamp();
        state.current_tool_call_index = -1;
        state.sent_role = true;
        chunks.push(openai_chunk(
            state,
            json!({"role": "assistant", "content": ""}),
            None,
            None,
        )?);
    }
    if let Some(model) = resp.get("modelVersion").and_then(|v| v.as_str()) {
        state.model = model.to_string();
    }

    let candidate = resp
        .get("candidates")
        .and_then(|c| c.as_array())
        .and_then(|arr| arr.first());
    let Some(candidate) = candidate else {
        return Ok(chunks);
    };

    if let Some(parts) = candidate
        .get("content")
        .and_then(|c| c.get("parts"))
        .and_then(|p| p.as_array())
    {
        for part in parts {
            if let Some(text) = part.get("text").and_then(|t| t.as_str()) {
                chunks.push(openai_chunk(state, json!({"content": text}), None, None)?);
            } else if let Some(fc) = part.get("functionCall") {
                state.current_tool_call_index += 1;
                let args = fc.get("args").cloned().unwrap_or_else(|| json!({}));
                chunks.push(openai_chunk(
                    state,
                    json!({
                        "tool_calls": [{
                            "index": state.current_tool_call_index,
                            "id": format!("call_{}", uuid::Uuid::new_v4()),
                            "type": "function",
                            "function": {
                                "name": fc.get("name").and_then(|n| n.as_str()).unwrap_or(""),
                                "arguments": serde_json::to_string(&args).unwrap_or_default(),
                            },
                        }],
                    }),
                    None,
                    None,
                )?);
            }
        }
    }

    if let Some(finish) = candidate.get("finishReason").and_then(|v| v.as_str()) {
        let usage = resp.get("usageMetadata").map(|u| {
            let prompt = u.get("promptTokenCount").and_then(|v| v.as_u64()).unwrap_or(0);
            let completion = u
                .get("candidatesTokenCount")
                .and_then(|v| v.as_u64())
                .unwrap_or(0);
            json!({
                "prompt_tokens": prompt,
                "completion_tokens": completion,
                "total_tokens": prompt + completion,
            })
        });
        chunks.push(openai_chunk(
            state,
            json!({}),
            Some(map_finish_reason(Some(finish))),
            usage,
        )?);
        chunks.push("[DONE]".to_string());
    }

    Ok(chunks)
}

fn openai_chunk(
    state: &ChatStreamState,
    delta: Value,
    finish_reason: Option<&str>,
    usage: Option<Value>,
) -> Result<String> {
    let mut chunk = json!({
        "id": state.response_id,
        "object": "chat.completion.chunk",
        "created": state.created,
        "model": state.model,
        "choices": [{
            "index": 0,
            "delta": delta,
            "finish_reason": finish_reason,
        }],
    });
    if let Some(usage) = usage {
        chunk["usage"] = usage;
    }
    serde_json::to_string(&chunk).map_err(|e| TranslateError::Translation(e.to_string()))
}

fn render_token_count(_ctx: &TransformCtx, count: u64) -> String {
    json!({
        "prompt_tokens": count,
        "completion_tokens": 0,
        "total_tokens": count,
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn translate(payload: &str) -> Value {
        let out = translate_request("gpt-4o", payload.as_bytes(), false).unwrap();
        serde_json::from_slice(&out).unwrap()
    }

    #[test]
    fn test_request_basic_shape() {
        let out = translate(
            r#"{"systemInstruction":{"parts":[{"text":"be terse"}]},
                "contents":[
                    {"role":"user","parts":[{"text":"hi"}]},
                    {"role":"model","parts":[{"text":"hello"}]}
                ],
                "generationConfig":{"temperature":0.3,"topP":0.9,"maxOutputTokens":42,"stopSequences":["END"]}}"#,
        );
        assert_eq!(out["model"], "gpt-4o");
        let messages = out["messages"].as_array().unwrap();
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[1]["role"], "user");
        assert_eq!(messages[2]["role"], "assistant");
        assert_eq!(out["temperature"], 0.3);
        assert_eq!(out["top_p"], 0.9);
        assert_eq!(out["max_tokens"], 42);
        assert_eq!(out["stop"][0], "END");
    }

    #[test]
    fn test_request_function_call_and_response() {
        let out = translate(
            r#"{"contents":[
                {"role":"model","parts":[{"functionCall":{"name":"f","args":{"a":1}}}]},
                {"role":"user","parts":[{"functionResponse":{"name":"f","response":{"ok":true}}}]}
            ],
            "tools":[{"functionDeclarations":[{"name":"f","description":"d","parameters":{"type":"object"}}]}]}"#,
        );
        let messages = out["messages"].as_array().unwrap();
        assert_eq!(messages[0]["role"], "assistant");
        assert_eq!(messages[0]["tool_calls"][0]["function"]["name"], "f");
        assert_eq!(messages[1]["role"], "tool");
        assert_eq!(out["tools"][0]["function"]["name"], "f");
    }

    #[test]
    fn test_non_stream_response() {
        let ctx = TransformCtx::new();
        let body = r#"{"modelVersion":"gemini-2.0-flash","candidates":[{
            "content":{"role":"model","parts":[
                {"text":"hi"},
                {"functionCall":{"name":"f","args":{"a":1}}}
            ]},
            "finishReason":"STOP"
        }],"usageMetadata":{"promptTokenCount":4,"candidatesTokenCount":2,"totalTokenCount":6}}"#;
        let out = translate_non_stream(&ctx, "m", b"{}", b"{}", body.as_bytes()).unwrap();
        let value: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["object"], "chat.completion");
        assert_eq!(value["model"], "gemini-2.0-flash");
        assert_eq!(value["choices"][0]["message"]["content"], "hi");
        assert_eq!(
            value["choices"][0]["message"]["tool_calls"][0]["function"]["name"],
            "f"
        );
        assert_eq!(value["usage"]["total_tokens"], 6);
    }

    #[test]
    fn test_safety_maps_to_content_filter() {
        let ctx = TransformCtx::new();
        let body = r#"{"candidates":[{"content":{"parts":[{"text":""}]},"finishReason":"SAFETY"}]}"#;
        let out = translate_non_stream(&ctx, "m", b"{}", b"{}", body.as_bytes()).unwrap();
        let value: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["choices"][0]["finish_reason"], "content_filter");
    }

    #[test]
    fn test_stream_emits_role_preamble_and_done() {
        let ctx = TransformCtx::new();
        let mut carry = Carry::new();
        let mut chunk = |data: &str| -> Vec<String> {
            translate_stream(&ctx, "m", b"{}", b"{}", None, data.as_bytes(), &mut carry).unwrap()
        };

        let first = chunk(
            r#"{"modelVersion":"gemini-2.0-flash","candidates":[{"content":{"parts":[{"text":"he"}]},"index":0}]}"#,
        );
        // role preamble + first text delta
        assert_eq!(first.len(), 2);
        assert!(first[0].contains("\"role\":\"assistant\""));
        assert!(first[1].contains("\"content\":\"he\""));

        let last = chunk(
            r#"{"candidates":[{"content":{"parts":[{"text":"y"}]},"finishReason":"STOP"}],
                "usageMetadata":{"promptTokenCount":1,"candidatesTokenCount":2}}"#,
        );
        assert_eq!(last.len(), 3);
        assert!(last[1].contains("\"finish_reason\":\"stop\""));
        assert!(last[1].contains("\"total_tokens\":3"));
        assert_eq!(last[2], "[DONE]");
    }

    #[test]
    fn test_token_count_rendering() {
        let ctx = TransformCtx::new();
        let value: Value = serde_json::from_str(&render_token_count(&ctx, 5)).unwrap();
        assert_eq!(value["prompt_tokens"], 5);
    }
}
