//! Claude-schema payloads rewritten into the OpenAI schema.
//!
//! The request side feeds OpenAI-speaking upstreams; the response side
//! serves OpenAI-speaking clients proxied to a Claude upstream.

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
// Request: Claude messages -> OpenAI chat
// ============================================================================

fn translate_request(model: &str, payload: &[u8], stream: bool) -> Result<Vec<u8>> {
    let req: Value = serde_json::from_slice(payload)?;

    let mut messages: Vec<Value> = Vec::new();

    // Top-level system prompt becomes the leading system message.
    match req.get("system") {
        Some(Value::String(s)) if !s.is_empty() => {
            messages.push(json!({"role": "system", "content": s}));
        }
        Some(Value::Array(blocks)) => {
            let text: Vec<&str> = blocks
                .iter()
                .filter_map(|b| b.get("text").and_then(|t| t.as_str()))
                .collect();
            if !text.is_empty() {
                messages.push(json!({"role": "system", "content": text.join("\n\n")}));
            }
        }
        _ => {}
    }

    let claude_messages = req
        .get("messages")
        .and_then(|m| m.as_array())
        .ok_or_else(|| TranslateError::Translation("missing messages field".to_string()))?;
    for msg in claude_messages {
        convert_message(msg, &mut messages);
    }

    let mut out = json!({
        "model": model,
        "messages": messages,
    });

    if let Some(max_tokens) = req.get("max_tokens") {
        out["max_tokens"] = max_tokens.clone();
    }
    for field in ["temperature", "top_p"] {
        if let Some(v) = req.get(field) {
            out[field] = v.clone();
        }
    }
    if let Some(stop) = req.get("stop_sequences") {
        out["stop"] = stop.clone();
    }
    if let Some(tools) = convert_tools(&req) {
        out["tools"] = tools;
    }
    if let Some(tc) = req.get("tool_choice") {
        out["tool_choice"] = convert_tool_choice(tc);
    }
    if stream {
        out["stream"] = Value::Bool(true);
    }

    serde_json::to_vec(&out).map_err(|e| TranslateError::Translation(e.to_string()))
}

fn convert_message(msg: &Value, out: &mut Vec<Value>) {
    let role = msg.get("role").and_then(|r| r.as_str()).unwrap_or("user");
    match msg.get("content") {
        Some(Value::String(s)) => {
            out.push(json!({"role": role, "content": s}));
        }
        Some(Value::Array(blocks)) => {
            if role == "assistant" {
                convert_assistant_blocks(blocks, out);
            } else {
                convert_user_blocks(blocks, out);
            }
        }
        _ => out.push(json!({"role": role, "content": ""})),
    }
}

/// Assistant turns split into text content plus tool_calls.
fn convert_assistant_blocks(blocks: &[Value], out: &mut Vec<Value>) {
    let mut text_parts = Vec::new();
    let mut tool_calls = Vec::new();
    for block in blocks {
        match block.get("type").and_then(|t| t.as_str()) {
            Some("text") => {
                if let Some(text) = block.get("text").and_then(|t| t.as_str()) {
                    text_parts.push(text.to_string());
                }
            }
            Some("tool_use") => {
                let input = block.get("input").cloned().unwrap_or_else(|| json!({}));
                tool_calls.push(json!({
                    "id": block.get("id").and_then(|v| v.as_str()).unwrap_or(""),
                    "type": "function",
                    "function": {
                        "name": block.get("name").and_then(|v| v.as_str()).unwrap_or(""),
                        "arguments": serde_json::to_string(&input).unwrap_or_default(),
                    },
                    "index": tool_calls.len(),
                }));
            }
            _ => {}
        }
    }

    let content = text_parts.join("");
    let mut message = json!({
        "role": "assistant",
        "content": if content.is_empty() && !tool_calls.is_empty() {
            Value::Null
        } else {
            Value::String(content)
        },
    });
    if !tool_calls.is_empty() {
        message["tool_calls"] = Value::Array(tool_calls);
    }
    out.push(message);
}

/// User turns: tool_result blocks become tool role messages; the rest
/// becomes multipart or plain content.
fn convert_user_blocks(blocks: &[Value], out: &mut Vec<Value>) {
    let mut parts = Vec::new();
    for block in blocks {
        match block.get("type").and_then(|t| t.as_str()) {
            Some("tool_result") => {
                let content = match block.get("content") {
                    Some(Value::String(s)) => s.clone(),
                    Some(Value::Array(inner)) => inner
                        .iter()
                        .filter_map(|b| b.get("text").and_then(|t| t.as_str()))
                        .collect::<Vec<_>>()
                        .join(""),
                    _ => String::new(),
                };
                out.push(json!({
                    "role": "tool",
                    "tool_call_id": block
                        .get("tool_use_id")
                        .and_then(|v| v.as_str())
                        .unwrap_or(""),
                    "content": content,
                }));
            }
            Some("text") => parts.push(json!({
                "type": "text",
                "text": block.get("text").and_then(|t| t.as_str()).unwrap_or(""),
            })),
            Some("image") => {
                if let Some(part) = convert_image_block(block) {
                    parts.push(part);
                }
            }
            _ => {}
        }
    }

    if parts.is_empty() {
        return;
    }
    // A single text part collapses to plain string content.
    if parts.len() == 1 && parts[0].get("type").and_then(|t| t.as_str()) == Some("text") {
        let text = parts[0].get("text").cloned().unwrap_or_default();
        out.push(json!({"role": "user", "content": text}));
    } else {
        out.push(json!({"role": "user", "content": parts}));
    }
}

fn convert_image_block(block: &Value) -> Option<Value> {
    let source = block.get("source")?;
    let url = match source.get("type").and_then(|t| t.as_str()) {
        Some("base64") => format!(
            "data:{};base64,{}",
            source.get("media_type").and_then(|m| m.as_str()).unwrap_or("image/png"),
            source.get("data").and_then(|d| d.as_str()).unwrap_or(""),
        ),
        Some("url") => source.get("url").and_then(|u| u.as_str())?.to_string(),
        _ => return None,
    };
    Some(json!({"type": "image_url", "image_url": {"url": url}}))
}

fn convert_tools(req: &Value) -> Option<Value> {
    let tools = req.get("tools")?.as_array()?;
    let converted: Vec<Value> = tools
        .iter()
        .filter_map(|tool| {
            Some(json!({
                "type": "function",
                "function": {
                    "name": tool.get("name")?.as_str()?,
                    "description": tool.get("description").and_then(|d| d.as_str()).unwrap_or(""),
                    "parameters": tool
                        .get("input_schema")
                        .cloned()
                        .unwrap_or_else(|| json!({"type": "object", "properties": {}})),
                },
            }))
        })
        .collect();
    if converted.is_empty() {
        None
    } else {
        Some(Value::Array(converted))
    }
}

fn convert_tool_choice(tc: &Value) -> Value {
    match tc.get("type").and_then(|t| t.as_str()) {
        Some("none") => json!("none"),
        Some("any") => json!("required"),
        Some("tool") => match tc.get("name").and_then(|n| n.as_str()) {
            Some(name) => json!({"type": "function", "function": {"name": name}}),
            None => json!("auto"),
        },
        _ => json!("auto"),
    }
}

// ============================================================================
// Response: Claude message -> OpenAI chat completion
// ============================================================================

fn translate_non_stream(
    _ctx: &TransformCtx,
    _model: &str,
    _original_request: &[u8],
    _translated_request: &[u8],
    body: &[u8],
) -> Result<String> {
    let resp: Value = serde_json::from_slice(body)?;

    let id = format!(
        "chatcmpl-{}",
        resp.get("id").and_then(|v| v.as_str()).unwrap_or("unknown")
    );
    let model = resp
        .get("model")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_string();
    let created = chrono::Utc::now().timestamp();

    let mut text_parts = Vec::new();
    let mut tool_calls = Vec::new();
    if let Some(content) = resp.get("content").and_then(|c| c.as_array()) {
        for block in content {
            match block.get("type").and_then(|t| t.as_str()) {
                Some("text") => {
                    if let Some(text) = block.get("text").and_then(|t| t.as_str()) {
                        text_parts.push(text.to_string());
                    }
                }
                Some("tool_use") => {
                    let input = block.get("input").cloned().unwrap_or_else(|| json!({}));
                    tool_calls.push(json!({
                        "id": block.get("id").and_then(|v| v.as_str()).unwrap_or(""),
                        "type": "function",
                        "function": {
                            "name": block.get("name").and_then(|v| v.as_str()).unwrap_or(""),
                            "arguments": serde_json::to_string(&input).unwrap_or_default(),
                        },
                        "index": tool_calls.len(),
                    }));
                }
                _ => {}
            }
        }
    }

    let finish_reason = map_stop_reason(resp.get("stop_reason").and_then(|v| v.as_str()));
    let content_str = text_parts.join("");
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

    if let Some(usage) = resp.get("usage") {
        let input = usage.get("input_tokens").and_then(|v| v.as_u64()).unwrap_or(0);
        let output = usage.get("output_tokens").and_then(|v| v.as_u64()).unwrap_or(0);
        out["usage"] = json!({
            "prompt_tokens": input,
            "completion_tokens": output,
            "total_tokens": input + output,
        });
    }

    serde_json::to_string(&out).map_err(|e| TranslateError::Translation(e.to_string()))
}

fn map_stop_reason(stop_reason: Option<&str>) -> &'static str {
    match stop_reason {
        Some("max_tokens") => "length",
        Some("tool_use") => "tool_calls",
        _ => "stop",
    }
}

// ============================================================================
// Response stream: Claude SSE events -> OpenAI chunks
// ============================================================================

/// Dispatches on the Claude SSE event name; the OpenAI protocol is not
/// event-typed, so output chunks are plain JSON payloads plus the final
/// `[DONE]` sentinel.
fn translate_stream(
    _ctx: &TransformCtx,
    _model: &str,
    _original_request: &[u8],
    _translated_request: &[u8],
    event: Option<&str>,
    data: &[u8],
    carry: &mut Carry,
) -> Result<Vec<String>> {
    let state = carry.get_or_default::<ChatStreamState>();
    let parsed: Value = serde_json::from_slice(data)?;
    let mut chunks = Vec::new();

    match event {
        Some("message_start") => {
            if let Some(msg) = parsed.get("message") {
                state.response_id = format!(
                    "chatcmpl-{}",
                    msg.get("id").and_then(|v| v.as_str()).unwrap_or("unknown")
                );
                state.model = msg
                    .get("model")
                    .and_then(|v| v.as_str())
                    .unwrap_or("unknown")
                    .to_string();
                state.created = chrono::Utc::now().timestamp();
                state.current_content_index = -1;
                state.current_tool_call_index = -1;
                state.input_tokens = msg
                    .get("usage")
                    .and_then(|u| u.get("input_tokens"))
                    .and_then(|v| v.as_u64())
                    .unwrap_or(0);
            }
            state.sent_role = true;
            chunks.push(openai_chunk(
                state,
                json!({"role": "assistant", "content": ""}),
                None,
                None,
            )?);
        }

        Some("content_block_start") => {
            state.current_content_index += 1;
            if let Some(cb) = parsed.get("content_block")
                && cb.get("type").and_then(|t| t.as_str()) == Some("tool_use")
            {
                state.current_tool_call_index += 1;
                chunks.push(openai_chunk(
                    state,
                    json!({
                        "tool_calls": [{
                            "index": state.current_tool_call_index,
                            "id": cb.get("id").and_then(|v| v.as_str()).unwrap_or(""),
                            "type": "function",
                            "function": {
                                "name": cb.get("name").and_then(|v| v.as_str()).unwrap_or(""),
                                "arguments": "",
                            },
                        }],
                    }),
                    None,
                    None,
                )?);
            }
        }

        Some("content_block_delta") => {
            match parsed
                .get("delta")
                .and_then(|d| d.get("type"))
                .and_then(|t| t.as_str())
            {
                Some("text_delta") => {
                    let text = parsed
                        .get("delta")
                        .and_then(|d| d.get("text"))
                        .and_then(|t| t.as_str())
                        .unwrap_or("");
                    chunks.push(openai_chunk(state, json!({"content": text}), None, None)?);
                }
                Some("input_json_delta") => {
                    let partial = parsed
                        .get("delta")
                        .and_then(|d| d.get("partial_json"))
                        .and_then(|t| t.as_str())
                        .unwrap_or("");
                    chunks.push(openai_chunk(
                        state,
                        json!({
                            "tool_calls": [{
                                "index": state.current_tool_call_index,
                                "function": {"arguments": partial},
                            }],
                        }),
                        None,
                        None,
                    )?);
                }
                _ => {}
            }
        }

        Some("message_delta") => {
            if let Some(delta) = parsed.get("delta") {
                let finish =
                    map_stop_reason(delta.get("stop_reason").and_then(|v| v.as_str()));
                let usage = parsed.get("usage").map(|u| {
                    let output = u
                        .get("output_tokens")
                        .and_then(|v| v.as_u64())
                        .unwrap_or(0);
                    json!({
                        "prompt_tokens": state.input_tokens,
                        "completion_tokens": output,
                        "total_tokens": state.input_tokens + output,
                    })
                });
                chunks.push(openai_chunk(state, json!({}), Some(finish), usage)?);
            }
        }

        Some("message_stop") => {
            chunks.push("[DONE]".to_string());
        }

        // ping, content_block_stop, etc. carry nothing for this direction.
        _ => {}
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
    fn test_request_system_promoted_to_message() {
        let out = translate(
            r#"{"model":"claude-3","max_tokens":100,"system":"be terse",
                "messages":[{"role":"user","content":"hi"}]}"#,
        );
        assert_eq!(out["model"], "gpt-4o");
        let messages = out["messages"].as_array().unwrap();
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[0]["content"], "be terse");
        assert_eq!(messages[1]["role"], "user");
        assert_eq!(out["max_tokens"], 100);
    }

    #[test]
    fn test_request_tool_use_becomes_tool_calls() {
        let out = translate(
            r#"{"model":"claude-3","max_tokens":10,"messages":[
                {"role":"assistant","content":[
                    {"type":"text","text":"checking"},
                    {"type":"tool_use","id":"tu_1","name":"lookup","input":{"q":"rust"}}
                ]},
                {"role":"user","content":[
                    {"type":"tool_result","tool_use_id":"tu_1","content":"found"}
                ]}
            ]}"#,
        );
        let messages = out["messages"].as_array().unwrap();
        assert_eq!(messages[0]["content"], "checking");
        assert_eq!(messages[0]["tool_calls"][0]["function"]["name"], "lookup");
        assert_eq!(messages[1]["role"], "tool");
        assert_eq!(messages[1]["tool_call_id"], "tu_1");
        assert_eq!(messages[1]["content"], "found");
    }

    #[test]
    fn test_request_tools_and_choice() {
        let out = translate(
            r#"{"model":"claude-3","max_tokens":10,
                "messages":[{"role":"user","content":"hi"}],
                "tools":[{"name":"f","description":"d","input_schema":{"type":"object"}}],
                "tool_choice":{"type":"tool","name":"f"},
                "stop_sequences":["END"]}"#,
        );
        assert_eq!(out["tools"][0]["function"]["name"], "f");
        assert_eq!(out["tool_choice"]["function"]["name"], "f");
        assert_eq!(out["stop"][0], "END");
    }

    #[test]
    fn test_request_image_block_to_data_url() {
        let out = translate(
            r#"{"model":"claude-3","max_tokens":10,"messages":[
                {"role":"user","content":[
                    {"type":"text","text":"look"},
                    {"type":"image","source":{"type":"base64","media_type":"image/png","data":"QUJD"}}
                ]}
            ]}"#,
        );
        let content = out["messages"][0]["content"].as_array().unwrap();
        assert_eq!(content[1]["type"], "image_url");
        assert_eq!(
            content[1]["image_url"]["url"],
            "data:image/png;base64,QUJD"
        );
    }

    #[test]
    fn test_non_stream_response() {
        let ctx = TransformCtx::new();
        let body = r#"{"id":"msg_1","model":"claude-3","content":[
            {"type":"text","text":"hello"},
            {"type":"tool_use","id":"tu_1","name":"f","input":{"a":1}}
        ],"stop_reason":"tool_use","usage":{"input_tokens":7,"output_tokens":3}}"#;
        let out = translate_non_stream(&ctx, "m", b"{}", b"{}", body.as_bytes()).unwrap();
        let value: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["object"], "chat.completion");
        assert_eq!(value["choices"][0]["message"]["content"], "hello");
        assert_eq!(
            value["choices"][0]["message"]["tool_calls"][0]["function"]["name"],
            "f"
        );
        assert_eq!(value["choices"][0]["finish_reason"], "tool_calls");
        assert_eq!(value["usage"]["total_tokens"], 10);
    }

    #[test]
    fn test_stream_sequence() {
        let ctx = TransformCtx::new();
        let mut carry = Carry::new();
        let mut chunk = |event: &str, data: &str| -> Vec<String> {
            translate_stream(
                &ctx,
                "m",
                b"{}",
                b"{}",
                Some(event),
                data.as_bytes(),
                &mut carry,
            )
            .unwrap()
        };

        let start = chunk(
            "message_start",
            r#"{"type":"message_start","message":{"id":"msg_1","model":"claude-3","usage":{"input_tokens":4}}}"#,
        );
        assert_eq!(start.len(), 1);
        assert!(start[0].contains("\"role\":\"assistant\""));
        assert!(start[0].contains("chatcmpl-msg_1"));

        chunk(
            "content_block_start",
            r#"{"type":"content_block_start","index":0,"content_block":{"type":"text","text":""}}"#,
        );
        let text = chunk(
            "content_block_delta",
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"hi"}}"#,
        );
        assert!(text[0].contains("\"content\":\"hi\""));

        let finish = chunk(
            "message_delta",
            r#"{"type":"message_delta","delta":{"stop_reason":"end_turn"},"usage":{"output_tokens":2}}"#,
        );
        assert!(finish[0].contains("\"finish_reason\":\"stop\""));
        assert!(finish[0].contains("\"total_tokens\":6"));

        let done = chunk("message_stop", r#"{"type":"message_stop"}"#);
        assert_eq!(done, vec!["[DONE]".to_string()]);
    }

    #[test]
    fn test_stream_tool_use_blocks() {
        let ctx = TransformCtx::new();
        let mut carry = Carry::new();
        let mut chunk = |event: &str, data: &str| -> Vec<String> {
            translate_stream(
                &ctx,
                "m",
                b"{}",
                b"{}",
                Some(event),
                data.as_bytes(),
                &mut carry,
            )
            .unwrap()
        };

        chunk(
            "message_start",
            r#"{"type":"message_start","message":{"id":"msg_1","model":"claude-3"}}"#,
        );
        let open = chunk(
            "content_block_start",
            r#"{"type":"content_block_start","index":0,"content_block":{"type":"tool_use","id":"tu_1","name":"f"}}"#,
        );
        assert!(open[0].contains("\"name\":\"f\""));

        let args = chunk(
            "content_block_delta",
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"input_json_delta","partial_json":"{\"x\":1}"}}"#,
        );
        assert!(args[0].contains("\"arguments\":\"{\\\"x\\\":1}\""));
    }

    #[test]
    fn test_ping_event_ignored() {
        let ctx = TransformCtx::new();
        let mut carry = Carry::new();
        let chunks = translate_stream(
            &ctx,
            "m",
            b"{}",
            b"{}",
            Some("ping"),
            br#"{"type":"ping"}"#,
            &mut carry,
        )
        .unwrap();
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_token_count_rendering() {
        let ctx = TransformCtx::new();
        let value: Value = serde_json::from_str(&render_token_count(&ctx, 9)).unwrap();
        assert_eq!(value["prompt_tokens"], 9);
        assert_eq!(value["total_tokens"], 9);
    }
}
