//! OpenAI-schema payloads rewritten into the Claude schema.
//!
//! The request side feeds Claude-speaking upstreams; the response side
//! serves Claude-speaking clients proxied to an OpenAI upstream.

use super::ChatStreamState;
use crate::{Carry, RequestTransform, ResponseTransform};
use rosetta_core::{Result, TransformCtx, TranslateError};
use serde_json::{Value, json};
use std::sync::Arc;

const DEFAULT_MAX_TOKENS: u64 = 8192;

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
// Request: OpenAI chat -> Claude messages
// ============================================================================

fn translate_request(model: &str, payload: &[u8], stream: bool) -> Result<Vec<u8>> {
    let req: Value = serde_json::from_slice(payload)?;

    let system_text = collect_system_text(&req);
    let messages = convert_messages(&req)?;

    let max_tokens = req
        .get("max_tokens")
        .or_else(|| req.get("max_completion_tokens"))
        .and_then(|v| v.as_u64())
        .unwrap_or(DEFAULT_MAX_TOKENS);

    let mut out = json!({
        "model": model,
        "messages": messages,
        "max_tokens": max_tokens,
    });

    if !system_text.is_empty() {
        out["system"] = Value::String(system_text);
    }
    for field in ["temperature", "top_p"] {
        if let Some(v) = req.get(field) {
            out[field] = v.clone();
        }
    }
    if let Some(stop) = req.get("stop") {
        match stop {
            Value::String(s) => out["stop_sequences"] = json!([s]),
            Value::Array(_) => out["stop_sequences"] = stop.clone(),
            _ => {}
        }
    }
    if let Some(tools) = convert_tools(&req) {
        out["tools"] = tools;
    }
    if let Some(tc) = req.get("tool_choice") {
        out["tool_choice"] = convert_tool_choice(tc);
    }
    if let Some(thinking) = req.get("thinking") {
        out["thinking"] = thinking.clone();
    }
    if stream {
        out["stream"] = Value::Bool(true);
    }

    serde_json::to_vec(&out).map_err(|e| TranslateError::Translation(e.to_string()))
}

/// System messages are top-level in the Claude schema; gather their text.
fn collect_system_text(req: &Value) -> String {
    let mut parts = Vec::new();
    if let Some(messages) = req.get("messages").and_then(|m| m.as_array()) {
        for msg in messages {
            if msg.get("role").and_then(|r| r.as_str()) != Some("system") {
                continue;
            }
            match msg.get("content") {
                Some(Value::String(s)) => parts.push(s.clone()),
                Some(Value::Array(blocks)) => {
                    for block in blocks {
                        if let Some(text) = block.get("text").and_then(|t| t.as_str()) {
                            parts.push(text.to_string());
                        }
                    }
                }
                _ => {}
            }
        }
    }
    parts.join("\n\n")
}

fn convert_messages(req: &Value) -> Result<Vec<Value>> {
    let messages = req
        .get("messages")
        .and_then(|m| m.as_array())
        .ok_or_else(|| TranslateError::Translation("missing messages field".to_string()))?;

    let mut out: Vec<Value> = Vec::new();
    for msg in messages {
        let role = msg.get("role").and_then(|r| r.as_str()).unwrap_or("");
        match role {
            "system" => {}
            "tool" => push_tool_result(&mut out, msg),
            "assistant" => out.push(convert_assistant_message(msg)),
            _ => out.push(json!({
                "role": "user",
                "content": convert_user_content(msg.get("content")),
            })),
        }
    }
    Ok(out)
}

/// A tool role message becomes a tool_result block on a user turn,
/// merged into the preceding user turn when possible.
fn push_tool_result(out: &mut Vec<Value>, msg: &Value) {
    let tool_result = json!({
        "type": "tool_result",
        "tool_use_id": msg.get("tool_call_id").and_then(|v| v.as_str()).unwrap_or(""),
        "content": msg.get("content").and_then(|c| c.as_str()).unwrap_or(""),
    });

    if let Some(last) = out.last_mut()
        && last.get("role").and_then(|r| r.as_str()) == Some("user")
        && let Some(blocks) = last.get_mut("content").and_then(|c| c.as_array_mut())
    {
        blocks.push(tool_result);
        return;
    }
    out.push(json!({"role": "user", "content": [tool_result]}));
}

fn convert_assistant_message(msg: &Value) -> Value {
    let mut blocks = Vec::new();
    if let Some(Value::String(s)) = msg.get("content")
        && !s.is_empty()
    {
        blocks.push(json!({"type": "text", "text": s}));
    }
    if let Some(tool_calls) = msg.get("tool_calls").and_then(|tc| tc.as_array()) {
        for tc in tool_calls {
            let arguments = tc
                .get("function")
                .and_then(|f| f.get("arguments"))
                .and_then(|a| a.as_str())
                .unwrap_or("{}");
            let input: Value = serde_json::from_str(arguments).unwrap_or_else(|_| json!({}));
            blocks.push(json!({
                "type": "tool_use",
                "id": tc.get("id").and_then(|v| v.as_str()).unwrap_or(""),
                "name": tc
                    .get("function")
                    .and_then(|f| f.get("name"))
                    .and_then(|n| n.as_str())
                    .unwrap_or(""),
                "input": input,
            }));
        }
    }
    if blocks.is_empty() {
        blocks.push(json!({"type": "text", "text": ""}));
    }
    json!({"role": "assistant", "content": blocks})
}

fn convert_user_content(content: Option<&Value>) -> Value {
    match content {
        Some(Value::String(s)) => Value::String(s.clone()),
        Some(Value::Array(parts)) => {
            let mut blocks = Vec::new();
            for part in parts {
                match part.get("type").and_then(|t| t.as_str()) {
                    Some("text") => blocks.push(json!({
                        "type": "text",
                        "text": part.get("text").and_then(|t| t.as_str()).unwrap_or(""),
                    })),
                    Some("image_url") => {
                        let url = part
                            .get("image_url")
                            .and_then(|u| u.get("url"))
                            .and_then(|u| u.as_str())
                            .unwrap_or("");
                        blocks.push(convert_image_url(url));
                    }
                    _ => {}
                }
            }
            Value::Array(blocks)
        }
        _ => Value::String(String::new()),
    }
}

fn convert_image_url(url: &str) -> Value {
    // data:image/png;base64,<data> -> base64 source; anything else -> url source
    if let Some(rest) = url.strip_prefix("data:")
        && let Some((meta, data)) = rest.split_once(',')
    {
        let media_type = meta.split(';').next().unwrap_or("image/png");
        return json!({
            "type": "image",
            "source": {"type": "base64", "media_type": media_type, "data": data},
        });
    }
    json!({"type": "image", "source": {"type": "url", "url": url}})
}

fn convert_tools(req: &Value) -> Option<Value> {
    let tools = req.get("tools")?.as_array()?;
    let converted: Vec<Value> = tools
        .iter()
        .filter_map(|tool| {
            let func = tool.get("function")?;
            Some(json!({
                "name": func.get("name")?.as_str()?,
                "description": func.get("description").and_then(|d| d.as_str()).unwrap_or(""),
                "input_schema": func
                    .get("parameters")
                    .cloned()
                    .unwrap_or_else(|| json!({"type": "object", "properties": {}})),
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
    match tc {
        Value::String(s) => match s.as_str() {
            "none" => json!({"type": "none"}),
            "required" => json!({"type": "any"}),
            _ => json!({"type": "auto"}),
        },
        Value::Object(obj) => {
            if let Some(name) = obj
                .get("function")
                .and_then(|f| f.get("name"))
                .and_then(|n| n.as_str())
            {
                return json!({"type": "tool", "name": name});
            }
            json!({"type": "auto"})
        }
        _ => json!({"type": "auto"}),
    }
}

// ============================================================================
// Response: OpenAI chat completion -> Claude message
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
        "msg_{}",
        resp.get("id").and_then(|v| v.as_str()).unwrap_or("unknown")
    );
    let model = resp
        .get("model")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown");
    let choice = resp
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|arr| arr.first());
    let message = choice.and_then(|c| c.get("message"));

    let mut content = Vec::new();
    if let Some(text) = message
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        && !text.is_empty()
    {
        content.push(json!({"type": "text", "text": text}));
    }
    if let Some(tool_calls) = message
        .and_then(|m| m.get("tool_calls"))
        .and_then(|tc| tc.as_array())
    {
        for tc in tool_calls {
            let arguments = tc
                .get("function")
                .and_then(|f| f.get("arguments"))
                .and_then(|a| a.as_str())
                .unwrap_or("{}");
            let input: Value = serde_json::from_str(arguments).unwrap_or_else(|_| json!({}));
            content.push(json!({
                "type": "tool_use",
                "id": tc.get("id").and_then(|v| v.as_str()).unwrap_or(""),
                "name": tc
                    .get("function")
                    .and_then(|f| f.get("name"))
                    .and_then(|n| n.as_str())
                    .unwrap_or(""),
                "input": input,
            }));
        }
    }

    let stop_reason = match choice
        .and_then(|c| c.get("finish_reason"))
        .and_then(|v| v.as_str())
    {
        Some("length") => "max_tokens",
        Some("tool_calls") => "tool_use",
        _ => "end_turn",
    };

    let mut out = json!({
        "id": id,
        "type": "message",
        "role": "assistant",
        "model": model,
        "content": content,
        "stop_reason": stop_reason,
        "stop_sequence": null,
    });

    if let Some(usage) = resp.get("usage") {
        out["usage"] = json!({
            "input_tokens": usage.get("prompt_tokens").and_then(|v| v.as_u64()).unwrap_or(0),
            "output_tokens": usage.get("completion_tokens").and_then(|v| v.as_u64()).unwrap_or(0),
        });
    }

    serde_json::to_string(&out).map_err(|e| TranslateError::Translation(e.to_string()))
}

// ============================================================================
// Response stream: OpenAI chunks -> Claude SSE events
// ============================================================================

/// Claude's stream protocol is event-typed, so chunks are emitted as
/// complete `event:`/`data:` blocks.
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
    let mut events = Vec::new();

    let chunk: Value = serde_json::from_slice(data)?;

    if !state.message_started {
        state.message_started = true;
        state.response_id = format!(
            "msg_{}",
            chunk.get("id").and_then(|v| v.as_str()).unwrap_or("stream")
        );
        state.model = chunk
            .get("model")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_string();
        state.current_content_index = -1;
        events.push(sse_event(
            "message_start",
            &json!({
                "type": "message_start",
                "message": {
                    "id": state.response_id,
                    "type": "message",
                    "role": "assistant",
                    "model": state.model,
                    "content": [],
                    "stop_reason": null,
                    "usage": {"input_tokens": 0, "output_tokens": 0},
                },
            }),
        )?);
    }

    let choice = chunk
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|arr| arr.first());
    let delta = choice.and_then(|c| c.get("delta"));

    if let Some(text) = delta.and_then(|d| d.get("content")).and_then(|c| c.as_str())
        && !text.is_empty()
    {
        if !state.text_block_open {
            close_open_block(state, &mut events)?;
            state.current_content_index += 1;
            state.text_block_open = true;
            events.push(sse_event(
                "content_block_start",
                &json!({
                    "type": "content_block_start",
                    "index": state.current_content_index,
                    "content_block": {"type": "text", "text": ""},
                }),
            )?);
        }
        events.push(sse_event(
            "content_block_delta",
            &json!({
                "type": "content_block_delta",
                "index": state.current_content_index,
                "delta": {"type": "text_delta", "text": text},
            }),
        )?);
    }

    if let Some(tool_calls) = delta.and_then(|d| d.get("tool_calls")).and_then(|t| t.as_array()) {
        for tc in tool_calls {
            // A chunk carrying id+name opens a new tool_use block; argument
            // fragments stream as input_json_delta.
            if let Some(name) = tc
                .get("function")
                .and_then(|f| f.get("name"))
                .and_then(|n| n.as_str())
            {
                close_open_block(state, &mut events)?;
                state.current_content_index += 1;
                state.tool_block_open = true;
                events.push(sse_event(
                    "content_block_start",
                    &json!({
                        "type": "content_block_start",
                        "index": state.current_content_index,
                        "content_block": {
                            "type": "tool_use",
                            "id": tc.get("id").and_then(|v| v.as_str()).unwrap_or(""),
                            "name": name,
                            "input": {},
                        },
                    }),
                )?);
            }
            if let Some(arguments) = tc
                .get("function")
                .and_then(|f| f.get("arguments"))
                .and_then(|a| a.as_str())
                && !arguments.is_empty()
            {
                events.push(sse_event(
                    "content_block_delta",
                    &json!({
                        "type": "content_block_delta",
                        "index": state.current_content_index,
                        "delta": {"type": "input_json_delta", "partial_json": arguments},
                    }),
                )?);
            }
        }
    }

    if let Some(usage) = chunk.get("usage") {
        state.input_tokens = usage
            .get("prompt_tokens")
            .and_then(|v| v.as_u64())
            .unwrap_or(state.input_tokens);
        state.output_tokens = usage
            .get("completion_tokens")
            .and_then(|v| v.as_u64())
            .unwrap_or(state.output_tokens);
    }

    if let Some(finish) = choice
        .and_then(|c| c.get("finish_reason"))
        .and_then(|f| f.as_str())
    {
        let stop_reason = match finish {
            "length" => "max_tokens",
            "tool_calls" => "tool_use",
            _ => "end_turn",
        };
        close_open_block(state, &mut events)?;
        events.push(sse_event(
            "message_delta",
            &json!({
                "type": "message_delta",
                "delta": {"stop_reason": stop_reason, "stop_sequence": null},
                "usage": {"output_tokens": state.output_tokens},
            }),
        )?);
        events.push(sse_event("message_stop", &json!({"type": "message_stop"}))?);
    }

    Ok(events)
}

fn close_open_block(state: &mut ChatStreamState, events: &mut Vec<String>) -> Result<()> {
    if state.text_block_open || state.tool_block_open {
        events.push(sse_event(
            "content_block_stop",
            &json!({
                "type": "content_block_stop",
                "index": state.current_content_index,
            }),
        )?);
        state.text_block_open = false;
        state.tool_block_open = false;
    }
    Ok(())
}

fn sse_event(event: &str, data: &Value) -> Result<String> {
    Ok(format!("event: {event}\ndata: {}", serde_json::to_string(data)?))
}

fn render_token_count(_ctx: &TransformCtx, count: u64) -> String {
    json!({"input_tokens": count}).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn translate(payload: &str, stream: bool) -> Value {
        let out = translate_request("claude-3-opus", payload.as_bytes(), stream).unwrap();
        serde_json::from_slice(&out).unwrap()
    }

    #[test]
    fn test_request_basic_shape() {
        let out = translate(
            r#"{"model":"gpt-4","messages":[
                {"role":"system","content":"be helpful"},
                {"role":"user","content":"hi"}
            ],"temperature":0.7,"max_tokens":100}"#,
            false,
        );
        assert_eq!(out["model"], "claude-3-opus");
        assert_eq!(out["system"], "be helpful");
        assert_eq!(out["max_tokens"], 100);
        assert_eq!(out["temperature"], 0.7);
        assert_eq!(out["messages"].as_array().unwrap().len(), 1);
        assert_eq!(out["messages"][0]["role"], "user");
    }

    #[test]
    fn test_request_default_max_tokens() {
        let out = translate(r#"{"model":"gpt-4","messages":[{"role":"user","content":"hi"}]}"#, false);
        assert_eq!(out["max_tokens"], DEFAULT_MAX_TOKENS);
    }

    #[test]
    fn test_request_stream_flag() {
        let out = translate(r#"{"model":"gpt-4","messages":[{"role":"user","content":"hi"}]}"#, true);
        assert_eq!(out["stream"], true);
    }

    #[test]
    fn test_request_tool_calls_become_tool_use() {
        let out = translate(
            r#"{"model":"gpt-4","messages":[
                {"role":"assistant","content":null,"tool_calls":[
                    {"id":"call_1","type":"function","function":{"name":"get_weather","arguments":"{\"city\":\"SF\"}"}}
                ]},
                {"role":"tool","tool_call_id":"call_1","content":"sunny"}
            ]}"#,
            false,
        );
        let messages = out["messages"].as_array().unwrap();
        assert_eq!(messages[0]["content"][0]["type"], "tool_use");
        assert_eq!(messages[0]["content"][0]["input"]["city"], "SF");
        assert_eq!(messages[1]["role"], "user");
        assert_eq!(messages[1]["content"][0]["type"], "tool_result");
        assert_eq!(messages[1]["content"][0]["tool_use_id"], "call_1");
    }

    #[test]
    fn test_request_tools_converted() {
        let out = translate(
            r#"{"model":"gpt-4","messages":[{"role":"user","content":"hi"}],
                "tools":[{"type":"function","function":{"name":"f","description":"d","parameters":{"type":"object"}}}],
                "tool_choice":"required"}"#,
            false,
        );
        assert_eq!(out["tools"][0]["name"], "f");
        assert!(out["tools"][0]["input_schema"].is_object());
        assert_eq!(out["tool_choice"]["type"], "any");
    }

    #[test]
    fn test_request_image_data_url() {
        let out = translate(
            r#"{"model":"gpt-4","messages":[{"role":"user","content":[
                {"type":"text","text":"what is this"},
                {"type":"image_url","image_url":{"url":"data:image/jpeg;base64,QUJD"}}
            ]}]}"#,
            false,
        );
        let blocks = out["messages"][0]["content"].as_array().unwrap();
        assert_eq!(blocks[1]["type"], "image");
        assert_eq!(blocks[1]["source"]["media_type"], "image/jpeg");
        assert_eq!(blocks[1]["source"]["data"], "QUJD");
    }

    #[test]
    fn test_non_stream_response() {
        let ctx = TransformCtx::new();
        let body = r#"{"id":"chatcmpl-1","model":"gpt-4","choices":[{
            "index":0,
            "message":{"role":"assistant","content":"hello","tool_calls":[
                {"id":"call_9","type":"function","function":{"name":"f","arguments":"{\"a\":1}"}}
            ]},
            "finish_reason":"tool_calls"
        }],"usage":{"prompt_tokens":10,"completion_tokens":5}}"#;
        let out = translate_non_stream(&ctx, "m", b"{}", b"{}", body.as_bytes()).unwrap();
        let value: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["type"], "message");
        assert_eq!(value["content"][0]["type"], "text");
        assert_eq!(value["content"][1]["type"], "tool_use");
        assert_eq!(value["content"][1]["input"]["a"], 1);
        assert_eq!(value["stop_reason"], "tool_use");
        assert_eq!(value["usage"]["input_tokens"], 10);
    }

    #[test]
    fn test_stream_sequence() {
        let ctx = TransformCtx::new();
        let mut carry = Carry::new();
        let mut chunk = |data: &str| -> Vec<String> {
            translate_stream(&ctx, "m", b"{}", b"{}", None, data.as_bytes(), &mut carry).unwrap()
        };

        let first = chunk(
            r#"{"id":"c1","model":"gpt-4","choices":[{"index":0,"delta":{"role":"assistant","content":"Hel"},"finish_reason":null}]}"#,
        );
        // message_start + content_block_start + first text delta
        assert_eq!(first.len(), 3);
        assert!(first[0].starts_with("event: message_start"));
        assert!(first[1].starts_with("event: content_block_start"));
        assert!(first[2].contains("text_delta"));

        let middle = chunk(
            r#"{"id":"c1","model":"gpt-4","choices":[{"index":0,"delta":{"content":"lo"},"finish_reason":null}]}"#,
        );
        assert_eq!(middle.len(), 1);
        assert!(middle[0].contains("\"text\":\"lo\""));

        let last = chunk(
            r#"{"id":"c1","model":"gpt-4","choices":[{"index":0,"delta":{},"finish_reason":"stop"}],"usage":{"prompt_tokens":3,"completion_tokens":2}}"#,
        );
        // content_block_stop + message_delta + message_stop
        assert_eq!(last.len(), 3);
        assert!(last[0].starts_with("event: content_block_stop"));
        assert!(last[1].contains("\"stop_reason\":\"end_turn\""));
        assert!(last[1].contains("\"output_tokens\":2"));
        assert!(last[2].starts_with("event: message_stop"));
    }

    #[test]
    fn test_stream_tool_call_blocks() {
        let ctx = TransformCtx::new();
        let mut carry = Carry::new();
        let mut chunk = |data: &str| -> Vec<String> {
            translate_stream(&ctx, "m", b"{}", b"{}", None, data.as_bytes(), &mut carry).unwrap()
        };

        chunk(r#"{"id":"c1","model":"gpt-4","choices":[{"index":0,"delta":{"role":"assistant"},"finish_reason":null}]}"#);
        let open = chunk(
            r#"{"id":"c1","model":"gpt-4","choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"id":"call_1","function":{"name":"f","arguments":""}}]},"finish_reason":null}]}"#,
        );
        assert!(open.iter().any(|e| e.contains("tool_use")));

        let args = chunk(
            r#"{"id":"c1","model":"gpt-4","choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"x\":"}}]},"finish_reason":null}]}"#,
        );
        assert!(args[0].contains("input_json_delta"));
    }

    #[test]
    fn test_token_count_rendering() {
        let ctx = TransformCtx::new();
        let out = render_token_count(&ctx, 17);
        let value: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["input_tokens"], 17);
    }
}
