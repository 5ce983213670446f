//! OpenAI-schema payloads rewritten into the Gemini schema.
//!
//! The request side feeds Gemini-speaking upstreams; the response side
//! serves Gemini-speaking clients proxied to an OpenAI upstream.

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
// Request: OpenAI chat -> Gemini generateContent
// ============================================================================

// The model is carried in the URL for Gemini, not the body.
fn translate_request(_model: &str, payload: &[u8], _stream: bool) -> Result<Vec<u8>> {
    let req: Value = serde_json::from_slice(payload)?;

    let mut out = json!({
        "contents": convert_messages(&req)?,
    });
    if let Some(si) = system_instruction(&req) {
        out["systemInstruction"] = si;
    }
    if let Some(config) = generation_config(&req) {
        out["generationConfig"] = config;
    }
    if let Some(tools) = convert_tools(&req) {
        out["tools"] = tools;
    }

    serde_json::to_vec(&out).map_err(|e| TranslateError::Translation(e.to_string()))
}

fn system_instruction(req: &Value) -> Option<Value> {
    let messages = req.get("messages")?.as_array()?;
    let mut parts = Vec::new();
    for msg in messages {
        if msg.get("role").and_then(|r| r.as_str()) != Some("system") {
            continue;
        }
        match msg.get("content") {
            Some(Value::String(s)) => parts.push(json!({"text": s})),
            Some(Value::Array(blocks)) => {
                for block in blocks {
                    if let Some(text) = block.get("text").and_then(|t| t.as_str()) {
                        parts.push(json!({"text": text}));
                    }
                }
            }
            _ => {}
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(json!({"parts": parts}))
    }
}

fn convert_messages(req: &Value) -> Result<Vec<Value>> {
    let messages = req
        .get("messages")
        .and_then(|m| m.as_array())
        .ok_or_else(|| TranslateError::Translation("missing messages field".to_string()))?;

    let mut contents: Vec<Value> = Vec::new();
    for msg in messages {
        let role = msg.get("role").and_then(|r| r.as_str()).unwrap_or("");
        match role {
            "system" => {}
            "tool" => push_function_response(&mut contents, msg),
            _ => {
                let gemini_role = if role == "assistant" { "model" } else { "user" };
                let parts = message_parts(msg);
                // Consecutive same-role turns merge into one content entry.
                if let Some(last) = contents.last_mut()
                    && last.get("role").and_then(|r| r.as_str()) == Some(gemini_role)
                    && let Some(existing) =
                        last.get_mut("parts").and_then(|p| p.as_array_mut())
                {
                    existing.extend(parts);
                    continue;
                }
                contents.push(json!({"role": gemini_role, "parts": parts}));
            }
        }
    }
    Ok(contents)
}

fn push_function_response(contents: &mut Vec<Value>, msg: &Value) {
    let name = msg
        .get("name")
        .and_then(|n| n.as_str())
        .unwrap_or("function");
    let content_text = msg.get("content").and_then(|c| c.as_str()).unwrap_or("");
    let response = serde_json::from_str::<Value>(content_text)
        .unwrap_or_else(|_| json!({"result": content_text}));
    let part = json!({"functionResponse": {"name": name, "response": response}});

    if let Some(last) = contents.last_mut()
        && last.get("role").and_then(|r| r.as_str()) == Some("user")
        && let Some(parts) = last.get_mut("parts").and_then(|p| p.as_array_mut())
    {
        parts.push(part);
        return;
    }
    contents.push(json!({"role": "user", "parts": [part]}));
}

fn message_parts(msg: &Value) -> Vec<Value> {
    let mut parts = Vec::new();
    match msg.get("content") {
        Some(Value::String(s)) => parts.push(json!({"text": s})),
        Some(Value::Array(blocks)) => {
            for block in blocks {
                match block.get("type").and_then(|t| t.as_str()) {
                    Some("text") => parts.push(json!({
                        "text": block.get("text").and_then(|t| t.as_str()).unwrap_or(""),
                    })),
                    Some("image_url") => {
                        let url = block
                            .get("image_url")
                            .and_then(|u| u.get("url"))
                            .and_then(|u| u.as_str())
                            .unwrap_or("");
                        parts.push(inline_image(url));
                    }
                    _ => {}
                }
            }
        }
        _ => {}
    }

    if let Some(tool_calls) = msg.get("tool_calls").and_then(|tc| tc.as_array()) {
        for tc in tool_calls {
            let arguments = tc
                .get("function")
                .and_then(|f| f.get("arguments"))
                .and_then(|a| a.as_str())
                .unwrap_or("{}");
            let args: Value = serde_json::from_str(arguments).unwrap_or_else(|_| json!({}));
            parts.push(json!({
                "functionCall": {
                    "name": tc
                        .get("function")
                        .and_then(|f| f.get("name"))
                        .and_then(|n| n.as_str())
                        .unwrap_or(""),
                    "args": args,
                }
            }));
        }
    }

    if parts.is_empty() {
        parts.push(json!({"text": ""}));
    }
    parts
}

fn inline_image(url: &str) -> Value {
    if let Some(rest) = url.strip_prefix("data:")
        && let Some((meta, data)) = rest.split_once(',')
    {
        let mime_type = meta.split(';').next().unwrap_or("image/png");
        return json!({"inlineData": {"mimeType": mime_type, "data": data}});
    }
    // Remote URLs cannot be inlined; keep a text reference.
    json!({"text": format!("[image: {url}]")})
}

fn convert_tools(req: &Value) -> Option<Value> {
    let tools = req.get("tools")?.as_array()?;
    let declarations: Vec<Value> = tools
        .iter()
        .filter_map(|tool| {
            let func = tool.get("function")?;
            let mut decl = json!({
                "name": func.get("name").and_then(|n| n.as_str()).unwrap_or(""),
                "description": func.get("description").and_then(|d| d.as_str()).unwrap_or(""),
            });
            if let Some(params) = func.get("parameters") {
                decl["parameters"] = params.clone();
            }
            Some(decl)
        })
        .collect();
    if declarations.is_empty() {
        None
    } else {
        Some(json!([{"functionDeclarations": declarations}]))
    }
}

fn generation_config(req: &Value) -> Option<Value> {
    let mut config = serde_json::Map::new();
    if let Some(v) = req.get("temperature") {
        config.insert("temperature".into(), v.clone());
    }
    if let Some(v) = req.get("top_p") {
        config.insert("topP".into(), v.clone());
    }
    if let Some(v) = req.get("max_tokens").or_else(|| req.get("max_completion_tokens")) {
        config.insert("maxOutputTokens".into(), v.clone());
    }
    match req.get("stop") {
        Some(Value::String(s)) => {
            config.insert("stopSequences".into(), json!([s]));
        }
        Some(Value::Array(arr)) => {
            config.insert("stopSequences".into(), json!(arr));
        }
        _ => {}
    }
    if config.is_empty() {
        None
    } else {
        Some(Value::Object(config))
    }
}

// ============================================================================
// Response: OpenAI chat completion -> Gemini generateContent response
// ============================================================================

fn translate_non_stream(
    _ctx: &TransformCtx,
    _model: &str,
    _original_request: &[u8],
    _translated_request: &[u8],
    body: &[u8],
) -> Result<String> {
    let resp: Value = serde_json::from_slice(body)?;

    let choice = resp
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|arr| arr.first());
    let message = choice.and_then(|c| c.get("message"));

    let parts = response_parts(
        message.and_then(|m| m.get("content")).and_then(|c| c.as_str()),
        message.and_then(|m| m.get("tool_calls")).and_then(|t| t.as_array()),
    );
    let finish = map_finish_reason(
        choice
            .and_then(|c| c.get("finish_reason"))
            .and_then(|v| v.as_str()),
    );

    let mut out = json!({
        "candidates": [{
            "content": {"role": "model", "parts": parts},
            "finishReason": finish,
            "index": 0,
        }],
        "modelVersion": resp.get("model").and_then(|v| v.as_str()).unwrap_or("unknown"),
    });

    if let Some(usage) = resp.get("usage") {
        let prompt = usage.get("prompt_tokens").and_then(|v| v.as_u64()).unwrap_or(0);
        let completion = usage
            .get("completion_tokens")
            .and_then(|v| v.as_u64())
            .unwrap_or(0);
        out["usageMetadata"] = json!({
            "promptTokenCount": prompt,
            "candidatesTokenCount": completion,
            "totalTokenCount": prompt + completion,
        });
    }

    serde_json::to_string(&out).map_err(|e| TranslateError::Translation(e.to_string()))
}

fn response_parts(content: Option<&str>, tool_calls: Option<&Vec<Value>>) -> Vec<Value> {
    let mut parts = Vec::new();
    if let Some(text) = content
        && !text.is_empty()
    {
        parts.push(json!({"text": text}));
    }
    if let Some(tool_calls) = tool_calls {
        for tc in tool_calls {
            let arguments = tc
                .get("function")
                .and_then(|f| f.get("arguments"))
                .and_then(|a| a.as_str())
                .unwrap_or("{}");
            let args: Value = serde_json::from_str(arguments).unwrap_or_else(|_| json!({}));
            parts.push(json!({
                "functionCall": {
                    "name": tc
                        .get("function")
                        .and_then(|f| f.get("name"))
                        .and_then(|n| n.as_str())
                        .unwrap_or(""),
                    "args": args,
                }
            }));
        }
    }
    if parts.is_empty() {
        parts.push(json!({"text": ""}));
    }
    parts
}

fn map_finish_reason(finish: Option<&str>) -> &'static str {
    match finish {
        Some("length") => "MAX_TOKENS",
        Some("content_filter") => "SAFETY",
        _ => "STOP",
    }
}

/// Gemini streaming responses are self-contained chunks; there is no
/// role preamble and no end-of-stream sentinel.
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
    let chunk: Value = serde_json::from_slice(data)?;

    if state.model.is_empty()
        && let Some(model) = chunk.get("model").and_then(|v| v.as_str())
    {
        state.model = model.to_string();
    }

    let choice = chunk
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|arr| arr.first());
    let delta = choice.and_then(|c| c.get("delta"));

    let mut parts = Vec::new();
    if let Some(text) = delta.and_then(|d| d.get("content")).and_then(|c| c.as_str())
        && !text.is_empty()
    {
        parts.push(json!({"text": text}));
    }
    if let Some(tool_calls) = delta.and_then(|d| d.get("tool_calls")).and_then(|t| t.as_array()) {
        for tc in tool_calls {
            if let Some(name) = tc
                .get("function")
                .and_then(|f| f.get("name"))
                .and_then(|n| n.as_str())
            {
                let arguments = tc
                    .get("function")
                    .and_then(|f| f.get("arguments"))
                    .and_then(|a| a.as_str())
                    .unwrap_or("{}");
                let args: Value =
                    serde_json::from_str(arguments).unwrap_or_else(|_| json!({}));
                parts.push(json!({"functionCall": {"name": name, "args": args}}));
            }
        }
    }

    let finish = choice
        .and_then(|c| c.get("finish_reason"))
        .and_then(|v| v.as_str());
    if parts.is_empty() && finish.is_none() {
        return Ok(vec![]);
    }

    let mut candidate = json!({
        "content": {"role": "model", "parts": parts},
        "index": 0,
    });
    if let Some(finish) = finish {
        candidate["finishReason"] = json!(map_finish_reason(Some(finish)));
    }

    let mut out = json!({
        "candidates": [candidate],
        "modelVersion": state.model,
    });
    if let Some(usage) = chunk.get("usage") {
        let prompt = usage.get("prompt_tokens").and_then(|v| v.as_u64()).unwrap_or(0);
        let completion = usage
            .get("completion_tokens")
            .and_then(|v| v.as_u64())
            .unwrap_or(0);
        out["usageMetadata"] = json!({
            "promptTokenCount": prompt,
            "candidatesTokenCount": completion,
            "totalTokenCount": prompt + completion,
        });
    }

    Ok(vec![serde_json::to_string(&out)
        .map_err(|e| TranslateError::Translation(e.to_string()))?])
}

fn render_token_count(_ctx: &TransformCtx, count: u64) -> String {
    json!({"totalTokens": count}).to_string()
}
