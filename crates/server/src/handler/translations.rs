use crate::AppState;
use axum::Json;
use axum::extract::{Query, State};
use axum::http::header;
use axum::response::IntoResponse;
use bytes::Bytes;
use rosetta_core::{Format, TranslateError};
use rosetta_translator::{compare_json_structures, score_translation};
use serde_json::{Value, json};
use std::collections::HashMap;

/// GET /v1/translations?details=bool — compatibility matrix and formats.
pub async fn list_translations(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let matrix = state.registry.compatibility_matrix();
    let formats = state.registry.supported_formats();
    let total_translations: usize = matrix.values().map(|v| v.len()).sum();

    let mut body = json!({
        "matrix": matrix,
        "formats": formats,
        "total_translations": total_translations,
    });
    if params.get("details").map(|v| v == "true").unwrap_or(false) {
        body["details"] = serde_json::to_value(state.registry.all_translations())
            .unwrap_or(Value::Null);
    }
    Json(body)
}

/// GET /v1/translations/check?from=X&to=Y — is a pair translatable,
/// directly or via a fallback chain. Missing parameters are a 400;
/// "not supported" is a 200 with data.
pub async fn check_translation(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>, TranslateError> {
    let from = params
        .get("from")
        .filter(|s| !s.is_empty())
        .ok_or_else(|| TranslateError::BadRequest("missing 'from' parameter".to_string()))?;
    let to = params
        .get("to")
        .filter(|s| !s.is_empty())
        .ok_or_else(|| TranslateError::BadRequest("missing 'to' parameter".to_string()))?;

    let from = Format::parse(from);
    let to = Format::parse(to);

    if from == to {
        return Ok(Json(json!({
            "supported": true,
            "fallback": true,
            "from": from,
            "to": to,
        })));
    }

    let supported = state.registry.is_translation_supported(&from, &to);
    let fallback = state.fallback.get_chain(&from, &to).is_some();

    let mut body = json!({
        "supported": supported,
        "fallback": fallback,
        "from": from,
        "to": to,
    });
    if supported {
        body["info"] = serde_json::to_value(state.registry.translation_info(&from, &to))
            .unwrap_or(Value::Null);
    } else if let Some(alternatives) = state
        .registry
        .compatibility_matrix()
        .get(from.as_str())
    {
        body["alternatives"] = json!(alternatives);
    }
    Ok(Json(body))
}

/// GET /v1/translations/docs?format={markdown|mermaid|summary} — generated
/// documentation. Unknown values fall back to markdown.
pub async fn translation_docs(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let format = params.get("format").map(String::as_str).unwrap_or("markdown");
    let (content_type, body) = match format {
        "mermaid" => (
            "text/plain; charset=utf-8",
            state.registry.generate_mermaid_diagram(),
        ),
        "summary" => ("text/plain; charset=utf-8", state.registry.generate_summary()),
        _ => (
            "text/markdown; charset=utf-8",
            state.registry.generate_markdown_docs(),
        ),
    };
    ([(header::CONTENT_TYPE, content_type)], body)
}

/// POST /v1/translations/score — quality report for a before/after pair.
pub async fn score(body: Bytes) -> Result<Json<Value>, TranslateError> {
    let req: Value = serde_json::from_slice(&body)
        .map_err(|e| TranslateError::BadRequest(e.to_string()))?;

    let from = Format::parse(req.get("from").and_then(|v| v.as_str()).unwrap_or(""));
    let to = Format::parse(req.get("to").and_then(|v| v.as_str()).unwrap_or(""));
    let before = payload_bytes(req.get("before"))?;
    let after = payload_bytes(req.get("after"))?;

    let report = score_translation(&from, &to, &before, &after);
    Ok(Json(serde_json::to_value(report)?))
}

/// POST /v1/translations/compare — per-path structure diff. Malformed
/// JSON in either payload is a 400.
pub async fn compare(body: Bytes) -> Result<Json<Value>, TranslateError> {
    let req: Value = serde_json::from_slice(&body)
        .map_err(|e| TranslateError::BadRequest(e.to_string()))?;

    let before = payload_bytes(req.get("before"))?;
    let after = payload_bytes(req.get("after"))?;

    let comparison = compare_json_structures(&before, &after)
        .map_err(|e| TranslateError::BadRequest(e.to_string()))?;
    Ok(Json(serde_json::to_value(comparison)?))
}

/// Payloads arrive either as embedded JSON values or as JSON-encoded
/// strings; normalize to bytes.
fn payload_bytes(value: Option<&Value>) -> Result<Vec<u8>, TranslateError> {
    match value {
        Some(Value::String(s)) => Ok(s.clone().into_bytes()),
        Some(v) => Ok(serde_json::to_vec(v)?),
        None => Err(TranslateError::BadRequest(
            "missing payload field".to_string(),
        )),
    }
}
