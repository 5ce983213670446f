//! Translation quality scoring, structural comparison, and roundtrip
//! checks.

use crate::registry::Registry;
use rosetta_core::{Format, Result};
use serde_json::Value;
use std::collections::BTreeSet;

/// Fields whose loss during translation is always worth flagging.
const CRITICAL_FIELDS: [&str; 4] = ["model", "messages", "contents", "tools"];

// ============================================================================
// Quality scoring
// ============================================================================

#[derive(Debug, Clone, serde::Serialize)]
pub struct QualityReport {
    /// In [0, 1].
    pub score: f64,
    pub fields_mapped: usize,
    pub fields_dropped: usize,
    pub fields_added: usize,
    pub dropped_fields: Vec<String>,
    pub added_fields: Vec<String>,
    pub warnings: Vec<String>,
}

/// Score how much structure survived a translation by comparing the leaf
/// paths of the two payloads.
///
/// `score = mapped / (mapped + dropped + 0.5 * added)`, with edge rules:
/// two empty payloads score 1.0; an empty source with additions scores 0.5.
/// Parse failures score 0 with a warning.
pub fn score_translation(
    from: &Format,
    to: &Format,
    before: &[u8],
    after: &[u8],
) -> QualityReport {
    let parsed_before: Option<Value> = serde_json::from_slice(before).ok();
    let parsed_after: Option<Value> = serde_json::from_slice(after).ok();
    let (Some(before_val), Some(after_val)) = (parsed_before, parsed_after) else {
        return QualityReport {
            score: 0.0,
            fields_mapped: 0,
            fields_dropped: 0,
            fields_added: 0,
            dropped_fields: vec![],
            added_fields: vec![],
            warnings: vec![format!("{from}->{to}: payload is not valid JSON")],
        };
    };

    let before_paths = leaf_paths(&before_val);
    let after_paths = leaf_paths(&after_val);

    let mapped = before_paths.intersection(&after_paths).count();
    let dropped_fields: Vec<String> = before_paths.difference(&after_paths).cloned().collect();
    let added_fields: Vec<String> = after_paths.difference(&before_paths).cloned().collect();
    let dropped = dropped_fields.len();
    let added = added_fields.len();

    let score = if before_paths.is_empty() {
        if added == 0 { 1.0 } else { 0.5 }
    } else {
        mapped as f64 / (mapped as f64 + dropped as f64 + 0.5 * added as f64)
    };

    let mut warnings = Vec::new();
    for critical in CRITICAL_FIELDS {
        if dropped_fields
            .iter()
            .any(|p| p == critical || p.starts_with(&format!("{critical}.")) || p.starts_with(&format!("{critical}[")))
        {
            warnings.push(format!("critical field dropped: {critical}"));
        }
    }
    if score < 0.6 {
        warnings.push(format!("low translation fidelity: {score:.2}"));
    }

    QualityReport {
        score,
        fields_mapped: mapped,
        fields_dropped: dropped,
        fields_added: added,
        dropped_fields,
        added_fields,
        warnings,
    }
}

/// Collect every leaf path in dotted notation, `[i]` for array indexes.
fn leaf_paths(value: &Value) -> BTreeSet<String> {
    let mut paths = BTreeSet::new();
    collect_paths(value, String::new(), &mut paths);
    paths
}

fn collect_paths(value: &Value, prefix: String, out: &mut BTreeSet<String>) {
    match value {
        Value::Object(map) if !map.is_empty() => {
            for (k, v) in map {
                let path = if prefix.is_empty() {
                    k.clone()
                } else {
                    format!("{prefix}.{k}")
                };
                collect_paths(v, path, out);
            }
        }
        Value::Array(items) if !items.is_empty() => {
            for (i, v) in items.iter().enumerate() {
                collect_paths(v, format!("{prefix}[{i}]"), out);
            }
        }
        _ => {
            if !prefix.is_empty() {
                out.insert(prefix);
            }
        }
    }
}

// ============================================================================
// Structural comparison
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffType {
    Added,
    Removed,
    TypeChanged,
    ValueChanged,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct StructureDiff {
    pub path: String,
    pub diff_type: DiffType,
    pub source_type: String,
    pub target_type: String,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct StructureComparison {
    pub source_type: String,
    pub target_type: String,
    pub diffs: Vec<StructureDiff>,
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Object(_) => "object",
        Value::Array(_) => "array",
        Value::String(_) => "string",
        Value::Number(_) => "number",
        Value::Bool(_) => "boolean",
    }
}

/// Recursive walk producing per-path diffs. Malformed JSON on either side
/// is an error (the HTTP adapter maps it to 400).
pub fn compare_json_structures(before: &[u8], after: &[u8]) -> Result<StructureComparison> {
    let before_val: Value = serde_json::from_slice(before)?;
    let after_val: Value = serde_json::from_slice(after)?;

    let mut diffs = Vec::new();
    walk_diff(&before_val, &after_val, String::new(), &mut diffs);

    Ok(StructureComparison {
        source_type: json_type(&before_val).to_string(),
        target_type: json_type(&after_val).to_string(),
        diffs,
    })
}

fn walk_diff(before: &Value, after: &Value, path: String, out: &mut Vec<StructureDiff>) {
    match (before, after) {
        (Value::Object(b), Value::Object(a)) => {
            for (k, bv) in b {
                let child = if path.is_empty() {
                    k.clone()
                } else {
                    format!("{path}.{k}")
                };
                match a.get(k) {
                    Some(av) => walk_diff(bv, av, child, out),
                    None => out.push(StructureDiff {
                        path: child,
                        diff_type: DiffType::Removed,
                        source_type: json_type(bv).to_string(),
                        target_type: String::new(),
                    }),
                }
            }
            for (k, av) in a {
                if !b.contains_key(k) {
                    let child = if path.is_empty() {
                        k.clone()
                    } else {
                        format!("{path}.{k}")
                    };
                    out.push(StructureDiff {
                        path: child,
                        diff_type: DiffType::Added,
                        source_type: String::new(),
                        target_type: json_type(av).to_string(),
                    });
                }
            }
        }
        (Value::Array(b), Value::Array(a)) => {
            let shared = b.len().min(a.len());
            for i in 0..shared {
                walk_diff(&b[i], &a[i], format!("{path}[{i}]"), out);
            }
            for (i, bv) in b.iter().enumerate().skip(shared) {
                out.push(StructureDiff {
                    path: format!("{path}[{i}]"),
                    diff_type: DiffType::Removed,
                    source_type: json_type(bv).to_string(),
                    target_type: String::new(),
                });
            }
            for (i, av) in a.iter().enumerate().skip(shared) {
                out.push(StructureDiff {
                    path: format!("{path}[{i}]"),
                    diff_type: DiffType::Added,
                    source_type: String::new(),
                    target_type: json_type(av).to_string(),
                });
            }
        }
        (b, a) if json_type(b) != json_type(a) => {
            out.push(StructureDiff {
                path,
                diff_type: DiffType::TypeChanged,
                source_type: json_type(b).to_string(),
                target_type: json_type(a).to_string(),
            });
        }
        (b, a) => {
            // Same scalar type: compare canonical values.
            if b != a {
                out.push(StructureDiff {
                    path,
                    diff_type: DiffType::ValueChanged,
                    source_type: json_type(b).to_string(),
                    target_type: json_type(a).to_string(),
                });
            }
        }
    }
}

// ============================================================================
// Roundtrip
// ============================================================================

#[derive(Debug, Clone, serde::Serialize)]
pub struct RoundtripReport {
    pub from: Format,
    pub via: Format,
    pub preserved: bool,
    pub differences: Vec<String>,
}

/// Exercise A→B→A preservation of the critical fields: the model string,
/// the outer message/content count, and the tools count. `via` defaults to
/// OpenAI.
pub fn test_roundtrip(
    registry: &Registry,
    format_a: &Format,
    via: Option<&Format>,
    payload: &[u8],
) -> Result<RoundtripReport> {
    let via = via.cloned().unwrap_or(Format::OpenAI);
    let original: Value = serde_json::from_slice(payload)?;
    let model = original
        .get("model")
        .and_then(|m| m.as_str())
        .unwrap_or("")
        .to_string();

    let there = registry.must_translate_request(format_a, &via, &model, payload, false)?;
    let back = registry.must_translate_request(&via, format_a, &model, &there, false)?;
    let roundtripped: Value = serde_json::from_slice(&back)?;

    let mut differences = Vec::new();

    let model_after = roundtripped.get("model").and_then(|m| m.as_str()).unwrap_or("");
    if model != model_after {
        differences.push(format!("model: {model:?} -> {model_after:?}"));
    }

    let count_before = outer_message_count(&original);
    let count_after = outer_message_count(&roundtripped);
    if count_before != count_after {
        differences.push(format!("message count: {count_before} -> {count_after}"));
    }

    let tools_before = tools_count(&original);
    let tools_after = tools_count(&roundtripped);
    if tools_before != tools_after {
        differences.push(format!("tools count: {tools_before} -> {tools_after}"));
    }

    Ok(RoundtripReport {
        from: format_a.clone(),
        via,
        preserved: differences.is_empty(),
        differences,
    })
}

fn outer_message_count(value: &Value) -> usize {
    value
        .get("messages")
        .or_else(|| value.get("contents"))
        .and_then(|m| m.as_array())
        .map(|a| a.len())
        .unwrap_or(0)
}

fn tools_count(value: &Value) -> usize {
    value
        .get("tools")
        .and_then(|t| t.as_array())
        .map(|a| a.len())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_identical_payload_scores_high() {
        let payload = br#"{"model":"gpt-4","messages":[]}"#;
        let report = score_translation(&Format::OpenAI, &Format::Claude, payload, payload);
        assert!(report.score >= 0.9);
        assert_eq!(report.fields_dropped, 0);
        assert_eq!(report.fields_added, 0);
    }

    #[test]
    fn test_dropped_critical_field_warns() {
        let before = br#"{"model":"gpt-4","messages":[{"role":"user","content":"x"}]}"#;
        let after = br#"{"model":"gpt-4"}"#;
        let report = score_translation(&Format::OpenAI, &Format::Claude, before, after);
        assert!(report.fields_dropped > 0);
        assert!(report
            .warnings
            .iter()
            .any(|w| w.contains("critical field dropped: messages")));
    }

    #[test]
    fn test_added_fields_weighted_half() {
        let before = br#"{"a":1,"b":2}"#;
        let after = br#"{"a":1,"b":2,"c":3,"d":4}"#;
        let report = score_translation(&Format::OpenAI, &Format::Claude, before, after);
        // 2 mapped, 0 dropped, 2 added -> 2 / (2 + 1.0) = 0.666...
        assert!((report.score - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_payloads_score_one() {
        let report = score_translation(&Format::OpenAI, &Format::Claude, b"{}", b"{}");
        assert_eq!(report.score, 1.0);
    }

    #[test]
    fn test_empty_before_with_additions_scores_half() {
        let report = score_translation(&Format::OpenAI, &Format::Claude, b"{}", b"{\"a\":1}");
        assert_eq!(report.score, 0.5);
    }

    #[test]
    fn test_parse_failure_scores_zero() {
        let report = score_translation(&Format::OpenAI, &Format::Claude, b"not json", b"{}");
        assert_eq!(report.score, 0.0);
        assert!(!report.warnings.is_empty());
    }

    #[test]
    fn test_low_score_warns() {
        let before = br#"{"a":1,"b":2,"c":3}"#;
        let after = br#"{"z":9}"#;
        let report = score_translation(&Format::OpenAI, &Format::Claude, before, after);
        assert!(report.score < 0.6);
        assert!(report.warnings.iter().any(|w| w.contains("fidelity")));
    }

    #[test]
    fn test_leaf_paths_nested() {
        let paths = leaf_paths(&json!({
            "model": "gpt-4",
            "messages": [{"role": "user", "content": "hi"}],
        }));
        assert!(paths.contains("model"));
        assert!(paths.contains("messages[0].role"));
        assert!(paths.contains("messages[0].content"));
    }

    #[test]
    fn test_compare_added_and_removed() {
        let cmp = compare_json_structures(br#"{"a":1,"b":2}"#, br#"{"a":1,"c":3}"#).unwrap();
        assert_eq!(cmp.diffs.len(), 2);
        assert!(cmp
            .diffs
            .iter()
            .any(|d| d.path == "b" && d.diff_type == DiffType::Removed));
        assert!(cmp
            .diffs
            .iter()
            .any(|d| d.path == "c" && d.diff_type == DiffType::Added));
    }

    #[test]
    fn test_compare_type_and_value_changes() {
        let cmp = compare_json_structures(
            br#"{"a":1,"b":"two","c":{"d":true}}"#,
            br#"{"a":"one","b":"three","c":{"d":false}}"#,
        )
        .unwrap();
        assert!(cmp
            .diffs
            .iter()
            .any(|d| d.path == "a"
                && d.diff_type == DiffType::TypeChanged
                && d.source_type == "number"
                && d.target_type == "string"));
        assert!(cmp
            .diffs
            .iter()
            .any(|d| d.path == "b" && d.diff_type == DiffType::ValueChanged));
        assert!(cmp
            .diffs
            .iter()
            .any(|d| d.path == "c.d" && d.diff_type == DiffType::ValueChanged));
    }

    #[test]
    fn test_compare_array_length_mismatch() {
        let cmp = compare_json_structures(br#"{"xs":[1,2,3]}"#, br#"{"xs":[1]}"#).unwrap();
        let removed: Vec<_> = cmp
            .diffs
            .iter()
            .filter(|d| d.diff_type == DiffType::Removed)
            .collect();
        assert_eq!(removed.len(), 2);
        assert_eq!(removed[0].path, "xs[1]");
    }

    #[test]
    fn test_compare_malformed_errors() {
        assert!(compare_json_structures(b"{", b"{}").is_err());
    }

    #[test]
    fn test_roundtrip_preserved_with_inverse_transforms() {
        use std::sync::Arc;
        let registry = Registry::new();
        // A pair of transforms that move messages -> contents and back.
        registry.register(
            Format::Claude,
            Format::OpenAI,
            Some(Arc::new(|_, p, _| {
                let mut v: Value = serde_json::from_slice(p)?;
                if let Some(m) = v.as_object_mut()
                    && let Some(msgs) = m.remove("messages")
                {
                    m.insert("contents".into(), msgs);
                }
                Ok(serde_json::to_vec(&v)?)
            })),
            None,
        );
        registry.register(
            Format::OpenAI,
            Format::Claude,
            Some(Arc::new(|_, p, _| {
                let mut v: Value = serde_json::from_slice(p)?;
                if let Some(m) = v.as_object_mut()
                    && let Some(msgs) = m.remove("contents")
                {
                    m.insert("messages".into(), msgs);
                }
                Ok(serde_json::to_vec(&v)?)
            })),
            None,
        );

        let payload =
            br#"{"model":"claude-3","messages":[{"role":"user","content":"hi"}]}"#;
        let report =
            test_roundtrip(&registry, &Format::Claude, None, payload).unwrap();
        assert!(report.preserved, "differences: {:?}", report.differences);
    }

    #[test]
    fn test_roundtrip_detects_dropped_messages() {
        use std::sync::Arc;
        let registry = Registry::new();
        registry.register(
            Format::Claude,
            Format::OpenAI,
            Some(Arc::new(|_, _p, _| Ok(b"{\"model\":\"claude-3\"}".to_vec()))),
            None,
        );
        registry.register(
            Format::OpenAI,
            Format::Claude,
            Some(Arc::new(|_, p, _| Ok(p.to_vec()))),
            None,
        );

        let payload =
            br#"{"model":"claude-3","messages":[{"role":"user","content":"hi"}]}"#;
        let report = test_roundtrip(&registry, &Format::Claude, None, payload).unwrap();
        assert!(!report.preserved);
        assert!(report
            .differences
            .iter()
            .any(|d| d.starts_with("message count")));
    }
}
