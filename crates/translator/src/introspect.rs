//! Compatibility matrix, per-pair capability info, and documentation
//! generators.

use crate::registry::Registry;
use rosetta_core::Format;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct TranslationInfo {
    pub has_request: bool,
    pub has_response: bool,
    pub has_stream: bool,
    pub has_non_stream: bool,
    pub has_token_count: bool,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct TranslationPair {
    pub from: Format,
    pub to: Format,
    pub info: TranslationInfo,
}

impl Registry {
    /// `from → sorted targets`, merging the request and response tables
    /// (lazy entries included).
    pub fn compatibility_matrix(&self) -> BTreeMap<String, Vec<String>> {
        let mut matrix: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for ((from, to), _, _) in self.pair_keys() {
            matrix
                .entry(from.to_string())
                .or_default()
                .insert(to.to_string());
        }
        matrix
            .into_iter()
            .map(|(from, tos)| (from, tos.into_iter().collect()))
            .collect()
    }

    /// Union of every format that appears on either side of a pair, sorted.
    pub fn supported_formats(&self) -> Vec<String> {
        let mut formats = BTreeSet::new();
        for ((from, to), _, _) in self.pair_keys() {
            formats.insert(from.to_string());
            formats.insert(to.to_string());
        }
        formats.into_iter().collect()
    }

    pub fn is_translation_supported(&self, from: &Format, to: &Format) -> bool {
        self.pair_keys()
            .iter()
            .any(|((f, t), _, _)| f == from && t == to)
    }

    /// Capabilities for one pair. Stream/non-stream/token-count detail is
    /// only known for materialized response transforms; unforced lazy
    /// entries report the response side as present without detail.
    pub fn translation_info(&self, from: &Format, to: &Format) -> TranslationInfo {
        let key = (from.clone(), to.clone());
        let mut info = TranslationInfo::default();
        for ((f, t), has_req, has_resp) in self.pair_keys() {
            if f == *from && t == *to {
                info.has_request = has_req;
                info.has_response = has_resp;
            }
        }
        if let Some((stream, non_stream, token_count)) = self.response_capabilities(&key) {
            info.has_stream = stream;
            info.has_non_stream = non_stream;
            info.has_token_count = token_count;
        }
        info
    }

    /// One record per unique pair, sorted by (from, to).
    pub fn all_translations(&self) -> Vec<TranslationPair> {
        let mut pairs: Vec<TranslationPair> = self
            .pair_keys()
            .into_iter()
            .map(|((from, to), _, _)| {
                let info = self.translation_info(&from, &to);
                TranslationPair { from, to, info }
            })
            .collect();
        pairs.sort_by(|a, b| {
            (a.from.as_str(), a.to.as_str()).cmp(&(b.from.as_str(), b.to.as_str()))
        });
        pairs
    }

    // ========================================================================
    // Docs generators
    // ========================================================================

    pub fn generate_markdown_docs(&self) -> String {
        let pairs = self.all_translations();
        let mut out = String::from("# Translation Registry\n\n");

        out.push_str("## Supported Translations\n\n");
        out.push_str("| From | To |\n|------|----|\n");
        for pair in &pairs {
            out.push_str(&format!("| {} | {} |\n", pair.from, pair.to));
        }

        out.push_str("\n## Capabilities\n\n");
        out.push_str("| From | To | Request | Stream | Non-Stream | Token Count |\n");
        out.push_str("|------|----|---------|--------|------------|-------------|\n");
        for pair in &pairs {
            out.push_str(&format!(
                "| {} | {} | {} | {} | {} | {} |\n",
                pair.from,
                pair.to,
                check(pair.info.has_request),
                check(pair.info.has_stream),
                check(pair.info.has_non_stream),
                check(pair.info.has_token_count),
            ));
        }

        out.push_str("\n## Formats\n\n");
        for format in self.supported_formats() {
            out.push_str(&format!("- {format}\n"));
        }
        out
    }

    /// Left-to-right flowchart with one node per format and one edge per
    /// translation, labeled with the capability set.
    pub fn generate_mermaid_diagram(&self) -> String {
        let pairs = self.all_translations();
        let mut out = String::from("flowchart LR\n");

        for format in self.supported_formats() {
            out.push_str(&format!("    {}[\"{}\"]\n", sanitize_id(&format), format));
        }
        for pair in &pairs {
            let mut caps = Vec::new();
            if pair.info.has_request {
                caps.push("req");
            }
            if pair.info.has_stream {
                caps.push("stream");
            }
            if pair.info.has_non_stream {
                caps.push("non-stream");
            }
            if pair.info.has_token_count {
                caps.push("tokens");
            }
            let label = if caps.is_empty() {
                "resp".to_string()
            } else {
                caps.join(",")
            };
            out.push_str(&format!(
                "    {} -->|{}| {}\n",
                sanitize_id(pair.from.as_str()),
                label,
                sanitize_id(pair.to.as_str()),
            ));
        }
        out
    }

    pub fn generate_summary(&self) -> String {
        let matrix = self.compatibility_matrix();
        let formats = self.supported_formats();
        let total_paths: usize = matrix.values().map(|v| v.len()).sum();

        let mut out = String::from("Translation Registry Summary\n");
        out.push_str(&format!("Total formats: {}\n", formats.len()));
        out.push_str(&format!("Total paths: {total_paths}\n\n"));
        for (from, tos) in &matrix {
            out.push_str(&format!("{from} -> {}\n", tos.join(", ")));
        }
        out
    }
}

fn check(flag: bool) -> &'static str {
    if flag { "yes" } else { "-" }
}

/// Mermaid node IDs restricted to `[A-Za-z0-9_]`.
fn sanitize_id(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}
