use serde::{Deserialize, Serialize};

/// Identifier for an API wire schema.
///
/// The closed set below is what the detector and validator recognize;
/// `Other` carries any token registered by an external provider module.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Format {
    OpenAI,
    OpenAIResponse,
    Claude,
    Gemini,
    GeminiCli,
    Codex,
    Antigravity,
    Kiro,
    Other(String),
}

impl Format {
    pub fn as_str(&self) -> &str {
        match self {
            Self::OpenAI => "openai",
            Self::OpenAIResponse => "openai-response",
            Self::Claude => "claude",
            Self::Gemini => "gemini",
            Self::GeminiCli => "gemini-cli",
            Self::Codex => "codex",
            Self::Antigravity => "antigravity",
            Self::Kiro => "kiro",
            Self::Other(s) => s,
        }
    }

    /// Case-insensitive lookup. Canonical names map to the closed set;
    /// anything else is kept verbatim as `Other`.
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "openai" => Self::OpenAI,
            "openai-response" | "openai_response" => Self::OpenAIResponse,
            "claude" => Self::Claude,
            "gemini" => Self::Gemini,
            "gemini-cli" | "gemini_cli" => Self::GeminiCli,
            "codex" => Self::Codex,
            "antigravity" => Self::Antigravity,
            "kiro" => Self::Kiro,
            _ => Self::Other(s.to_string()),
        }
    }

    /// The formats the detector and validator know about.
    pub fn known() -> [Format; 8] {
        [
            Self::OpenAI,
            Self::OpenAIResponse,
            Self::Claude,
            Self::Gemini,
            Self::GeminiCli,
            Self::Codex,
            Self::Antigravity,
            Self::Kiro,
        ]
    }
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Format {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl From<&str> for Format {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}

impl Serialize for Format {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Format {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::parse(&s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_canonical() {
        assert_eq!(Format::parse("openai"), Format::OpenAI);
        assert_eq!(Format::parse("openai-response"), Format::OpenAIResponse);
        assert_eq!(Format::parse("gemini-cli"), Format::GeminiCli);
        assert_eq!(Format::parse("kiro"), Format::Kiro);
    }

    #[test]
    fn test_parse_case_insensitive() {
        assert_eq!(Format::parse("Claude"), Format::Claude);
        assert_eq!(Format::parse("OPENAI"), Format::OpenAI);
        assert_eq!(Format::parse("Antigravity"), Format::Antigravity);
    }

    #[test]
    fn test_parse_unknown_kept_verbatim() {
        assert_eq!(
            Format::parse("mistral"),
            Format::Other("mistral".to_string())
        );
        assert_eq!(Format::parse("mistral").as_str(), "mistral");
    }

    #[test]
    fn test_display_roundtrip() {
        for f in Format::known() {
            assert_eq!(Format::parse(&f.to_string()), f);
        }
    }

    #[test]
    fn test_serde_string_form() {
        let f: Format = serde_json::from_str("\"gemini\"").unwrap();
        assert_eq!(f, Format::Gemini);
        assert_eq!(serde_json::to_string(&f).unwrap(), "\"gemini\"");
    }
}
