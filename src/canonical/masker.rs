//! Prompt masking for template matching.

use regex::Regex;
use sha2::{Digest, Sha256};

/// Masked prompt result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaskedPrompt {
    /// Masked text with placeholders.
    pub masked: String,
    /// SHA-256 digest of the raw text (keyed when a secret is configured),
    /// used for dedup tracking without disclosing prompt contents.
    pub raw_digest: String,
}

struct MaskPattern {
    name: &'static str,
    pattern: Regex,
    replacement: &'static str,
}

/// Masks sensitive and variable content in prompts for template matching.
///
/// Replaces, in order of specificity: UUIDs, URLs, emails, dates, IPv4
/// addresses, numbers, phone numbers, card groupings, long hex strings and
/// file paths. Within code spans, non-keyword identifiers become `{VAR}`.
/// Preserves structure while enabling fuzzy matching.
pub struct PromptMasker {
    patterns: Vec<MaskPattern>,
    code_block: Regex,
    code_identifier: Regex,
    digest_secret: Option<String>,
}

/// Keywords never masked inside code spans.
const CODE_KEYWORDS: &[&str] = &[
    "if", "else", "for", "while", "do", "switch", "case", "break", "continue", "return",
    "function", "def", "class", "import", "from", "as", "try", "catch", "finally", "throw",
    "async", "await", "const", "let", "var", "public", "private", "protected", "static", "void",
    "int", "string", "boolean", "true", "false", "null", "undefined", "new", "this", "super",
];

impl PromptMasker {
    pub fn new() -> Self {
        Self::with_secret(None)
    }

    /// A secret keys the raw-text digest so it cannot be brute-forced from
    /// common prompts.
    pub fn with_secret(digest_secret: Option<String>) -> Self {
        let mk = |name: &'static str, re: &str, replacement: &'static str| MaskPattern {
            name,
            pattern: Regex::new(re).expect("static mask pattern"),
            replacement,
        };
        Self {
            // Ordered by specificity; each pattern runs over the output of
            // the previous one, so the first matching pattern wins for
            // overlapping ranges.
            patterns: vec![
                mk(
                    "UUID",
                    r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}",
                    "{UUID}",
                ),
                mk("URL", r#"https?://[^\s\)\]\}"'<>]+"#, "{URL}"),
                mk(
                    "EMAIL",
                    r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}",
                    "{EMAIL}",
                ),
                mk("DATE", r"\b\d{4}-\d{2}-\d{2}\b", "{DATE}"),
                mk("DATE", r"\b\d{1,2}/\d{1,2}/\d{2,4}\b", "{DATE}"),
                mk("IP", r"\b(?:\d{1,3}\.){3}\d{1,3}\b", "{IP}"),
                mk("NUM", r"\b\d+\.\d+\b", "{NUM}"),
                mk("NUM", r"\b\d{4,}\b", "{NUM}"),
                mk("PHONE", r"\b\d{3}[-.\s]?\d{3}[-.\s]?\d{4}\b", "{PHONE}"),
                mk(
                    "CARD",
                    r"\b\d{4}[\s-]?\d{4}[\s-]?\d{4}[\s-]?\d{4}\b",
                    "{CARD}",
                ),
                mk("HASH", r"\b[0-9a-fA-F]{32,}\b", "{HASH}"),
                mk("PATH", r"[/\\](?:[^/\\\s]+[/\\])+[^/\\\s]*", "{PATH}"),
            ],
            code_block: Regex::new(r"```[\s\S]*?```|`[^`]+`").expect("static pattern"),
            code_identifier: Regex::new(r"(?i)\b[a-z_][a-z0-9_]{2,}\b").expect("static pattern"),
            digest_secret,
        }
    }

    /// Mask sensitive content in text. Deterministic and idempotent.
    pub fn mask(&self, text: &str) -> MaskedPrompt {
        if text.is_empty() {
            return MaskedPrompt {
                masked: String::new(),
                raw_digest: self.digest(""),
            };
        }

        let mut masked = text.to_string();
        for pattern in &self.patterns {
            masked = pattern
                .pattern
                .replace_all(&masked, pattern.replacement)
                .into_owned();
        }
        masked = self.mask_code_identifiers(&masked);

        MaskedPrompt {
            masked,
            raw_digest: self.digest(text),
        }
    }

    /// Check if text contains PII (email, phone or card patterns). Runs on
    /// the raw text, before any placeholders swallow the digits.
    pub fn contains_pii(&self, text: &str) -> bool {
        self.patterns
            .iter()
            .filter(|p| matches!(p.name, "EMAIL" | "PHONE" | "CARD"))
            .any(|p| p.pattern.is_match(text))
    }

    /// Digest of the raw prompt, keyed when a secret is configured.
    pub fn digest(&self, text: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        if let Some(ref secret) = self.digest_secret {
            hasher.update(secret.as_bytes());
        }
        hasher
            .finalize()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect()
    }

    /// Mask variable names in fenced or backtick code spans, preserving
    /// keywords and syntax.
    fn mask_code_identifiers(&self, text: &str) -> String {
        let mut result = String::with_capacity(text.len());
        let mut last_end = 0;
        for m in self.code_block.find_iter(text) {
            result.push_str(&text[last_end..m.start()]);
            result.push_str(&self.mask_identifiers_in_code(m.as_str()));
            last_end = m.end();
        }
        result.push_str(&text[last_end..]);
        result
    }

    fn mask_identifiers_in_code(&self, code: &str) -> String {
        let mut result = String::with_capacity(code.len());
        let mut last_end = 0;
        for m in self.code_identifier.find_iter(code) {
            result.push_str(&code[last_end..m.start()]);
            if CODE_KEYWORDS.contains(&m.as_str().to_lowercase().as_str()) {
                result.push_str(m.as_str());
            } else {
                result.push_str("{VAR}");
            }
            last_end = m.end();
        }
        result.push_str(&code[last_end..]);
        result
    }
}

impl Default for PromptMasker {
    fn default() -> Self {
        Self::new()
    }
}
