//! Request mode detection, temperature buckets and model families.
//!
//! Mode detection prevents cache poisoning scenarios like returning plain
//! text when JSON output was required, or reusing answers produced under a
//! different tool schema. Cache entries are only matched within the same
//! mode.

use serde::{Deserialize, Serialize};

use crate::types::request::ChatCompletionRequest;

/// Request mode, detected from the request structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestMode {
    Text,
    JsonObject,
    JsonSchema,
    Tools,
    Function,
}

impl RequestMode {
    /// Detect mode from request structure.
    ///
    /// Priority (first match wins):
    /// 1. JSON_SCHEMA: `response_format.type == "json_schema"` (or a schema present)
    /// 2. JSON_OBJECT: `response_format.type == "json_object"`
    /// 3. TOOLS: non-empty tools array
    /// 4. FUNCTION: non-empty legacy functions array
    /// 5. TEXT: default
    pub fn detect(request: &ChatCompletionRequest) -> Self {
        if let Some(format) = &request.response_format {
            if format.format_type == "json_schema" || format.json_schema.is_some() {
                return RequestMode::JsonSchema;
            }
            if format.format_type == "json_object" {
                return RequestMode::JsonObject;
            }
        }
        if request.tools.as_ref().is_some_and(|t| !t.is_empty()) {
            return RequestMode::Tools;
        }
        if request.functions.as_ref().is_some_and(|f| !f.is_empty()) {
            return RequestMode::Function;
        }
        RequestMode::Text
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestMode::Text => "text",
            RequestMode::JsonObject => "json_object",
            RequestMode::JsonSchema => "json_schema",
            RequestMode::Tools => "tools",
            RequestMode::Function => "function",
        }
    }

    /// Parse a stored mode string, defaulting to TEXT when unrecognized.
    pub fn parse(value: &str) -> Self {
        match value {
            "json_object" => RequestMode::JsonObject,
            "json_schema" => RequestMode::JsonSchema,
            "tools" => RequestMode::Tools,
            "function" => RequestMode::Function,
            _ => RequestMode::Text,
        }
    }
}

/// Temperature bucket, ordered so adjacency is meaningful for scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemperatureBucket {
    Zero,
    Low,
    Medium,
    High,
    Default,
    VeryHigh,
}

impl TemperatureBucket {
    /// Bucket a temperature value; `None` means the OpenAI default of 1.0.
    pub fn from_temperature(temperature: Option<f64>) -> Self {
        let t = temperature.unwrap_or(1.0);
        if t < 0.01 {
            TemperatureBucket::Zero
        } else if t < 0.3 {
            TemperatureBucket::Low
        } else if t < 0.7 {
            TemperatureBucket::Medium
        } else if t < 0.9 {
            TemperatureBucket::High
        } else if (t - 1.0).abs() < 0.01 {
            TemperatureBucket::Default
        } else {
            TemperatureBucket::VeryHigh
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TemperatureBucket::Zero => "zero",
            TemperatureBucket::Low => "low",
            TemperatureBucket::Medium => "medium",
            TemperatureBucket::High => "high",
            TemperatureBucket::Default => "default",
            TemperatureBucket::VeryHigh => "very_high",
        }
    }

    fn rank(&self) -> i32 {
        match self {
            TemperatureBucket::Zero => 0,
            TemperatureBucket::Low => 1,
            TemperatureBucket::Medium => 2,
            TemperatureBucket::High => 3,
            TemperatureBucket::Default => 4,
            TemperatureBucket::VeryHigh => 5,
        }
    }

    /// Whether two buckets sit next to each other in the ordered list.
    pub fn is_adjacent(&self, other: &TemperatureBucket) -> bool {
        (self.rank() - other.rank()).abs() == 1
    }
}

/// Derive the model family by stripping trailing date suffixes, version
/// suffixes and release-channel qualifiers.
///
/// `gpt-4-0613` → `gpt-4`, `gpt-4-turbo-2024-04-09` → `gpt-4`,
/// `claude-3-5-sonnet-20241022` → `claude-3-5-sonnet`.
pub fn model_family(model: &str) -> String {
    let mut family = model.trim().to_lowercase();
    loop {
        let before = family.len();
        family = strip_trailing(&family);
        if family.len() == before {
            break;
        }
    }
    family
}

fn strip_trailing(model: &str) -> String {
    let Some(idx) = model.rfind('-') else {
        return model.to_string();
    };
    let (head, tail) = (&model[..idx], &model[idx + 1..]);
    if head.is_empty() {
        return model.to_string();
    }

    let is_date = (tail.len() == 8 || tail.len() == 4 || tail.len() == 6)
        && tail.chars().all(|c| c.is_ascii_digit());
    // A trailing YYYY-MM-DD spans three segments; the 2-digit pieces are
    // stripped one at a time until the 4-digit year goes too.
    let is_date_piece = tail.len() == 2
        && tail.chars().all(|c| c.is_ascii_digit())
        && head.rsplit('-').next().is_some_and(|prev| {
            prev.len() >= 2 && prev.chars().all(|c| c.is_ascii_digit())
        });
    let is_version = tail.len() > 1
        && tail.starts_with('v')
        && tail[1..].chars().all(|c| c.is_ascii_digit() || c == '.');
    let is_channel = matches!(tail, "latest" | "preview" | "turbo" | "instruct");

    if is_date || is_date_piece || is_version || is_channel {
        head.to_string()
    } else {
        model.to_string()
    }
}
