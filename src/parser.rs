//! Coerces loosely-structured model output into the shape each stage needs.

use crate::llm::preview;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::warn;

pub const SUMMARY_NOT_PROVIDED: &str = "Product summary was not provided by the AI.";

const PROFILE_WRAPPER_KEYS: &[&str] = &["profiles", "customer_profiles"];
const QUESTION_WRAPPER_KEYS: &[&str] = &["questions"];

#[derive(Debug, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct InvalidProfileFormat(pub String);

/// Strict decode first; on failure retry once with a surrounding Markdown fence removed.
fn decode_json(raw: &str) -> Option<Value> {
    if let Ok(v) = serde_json::from_str(raw) {
        return Some(v);
    }
    let trimmed = raw.trim();
    let inner = trimmed.strip_prefix("```")?.strip_suffix("```")?;
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    serde_json::from_str(inner.trim()).ok()
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Result of the summary stage. Only `Provided` is trusted as context for later stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SummaryOutcome {
    Provided(String),
    NotProvided,
    UnexpectedFormat(&'static str),
    /// Holds a bounded prefix of what the model sent.
    Malformed(String),
    /// The gateway call itself failed.
    Unavailable(String),
}

impl SummaryOutcome {
    pub fn usable(&self) -> Option<&str> {
        match self {
            SummaryOutcome::Provided(s) => Some(s),
            _ => None,
        }
    }

    /// The string returned to the caller: the summary itself or a sentinel.
    pub fn text(&self) -> String {
        match self {
            SummaryOutcome::Provided(s) => s.clone(),
            SummaryOutcome::NotProvided => SUMMARY_NOT_PROVIDED.to_string(),
            SummaryOutcome::UnexpectedFormat(ty) => format!("Product summary has an unexpected format: {ty}."),
            SummaryOutcome::Malformed(prefix) => format!("Summary JSON from AI was malformed. Received: {prefix}"),
            SummaryOutcome::Unavailable(reason) => format!("Product summary could not be generated: {reason}"),
        }
    }
}

pub fn parse_summary(raw: &str) -> SummaryOutcome {
    let Some(decoded) = decode_json(raw) else {
        warn!("Summary JSON from AI was malformed: {}", preview(raw, 200));
        let mut prefix = preview(raw, 200);
        if !prefix.ends_with("...") {
            prefix.push_str("...");
        }
        return SummaryOutcome::Malformed(prefix);
    };
    match decoded.get("product_summary") {
        None | Some(Value::Null) => SummaryOutcome::NotProvided,
        Some(Value::String(s)) if s.trim().is_empty() => SummaryOutcome::NotProvided,
        Some(Value::String(s)) => SummaryOutcome::Provided(s.clone()),
        Some(obj @ Value::Object(_)) => match serde_json::to_string_pretty(obj) {
            Ok(s) => SummaryOutcome::Provided(s),
            Err(_) => SummaryOutcome::UnexpectedFormat("object"),
        },
        Some(other) => SummaryOutcome::UnexpectedFormat(type_name(other)),
    }
}

/// A profile as described by the model, before ids and questions are attached.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProfileDraft {
    pub name: String,
    pub description: String,
    pub country_region: Option<String>,
    pub occupation: Option<String>,
    pub cognitive_level: Option<String>,
    pub main_concerns: Vec<String>,
    pub potential_needs: Option<String>,
    pub cultural_background_summary: Option<String>,
}

impl ProfileDraft {
    fn from_object(obj: &Map<String, Value>) -> Self {
        let text = |key: &str| obj.get(key).and_then(Value::as_str).map(str::to_string);
        Self {
            name: text("name").unwrap_or_else(|| "Unnamed Profile".to_string()),
            description: text("description").unwrap_or_else(|| "No description provided.".to_string()),
            country_region: text("country_region"),
            occupation: text("occupation"),
            cognitive_level: text("cognitive_level"),
            main_concerns: obj
                .get("main_concerns")
                .and_then(Value::as_array)
                .map(|items| items.iter().filter_map(Value::as_str).map(str::to_string).collect())
                .unwrap_or_default(),
            potential_needs: text("potential_needs"),
            cultural_background_summary: text("cultural_background_summary"),
        }
    }
}

/// Array at the top level, or under one of `keys` in a single wrapping object.
fn unwrap_array(value: Value, keys: &[&str]) -> Result<Vec<Value>, Value> {
    match value {
        Value::Array(items) => Ok(items),
        Value::Object(mut map) => {
            for key in keys {
                if let Some(Value::Array(items)) = map.remove(*key) {
                    return Ok(items);
                }
            }
            Err(Value::Object(map))
        }
        other => Err(other),
    }
}

pub fn parse_profiles(raw: &str) -> Result<Vec<ProfileDraft>, InvalidProfileFormat> {
    let decoded = decode_json(raw).ok_or_else(|| {
        warn!("Failed to parse profiles JSON: {}", preview(raw, 300));
        InvalidProfileFormat("AI returned invalid JSON for customer profiles.".into())
    })?;
    let items = unwrap_array(decoded, PROFILE_WRAPPER_KEYS).map_err(|other| {
        warn!("LLM did not return a list of profiles: {}", preview(&other.to_string(), 300));
        InvalidProfileFormat("AI failed to generate profiles in list format.".into())
    })?;
    Ok(items
        .iter()
        .filter_map(|item| match item {
            Value::Object(obj) => Some(ProfileDraft::from_object(obj)),
            other => {
                warn!("Skipping invalid raw profile data: {}", other);
                None
            }
        })
        .collect())
}

/// Question texts in model order; never fails, malformed entries are dropped.
pub fn parse_questions(raw: &str) -> Vec<String> {
    let Some(decoded) = decode_json(raw) else {
        warn!("Failed to parse questions JSON: {}", preview(raw, 300));
        return Vec::new();
    };
    let items = match unwrap_array(decoded, QUESTION_WRAPPER_KEYS) {
        Ok(items) => items,
        Err(other) => {
            warn!("LLM did not return a list of questions: {}", preview(&other.to_string(), 300));
            return Vec::new();
        }
    };
    items
        .into_iter()
        .filter_map(|item| match item.get("text") {
            Some(Value::String(text)) if !text.trim().is_empty() => Some(text.clone()),
            _ => {
                warn!("Skipping invalid question data: {}", item);
                None
            }
        })
        .collect()
}
