use anyhow::{bail, Context};
use std::{path::PathBuf, time::Duration};

pub const DEFAULT_API_URL: &str = "https://api.siliconflow.cn/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "Qwen/Qwen3-14B";

/// How generated questions are attached to each profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QuestionLayout {
    /// Separate `b2b_questions` / `b2c_questions` lists, one LLM call per segment.
    #[default]
    Segmented,
    /// Legacy single `questions` list, one LLM call per profile.
    Flat,
}

impl std::str::FromStr for QuestionLayout {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "segmented" => Ok(Self::Segmented),
            "flat" | "legacy" => Ok(Self::Flat),
            other => bail!("unknown question layout '{other}' (expected 'segmented' or 'flat')"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub default_model: String,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
}

impl LlmConfig {
    /// Both endpoint and key are required for live calls; anything less means mock mode.
    pub fn is_live(&self) -> bool {
        self.api_url.is_some() && self.api_key.is_some()
    }

    pub fn masked_key(&self) -> String {
        match &self.api_key {
            Some(k) if k.chars().count() > 4 => {
                let tail: String = k.chars().skip(k.chars().count() - 4).collect();
                format!("********{tail}")
            }
            Some(_) => "Key is very short".to_string(),
            None => "NOT SET".to_string(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_url: Some(DEFAULT_API_URL.to_string()),
            api_key: None,
            default_model: DEFAULT_MODEL.to_string(),
            connect_timeout: Duration::from_secs(20),
            read_timeout: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub llm: LlmConfig,
    pub question_layout: QuestionLayout,
    /// Root directory for session logs; `None` disables them.
    pub session_dir: Option<PathBuf>,
    pub port: u16,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let secs = |key: &str, default: u64| -> anyhow::Result<Duration> {
            match get(key) {
                Some(v) => v
                    .parse::<u64>()
                    .map(Duration::from_secs)
                    .with_context(|| format!("{key} must be a whole number of seconds, got '{v}'")),
                None => Ok(Duration::from_secs(default)),
            }
        };

        let llm = LlmConfig {
            api_url: Some(get("EXTERNAL_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string())),
            api_key: get("EXTERNAL_API_KEY"),
            default_model: get("DEFAULT_LLM_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            connect_timeout: secs("LLM_CONNECT_TIMEOUT_SECS", 20)?,
            read_timeout: secs("LLM_READ_TIMEOUT_SECS", 120)?,
        };

        let question_layout = match get("QUESTION_LAYOUT") {
            Some(v) => v.parse().context("invalid QUESTION_LAYOUT")?,
            None => QuestionLayout::default(),
        };

        let logging_enabled = match get("SESSION_LOGGING").map(|v| v.to_ascii_lowercase()) {
            None => true,
            Some(v) if matches!(v.as_str(), "1" | "true" | "on" | "yes") => true,
            Some(v) if matches!(v.as_str(), "0" | "false" | "off" | "no") => false,
            Some(v) => bail!("SESSION_LOGGING must be a boolean, got '{v}'"),
        };
        let session_dir = logging_enabled.then(|| PathBuf::from(get("DATA_DIR").unwrap_or_else(|| "data".to_string())));

        let port = match get("PORT") {
            Some(v) => v.parse().with_context(|| format!("PORT must be a port number, got '{v}'"))?,
            None => 8000,
        };

        Ok(Self { llm, question_layout, session_dir, port })
    }
}
