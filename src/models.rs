use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::{collections::HashSet, fmt, ops::RangeInclusive};
use uuid::Uuid;

pub const PROFILE_COUNT_RANGE: RangeInclusive<u32> = 1..=10;
pub const QUESTION_COUNT_RANGE: RangeInclusive<u32> = 1..=10;

fn default_profile_count() -> u32 { 3 }
fn default_question_count() -> u32 { 6 }

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ProductInput {
    pub product_document: String,
    #[serde(default = "default_profile_count")]
    pub num_customer_profiles: u32,
    /// Total per profile; split between B2B and B2C by `QuestionSplit`.
    #[serde(default = "default_question_count")]
    pub num_questions_per_profile: u32,
}

impl ProductInput {
    pub fn validate(&self) -> Result<(), String> {
        if self.product_document.trim().is_empty() {
            return Err("product_document must not be empty".into());
        }
        if !PROFILE_COUNT_RANGE.contains(&self.num_customer_profiles) {
            return Err(format!(
                "num_customer_profiles must be between {} and {}",
                PROFILE_COUNT_RANGE.start(),
                PROFILE_COUNT_RANGE.end()
            ));
        }
        if !QUESTION_COUNT_RANGE.contains(&self.num_questions_per_profile) {
            return Err(format!(
                "num_questions_per_profile must be between {} and {}",
                QUESTION_COUNT_RANGE.start(),
                QUESTION_COUNT_RANGE.end()
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Segment {
    #[serde(rename = "B2B")]
    B2b,
    #[serde(rename = "B2C")]
    B2c,
}

impl Segment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Segment::B2b => "B2B",
            Segment::B2c => "B2C",
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Per-profile question budget: B2B gets floor(total/2), B2C the remainder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuestionSplit {
    pub b2b: usize,
    pub b2c: usize,
}

impl QuestionSplit {
    pub fn for_total(total: usize) -> Self {
        let b2b = total / 2;
        Self { b2b, b2c: total - b2b }
    }

    pub fn count(&self, segment: Segment) -> usize {
        match segment {
            Segment::B2b => self.b2b,
            Segment::B2c => self.b2c,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Question {
    pub id: String,
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum ProfileQuestions {
    Segmented {
        b2b_questions: Vec<Question>,
        b2c_questions: Vec<Question>,
    },
    /// Legacy single list.
    Flat { questions: Vec<Question> },
}

impl ProfileQuestions {
    pub fn total(&self) -> usize {
        match self {
            ProfileQuestions::Segmented { b2b_questions, b2c_questions } => b2b_questions.len() + b2c_questions.len(),
            ProfileQuestions::Flat { questions } => questions.len(),
        }
    }
}

#[skip_serializing_none]
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CustomerProfile {
    pub id: String,
    pub name: String,
    pub description: String,
    pub country_region: Option<String>,
    pub occupation: Option<String>,
    pub cognitive_level: Option<String>,
    #[serde(default)]
    pub main_concerns: Vec<String>,
    pub potential_needs: Option<String>,
    pub cultural_background_summary: Option<String>,
    #[serde(flatten)]
    pub questions: ProfileQuestions,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct GenerationResult {
    pub product_summary: Option<String>,
    pub customer_profiles: Vec<CustomerProfile>,
}

/// Hands out short prefixed ids, unique within one allocator.
#[derive(Debug, Default)]
pub struct IdAllocator {
    issued: HashSet<String>,
}

impl IdAllocator {
    pub fn next(&mut self, prefix: &str) -> String {
        loop {
            let id = format!("{prefix}-{}", short_hex());
            if self.issued.insert(id.clone()) {
                return id;
            }
        }
    }
}

pub fn short_hex() -> String {
    let mut hex = Uuid::new_v4().simple().to_string();
    hex.truncate(8);
    hex
}
