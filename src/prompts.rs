//! Prompt templates for each generation stage. Pure string rendering, no I/O.

use crate::{
    llm::ChatMessage,
    models::{CustomerProfile, Segment},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

impl Prompt {
    pub fn into_messages(self) -> Vec<ChatMessage> {
        vec![ChatMessage::system(self.system), ChatMessage::user(self.user)]
    }
}

pub const PRODUCT_ANALYST_SYSTEM: &str = "You are a senior product analyst. Your task is to understand the provided product information and extract its core features, main advantages, preliminary target customer profile ideas, and suitable foreign trade scenarios. Respond in JSON format with a single key 'product_summary'. The summary should be concise and informative, and the value of 'product_summary' should be a single string if possible, or a structured object if necessary. If you cannot summarize the product, respond with an empty JSON object {}.";

pub const MARKET_ANALYST_SYSTEM: &str = "You are an AI assistant that generates JSON data representing customer profiles for foreign trade scenarios based on product information. Output ONLY the JSON array of profiles. All values MUST be written in English. If you cannot generate profiles, output an empty JSON array [].";

pub const B2B_ROLEPLAYER_SYSTEM: &str = "You are an AI assistant that role-plays a professional business buyer (importer, distributor, procurement manager) evaluating a product for purchase in bulk. You generate JSON data representing the questions this buyer would ask a supplier: technical specifications, minimum order quantity (MOQ), unit and tiered pricing, payment terms, lead time, logistics and shipping terms, certifications and regulatory compliance, warranty and after-sales support. Output ONLY the JSON array of question objects, in English. If you cannot generate questions, output an empty JSON array [].";

pub const B2C_ROLEPLAYER_SYSTEM: &str = "You are an AI assistant that role-plays an individual consumer considering buying a product for personal use. You generate JSON data representing the casual questions this shopper would ask: ease of use, look and feel, durability, delivery time, returns and refunds, warranty, and how the product compares with alternatives. Output ONLY the JSON array of question objects, in English. If you cannot generate questions, output an empty JSON array [].";

pub const CUSTOMER_ROLEPLAYER_SYSTEM: &str = "You are an AI assistant that generates JSON data representing a list of questions a specific customer profile would ask. Output ONLY the JSON array of question objects. If you cannot generate questions, output an empty JSON array [].";

pub fn product_summary_prompt(document: &str) -> Prompt {
    Prompt {
        system: PRODUCT_ANALYST_SYSTEM.to_string(),
        user: format!("Product Information:\n```\n{document}\n```"),
    }
}

pub fn profile_generation_prompt(product_info: &str, count: usize) -> Prompt {
    let user = format!(
        r#"You are an experienced foreign trade market analysis expert. Based on the following product information:
Product Info/Summary: {product_info}

Please generate exactly {count} distinct potential international customer profiles for this product.
Each profile MUST be a JSON object and include these keys:
- "name": A short, descriptive name (e.g., "Hans Müller (German Novice Importer)", "Sarah Jones (US Experienced Buyer)").
- "description": A more detailed description of the customer profile.
- "country_region": (e.g., "Germany", "USA", "Southeast Asia")
- "occupation": (e.g., "Junior Purchasing Agent", "Senior Procurement Manager", "Small Business Owner")
- "cognitive_level": (e.g., "Novice", "Intermediate", "Expert" regarding the product type)
- "main_concerns": A list of strings for their primary concerns (e.g., ["Price", "Quality", "Delivery Time", "Technical Support", "Compliance"]).
- "potential_needs": A string describing their potential needs or use case for the product.
- "cultural_background_summary": A brief summary of cultural communication style or business practice relevant to their region.

All values MUST be written in English.
Ensure the profiles are significantly different from each other, covering various types of international buyers relevant to foreign trade.
Respond with a JSON array of these customer profile objects.
ONLY output the JSON array. Do not include any other text before or after the JSON.
If you cannot generate profiles, output an empty JSON array: []
Example of a single profile object:
{{
  "name": "Example Buyer (Country)",
  "description": "Detailed description here.",
  "country_region": "Country Name",
  "occupation": "Occupation Type",
  "cognitive_level": "Novice",
  "main_concerns": ["Concern1", "Concern2"],
  "potential_needs": "Specific need description.",
  "cultural_background_summary": "Cultural notes."
}}
"#
    );
    Prompt { system: MARKET_ANALYST_SYSTEM.to_string(), user }
}

fn persona_preamble(profile: &CustomerProfile, product_info: &str) -> String {
    let concerns = if profile.main_concerns.is_empty() {
        "not specified".to_string()
    } else {
        profile.main_concerns.join(", ")
    };
    format!(
        "You are now role-playing as the customer: '{}'.\nYour background is: {}\nYour main concerns are: {concerns}.\nYou are considering purchasing a product with the following summary: '{product_info}'.",
        profile.name, profile.description
    )
}

const QUESTION_OUTPUT_RULES: &str = r#"The questions should exhibit a logical flow or continuity: each question follows from the answer you would expect to the previous one.
Respond with a JSON array of question objects, where each object has a "text" key containing the question string.
ONLY output the JSON array. If you cannot generate questions, output an empty JSON array: []
Example:
[
  {"text": "First question about product feature X related to my concern?"},
  {"text": "Follow-up question about pricing for feature X?"}
]
"#;

pub fn question_generation_prompt(segment: Segment, profile: &CustomerProfile, product_info: &str, count: usize) -> Prompt {
    let (system, focus) = match segment {
        Segment::B2b => (
            B2B_ROLEPLAYER_SYSTEM,
            "You are asking as a business buyer. Focus on professional purchasing topics: technical specifications, MOQ, pricing tiers, payment terms, lead time, logistics, certifications and compliance.",
        ),
        Segment::B2c => (
            B2C_ROLEPLAYER_SYSTEM,
            "You are asking as an individual consumer. Keep the tone casual and focus on everyday topics: ease of use, appearance, durability, returns and refunds, and how it compares with similar products.",
        ),
    };
    let user = format!(
        "{}\n\n{focus}\nPlease generate exactly {count} distinct {segment} questions you would ask sequentially about this product.\n{QUESTION_OUTPUT_RULES}",
        persona_preamble(profile, product_info)
    );
    Prompt { system: system.to_string(), user }
}

/// Single undifferentiated question list, used by the flat layout.
pub fn legacy_question_prompt(profile: &CustomerProfile, product_info: &str, count: usize) -> Prompt {
    let user = format!(
        "{}\n\nPlease generate exactly {count} distinct questions you would ask sequentially about this product.\nThe questions should be relevant to your customer profile (concerns, needs, background) and typical for foreign trade interactions (e.g., about price, logistics, technical specs, after-sales service, compliance).\n{QUESTION_OUTPUT_RULES}",
        persona_preamble(profile, product_info)
    );
    Prompt { system: CUSTOMER_ROLEPLAYER_SYSTEM.to_string(), user }
}
