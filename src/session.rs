//! Write-once JSON record of each generation request, one directory per session.

use crate::models::{short_hex, CustomerProfile, GenerationResult, ProductInput};
use chrono::Local;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{error, info};

pub const INPUT_FILE: &str = "input_product_info.json";
pub const OUTPUT_FILE: &str = "generated_customer_data.json";

#[derive(Serialize)]
struct InputRecord<'a> {
    session_id: &'a str,
    generation_date: &'a str,
    product_document: &'a str,
    requested_profiles: u32,
    requested_questions_total_per_profile: u32,
}

#[derive(Serialize)]
struct OutputRecord<'a> {
    session_id: &'a str,
    generation_date: &'a str,
    product_summary_generated: Option<&'a str>,
    customer_profiles_generated: &'a [CustomerProfile],
}

#[derive(Debug, Clone)]
pub struct SessionLog {
    session_id: String,
    date: String,
    dir: PathBuf,
}

impl SessionLog {
    /// Picks a fresh `<YYYYMMDD>_<id>` directory under `root`; nothing is created until the first write.
    pub fn start(root: &Path) -> Self {
        let session_id = short_hex();
        let date = Local::now().format("%Y%m%d").to_string();
        let dir = root.join(format!("{date}_{session_id}"));
        Self { session_id, date, dir }
    }

    pub fn session_id(&self) -> &str { &self.session_id }

    pub async fn record_input(&self, input: &ProductInput) {
        let record = InputRecord {
            session_id: &self.session_id,
            generation_date: &self.date,
            product_document: &input.product_document,
            requested_profiles: input.num_customer_profiles,
            requested_questions_total_per_profile: input.num_questions_per_profile,
        };
        self.write_logged(INPUT_FILE, &record).await;
    }

    pub async fn record_output(&self, result: &GenerationResult) {
        let record = OutputRecord {
            session_id: &self.session_id,
            generation_date: &self.date,
            product_summary_generated: result.product_summary.as_deref(),
            customer_profiles_generated: &result.customer_profiles,
        };
        self.write_logged(OUTPUT_FILE, &record).await;
    }

    async fn write_logged<T: Serialize>(&self, filename: &str, value: &T) {
        match self.write_json(filename, value).await {
            Ok(path) => info!("💾 Session data saved to {}", path.display()),
            Err(e) => error!("❌ Failed to save {} for session {}: {}", filename, self.session_id, e),
        }
    }

    async fn write_json<T: Serialize>(&self, filename: &str, value: &T) -> std::io::Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(filename);
        let body = serde_json::to_string_pretty(value)?;
        tokio::fs::write(&path, body).await?;
        Ok(path)
    }
}
