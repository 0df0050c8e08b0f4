use crate::{
    config::QuestionLayout,
    llm::{ChatGateway, ChatRequest, LlmError, Stage},
    models::{CustomerProfile, GenerationResult, IdAllocator, ProductInput, ProfileQuestions, Question, QuestionSplit, Segment},
    parser::{self, InvalidProfileFormat, ProfileDraft, SummaryOutcome},
    prompts,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Failures that abort a whole generation request.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error(transparent)]
    InvalidProfileFormat(#[from] InvalidProfileFormat),
}

/// Summarize, then generate profiles, then role-play questions for each profile.
///
/// Summary and question failures degrade (sentinel summary, fewer questions);
/// only the profile stage can fail the request.
pub struct Pipeline {
    gateway: Arc<dyn ChatGateway>,
    layout: QuestionLayout,
}

impl Pipeline {
    pub fn new(gateway: Arc<dyn ChatGateway>, layout: QuestionLayout) -> Self {
        Self { gateway, layout }
    }

    pub async fn run(&self, input: &ProductInput) -> Result<GenerationResult, PipelineError> {
        let profile_count = input.num_customer_profiles as usize;
        let question_count = input.num_questions_per_profile as usize;

        let summary = self.summarize(&input.product_document).await;
        let info_for_llm = match summary.usable() {
            Some(s) => s,
            None => {
                info!("↩️ Summary unusable, using raw product document as context");
                input.product_document.as_str()
            }
        };

        let drafts = self.generate_profiles(info_for_llm, profile_count).await?;

        let mut profile_ids = IdAllocator::default();
        let mut question_ids = IdAllocator::default();
        let mut customer_profiles = Vec::with_capacity(drafts.len().min(profile_count));
        for draft in drafts.into_iter().take(profile_count) {
            let mut profile = skeleton(draft, profile_ids.next("profile"), self.layout);
            profile.questions = self.generate_questions(&profile, info_for_llm, question_count, &mut question_ids).await;
            info!("✅ Profile '{}' finished with {} questions", profile.name, profile.questions.total());
            customer_profiles.push(profile);
        }

        Ok(GenerationResult { product_summary: Some(summary.text()), customer_profiles })
    }

    async fn summarize(&self, document: &str) -> SummaryOutcome {
        let request = ChatRequest::for_stage(Stage::Summary, prompts::product_summary_prompt(document).into_messages());
        match self.gateway.call(request).await {
            Ok(raw) => parser::parse_summary(&raw),
            Err(e) => {
                warn!("⚠️ Summary stage failed, continuing without summary: {}", e);
                SummaryOutcome::Unavailable(e.to_string())
            }
        }
    }

    async fn generate_profiles(&self, info: &str, count: usize) -> Result<Vec<ProfileDraft>, PipelineError> {
        let stage = Stage::Profiles { count };
        let request = ChatRequest::for_stage(stage, prompts::profile_generation_prompt(info, count).into_messages());
        let raw = self.gateway.call(request).await?;
        let drafts = parser::parse_profiles(&raw)?;
        info!("👥 Model returned {} profiles ({} requested)", drafts.len(), count);
        Ok(drafts)
    }

    async fn generate_questions(
        &self,
        profile: &CustomerProfile,
        info: &str,
        total: usize,
        ids: &mut IdAllocator,
    ) -> ProfileQuestions {
        let mut attach = |texts: Vec<String>| -> Vec<Question> {
            texts.into_iter().map(|text| Question { id: ids.next("q"), text }).collect()
        };
        match self.layout {
            QuestionLayout::Segmented => {
                let split = QuestionSplit::for_total(total);
                let (b2b, b2c) = tokio::join!(
                    self.segment_questions(Some(Segment::B2b), profile, info, split.b2b),
                    self.segment_questions(Some(Segment::B2c), profile, info, split.b2c),
                );
                ProfileQuestions::Segmented { b2b_questions: attach(b2b), b2c_questions: attach(b2c) }
            }
            QuestionLayout::Flat => {
                let questions = self.segment_questions(None, profile, info, total).await;
                ProfileQuestions::Flat { questions: attach(questions) }
            }
        }
    }

    /// At most `count` question texts; an error or unusable payload yields none.
    async fn segment_questions(
        &self,
        segment: Option<Segment>,
        profile: &CustomerProfile,
        info: &str,
        count: usize,
    ) -> Vec<String> {
        if count == 0 {
            return Vec::new();
        }
        let prompt = match segment {
            Some(s) => prompts::question_generation_prompt(s, profile, info, count),
            None => prompts::legacy_question_prompt(profile, info, count),
        };
        let stage = Stage::Questions { segment, count };
        match self.gateway.call(ChatRequest::for_stage(stage, prompt.into_messages())).await {
            Ok(raw) => {
                let mut texts = parser::parse_questions(&raw);
                texts.truncate(count);
                texts
            }
            Err(e) => {
                warn!("⚠️ [{}] failed for profile '{}': {}", stage, profile.name, e);
                Vec::new()
            }
        }
    }
}

fn skeleton(draft: ProfileDraft, id: String, layout: QuestionLayout) -> CustomerProfile {
    let questions = match layout {
        QuestionLayout::Segmented => ProfileQuestions::Segmented { b2b_questions: vec![], b2c_questions: vec![] },
        QuestionLayout::Flat => ProfileQuestions::Flat { questions: vec![] },
    };
    CustomerProfile {
        id,
        name: draft.name,
        description: draft.description,
        country_region: draft.country_region,
        occupation: draft.occupation,
        cognitive_level: draft.cognitive_level,
        main_concerns: draft.main_concerns,
        potential_needs: draft.potential_needs,
        cultural_background_summary: draft.cultural_background_summary,
        questions,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use std::collections::HashSet;
    use std::sync::Mutex;

    type Responder = Box<dyn Fn(&ChatRequest) -> Result<String, LlmError> + Send + Sync>;

    /// Answers from a closure and records every request it sees.
    pub(crate) struct ScriptedGateway {
        respond: Responder,
        pub(crate) seen: Mutex<Vec<ChatRequest>>,
    }

    impl ScriptedGateway {
        pub(crate) fn new(respond: impl Fn(&ChatRequest) -> Result<String, LlmError> + Send + Sync + 'static) -> Self {
            Self { respond: Box::new(respond), seen: Mutex::new(Vec::new()) }
        }

        fn stages(&self) -> Vec<Stage> {
            self.seen.lock().unwrap().iter().map(|r| r.stage).collect()
        }
    }

    #[async_trait]
    impl ChatGateway for ScriptedGateway {
        async fn call(&self, request: ChatRequest) -> Result<String, LlmError> {
            let out = (self.respond)(&request);
            self.seen.lock().unwrap().push(request);
            out
        }
    }

    fn profiles_json(n: usize) -> String {
        Value::Array((0..n).map(|i| json!({"name": format!("P{i}"), "description": "d"})).collect()).to_string()
    }

    fn questions_json(n: usize) -> String {
        Value::Array((0..n).map(|i| json!({"text": format!("Q{i}?")})).collect()).to_string()
    }

    /// Well-behaved backend that over-delivers by `extra` items per list.
    pub(crate) fn generous(extra: usize) -> impl Fn(&ChatRequest) -> Result<String, LlmError> + Send + Sync {
        move |req: &ChatRequest| {
            Ok(match req.stage {
                Stage::Summary => json!({"product_summary": "Compact solar charger."}).to_string(),
                Stage::Profiles { count } => profiles_json(count + extra),
                Stage::Questions { count, .. } => questions_json(count + extra),
            })
        }
    }

    fn input(profiles: u32, questions: u32) -> ProductInput {
        ProductInput {
            product_document: "Solar charger for campers".into(),
            num_customer_profiles: profiles,
            num_questions_per_profile: questions,
        }
    }

    fn segmented(p: &CustomerProfile) -> (&[Question], &[Question]) {
        match &p.questions {
            ProfileQuestions::Segmented { b2b_questions, b2c_questions } => (b2b_questions.as_slice(), b2c_questions.as_slice()),
            ProfileQuestions::Flat { .. } => panic!("expected segmented questions"),
        }
    }

    #[tokio::test]
    async fn profile_count_is_truncated_to_request() {
        for n in 1..=10u32 {
            let gw = Arc::new(ScriptedGateway::new(generous(2)));
            let result = Pipeline::new(gw, QuestionLayout::Segmented).run(&input(n, 2)).await.unwrap();
            assert_eq!(result.customer_profiles.len(), n as usize);
        }
    }

    #[tokio::test]
    async fn fewer_profiles_are_not_padded() {
        let gw = Arc::new(ScriptedGateway::new(|req: &ChatRequest| {
            Ok(match req.stage {
                Stage::Profiles { .. } => profiles_json(1),
                _ => "[]".to_string(),
            })
        }));
        let result = Pipeline::new(gw, QuestionLayout::Segmented).run(&input(4, 2)).await.unwrap();
        assert_eq!(result.customer_profiles.len(), 1);
    }

    #[tokio::test]
    async fn questions_split_floor_and_remainder() {
        for (total, want_b2b, want_b2c) in [(5, 2, 3), (4, 2, 2), (1, 0, 1), (10, 5, 5)] {
            let gw = Arc::new(ScriptedGateway::new(generous(3)));
            let result = Pipeline::new(gw.clone(), QuestionLayout::Segmented).run(&input(2, total)).await.unwrap();
            for profile in &result.customer_profiles {
                let (b2b, b2c) = segmented(profile);
                assert_eq!((b2b.len(), b2c.len()), (want_b2b, want_b2c), "total={total}");
            }
            let b2b_calls = gw
                .stages()
                .into_iter()
                .filter(|s| matches!(s, Stage::Questions { segment: Some(Segment::B2b), .. }))
                .count();
            assert_eq!(b2b_calls, if want_b2b == 0 { 0 } else { 2 });
        }
    }

    #[tokio::test]
    async fn stages_run_in_order() {
        let gw = Arc::new(ScriptedGateway::new(generous(0)));
        Pipeline::new(gw.clone(), QuestionLayout::Segmented).run(&input(1, 4)).await.unwrap();
        let stages = gw.stages();
        assert_eq!(stages.len(), 4);
        assert_eq!(stages[0], Stage::Summary);
        assert_eq!(stages[1], Stage::Profiles { count: 1 });
        let rest: HashSet<_> = stages[2..].iter().copied().collect();
        assert!(rest.contains(&Stage::Questions { segment: Some(Segment::B2b), count: 2 }));
        assert!(rest.contains(&Stage::Questions { segment: Some(Segment::B2c), count: 2 }));
    }

    #[tokio::test]
    async fn good_summary_becomes_context() {
        let gw = Arc::new(ScriptedGateway::new(generous(0)));
        let result = Pipeline::new(gw.clone(), QuestionLayout::Segmented).run(&input(1, 2)).await.unwrap();
        assert_eq!(result.product_summary.as_deref(), Some("Compact solar charger."));
        let seen = gw.seen.lock().unwrap();
        assert!(seen[1].messages[1].content.contains("Product Info/Summary: Compact solar charger."));
    }

    #[tokio::test]
    async fn malformed_summary_falls_back_to_document() {
        let gw = Arc::new(ScriptedGateway::new(|req: &ChatRequest| {
            Ok(match req.stage {
                Stage::Summary => "Sure! Here is a summary: it charges things".to_string(),
                Stage::Profiles { count } => profiles_json(count),
                Stage::Questions { count, .. } => questions_json(count),
            })
        }));
        let result = Pipeline::new(gw.clone(), QuestionLayout::Segmented).run(&input(1, 2)).await.unwrap();
        let summary = result.product_summary.unwrap();
        assert!(summary.starts_with("Summary JSON from AI was malformed."));
        let seen = gw.seen.lock().unwrap();
        assert!(seen[1].messages[1].content.contains("Product Info/Summary: Solar charger for campers"));
        assert!(seen[2].messages[1].content.contains("'Solar charger for campers'"));
    }

    #[tokio::test]
    async fn summary_gateway_failure_degrades() {
        let gw = Arc::new(ScriptedGateway::new(|req: &ChatRequest| match req.stage {
            Stage::Summary => Err(LlmError::Unavailable("connection reset".into())),
            Stage::Profiles { count } => Ok(profiles_json(count)),
            Stage::Questions { count, .. } => Ok(questions_json(count)),
        }));
        let result = Pipeline::new(gw, QuestionLayout::Segmented).run(&input(2, 2)).await.unwrap();
        assert!(result.product_summary.unwrap().contains("connection reset"));
        assert_eq!(result.customer_profiles.len(), 2);
    }

    #[tokio::test]
    async fn profile_stage_failures_abort() {
        let gw = Arc::new(ScriptedGateway::new(|req: &ChatRequest| match req.stage {
            Stage::Profiles { .. } => Ok(json!({"name": "not a list"}).to_string()),
            _ => Ok("{}".to_string()),
        }));
        let err = Pipeline::new(gw.clone(), QuestionLayout::Segmented).run(&input(2, 2)).await.unwrap_err();
        assert!(matches!(err, PipelineError::InvalidProfileFormat(_)));
        assert_eq!(gw.stages().len(), 2);

        let gw = Arc::new(ScriptedGateway::new(|req: &ChatRequest| match req.stage {
            Stage::Profiles { .. } => Err(LlmError::UpstreamHttp { status: 429, detail: json!({}) }),
            _ => Ok("{}".to_string()),
        }));
        let err = Pipeline::new(gw, QuestionLayout::Segmented).run(&input(2, 2)).await.unwrap_err();
        assert!(matches!(err, PipelineError::Llm(LlmError::UpstreamHttp { status: 429, .. })));
    }

    #[tokio::test]
    async fn question_failures_stay_local() {
        let gw = Arc::new(ScriptedGateway::new(|req: &ChatRequest| match req.stage {
            Stage::Summary => Ok("{}".to_string()),
            Stage::Profiles { count } => Ok(profiles_json(count)),
            Stage::Questions { segment: Some(Segment::B2b), .. } => Err(LlmError::MalformedResponse("boom".into())),
            Stage::Questions { .. } => Ok(json!([{"text": "Can I return it?"}, {"nope": true}]).to_string()),
        }));
        let result = Pipeline::new(gw, QuestionLayout::Segmented).run(&input(2, 4)).await.unwrap();
        assert_eq!(result.product_summary.as_deref(), Some(parser::SUMMARY_NOT_PROVIDED));
        for profile in &result.customer_profiles {
            let (b2b, b2c) = segmented(profile);
            assert!(b2b.is_empty());
            assert_eq!(b2c.len(), 1);
            assert_eq!(b2c[0].text, "Can I return it?");
        }
    }

    #[tokio::test]
    async fn flat_layout_makes_one_call_per_profile() {
        let gw = Arc::new(ScriptedGateway::new(generous(1)));
        let result = Pipeline::new(gw.clone(), QuestionLayout::Flat).run(&input(3, 5)).await.unwrap();
        for profile in &result.customer_profiles {
            match &profile.questions {
                ProfileQuestions::Flat { questions } => assert_eq!(questions.len(), 5),
                other => panic!("expected flat layout, got {other:?}"),
            }
        }
        let question_calls: Vec<_> = gw.stages().into_iter().skip(2).collect();
        assert_eq!(question_calls, vec![Stage::Questions { segment: None, count: 5 }; 3]);
    }

    #[tokio::test]
    async fn ids_are_local_and_unique() {
        let gw = Arc::new(ScriptedGateway::new(|req: &ChatRequest| {
            Ok(match req.stage {
                Stage::Summary => "{}".to_string(),
                Stage::Profiles { count } => Value::Array(
                    (0..count).map(|_| json!({"id": "llm-id", "name": "Same"})).collect(),
                )
                .to_string(),
                Stage::Questions { count, .. } => Value::Array(
                    (0..count).map(|_| json!({"id": "llm-q", "text": "Same?"})).collect(),
                )
                .to_string(),
            })
        }));
        let result = Pipeline::new(gw, QuestionLayout::Segmented).run(&input(5, 6)).await.unwrap();
        let profile_ids: HashSet<_> = result.customer_profiles.iter().map(|p| p.id.clone()).collect();
        assert_eq!(profile_ids.len(), 5);
        assert!(profile_ids.iter().all(|id| id.starts_with("profile-")));

        let question_ids: Vec<_> = result
            .customer_profiles
            .iter()
            .flat_map(|p| {
                let (b2b, b2c) = segmented(p);
                b2b.iter().chain(b2c.iter()).map(|q| q.id.clone()).collect::<Vec<_>>()
            })
            .collect();
        assert_eq!(question_ids.len(), 30);
        assert_eq!(question_ids.iter().collect::<HashSet<_>>().len(), 30);
        assert!(question_ids.iter().all(|id| id.starts_with("q-")));
    }
}
