//! Integration test: JournalAnalyzer end to end with a scripted foundation model.
//!
//! Verifies the prompt carries history, good output is persisted with cues, and every
//! failure shape (no braces, broken JSON, missing fields, model error) yields the fixed
//! error record without touching the store.

use async_trait::async_trait;
use lumi_core::prompts::{EMPTY_HISTORY, HISTORY_SEPARATOR};
use lumi_core::{
    error_sentinel, GenerationError, JournalAnalyzer, JournalEntryResponse, LumiStore, TextGenerator,
};
use std::sync::{Arc, Mutex};

struct ScriptedModel {
    output: Result<String, u16>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    fn replying(text: &str) -> Arc<Self> {
        Arc::new(Self {
            output: Ok(text.to_string()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn failing(status: u16) -> Arc<Self> {
        Arc::new(Self {
            output: Err(status),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn last_prompt(&self) -> String {
        self.prompts.lock().unwrap().last().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl TextGenerator for ScriptedModel {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        match &self.output {
            Ok(text) => Ok(text.clone()),
            Err(status) => Err(GenerationError::Status(*status, "quota exceeded".to_string())),
        }
    }
}

fn model_output(theme: &str, confidence: &str) -> String {
    format!(
        r#"Here is your analysis:
{{
  "overall_risk_level": "LOW",
  "action_required": "PASS",
  "confidence_score": {confidence},
  "self_harm_flag": "No",
  "violence_flag": "No",
  "safety_comment": "No risk indicators.",
  "historical_pattern": "No clear pattern detected.",
  "essence_theme": "{theme}",
  "identified_strengths": ["Reflection", "Honesty"],
  "reappraisal_message": "This was one hard day, not every day.",
  "coping_suggestions": [
    "When I feel overwhelmed, I will step outside for five minutes.",
    "When I start ruminating, I will write down one thing I can control.",
    "When I get home, I will text a friend."
  ],
  "chatbot_context": [
    {{"Q": "What made today hard?", "A": "A tense meeting."}},
    {{"Q": "What helped?", "A": "A walk."}}
  ]
}}"#
    )
}

fn analyzer_with(model: Arc<ScriptedModel>) -> (tempfile::TempDir, Arc<LumiStore>, JournalAnalyzer) {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(LumiStore::open(Some(dir.path())).unwrap());
    let analyzer = JournalAnalyzer::new(Arc::clone(&store), model, 5);
    (dir, store, analyzer)
}

fn assert_error_record(response: &JournalEntryResponse, text: &str) {
    let expected = JournalEntryResponse::from_analysis(text, error_sentinel());
    assert_eq!(response, &expected);
    assert_eq!(response.overall_risk_level, "Error");
    assert_eq!(response.confidence_score, None);
}

#[tokio::test]
async fn good_output_is_persisted_with_cues() {
    let model = ScriptedModel::replying(&model_output("Work pressure", "0.15"));
    let (_dir, store, analyzer) = analyzer_with(Arc::clone(&model));

    let response = analyzer.record_entry("demo_user", "Meetings all day.").await;
    assert_eq!(response.essence_theme, "Work pressure");
    assert_eq!(response.entry_text, "Meetings all day.");
    assert!(response.entry_id.is_some());
    assert!(model.last_prompt().contains(EMPTY_HISTORY));

    let entries = store.journal_entries("demo_user").unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].to_response(), response);

    let cues = store.cue_schedules("demo_user").unwrap();
    assert_eq!(cues.len(), 1);
    assert_eq!(
        cues[0].cue_3.as_deref(),
        Some("When I get home, I will text a friend.")
    );
}

#[tokio::test]
async fn confidence_score_round_trips_unchanged() {
    let model = ScriptedModel::replying(&model_output("Calm evening", "\"0.42\""));
    let (_dir, store, analyzer) = analyzer_with(model);

    let created = analyzer.record_entry("demo_user", "Quiet night in.").await;
    assert_eq!(created.confidence_score, Some(0.42));

    let date = created.timestamp_utc.as_deref().unwrap()[..10].to_string();
    let fetched = store
        .latest_journal_entry_on("demo_user", &date)
        .unwrap()
        .unwrap()
        .to_response();
    assert_eq!(fetched.confidence_score, Some(0.42));
    assert_eq!(fetched, created);
}

#[tokio::test]
async fn history_of_prior_entries_is_merged_into_prompt() {
    let model = ScriptedModel::replying(&model_output("Sunday dread", "0.3"));
    let (_dir, _store, analyzer) = analyzer_with(Arc::clone(&model));

    analyzer.record_entry("demo_user", "first").await;
    analyzer.record_entry("demo_user", "second").await;
    analyzer.record_entry("demo_user", "third").await;

    let prompt = model.last_prompt();
    assert!(prompt.contains("Theme: Sunday dread,"));
    assert!(prompt.contains("Action Taken: PASS,"));
    assert_eq!(prompt.matches(HISTORY_SEPARATOR).count(), 1);
    assert!(!prompt.contains(EMPTY_HISTORY));
}

#[tokio::test]
async fn braceless_output_yields_error_record() {
    let model = ScriptedModel::replying("I'm unable to analyze this entry right now.");
    let (_dir, store, analyzer) = analyzer_with(model);

    let response = analyzer.record_entry("demo_user", "Hard day.").await;
    assert_error_record(&response, "Hard day.");
    assert!(store.journal_entries("demo_user").unwrap().is_empty());
    assert!(store.cue_schedules("demo_user").unwrap().is_empty());
}

#[tokio::test]
async fn malformed_json_yields_error_record() {
    let model = ScriptedModel::replying(r#"{"overall_risk_level": "LOW", "action_required": }"#);
    let (_dir, store, analyzer) = analyzer_with(model);

    let response = analyzer.record_entry("demo_user", "Hard day.").await;
    assert_error_record(&response, "Hard day.");
    assert!(store.journal_entries("demo_user").unwrap().is_empty());
}

#[tokio::test]
async fn missing_field_yields_error_record() {
    let output = model_output("Tired", "0.2").replace(r#""violence_flag": "No","#, "");
    let model = ScriptedModel::replying(&output);
    let (_dir, _store, analyzer) = analyzer_with(model);

    let response = analyzer.record_entry("demo_user", "Tired.").await;
    assert_error_record(&response, "Tired.");
}

#[tokio::test]
async fn model_error_yields_error_record() {
    let (_dir, store, analyzer) = analyzer_with(ScriptedModel::failing(429));

    let response = analyzer.record_entry("demo_user", "Hard day.").await;
    assert_error_record(&response, "Hard day.");
    assert!(store.journal_entries("demo_user").unwrap().is_empty());
}
