//! Journal analysis flow: history merge, foundation-model call, extraction, persistence.

use std::sync::Arc;

use crate::analysis::{error_sentinel, extract_analysis, AnalysisError, JournalAnalysis, JournalEntryResponse};
use crate::generation::TextGenerator;
use crate::prompts::{format_history, journal_prompt, EMPTY_HISTORY};
use crate::store::LumiStore;

pub struct JournalAnalyzer {
    store: Arc<LumiStore>,
    generator: Arc<dyn TextGenerator>,
    history_limit: usize,
}

impl JournalAnalyzer {
    pub fn new(store: Arc<LumiStore>, generator: Arc<dyn TextGenerator>, history_limit: usize) -> Self {
        Self {
            store,
            generator,
            history_limit,
        }
    }

    /// Historical context for the prompt from the user's most recent entries.
    pub fn history_context(&self, user_id: &str) -> String {
        match self.store.recent_journal_entries(user_id, self.history_limit) {
            Ok(entries) => format_history(&entries),
            Err(e) => {
                tracing::warn!(error = %e, "error retrieving journal history");
                EMPTY_HISTORY.to_string()
            }
        }
    }

    pub async fn analyze(&self, user_id: &str, text: &str) -> Result<JournalAnalysis, AnalysisError> {
        let prompt = journal_prompt(text, &self.history_context(user_id));
        let raw = self.generator.generate(&prompt).await?;
        let analysis = extract_analysis(&raw)?;
        tracing::debug!(risk = %analysis.overall_risk_level, action = %analysis.action_required, "journal analyzed");
        Ok(analysis)
    }

    /// Analyze, persist, and shape the response for one entry.
    ///
    /// Failed analyses come back as the error sentinel and are not stored. A store failure
    /// is logged and the analysis is still returned.
    pub async fn record_entry(&self, user_id: &str, text: &str) -> JournalEntryResponse {
        let analysis = match self.analyze(user_id, text).await {
            Ok(analysis) => analysis,
            Err(e) => {
                tracing::warn!(error = %e, "journal analysis failed; returning error record");
                return JournalEntryResponse::from_analysis(text, error_sentinel());
            }
        };

        let stored = match self.store.append_journal_entry(user_id, text, &analysis) {
            Ok(stored) => stored,
            Err(e) => {
                tracing::error!(error = %e, "error saving journal entry");
                return JournalEntryResponse::from_analysis(text, analysis);
            }
        };
        if let Err(e) = self.store.save_cue_schedule(user_id, &analysis.coping_suggestions) {
            tracing::error!(error = %e, "error saving cues");
        }
        stored.to_response()
    }
}
