//! Journal analysis schema and extraction from free-text model output.
//!
//! The model is asked for a single JSON object but often wraps it in prose or fences.
//! [`extract_analysis`] takes the span from the first `{` to the last `}` and parses it
//! strictly against [`JournalAnalysis`]; callers decide what to do with the error.

use serde::{Deserialize, Deserializer, Serialize};

/// One Q/A pair kept as context for later chatbot turns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatbotContextItem {
    #[serde(rename = "Q")]
    pub q: String,
    #[serde(rename = "A")]
    pub a: String,
}

/// Structured result of one journal analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalAnalysis {
    pub overall_risk_level: String,
    pub action_required: String,
    /// Model-reported risk probability. Accepts a number or a numeric string; not range-checked.
    #[serde(deserialize_with = "confidence_score")]
    pub confidence_score: Option<f64>,
    pub self_harm_flag: String,
    pub violence_flag: String,
    #[serde(default)]
    pub safety_comment: String,
    #[serde(default = "no_clear_pattern")]
    pub historical_pattern: String,
    pub essence_theme: String,
    pub identified_strengths: Vec<String>,
    pub reappraisal_message: String,
    pub coping_suggestions: Vec<String>,
    pub chatbot_context: Vec<ChatbotContextItem>,
}

impl JournalAnalysis {
    /// True for the fixed record returned when analysis failed.
    #[cfg(test)]
    pub(crate) fn is_error(&self) -> bool {
        self.overall_risk_level == ERROR_MARKER && self.action_required == ERROR_MARKER
    }
}

fn no_clear_pattern() -> String {
    "No clear pattern detected.".to_string()
}

fn confidence_score<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Score {
        Number(f64),
        Text(String),
    }

    match Option::<Score>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Score::Number(n)) => Ok(Some(n)),
        Some(Score::Text(s)) => {
            let s = s.trim();
            if s.is_empty() {
                return Ok(None);
            }
            s.parse::<f64>()
                .map(Some)
                .map_err(|_| serde::de::Error::custom(format!("confidence_score is not numeric: {:?}", s)))
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("model output has no JSON object")]
    NoJsonObject,
    #[error("model output does not match the analysis schema: {0}")]
    Schema(#[from] serde_json::Error),
    #[error("foundation model call failed: {0}")]
    Generation(#[from] crate::generation::GenerationError),
}

/// Parse the outermost `{ … }` span of `raw` as a [`JournalAnalysis`].
pub fn extract_analysis(raw: &str) -> Result<JournalAnalysis, AnalysisError> {
    let start = raw.find('{').ok_or(AnalysisError::NoJsonObject)?;
    let end = raw.rfind('}').ok_or(AnalysisError::NoJsonObject)?;
    if end < start {
        return Err(AnalysisError::NoJsonObject);
    }
    Ok(serde_json::from_str(&raw[start..=end])?)
}

const ERROR_MARKER: &str = "Error";

/// Fixed record returned (with HTTP 200) whenever analysis fails.
pub fn error_sentinel() -> JournalAnalysis {
    JournalAnalysis {
        overall_risk_level: ERROR_MARKER.to_string(),
        action_required: ERROR_MARKER.to_string(),
        confidence_score: None,
        self_harm_flag: "Error occurred while processing the safety check.".to_string(),
        violence_flag: "Error occurred while processing the safety check.".to_string(),
        safety_comment: "An error occurred while processing the safety check.".to_string(),
        historical_pattern: "An error occurred while analyzing historical patterns.".to_string(),
        essence_theme: "Error processing the journal entry.".to_string(),
        identified_strengths: Vec::new(),
        reappraisal_message:
            "An error occurred while analyzing your journal entry. Please try again later.".to_string(),
        coping_suggestions: Vec::new(),
        chatbot_context: Vec::new(),
    }
}

/// Body returned by the journal endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntryResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_utc: Option<String>,
    pub entry_text: String,
    pub overall_risk_level: String,
    pub action_required: String,
    pub confidence_score: Option<f64>,
    pub self_harm_flag: String,
    pub violence_flag: String,
    pub essence_theme: String,
    pub historical_pattern: String,
    pub identified_strengths: Vec<String>,
    pub reappraisal_message: String,
    pub coping_suggestions: Vec<String>,
    pub chatbot_context: Vec<ChatbotContextItem>,
}

impl JournalEntryResponse {
    pub fn from_analysis(entry_text: &str, analysis: JournalAnalysis) -> Self {
        Self {
            entry_id: None,
            timestamp_utc: None,
            entry_text: entry_text.to_string(),
            overall_risk_level: analysis.overall_risk_level,
            action_required: analysis.action_required,
            confidence_score: analysis.confidence_score,
            self_harm_flag: analysis.self_harm_flag,
            violence_flag: analysis.violence_flag,
            essence_theme: analysis.essence_theme,
            historical_pattern: analysis.historical_pattern,
            identified_strengths: analysis.identified_strengths,
            reappraisal_message: analysis.reappraisal_message,
            coping_suggestions: analysis.coping_suggestions,
            chatbot_context: analysis.chatbot_context,
        }
    }
}
