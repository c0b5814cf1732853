//! Chat relay flow: emotion logging, habit reminders, prompt assembly, and the RAG call.

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::memory::ChatMemory;
use crate::prompts::{chat_prompt, habit_reminder, tone_hints};
use crate::relay::RagRelay;
use crate::store::{timestamp_utc, EmotionLog, LumiStore};

/// Stress recorded when a message carries an emotion but no score.
const DEFAULT_STRESS: f64 = 0.5;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatMessage {
    pub user_input: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub emotion: Option<String>,
    #[serde(default)]
    pub stress: Option<f64>,
    /// Set when the message was triggered by a risky social-media post.
    #[serde(default)]
    pub risky_tweet: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
}

impl ChatResponse {
    fn new(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
        }
    }
}

pub struct LumiChat {
    store: Arc<LumiStore>,
    memory: Arc<ChatMemory>,
    relay: Arc<dyn RagRelay>,
    default_user: String,
}

impl LumiChat {
    pub fn new(
        store: Arc<LumiStore>,
        memory: Arc<ChatMemory>,
        relay: Arc<dyn RagRelay>,
        default_user: impl Into<String>,
    ) -> Self {
        Self {
            store,
            memory,
            relay,
            default_user: default_user.into(),
        }
    }

    #[cfg(test)]
    pub(crate) fn memory(&self) -> &ChatMemory {
        &self.memory
    }

    /// Session key for a request: its user id, or the default user when absent or blank.
    pub fn session_id(&self, user_id: Option<&str>) -> String {
        user_id
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .unwrap_or(self.default_user.as_str())
            .to_string()
    }

    pub async fn respond(&self, message: &ChatMessage) -> ChatResponse {
        self.respond_on(message, Utc::now().date_naive()).await
    }

    /// Same as [`LumiChat::respond`] with an explicit "today" for the habit check.
    pub async fn respond_on(&self, message: &ChatMessage, today: NaiveDate) -> ChatResponse {
        let session = self.session_id(message.user_id.as_deref());
        let user_input = message.user_input.trim();
        tracing::info!(
            user_id = %session,
            emotion = ?message.emotion,
            stress = ?message.stress,
            risky_post = message.risky_tweet,
            "chat message received"
        );

        self.log_emotion(&session, message, user_input);

        if !message.risky_tweet {
            match self.store.take_pending_habits(&session, today) {
                Ok(pending) if !pending.is_empty() => {
                    let names: Vec<String> = pending.into_iter().map(|h| h.habit_name).collect();
                    tracing::info!(user_id = %session, count = names.len(), "returning habit reminder");
                    return ChatResponse::new(habit_reminder(&names));
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "error fetching habits"),
            }
        }

        let prompt = self.compose_prompt(&session, message);
        match self.relay.ask(&prompt).await {
            Ok(reply) => {
                self.memory.record(&session, user_input, &reply);
                ChatResponse::new(reply)
            }
            Err(e) => {
                tracing::error!(error = %e, "chat relay failed");
                ChatResponse::new(e.fallback_reply())
            }
        }
    }

    /// Prompt that would be sent for `message` in `session` right now.
    pub fn compose_prompt(&self, session: &str, message: &ChatMessage) -> String {
        let hints = tone_hints(message.risky_tweet, message.stress, message.emotion.as_deref());
        chat_prompt(&self.memory.transcript(session), &hints, message.user_input.trim())
    }

    /// Clear the memory of one session. Returns true if anything was cleared.
    pub fn reset(&self, user_id: Option<&str>) -> bool {
        let session = self.session_id(user_id);
        let cleared = self.memory.reset(&session);
        tracing::info!(user_id = %session, cleared, "chat memory reset");
        cleared
    }

    fn log_emotion(&self, session: &str, message: &ChatMessage, user_input: &str) {
        let emotion = message
            .emotion
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty());
        if emotion.is_none() && message.stress.is_none() {
            return;
        }
        let log = EmotionLog {
            user_id: session.to_string(),
            timestamp: timestamp_utc(Utc::now()),
            emotion: emotion.unwrap_or("unknown").to_string(),
            stress: message.stress.unwrap_or(DEFAULT_STRESS),
            message: user_input.to_string(),
        };
        if let Err(e) = self.store.log_emotion(&log) {
            tracing::warn!(error = %e, "error logging emotion");
        }
    }
}
