//! Per-session chat memory.
//!
//! Each session (keyed by user id) keeps its own bounded list of exchanges, so
//! concurrent sessions never write into each other's transcript. The number of
//! sessions is capped too: opening a session past the cap evicts the one idle longest.

use dashmap::DashMap;
use std::collections::VecDeque;
use std::time::Instant;

/// Sessions kept by [`ChatMemory::new`].
pub const DEFAULT_MAX_SESSIONS: usize = 1000;

#[derive(Debug, Clone)]
struct Exchange {
    user: String,
    reply: String,
}

#[derive(Debug)]
struct SessionLog {
    exchanges: VecDeque<Exchange>,
    last_used: Instant,
}

pub struct ChatMemory {
    sessions: DashMap<String, SessionLog>,
    max_exchanges: usize,
    max_sessions: usize,
}

impl ChatMemory {
    pub fn new(max_exchanges: usize) -> Self {
        Self::with_session_cap(max_exchanges, DEFAULT_MAX_SESSIONS)
    }

    pub fn with_session_cap(max_exchanges: usize, max_sessions: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            max_exchanges: max_exchanges.max(1),
            max_sessions: max_sessions.max(1),
        }
    }

    /// Rendered transcript for `session`; empty when nothing was recorded since the last reset.
    pub fn transcript(&self, session: &str) -> String {
        self.sessions
            .get(session)
            .map(|log| {
                log.exchanges
                    .iter()
                    .map(|e| format!("User: {}\nLumi: {}", e.user, e.reply))
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .unwrap_or_default()
    }

    /// Append one user turn and its reply, dropping the oldest exchange past the cap.
    pub fn record(&self, session: &str, user: &str, reply: &str) {
        if !self.sessions.contains_key(session) && self.sessions.len() >= self.max_sessions {
            self.evict_idlest();
        }
        let mut log = self
            .sessions
            .entry(session.to_string())
            .or_insert_with(|| SessionLog {
                exchanges: VecDeque::new(),
                last_used: Instant::now(),
            });
        log.last_used = Instant::now();
        log.exchanges.push_back(Exchange {
            user: user.to_string(),
            reply: reply.to_string(),
        });
        while log.exchanges.len() > self.max_exchanges {
            log.exchanges.pop_front();
        }
    }

    /// Forget everything for `session`. Returns true if there was anything to forget.
    pub fn reset(&self, session: &str) -> bool {
        self.sessions.remove(session).is_some()
    }

    fn evict_idlest(&self) {
        let idlest = self
            .sessions
            .iter()
            .min_by_key(|entry| entry.value().last_used)
            .map(|entry| entry.key().clone());
        if let Some(session) = idlest {
            self.sessions.remove(&session);
            tracing::debug!(session = %session, "evicted idle chat session");
        }
    }

    #[cfg(test)]
    pub(crate) fn exchange_count(&self, session: &str) -> usize {
        self.sessions.get(session).map(|log| log.exchanges.len()).unwrap_or(0)
    }

    #[cfg(test)]
    pub(crate) fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

impl Default for ChatMemory {
    fn default() -> Self {
        Self::new(10)
    }
}
