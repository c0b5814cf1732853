//! Sled-backed store with one tree per table.
//!
//! | Tree | Key | Value |
//! |------|-----|-------|
//! | journal_entries | `{user_id}/{timestamp_utc}/{entry_id}` | [`StoredJournalEntry`] JSON |
//! | journal_cue_schedule | `{user_id}/{journal_timestamp}/{uuid}` | [`CueSchedule`] JSON |
//! | habit_progress | `{user_id}/{habit_id}` | [`crate::HabitRecord`] JSON |
//! | emotion_logs | `{user_id}/{timestamp}/{uuid}` | [`EmotionLog`] JSON |
//!
//! Timestamps are fixed-width ISO-8601 UTC, so key order within a user prefix is
//! chronological and a date prefix scan finds that day's entries.
//!
//! User ids must not contain `/` (see [`is_valid_user_id`]). Reads also drop any scanned
//! record whose own `user_id` differs from the requested one.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

use crate::analysis::{JournalAnalysis, JournalEntryResponse};

const DEFAULT_PATH: &str = "./data/lumi";

const JOURNAL_TREE: &str = "journal_entries";
const CUE_TREE: &str = "journal_cue_schedule";
const HABIT_TREE: &str = "habit_progress";
const EMOTION_TREE: &str = "emotion_logs";

/// Coping suggestions copied into a cue schedule.
const MAX_CUES: usize = 3;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sled: {0}")]
    Sled(#[from] sled::Error),
    #[error("stored record is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Key segment separator; not allowed inside a user id.
const KEY_SEPARATOR: char = '/';

/// True when `user_id` can be used as a key segment.
pub fn is_valid_user_id(user_id: &str) -> bool {
    !user_id.contains(KEY_SEPARATOR)
}

/// Records that carry the id of the user they belong to.
pub(crate) trait UserRecord {
    fn owner(&self) -> &str;
}

/// ISO-8601 UTC timestamp with microseconds, e.g. `2025-11-02T08:15:30.123456`.
pub fn timestamp_utc(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredJournalEntry {
    pub user_id: String,
    pub entry_id: String,
    pub timestamp_utc: String,
    pub text: String,
    #[serde(flatten)]
    pub analysis: JournalAnalysis,
}

impl UserRecord for StoredJournalEntry {
    fn owner(&self) -> &str {
        &self.user_id
    }
}

impl UserRecord for CueSchedule {
    fn owner(&self) -> &str {
        &self.user_id
    }
}

impl UserRecord for EmotionLog {
    fn owner(&self) -> &str {
        &self.user_id
    }
}

impl StoredJournalEntry {
    pub fn to_response(&self) -> JournalEntryResponse {
        let mut response = JournalEntryResponse::from_analysis(&self.text, self.analysis.clone());
        response.entry_id = Some(self.entry_id.clone());
        response.timestamp_utc = Some(self.timestamp_utc.clone());
        response
    }
}

/// Cue-action reminders derived from one analysis' coping suggestions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CueSchedule {
    pub user_id: String,
    pub journal_timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cue_1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cue_2: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cue_3: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionLog {
    pub user_id: String,
    pub timestamp: String,
    pub emotion: String,
    pub stress: f64,
    pub message: String,
}

pub struct LumiStore {
    db: sled::Db,
    journal: sled::Tree,
    cues: sled::Tree,
    pub(crate) habit_progress: sled::Tree,
    emotions: sled::Tree,
}

impl LumiStore {
    /// Open the store at `path` (default `./data/lumi`).
    pub fn open(path: Option<impl AsRef<Path>>) -> Result<Self, StoreError> {
        let p = path
            .map(|x| x.as_ref().to_path_buf())
            .unwrap_or_else(|| Path::new(DEFAULT_PATH).to_path_buf());
        let db = sled::open(p)?;
        Ok(Self {
            journal: db.open_tree(JOURNAL_TREE)?,
            cues: db.open_tree(CUE_TREE)?,
            habit_progress: db.open_tree(HABIT_TREE)?,
            emotions: db.open_tree(EMOTION_TREE)?,
            db,
        })
    }

    /// Append a journal entry with a fresh id, stamped now.
    pub fn append_journal_entry(
        &self,
        user_id: &str,
        text: &str,
        analysis: &JournalAnalysis,
    ) -> Result<StoredJournalEntry, StoreError> {
        self.append_journal_entry_at(user_id, text, analysis, Utc::now())
    }

    pub fn append_journal_entry_at(
        &self,
        user_id: &str,
        text: &str,
        analysis: &JournalAnalysis,
        at: DateTime<Utc>,
    ) -> Result<StoredJournalEntry, StoreError> {
        let entry = StoredJournalEntry {
            user_id: user_id.to_string(),
            entry_id: Uuid::new_v4().to_string(),
            timestamp_utc: timestamp_utc(at),
            text: text.to_string(),
            analysis: analysis.clone(),
        };
        let key = format!("{}/{}/{}", user_id, entry.timestamp_utc, entry.entry_id);
        self.journal.insert(key.as_bytes(), serde_json::to_vec(&entry)?)?;
        tracing::info!(user_id, entry_id = %entry.entry_id, "journal entry saved");
        Ok(entry)
    }

    /// All of the user's entries, oldest first.
    pub fn journal_entries(&self, user_id: &str) -> Result<Vec<StoredJournalEntry>, StoreError> {
        scan_user(&self.journal, user_id)
    }

    /// Up to `limit` most-recent entries, newest first.
    pub fn recent_journal_entries(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<StoredJournalEntry>, StoreError> {
        self.journal
            .scan_prefix(user_prefix(user_id).as_bytes())
            .rev()
            .filter_map(|r| owned_record(r, user_id).transpose())
            .take(limit)
            .collect()
    }

    /// Latest entry whose timestamp starts with `date_prefix` (e.g. `2025-11-02`).
    pub fn latest_journal_entry_on(
        &self,
        user_id: &str,
        date_prefix: &str,
    ) -> Result<Option<StoredJournalEntry>, StoreError> {
        let prefix = format!("{}{}", user_prefix(user_id), date_prefix);
        self.journal
            .scan_prefix(prefix.as_bytes())
            .rev()
            .find_map(|r| owned_record(r, user_id).transpose())
            .transpose()
    }

    /// Save cues from the first three coping suggestions of a journal analysis.
    pub fn save_cue_schedule(
        &self,
        user_id: &str,
        coping_suggestions: &[String],
    ) -> Result<CueSchedule, StoreError> {
        let mut cues = coping_suggestions.iter().take(MAX_CUES).cloned();
        let schedule = CueSchedule {
            user_id: user_id.to_string(),
            journal_timestamp: timestamp_utc(Utc::now()),
            cue_1: cues.next(),
            cue_2: cues.next(),
            cue_3: cues.next(),
        };
        let key = format!("{}/{}/{}", user_id, schedule.journal_timestamp, Uuid::new_v4());
        self.cues.insert(key.as_bytes(), serde_json::to_vec(&schedule)?)?;
        tracing::info!(user_id, "cues saved");
        Ok(schedule)
    }

    pub fn cue_schedules(&self, user_id: &str) -> Result<Vec<CueSchedule>, StoreError> {
        scan_user(&self.cues, user_id)
    }

    pub fn log_emotion(&self, log: &EmotionLog) -> Result<(), StoreError> {
        let key = format!("{}/{}/{}", log.user_id, log.timestamp, Uuid::new_v4());
        self.emotions.insert(key.as_bytes(), serde_json::to_vec(log)?)?;
        Ok(())
    }

    pub fn emotion_logs(&self, user_id: &str) -> Result<Vec<EmotionLog>, StoreError> {
        scan_user(&self.emotions, user_id)
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }
}

fn user_prefix(user_id: &str) -> String {
    format!("{}{}", user_id, KEY_SEPARATOR)
}

/// Decode one scanned record, keeping it only if it belongs to `user_id`.
fn owned_record<T>(
    item: sled::Result<(sled::IVec, sled::IVec)>,
    user_id: &str,
) -> Result<Option<T>, StoreError>
where
    T: DeserializeOwned + UserRecord,
{
    let (_, v) = item?;
    let record: T = serde_json::from_slice(&v)?;
    Ok((record.owner() == user_id).then_some(record))
}

/// All of `user_id`'s records in `tree`, in key order.
pub(crate) fn scan_user<T>(tree: &sled::Tree, user_id: &str) -> Result<Vec<T>, StoreError>
where
    T: DeserializeOwned + UserRecord,
{
    tree.scan_prefix(user_prefix(user_id).as_bytes())
        .filter_map(|r| owned_record(r, user_id).transpose())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::error_sentinel;
    use chrono::TimeZone;

    fn analysis(theme: &str) -> JournalAnalysis {
        JournalAnalysis {
            essence_theme: theme.to_string(),
            overall_risk_level: "LOW".to_string(),
            action_required: "PASS".to_string(),
            confidence_score: Some(0.25),
            coping_suggestions: vec!["a".into(), "b".into(), "c".into(), "d".into()],
            ..error_sentinel()
        }
    }

    fn temp_store() -> (tempfile::TempDir, LumiStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = LumiStore::open(Some(dir.path())).unwrap();
        (dir, store)
    }

    #[test]
    fn entries_are_listed_chronologically_per_user() {
        let (_dir, store) = temp_store();
        let day = |d: u32| Utc.with_ymd_and_hms(2025, 11, d, 9, 0, 0).unwrap();
        store.append_journal_entry_at("demo_user", "second", &analysis("b"), day(2)).unwrap();
        store.append_journal_entry_at("demo_user", "first", &analysis("a"), day(1)).unwrap();
        store.append_journal_entry_at("other", "not mine", &analysis("x"), day(1)).unwrap();

        let texts: Vec<_> = store
            .journal_entries("demo_user")
            .unwrap()
            .into_iter()
            .map(|e| e.text)
            .collect();
        assert_eq!(texts, vec!["first", "second"]);
    }

    #[test]
    fn user_prefix_does_not_match_longer_ids() {
        let (_dir, store) = temp_store();
        store.append_journal_entry("demo_user2", "x", &analysis("x")).unwrap();
        assert!(store.journal_entries("demo_user").unwrap().is_empty());
    }

    #[test]
    fn nested_user_id_records_stay_out_of_parent_reads() {
        let (_dir, store) = temp_store();
        let day = Utc.with_ymd_and_hms(2025, 11, 2, 9, 0, 0).unwrap();
        store.append_journal_entry_at("demo_user/mallory", "mallory secret", &analysis("m"), day).unwrap();
        store.append_journal_entry_at("demo_user", "mine", &analysis("d"), day).unwrap();
        store.save_cue_schedule("demo_user/mallory", &["c".into()]).unwrap();

        let texts: Vec<_> = store.journal_entries("demo_user").unwrap().into_iter().map(|e| e.text).collect();
        assert_eq!(texts, vec!["mine"]);
        let recent = store.recent_journal_entries("demo_user", 5).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].text, "mine");
        assert!(store.cue_schedules("demo_user").unwrap().is_empty());
        assert_eq!(store.journal_entries("demo_user/mallory").unwrap().len(), 1);
    }

    #[test]
    fn by_date_lookup_skips_records_of_other_users() {
        let (_dir, store) = temp_store();
        let day = Utc.with_ymd_and_hms(2025, 11, 2, 9, 0, 0).unwrap();
        store.append_journal_entry_at("demo_user/2025-11-02", "not mine", &analysis("x"), day).unwrap();
        assert!(store.latest_journal_entry_on("demo_user", "2025-11-02").unwrap().is_none());
    }

    #[test]
    fn slash_is_not_a_valid_user_id() {
        assert!(is_valid_user_id("demo_user"));
        assert!(!is_valid_user_id("demo_user/mallory"));
    }

    #[test]
    fn recent_entries_newest_first_and_limited() {
        let (_dir, store) = temp_store();
        for d in 1..=7 {
            let at = Utc.with_ymd_and_hms(2025, 11, d, 9, 0, 0).unwrap();
            store
                .append_journal_entry_at("demo_user", &format!("day {}", d), &analysis("t"), at)
                .unwrap();
        }
        let recent = store.recent_journal_entries("demo_user", 5).unwrap();
        assert_eq!(recent.len(), 5);
        assert_eq!(recent[0].text, "day 7");
        assert_eq!(recent[4].text, "day 3");
    }

    #[test]
    fn latest_entry_on_date() {
        let (_dir, store) = temp_store();
        let morning = Utc.with_ymd_and_hms(2025, 11, 2, 8, 0, 0).unwrap();
        let evening = Utc.with_ymd_and_hms(2025, 11, 2, 21, 30, 0).unwrap();
        let next_day = Utc.with_ymd_and_hms(2025, 11, 3, 7, 0, 0).unwrap();
        store.append_journal_entry_at("demo_user", "morning", &analysis("m"), morning).unwrap();
        store.append_journal_entry_at("demo_user", "evening", &analysis("e"), evening).unwrap();
        store.append_journal_entry_at("demo_user", "next", &analysis("n"), next_day).unwrap();

        let found = store.latest_journal_entry_on("demo_user", "2025-11-02").unwrap().unwrap();
        assert_eq!(found.text, "evening");
        assert!(store.latest_journal_entry_on("demo_user", "2025-10-01").unwrap().is_none());
    }

    #[test]
    fn confidence_score_round_trips() {
        let (_dir, store) = temp_store();
        let mut a = analysis("precise");
        a.confidence_score = Some(0.7300000000000001);
        let saved = store.append_journal_entry("demo_user", "text", &a).unwrap();
        let loaded = store.journal_entries("demo_user").unwrap();
        assert_eq!(loaded, vec![saved]);
        assert_eq!(loaded[0].analysis.confidence_score, Some(0.7300000000000001));
    }

    #[test]
    fn cue_schedule_takes_first_three_suggestions() {
        let (_dir, store) = temp_store();
        let schedule = store
            .save_cue_schedule("demo_user", &["a".into(), "b".into(), "c".into(), "d".into()])
            .unwrap();
        assert_eq!(schedule.cue_3.as_deref(), Some("c"));

        let short = store.save_cue_schedule("other", &["only".into()]).unwrap();
        assert_eq!(short.cue_1.as_deref(), Some("only"));
        assert_eq!(short.cue_2, None);
        assert_eq!(store.cue_schedules("other").unwrap(), vec![short]);
    }

    #[test]
    fn emotion_logs_are_kept_per_user() {
        let (_dir, store) = temp_store();
        let log = EmotionLog {
            user_id: "demo_user".to_string(),
            timestamp: timestamp_utc(Utc::now()),
            emotion: "sad".to_string(),
            stress: 0.5,
            message: "long day".to_string(),
        };
        store.log_emotion(&log).unwrap();
        assert_eq!(store.emotion_logs("demo_user").unwrap(), vec![log]);
    }

    #[test]
    fn same_instant_emotion_logs_are_both_kept() {
        let (_dir, store) = temp_store();
        let log = EmotionLog {
            user_id: "demo_user".to_string(),
            timestamp: "2025-11-02T08:00:00.000000".to_string(),
            emotion: "sad".to_string(),
            stress: 0.5,
            message: "one".to_string(),
        };
        store.log_emotion(&log).unwrap();
        store.log_emotion(&EmotionLog { message: "two".to_string(), ..log.clone() }).unwrap();
        assert_eq!(store.emotion_logs("demo_user").unwrap().len(), 2);

        store.save_cue_schedule("demo_user", &["a".into()]).unwrap();
        store.save_cue_schedule("demo_user", &["b".into()]).unwrap();
        assert_eq!(store.cue_schedules("demo_user").unwrap().len(), 2);
    }
}
