//! Habit reminder state in the `habit_progress` tree.
//!
//! Fetching pending habits is a mutating read: every habit returned is marked
//! completed for `today`, so the chat reminder fires at most once per habit per day.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::store::{scan_user, LumiStore, StoreError, UserRecord};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HabitRecord {
    pub user_id: String,
    pub habit_id: String,
    pub habit_name: String,
    #[serde(default)]
    pub is_active: bool,
    /// ISO date (`YYYY-MM-DD`) of the last completion; empty if never completed.
    #[serde(default)]
    pub last_completed: String,
}

impl UserRecord for HabitRecord {
    fn owner(&self) -> &str {
        &self.user_id
    }
}

fn habit_key(user_id: &str, habit_id: &str) -> String {
    format!("{}/{}", user_id, habit_id)
}

impl LumiStore {
    pub fn register_habit(
        &self,
        user_id: &str,
        habit_name: &str,
        is_active: bool,
    ) -> Result<HabitRecord, StoreError> {
        let habit = HabitRecord {
            user_id: user_id.to_string(),
            habit_id: Uuid::new_v4().to_string(),
            habit_name: habit_name.to_string(),
            is_active,
            last_completed: String::new(),
        };
        self.put_habit(&habit)?;
        tracing::info!(user_id, habit = %habit.habit_name, "habit registered");
        Ok(habit)
    }

    pub fn put_habit(&self, habit: &HabitRecord) -> Result<(), StoreError> {
        let key = habit_key(&habit.user_id, &habit.habit_id);
        self.habit_progress.insert(key.as_bytes(), serde_json::to_vec(habit)?)?;
        Ok(())
    }

    pub fn habits(&self, user_id: &str) -> Result<Vec<HabitRecord>, StoreError> {
        scan_user(&self.habit_progress, user_id)
    }

    /// Active habits not completed on `today`; each one returned is marked completed today.
    pub fn take_pending_habits(
        &self,
        user_id: &str,
        today: NaiveDate,
    ) -> Result<Vec<HabitRecord>, StoreError> {
        let today = today.format("%Y-%m-%d").to_string();
        let mut pending = Vec::new();
        for mut habit in self.habits(user_id)? {
            if !habit.is_active || habit.last_completed == today {
                continue;
            }
            pending.push(habit.clone());
            habit.last_completed = today.clone();
            self.put_habit(&habit)?;
        }
        Ok(pending)
    }
}
