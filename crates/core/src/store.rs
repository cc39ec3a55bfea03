//! Store trait: persistence for everything the assistant tracks.
//!
//! The domain is intentionally flat:
//! - **things**: open loops with status, priority, tags and an optional due date
//! - **notes**: a key/value scratchpad
//! - **memories**: a timestamped journal with categories and optional expiry
//! - **check-ins**: summaries of past scheduled check-ins
//! - **skills**: named, reusable procedures the agent writes for itself
//! - **schedules** and **reminders**: what the scheduler fires

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use crate::error::StoreError;

/// Implements `as_str`, `Display` and `FromStr` for a lowercase string enum.
macro_rules! string_enum {
    ($ty:ident, $label:literal { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $ty {
            pub const ALL: &'static [$ty] = &[$($ty::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = StoreError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($ty::$variant),)+
                    other => Err(StoreError::InvalidInput(format!(
                        "invalid {} '{}'", $label, other
                    ))),
                }
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThingStatus {
    #[default]
    Open,
    Active,
    Done,
    Dropped,
}

string_enum!(ThingStatus, "status" { Open => "open", Active => "active", Done => "done", Dropped => "dropped" });

impl ThingStatus {
    /// Done and dropped things are closed; they are never overdue.
    pub fn is_closed(&self) -> bool {
        matches!(self, ThingStatus::Done | ThingStatus::Dropped)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

string_enum!(Priority, "priority" { Low => "low", Normal => "normal", High => "high", Urgent => "urgent" });

impl Priority {
    /// Listing order: urgent first.
    pub fn rank(&self) -> u8 {
        match self {
            Priority::Urgent => 0,
            Priority::High => 1,
            Priority::Normal => 2,
            Priority::Low => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryCategory {
    #[default]
    Observation,
    Decision,
    Blocker,
    Preference,
    Event,
    Reflection,
}

string_enum!(MemoryCategory, "category" {
    Observation => "observation",
    Decision => "decision",
    Blocker => "blocker",
    Preference => "preference",
    Event => "event",
    Reflection => "reflection",
});

impl MemoryCategory {
    /// Check-ins surface blockers, then decisions, then events, then the rest.
    pub fn check_in_rank(&self) -> u8 {
        match self {
            MemoryCategory::Blocker => 0,
            MemoryCategory::Decision => 1,
            MemoryCategory::Event => 2,
            _ => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thing {
    pub id: i64,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub status: ThingStatus,
    pub priority: Priority,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct NewThing {
    pub title: String,
    pub notes: Option<String>,
    pub priority: Priority,
    pub due_date: Option<NaiveDate>,
    pub tags: Vec<String>,
}

/// Fields to change on a thing; `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct ThingUpdate {
    pub title: Option<String>,
    pub notes: Option<String>,
    pub status: Option<ThingStatus>,
    pub priority: Option<Priority>,
    pub due_date: Option<NaiveDate>,
    pub tags: Option<Vec<String>>,
}

impl ThingUpdate {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.notes.is_none()
            && self.status.is_none()
            && self.priority.is_none()
            && self.due_date.is_none()
            && self.tags.is_none()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ThingFilter {
    pub status: Option<ThingStatus>,
    pub priority: Option<Priority>,
    pub tag: Option<String>,
}

impl ThingFilter {
    pub fn matches(&self, thing: &Thing) -> bool {
        self.status.is_none_or(|s| s == thing.status)
            && self.priority.is_none_or(|p| p == thing.priority)
            && self.tag.as_ref().is_none_or(|t| thing.tags.iter().any(|x| x == t))
    }
}

/// Snapshot used by `get_summary` and check-ins.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub open_count: i64,
    pub overdue: Vec<Thing>,
    pub recent: Vec<Thing>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Memory {
    pub id: i64,
    pub content: String,
    pub category: MemoryCategory,
    pub source: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thing_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Memory {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewMemory {
    pub content: String,
    pub category: MemoryCategory,
    pub source: String,
    pub tags: Vec<String>,
    pub thing_id: Option<i64>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct MemoryQuery {
    /// Full-text query; `None` lists newest first.
    pub query: Option<String>,
    pub category: Option<MemoryCategory>,
    pub tag: Option<String>,
    pub thing_id: Option<i64>,
    pub since: Option<DateTime<Utc>>,
    pub limit: usize,
}

pub const DEFAULT_MEMORY_LIMIT: usize = 10;

impl Default for MemoryQuery {
    fn default() -> Self {
        Self {
            query: None,
            category: None,
            tag: None,
            thing_id: None,
            since: None,
            limit: DEFAULT_MEMORY_LIMIT,
        }
    }
}

impl MemoryQuery {
    /// Filter checks shared by every backend (everything except the text match).
    pub fn matches_filters(&self, memory: &Memory) -> bool {
        self.category.is_none_or(|c| c == memory.category)
            && self.tag.as_ref().is_none_or(|t| memory.tags.iter().any(|x| x == t))
            && self.thing_id.is_none_or(|id| memory.thing_id == Some(id))
            && self.since.is_none_or(|since| memory.created_at >= since)
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryUpdate {
    pub content: Option<String>,
    pub category: Option<MemoryCategory>,
    pub tags: Option<Vec<String>>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl MemoryUpdate {
    pub fn is_empty(&self) -> bool {
        self.content.is_none() && self.category.is_none() && self.tags.is_none() && self.expires_at.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckIn {
    pub summary: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Skill {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct NewSkill {
    pub name: String,
    pub description: String,
    pub content: String,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SkillUpdate {
    pub description: Option<String>,
    pub content: Option<String>,
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub id: i64,
    pub name: String,
    pub cron_expr: String,
    pub prompt: String,
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewSchedule {
    pub name: String,
    pub cron_expr: String,
    pub prompt: String,
    pub enabled: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ScheduleUpdate {
    pub cron_expr: Option<String>,
    pub prompt: Option<String>,
    pub enabled: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reminder {
    pub id: i64,
    pub prompt: String,
    pub fire_at: DateTime<Utc>,
    pub fired: bool,
    pub created_at: DateTime<Utc>,
}

/// Maximum number of memories surfaced in a check-in prompt.
pub const CHECK_IN_MEMORY_LIMIT: usize = 20;

/// Number of most recently created things included in a [`Summary`].
pub const SUMMARY_RECENT_LIMIT: usize = 5;

/// The persistence contract.
///
/// Lookups by id or name that match nothing return [`StoreError::NotFound`]
/// for mutations and `None` for reads. Expired memories are invisible to
/// every read.
#[async_trait]
pub trait Store: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &str;

    // --- things ---
    async fn list_things(&self, filter: &ThingFilter) -> Result<Vec<Thing>, StoreError>;
    async fn create_thing(&self, thing: NewThing) -> Result<i64, StoreError>;
    async fn update_thing(&self, id: i64, update: ThingUpdate) -> Result<(), StoreError>;
    async fn complete_thing(&self, id: i64) -> Result<(), StoreError>;
    async fn summary(&self, today: NaiveDate) -> Result<Summary, StoreError>;

    // --- notes ---
    async fn get_note(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn set_note(&self, key: &str, value: &str) -> Result<(), StoreError>;

    // --- memories ---
    async fn save_memory(&self, memory: NewMemory) -> Result<i64, StoreError>;
    async fn search_memories(&self, query: &MemoryQuery) -> Result<Vec<Memory>, StoreError>;
    async fn list_recent_memories(
        &self,
        category: Option<MemoryCategory>,
        limit: usize,
    ) -> Result<Vec<Memory>, StoreError>;
    async fn recent_memories_for_check_in(&self, days: i64) -> Result<Vec<Memory>, StoreError>;
    async fn update_memory(&self, id: i64, update: MemoryUpdate) -> Result<(), StoreError>;
    async fn delete_memory(&self, id: i64) -> Result<(), StoreError>;
    async fn prune_expired_memories(&self) -> Result<u64, StoreError>;

    // --- check-ins ---
    async fn record_check_in(&self, summary: &str) -> Result<i64, StoreError>;
    async fn last_check_in(&self) -> Result<Option<CheckIn>, StoreError>;

    // --- skills ---
    async fn create_skill(&self, skill: NewSkill) -> Result<i64, StoreError>;
    async fn get_skill(&self, name: &str) -> Result<Option<Skill>, StoreError>;
    async fn list_skills(&self, tag: Option<&str>) -> Result<Vec<Skill>, StoreError>;
    async fn update_skill(&self, name: &str, update: SkillUpdate) -> Result<(), StoreError>;
    async fn delete_skill(&self, name: &str) -> Result<(), StoreError>;

    // --- schedules ---
    async fn list_schedules(&self, enabled_only: bool) -> Result<Vec<Schedule>, StoreError>;
    async fn get_schedule(&self, name: &str) -> Result<Option<Schedule>, StoreError>;
    async fn create_schedule(&self, schedule: NewSchedule) -> Result<i64, StoreError>;
    async fn update_schedule(&self, name: &str, update: ScheduleUpdate) -> Result<(), StoreError>;
    async fn delete_schedule(&self, name: &str) -> Result<(), StoreError>;
    async fn record_schedule_run(&self, id: i64, at: DateTime<Utc>) -> Result<(), StoreError>;

    // --- reminders ---
    async fn create_reminder(&self, prompt: &str, fire_at: DateTime<Utc>) -> Result<i64, StoreError>;
    async fn due_reminders(&self, now: DateTime<Utc>) -> Result<Vec<Reminder>, StoreError>;
    async fn list_reminders(&self, include_fired: bool) -> Result<Vec<Reminder>, StoreError>;
    async fn mark_reminder_fired(&self, id: i64) -> Result<(), StoreError>;
    async fn delete_reminder(&self, id: i64) -> Result<(), StoreError>;
}

/// Error for a skill lookup by name that matched nothing.
pub fn skill_not_found(name: &str) -> StoreError {
    StoreError::NotFound(format!("no such skill exists: {name}"))
}

/// Error for a schedule lookup by name that matched nothing.
pub fn schedule_not_found(name: &str) -> StoreError {
    StoreError::NotFound(format!("schedule not found: {name}"))
}
