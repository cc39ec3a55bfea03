//! In-memory store, useful for testing and ephemeral sessions.
//!
//! Ordering and filtering mirror [`SqliteStore`](crate::SqliteStore); text
//! search is a case-insensitive substring match over content and tags.

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use openloop_core::error::StoreError;
use openloop_core::store::{
    CheckIn, Memory, MemoryCategory, MemoryQuery, MemoryUpdate, NewMemory, NewSchedule, NewSkill,
    NewThing, Reminder, Schedule, ScheduleUpdate, Skill, SkillUpdate, Store, Summary, Thing,
    ThingFilter, ThingStatus, ThingUpdate, CHECK_IN_MEMORY_LIMIT, SUMMARY_RECENT_LIMIT,
    schedule_not_found, skill_not_found,
};
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
struct Tables {
    next_id: i64,
    things: Vec<Thing>,
    notes: HashMap<String, String>,
    memories: Vec<Memory>,
    check_ins: Vec<CheckIn>,
    skills: Vec<Skill>,
    schedules: Vec<Schedule>,
    reminders: Vec<Reminder>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn thing_mut(&mut self, id: i64) -> Result<&mut Thing, StoreError> {
        self.things
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("thing {id} not found")))
    }

    fn memory_mut(&mut self, id: i64) -> Result<&mut Memory, StoreError> {
        self.memories
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("memory {id} not found")))
    }

    /// Memories that have not expired, newest first.
    fn live_memories(&self, now: DateTime<Utc>) -> Vec<&Memory> {
        let mut live: Vec<&Memory> = self.memories.iter().filter(|m| !m.is_expired(now)).collect();
        live.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        live
    }
}

/// A store that keeps everything in process memory.
#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn things_newest_first(things: &mut [Thing]) {
    things.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
}

#[async_trait]
impl Store for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn list_things(&self, filter: &ThingFilter) -> Result<Vec<Thing>, StoreError> {
        let tables = self.tables.read().await;
        let mut things: Vec<Thing> = tables
            .things
            .iter()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect();
        things.sort_by(|a, b| {
            a.priority
                .rank()
                .cmp(&b.priority.rank())
                .then(b.updated_at.cmp(&a.updated_at))
                .then(b.id.cmp(&a.id))
        });
        Ok(things)
    }

    async fn create_thing(&self, thing: NewThing) -> Result<i64, StoreError> {
        let mut tables = self.tables.write().await;
        let id = tables.next_id();
        let now = Utc::now();
        tables.things.push(Thing {
            id,
            title: thing.title,
            notes: thing.notes,
            status: ThingStatus::Open,
            priority: thing.priority,
            tags: thing.tags,
            due_date: thing.due_date,
            created_at: now,
            updated_at: now,
            completed_at: None,
        });
        Ok(id)
    }

    async fn update_thing(&self, id: i64, update: ThingUpdate) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let thing = tables.thing_mut(id)?;
        if let Some(title) = update.title {
            thing.title = title;
        }
        if let Some(notes) = update.notes {
            thing.notes = Some(notes);
        }
        if let Some(status) = update.status {
            thing.status = status;
        }
        if let Some(priority) = update.priority {
            thing.priority = priority;
        }
        if let Some(due_date) = update.due_date {
            thing.due_date = Some(due_date);
        }
        if let Some(tags) = update.tags {
            thing.tags = tags;
        }
        thing.updated_at = Utc::now();
        Ok(())
    }

    async fn complete_thing(&self, id: i64) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let thing = tables.thing_mut(id)?;
        let now = Utc::now();
        thing.status = ThingStatus::Done;
        thing.completed_at = Some(now);
        thing.updated_at = now;
        Ok(())
    }

    async fn summary(&self, today: NaiveDate) -> Result<Summary, StoreError> {
        let tables = self.tables.read().await;
        let open_count = tables
            .things
            .iter()
            .filter(|t| matches!(t.status, ThingStatus::Open | ThingStatus::Active))
            .count() as i64;

        let mut overdue: Vec<Thing> = tables
            .things
            .iter()
            .filter(|t| !t.status.is_closed() && t.due_date.is_some_and(|d| d < today))
            .cloned()
            .collect();
        overdue.sort_by(|a, b| a.due_date.cmp(&b.due_date).then(a.id.cmp(&b.id)));

        let mut recent = tables.things.clone();
        things_newest_first(&mut recent);
        recent.truncate(SUMMARY_RECENT_LIMIT);

        Ok(Summary {
            open_count,
            overdue,
            recent,
        })
    }

    async fn get_note(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.tables.read().await.notes.get(key).cloned())
    }

    async fn set_note(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.tables
            .write()
            .await
            .notes
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn save_memory(&self, memory: NewMemory) -> Result<i64, StoreError> {
        let mut tables = self.tables.write().await;
        let id = tables.next_id();
        let source = if memory.source.is_empty() {
            "agent".to_string()
        } else {
            memory.source
        };
        tables.memories.push(Memory {
            id,
            content: memory.content,
            category: memory.category,
            source,
            tags: memory.tags,
            thing_id: memory.thing_id,
            expires_at: memory.expires_at,
            created_at: Utc::now(),
        });
        Ok(id)
    }

    async fn search_memories(&self, query: &MemoryQuery) -> Result<Vec<Memory>, StoreError> {
        let tables = self.tables.read().await;
        let needle = query
            .query
            .as_deref()
            .map(|q| q.trim().to_lowercase())
            .filter(|q| !q.is_empty());

        Ok(tables
            .live_memories(Utc::now())
            .into_iter()
            .filter(|m| query.matches_filters(m))
            .filter(|m| {
                needle.as_ref().is_none_or(|n| {
                    m.content.to_lowercase().contains(n)
                        || m.tags.iter().any(|t| t.to_lowercase().contains(n))
                })
            })
            .take(query.limit)
            .cloned()
            .collect())
    }

    async fn list_recent_memories(
        &self,
        category: Option<MemoryCategory>,
        limit: usize,
    ) -> Result<Vec<Memory>, StoreError> {
        let query = MemoryQuery {
            category,
            limit,
            ..Default::default()
        };
        self.search_memories(&query).await
    }

    async fn recent_memories_for_check_in(&self, days: i64) -> Result<Vec<Memory>, StoreError> {
        let tables = self.tables.read().await;
        let now = Utc::now();
        let since = now - Duration::days(days);

        let mut memories: Vec<Memory> = tables
            .live_memories(now)
            .into_iter()
            .filter(|m| m.created_at >= since)
            .cloned()
            .collect();
        // stable: newest-first order survives within a category
        memories.sort_by_key(|m| m.category.check_in_rank());
        memories.truncate(CHECK_IN_MEMORY_LIMIT);
        Ok(memories)
    }

    async fn update_memory(&self, id: i64, update: MemoryUpdate) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let memory = tables.memory_mut(id)?;
        if let Some(content) = update.content {
            memory.content = content;
        }
        if let Some(category) = update.category {
            memory.category = category;
        }
        if let Some(tags) = update.tags {
            memory.tags = tags;
        }
        if let Some(expires_at) = update.expires_at {
            memory.expires_at = Some(expires_at);
        }
        Ok(())
    }

    async fn delete_memory(&self, id: i64) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let before = tables.memories.len();
        tables.memories.retain(|m| m.id != id);
        if tables.memories.len() == before {
            return Err(StoreError::NotFound(format!("memory {id} not found")));
        }
        Ok(())
    }

    async fn prune_expired_memories(&self) -> Result<u64, StoreError> {
        let mut tables = self.tables.write().await;
        let now = Utc::now();
        let before = tables.memories.len();
        tables.memories.retain(|m| !m.is_expired(now));
        Ok((before - tables.memories.len()) as u64)
    }

    async fn record_check_in(&self, summary: &str) -> Result<i64, StoreError> {
        let mut tables = self.tables.write().await;
        let id = tables.next_id();
        tables.check_ins.push(CheckIn {
            summary: summary.to_string(),
            created_at: Utc::now(),
        });
        Ok(id)
    }

    async fn last_check_in(&self) -> Result<Option<CheckIn>, StoreError> {
        Ok(self.tables.read().await.check_ins.last().cloned())
    }

    async fn create_skill(&self, skill: NewSkill) -> Result<i64, StoreError> {
        let mut tables = self.tables.write().await;
        if tables.skills.iter().any(|s| s.name == skill.name) {
            return Err(StoreError::InvalidInput(format!(
                "skill already exists: {}",
                skill.name
            )));
        }
        let id = tables.next_id();
        let now = Utc::now();
        tables.skills.push(Skill {
            id,
            name: skill.name,
            description: skill.description,
            content: skill.content,
            tags: skill.tags,
            created_at: now,
            updated_at: now,
        });
        Ok(id)
    }

    async fn get_skill(&self, name: &str) -> Result<Option<Skill>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.skills.iter().find(|s| s.name == name).cloned())
    }

    async fn list_skills(&self, tag: Option<&str>) -> Result<Vec<Skill>, StoreError> {
        let tables = self.tables.read().await;
        let mut skills: Vec<Skill> = tables
            .skills
            .iter()
            .filter(|s| tag.is_none_or(|t| s.tags.iter().any(|x| x == t)))
            .cloned()
            .collect();
        skills.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(skills)
    }

    async fn update_skill(&self, name: &str, update: SkillUpdate) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let skill = tables
            .skills
            .iter_mut()
            .find(|s| s.name == name)
            .ok_or_else(|| skill_not_found(name))?;
        if let Some(description) = update.description {
            skill.description = description;
        }
        if let Some(content) = update.content {
            skill.content = content;
        }
        if let Some(tags) = update.tags {
            skill.tags = tags;
        }
        skill.updated_at = Utc::now();
        Ok(())
    }

    async fn delete_skill(&self, name: &str) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let before = tables.skills.len();
        tables.skills.retain(|s| s.name != name);
        if tables.skills.len() == before {
            return Err(skill_not_found(name));
        }
        Ok(())
    }

    async fn list_schedules(&self, enabled_only: bool) -> Result<Vec<Schedule>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .schedules
            .iter()
            .filter(|s| !enabled_only || s.enabled)
            .cloned()
            .collect())
    }

    async fn get_schedule(&self, name: &str) -> Result<Option<Schedule>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.schedules.iter().find(|s| s.name == name).cloned())
    }

    async fn create_schedule(&self, schedule: NewSchedule) -> Result<i64, StoreError> {
        let mut tables = self.tables.write().await;
        if tables.schedules.iter().any(|s| s.name == schedule.name) {
            return Err(StoreError::InvalidInput(format!(
                "schedule already exists: {}",
                schedule.name
            )));
        }
        let id = tables.next_id();
        tables.schedules.push(Schedule {
            id,
            name: schedule.name,
            cron_expr: schedule.cron_expr,
            prompt: schedule.prompt,
            enabled: schedule.enabled,
            last_run: None,
            created_at: Utc::now(),
        });
        Ok(id)
    }

    async fn update_schedule(&self, name: &str, update: ScheduleUpdate) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let schedule = tables
            .schedules
            .iter_mut()
            .find(|s| s.name == name)
            .ok_or_else(|| schedule_not_found(name))?;
        if let Some(cron_expr) = update.cron_expr {
            schedule.cron_expr = cron_expr;
        }
        if let Some(prompt) = update.prompt {
            schedule.prompt = prompt;
        }
        if let Some(enabled) = update.enabled {
            schedule.enabled = enabled;
        }
        Ok(())
    }

    async fn delete_schedule(&self, name: &str) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let before = tables.schedules.len();
        tables.schedules.retain(|s| s.name != name);
        if tables.schedules.len() == before {
            return Err(schedule_not_found(name));
        }
        Ok(())
    }

    async fn record_schedule_run(&self, id: i64, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let schedule = tables
            .schedules
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("schedule {id} not found")))?;
        schedule.last_run = Some(at);
        Ok(())
    }

    async fn create_reminder(&self, prompt: &str, fire_at: DateTime<Utc>) -> Result<i64, StoreError> {
        let mut tables = self.tables.write().await;
        let id = tables.next_id();
        tables.reminders.push(Reminder {
            id,
            prompt: prompt.to_string(),
            fire_at,
            fired: false,
            created_at: Utc::now(),
        });
        Ok(id)
    }

    async fn due_reminders(&self, now: DateTime<Utc>) -> Result<Vec<Reminder>, StoreError> {
        let tables = self.tables.read().await;
        let mut due: Vec<Reminder> = tables
            .reminders
            .iter()
            .filter(|r| !r.fired && r.fire_at <= now)
            .cloned()
            .collect();
        due.sort_by(|a, b| a.fire_at.cmp(&b.fire_at).then(a.id.cmp(&b.id)));
        Ok(due)
    }

    async fn list_reminders(&self, include_fired: bool) -> Result<Vec<Reminder>, StoreError> {
        let tables = self.tables.read().await;
        let mut reminders: Vec<Reminder> = tables
            .reminders
            .iter()
            .filter(|r| include_fired || !r.fired)
            .cloned()
            .collect();
        reminders.sort_by(|a, b| a.fire_at.cmp(&b.fire_at).then(a.id.cmp(&b.id)));
        Ok(reminders)
    }

    async fn mark_reminder_fired(&self, id: i64) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let reminder = tables
            .reminders
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("reminder {id} not found")))?;
        reminder.fired = true;
        Ok(())
    }

    async fn delete_reminder(&self, id: i64) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let before = tables.reminders.len();
        tables.reminders.retain(|r| r.id != id);
        if tables.reminders.len() == before {
            return Err(StoreError::NotFound(format!("reminder {id} not found")));
        }
        Ok(())
    }
}
