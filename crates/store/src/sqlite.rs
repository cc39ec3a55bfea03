//! SQLite store with FTS5 full-text search over memories.
//!
//! One database file holds every table. Memories are mirrored into an
//! external-content FTS5 table (`memories_fts`) that triggers keep in sync on
//! insert, delete and update.
//!
//! Timestamps are stored as `YYYY-MM-DD HH:MM:SS` UTC text and dates as
//! `YYYY-MM-DD`, so plain string comparison orders them correctly.

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use openloop_core::error::StoreError;
use openloop_core::store::{
    CheckIn, Memory, MemoryCategory, MemoryQuery, MemoryUpdate, NewMemory, NewSchedule, NewSkill,
    NewThing, Reminder, Schedule, ScheduleUpdate, Skill, SkillUpdate, Store, Summary, Thing,
    ThingFilter, ThingUpdate, CHECK_IN_MEMORY_LIMIT, SUMMARY_RECENT_LIMIT, schedule_not_found,
    skill_not_found,
};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info, warn};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const DATE_FORMAT: &str = "%Y-%m-%d";

const THING_COLUMNS: &str =
    "id, title, notes, status, priority, tags, due_date, created_at, updated_at, completed_at";
const MEMORY_COLUMNS: &str =
    "m.id, m.content, m.category, m.source, m.tags, m.thing_id, m.expires_at, m.created_at";
const SKILL_COLUMNS: &str = "id, name, description, content, tags, created_at, updated_at";
const SCHEDULE_COLUMNS: &str = "id, name, cron_expr, prompt, enabled, last_run, created_at";
const REMINDER_COLUMNS: &str = "id, prompt, fire_at, fired, created_at";

const PRIORITY_ORDER: &str = "CASE priority WHEN 'urgent' THEN 0 WHEN 'high' THEN 1 \
     WHEN 'normal' THEN 2 ELSE 3 END";
const CHECK_IN_CATEGORY_ORDER: &str = "CASE m.category WHEN 'blocker' THEN 0 \
     WHEN 'decision' THEN 1 WHEN 'event' THEN 2 ELSE 3 END";

/// Schema statements, executed in order on every open.
const SCHEMA: &[(&str, &str)] = &[
    (
        "things table",
        r#"
        CREATE TABLE IF NOT EXISTS things (
            id           INTEGER PRIMARY KEY AUTOINCREMENT,
            title        TEXT NOT NULL,
            notes        TEXT,
            status       TEXT NOT NULL DEFAULT 'open',
            priority     TEXT NOT NULL DEFAULT 'normal',
            tags         TEXT NOT NULL DEFAULT '[]',
            due_date     TEXT,
            created_at   TEXT NOT NULL,
            updated_at   TEXT NOT NULL,
            completed_at TEXT
        )
        "#,
    ),
    (
        "notes table",
        r#"
        CREATE TABLE IF NOT EXISTS notes (
            key        TEXT PRIMARY KEY,
            value      TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    ),
    (
        "memories table",
        r#"
        CREATE TABLE IF NOT EXISTS memories (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            content    TEXT NOT NULL,
            category   TEXT NOT NULL DEFAULT 'observation',
            source     TEXT NOT NULL DEFAULT 'agent',
            tags       TEXT NOT NULL DEFAULT '[]',
            thing_id   INTEGER REFERENCES things(id) ON DELETE SET NULL,
            expires_at TEXT,
            created_at TEXT NOT NULL
        )
        "#,
    ),
    (
        "memories_fts table",
        r#"
        CREATE VIRTUAL TABLE IF NOT EXISTS memories_fts USING fts5(
            content,
            tags,
            content='memories',
            content_rowid='id'
        )
        "#,
    ),
    (
        "memories_ai trigger",
        r#"
        CREATE TRIGGER IF NOT EXISTS memories_ai AFTER INSERT ON memories BEGIN
            INSERT INTO memories_fts(rowid, content, tags) VALUES (new.id, new.content, new.tags);
        END
        "#,
    ),
    (
        "memories_ad trigger",
        r#"
        CREATE TRIGGER IF NOT EXISTS memories_ad AFTER DELETE ON memories BEGIN
            INSERT INTO memories_fts(memories_fts, rowid, content, tags)
            VALUES ('delete', old.id, old.content, old.tags);
        END
        "#,
    ),
    (
        "memories_au trigger",
        r#"
        CREATE TRIGGER IF NOT EXISTS memories_au AFTER UPDATE ON memories BEGIN
            INSERT INTO memories_fts(memories_fts, rowid, content, tags)
            VALUES ('delete', old.id, old.content, old.tags);
            INSERT INTO memories_fts(rowid, content, tags) VALUES (new.id, new.content, new.tags);
        END
        "#,
    ),
    (
        "memories created_at index",
        "CREATE INDEX IF NOT EXISTS idx_memories_created ON memories(created_at)",
    ),
    (
        "check_ins table",
        r#"
        CREATE TABLE IF NOT EXISTS check_ins (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            summary    TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    ),
    (
        "skills table",
        r#"
        CREATE TABLE IF NOT EXISTS skills (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            name        TEXT UNIQUE NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            content     TEXT NOT NULL,
            tags        TEXT NOT NULL DEFAULT '[]',
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        )
        "#,
    ),
    (
        "schedules table",
        r#"
        CREATE TABLE IF NOT EXISTS schedules (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            name       TEXT UNIQUE NOT NULL,
            cron_expr  TEXT NOT NULL,
            prompt     TEXT NOT NULL,
            enabled    INTEGER NOT NULL DEFAULT 1,
            last_run   TEXT,
            created_at TEXT NOT NULL
        )
        "#,
    ),
    (
        "reminders table",
        r#"
        CREATE TABLE IF NOT EXISTS reminders (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            prompt     TEXT NOT NULL,
            fire_at    TEXT NOT NULL,
            fired      INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        )
        "#,
    ),
    (
        "reminders fire_at index",
        "CREATE INDEX IF NOT EXISTS idx_reminders_due ON reminders(fired, fire_at)",
    ),
];

/// The production store.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and apply the schema.
    ///
    /// Pass `":memory:"` for an ephemeral database.
    pub async fn new(path: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| StoreError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .pragma("foreign_keys", "ON");

        // Every connection to ":memory:" is a separate database.
        let pool_options = if path.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(4)
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite store initialized at {path}");
        Ok(store)
    }

    /// An ephemeral database, mostly for tests.
    pub async fn in_memory() -> Result<Self, StoreError> {
        Self::new(":memory:").await
    }

    /// Wrap an existing pool and apply the schema.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        for (what, sql) in SCHEMA {
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::MigrationFailed(format!("{what}: {e}")))?;
        }
        debug!(statements = SCHEMA.len(), "SQLite schema applied");
        Ok(())
    }

    fn row_to_thing(row: &SqliteRow) -> Result<Thing, StoreError> {
        Ok(Thing {
            id: get(row, "id")?,
            title: get(row, "title")?,
            notes: get(row, "notes")?,
            status: parse_enum(&get::<String>(row, "status")?)?,
            priority: parse_enum(&get::<String>(row, "priority")?)?,
            tags: decode_tags(&get::<String>(row, "tags")?)?,
            due_date: get::<Option<String>>(row, "due_date")?
                .as_deref()
                .map(parse_date)
                .transpose()?,
            created_at: parse_timestamp(&get::<String>(row, "created_at")?)?,
            updated_at: parse_timestamp(&get::<String>(row, "updated_at")?)?,
            completed_at: parse_optional_timestamp(get(row, "completed_at")?)?,
        })
    }

    fn row_to_memory(row: &SqliteRow) -> Result<Memory, StoreError> {
        Ok(Memory {
            id: get(row, "id")?,
            content: get(row, "content")?,
            category: parse_enum(&get::<String>(row, "category")?)?,
            source: get(row, "source")?,
            tags: decode_tags(&get::<String>(row, "tags")?)?,
            thing_id: get(row, "thing_id")?,
            expires_at: parse_optional_timestamp(get(row, "expires_at")?)?,
            created_at: parse_timestamp(&get::<String>(row, "created_at")?)?,
        })
    }

    fn row_to_skill(row: &SqliteRow) -> Result<Skill, StoreError> {
        Ok(Skill {
            id: get(row, "id")?,
            name: get(row, "name")?,
            description: get(row, "description")?,
            content: get(row, "content")?,
            tags: decode_tags(&get::<String>(row, "tags")?)?,
            created_at: parse_timestamp(&get::<String>(row, "created_at")?)?,
            updated_at: parse_timestamp(&get::<String>(row, "updated_at")?)?,
        })
    }

    fn row_to_schedule(row: &SqliteRow) -> Result<Schedule, StoreError> {
        Ok(Schedule {
            id: get(row, "id")?,
            name: get(row, "name")?,
            cron_expr: get(row, "cron_expr")?,
            prompt: get(row, "prompt")?,
            enabled: get::<i64>(row, "enabled")? != 0,
            last_run: parse_optional_timestamp(get(row, "last_run")?)?,
            created_at: parse_timestamp(&get::<String>(row, "created_at")?)?,
        })
    }

    fn row_to_reminder(row: &SqliteRow) -> Result<Reminder, StoreError> {
        Ok(Reminder {
            id: get(row, "id")?,
            prompt: get(row, "prompt")?,
            fire_at: parse_timestamp(&get::<String>(row, "fire_at")?)?,
            fired: get::<i64>(row, "fired")? != 0,
            created_at: parse_timestamp(&get::<String>(row, "created_at")?)?,
        })
    }

    async fn fetch_things(
        &self,
        mut qb: QueryBuilder<'_, Sqlite>,
        what: &str,
    ) -> Result<Vec<Thing>, StoreError> {
        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("{what}: {e}")))?;
        rows.iter().map(Self::row_to_thing).collect()
    }

    async fn fetch_memories(
        &self,
        mut qb: QueryBuilder<'_, Sqlite>,
        what: &str,
    ) -> Result<Vec<Memory>, StoreError> {
        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("{what}: {e}")))?;
        rows.iter().map(Self::row_to_memory).collect()
    }

    /// Restrict `m` to non-expired memories matching every filter of `query`
    /// except the text.
    fn push_memory_filters(qb: &mut QueryBuilder<'_, Sqlite>, query: &MemoryQuery, now: DateTime<Utc>) {
        qb.push(" AND (m.expires_at IS NULL OR m.expires_at > ");
        qb.push_bind(format_timestamp(now));
        qb.push(")");
        if let Some(category) = query.category {
            qb.push(" AND m.category = ");
            qb.push_bind(category.as_str());
        }
        if let Some(tag) = &query.tag {
            qb.push(" AND EXISTS (SELECT 1 FROM json_each(m.tags) WHERE json_each.value = ");
            qb.push_bind(tag.clone());
            qb.push(")");
        }
        if let Some(thing_id) = query.thing_id {
            qb.push(" AND m.thing_id = ");
            qb.push_bind(thing_id);
        }
        if let Some(since) = query.since {
            qb.push(" AND m.created_at >= ");
            qb.push_bind(format_timestamp(since));
        }
    }

    fn select_memories<'q>(query: &MemoryQuery, now: DateTime<Utc>) -> QueryBuilder<'q, Sqlite> {
        let mut qb = QueryBuilder::new(format!("SELECT {MEMORY_COLUMNS} FROM memories m WHERE 1 = 1"));
        Self::push_memory_filters(&mut qb, query, now);
        qb
    }

    async fn exists(&self, table: &str, column: &str, key: SqlKey<'_>) -> Result<bool, StoreError> {
        let sql = format!("SELECT 1 FROM {table} WHERE {column} = ?1");
        let query = sqlx::query(&sql);
        let query = match key {
            SqlKey::Id(id) => query.bind(id),
            SqlKey::Name(name) => query.bind(name),
        };
        let row = query
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("{table} lookup: {e}")))?;
        Ok(row.is_some())
    }
}

enum SqlKey<'a> {
    Id(i64),
    Name(&'a str),
}

fn get<'r, T>(row: &'r SqliteRow, column: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, Sqlite> + sqlx::Type<Sqlite>,
{
    row.try_get(column)
        .map_err(|e| StoreError::QueryFailed(format!("Column {column}: {e}")))
}

fn parse_enum<T: FromStr<Err = StoreError>>(text: &str) -> Result<T, StoreError> {
    text.parse()
        .map_err(|e: StoreError| StoreError::QueryFailed(format!("Corrupt row: {e}")))
}

fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

fn parse_timestamp(text: &str) -> Result<DateTime<Utc>, StoreError> {
    NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| StoreError::QueryFailed(format!("Bad timestamp '{text}': {e}")))
}

fn parse_optional_timestamp(text: Option<String>) -> Result<Option<DateTime<Utc>>, StoreError> {
    text.as_deref().map(parse_timestamp).transpose()
}

fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn parse_date(text: &str) -> Result<NaiveDate, StoreError> {
    NaiveDate::parse_from_str(text, DATE_FORMAT)
        .map_err(|e| StoreError::QueryFailed(format!("Bad date '{text}': {e}")))
}

fn encode_tags(tags: &[String]) -> Result<String, StoreError> {
    serde_json::to_string(tags).map_err(|e| StoreError::Storage(format!("Tags serialization: {e}")))
}

fn decode_tags(text: &str) -> Result<Vec<String>, StoreError> {
    serde_json::from_str(text).map_err(|e| StoreError::QueryFailed(format!("Bad tags '{text}': {e}")))
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error().is_some_and(|d| d.is_unique_violation())
}

#[async_trait]
impl Store for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn list_things(&self, filter: &ThingFilter) -> Result<Vec<Thing>, StoreError> {
        let mut qb = QueryBuilder::new(format!("SELECT {THING_COLUMNS} FROM things WHERE 1 = 1"));
        if let Some(status) = filter.status {
            qb.push(" AND status = ");
            qb.push_bind(status.as_str());
        }
        if let Some(priority) = filter.priority {
            qb.push(" AND priority = ");
            qb.push_bind(priority.as_str());
        }
        if let Some(tag) = &filter.tag {
            qb.push(" AND EXISTS (SELECT 1 FROM json_each(things.tags) WHERE json_each.value = ");
            qb.push_bind(tag.clone());
            qb.push(")");
        }
        qb.push(format!(" ORDER BY {PRIORITY_ORDER}, updated_at DESC, id DESC"));
        self.fetch_things(qb, "List things").await
    }

    async fn create_thing(&self, thing: NewThing) -> Result<i64, StoreError> {
        let now = format_timestamp(Utc::now());
        let result = sqlx::query(
            r#"
            INSERT INTO things (title, notes, priority, tags, due_date, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
            "#,
        )
        .bind(&thing.title)
        .bind(&thing.notes)
        .bind(thing.priority.as_str())
        .bind(encode_tags(&thing.tags)?)
        .bind(thing.due_date.map(format_date))
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("INSERT thing failed: {e}")))?;

        let id = result.last_insert_rowid();
        debug!(id, title = %thing.title, "Created thing");
        Ok(id)
    }

    async fn update_thing(&self, id: i64, update: ThingUpdate) -> Result<(), StoreError> {
        let mut qb = QueryBuilder::<Sqlite>::new("UPDATE things SET ");
        let mut set = qb.separated(", ");
        set.push("updated_at = ");
        set.push_bind_unseparated(format_timestamp(Utc::now()));
        if let Some(title) = update.title {
            set.push("title = ");
            set.push_bind_unseparated(title);
        }
        if let Some(notes) = update.notes {
            set.push("notes = ");
            set.push_bind_unseparated(notes);
        }
        if let Some(status) = update.status {
            set.push("status = ");
            set.push_bind_unseparated(status.as_str());
        }
        if let Some(priority) = update.priority {
            set.push("priority = ");
            set.push_bind_unseparated(priority.as_str());
        }
        if let Some(due_date) = update.due_date {
            set.push("due_date = ");
            set.push_bind_unseparated(format_date(due_date));
        }
        if let Some(tags) = update.tags {
            set.push("tags = ");
            set.push_bind_unseparated(encode_tags(&tags)?);
        }
        qb.push(" WHERE id = ");
        qb.push_bind(id);

        let result = qb
            .build()
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("UPDATE thing failed: {e}")))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("thing {id} not found")));
        }
        Ok(())
    }

    async fn complete_thing(&self, id: i64) -> Result<(), StoreError> {
        let now = format_timestamp(Utc::now());
        let result = sqlx::query(
            "UPDATE things SET status = 'done', completed_at = ?1, updated_at = ?1 WHERE id = ?2",
        )
        .bind(&now)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("Complete thing failed: {e}")))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("thing {id} not found")));
        }
        Ok(())
    }

    async fn summary(&self, today: NaiveDate) -> Result<Summary, StoreError> {
        let open_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM things WHERE status IN ('open', 'active')")
                .fetch_one(&self.pool)
                .await
                .map_err(|e| StoreError::QueryFailed(format!("Open count: {e}")))?;

        let mut overdue = QueryBuilder::new(format!(
            "SELECT {THING_COLUMNS} FROM things \
             WHERE due_date IS NOT NULL AND status NOT IN ('done', 'dropped') AND due_date < "
        ));
        overdue.push_bind(format_date(today));
        overdue.push(" ORDER BY due_date, id");
        let overdue = self.fetch_things(overdue, "Overdue things").await?;

        let mut recent = QueryBuilder::new(format!(
            "SELECT {THING_COLUMNS} FROM things ORDER BY created_at DESC, id DESC LIMIT "
        ));
        recent.push_bind(SUMMARY_RECENT_LIMIT as i64);
        let recent = self.fetch_things(recent, "Recent things").await?;

        Ok(Summary {
            open_count,
            overdue,
            recent,
        })
    }

    async fn get_note(&self, key: &str) -> Result<Option<String>, StoreError> {
        sqlx::query_scalar("SELECT value FROM notes WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("Get note: {e}")))
    }

    async fn set_note(&self, key: &str, value: &str) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO notes (key, value, updated_at) VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(format_timestamp(Utc::now()))
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("Set note failed: {e}")))?;
        Ok(())
    }

    async fn save_memory(&self, memory: NewMemory) -> Result<i64, StoreError> {
        let source = if memory.source.is_empty() {
            "agent"
        } else {
            memory.source.as_str()
        };
        let result = sqlx::query(
            r#"
            INSERT INTO memories (content, category, source, tags, thing_id, expires_at, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&memory.content)
        .bind(memory.category.as_str())
        .bind(source)
        .bind(encode_tags(&memory.tags)?)
        .bind(memory.thing_id)
        .bind(memory.expires_at.map(format_timestamp))
        .bind(format_timestamp(Utc::now()))
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("INSERT memory failed: {e}")))?;

        let id = result.last_insert_rowid();
        debug!(id, category = %memory.category, "Saved memory");
        Ok(id)
    }

    async fn search_memories(&self, query: &MemoryQuery) -> Result<Vec<Memory>, StoreError> {
        let now = Utc::now();
        let limit = query.limit as i64;
        let text = query.query.as_deref().map(str::trim).filter(|t| !t.is_empty());

        let Some(text) = text else {
            let mut qb = Self::select_memories(query, now);
            qb.push(" ORDER BY m.created_at DESC, m.id DESC LIMIT ");
            qb.push_bind(limit);
            return self.fetch_memories(qb, "List memories").await;
        };

        let mut fts = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {MEMORY_COLUMNS} FROM memories_fts JOIN memories m ON m.id = memories_fts.rowid \
             WHERE memories_fts MATCH "
        ));
        fts.push_bind(text.to_string());
        Self::push_memory_filters(&mut fts, query, now);
        fts.push(" ORDER BY bm25(memories_fts) LIMIT ");
        fts.push_bind(limit);

        match fts.build().fetch_all(&self.pool).await {
            Ok(rows) => rows.iter().map(Self::row_to_memory).collect(),
            Err(e) => {
                warn!(error = %e, query = text, "FTS query rejected, falling back to substring match");
                let mut like = Self::select_memories(query, now);
                like.push(" AND m.content LIKE ");
                like.push_bind(format!("%{text}%"));
                like.push(" ORDER BY m.created_at DESC, m.id DESC LIMIT ");
                like.push_bind(limit);
                self.fetch_memories(like, "Substring memory search").await
            }
        }
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
        let now = Utc::now();
        let query = MemoryQuery {
            since: Some(now - Duration::days(days)),
            ..Default::default()
        };
        let mut qb = Self::select_memories(&query, now);
        qb.push(format!(
            " ORDER BY {CHECK_IN_CATEGORY_ORDER}, m.created_at DESC, m.id DESC LIMIT "
        ));
        qb.push_bind(CHECK_IN_MEMORY_LIMIT as i64);
        self.fetch_memories(qb, "Check-in memories").await
    }

    async fn update_memory(&self, id: i64, update: MemoryUpdate) -> Result<(), StoreError> {
        if update.is_empty() {
            return if self.exists("memories", "id", SqlKey::Id(id)).await? {
                Ok(())
            } else {
                Err(StoreError::NotFound(format!("memory {id} not found")))
            };
        }

        let mut qb = QueryBuilder::<Sqlite>::new("UPDATE memories SET ");
        let mut set = qb.separated(", ");
        if let Some(content) = update.content {
            set.push("content = ");
            set.push_bind_unseparated(content);
        }
        if let Some(category) = update.category {
            set.push("category = ");
            set.push_bind_unseparated(category.as_str());
        }
        if let Some(tags) = update.tags {
            set.push("tags = ");
            set.push_bind_unseparated(encode_tags(&tags)?);
        }
        if let Some(expires_at) = update.expires_at {
            set.push("expires_at = ");
            set.push_bind_unseparated(format_timestamp(expires_at));
        }
        qb.push(" WHERE id = ");
        qb.push_bind(id);

        let result = qb
            .build()
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("UPDATE memory failed: {e}")))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("memory {id} not found")));
        }
        Ok(())
    }

    async fn delete_memory(&self, id: i64) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM memories WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("DELETE memory failed: {e}")))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("memory {id} not found")));
        }
        Ok(())
    }

    async fn prune_expired_memories(&self) -> Result<u64, StoreError> {
        let result =
            sqlx::query("DELETE FROM memories WHERE expires_at IS NOT NULL AND expires_at <= ?1")
                .bind(format_timestamp(Utc::now()))
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::Storage(format!("Prune memories failed: {e}")))?;
        Ok(result.rows_affected())
    }

    async fn record_check_in(&self, summary: &str) -> Result<i64, StoreError> {
        let result = sqlx::query("INSERT INTO check_ins (summary, created_at) VALUES (?1, ?2)")
            .bind(summary)
            .bind(format_timestamp(Utc::now()))
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("INSERT check-in failed: {e}")))?;
        Ok(result.last_insert_rowid())
    }

    async fn last_check_in(&self) -> Result<Option<CheckIn>, StoreError> {
        let row = sqlx::query("SELECT summary, created_at FROM check_ins ORDER BY id DESC LIMIT 1")
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("Last check-in: {e}")))?;

        row.map(|row| -> Result<CheckIn, StoreError> {
            Ok(CheckIn {
                summary: get(&row, "summary")?,
                created_at: parse_timestamp(&get::<String>(&row, "created_at")?)?,
            })
        })
        .transpose()
    }

    async fn create_skill(&self, skill: NewSkill) -> Result<i64, StoreError> {
        let now = format_timestamp(Utc::now());
        let result = sqlx::query(
            r#"
            INSERT INTO skills (name, description, content, tags, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?5)
            "#,
        )
        .bind(&skill.name)
        .bind(&skill.description)
        .bind(&skill.content)
        .bind(encode_tags(&skill.tags)?)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::InvalidInput(format!("skill already exists: {}", skill.name))
            } else {
                StoreError::Storage(format!("INSERT skill failed: {e}"))
            }
        })?;
        Ok(result.last_insert_rowid())
    }

    async fn get_skill(&self, name: &str) -> Result<Option<Skill>, StoreError> {
        let sql = format!("SELECT {SKILL_COLUMNS} FROM skills WHERE name = ?1");
        let row = sqlx::query(&sql)
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("Get skill: {e}")))?;
        row.as_ref().map(Self::row_to_skill).transpose()
    }

    async fn list_skills(&self, tag: Option<&str>) -> Result<Vec<Skill>, StoreError> {
        let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT {SKILL_COLUMNS} FROM skills"));
        if let Some(tag) = tag {
            qb.push(" WHERE EXISTS (SELECT 1 FROM json_each(skills.tags) WHERE json_each.value = ");
            qb.push_bind(tag.to_string());
            qb.push(")");
        }
        qb.push(" ORDER BY created_at DESC, id DESC");

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("List skills: {e}")))?;
        rows.iter().map(Self::row_to_skill).collect()
    }

    async fn update_skill(&self, name: &str, update: SkillUpdate) -> Result<(), StoreError> {
        let mut qb = QueryBuilder::<Sqlite>::new("UPDATE skills SET ");
        let mut set = qb.separated(", ");
        set.push("updated_at = ");
        set.push_bind_unseparated(format_timestamp(Utc::now()));
        if let Some(description) = update.description {
            set.push("description = ");
            set.push_bind_unseparated(description);
        }
        if let Some(content) = update.content {
            set.push("content = ");
            set.push_bind_unseparated(content);
        }
        if let Some(tags) = update.tags {
            set.push("tags = ");
            set.push_bind_unseparated(encode_tags(&tags)?);
        }
        qb.push(" WHERE name = ");
        qb.push_bind(name.to_string());

        let result = qb
            .build()
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("UPDATE skill failed: {e}")))?;
        if result.rows_affected() == 0 {
            return Err(skill_not_found(name));
        }
        Ok(())
    }

    async fn delete_skill(&self, name: &str) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM skills WHERE name = ?1")
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("DELETE skill failed: {e}")))?;
        if result.rows_affected() == 0 {
            return Err(skill_not_found(name));
        }
        Ok(())
    }

    async fn list_schedules(&self, enabled_only: bool) -> Result<Vec<Schedule>, StoreError> {
        let mut sql = format!("SELECT {SCHEDULE_COLUMNS} FROM schedules");
        if enabled_only {
            sql.push_str(" WHERE enabled = 1");
        }
        sql.push_str(" ORDER BY id");

        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("List schedules: {e}")))?;
        rows.iter().map(Self::row_to_schedule).collect()
    }

    async fn get_schedule(&self, name: &str) -> Result<Option<Schedule>, StoreError> {
        let sql = format!("SELECT {SCHEDULE_COLUMNS} FROM schedules WHERE name = ?1");
        let row = sqlx::query(&sql)
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("Get schedule: {e}")))?;
        row.as_ref().map(Self::row_to_schedule).transpose()
    }

    async fn create_schedule(&self, schedule: NewSchedule) -> Result<i64, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO schedules (name, cron_expr, prompt, enabled, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&schedule.name)
        .bind(&schedule.cron_expr)
        .bind(&schedule.prompt)
        .bind(schedule.enabled)
        .bind(format_timestamp(Utc::now()))
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::InvalidInput(format!("schedule already exists: {}", schedule.name))
            } else {
                StoreError::Storage(format!("INSERT schedule failed: {e}"))
            }
        })?;
        Ok(result.last_insert_rowid())
    }

    async fn update_schedule(&self, name: &str, update: ScheduleUpdate) -> Result<(), StoreError> {
        if update.cron_expr.is_none() && update.prompt.is_none() && update.enabled.is_none() {
            return if self.exists("schedules", "name", SqlKey::Name(name)).await? {
                Ok(())
            } else {
                Err(schedule_not_found(name))
            };
        }

        let mut qb = QueryBuilder::<Sqlite>::new("UPDATE schedules SET ");
        let mut set = qb.separated(", ");
        if let Some(cron_expr) = update.cron_expr {
            set.push("cron_expr = ");
            set.push_bind_unseparated(cron_expr);
        }
        if let Some(prompt) = update.prompt {
            set.push("prompt = ");
            set.push_bind_unseparated(prompt);
        }
        if let Some(enabled) = update.enabled {
            set.push("enabled = ");
            set.push_bind_unseparated(enabled);
        }
        qb.push(" WHERE name = ");
        qb.push_bind(name.to_string());

        let result = qb
            .build()
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("UPDATE schedule failed: {e}")))?;
        if result.rows_affected() == 0 {
            return Err(schedule_not_found(name));
        }
        Ok(())
    }

    async fn delete_schedule(&self, name: &str) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM schedules WHERE name = ?1")
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("DELETE schedule failed: {e}")))?;
        if result.rows_affected() == 0 {
            return Err(schedule_not_found(name));
        }
        Ok(())
    }

    async fn record_schedule_run(&self, id: i64, at: DateTime<Utc>) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE schedules SET last_run = ?1 WHERE id = ?2")
            .bind(format_timestamp(at))
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("Record schedule run failed: {e}")))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("schedule {id} not found")));
        }
        Ok(())
    }

    async fn create_reminder(&self, prompt: &str, fire_at: DateTime<Utc>) -> Result<i64, StoreError> {
        let result =
            sqlx::query("INSERT INTO reminders (prompt, fire_at, created_at) VALUES (?1, ?2, ?3)")
                .bind(prompt)
                .bind(format_timestamp(fire_at))
                .bind(format_timestamp(Utc::now()))
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::Storage(format!("INSERT reminder failed: {e}")))?;
        Ok(result.last_insert_rowid())
    }

    async fn due_reminders(&self, now: DateTime<Utc>) -> Result<Vec<Reminder>, StoreError> {
        let sql = format!(
            "SELECT {REMINDER_COLUMNS} FROM reminders WHERE fired = 0 AND fire_at <= ?1 \
             ORDER BY fire_at, id"
        );
        let rows = sqlx::query(&sql)
            .bind(format_timestamp(now))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("Due reminders: {e}")))?;
        rows.iter().map(Self::row_to_reminder).collect()
    }

    async fn list_reminders(&self, include_fired: bool) -> Result<Vec<Reminder>, StoreError> {
        let filter = if include_fired { "" } else { " WHERE fired = 0" };
        let sql = format!("SELECT {REMINDER_COLUMNS} FROM reminders{filter} ORDER BY fire_at, id");
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("List reminders: {e}")))?;
        rows.iter().map(Self::row_to_reminder).collect()
    }

    async fn mark_reminder_fired(&self, id: i64) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE reminders SET fired = 1 WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("Mark reminder failed: {e}")))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("reminder {id} not found")));
        }
        Ok(())
    }

    async fn delete_reminder(&self, id: i64) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM reminders WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("DELETE reminder failed: {e}")))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("reminder {id} not found")));
        }
        Ok(())
    }
}
