//! Scheduler: cron-driven check-ins and one-shot reminders.
//!
//! Schedules live in the store so the agent can create and edit them through
//! its tools. The scheduler reloads them periodically, matches their cron
//! expressions against local time once a minute and runs each firing as a
//! fresh agent turn. Reminders are polled on their own interval. Every reply
//! goes out through a [`Notifier`].

pub use openloop_core::cron::{CronError, CronExpr};

use chrono::{DateTime, Local, Timelike, Utc};
use futures::future::join_all;
use openloop_agent::{TurnRunner, build_check_in_prompt};
use openloop_config::SchedulerConfig;
use openloop_core::channel::Notifier;
use openloop_core::error::Result;
use openloop_core::event::{DomainEvent, EventBus};
use openloop_core::store::{NewSchedule, Reminder, Schedule, Store};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Name of the schedule seeded on first start.
pub const DEFAULT_SCHEDULE_NAME: &str = "morning-checkin";

pub const DEFAULT_SCHEDULE_PROMPT: &str = "Perform a morning check-in. Summarize pending work, mention overdue items, suggest priorities for the day.";

/// Prefix of the turn run when a reminder comes due.
pub const REMINDER_PREFIX: &str = "A reminder you set: ";

const TICK: Duration = Duration::from_secs(60);

/// A schedule whose cron expression parsed.
struct Loaded {
    schedule: Schedule,
    cron: CronExpr,
}

pub struct Scheduler {
    store: Arc<dyn Store>,
    runner: Arc<dyn TurnRunner>,
    notifier: Arc<dyn Notifier>,
    config: SchedulerConfig,
    event_bus: Arc<EventBus>,
    schedules: Vec<Loaded>,
    /// Minute (unix seconds / 60) each schedule last fired in this process
    fired: HashMap<i64, i64>,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn Store>,
        runner: Arc<dyn TurnRunner>,
        notifier: Arc<dyn Notifier>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            store,
            runner,
            notifier,
            config,
            event_bus: Arc::new(EventBus::default()),
            schedules: Vec::new(),
            fired: HashMap::new(),
        }
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = event_bus;
        self
    }

    /// Create the morning check-in when no schedules exist yet.
    ///
    /// Returns whether a schedule was created. An empty or unparseable
    /// `check_in_cron` seeds nothing.
    pub async fn seed_default_schedule(&self) -> Result<bool> {
        let cron_text = self.config.check_in_cron.trim();
        if cron_text.is_empty() || !self.store.list_schedules(false).await?.is_empty() {
            return Ok(false);
        }

        let cron = match CronExpr::parse(cron_text) {
            Ok(cron) => cron,
            Err(e) => {
                warn!(error = %e, "Not seeding the default schedule");
                return Ok(false);
            }
        };

        self.store
            .create_schedule(NewSchedule {
                name: DEFAULT_SCHEDULE_NAME.into(),
                cron_expr: cron.to_string(),
                prompt: DEFAULT_SCHEDULE_PROMPT.into(),
                enabled: true,
            })
            .await?;
        info!(cron = %cron, "Seeded default schedule");
        Ok(true)
    }

    /// Replace the in-memory schedule set with the enabled schedules in the
    /// store. Bad cron expressions are logged and skipped, and firing marks
    /// of schedules no longer loaded are dropped.
    pub async fn load_schedules(&mut self) -> Result<usize> {
        let schedules = self.store.list_schedules(true).await?;
        self.schedules = schedules
            .into_iter()
            .filter_map(|schedule| match CronExpr::parse(&schedule.cron_expr) {
                Ok(cron) => Some(Loaded { schedule, cron }),
                Err(e) => {
                    warn!(schedule = %schedule.name, error = %e, "Skipping schedule");
                    None
                }
            })
            .collect();

        let loaded: HashSet<i64> = self.schedules.iter().map(|l| l.schedule.id).collect();
        self.fired.retain(|id, _| loaded.contains(id));

        info!(count = self.schedules.len(), "Loaded schedules");
        Ok(self.schedules.len())
    }

    /// Schedules matching `now`, each at most once per minute.
    pub fn due_schedules(&mut self, now: DateTime<Local>) -> Vec<Schedule> {
        let minute = now.timestamp().div_euclid(60);
        let mut due = Vec::new();

        for loaded in &self.schedules {
            let id = loaded.schedule.id;
            if !loaded.cron.matches(&now) || self.fired.get(&id) == Some(&minute) {
                continue;
            }
            let ran_this_minute = loaded
                .schedule
                .last_run
                .is_some_and(|at| at.timestamp().div_euclid(60) == minute);
            if ran_this_minute {
                continue;
            }
            self.fired.insert(id, minute);
            due.push(loaded.schedule.clone());
        }

        due
    }

    /// Run one schedule: a check-in prompt followed by the schedule's own
    /// prompt, on empty history. The reply is stored as a check-in and delivered.
    pub async fn run_schedule(&self, schedule: &Schedule) -> Result<String> {
        let outcome = self.run_schedule_turn(schedule).await;
        self.event_bus.publish(DomainEvent::ScheduleFired {
            name: schedule.name.clone(),
            success: outcome.is_ok(),
            timestamp: Utc::now(),
        });
        let reply = outcome.inspect_err(|e| warn!(schedule = %schedule.name, error = %e, "Schedule failed"))?;

        if let Err(e) = self.store.record_schedule_run(schedule.id, Utc::now()).await {
            warn!(schedule = %schedule.name, error = %e, "Recording schedule run failed");
        }
        if let Err(e) = self.store.record_check_in(&reply).await {
            warn!(schedule = %schedule.name, error = %e, "Storing check-in failed");
        }
        self.deliver(&format!("schedule[{}]", schedule.name), &reply).await;

        info!(schedule = %schedule.name, "Schedule completed");
        Ok(reply)
    }

    async fn run_schedule_turn(&self, schedule: &Schedule) -> Result<String> {
        let check_in = build_check_in_prompt(self.store.as_ref()).await?;
        let prompt = format!("{check_in}\n\n{}", schedule.prompt);
        let outcome = self.runner.run_turn(&[], &prompt).await?;
        Ok(outcome.reply)
    }

    /// Fire every reminder due at `now`. A reminder whose turn fails stays
    /// pending and is retried on the next poll. Returns how many fired.
    pub async fn fire_reminders(&self, now: DateTime<Utc>) -> usize {
        let due = match self.store.due_reminders(now).await {
            Ok(due) => due,
            Err(e) => {
                warn!(error = %e, "Listing due reminders failed");
                return 0;
            }
        };

        let mut fired = 0;
        for reminder in due {
            if self.fire_reminder(&reminder).await {
                fired += 1;
            }
        }
        fired
    }

    async fn fire_reminder(&self, reminder: &Reminder) -> bool {
        let text = format!("{REMINDER_PREFIX}{}", reminder.prompt);
        let result = self.runner.run_turn(&[], &text).await;
        self.event_bus.publish(DomainEvent::ReminderFired {
            id: reminder.id,
            success: result.is_ok(),
            timestamp: Utc::now(),
        });

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(reminder = reminder.id, error = %e, "Reminder turn failed");
                return false;
            }
        };

        if let Err(e) = self.store.mark_reminder_fired(reminder.id).await {
            warn!(reminder = reminder.id, error = %e, "Marking reminder fired failed");
        }
        self.deliver(&format!("reminder[{}]", reminder.id), &outcome.reply).await;
        info!(reminder = reminder.id, "Fired reminder");
        true
    }

    async fn deliver(&self, label: &str, content: &str) {
        if let Err(e) = self.notifier.deliver(content).await {
            warn!(label, notifier = self.notifier.name(), error = %e, "Delivery failed");
            self.event_bus.publish(DomainEvent::ErrorOccurred {
                context: label.to_string(),
                error_message: e.to_string(),
                timestamp: Utc::now(),
            });
        }
    }

    /// Run until `shutdown` is cancelled.
    ///
    /// Seeds the default schedule, then ticks at the start of every local
    /// minute. Schedules are reloaded every `reload_secs` and reminders polled
    /// every `reminder_poll_secs`. An in-flight turn is abandoned on shutdown.
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<()> {
        if let Err(e) = self.seed_default_schedule().await {
            warn!(error = %e, "Seeding default schedule failed");
        }
        self.load_schedules().await?;

        let now = Local::now();
        let into_minute = Duration::from_secs(u64::from(now.second()))
            + Duration::from_nanos(u64::from(now.nanosecond() % 1_000_000_000));
        let first_tick = Instant::now() + TICK.saturating_sub(into_minute);
        let mut minute_tick = tokio::time::interval_at(first_tick, TICK);
        minute_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let reload_every = Duration::from_secs(self.config.reload_secs.max(1));
        let mut reload = tokio::time::interval_at(Instant::now() + reload_every, reload_every);
        reload.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut reminder_poll = tokio::time::interval(Duration::from_secs(self.config.reminder_poll_secs.max(1)));
        reminder_poll.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            schedules = self.schedules.len(),
            reload_secs = self.config.reload_secs,
            reminder_poll_secs = self.config.reminder_poll_secs,
            notifier = self.notifier.name(),
            "Scheduler started"
        );

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = minute_tick.tick() => {
                    let due = self.due_schedules(Local::now());
                    if due.is_empty() {
                        continue;
                    }
                    debug!(count = due.len(), "Schedules due");
                    let runs = join_all(due.iter().map(|s| self.run_schedule(s)));
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = runs => {}
                    }
                }
                _ = reload.tick() => {
                    if let Err(e) = self.load_schedules().await {
                        warn!(error = %e, "Reloading schedules failed");
                    }
                }
                _ = reminder_poll.tick() => {
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = self.fire_reminders(Utc::now()) => {}
                    }
                }
            }
        }

        info!("Scheduler stopped");
        Ok(())
    }
}
