//! Builds the prompt for scheduled check-ins.
//!
//! A check-in turn starts from empty history, so the prompt itself carries the
//! context: the current summary, the last check-in, recent memories and any
//! skills tagged `check-in`. Only the summary is required; the other sections
//! are skipped with a warning when their lookup fails.

use chrono::Local;
use openloop_core::error::Result;
use openloop_core::store::Store;
use std::fmt::Write;
use tracing::warn;

/// Days of memories included in a check-in.
pub const CHECK_IN_MEMORY_DAYS: i64 = 7;

/// Skills carrying this tag are appended to every check-in prompt.
pub const CHECK_IN_SKILL_TAG: &str = "check-in";

const CLOSING_INSTRUCTIONS: &str = "Based on the above, provide a brief check-in. Reference specific memories and past context where relevant. If there are blockers from previous conversations, ask if they're resolved. Mention overdue items. Suggest priorities. Keep it concise and useful.";

pub async fn build_check_in_prompt(store: &dyn Store) -> Result<String> {
    match store.prune_expired_memories().await {
        Ok(0) => {}
        Ok(pruned) => tracing::debug!(pruned, "Pruned expired memories"),
        Err(e) => warn!(error = %e, "Pruning memories failed"),
    }

    let summary = store.summary(Local::now().date_naive()).await?;
    let summary_json = serde_json::to_string_pretty(&summary)?;

    let mut prompt = String::from("It's time for a check-in.\n\n## Summary\n");
    prompt.push_str(&summary_json);

    prompt.push_str("\n\n## Last Check-In\n");
    match store.last_check_in().await {
        Ok(Some(last)) => {
            let _ = write!(prompt, "({}): {}", last.created_at.format("%Y-%m-%d %H:%M"), last.summary);
        }
        Ok(None) => prompt.push_str("This is the first check-in."),
        Err(e) => {
            warn!(error = %e, "Loading last check-in failed");
            prompt.push_str("This is the first check-in.");
        }
    }

    match store.recent_memories_for_check_in(CHECK_IN_MEMORY_DAYS).await {
        Ok(memories) if !memories.is_empty() => {
            let _ = write!(prompt, "\n\n## Recent Memories (last {CHECK_IN_MEMORY_DAYS} days)\n");
            for m in &memories {
                let _ = writeln!(
                    prompt,
                    "- [{}] [{}] {}",
                    m.created_at.format("%Y-%m-%d %H:%M"),
                    m.category,
                    m.content
                );
            }
        }
        Ok(_) => {}
        Err(e) => warn!(error = %e, "Loading recent memories failed"),
    }

    match store.list_skills(Some(CHECK_IN_SKILL_TAG)).await {
        Ok(skills) if !skills.is_empty() => {
            prompt.push_str("\n\n## Available Skills\n");
            for s in &skills {
                let _ = write!(prompt, "**{}**: {}\n{}\n\n", s.name, s.description, s.content);
            }
        }
        Ok(_) => {}
        Err(e) => warn!(error = %e, "Loading check-in skills failed"),
    }

    prompt.push_str("\n\n");
    prompt.push_str(CLOSING_INSTRUCTIONS);
    Ok(prompt)
}
