//! The openloop agent: context budgeting and the tool-calling loop.
//!
//! A turn works like this:
//!
//! 1. **Append** the user's message to a copy of the caller's history
//! 2. **Budget** the history: total context minus the system prompt and the tool catalog
//! 3. **Trim** the oldest message groups until the history fits (tool exchanges stay whole)
//! 4. **Send** to the provider
//! 5. **If tool calls**: dispatch them, append the results, go back to step 3
//! 6. **If text**: return it with the full, untrimmed history
//!
//! The loop gives up after a fixed number of rounds and returns a fallback
//! reply along with whatever progress was made.

pub mod checkin;
pub mod context;
pub mod loop_runner;
pub mod prompt;
pub mod session;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use checkin::build_check_in_prompt;
pub use context::{
    MessageGroup, TokenEstimator, Trimmed, estimate_message_tokens, estimate_messages_tokens,
    estimate_tokens, estimate_tool_tokens, estimate_tools_tokens, group_messages, trim_messages,
    trim_messages_with,
};
pub use loop_runner::{AgentLoop, ROUND_LIMIT_REPLY, TurnOutcome, TurnRunner};
pub use prompt::SYSTEM_PROMPT;
pub use session::{ChatService, SessionStore};
