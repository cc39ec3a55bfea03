//! Context window management.
//!
//! | Piece | Role |
//! |-------|------|
//! | [`token`] | Character-based token estimates for messages and tool schemas |
//! | [`trim`] | Grouping of tool exchanges and oldest-first trimming to a budget |

pub mod token;
pub mod trim;

pub use token::{
    TokenEstimator, estimate_message_tokens, estimate_messages_tokens, estimate_tokens,
    estimate_tool_tokens, estimate_tools_tokens,
};
pub use trim::{MessageGroup, Trimmed, group_messages, trim_messages, trim_messages_with};
