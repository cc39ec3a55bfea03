//! Grouping and trimming of conversation history under a token budget.
//!
//! History is partitioned into [`MessageGroup`]s: an ordinary message on its
//! own, or an invocation together with the result messages that immediately
//! follow it. Trimming drops whole groups, oldest first, so a tool call is
//! never separated from its results. The newest group is always kept, even
//! when it alone exceeds the budget.
//!
//! Because surviving groups always form a suffix of the input, trimming
//! returns a sub-slice of the caller's history and never copies messages.

use openloop_core::message::Message;
use super::token::TokenEstimator;

/// An indivisible run of messages.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MessageGroup<'a> {
    /// Messages of the group, in order
    pub messages: &'a [Message],

    /// Offset of the first message in the original history
    pub start: usize,

    /// Estimated cost of all messages in the group
    pub tokens: usize,
}

impl MessageGroup<'_> {
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Result of a trim, with enough detail to log what happened.
#[derive(Debug, Clone, Copy)]
pub struct Trimmed<'a> {
    /// The surviving suffix of the history
    pub messages: &'a [Message],
    pub dropped_groups: usize,
    pub tokens_before: usize,
    pub tokens_after: usize,
}

impl Trimmed<'_> {
    pub fn was_trimmed(&self) -> bool {
        self.dropped_groups > 0
    }

    pub fn dropped_messages(&self, original_len: usize) -> usize {
        original_len - self.messages.len()
    }
}

impl TokenEstimator {
    /// Partition `history` into groups in one left-to-right pass.
    ///
    /// An invocation absorbs every contiguous result message after it; a
    /// truncated exchange simply yields a shorter group.
    pub fn group<'a>(&self, history: &'a [Message]) -> Vec<MessageGroup<'a>> {
        let mut groups = Vec::new();
        let mut i = 0;

        while i < history.len() {
            let start = i;
            i += 1;
            if history[start].is_invocation() {
                while i < history.len() && history[i].is_result() {
                    i += 1;
                }
            }

            let messages = &history[start..i];
            groups.push(MessageGroup {
                messages,
                start,
                tokens: self.messages(messages),
            });
        }

        groups
    }

    /// Drop the oldest groups until the history fits `max_tokens`.
    pub fn trim<'a>(&self, history: &'a [Message], max_tokens: usize) -> Trimmed<'a> {
        if history.is_empty() {
            return Trimmed {
                messages: history,
                dropped_groups: 0,
                tokens_before: 0,
                tokens_after: 0,
            };
        }

        let groups = self.group(history);
        let total: usize = groups.iter().map(|g| g.tokens).sum();

        if total <= max_tokens {
            return Trimmed {
                messages: history,
                dropped_groups: 0,
                tokens_before: total,
                tokens_after: total,
            };
        }

        let last = groups.len() - 1;
        let mut kept = total;
        let mut drop_until = 0;
        while drop_until < last && kept > max_tokens {
            kept -= groups[drop_until].tokens;
            drop_until += 1;
        }

        Trimmed {
            messages: &history[groups[drop_until].start..],
            dropped_groups: drop_until,
            tokens_before: total,
            tokens_after: kept,
        }
    }
}

/// Partition a history into trimming groups using the default estimator.
pub fn group_messages(history: &[Message]) -> Vec<MessageGroup<'_>> {
    TokenEstimator::DEFAULT.group(history)
}

/// Trim a history to `max_tokens` using the default estimator.
///
/// Returns the input unchanged when it already fits, and never returns an
/// empty slice for a non-empty input.
pub fn trim_messages(history: &[Message], max_tokens: usize) -> &[Message] {
    trim_messages_with(&TokenEstimator::DEFAULT, history, max_tokens)
}

/// Trim a history to `max_tokens` using custom estimation constants.
pub fn trim_messages_with<'a>(
    estimator: &TokenEstimator,
    history: &'a [Message],
    max_tokens: usize,
) -> &'a [Message] {
    estimator.trim(history, max_tokens).messages
}
