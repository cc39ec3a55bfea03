//! # openloop core
//!
//! Domain types, traits, and error definitions shared by every openloop crate.
//! Nothing here talks to the network or the disk; providers, stores, tools and
//! notifiers are traits with their implementations living in sibling crates.
//!
//! The conversation model is deliberately small: a [`Message`] is either an
//! ordinary turn, an invocation (assistant requesting tools) or a result
//! (the output of one tool call). The agent's trimming engine and control loop
//! only ever see this shape, whatever the provider's wire format looks like.

pub mod cron;
pub mod error;
pub mod message;
pub mod provider;
pub mod channel;
pub mod tool;
pub mod store;
pub mod event;

// Re-export key types at crate root for ergonomics
pub use cron::{CronError, CronExpr};
pub use error::{ChannelError, Error, ProviderError, Result, StoreError, ToolError};
pub use message::{Message, MessageKind, Role, ToolCall};
pub use provider::{Provider, ProviderRequest, ProviderResponse, ToolDefinition, Usage};
pub use channel::Notifier;
pub use tool::{Tool, ToolDispatcher, ToolRegistry};
pub use store::Store;
pub use event::{DomainEvent, EventBus};
