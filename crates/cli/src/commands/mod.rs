pub mod chat;
pub mod config_cmd;
pub mod daemon;
pub mod onboard;
pub mod tools;
