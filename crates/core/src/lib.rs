pub mod cell;
pub mod clipboard;
pub mod config;
pub mod display_name;
pub mod pagination;
pub mod query_runner;
pub mod session;
pub mod timers;
