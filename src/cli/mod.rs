//! CLI module for contextbuddy
//!
//! Handles command-line argument parsing, configuration and the
//! interactive chat loop.

pub mod args;
pub mod chat;
pub mod commands;
pub mod config;
pub mod display;

pub use args::{parse_filters, Args, Commands, Verbosity};
pub use chat::ChatSession;
pub use commands::ChatCommand;
pub use config::Config;
