//! Sequential video upload queue with a terminal UI and a headless CLI.

pub mod app;
pub mod config;
pub mod credentials;
pub mod delay;
pub mod discovery;
pub mod error;
pub mod events;
pub mod input;
pub mod jobs;
pub mod layout;
pub mod logging;
pub mod orchestrator;
pub mod path_key;
pub mod publisher;
pub mod shortcuts;
pub mod summary;
pub mod template;
pub mod ui;
pub mod worker;
