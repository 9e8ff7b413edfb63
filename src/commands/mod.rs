pub mod agents;
pub mod common;
pub mod config;
pub mod history;
pub mod reset;
pub mod status;
