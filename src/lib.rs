//! Turn-based conversation orchestration for AI chat agents living in
//! browser tabs.
//!
//! The embedding host implements [`tabs::TabHost`] and a
//! [`tabs::SiteAdapter`] per chat site, then drives a
//! [`conversation::ConversationController`] with agent responses and
//! periodic ticks. All timers are explicit deadlines, so the host owns
//! the clock.

pub mod config;
pub mod conversation;
pub mod models;
pub mod participants;
pub mod store;
pub mod tabs;
pub mod utils;
