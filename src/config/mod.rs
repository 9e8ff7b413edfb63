mod conversation;
mod loader;

pub use conversation::{ActivationMode, ConversationConfig, HybridTimeouts, TemplateId};
pub use loader::AppConfig;
