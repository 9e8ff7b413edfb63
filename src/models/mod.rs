mod history;
mod participant;
mod session;

pub use history::HistoryEntry;
pub use participant::{AvailabilitySnapshot, Participant, PoolAgent, TabId};
pub use session::ConversationSession;
