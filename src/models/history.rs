use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One appended conversation message. Immutable once appended; the
/// append order of the history log is the conversational order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Monotonic id, assigned by the session on append.
    pub id: u64,
    pub participant_index: usize,
    pub slot_order: u32,
    pub role: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
}
