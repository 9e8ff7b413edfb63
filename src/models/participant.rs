use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque tab handle issued by the tab host.
pub type TabId = u64;

/// An ordinal, addressable slot in the active conversation, optionally
/// bound to a live agent tab. A `None` tab denotes a held-open, unfilled
/// slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    /// 1-based position; always equals index + 1 after any mutation.
    pub slot_order: u32,
    pub tab: Option<TabId>,
    pub platform: Option<String>,
    pub title: String,
    pub display_role: String,
}

impl Participant {
    pub fn empty(slot_order: u32) -> Self {
        Self {
            slot_order,
            tab: None,
            platform: None,
            title: String::new(),
            display_role: format!("Agent {}", slot_order),
        }
    }

    pub fn is_live(&self) -> bool {
        self.tab.is_some()
    }
}

/// Last known liveness/readiness of an agent's input surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilitySnapshot {
    pub available: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default)]
    pub requires_login: bool,
}

impl AvailabilitySnapshot {
    pub fn available() -> Self {
        Self {
            available: true,
            reason: None,
            requires_login: false,
        }
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            available: false,
            reason: Some(reason.into()),
            requires_login: false,
        }
    }
}

impl Default for AvailabilitySnapshot {
    fn default() -> Self {
        Self::available()
    }
}

/// A registered agent tab not yet bound to a conversation slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolAgent {
    pub tab: TabId,
    pub platform: String,
    pub title: String,
    pub registered_at: DateTime<Utc>,
    #[serde(default)]
    pub availability: AvailabilitySnapshot,
}

impl PoolAgent {
    pub fn new(tab: TabId, platform: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            tab,
            platform: platform.into(),
            title: title.into(),
            registered_at: Utc::now(),
            availability: AvailabilitySnapshot::available(),
        }
    }
}
