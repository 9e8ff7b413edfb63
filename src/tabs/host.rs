use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use crate::models::TabId;
use crate::tabs::SiteAdapter;

#[derive(Debug, Error)]
pub enum HostError {
    #[error("Tab {0} no longer exists")]
    Gone(TabId),

    #[error("Tab messaging failed: {0}")]
    Message(String),
}

/// Typed one-way notification delivered into a tab.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TabNotice {
    ConversationEnded,
}

/// Browser-side tab primitives the orchestrator depends on: create,
/// query, and activate tabs by opaque handle, and reach the site adapter
/// running inside a tab.
///
/// A messaging round trip that never resolves is the host's problem to
/// bound; callers treat a bounded failure and silence identically.
#[async_trait::async_trait]
pub trait TabHost: Send + Sync {
    async fn exists(&self, tab: TabId) -> bool;

    /// The currently foregrounded tab, if the host can tell.
    async fn active_tab(&self) -> Option<TabId>;

    /// Bring `tab` to the foreground.
    async fn activate(&self, tab: TabId) -> Result<(), HostError>;

    /// The site adapter living in `tab`.
    async fn adapter(&self, tab: TabId) -> Result<Arc<dyn SiteAdapter>, HostError>;

    async fn notify(&self, tab: TabId, notice: TabNotice) -> Result<(), HostError>;
}
