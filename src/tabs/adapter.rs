use crate::models::AvailabilitySnapshot;
use crate::tabs::HostError;

/// Capability surface of one chat site, executed inside the agent's tab.
///
/// Implemented once per supported website; the orchestrator only ever
/// calls this set by capability, never by site identity, so any
/// implementation satisfying the contract is interchangeable. The
/// boolean returns report whether the DOM operation actually took (an
/// input field or send button the adapter could not find yields `false`,
/// not an error).
#[async_trait::async_trait]
pub trait SiteAdapter: Send + Sync {
    async fn set_input_text(&self, text: &str) -> Result<bool, HostError>;
    async fn click_send(&self) -> Result<bool, HostError>;
    /// The most recent completed-or-streaming response, if any.
    async fn latest_response(&self) -> Result<Option<String>, HostError>;
    async fn is_generating(&self) -> Result<bool, HostError>;
    async fn check_availability(&self) -> Result<AvailabilitySnapshot, HostError>;
}
