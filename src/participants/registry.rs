use chrono::Utc;
use thiserror::Error;

use crate::models::{AvailabilitySnapshot, Participant, PoolAgent, TabId};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Tab {0} is not registered in the pool or participants")]
    TabNotFound(TabId),

    #[error("No participant slot {0}")]
    SlotNotFound(u32),
}

/// What pruning a closed tab touched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TabRemoval {
    /// Removed from the unassigned pool.
    Pool,
    /// A participant slot was released; carries the freed index.
    Participant(usize),
    /// The tab was not tracked anywhere.
    NotTracked,
}

/// Owns the ordered participant slots and the pool of
/// registered-but-unassigned agent tabs.
///
/// Invariants maintained by every mutating call:
/// - `participants[i].slot_order == i + 1`
/// - a tab handle appears in at most one participant or one pool agent
#[derive(Debug, Clone, Default)]
pub struct ParticipantRegistry {
    participants: Vec<Participant>,
    pool: Vec<PoolAgent>,
}

impl ParticipantRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted state.
    pub fn from_parts(participants: Vec<Participant>, pool: Vec<PoolAgent>) -> Self {
        let mut registry = Self { participants, pool };
        registry.renormalize();
        registry
    }

    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    pub fn participants_mut(&mut self) -> &mut Vec<Participant> {
        &mut self.participants
    }

    pub fn pool(&self) -> &[PoolAgent] {
        &self.pool
    }

    pub fn participant_by_tab(&self, tab: TabId) -> Option<(usize, &Participant)> {
        self.participants
            .iter()
            .enumerate()
            .find(|(_, p)| p.tab == Some(tab))
    }

    /// Idempotent upsert into the pool. If the tab is already assigned to
    /// a slot this is a no-op that returns the participant's
    /// pool-equivalent view.
    pub fn register_to_pool(
        &mut self,
        tab: TabId,
        platform: impl Into<String>,
        title: impl Into<String>,
        availability: AvailabilitySnapshot,
    ) -> PoolAgent {
        let platform = platform.into();
        let title = title.into();

        if let Some((_, participant)) = self.participant_by_tab(tab) {
            return PoolAgent {
                tab,
                platform: participant.platform.clone().unwrap_or(platform),
                title: participant.title.clone(),
                registered_at: Utc::now(),
                availability,
            };
        }

        if let Some(existing) = self.pool.iter_mut().find(|a| a.tab == tab) {
            existing.platform = platform;
            existing.title = title;
            existing.availability = availability;
            return existing.clone();
        }

        let mut agent = PoolAgent::new(tab, platform, title);
        agent.availability = availability;
        self.pool.push(agent.clone());
        agent
    }

    /// Promote a pooled tab (or move an already-assigned tab) into the
    /// slot at `slot_order`. A different filled participant at that slot
    /// is demoted back to the pool first. Slots beyond the current end
    /// are padded with held-open empty slots.
    pub fn assign(&mut self, tab: TabId, slot_order: u32) -> Result<Participant, RegistryError> {
        let target = (slot_order.max(1) as usize) - 1;

        let (platform, title) = if let Some(pos) = self.pool.iter().position(|a| a.tab == tab) {
            let agent = self.pool.remove(pos);
            (Some(agent.platform), agent.title)
        } else if let Some((index, participant)) = self.participant_by_tab(tab) {
            let platform = participant.platform.clone();
            let title = participant.title.clone();
            // Moving within the roster: the source slot stays, held open.
            self.participants[index].tab = None;
            self.participants[index].platform = None;
            self.participants[index].title = String::new();
            (platform, title)
        } else {
            return Err(RegistryError::TabNotFound(tab));
        };

        while self.participants.len() <= target {
            let order = self.participants.len() as u32 + 1;
            self.participants.push(Participant::empty(order));
        }

        let slot = &mut self.participants[target];
        if let Some(old_tab) = slot.tab.take() {
            if old_tab != tab {
                let demoted = PoolAgent::new(
                    old_tab,
                    slot.platform.clone().unwrap_or_default(),
                    slot.title.clone(),
                );
                self.pool.push(demoted);
            }
        }

        slot.tab = Some(tab);
        slot.platform = platform;
        slot.title = title;

        self.renormalize();
        Ok(self.participants[target].clone())
    }

    /// Remove the slot at `slot_order` entirely, shifting later slots
    /// down. Returns the removed participant; the caller re-registers a
    /// still-live tab to the pool and forces a stop if a conversation is
    /// active.
    pub fn release(&mut self, slot_order: u32) -> Result<Participant, RegistryError> {
        let index = (slot_order as usize)
            .checked_sub(1)
            .filter(|i| *i < self.participants.len())
            .ok_or(RegistryError::SlotNotFound(slot_order))?;

        let removed = self.participants.remove(index);
        self.renormalize();
        Ok(removed)
    }

    /// Insert a held-open empty slot at `slot_order` (1-based), or append
    /// one when `None`.
    pub fn add_empty_slot(&mut self, slot_order: Option<u32>) {
        let index = match slot_order {
            Some(order) => ((order.max(1) as usize) - 1).min(self.participants.len()),
            None => self.participants.len(),
        };
        self.participants.insert(index, Participant::empty(0));
        self.renormalize();
    }

    /// Pool agents whose tab is not already bound to a slot.
    pub fn available_agents(&self) -> Vec<&PoolAgent> {
        self.pool
            .iter()
            .filter(|agent| self.participant_by_tab(agent.tab).is_none())
            .collect()
    }

    /// Prune a closed tab wherever it is tracked.
    pub fn remove_tab(&mut self, tab: TabId) -> TabRemoval {
        if let Some(pos) = self.pool.iter().position(|a| a.tab == tab) {
            self.pool.remove(pos);
            return TabRemoval::Pool;
        }

        if let Some((index, _)) = self.participant_by_tab(tab) {
            self.participants.remove(index);
            self.renormalize();
            return TabRemoval::Participant(index);
        }

        TabRemoval::NotTracked
    }

    fn renormalize(&mut self) {
        for (i, participant) in self.participants.iter_mut().enumerate() {
            // Re-derive default roles for the new position; customized
            // ones stay as they are.
            let had_default = participant.display_role.is_empty()
                || participant.display_role == format!("Agent {}", participant.slot_order);
            participant.slot_order = i as u32 + 1;
            if had_default {
                participant.display_role = format!("Agent {}", i + 1);
            }
        }
    }
}
