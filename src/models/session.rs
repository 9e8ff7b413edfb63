use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ConversationConfig;
use crate::models::{HistoryEntry, Participant};

/// Root aggregate for one conversation, reloaded at startup. Whenever
/// `active` is true, `current_turn` points at a participant with a live
/// tab. The transcript is held here in memory but persists under its own
/// blob key, so it is skipped when the session itself is serialized.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationSession {
    pub active: bool,
    pub participants: Vec<Participant>,
    pub current_turn: usize,
    #[serde(skip)]
    pub history: Vec<HistoryEntry>,
    pub config: ConversationConfig,
    #[serde(default)]
    next_history_id: u64,
}

impl ConversationSession {
    /// Append a history entry for the participant at `index`, assigning
    /// the next monotonic id. Returns a clone of the stored entry.
    pub fn append_history(
        &mut self,
        index: usize,
        content: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> HistoryEntry {
        let (slot_order, role, platform) = match self.participants.get(index) {
            Some(p) => (p.slot_order, p.display_role.clone(), p.platform.clone()),
            None => (index as u32 + 1, format!("Agent {}", index + 1), None),
        };

        self.next_history_id += 1;
        let entry = HistoryEntry {
            id: self.next_history_id,
            participant_index: index,
            slot_order,
            role,
            content: content.into(),
            timestamp,
            platform,
        };
        self.history.push(entry.clone());
        entry
    }

    pub fn live_participant_count(&self) -> usize {
        self.participants.iter().filter(|p| p.is_live()).count()
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
        self.next_history_id = 0;
    }

    /// Attach a transcript loaded from its own blob, keeping the id
    /// counter ahead of every restored entry.
    pub fn restore_history(&mut self, history: Vec<HistoryEntry>) {
        if let Some(last) = history.last() {
            self.next_history_id = self.next_history_id.max(last.id);
        }
        self.history = history;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Participant;

    fn session_with_participants(tabs: &[Option<u64>]) -> ConversationSession {
        let mut session = ConversationSession::default();
        for (i, tab) in tabs.iter().enumerate() {
            let mut p = Participant::empty(i as u32 + 1);
            p.tab = *tab;
            session.participants.push(p);
        }
        session
    }

    #[test]
    fn append_history_assigns_monotonic_ids() {
        let mut session = session_with_participants(&[Some(1), Some(2)]);
        let now = Utc::now();

        let first = session.append_history(0, "one", now);
        let second = session.append_history(1, "two", now);

        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
        assert_eq!(session.history.len(), 2);
    }

    #[test]
    fn append_history_records_slot_and_role() {
        let mut session = session_with_participants(&[Some(1), Some(2)]);
        let entry = session.append_history(1, "hello", Utc::now());

        assert_eq!(entry.participant_index, 1);
        assert_eq!(entry.slot_order, 2);
        assert_eq!(entry.role, "Agent 2");
    }

    #[test]
    fn append_history_ids_survive_clear() {
        let mut session = session_with_participants(&[Some(1)]);
        session.append_history(0, "one", Utc::now());
        session.clear_history();

        let entry = session.append_history(0, "fresh", Utc::now());
        assert_eq!(entry.id, 1);
    }

    #[test]
    fn restore_history_keeps_ids_monotonic() {
        let mut donor = session_with_participants(&[Some(1)]);
        donor.append_history(0, "one", Utc::now());
        donor.append_history(0, "two", Utc::now());

        let mut session = ConversationSession::default();
        session.restore_history(donor.history.clone());
        session.participants = donor.participants.clone();

        let entry = session.append_history(0, "three", Utc::now());
        assert_eq!(entry.id, 3);
        assert_eq!(session.history.len(), 3);
    }

    #[test]
    fn serialized_session_omits_the_transcript() {
        let mut session = session_with_participants(&[Some(1)]);
        session.append_history(0, "not persisted here", Utc::now());

        let raw = serde_json::to_string(&session).unwrap();
        assert!(!raw.contains("not persisted here"));

        let back: ConversationSession = serde_json::from_str(&raw).unwrap();
        assert!(back.history.is_empty());
    }

    #[test]
    fn live_participant_count_ignores_empty_slots() {
        let session = session_with_participants(&[Some(1), None, Some(3)]);
        assert_eq!(session.live_participant_count(), 2);
    }
}
