use crate::models::Participant;

/// Result of asking for a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Index of the next participant holding a live tab.
    Next(usize),
    /// No participant holds a live tab; the conversation cannot make
    /// progress and must stop rather than spin.
    Deadlock,
}

/// Next participant after `current`: scan forward circularly up to `n`
/// steps and return the first index with a live tab.
pub fn next_turn(participants: &[Participant], current: usize) -> TurnOutcome {
    let n = participants.len();
    if n == 0 {
        return TurnOutcome::Deadlock;
    }

    for step in 1..=n {
        let candidate = (current + step) % n;
        if participants[candidate].is_live() {
            return TurnOutcome::Next(candidate);
        }
    }

    TurnOutcome::Deadlock
}

/// Lowest index with a live tab; required before starting a conversation.
pub fn first_turn(participants: &[Participant]) -> TurnOutcome {
    participants
        .iter()
        .position(Participant::is_live)
        .map_or(TurnOutcome::Deadlock, TurnOutcome::Next)
}
