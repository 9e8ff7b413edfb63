use chrono::{DateTime, Duration, Utc};
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::config::{ConversationConfig, HybridTimeouts, TemplateId};
use crate::models::{AvailabilitySnapshot, ConversationSession, PoolAgent, TabId};
use crate::participants::{ParticipantRegistry, RegistryError, TabRemoval};
use crate::store::{self, StateStore, KEY_CONFIG, KEY_HISTORY, KEY_SESSION, KEY_TIMEOUT_PROFILES};
use crate::tabs::{TabHost, TabNotice};

use super::activation::{ActivationError, ExchangeOutcome, TabActivationController};
use super::composer::{compose, compose_interjection};
use super::learner::TimeoutProfileLearner;
use super::scheduler::{first_turn, next_turn, TurnOutcome};

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("Need at least 2 participants with live tabs to start, have {0}")]
    InsufficientParticipants(usize),

    #[error("No participant holds a live tab")]
    NoValidParticipants,

    #[error("A conversation is already active")]
    AlreadyActive,

    #[error("Participant {0} has no live tab")]
    ParticipantNotLive(usize),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Activation(#[from] ActivationError),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Pushed to UI-layer subscribers whenever observable state changes.
#[derive(Debug, Clone)]
pub enum ControlEvent {
    SessionUpdated(ConversationSession),
    /// Answer to a one-shot query, matched to the requester by id.
    QueryResponse {
        request_id: String,
        participant_index: usize,
        text: String,
    },
}

/// Structured result for control-surface calls.
#[derive(Debug, Clone, Serialize)]
pub struct ControlResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ControlResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn err(error: impl std::fmt::Display) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
        }
    }
}

/// A composed message waiting for the auto-reply delay to elapse.
#[derive(Debug)]
struct PendingReply {
    participant_index: usize,
    text: String,
    deadline: DateTime<Utc>,
}

/// Owns the conversation lifecycle: roster, turn order, message
/// composition, tab activation, timeout learning, and persistence. All
/// timers are explicit deadlines advanced through `tick_at`; there are no
/// background tasks to orphan.
pub struct ConversationController<H: TabHost, S: StateStore> {
    host: Arc<H>,
    store: Arc<S>,
    session: ConversationSession,
    registry: ParticipantRegistry,
    learner: TimeoutProfileLearner,
    activation: TabActivationController<H>,
    auto_reply: Option<PendingReply>,
    events: broadcast::Sender<ControlEvent>,
}

impl<H: TabHost, S: StateStore> ConversationController<H, S> {
    pub fn new(host: Arc<H>, store: Arc<S>, defaults: HybridTimeouts) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            host: Arc::clone(&host),
            store,
            session: ConversationSession::default(),
            registry: ParticipantRegistry::new(),
            learner: TimeoutProfileLearner::new(defaults),
            activation: TabActivationController::new(host),
            auto_reply: None,
            events,
        }
    }

    /// Rebuild from persisted state. Tab handles do not survive a browser
    /// restart, so the loaded session always comes back inactive and the
    /// pool comes back empty; roster slots are kept so assignments can be
    /// re-established in place.
    pub async fn load_or_default(
        host: Arc<H>,
        store: Arc<S>,
        defaults: HybridTimeouts,
    ) -> anyhow::Result<Self> {
        let mut controller = Self::new(host, Arc::clone(&store), defaults);

        if let Some(mut session) =
            store::load::<ConversationSession, _>(&*store, KEY_SESSION).await?
        {
            session.active = false;
            controller.registry =
                ParticipantRegistry::from_parts(session.participants.clone(), Vec::new());
            session.participants = controller.registry.participants().to_vec();
            controller.session = session;
        }
        if let Some(config) = store::load::<ConversationConfig, _>(&*store, KEY_CONFIG).await? {
            controller.session.config = config;
        }
        if let Some(history) = store::load(&*store, KEY_HISTORY).await? {
            controller.session.restore_history(history);
        }
        if let Some(profiles) = store::load(&*store, KEY_TIMEOUT_PROFILES).await? {
            controller.learner = TimeoutProfileLearner::from_saved(defaults, profiles);
        }
        Ok(controller)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ControlEvent> {
        self.events.subscribe()
    }

    pub fn snapshot(&self) -> ConversationSession {
        self.session.clone()
    }

    pub fn available_agents(&self) -> Vec<PoolAgent> {
        self.registry
            .available_agents()
            .into_iter()
            .cloned()
            .collect()
    }

    /// Earliest moment at which `tick_at` would do any work.
    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        let reply = self.auto_reply.as_ref().map(|r| r.deadline);
        match (reply, self.activation.next_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (deadline, None) | (None, deadline) => deadline,
        }
    }

    pub async fn start(
        &mut self,
        topic: &str,
        template: Option<TemplateId>,
    ) -> Result<(), ControlError> {
        self.start_at(Utc::now(), topic, template).await
    }

    pub async fn start_at(
        &mut self,
        now: DateTime<Utc>,
        topic: &str,
        template: Option<TemplateId>,
    ) -> Result<(), ControlError> {
        if self.session.active {
            return Err(ControlError::AlreadyActive);
        }
        self.sync_participants();

        let live = self.session.live_participant_count();
        if live < 2 {
            return Err(ControlError::InsufficientParticipants(live));
        }
        let first = match first_turn(self.registry.participants()) {
            TurnOutcome::Next(index) => index,
            TurnOutcome::Deadlock => return Err(ControlError::NoValidParticipants),
        };

        self.session.config.initial_prompt = topic.to_string();
        self.session.config.template = template;
        self.session.clear_history();
        self.session.active = true;
        self.session.current_turn = first;
        self.sync_participants();
        self.persist_config().await?;
        self.persist_session().await?;
        self.persist_history().await;

        tracing::info!(
            "Starting conversation with {} live participants, opener to slot {}",
            live,
            first + 1
        );
        let opener = compose(&self.session.history, &self.session.config, topic, first)
            .map_err(ControlError::Internal)?;
        if let Err(e) = self.dispatch_at(now, first, &opener).await {
            self.session.active = false;
            if let ActivationError::TabGone(tab) = e {
                self.vacate_tab(tab);
            }
            self.persist_session().await?;
            return Err(e.into());
        }

        self.broadcast_session();
        Ok(())
    }

    /// Idempotent. Clears every scheduled reply and pending exchange,
    /// tells live tabs the conversation ended, persists, broadcasts.
    pub async fn stop(&mut self) -> Result<(), ControlError> {
        self.auto_reply = None;
        self.activation.cancel_all();
        if !self.session.active {
            return Ok(());
        }
        self.session.active = false;

        let tabs: Vec<TabId> = self
            .session
            .participants
            .iter()
            .filter_map(|p| p.tab)
            .collect();
        let host = Arc::clone(&self.host);
        let notices = tabs.into_iter().map(|tab| {
            let host = Arc::clone(&host);
            async move { (tab, host.notify(tab, TabNotice::ConversationEnded).await) }
        });
        for (tab, result) in join_all(notices).await {
            if let Err(e) = result {
                tracing::debug!("End-of-conversation notice to tab {} failed: {}", tab, e);
            }
        }

        self.persist_session().await?;
        self.broadcast_session();
        tracing::info!(
            "Conversation stopped after {} recorded turns",
            self.session.history.len()
        );
        Ok(())
    }

    /// Operator escape hatch for a stalled conversation: re-activate at
    /// the given turn and send `message` through the normal composer.
    pub async fn continue_from(
        &mut self,
        participant_index: usize,
        message: &str,
    ) -> Result<(), ControlError> {
        self.continue_from_at(Utc::now(), participant_index, message)
            .await
    }

    pub async fn continue_from_at(
        &mut self,
        now: DateTime<Utc>,
        participant_index: usize,
        message: &str,
    ) -> Result<(), ControlError> {
        let live = self
            .session
            .participants
            .get(participant_index)
            .is_some_and(|p| p.is_live());
        if !live {
            return Err(ControlError::ParticipantNotLive(participant_index));
        }

        self.session.active = true;
        self.session.current_turn = participant_index;

        let from = self
            .session
            .history
            .last()
            .map(|entry| entry.participant_index)
            .unwrap_or(participant_index);
        // The operator message is not in the log, so the whole recorded
        // transcript is eligible context.
        let composed =
            compose_interjection(&self.session.history, &self.session.config, message, from)
                .map_err(ControlError::Internal)?;
        self.dispatch_at(now, participant_index, &composed).await?;

        self.persist_session().await?;
        self.broadcast_session();
        Ok(())
    }

    pub async fn on_agent_response(
        &mut self,
        text: &str,
        participant_index: usize,
        request_id: Option<String>,
    ) -> Result<(), ControlError> {
        self.on_agent_response_at(Utc::now(), text, participant_index, request_id)
            .await
    }

    pub async fn on_agent_response_at(
        &mut self,
        now: DateTime<Utc>,
        text: &str,
        participant_index: usize,
        request_id: Option<String>,
    ) -> Result<(), ControlError> {
        // One-shot queries go straight back to the requester and never
        // touch the turn order.
        if let Some(request_id) = request_id {
            let _ = self.events.send(ControlEvent::QueryResponse {
                request_id,
                participant_index,
                text: text.to_string(),
            });
            return Ok(());
        }

        if !self.session.active {
            tracing::info!(
                "Ignoring response from participant {}: no active conversation",
                participant_index
            );
            return Ok(());
        }

        self.activation.cancel(participant_index);
        self.session.append_history(participant_index, text, now);
        self.persist_history().await;

        if self.session.history.len() >= self.session.config.max_turns {
            tracing::info!(
                "Reached the configured limit of {} turns",
                self.session.config.max_turns
            );
            return self.stop().await;
        }

        self.schedule_next_at(now, participant_index, text).await
    }

    /// Advance every due deadline: fire the scheduled reply and drive
    /// pending hybrid exchanges to their outcomes.
    pub async fn tick_at(&mut self, now: DateTime<Utc>) -> Result<(), ControlError> {
        let due_reply = match &self.auto_reply {
            Some(reply) if reply.deadline <= now => self.auto_reply.take(),
            _ => None,
        };
        if let Some(reply) = due_reply {
            if self.session.active {
                if let Err(e) = self
                    .dispatch_at(now, reply.participant_index, &reply.text)
                    .await
                {
                    self.handle_dispatch_failure(now, reply.participant_index, e)
                        .await?;
                }
            }
        }

        for outcome in self.activation.tick_at(now).await {
            self.handle_outcome(now, outcome).await?;
        }
        Ok(())
    }

    // --- control surface -------------------------------------------------

    pub fn register_pool_agent(
        &mut self,
        tab: TabId,
        platform: &str,
        title: &str,
        availability: AvailabilitySnapshot,
    ) -> ControlResponse {
        self.registry
            .register_to_pool(tab, platform, title, availability);
        ControlResponse::ok()
    }

    pub async fn assign(&mut self, tab: TabId, slot_order: u32) -> ControlResponse {
        match self.registry.assign(tab, slot_order) {
            Ok(_) => self.commit().await,
            Err(e) => ControlResponse::err(e),
        }
    }

    pub async fn release(&mut self, slot_order: u32) -> ControlResponse {
        let removed = match self.registry.release(slot_order) {
            Ok(removed) => removed,
            Err(e) => return ControlResponse::err(e),
        };
        let removed_index = (slot_order as usize) - 1;

        if let Some(tab) = removed.tab {
            self.registry.register_to_pool(
                tab,
                removed.platform.clone().unwrap_or_default(),
                removed.title.clone(),
                AvailabilitySnapshot::available(),
            );
        }

        if self.session.active {
            if removed.is_live() {
                if let Err(e) = self.stop().await {
                    return ControlResponse::err(e);
                }
            } else {
                self.remap_after_removal(removed_index);
            }
        }
        self.commit().await
    }

    pub async fn add_empty_slot(&mut self, slot_order: Option<u32>) -> ControlResponse {
        self.registry.add_empty_slot(slot_order);
        if self.session.active {
            // Insertion shifts later indices up by one.
            let inserted = slot_order
                .map(|order| ((order.max(1) as usize) - 1).min(self.session.participants.len()))
                .unwrap_or(self.session.participants.len());
            if self.session.current_turn >= inserted {
                self.session.current_turn += 1;
            }
            if let Some(reply) = self.auto_reply.as_mut() {
                if reply.participant_index >= inserted {
                    reply.participant_index += 1;
                }
            }
            self.activation.shift_after_insertion(inserted);
        }
        self.commit().await
    }

    /// The host reported a closed tab; prune it wherever it is tracked.
    pub async fn remove_tab(&mut self, tab: TabId) -> ControlResponse {
        match self.registry.remove_tab(tab) {
            TabRemoval::Pool | TabRemoval::NotTracked => ControlResponse::ok(),
            TabRemoval::Participant(index) => {
                self.activation.cancel(index);
                if self.session.active {
                    // The roster lost a live member mid-conversation.
                    if let Err(e) = self.stop().await {
                        return ControlResponse::err(e);
                    }
                }
                self.commit().await
            }
        }
    }

    pub async fn update_config(&mut self, config: ConversationConfig) -> ControlResponse {
        self.session.config = config;
        if let Err(e) = self.persist_config().await {
            return ControlResponse::err(e);
        }
        self.commit().await
    }

    // --- internals -------------------------------------------------------

    async fn handle_outcome(
        &mut self,
        now: DateTime<Utc>,
        outcome: ExchangeOutcome,
    ) -> Result<(), ControlError> {
        match outcome {
            ExchangeOutcome::Finalized {
                participant_index,
                platform,
                text,
                observed_ms,
                timeout_used_ms,
            } => {
                if let Some(platform) = platform {
                    self.learner
                        .record_at(now, &platform, timeout_used_ms, observed_ms, true, false);
                    self.persist_profiles().await;
                }
                self.on_agent_response_at(now, &text, participant_index, None)
                    .await
            }
            ExchangeOutcome::TimedOut {
                participant_index,
                platform,
                partial,
                timeout_used_ms,
            } => {
                if let Some(platform) = platform {
                    self.learner.record_at(
                        now,
                        &platform,
                        timeout_used_ms,
                        timeout_used_ms,
                        false,
                        true,
                    );
                    self.persist_profiles().await;
                }
                match partial {
                    Some(text) => {
                        tracing::warn!(
                            "Participant {} was cut off; continuing with the partial response",
                            participant_index
                        );
                        self.on_agent_response_at(now, &text, participant_index, None)
                            .await
                    }
                    None => {
                        tracing::warn!(
                            "Participant {} produced nothing before the poll ceiling; \
                             awaiting operator intervention",
                            participant_index
                        );
                        Ok(())
                    }
                }
            }
            ExchangeOutcome::TabGone {
                participant_index,
                tab,
            } => {
                tracing::warn!(
                    "Tab {} of participant {} vanished mid-exchange",
                    tab,
                    participant_index
                );
                self.handle_dispatch_failure(now, participant_index, ActivationError::TabGone(tab))
                    .await
            }
            ExchangeOutcome::DeliveryFailed {
                participant_index,
                error,
            } => {
                tracing::warn!(
                    "Could not deliver to participant {}: {}; awaiting operator intervention",
                    participant_index,
                    error
                );
                Ok(())
            }
        }
    }

    async fn handle_dispatch_failure(
        &mut self,
        now: DateTime<Utc>,
        participant_index: usize,
        error: ActivationError,
    ) -> Result<(), ControlError> {
        match error {
            ActivationError::TabGone(tab) => {
                // The slot stays in the roster, held open and empty, so
                // sibling indices remain stable and the scheduler skips it.
                self.vacate_tab(tab);
                match self.session.history.last().cloned() {
                    Some(last) => {
                        let from = last
                            .participant_index
                            .min(self.session.participants.len().saturating_sub(1));
                        self.schedule_next_at(now, from, &last.content).await
                    }
                    None => self.stop().await,
                }
            }
            ActivationError::Delivery(e) => {
                tracing::warn!(
                    "Could not deliver to participant {}: {}; awaiting operator intervention",
                    participant_index,
                    e
                );
                Ok(())
            }
        }
    }

    /// Pick the next live turn after `from` and stage the composed reply
    /// behind the auto-reply delay. Deadlock stops the conversation.
    async fn schedule_next_at(
        &mut self,
        now: DateTime<Utc>,
        from: usize,
        latest: &str,
    ) -> Result<(), ControlError> {
        match next_turn(&self.session.participants, from) {
            TurnOutcome::Deadlock => {
                tracing::warn!("No participant with a live tab remains; stopping");
                self.stop().await
            }
            TurnOutcome::Next(next) => {
                let message = compose(&self.session.history, &self.session.config, latest, from)
                    .map_err(ControlError::Internal)?;
                self.session.current_turn = next;
                self.auto_reply = Some(PendingReply {
                    participant_index: next,
                    text: message,
                    deadline: now
                        + Duration::milliseconds(self.session.config.auto_reply_delay_ms as i64),
                });
                self.persist_session().await?;
                self.broadcast_session();
                Ok(())
            }
        }
    }

    async fn dispatch_at(
        &mut self,
        now: DateTime<Utc>,
        participant_index: usize,
        text: &str,
    ) -> Result<(), ActivationError> {
        let participant = self
            .session
            .participants
            .get(participant_index)
            .ok_or_else(|| {
                ActivationError::Delivery(format!("no participant at index {}", participant_index))
            })?;
        let tab = participant
            .tab
            .ok_or_else(|| ActivationError::Delivery("participant slot is empty".to_string()))?;
        let platform = participant.platform.clone();
        let timeouts = platform
            .as_deref()
            .map(|p| self.learner.profile_for(p))
            .unwrap_or(self.session.config.hybrid);

        self.activation
            .send_at(
                now,
                participant_index,
                tab,
                platform,
                text,
                self.session.config.activation_mode,
                timeouts,
            )
            .await
    }

    /// Empty the roster slot holding `tab` without removing the slot.
    fn vacate_tab(&mut self, tab: TabId) {
        if let Some((index, _)) = self.registry.participant_by_tab(tab) {
            let participant = &mut self.registry.participants_mut()[index];
            participant.tab = None;
            participant.platform = None;
            participant.title.clear();
            self.activation.cancel(index);
        }
        self.sync_participants();
    }

    fn remap_after_removal(&mut self, removed: usize) {
        if self.session.current_turn > removed {
            self.session.current_turn -= 1;
        }
        if let Some(reply) = self.auto_reply.as_mut() {
            if reply.participant_index > removed {
                reply.participant_index -= 1;
            }
        }
        self.activation.shift_after_removal(removed);
    }

    async fn commit(&mut self) -> ControlResponse {
        self.sync_participants();
        match self.persist_session().await {
            Ok(()) => {
                self.broadcast_session();
                ControlResponse::ok()
            }
            Err(e) => ControlResponse::err(e),
        }
    }

    fn sync_participants(&mut self) {
        self.session.participants = self.registry.participants().to_vec();
    }

    fn broadcast_session(&self) {
        let _ = self
            .events
            .send(ControlEvent::SessionUpdated(self.session.clone()));
    }

    async fn persist_session(&self) -> Result<(), ControlError> {
        store::save(&*self.store, KEY_SESSION, &self.session)
            .await
            .map_err(ControlError::Internal)
    }

    async fn persist_config(&self) -> Result<(), ControlError> {
        store::save(&*self.store, KEY_CONFIG, &self.session.config)
            .await
            .map_err(ControlError::Internal)
    }

    async fn persist_history(&self) {
        store::save_with_retry(&*self.store, KEY_HISTORY, &self.session.history).await;
    }

    async fn persist_profiles(&self) {
        store::save_with_retry(&*self.store, KEY_TIMEOUT_PROFILES, self.learner.profiles()).await;
    }
}
