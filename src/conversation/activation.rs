use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::config::{ActivationMode, HybridTimeouts};
use crate::models::TabId;
use crate::tabs::{HostError, SiteAdapter, TabHost};

/// Wall-clock ceiling on hybrid polling. On cap the exchange is recorded
/// as a timeout, never left hanging.
pub const POLL_CEILING_MS: u64 = 6 * 60 * 1000;

#[derive(Debug, Error)]
pub enum ActivationError {
    #[error("Tab {0} disappeared mid-operation")]
    TabGone(TabId),

    #[error("Message delivery failed: {0}")]
    Delivery(String),
}

/// Phase of one in-flight hybrid exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExchangePhase {
    /// Target foregrounded; waiting `activation_ms` before sending.
    ActivationWait,
    /// Prompt delivered, focus restored; waiting `initial_delay_ms`.
    InitialDelay,
    /// Periodically probing the adapter for a finished response.
    Polling,
}

/// One hybrid send awaiting its response. Keyed by participant index;
/// removal (cancel or finalize) is the only way its deadline dies.
#[derive(Debug)]
pub struct PendingExchange {
    pub participant_index: usize,
    tab: TabId,
    platform: Option<String>,
    /// Prompt text, consumed when the ActivationWait deadline fires.
    text: String,
    original_tab: Option<TabId>,
    phase: ExchangePhase,
    deadline: DateTime<Utc>,
    started_at: DateTime<Utc>,
    timeouts: HybridTimeouts,
    poll_count: u32,
    last_observed_len: Option<usize>,
}

/// Terminal result of one exchange, handed back to the conversation
/// controller from `tick_at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeOutcome {
    /// Response length stable across two polls with generation finished.
    Finalized {
        participant_index: usize,
        platform: Option<String>,
        text: String,
        observed_ms: u64,
        timeout_used_ms: u64,
    },
    /// Poll ceiling elapsed; whatever text was last observed rides along.
    TimedOut {
        participant_index: usize,
        platform: Option<String>,
        partial: Option<String>,
        timeout_used_ms: u64,
    },
    /// The target tab vanished; the participant slot must be pruned.
    TabGone { participant_index: usize, tab: TabId },
    /// The tab is alive but the adapter could not take the prompt.
    DeliveryFailed {
        participant_index: usize,
        error: String,
    },
}

/// Decides whether/how to bring an agent's tab to the foreground to make
/// it responsive, and how to poll it for a finished response without
/// permanently stealing focus.
pub struct TabActivationController<H: TabHost> {
    host: Arc<H>,
    pending: HashMap<usize, PendingExchange>,
}

impl<H: TabHost> TabActivationController<H> {
    pub fn new(host: Arc<H>) -> Self {
        Self {
            host,
            pending: HashMap::new(),
        }
    }

    pub fn has_pending(&self, participant_index: usize) -> bool {
        self.pending.contains_key(&participant_index)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Earliest deadline across in-flight exchanges, for drivers that
    /// want to sleep until the next tick matters.
    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        self.pending.values().map(|p| p.deadline).min()
    }

    /// Deliver `text` to the participant's tab under the configured mode.
    /// In hybrid mode this only schedules the exchange; the send itself
    /// happens when the activation deadline fires in `tick_at`.
    pub async fn send(
        &mut self,
        participant_index: usize,
        tab: TabId,
        platform: Option<String>,
        text: &str,
        mode: ActivationMode,
        timeouts: HybridTimeouts,
    ) -> Result<(), ActivationError> {
        self.send_at(
            Utc::now(),
            participant_index,
            tab,
            platform,
            text,
            mode,
            timeouts,
        )
        .await
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn send_at(
        &mut self,
        now: DateTime<Utc>,
        participant_index: usize,
        tab: TabId,
        platform: Option<String>,
        text: &str,
        mode: ActivationMode,
        timeouts: HybridTimeouts,
    ) -> Result<(), ActivationError> {
        match mode {
            ActivationMode::Always => {
                self.activate_target(tab).await?;
                self.deliver(tab, text).await?;
                Ok(())
            }
            ActivationMode::Never => self.deliver(tab, text).await,
            ActivationMode::Hybrid => {
                // At most one exchange per participant index.
                if self.pending.remove(&participant_index).is_some() {
                    tracing::warn!(
                        "Replacing stale pending exchange for participant {}",
                        participant_index
                    );
                }

                let original_tab = self.host.active_tab().await.filter(|t| *t != tab);
                self.activate_target(tab).await?;

                self.pending.insert(
                    participant_index,
                    PendingExchange {
                        participant_index,
                        tab,
                        platform,
                        text: text.to_string(),
                        original_tab,
                        phase: ExchangePhase::ActivationWait,
                        deadline: now + Duration::milliseconds(timeouts.activation_ms as i64),
                        started_at: now,
                        timeouts,
                        poll_count: 0,
                        last_observed_len: None,
                    },
                );
                Ok(())
            }
        }
    }

    /// Advance every exchange whose deadline has passed. Returns the
    /// exchanges that reached a terminal state this tick.
    pub async fn tick_at(&mut self, now: DateTime<Utc>) -> Vec<ExchangeOutcome> {
        let mut due: Vec<usize> = self
            .pending
            .iter()
            .filter(|(_, p)| p.deadline <= now)
            .map(|(index, _)| *index)
            .collect();
        due.sort_unstable();

        let mut outcomes = Vec::new();
        for index in due {
            let Some(exchange) = self.pending.remove(&index) else {
                continue;
            };
            if let Some(outcome) = self.advance(exchange, now).await {
                outcomes.push(outcome);
            }
        }
        outcomes
    }

    /// Cancel the pending exchange for one participant. Returns whether
    /// anything was in flight.
    pub fn cancel(&mut self, participant_index: usize) -> bool {
        self.pending.remove(&participant_index).is_some()
    }

    /// Re-key pending exchanges after the participant at `removed` was
    /// deleted from the roster and later indices shifted down by one.
    pub fn shift_after_removal(&mut self, removed: usize) {
        let mut shifted: Vec<usize> = self
            .pending
            .keys()
            .filter(|index| **index > removed)
            .copied()
            .collect();
        // Smallest first, so a re-keyed entry never lands on a key that
        // is still waiting to shift.
        shifted.sort_unstable();
        for index in shifted {
            if let Some(mut exchange) = self.pending.remove(&index) {
                exchange.participant_index = index - 1;
                self.pending.insert(index - 1, exchange);
            }
        }
    }

    /// Re-key pending exchanges after an empty slot was inserted at
    /// `inserted` and indices at or past it shifted up by one.
    pub fn shift_after_insertion(&mut self, inserted: usize) {
        let mut shifted: Vec<usize> = self
            .pending
            .keys()
            .filter(|index| **index >= inserted)
            .copied()
            .collect();
        // Largest first, for the same collision-free reason.
        shifted.sort_unstable_by(|a, b| b.cmp(a));
        for index in shifted {
            if let Some(mut exchange) = self.pending.remove(&index) {
                exchange.participant_index = index + 1;
                self.pending.insert(index + 1, exchange);
            }
        }
    }

    pub fn cancel_all(&mut self) {
        if !self.pending.is_empty() {
            tracing::debug!("Cancelling {} pending exchanges", self.pending.len());
            self.pending.clear();
        }
    }

    /// Run one phase transition. Re-inserts the exchange when it is still
    /// in flight; returns the outcome when it is terminal.
    async fn advance(
        &mut self,
        mut exchange: PendingExchange,
        now: DateTime<Utc>,
    ) -> Option<ExchangeOutcome> {
        match exchange.phase {
            ExchangePhase::ActivationWait => {
                let text = std::mem::take(&mut exchange.text);
                let delivered = self.deliver(exchange.tab, &text).await;
                self.restore_focus(&exchange).await;

                match delivered {
                    Ok(()) => {
                        exchange.phase = ExchangePhase::InitialDelay;
                        exchange.deadline =
                            now + Duration::milliseconds(exchange.timeouts.initial_delay_ms as i64);
                        self.pending.insert(exchange.participant_index, exchange);
                        None
                    }
                    Err(ActivationError::TabGone(tab)) => Some(ExchangeOutcome::TabGone {
                        participant_index: exchange.participant_index,
                        tab,
                    }),
                    Err(ActivationError::Delivery(error)) => {
                        Some(ExchangeOutcome::DeliveryFailed {
                            participant_index: exchange.participant_index,
                            error,
                        })
                    }
                }
            }
            ExchangePhase::InitialDelay | ExchangePhase::Polling => {
                self.poll(exchange, now).await
            }
        }
    }

    async fn poll(
        &mut self,
        mut exchange: PendingExchange,
        now: DateTime<Utc>,
    ) -> Option<ExchangeOutcome> {
        let elapsed_ms = (now - exchange.started_at).num_milliseconds().max(0) as u64;
        if elapsed_ms >= POLL_CEILING_MS {
            tracing::warn!(
                "Participant {} exceeded the {}ms poll ceiling after {} polls",
                exchange.participant_index,
                POLL_CEILING_MS,
                exchange.poll_count
            );
            self.restore_focus(&exchange).await;
            let partial = self.probe_text(exchange.tab).await;
            return Some(ExchangeOutcome::TimedOut {
                participant_index: exchange.participant_index,
                platform: exchange.platform,
                partial,
                timeout_used_ms: POLL_CEILING_MS,
            });
        }

        let adapter = match self.host.adapter(exchange.tab).await {
            Ok(adapter) => adapter,
            Err(HostError::Gone(tab)) => {
                return Some(ExchangeOutcome::TabGone {
                    participant_index: exchange.participant_index,
                    tab,
                });
            }
            Err(HostError::Message(e)) => {
                tracing::warn!("Poll of tab {} failed, will retry: {}", exchange.tab, e);
                return self.reschedule_poll(exchange, now);
            }
        };

        // Briefly foreground the target so throttled tabs make progress,
        // then restore the caller's context no matter what the probe saw.
        if let Err(e) = self.host.activate(exchange.tab).await {
            match e {
                HostError::Gone(tab) => {
                    return Some(ExchangeOutcome::TabGone {
                        participant_index: exchange.participant_index,
                        tab,
                    });
                }
                HostError::Message(e) => {
                    tracing::debug!("Poll activation of tab {} failed: {}", exchange.tab, e)
                }
            }
        }
        let probe = async {
            let text = adapter.latest_response().await?;
            let generating = adapter.is_generating().await?;
            Ok::<_, HostError>((text, generating))
        }
        .await;
        self.restore_focus(&exchange).await;

        exchange.poll_count += 1;
        match probe {
            Ok((Some(text), generating)) => {
                let len = text.chars().count();
                let stable = exchange.last_observed_len == Some(len);
                exchange.last_observed_len = Some(len);

                if stable && !generating {
                    return Some(ExchangeOutcome::Finalized {
                        participant_index: exchange.participant_index,
                        platform: exchange.platform,
                        text,
                        observed_ms: elapsed_ms,
                        timeout_used_ms: POLL_CEILING_MS,
                    });
                }
                self.reschedule_poll(exchange, now)
            }
            Ok((None, _)) => {
                exchange.last_observed_len = None;
                self.reschedule_poll(exchange, now)
            }
            Err(HostError::Gone(tab)) => Some(ExchangeOutcome::TabGone {
                participant_index: exchange.participant_index,
                tab,
            }),
            Err(HostError::Message(e)) => {
                tracing::warn!("Probe of tab {} failed, will retry: {}", exchange.tab, e);
                self.reschedule_poll(exchange, now)
            }
        }
    }

    fn reschedule_poll(
        &mut self,
        mut exchange: PendingExchange,
        now: DateTime<Utc>,
    ) -> Option<ExchangeOutcome> {
        exchange.phase = ExchangePhase::Polling;
        exchange.deadline = now + Duration::milliseconds(exchange.timeouts.check_interval_ms as i64);
        self.pending.insert(exchange.participant_index, exchange);
        None
    }

    async fn activate_target(&self, tab: TabId) -> Result<(), ActivationError> {
        match self.host.activate(tab).await {
            Ok(()) => Ok(()),
            Err(HostError::Gone(tab)) => Err(ActivationError::TabGone(tab)),
            Err(HostError::Message(e)) => {
                // Best-effort courtesy; the send itself decides success.
                tracing::warn!("Could not activate tab {}: {}", tab, e);
                Ok(())
            }
        }
    }

    async fn deliver(&self, tab: TabId, text: &str) -> Result<(), ActivationError> {
        let adapter = self.host.adapter(tab).await.map_err(|e| match e {
            HostError::Gone(tab) => ActivationError::TabGone(tab),
            HostError::Message(e) => ActivationError::Delivery(e),
        })?;

        let accepted = adapter.set_input_text(text).await.map_err(delivery_err)?;
        if !accepted {
            return Err(ActivationError::Delivery(
                "adapter could not set the input text".to_string(),
            ));
        }
        let clicked = adapter.click_send().await.map_err(delivery_err)?;
        if !clicked {
            return Err(ActivationError::Delivery(
                "adapter could not click send".to_string(),
            ));
        }
        Ok(())
    }

    async fn restore_focus(&self, exchange: &PendingExchange) {
        if let Some(original) = exchange.original_tab {
            if let Err(e) = self.host.activate(original).await {
                tracing::debug!("Could not restore original tab {}: {}", original, e);
            }
        }
    }

    async fn probe_text(&self, tab: TabId) -> Option<String> {
        match self.host.adapter(tab).await {
            Ok(adapter) => adapter.latest_response().await.ok().flatten(),
            Err(_) => None,
        }
    }
}

fn delivery_err(e: HostError) -> ActivationError {
    match e {
        HostError::Gone(tab) => ActivationError::TabGone(tab),
        HostError::Message(e) => ActivationError::Delivery(e),
    }
}
