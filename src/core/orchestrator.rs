use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;

use crate::core::timeout::TimeoutManager;
use crate::models::{
    MatchNotification, MatchRequest, MatchStatus, Notification, UserPreference,
};
use crate::services::bus::{BusError, NotificationPublisher};
use crate::services::pool::{PoolError, PoolStore};

/// How long a terminal record stays registered before eviction. The grace
/// period lets late bus notifications resolve as stale rather than unknown,
/// while keeping the registry bounded by recent traffic.
pub const TERMINAL_RETENTION: Duration = Duration::from_secs(300);

/// Errors surfaced by the orchestrator to the collaborator layer
#[derive(Debug, Error)]
pub enum MatchError {
    #[error("Pool store error: {0}")]
    Pool(#[from] PoolError),

    #[error("Notification bus error: {0}")]
    Bus(#[from] BusError),
}

/// Pairing bookkeeping attached to a matched record.
///
/// Both parties' ids are known from the match notification, so acceptance
/// by either side can be tracked on any instance holding the record.
#[derive(Debug)]
struct Pairing {
    counterpart_request_id: String,
    self_accepted: bool,
    counterpart_accepted: bool,
}

#[derive(Debug)]
struct RequestRecord {
    user_id: String,
    status: MatchStatus,
    status_tx: watch::Sender<MatchStatus>,
    pairing: Option<Pairing>,
}

/// Handle returned to the submitter: the generated request id plus a watch
/// channel reporting every status transition up to the terminal one.
pub struct SubmittedRequest {
    pub request_id: String,
    pub status: watch::Receiver<MatchStatus>,
}

/// Drives the per-request state machine.
///
/// `Pooled -> Matched -> {Accepted | Voided}` and
/// `Pooled -> {Expired | Cancelled}`, with user cancel allowed from any
/// non-terminal state. Transitions are triggered by the atomic match
/// result, inbound bus notifications (possibly produced by another
/// instance), explicit cancels, and timer expiry. The instance that
/// performs a state-changing pool operation never advances its local record
/// directly; it publishes and lets its own subscriber do it, the same as
/// every other instance.
pub struct MatchingOrchestrator<P, B> {
    pool: P,
    bus: B,
    timeouts: TimeoutManager,
    registry: Mutex<HashMap<String, RequestRecord>>,
    match_timeout: Duration,
    acceptance_timeout: Duration,
}

impl<P, B> MatchingOrchestrator<P, B>
where
    P: PoolStore,
    B: NotificationPublisher,
{
    pub fn new(pool: P, bus: B, match_timeout: Duration, acceptance_timeout: Duration) -> Self {
        Self {
            pool,
            bus,
            timeouts: TimeoutManager::new(),
            registry: Mutex::new(HashMap::new()),
            match_timeout,
            acceptance_timeout,
        }
    }

    /// Submit a preference for matching.
    ///
    /// Runs the atomic match operation. On a match the notification is
    /// published; on no-match the request is now pooled and its
    /// match-timeout is armed. A pool store failure removes the local
    /// record and is returned as-is: nothing was submitted, the caller
    /// must re-submit.
    pub async fn submit(
        self: &Arc<Self>,
        preference: UserPreference,
    ) -> Result<SubmittedRequest, MatchError> {
        let request = MatchRequest::new(preference);
        let request_id = request.request_id.clone();

        let (status_tx, status_rx) = watch::channel(MatchStatus::Pooled);
        {
            let mut registry = self.registry.lock().unwrap();
            registry.insert(
                request_id.clone(),
                RequestRecord {
                    user_id: request.user_id().to_string(),
                    status: MatchStatus::Pooled,
                    status_tx,
                    pairing: None,
                },
            );
        }

        let outcome = match self.pool.find_or_enqueue(&request).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.registry.lock().unwrap().remove(&request_id);
                return Err(e.into());
            }
        };

        // A stale entry for the same user was replaced; resolve the
        // superseded submission as cancelled wherever it is tracked.
        if let Some(old_id) = &outcome.replaced_request_id {
            tracing::info!("Request {} replaced stale request {}", request_id, old_id);
            if let Err(e) = self.bus.publish_cancel(old_id).await {
                tracing::warn!("Failed to publish cancel for replaced request {}: {}", old_id, e);
            }
        }

        match outcome.matched {
            Some(counterpart) => {
                let notification = MatchNotification {
                    user1_preference: counterpart.preference.clone(),
                    user2_preference: request.preference.clone(),
                    request_id_1: counterpart.request_id.clone(),
                    request_id_2: request_id.clone(),
                };
                tracing::info!(
                    "Matched request {} with pooled request {}",
                    request_id,
                    counterpart.request_id
                );
                if let Err(e) = self.bus.publish_match(&notification).await {
                    // The counterpart is already consumed; without the
                    // notification neither party can progress, so fail the
                    // submission rather than claim success.
                    self.registry.lock().unwrap().remove(&request_id);
                    return Err(e.into());
                }
            }
            None => {
                tracing::info!("Request {} pooled, no compatible entry", request_id);
                let this = Arc::clone(self);
                let id = request_id.clone();
                self.timeouts.schedule(&request_id, self.match_timeout, async move {
                    this.expire(&id).await;
                });
            }
        }

        Ok(SubmittedRequest {
            request_id,
            status: status_rx,
        })
    }

    /// User-initiated cancellation. Returns whether the request was
    /// actually moved to `Cancelled` (false for unknown or already
    /// terminal requests).
    pub async fn cancel(self: &Arc<Self>, request_id: &str) -> Result<bool, MatchError> {
        let snapshot = {
            let registry = self.registry.lock().unwrap();
            registry
                .get(request_id)
                .filter(|r| !r.status.is_terminal())
                .map(|r| (r.status, r.user_id.clone()))
        };

        let Some((status, user_id)) = snapshot else {
            return Ok(false);
        };

        if status == MatchStatus::Pooled {
            // Remove before transitioning; a store failure leaves the
            // request untouched and pending.
            self.pool.remove(&user_id, request_id).await?;
        }

        self.timeouts.cancel(request_id);
        let cancelled = self.finish(request_id, MatchStatus::Cancelled);
        if cancelled {
            if let Err(e) = self.bus.publish_cancel(request_id).await {
                tracing::warn!("Failed to publish cancel for {}: {}", request_id, e);
            }
        }
        Ok(cancelled)
    }

    /// Record one party's acceptance of a confirmed pairing, identified by
    /// that party's request id. When both parties of a locally tracked
    /// record have accepted, the record becomes `Accepted` and its
    /// acceptance-timeout is disarmed. Returns whether any local record
    /// observed the signal.
    pub fn record_acceptance(self: &Arc<Self>, request_id: &str) -> bool {
        let mut completed = Vec::new();
        let mut observed = false;
        {
            let mut registry = self.registry.lock().unwrap();
            for (id, record) in registry.iter_mut() {
                if record.status != MatchStatus::Matched {
                    continue;
                }
                let Some(pairing) = record.pairing.as_mut() else {
                    continue;
                };
                if id.as_str() == request_id {
                    pairing.self_accepted = true;
                    observed = true;
                } else if pairing.counterpart_request_id == request_id {
                    pairing.counterpart_accepted = true;
                    observed = true;
                } else {
                    continue;
                }
                if pairing.self_accepted && pairing.counterpart_accepted {
                    completed.push(id.clone());
                }
            }
        }

        for id in completed {
            self.timeouts.cancel(&id);
            self.finish(&id, MatchStatus::Accepted);
        }
        observed
    }

    /// Entry point for the bus subscriber. Duplicate or stale
    /// notifications resolve as no-ops; notifications for requests this
    /// instance has no record of are logged and ignored.
    pub fn handle_notification(self: &Arc<Self>, notification: Notification) {
        match notification {
            Notification::Match(m) => self.handle_match_notification(m),
            Notification::Cancel(request_id) => self.handle_cancel_notification(&request_id),
        }
    }

    fn handle_match_notification(self: &Arc<Self>, notification: MatchNotification) {
        let sides = [
            (&notification.request_id_1, &notification.request_id_2),
            (&notification.request_id_2, &notification.request_id_1),
        ];

        for (own_id, counterpart_id) in sides {
            let transitioned = {
                let mut registry = self.registry.lock().unwrap();
                match registry.get_mut(own_id.as_str()) {
                    Some(record) if record.status == MatchStatus::Pooled => {
                        record.status = MatchStatus::Matched;
                        record.pairing = Some(Pairing {
                            counterpart_request_id: counterpart_id.clone(),
                            self_accepted: false,
                            counterpart_accepted: false,
                        });
                        record.status_tx.send_replace(MatchStatus::Matched);
                        true
                    }
                    Some(record) => {
                        tracing::debug!(
                            "Ignoring match notification for {} in state {:?}",
                            own_id,
                            record.status
                        );
                        false
                    }
                    None => {
                        tracing::debug!("No local record for matched request {}", own_id);
                        false
                    }
                }
            };

            if transitioned {
                tracing::info!("Request {} matched with {}", own_id, counterpart_id);
                // Re-arming the same timer slot swaps the match-timeout
                // for the acceptance-timeout in one step.
                let this = Arc::clone(self);
                let id = own_id.clone();
                self.timeouts.schedule(own_id, self.acceptance_timeout, async move {
                    this.void_pairing(&id).await;
                });
            }
        }
    }

    fn handle_cancel_notification(self: &Arc<Self>, request_id: &str) {
        let mut finished = Vec::new();
        {
            let mut registry = self.registry.lock().unwrap();
            for (id, record) in registry.iter_mut() {
                let withdrawn_party = id.as_str() == request_id;
                let withdrawn_counterpart = record
                    .pairing
                    .as_ref()
                    .is_some_and(|p| p.counterpart_request_id == request_id);
                if !withdrawn_party && !withdrawn_counterpart {
                    continue;
                }

                let next = match record.status {
                    MatchStatus::Pooled if withdrawn_party => MatchStatus::Cancelled,
                    MatchStatus::Matched => MatchStatus::Voided,
                    _ => continue,
                };
                record.status = next;
                record.status_tx.send_replace(next);
                tracing::info!("Request {} -> {:?} (cancel notification for {})", id, next, request_id);
                finished.push(id.clone());
            }
        }
        // Scheduling the eviction replaces (and disarms) whichever timer
        // was still armed for the record.
        for id in finished {
            self.schedule_eviction(&id);
        }
    }

    /// Match-timeout expiry. Only if the atomic remove actually removed
    /// the entry does the request expire; losing the race means a match
    /// notification is already on its way.
    async fn expire(self: &Arc<Self>, request_id: &str) {
        let user_id = {
            let registry = self.registry.lock().unwrap();
            match registry.get(request_id) {
                Some(record) if record.status == MatchStatus::Pooled => record.user_id.clone(),
                _ => return,
            }
        };

        match self.pool.remove(&user_id, request_id).await {
            Ok(true) => {
                // The entry is ours; no match can follow, so the fired
                // timer slot is safe to drop.
                self.timeouts.forget(request_id);
                if self.finish(request_id, MatchStatus::Expired) {
                    tracing::info!("Request {} expired without a match", request_id);
                    if let Err(e) = self.bus.publish_cancel(request_id).await {
                        tracing::warn!("Failed to publish cancel for expired {}: {}", request_id, e);
                    }
                }
            }
            Ok(false) => {
                // The entry was consumed (match in flight) or superseded by
                // a resubmission elsewhere; either way a notification for
                // this request is coming, so leave the slot to be re-armed
                // or replaced by it.
                tracing::debug!("Request {} no longer pooled at expiry", request_id);
            }
            Err(e) => {
                self.timeouts.forget(request_id);
                tracing::error!("Pool remove failed for expiring request {}: {}", request_id, e);
            }
        }
    }

    /// Acceptance-timeout expiry: the pairing is voided and a cancel is
    /// published so the counterpart's owner converges too.
    async fn void_pairing(self: &Arc<Self>, request_id: &str) {
        // This fired timer owns the slot; release it before finish()
        // schedules the eviction into the same slot.
        self.timeouts.forget(request_id);

        let matched = {
            let registry = self.registry.lock().unwrap();
            registry
                .get(request_id)
                .is_some_and(|r| r.status == MatchStatus::Matched)
        };
        if !matched {
            return;
        }

        if self.finish(request_id, MatchStatus::Voided) {
            tracing::info!("Request {} voided, acceptance window elapsed", request_id);
            if let Err(e) = self.bus.publish_cancel(request_id).await {
                tracing::warn!("Failed to publish cancel for voided {}: {}", request_id, e);
            }
        }
    }

    /// Apply a terminal transition if the record is still live. Terminal
    /// records stay registered for the retention grace period, then are
    /// evicted.
    fn finish(self: &Arc<Self>, request_id: &str, status: MatchStatus) -> bool {
        let transitioned = {
            let mut registry = self.registry.lock().unwrap();
            match registry.get_mut(request_id) {
                Some(record) if !record.status.is_terminal() => {
                    record.status = status;
                    record.status_tx.send_replace(status);
                    true
                }
                _ => false,
            }
        };
        if transitioned {
            tracing::info!("Request {} -> {:?}", request_id, status);
            self.schedule_eviction(request_id);
        }
        transitioned
    }

    /// Drop a terminal record after [`TERMINAL_RETENTION`]. Reuses the
    /// request's timer slot, which disarms any timer still armed for it.
    fn schedule_eviction(self: &Arc<Self>, request_id: &str) {
        let this = Arc::clone(self);
        let id = request_id.to_string();
        self.timeouts.schedule(request_id, TERMINAL_RETENTION, async move {
            this.timeouts.forget(&id);
            this.registry.lock().unwrap().remove(&id);
            tracing::debug!("Evicted terminal request {}", id);
        });
    }

    pub fn status(&self, request_id: &str) -> Option<MatchStatus> {
        let registry = self.registry.lock().unwrap();
        registry.get(request_id).map(|r| r.status)
    }

    /// Status plus the counterpart id once matched, for the status API
    pub fn status_detail(&self, request_id: &str) -> Option<(MatchStatus, Option<String>)> {
        let registry = self.registry.lock().unwrap();
        registry.get(request_id).map(|r| {
            (
                r.status,
                r.pairing.as_ref().map(|p| p.counterpart_request_id.clone()),
            )
        })
    }

    /// Watch a request's status transitions
    pub fn subscribe(&self, request_id: &str) -> Option<watch::Receiver<MatchStatus>> {
        let registry = self.registry.lock().unwrap();
        registry.get(request_id).map(|r| r.status_tx.subscribe())
    }

    pub async fn healthy(&self) -> bool {
        self.pool.ping().await.is_ok()
    }
}
