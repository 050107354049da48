//! Status Poller
//!
//! Owns the bounded confirmation loop for one Transaction:
//!
//! ```text
//! start ──► sleep(interval) ──► GET /payments/status/{ref} ──► record_poll
//!              ▲                                                   │
//!              └──────────── still Pending ◄──────────────────────┤
//!                                                                  ▼
//!                                   Completed | Failed | TimedOut (stop)
//! ```
//!
//! One spawned task per Transaction id, holding that id's write lease.
//! Nothing here retries after a terminal status; a manual re-check is
//! [`StatusPoller::verify_once`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::watch;
use tracing::{debug, info};

use super::error::PaymentError;
use super::store::{LeaseRevoker, TransactionStateStore, TransactionWriter};
use super::types::{PollObservation, Transaction};
use crate::config::{MAX_ATTEMPT_BUDGET, PollerSettings};
use crate::core_types::TransactionId;
use crate::rail::PaymentRail;

/// Per-tick events go to this target so they can be filtered on their own
pub const POLL_TARGET: &str = "POLL";

/// How often a starting loop re-tries a lease held by a manual verify
const LEASE_RETRY: Duration = Duration::from_millis(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerConfig {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl PollerConfig {
    /// Attempt budget forced into `1..=MAX_ATTEMPT_BUDGET`
    pub fn bounded(self) -> Self {
        Self {
            max_attempts: self.max_attempts.clamp(1, MAX_ATTEMPT_BUDGET),
            ..self
        }
    }
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            max_attempts: MAX_ATTEMPT_BUDGET,
        }
    }
}

impl From<&PollerSettings> for PollerConfig {
    fn from(settings: &PollerSettings) -> Self {
        Self {
            interval: Duration::from_millis(settings.interval_ms),
            max_attempts: settings.max_attempts,
        }
        .bounded()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollStart {
    Started,
    AlreadyActive,
    AlreadyTerminal,
}

/// Handle to one running poll loop
pub struct PollHandle {
    /// Filled once the loop holds the write lease
    revoker: Mutex<Option<LeaseRevoker>>,
    shutdown: watch::Sender<bool>,
    done: watch::Sender<bool>,
    cancelled: AtomicBool,
}

impl PollHandle {
    fn new() -> (Arc<Self>, watch::Receiver<bool>) {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let (done, _) = watch::channel(false);
        let handle = Arc::new(Self {
            revoker: Mutex::new(None),
            shutdown,
            done,
            cancelled: AtomicBool::new(false),
        });
        (handle, shutdown_rx)
    }

    /// Stop the loop. Returns `true` only for the first call.
    ///
    /// The lease is revoked before this returns, so the loop cannot write
    /// again even if its in-flight status call completes.
    pub fn cancel(&self) -> bool {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return false;
        }
        if let Some(revoker) = self.revoker.lock().unwrap_or_else(PoisonError::into_inner).as_ref() {
            revoker.revoke();
        }
        self.shutdown.send_replace(true);
        true
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Whether the loop has exited
    pub fn is_finished(&self) -> bool {
        *self.done.borrow()
    }

    /// Resolves once the loop has exited; any number of callers may wait.
    pub async fn finished(&self) {
        let mut done = self.done.subscribe();
        // the sender lives in `self`, so this only ends on `true`
        let _ = done.wait_for(|finished| *finished).await;
    }

    /// Record the lease the loop just took. `false` if cancelled first,
    /// in which case the loop must not write.
    fn attach(&self, revoker: LeaseRevoker) -> bool {
        let mut slot = self.revoker.lock().unwrap_or_else(PoisonError::into_inner);
        if self.is_cancelled() {
            return false;
        }
        *slot = Some(revoker);
        true
    }
}

/// Unregisters the loop and wakes waiters, also when the task unwinds
struct LoopExit {
    id: TransactionId,
    active: Arc<DashMap<TransactionId, Arc<PollHandle>>>,
    handle: Arc<PollHandle>,
}

impl Drop for LoopExit {
    fn drop(&mut self) {
        self.active.remove_if(&self.id, |_, h| Arc::ptr_eq(h, &self.handle));
        self.handle.done.send_replace(true);
    }
}

/// Outcome of a one-time manual status check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyOutcome {
    pub observation: PollObservation,
    /// Transaction as stored after the check
    pub transaction: Transaction,
    /// Whether the observation was recorded as an attempt
    pub applied: bool,
}

pub struct StatusPoller {
    rail: Arc<dyn PaymentRail>,
    store: Arc<TransactionStateStore>,
    config: PollerConfig,
    active: Arc<DashMap<TransactionId, Arc<PollHandle>>>,
}

impl StatusPoller {
    pub fn new(
        rail: Arc<dyn PaymentRail>,
        store: Arc<TransactionStateStore>,
        config: PollerConfig,
    ) -> Self {
        Self {
            rail,
            store,
            config: config.bounded(),
            active: Arc::new(DashMap::new()),
        }
    }

    pub fn config(&self) -> PollerConfig {
        self.config
    }

    /// Start polling `id`. Idempotent: a second call never spawns a second loop.
    ///
    /// If a manual verify holds the lease at this moment the loop waits for
    /// it to be released before its first tick.
    pub fn start(&self, id: &TransactionId) -> Result<PollStart, PaymentError> {
        let tx = self
            .store
            .get(id)
            .ok_or_else(|| PaymentError::TransactionNotFound(id.to_string()))?;
        if tx.is_terminal() {
            return Ok(PollStart::AlreadyTerminal);
        }

        let vacant = match self.active.entry(id.clone()) {
            Entry::Occupied(_) => return Ok(PollStart::AlreadyActive),
            Entry::Vacant(vacant) => vacant,
        };
        let (handle, shutdown_rx) = PollHandle::new();
        vacant.insert(Arc::clone(&handle));

        tokio::spawn(run_poll_loop(
            Arc::clone(&self.rail),
            Arc::clone(&self.store),
            self.config,
            shutdown_rx,
            LoopExit {
                id: id.clone(),
                active: Arc::clone(&self.active),
                handle,
            },
        ));

        info!(
            tx_id = %id,
            reference = %tx.provider_reference,
            backend = self.rail.name(),
            interval_ms = self.config.interval.as_millis() as u64,
            max_attempts = self.config.max_attempts,
            "Polling started"
        );
        Ok(PollStart::Started)
    }

    /// Cancel the poller for `id`. `true` only for the call that stopped it.
    pub fn cancel(&self, id: &TransactionId) -> bool {
        match self.active.remove(id) {
            Some((_, handle)) => {
                let cancelled = handle.cancel();
                if cancelled {
                    info!(tx_id = %id, "Polling cancelled");
                }
                cancelled
            }
            None => false,
        }
    }

    pub fn cancel_all(&self) -> usize {
        let ids: Vec<TransactionId> = self.active.iter().map(|e| e.key().clone()).collect();
        ids.iter().filter(|id| self.cancel(id)).count()
    }

    pub fn is_active(&self, id: &TransactionId) -> bool {
        self.active.contains_key(id)
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Wait for the loop on `id` to exit. `false` if none was running.
    pub async fn wait(&self, id: &TransactionId) -> bool {
        let handle = match self.active.get(id) {
            Some(handle) => Arc::clone(handle.value()),
            None => return false,
        };
        handle.finished().await;
        true
    }

    /// One status call, never a recurring loop.
    ///
    /// The observation is recorded only if the Transaction is still Pending
    /// and no poller holds its lease; otherwise it is just reported.
    pub async fn verify_once(&self, id: &TransactionId) -> Result<VerifyOutcome, PaymentError> {
        let tx = self
            .store
            .get(id)
            .ok_or_else(|| PaymentError::TransactionNotFound(id.to_string()))?;

        let result = self.rail.payment_status(&tx.provider_reference).await;
        let observation = PollObservation::from_result(result);
        debug!(tx_id = %id, ?observation, "Manual verify");

        if !tx.is_terminal() && !self.is_active(id) {
            if let Some(writer) = self.store.acquire_writer(id)? {
                match writer.record_poll(&observation, self.config.max_attempts, Utc::now()) {
                    Ok(updated) => {
                        info!(tx_id = %id, status = %updated.status, attempts = updated.attempts, "Manual verify applied");
                        return Ok(VerifyOutcome {
                            observation,
                            transaction: updated,
                            applied: true,
                        });
                    }
                    Err(e) => debug!(tx_id = %id, error = %e, "Manual verify not applied"),
                }
            }
        }

        let transaction = self
            .store
            .get(id)
            .ok_or_else(|| PaymentError::TransactionNotFound(id.to_string()))?;
        Ok(VerifyOutcome {
            observation,
            transaction,
            applied: false,
        })
    }
}

/// Take the write lease for `id`, retrying while someone else holds it.
/// `None` once shut down or the entry is gone.
async fn acquire_lease(
    store: &TransactionStateStore,
    id: &TransactionId,
    shutdown: &mut watch::Receiver<bool>,
) -> Option<TransactionWriter> {
    loop {
        if *shutdown.borrow() {
            return None;
        }
        match store.acquire_writer(id) {
            Ok(Some(writer)) => return Some(writer),
            Ok(None) => debug!(target: POLL_TARGET, tx_id = %id, "Lease busy, retrying"),
            Err(e) => {
                debug!(target: POLL_TARGET, tx_id = %id, error = %e, "Lease unavailable");
                return None;
            }
        }
        tokio::select! {
            _ = tokio::time::sleep(LEASE_RETRY) => {}
            _ = shutdown.changed() => return None,
        }
    }
}

async fn run_poll_loop(
    rail: Arc<dyn PaymentRail>,
    store: Arc<TransactionStateStore>,
    config: PollerConfig,
    mut shutdown: watch::Receiver<bool>,
    exit: LoopExit,
) {
    let id = exit.id.clone();
    let Some(writer) = acquire_lease(&store, &id, &mut shutdown).await else {
        return;
    };
    if !exit.handle.attach(writer.revoker()) {
        return;
    }
    let reference = writer.snapshot().provider_reference;

    loop {
        tokio::select! {
            _ = tokio::time::sleep(config.interval) => {}
            _ = shutdown.changed() => break,
        }

        // no status call without budget left for it
        let before = writer.snapshot();
        if before.is_terminal() || before.attempts >= config.max_attempts {
            debug!(
                target: POLL_TARGET,
                tx_id = %id,
                status = %before.status,
                attempts = before.attempts,
                "Nothing left to poll"
            );
            break;
        }

        let result = tokio::select! {
            result = rail.payment_status(&reference) => result,
            _ = shutdown.changed() => break,
        };
        let observation = PollObservation::from_result(result);

        let tx = match writer.record_poll(&observation, config.max_attempts, Utc::now()) {
            Ok(tx) => tx,
            Err(e) => {
                debug!(target: POLL_TARGET, tx_id = %id, error = %e, "Poll result dropped");
                break;
            }
        };

        match &observation {
            PollObservation::Reported(status) => debug!(
                target: POLL_TARGET,
                tx_id = %id,
                attempt = tx.attempts,
                ?status,
                "Poll"
            ),
            PollObservation::Inconclusive(error) => debug!(
                target: POLL_TARGET,
                tx_id = %id,
                attempt = tx.attempts,
                %error,
                "Poll inconclusive"
            ),
        }

        if tx.is_terminal() {
            info!(
                tx_id = %id,
                status = %tx.status,
                attempts = tx.attempts,
                reason = ?tx.failure_reason,
                "Transaction reached terminal status"
            );
            break;
        }
    }
    // `writer` drops before `exit`, so waiters never see a held lease
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_types::{Currency, FiatCurrency, Rail};
    use crate::payment::TransactionStatus;
    use crate::rail::{MockRail, RailError, RailStatus};
    use rust_decimal::Decimal;

    const FAST: PollerConfig = PollerConfig {
        interval: Duration::from_millis(5),
        max_attempts: 30,
    };

    const TICK: PollerConfig = PollerConfig {
        interval: Duration::from_millis(1),
        max_attempts: 30,
    };

    fn setup(config: PollerConfig) -> (Arc<MockRail>, Arc<TransactionStateStore>, StatusPoller, TransactionId) {
        let rail = Arc::new(MockRail::new());
        let store = Arc::new(TransactionStateStore::new());
        let id = TransactionId::from_rail("tx-1");
        store
            .insert(Transaction::pending(
                id.clone(),
                Rail::MobileMoneyAirtel,
                Decimal::from(10_000),
                Currency::Fiat(FiatCurrency::Ugx),
                "+256750000002",
                "",
                "REF-1",
                Utc::now(),
            ))
            .unwrap();
        let poller = StatusPoller::new(rail.clone(), store.clone(), config);
        (rail, store, poller, id)
    }

    #[tokio::test]
    async fn test_completes_and_stops() {
        let (rail, store, poller, id) = setup(FAST);
        rail.push_pending(1);
        rail.push_status(Ok(RailStatus::Succeeded));

        assert_eq!(poller.start(&id).unwrap(), PollStart::Started);
        assert!(poller.wait(&id).await);

        let tx = store.get(&id).unwrap();
        assert_eq!(tx.status, TransactionStatus::Completed);
        assert_eq!(tx.attempts, 2);
        assert!(!poller.is_active(&id));

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(rail.status_count(), 2);
    }

    #[tokio::test]
    async fn test_failure_reason_recorded() {
        let (rail, store, poller, id) = setup(FAST);
        rail.push_status(Ok(RailStatus::Failed {
            reason: "subscriber not found".into(),
        }));

        poller.start(&id).unwrap();
        poller.wait(&id).await;

        let tx = store.get(&id).unwrap();
        assert_eq!(tx.status, TransactionStatus::Failed);
        assert_eq!(tx.failure_reason.as_deref(), Some("subscriber not found"));
        assert_eq!(tx.attempts, 1);
    }

    #[tokio::test]
    async fn test_budget_exhaustion() {
        let (rail, store, poller, id) = setup(TICK);

        poller.start(&id).unwrap();
        poller.wait(&id).await;

        let tx = store.get(&id).unwrap();
        assert_eq!(tx.status, TransactionStatus::TimedOut);
        assert_eq!(tx.attempts, 30);
        assert_eq!(rail.status_count(), 30);
        assert_eq!(store.history(&id).unwrap().len(), 31);

        // no automatic retry
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(rail.status_count(), 30);
    }

    #[tokio::test]
    async fn test_zero_budget_still_polls_once() {
        let (rail, store, poller, id) = setup(PollerConfig {
            interval: Duration::from_millis(1),
            max_attempts: 0,
        });
        assert_eq!(poller.config().max_attempts, 1);

        poller.start(&id).unwrap();
        poller.wait(&id).await;

        let tx = store.get(&id).unwrap();
        assert_eq!(tx.status, TransactionStatus::TimedOut);
        assert_eq!(tx.attempts, 1);
        assert_eq!(rail.status_count(), 1);
        assert!(!store.is_leased(&id));
    }

    #[tokio::test]
    async fn test_every_waiter_sees_the_outcome() {
        let (rail, store, poller, id) = setup(FAST);
        rail.push_pending(2);
        rail.push_status(Ok(RailStatus::Succeeded));

        poller.start(&id).unwrap();
        let handle = poller.active.get(&id).map(|h| Arc::clone(h.value())).unwrap();
        assert!(!handle.is_finished());

        let (first, second) = tokio::join!(poller.wait(&id), poller.wait(&id));
        assert!(first);
        assert!(second);
        assert!(handle.is_finished());
        assert_eq!(store.get(&id).unwrap().status, TransactionStatus::Completed);
        assert!(!poller.is_active(&id));

        // already finished: resolves at once
        handle.finished().await;
        assert!(!poller.wait(&id).await);
    }

    #[tokio::test]
    async fn test_transport_errors_are_inconclusive() {
        let (rail, store, poller, id) = setup(FAST);
        rail.push_status(Err(RailError::Transport("connection reset".into())));
        rail.push_status(Err(RailError::Http {
            status: 503,
            message: "maintenance".into(),
        }));
        rail.push_status(Err(RailError::UnrecognizedResponse("{}".into())));
        rail.push_status(Ok(RailStatus::Succeeded));

        poller.start(&id).unwrap();
        poller.wait(&id).await;

        let tx = store.get(&id).unwrap();
        assert_eq!(tx.status, TransactionStatus::Completed);
        assert_eq!(tx.attempts, 4);
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let (rail, _store, poller, id) = setup(FAST);
        rail.push_pending(3);
        rail.push_status(Ok(RailStatus::Succeeded));

        assert_eq!(poller.start(&id).unwrap(), PollStart::Started);
        assert_eq!(poller.start(&id).unwrap(), PollStart::AlreadyActive);
        assert_eq!(poller.active_count(), 1);

        poller.wait(&id).await;
        assert_eq!(rail.status_count(), 4);
        assert_eq!(poller.start(&id).unwrap(), PollStart::AlreadyTerminal);
    }

    #[tokio::test]
    async fn test_unknown_transaction() {
        let (_rail, _store, poller, _id) = setup(FAST);
        let err = poller.start(&TransactionId::from_rail("missing")).unwrap_err();
        assert_eq!(err.code(), "TRANSACTION_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_cancel_exactly_once_no_late_write() {
        let (rail, store, poller, id) = setup(TICK);
        // status call still in flight when cancelled
        rail.set_status_delay(Duration::from_millis(50));
        rail.push_status(Ok(RailStatus::Succeeded));

        poller.start(&id).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(rail.status_count(), 1);

        assert!(poller.cancel(&id));
        assert!(!poller.cancel(&id));
        assert!(!poller.is_active(&id));

        tokio::time::sleep(Duration::from_millis(100)).await;
        let tx = store.get(&id).unwrap();
        assert_eq!(tx.status, TransactionStatus::Pending);
        assert_eq!(tx.attempts, 0);
        assert!(!store.is_leased(&id));
    }

    #[tokio::test]
    async fn test_start_waits_for_busy_lease() {
        let (rail, store, poller, id) = setup(TICK);
        rail.push_status(Ok(RailStatus::Succeeded));

        // a manual verify is mid-write
        let writer = store.acquire_writer(&id).unwrap().unwrap();
        assert_eq!(poller.start(&id).unwrap(), PollStart::Started);
        assert!(poller.is_active(&id));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(rail.status_count(), 0);
        assert!(poller.is_active(&id));

        drop(writer);
        assert!(poller.wait(&id).await);
        let tx = store.get(&id).unwrap();
        assert_eq!(tx.status, TransactionStatus::Completed);
        assert_eq!(tx.attempts, 1);
        assert_eq!(rail.status_count(), 1);
    }

    #[tokio::test]
    async fn test_cancel_while_lease_busy() {
        let (rail, store, poller, id) = setup(TICK);
        let writer = store.acquire_writer(&id).unwrap().unwrap();

        poller.start(&id).unwrap();
        let handle = poller.active.get(&id).map(|h| Arc::clone(h.value())).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(poller.cancel(&id));
        handle.finished().await;
        drop(writer);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(rail.status_count(), 0);
        assert!(!store.is_leased(&id));
        assert_eq!(store.get(&id).unwrap().attempts, 0);
    }

    #[tokio::test]
    async fn test_handle_cancel_once() {
        let (_rail, _store, poller, id) = setup(FAST);
        poller.start(&id).unwrap();
        let handle = poller.active.get(&id).map(|h| Arc::clone(h.value())).unwrap();
        assert!(handle.cancel());
        assert!(!handle.cancel());
        assert!(handle.is_cancelled());
    }

    #[tokio::test]
    async fn test_discard_stops_writes() {
        let (rail, store, poller, id) = setup(FAST);
        rail.set_status_delay(Duration::from_millis(20));

        poller.start(&id).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(store.discard(&id));

        poller.wait(&id).await;
        assert!(store.get(&id).is_none());
        assert!(!poller.is_active(&id));
    }

    #[tokio::test]
    async fn test_verify_once_applies_when_idle() {
        let (rail, store, poller, id) = setup(FAST);
        rail.push_status(Ok(RailStatus::Succeeded));

        let outcome = poller.verify_once(&id).await.unwrap();
        assert!(outcome.applied);
        assert_eq!(outcome.transaction.status, TransactionStatus::Completed);
        assert_eq!(store.get(&id).unwrap().attempts, 1);
        assert_eq!(rail.status_count(), 1);
        assert!(!poller.is_active(&id));
    }

    #[tokio::test]
    async fn test_verify_after_timeout_reports_only() {
        let (rail, store, poller, id) = setup(TICK);
        poller.start(&id).unwrap();
        poller.wait(&id).await;
        assert_eq!(store.get(&id).unwrap().status, TransactionStatus::TimedOut);

        rail.push_status(Ok(RailStatus::Succeeded));
        let outcome = poller.verify_once(&id).await.unwrap();
        assert!(!outcome.applied);
        assert_eq!(
            outcome.observation,
            PollObservation::Reported(RailStatus::Succeeded)
        );
        assert_eq!(outcome.transaction.status, TransactionStatus::TimedOut);
        assert_eq!(outcome.transaction.attempts, 30);
        assert_eq!(rail.status_count(), 31);
        assert!(!poller.is_active(&id));
    }

    #[test]
    fn test_config_from_settings() {
        let config = PollerConfig::from(&PollerSettings {
            interval_ms: 250,
            max_attempts: 5,
        });
        assert_eq!(config.interval, Duration::from_millis(250));
        assert_eq!(config.max_attempts, 5);
        assert_eq!(PollerConfig::default().max_attempts, 30);

        let zero = PollerConfig::from(&PollerSettings {
            interval_ms: 250,
            max_attempts: 0,
        });
        assert_eq!(zero.max_attempts, 1);
        let over = PollerConfig::from(&PollerSettings {
            interval_ms: 250,
            max_attempts: 99,
        });
        assert_eq!(over.max_attempts, MAX_ATTEMPT_BUDGET);
    }
}
