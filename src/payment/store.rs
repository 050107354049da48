//! Transaction State Store
//!
//! Holds every live Transaction by id, the "current" id, and an append-only
//! status history per id.
//!
//! Mutation after the initial insert goes through a [`TransactionWriter`].
//! At most one writer is outstanding per id. Writes check the lease and apply
//! under the entry lock, and [`LeaseRevoker::revoke`] and [`TransactionStateStore::discard`]
//! take the same lock, so once either returns no write from that lease can land.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::debug;

use super::error::PaymentError;
use super::types::{PollObservation, StatusSnapshot, Transaction};
use crate::core_types::TransactionId;

struct Entry {
    transaction: Transaction,
    history: Vec<StatusSnapshot>,
    /// Incremented on every acquire; a writer or revoker only acts on its own epoch
    lease_epoch: u64,
    leased: bool,
    discarded: bool,
}

impl Entry {
    fn holds(&self, epoch: u64) -> bool {
        !self.discarded && self.leased && self.lease_epoch == epoch
    }
}

type Slot = Arc<Mutex<Entry>>;

fn lock(slot: &Slot) -> MutexGuard<'_, Entry> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
pub struct TransactionStateStore {
    entries: DashMap<TransactionId, Slot>,
    current: Mutex<Option<TransactionId>>,
}

impl TransactionStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, id: &TransactionId) -> Option<Slot> {
        self.entries.get(id).map(|slot| Arc::clone(slot.value()))
    }

    fn current_guard(&self) -> MutexGuard<'_, Option<TransactionId>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Initial write. The new transaction becomes current.
    pub fn insert(&self, transaction: Transaction) -> Result<(), PaymentError> {
        let id = transaction.id.clone();
        let entry = Entry {
            history: vec![StatusSnapshot::of(&transaction, transaction.created_at)],
            transaction,
            lease_epoch: 0,
            leased: false,
            discarded: false,
        };

        match self.entries.entry(id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(PaymentError::InvalidStateTransition(format!(
                    "transaction {} already exists",
                    id
                )));
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(Arc::new(Mutex::new(entry)));
            }
        }

        debug!(tx_id = %id, "Transaction stored");
        *self.current_guard() = Some(id);
        Ok(())
    }

    /// Take the write lease for `id`. `Ok(None)` if another writer holds it.
    pub fn acquire_writer(&self, id: &TransactionId) -> Result<Option<TransactionWriter>, PaymentError> {
        let slot = self
            .slot(id)
            .ok_or_else(|| PaymentError::TransactionNotFound(id.to_string()))?;

        let epoch = {
            let mut entry = lock(&slot);
            if entry.discarded {
                return Err(PaymentError::TransactionNotFound(id.to_string()));
            }
            if entry.leased {
                return Ok(None);
            }
            entry.leased = true;
            entry.lease_epoch += 1;
            entry.lease_epoch
        };

        Ok(Some(TransactionWriter {
            id: id.clone(),
            slot,
            epoch,
        }))
    }

    pub fn get(&self, id: &TransactionId) -> Option<Transaction> {
        self.slot(id).map(|slot| lock(&slot).transaction.clone())
    }

    pub fn current_id(&self) -> Option<TransactionId> {
        self.current_guard().clone()
    }

    pub fn current(&self) -> Option<Transaction> {
        self.current_id().and_then(|id| self.get(&id))
    }

    pub fn history(&self, id: &TransactionId) -> Option<Vec<StatusSnapshot>> {
        self.slot(id).map(|slot| lock(&slot).history.clone())
    }

    pub fn is_leased(&self, id: &TransactionId) -> bool {
        self.slot(id).is_some_and(|slot| lock(&slot).leased)
    }

    /// Remove `id` and refuse any further write from its lease
    pub fn discard(&self, id: &TransactionId) -> bool {
        let Some((_, slot)) = self.entries.remove(id) else {
            return false;
        };
        {
            let mut entry = lock(&slot);
            entry.discarded = true;
            entry.leased = false;
        }

        let mut current = self.current_guard();
        if current.as_ref() == Some(id) {
            *current = None;
        }
        debug!(tx_id = %id, "Transaction discarded");
        true
    }

    /// Discard every transaction
    pub fn clear(&self) -> usize {
        let ids: Vec<TransactionId> = self.entries.iter().map(|e| e.key().clone()).collect();
        ids.iter().filter(|id| self.discard(id)).count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Exclusive write lease on one Transaction. Dropping it releases the lease.
pub struct TransactionWriter {
    id: TransactionId,
    slot: Slot,
    epoch: u64,
}

impl TransactionWriter {
    pub fn id(&self) -> &TransactionId {
        &self.id
    }

    /// Apply one poll and append the resulting snapshot to the history
    pub fn record_poll(
        &self,
        observation: &PollObservation,
        max_attempts: u32,
        now: DateTime<Utc>,
    ) -> Result<Transaction, PaymentError> {
        let mut entry = lock(&self.slot);
        if !entry.holds(self.epoch) {
            return Err(PaymentError::InvalidStateTransition(format!(
                "write lease on {} was revoked",
                self.id
            )));
        }

        entry.transaction.apply_poll(observation, max_attempts, now)?;
        let snapshot = StatusSnapshot::of(&entry.transaction, now);
        entry.history.push(snapshot);
        Ok(entry.transaction.clone())
    }

    pub fn snapshot(&self) -> Transaction {
        lock(&self.slot).transaction.clone()
    }

    pub fn revoker(&self) -> LeaseRevoker {
        LeaseRevoker {
            slot: Arc::clone(&self.slot),
            epoch: self.epoch,
        }
    }
}

impl Drop for TransactionWriter {
    fn drop(&mut self) {
        let mut entry = lock(&self.slot);
        if entry.lease_epoch == self.epoch {
            entry.leased = false;
        }
    }
}

/// Revokes one specific lease from outside the writer's task
#[derive(Clone)]
pub struct LeaseRevoker {
    slot: Slot,
    epoch: u64,
}

impl LeaseRevoker {
    /// Returns `true` only if this call ended a live lease
    pub fn revoke(&self) -> bool {
        let mut entry = lock(&self.slot);
        if entry.holds(self.epoch) {
            entry.leased = false;
            true
        } else {
            false
        }
    }
}
