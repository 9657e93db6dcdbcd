use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use tierpay_core::{TransactionId, TransactionStatus};

use crate::error::SettlementError;
use crate::types::Transaction;

/// Live transactions, each behind its own lock.
///
/// Holding a transaction's lock is what makes its PENDING → terminal
/// transition a single compare-and-set: whoever holds it while the status is
/// still PENDING is the only caller allowed to run distribution and posting.
pub struct TransactionBook {
    transactions: DashMap<TransactionId, Arc<Mutex<Transaction>>>,
}

impl TransactionBook {
    pub fn new() -> Self {
        Self {
            transactions: DashMap::new(),
        }
    }

    pub fn insert(&self, txn: Transaction) -> Result<Arc<Mutex<Transaction>>, SettlementError> {
        let id = txn.id;
        let cell = Arc::new(Mutex::new(txn));
        match self.transactions.entry(id) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(SettlementError::AlreadyExists(id)),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(Arc::clone(&cell));
                Ok(cell)
            }
        }
    }

    pub fn cell(&self, id: &TransactionId) -> Result<Arc<Mutex<Transaction>>, SettlementError> {
        self.transactions
            .get(id)
            .map(|c| Arc::clone(c.value()))
            .ok_or(SettlementError::TransactionNotFound(*id))
    }

    /// A copy of the transaction's current state.
    pub fn get(&self, id: &TransactionId) -> Result<Transaction, SettlementError> {
        let cell = self.cell(id)?;
        let txn = cell.lock().map_err(|_| SettlementError::LockPoisoned)?;
        Ok(txn.clone())
    }

    fn collect(&self, keep: impl Fn(&Transaction) -> bool) -> Vec<Transaction> {
        let cells: Vec<_> = self
            .transactions
            .iter()
            .map(|c| Arc::clone(c.value()))
            .collect();
        let mut found: Vec<Transaction> = cells
            .iter()
            .filter_map(|c| c.lock().ok().map(|t| t.clone()))
            .filter(|t| keep(t))
            .collect();
        found.sort_by_key(|t| t.id);
        found
    }

    pub fn pending(&self) -> Vec<Transaction> {
        self.collect(|t| t.status == TransactionStatus::Pending)
    }

    pub fn all(&self) -> Vec<Transaction> {
        self.collect(|_| true)
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// Load journaled transactions, replacing any in-memory copy.
    pub fn restore(&self, transactions: impl IntoIterator<Item = Transaction>) -> usize {
        let mut count = 0;
        for txn in transactions {
            self.transactions.insert(txn.id, Arc::new(Mutex::new(txn)));
            count += 1;
        }
        count
    }
}

impl Default for TransactionBook {
    fn default() -> Self {
        Self::new()
    }
}
