use std::sync::Mutex;

use tierpay_pricing::{NodeChannelOverride, PayoutChargeRecord};

use crate::error::SettlementError;
use crate::types::{LedgerEntry, Transaction};

/// Durable record of engine state.
///
/// Called before the in-memory change is published, while the locks guarding
/// it are still held. An error aborts the change, so nothing is live that the
/// journal does not hold.
pub trait Journal: Send + Sync {
    /// Persist a transaction's new state together with the ledger entries
    /// posted for it, all or nothing. Either part may be absent.
    fn commit(&self, txn: Option<&Transaction>, entries: &[LedgerEntry]) -> Result<(), SettlementError>;

    fn override_assigned(&self, entry: &NodeChannelOverride) -> Result<(), SettlementError>;

    fn payout_config_assigned(&self, record: &PayoutChargeRecord) -> Result<(), SettlementError>;
}

/// Journal that keeps nothing.
pub struct NoopJournal;

impl Journal for NoopJournal {
    fn commit(&self, _txn: Option<&Transaction>, _entries: &[LedgerEntry]) -> Result<(), SettlementError> {
        Ok(())
    }

    fn override_assigned(&self, _entry: &NodeChannelOverride) -> Result<(), SettlementError> {
        Ok(())
    }

    fn payout_config_assigned(&self, _record: &PayoutChargeRecord) -> Result<(), SettlementError> {
        Ok(())
    }
}

/// In-memory journal, mainly for restore tests.
#[derive(Default)]
pub struct MemoryJournal {
    transactions: Mutex<Vec<Transaction>>,
    entries: Mutex<Vec<LedgerEntry>>,
    overrides: Mutex<Vec<NodeChannelOverride>>,
    payout_configs: Mutex<Vec<PayoutChargeRecord>>,
}

impl MemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest journaled state of every transaction, oldest id first.
    pub fn transactions(&self) -> Vec<Transaction> {
        let Ok(log) = self.transactions.lock() else {
            return Vec::new();
        };
        let mut latest = std::collections::BTreeMap::new();
        for txn in log.iter() {
            latest.insert(txn.id, txn.clone());
        }
        latest.into_values().collect()
    }

    pub fn entries(&self) -> Vec<LedgerEntry> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn overrides(&self) -> Vec<NodeChannelOverride> {
        self.overrides.lock().map(|o| o.clone()).unwrap_or_default()
    }

    pub fn payout_configs(&self) -> Vec<PayoutChargeRecord> {
        self.payout_configs.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

fn poisoned() -> SettlementError {
    SettlementError::Journal("memory journal lock poisoned".into())
}

impl Journal for MemoryJournal {
    fn commit(&self, txn: Option<&Transaction>, entries: &[LedgerEntry]) -> Result<(), SettlementError> {
        // Both logs are locked before either is extended.
        let mut transactions = self.transactions.lock().map_err(|_| poisoned())?;
        let mut log = self.entries.lock().map_err(|_| poisoned())?;
        if let Some(txn) = txn {
            transactions.push(txn.clone());
        }
        log.extend_from_slice(entries);
        Ok(())
    }

    fn override_assigned(&self, entry: &NodeChannelOverride) -> Result<(), SettlementError> {
        self.overrides.lock().map_err(|_| poisoned())?.push(entry.clone());
        Ok(())
    }

    fn payout_config_assigned(&self, record: &PayoutChargeRecord) -> Result<(), SettlementError> {
        self.payout_configs
            .lock()
            .map_err(|_| poisoned())?
            .push(record.clone());
        Ok(())
    }
}
