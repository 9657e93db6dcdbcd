use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tierpay_core::{Amount, NodeId, TransactionId};
use uuid::Uuid;

use crate::error::LedgerError;
use crate::types::{ApplyOutcome, EntryKey, EntryKind, LedgerEntry, Posting, WalletBalance};

const GENESIS: [u8; 32] = [0u8; 32];

/// Per-node running balances.
#[derive(Debug, Clone)]
struct WalletAccount {
    node_id: NodeId,
    balance: Amount,
    hold_balance: Amount,
    /// Open holds by owning transaction.
    open_holds: HashMap<TransactionId, Amount>,
    head: [u8; 32],
}

impl WalletAccount {
    fn new(node_id: NodeId) -> Self {
        Self {
            node_id,
            balance: Amount::ZERO,
            hold_balance: Amount::ZERO,
            open_holds: HashMap::new(),
            head: GENESIS,
        }
    }

    fn available(&self) -> Amount {
        self.balance
            .checked_sub(self.hold_balance)
            .unwrap_or(Amount::ZERO)
    }

    fn require_available(&self, required: Amount) -> Result<(), LedgerError> {
        let available = self.available();
        if available < required {
            return Err(LedgerError::InsufficientBalance {
                node: self.node_id.clone(),
                available,
                required,
            });
        }
        Ok(())
    }

    fn take_hold(&mut self, txn: TransactionId, amount: Amount) -> Result<(), LedgerError> {
        let held = self
            .open_holds
            .get(&txn)
            .copied()
            .ok_or_else(|| LedgerError::HoldNotFound {
                node: self.node_id.clone(),
                transaction: txn,
            })?;
        if held != amount {
            return Err(LedgerError::HoldMismatch {
                node: self.node_id.clone(),
                held,
                amount,
            });
        }
        self.open_holds.remove(&txn);
        self.hold_balance = self
            .hold_balance
            .checked_sub(amount)
            .ok_or_else(|| LedgerError::Overflow(self.node_id.clone()))?;
        Ok(())
    }

    fn add(&mut self, amount: Amount) -> Result<(), LedgerError> {
        self.balance = self
            .balance
            .checked_add(amount)
            .ok_or_else(|| LedgerError::Overflow(self.node_id.clone()))?;
        Ok(())
    }

    fn subtract(&mut self, amount: Amount) -> Result<(), LedgerError> {
        self.balance = self.balance.checked_sub(amount).ok_or_else(|| {
            LedgerError::InsufficientBalance {
                node: self.node_id.clone(),
                available: self.balance,
                required: amount,
            }
        })?;
        Ok(())
    }

    /// Apply one posting to this (scratch) account.
    fn post(&mut self, txn: TransactionId, kind: EntryKind, amount: Amount) -> Result<(), LedgerError> {
        match kind {
            EntryKind::Credit | EntryKind::Commission | EntryKind::TransferIn => self.add(amount),
            EntryKind::Hold => {
                self.require_available(amount)?;
                self.hold_balance = self
                    .hold_balance
                    .checked_add(amount)
                    .ok_or_else(|| LedgerError::Overflow(self.node_id.clone()))?;
                self.open_holds.insert(txn, amount);
                Ok(())
            }
            EntryKind::Release => self.take_hold(txn, amount),
            EntryKind::Debit => {
                // A debit against the transaction's own hold converts it;
                // otherwise it needs free funds.
                if self.open_holds.contains_key(&txn) {
                    self.take_hold(txn, amount)?;
                } else {
                    self.require_available(amount)?;
                }
                self.subtract(amount)
            }
            EntryKind::TransferOut => {
                self.require_available(amount)?;
                self.subtract(amount)
            }
        }
    }

    /// Replay a committed entry without re-validating it.
    fn replay(&mut self, entry: &LedgerEntry) {
        match entry.kind {
            EntryKind::Hold => {
                self.open_holds.insert(entry.transaction_id, entry.amount);
            }
            EntryKind::Release | EntryKind::Debit => {
                self.open_holds.remove(&entry.transaction_id);
            }
            _ => {}
        }
        self.balance = entry.balance_after;
        self.hold_balance = entry.hold_after;
        if let Ok(bytes) = hex::decode(&entry.hash) {
            if let Ok(head) = <[u8; 32]>::try_from(bytes.as_slice()) {
                self.head = head;
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn entry_hash(
    prev: &[u8; 32],
    id: &Uuid,
    node: &NodeId,
    kind: EntryKind,
    amount: Amount,
    balance_after: Amount,
    hold_after: Amount,
    txn: &TransactionId,
    created_at: &DateTime<Utc>,
) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(prev);
    hasher.update(id.as_bytes());
    hasher.update(node.as_str().as_bytes());
    hasher.update(&[0]);
    hasher.update(kind.code().as_bytes());
    hasher.update(&amount.value().to_le_bytes());
    hasher.update(&balance_after.value().to_le_bytes());
    hasher.update(&hold_after.value().to_le_bytes());
    hasher.update(txn.as_uuid().as_bytes());
    hasher.update(&created_at.timestamp_micros().to_le_bytes());
    *hasher.finalize().as_bytes()
}

/// Wallet ledger applying posting batches atomically and exactly once.
///
/// Every batch locks the wallets it touches in ascending node order, applies
/// all postings to scratch copies, and writes back only when every posting
/// succeeded. The idempotency index is checked and extended while those locks
/// are held, so a (transaction, kind, node) triple is applied at most once.
pub struct WalletLedger {
    wallets: DashMap<NodeId, Arc<Mutex<WalletAccount>>>,
    entries: DashMap<NodeId, Vec<LedgerEntry>>,
    index: DashMap<EntryKey, Uuid>,
}

impl WalletLedger {
    pub fn new() -> Self {
        Self {
            wallets: DashMap::new(),
            entries: DashMap::new(),
            index: DashMap::new(),
        }
    }

    fn wallet(&self, node: &NodeId) -> Arc<Mutex<WalletAccount>> {
        self.wallets
            .entry(node.clone())
            .or_insert_with(|| Arc::new(Mutex::new(WalletAccount::new(node.clone()))))
            .clone()
    }

    /// Apply a batch of postings belonging to one transaction.
    pub fn apply(
        &self,
        transaction_id: TransactionId,
        postings: &[Posting],
    ) -> Result<ApplyOutcome, LedgerError> {
        self.apply_durable(transaction_id, postings, |_| Ok::<(), LedgerError>(()))
    }

    /// Apply a batch, handing the staged entries to `persist` before any
    /// wallet is written back.
    ///
    /// `persist` runs while every touched wallet is still locked. If it fails
    /// the batch is dropped and the wallets keep their previous state. It is
    /// not called for a duplicate batch.
    pub fn apply_durable<E, F>(
        &self,
        transaction_id: TransactionId,
        postings: &[Posting],
        persist: F,
    ) -> Result<ApplyOutcome, E>
    where
        E: From<LedgerError>,
        F: FnOnce(&[LedgerEntry]) -> Result<(), E>,
    {
        if postings.is_empty() {
            return Err(LedgerError::EmptyBatch.into());
        }
        if let Some(p) = postings.iter().find(|p| p.amount.is_zero()) {
            return Err(LedgerError::ZeroAmount {
                node: p.node_id.clone(),
                kind: p.kind,
            }
            .into());
        }

        // Collect the Arcs first so no DashMap shard guard is held while locking.
        let nodes: BTreeSet<&NodeId> = postings.iter().map(|p| &p.node_id).collect();
        let cells: Vec<(NodeId, Arc<Mutex<WalletAccount>>)> = nodes
            .into_iter()
            .map(|n| (n.clone(), self.wallet(n)))
            .collect();
        let mut guards: Vec<(NodeId, MutexGuard<'_, WalletAccount>)> = Vec::with_capacity(cells.len());
        for (node, cell) in &cells {
            let guard = cell.lock().map_err(|_| LedgerError::LockPoisoned)?;
            guards.push((node.clone(), guard));
        }

        let keys: Vec<EntryKey> = postings
            .iter()
            .map(|p| EntryKey {
                transaction_id,
                kind: p.kind,
                node_id: p.node_id.clone(),
            })
            .collect();
        if keys.iter().any(|k| self.index.contains_key(k)) {
            tracing::info!(txn_id = %transaction_id, "posting batch already applied; duplicate ignored");
            return Ok(ApplyOutcome::Duplicate);
        }

        let mut scratch: HashMap<NodeId, WalletAccount> = guards
            .iter()
            .map(|(node, guard)| (node.clone(), (**guard).clone()))
            .collect();
        let now = Utc::now();
        let mut committed = Vec::with_capacity(postings.len());

        for posting in postings {
            let account = scratch
                .get_mut(&posting.node_id)
                .ok_or(LedgerError::LockPoisoned)?;
            if let Err(e) = account.post(transaction_id, posting.kind, posting.amount) {
                tracing::warn!(
                    txn_id = %transaction_id,
                    node = %posting.node_id,
                    kind = %posting.kind,
                    amount = posting.amount.value(),
                    error = %e,
                    "posting batch rejected"
                );
                return Err(e.into());
            }

            let id = Uuid::now_v7();
            let hash = entry_hash(
                &account.head,
                &id,
                &posting.node_id,
                posting.kind,
                posting.amount,
                account.balance,
                account.hold_balance,
                &transaction_id,
                &now,
            );
            account.head = hash;
            committed.push(LedgerEntry {
                id,
                node_id: posting.node_id.clone(),
                kind: posting.kind,
                amount: posting.amount,
                balance_after: account.balance,
                hold_after: account.hold_balance,
                transaction_id,
                created_at: now,
                hash: hex::encode(hash),
            });
        }

        persist(&committed)?;

        for (node, guard) in guards.iter_mut() {
            if let Some(account) = scratch.remove(node) {
                **guard = account;
            }
        }
        for entry in &committed {
            self.index.insert(entry.key(), entry.id);
            self.entries
                .entry(entry.node_id.clone())
                .or_default()
                .push(entry.clone());
        }

        tracing::debug!(txn_id = %transaction_id, entries = committed.len(), "posting batch committed");
        Ok(ApplyOutcome::Committed(committed))
    }

    pub fn balance(&self, node: &NodeId) -> Result<WalletBalance, LedgerError> {
        let Some(cell) = self.wallets.get(node).map(|c| Arc::clone(c.value())) else {
            return Ok(WalletBalance {
                balance: Amount::ZERO,
                hold_balance: Amount::ZERO,
                available: Amount::ZERO,
            });
        };
        let account = cell.lock().map_err(|_| LedgerError::LockPoisoned)?;
        Ok(WalletBalance {
            balance: account.balance,
            hold_balance: account.hold_balance,
            available: account.available(),
        })
    }

    pub fn entries(&self, node: &NodeId) -> Vec<LedgerEntry> {
        self.entries
            .get(node)
            .map(|e| e.value().clone())
            .unwrap_or_default()
    }

    pub fn contains(&self, key: &EntryKey) -> bool {
        self.index.contains_key(key)
    }

    pub fn has_open_hold(&self, node: &NodeId, txn: &TransactionId) -> Result<bool, LedgerError> {
        let Some(cell) = self.wallets.get(node).map(|c| Arc::clone(c.value())) else {
            return Ok(false);
        };
        let account = cell.lock().map_err(|_| LedgerError::LockPoisoned)?;
        Ok(account.open_holds.contains_key(txn))
    }

    pub fn wallet_count(&self) -> usize {
        self.wallets.len()
    }

    pub fn entry_count(&self) -> usize {
        self.index.len()
    }

    /// Recompute a wallet's hash chain and its running balances.
    pub fn verify_chain(&self, node: &NodeId) -> Result<(), LedgerError> {
        let mut head = GENESIS;
        for entry in self.entries(node) {
            let expected = entry_hash(
                &head,
                &entry.id,
                &entry.node_id,
                entry.kind,
                entry.amount,
                entry.balance_after,
                entry.hold_after,
                &entry.transaction_id,
                &entry.created_at,
            );
            if hex::encode(expected) != entry.hash {
                return Err(LedgerError::ChainBroken {
                    node: node.clone(),
                    entry: entry.id,
                });
            }
            head = expected;
        }
        Ok(())
    }

    /// Rebuild balances, holds, chain heads and the idempotency index from
    /// journaled entries. Entry ids are UUIDv7 minted under the wallet lock,
    /// so sorting by id recovers each wallet's commit order.
    pub fn restore(&self, entries: impl IntoIterator<Item = LedgerEntry>) -> Result<usize, LedgerError> {
        let mut entries: Vec<LedgerEntry> = entries.into_iter().collect();
        entries.sort_by_key(|e| e.id);
        let mut count = 0;
        for entry in entries {
            let cell = self.wallet(&entry.node_id);
            let mut account = cell.lock().map_err(|_| LedgerError::LockPoisoned)?;
            account.replay(&entry);
            self.index.insert(entry.key(), entry.id);
            self.entries
                .entry(entry.node_id.clone())
                .or_default()
                .push(entry);
            count += 1;
        }
        tracing::info!(entries = count, wallets = self.wallets.len(), "ledger restored");
        Ok(count)
    }
}

impl Default for WalletLedger {
    fn default() -> Self {
        Self::new()
    }
}
