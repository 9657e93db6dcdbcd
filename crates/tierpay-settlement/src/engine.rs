use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tierpay_core::{
    Amount, ChannelId, CoreError, EngineConfig, GatewayId, NodeId, Outcome, Rate,
    TransactionId, TransactionStateMachine, TransactionStatus, TxnKind,
};
use tierpay_pricing::{
    EffectiveRate, NodeChannelOverride, PayoutChargeConfig, PayoutChargeRecord, PayoutScope,
    RateDirectory,
};

use crate::distributor::CommissionDistributor;
use crate::error::{LedgerError, SettlementError};
use crate::journal::{Journal, NoopJournal};
use crate::ledger::WalletLedger;
use crate::transactions::TransactionBook;
use crate::types::{
    ApplyOutcome, EntryKind, LedgerEntry, Posting, SettleResult, Transaction, WalletBalance,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStats {
    pub transactions: usize,
    pub pending: usize,
    pub wallets: usize,
    pub ledger_entries: usize,
}

/// The rate resolution and commission distribution engine.
///
/// Prices transactions against the rate directory when they are created,
/// freezes that pricing on the transaction, and on the single PENDING →
/// terminal transition distributes commission and posts to the wallet ledger.
pub struct SettlementEngine {
    directory: Arc<RateDirectory>,
    ledger: WalletLedger,
    book: TransactionBook,
    journal: Arc<dyn Journal>,
    config: EngineConfig,
}

impl SettlementEngine {
    pub fn new(directory: Arc<RateDirectory>, config: EngineConfig) -> Self {
        Self::with_journal(directory, config, Arc::new(NoopJournal))
    }

    pub fn with_journal(
        directory: Arc<RateDirectory>,
        config: EngineConfig,
        journal: Arc<dyn Journal>,
    ) -> Self {
        Self {
            directory,
            ledger: WalletLedger::new(),
            book: TransactionBook::new(),
            journal,
            config,
        }
    }

    pub fn directory(&self) -> &Arc<RateDirectory> {
        &self.directory
    }

    pub fn ledger(&self) -> &WalletLedger {
        &self.ledger
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ---- journaling ----

    /// Journal a transaction state and the entries posted for it as one unit.
    fn record(&self, txn: Option<&Transaction>, entries: &[LedgerEntry]) -> Result<(), SettlementError> {
        if !self.config.journal_enabled || (txn.is_none() && entries.is_empty()) {
            return Ok(());
        }
        self.journal.commit(txn, entries).inspect_err(|e| {
            tracing::error!(entries = entries.len(), error = %e, "journal write failed; change not applied");
        })
    }

    fn record_override(&self, entry: &NodeChannelOverride) -> Result<(), SettlementError> {
        if !self.config.journal_enabled {
            return Ok(());
        }
        self.journal.override_assigned(entry)
    }

    fn record_payout_config(&self, record: &PayoutChargeRecord) -> Result<(), SettlementError> {
        if !self.config.journal_enabled {
            return Ok(());
        }
        self.journal.payout_config_assigned(record)
    }

    /// Apply `postings` under `reference`, journaling them together with
    /// `txn` before any wallet changes. A duplicate batch journals `txn` alone.
    fn post_and_record(
        &self,
        txn: Option<&Transaction>,
        reference: TransactionId,
        postings: &[Posting],
    ) -> Result<ApplyOutcome, SettlementError> {
        let applied = self
            .ledger
            .apply_durable(reference, postings, |entries| self.record(txn, entries))?;
        if applied.is_duplicate() {
            self.record(txn, &[])?;
        }
        Ok(applied)
    }

    // ---- rates ----

    pub fn resolve_effective_rate(
        &self,
        node: &NodeId,
        channel: &ChannelId,
        kind: TxnKind,
    ) -> Result<EffectiveRate, SettlementError> {
        Ok(self.directory.resolve(node, channel, kind)?)
    }

    /// Assign a personal rate. Fails with `RateBelowFloor` and stores nothing
    /// when the rate would undercut the assigner. The rate is journaled before
    /// it becomes visible to pricing.
    pub fn assign_rate(
        &self,
        assigner: &NodeId,
        node: &NodeId,
        channel: &ChannelId,
        rate: Rate,
    ) -> Result<NodeChannelOverride, SettlementError> {
        self.directory
            .upsert_override_with(assigner, node, channel, rate, |entry| self.record_override(entry))
    }

    pub fn set_override_enabled(
        &self,
        node: &NodeId,
        channel: &ChannelId,
        enabled: bool,
    ) -> Result<NodeChannelOverride, SettlementError> {
        self.directory
            .set_override_enabled_with(node, channel, enabled, |entry| self.record_override(entry))
    }

    pub fn assign_payout_config(
        &self,
        assigner: &NodeId,
        scope: PayoutScope,
        gateway: &GatewayId,
        config: PayoutChargeConfig,
    ) -> Result<PayoutChargeRecord, SettlementError> {
        self.directory
            .upsert_payout_config_with(assigner, scope, gateway, config, |record| {
                self.record_payout_config(record)
            })
    }

    /// The charge `config` levies on a payout of `amount`.
    pub fn payout_charge(&self, config: &PayoutChargeConfig, amount: Amount) -> Result<Amount, SettlementError> {
        config.validate()?;
        Ok(config.charge_for(amount)?)
    }

    // ---- transactions ----

    fn require_amount(amount: Amount) -> Result<(), SettlementError> {
        if amount.is_zero() {
            return Err(CoreError::InvalidAmount("transaction amount must be positive".into()).into());
        }
        Ok(())
    }

    /// Price a payin and record it as PENDING.
    pub fn create_payin(
        &self,
        initiator: &NodeId,
        channel: &ChannelId,
        amount: Amount,
    ) -> Result<Transaction, SettlementError> {
        Self::require_amount(amount)?;
        let quote = self
            .directory
            .quote_payin(initiator, channel, amount, Utc::now())?;
        let txn = Transaction::from_quote(quote)?;
        self.record(Some(&txn), &[])?;
        self.book.insert(txn.clone())?;

        tracing::info!(
            txn_id = %txn.id,
            initiator = %initiator,
            channel = %channel,
            amount = amount.value(),
            billed = txn.charge().value(),
            "payin created"
        );
        Ok(txn)
    }

    /// Price a payout, hold `amount + charge` on the initiator's wallet and
    /// record it as PENDING. Without free funds the payout is FAILED at once.
    ///
    /// The hold is placed and journaled before the transaction enters the
    /// book, so no settler can observe a PENDING payout without its hold.
    pub fn create_payout(
        &self,
        initiator: &NodeId,
        gateway: Option<&GatewayId>,
        amount: Amount,
    ) -> Result<Transaction, SettlementError> {
        Self::require_amount(amount)?;
        let quote = self
            .directory
            .quote_payout(initiator, gateway, amount, Utc::now())?;
        let mut txn = Transaction::from_quote(quote)?;
        let total = txn
            .total_debit()
            .ok_or_else(|| CoreError::Overflow(format!("payout {} plus charge", txn.amount)))?;
        let hold = [Posting::new(initiator.clone(), EntryKind::Hold, total)];

        match self.post_and_record(Some(&txn), txn.id, &hold) {
            Ok(_) => {
                self.book.insert(txn.clone())?;
                tracing::info!(
                    txn_id = %txn.id,
                    initiator = %initiator,
                    gateway = %txn.gateway_id,
                    amount = amount.value(),
                    charge = txn.charge().value(),
                    "payout created and funds held"
                );
                Ok(txn)
            }
            Err(SettlementError::Ledger(e)) if !matches!(e, LedgerError::LockPoisoned) => {
                txn.status = TransactionStatus::Failed;
                txn.failure_reason = Some(e.to_string());
                txn.updated_at = Utc::now();
                self.record(Some(&txn), &[])?;
                tracing::warn!(txn_id = %txn.id, initiator = %initiator, error = %e, "payout failed at hold");
                self.book.insert(txn)?;
                Err(e.into())
            }
            Err(e) => Err(e),
        }
    }

    /// Drive a PENDING transaction to its terminal state.
    ///
    /// The transaction's lock is held across the status check, the postings,
    /// the journal write and the status write. The new state is built on a
    /// copy and published only once the journal has it. Callers that lose the
    /// race see the terminal status and get `AlreadyTerminal` without touching
    /// the ledger.
    pub fn settle(&self, id: TransactionId, outcome: Outcome) -> Result<SettleResult, SettlementError> {
        let cell = self.book.cell(&id)?;
        let mut txn = cell.lock().map_err(|_| SettlementError::LockPoisoned)?;

        if txn.status.is_final() {
            tracing::info!(
                txn_id = %id,
                status = %txn.status,
                %outcome,
                "transaction already terminal; settle ignored"
            );
            return Ok(SettleResult::AlreadyTerminal { status: txn.status });
        }

        let target = TransactionStateMachine::transition(txn.status, outcome)?;
        let (next, result) = match target {
            TransactionStatus::Success => self.commit_success(&txn)?,
            _ => {
                let mut next = txn.clone();
                next.status = target;
                next.updated_at = Utc::now();
                self.close(&next)?;
                (next, SettleResult::Committed { status: target })
            }
        };
        *txn = next;

        tracing::info!(
            txn_id = %id,
            kind = %txn.kind,
            status = %txn.status,
            commissions = txn.commissions.len(),
            "transaction settled"
        );
        Ok(result)
    }

    fn commit_success(&self, txn: &Transaction) -> Result<(Transaction, SettleResult), SettlementError> {
        let shares = CommissionDistributor::distribute(&txn.quote)?;

        let mut postings = Vec::with_capacity(shares.len() + 1);
        match txn.kind {
            TxnKind::Payin => {
                let net = txn.amount.checked_sub(txn.charge()).ok_or_else(|| {
                    SettlementError::InvalidSnapshot(format!(
                        "charge {} exceeds amount {}",
                        txn.charge(),
                        txn.amount
                    ))
                })?;
                if !net.is_zero() {
                    postings.push(Posting::new(txn.initiator.clone(), EntryKind::Credit, net));
                }
            }
            TxnKind::Payout => {
                let total = txn
                    .total_debit()
                    .ok_or_else(|| CoreError::Overflow(format!("payout {} plus charge", txn.amount)))?;
                postings.push(Posting::new(txn.initiator.clone(), EntryKind::Debit, total));
            }
        }
        postings.extend(CommissionDistributor::postings(&shares));

        let mut next = txn.clone();
        next.status = TransactionStatus::Success;
        next.commissions = shares;
        next.updated_at = Utc::now();

        if postings.is_empty() {
            self.record(Some(&next), &[])?;
        } else {
            match self.post_and_record(Some(&next), txn.id, &postings) {
                Ok(_) => {}
                Err(SettlementError::Ledger(e)) if !matches!(e, LedgerError::LockPoisoned) => {
                    tracing::warn!(txn_id = %txn.id, error = %e, "ledger rejected settlement; failing transaction");
                    let mut failed = txn.clone();
                    failed.status = TransactionStatus::Failed;
                    failed.failure_reason = Some(e.to_string());
                    failed.updated_at = Utc::now();
                    self.close(&failed)?;
                    let result = SettleResult::Rejected {
                        status: TransactionStatus::Failed,
                        reason: e.to_string(),
                    };
                    return Ok((failed, result));
                }
                Err(e) => return Err(e),
            }
        }

        Ok((next, SettleResult::Committed {
            status: TransactionStatus::Success,
        }))
    }

    /// Journal a non-successful terminal state, releasing a payout's open
    /// hold in the same journal write.
    fn close(&self, next: &Transaction) -> Result<(), SettlementError> {
        if next.kind != TxnKind::Payout || !self.ledger.has_open_hold(&next.initiator, &next.id)? {
            return self.record(Some(next), &[]);
        }
        let total = next
            .total_debit()
            .ok_or_else(|| CoreError::Overflow(format!("payout {} plus charge", next.amount)))?;
        self.post_and_record(
            Some(next),
            next.id,
            &[Posting::new(next.initiator.clone(), EntryKind::Release, total)],
        )?;
        Ok(())
    }

    /// Cancel every PENDING transaction older than the configured timeout,
    /// through the same guard as any other settlement.
    pub fn cancel_expired(&self, now: DateTime<Utc>) -> Vec<TransactionId> {
        let timeout = self.config.pending_timeout();
        let mut cancelled = Vec::new();
        for txn in self.book.pending() {
            if now - txn.created_at < timeout {
                continue;
            }
            match self.settle(txn.id, Outcome::Cancelled) {
                Ok(SettleResult::Committed { .. }) => cancelled.push(txn.id),
                Ok(_) => {}
                Err(e) => tracing::warn!(txn_id = %txn.id, error = %e, "timeout cancellation failed"),
            }
        }
        if !cancelled.is_empty() {
            tracing::info!(count = cancelled.len(), "cancelled expired transactions");
        }
        cancelled
    }

    pub fn transaction(&self, id: &TransactionId) -> Result<Transaction, SettlementError> {
        self.book.get(id)
    }

    pub fn pending_transactions(&self) -> Vec<Transaction> {
        self.book.pending()
    }

    pub fn transactions(&self) -> Vec<Transaction> {
        self.book.all()
    }

    // ---- wallets ----

    pub fn wallet_balance(&self, node: &NodeId) -> Result<WalletBalance, SettlementError> {
        Ok(self.ledger.balance(node)?)
    }

    pub fn ledger_entries(&self, node: &NodeId) -> Vec<LedgerEntry> {
        self.ledger.entries(node)
    }

    fn post_admin(&self, reference: TransactionId, postings: &[Posting]) -> Result<ApplyOutcome, SettlementError> {
        for p in postings {
            self.directory.node(&p.node_id)?;
        }
        let applied = self.post_and_record(None, reference, postings)?;
        tracing::info!(
            reference = %reference,
            postings = postings.len(),
            duplicate = applied.is_duplicate(),
            "wallet adjustment applied"
        );
        Ok(applied)
    }

    /// Manual top-up. `reference` makes retries idempotent.
    pub fn credit_wallet(&self, reference: TransactionId, node: &NodeId, amount: Amount) -> Result<ApplyOutcome, SettlementError> {
        self.post_admin(reference, &[Posting::new(node.clone(), EntryKind::Credit, amount)])
    }

    /// Manual deduction. Fails closed when the wallet lacks free funds.
    pub fn debit_wallet(&self, reference: TransactionId, node: &NodeId, amount: Amount) -> Result<ApplyOutcome, SettlementError> {
        self.post_admin(reference, &[Posting::new(node.clone(), EntryKind::Debit, amount)])
    }

    pub fn transfer(
        &self,
        reference: TransactionId,
        from: &NodeId,
        to: &NodeId,
        amount: Amount,
    ) -> Result<ApplyOutcome, SettlementError> {
        if from == to {
            return Err(CoreError::InvalidAmount(format!("transfer from {from} to itself")).into());
        }
        self.post_admin(
            reference,
            &[
                Posting::new(from.clone(), EntryKind::TransferOut, amount),
                Posting::new(to.clone(), EntryKind::TransferIn, amount),
            ],
        )
    }

    // ---- restore ----

    /// Load journaled transactions and ledger entries.
    pub fn restore(
        &self,
        transactions: impl IntoIterator<Item = Transaction>,
        entries: impl IntoIterator<Item = LedgerEntry>,
    ) -> Result<(usize, usize), SettlementError> {
        let txns = self.book.restore(transactions);
        let entries = self.ledger.restore(entries)?;
        tracing::info!(transactions = txns, entries, "engine state restored");
        Ok((txns, entries))
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            transactions: self.book.len(),
            pending: self.book.pending().len(),
            wallets: self.ledger.wallet_count(),
            ledger_entries: self.ledger.entry_count(),
        }
    }
}
