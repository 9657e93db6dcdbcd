use tierpay_core::{Amount, CoreError, GatewayId, NodeId, TransactionId};
use tierpay_pricing::PricingError;

use crate::types::EntryKind;

/// Reasons the wallet ledger rejects a posting batch. A rejected batch leaves
/// every wallet untouched.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LedgerError {
    #[error("insufficient balance for {node}: available {available}, required {required}")]
    InsufficientBalance {
        node: NodeId,
        available: Amount,
        required: Amount,
    },

    #[error("no open hold for {node} on transaction {transaction}")]
    HoldNotFound {
        node: NodeId,
        transaction: TransactionId,
    },

    #[error("hold of {held} for {node} does not match posting of {amount}")]
    HoldMismatch {
        node: NodeId,
        held: Amount,
        amount: Amount,
    },

    #[error("posting batch is empty")]
    EmptyBatch,

    #[error("zero-amount {kind} posting for {node}")]
    ZeroAmount { node: NodeId, kind: EntryKind },

    #[error("balance overflow for {0}")]
    Overflow(NodeId),

    #[error("hash chain broken for {node} at entry {entry}")]
    ChainBroken { node: NodeId, entry: uuid::Uuid },

    #[error("wallet lock poisoned")]
    LockPoisoned,
}

/// Settlement-layer errors.
#[derive(Debug, thiserror::Error)]
pub enum SettlementError {
    #[error(transparent)]
    Pricing(#[from] PricingError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("transaction not found: {0}")]
    TransactionNotFound(TransactionId),

    #[error("transaction already exists: {0}")]
    AlreadyExists(TransactionId),

    #[error("no status source registered for gateway {0}")]
    SourceNotFound(GatewayId),

    #[error("status source error: {0}")]
    Source(String),

    #[error("invalid pricing snapshot: {0}")]
    InvalidSnapshot(String),

    #[error("journal error: {0}")]
    Journal(String),

    #[error("transaction lock poisoned")]
    LockPoisoned,
}
