use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tierpay_core::{Amount, ChannelId, GatewayId, NodeId, Role, TransactionId, TransactionStatus, TxnKind};
use tierpay_pricing::PricingQuote;
use uuid::Uuid;

use crate::error::SettlementError;

/// Kind of a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryKind {
    Credit,
    Debit,
    Hold,
    Release,
    TransferIn,
    TransferOut,
    Commission,
}

impl EntryKind {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Credit => "CREDIT",
            Self::Debit => "DEBIT",
            Self::Hold => "HOLD",
            Self::Release => "RELEASE",
            Self::TransferIn => "TRANSFER_IN",
            Self::TransferOut => "TRANSFER_OUT",
            Self::Commission => "COMMISSION",
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// One wallet movement requested of the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    pub node_id: NodeId,
    pub kind: EntryKind,
    pub amount: Amount,
}

impl Posting {
    pub fn new(node_id: NodeId, kind: EntryKind, amount: Amount) -> Self {
        Self {
            node_id,
            kind,
            amount,
        }
    }
}

/// Idempotency key: at most one entry per (transaction, kind, node).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntryKey {
    pub transaction_id: TransactionId,
    pub kind: EntryKind,
    pub node_id: NodeId,
}

/// An immutable, hash-chained ledger row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub node_id: NodeId,
    pub kind: EntryKind,
    pub amount: Amount,
    pub balance_after: Amount,
    pub hold_after: Amount,
    pub transaction_id: TransactionId,
    pub created_at: DateTime<Utc>,
    /// Hex BLAKE3 digest chained to the wallet's previous entry.
    pub hash: String,
}

impl LedgerEntry {
    pub fn key(&self) -> EntryKey {
        EntryKey {
            transaction_id: self.transaction_id,
            kind: self.kind,
            node_id: self.node_id.clone(),
        }
    }
}

/// Result of applying a posting batch.
#[derive(Debug, Clone, PartialEq)]
pub enum ApplyOutcome {
    Committed(Vec<LedgerEntry>),
    /// The batch was already applied; nothing changed.
    Duplicate,
}

impl ApplyOutcome {
    pub fn entries(&self) -> &[LedgerEntry] {
        match self {
            Self::Committed(entries) => entries,
            Self::Duplicate => &[],
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletBalance {
    pub balance: Amount,
    pub hold_balance: Amount,
    pub available: Amount,
}

/// Margin earned by one tier on one transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionShare {
    pub node_id: NodeId,
    pub role: Role,
    pub amount: Amount,
}

/// A payment moving through the engine, with its frozen pricing snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub kind: TxnKind,
    pub amount: Amount,
    pub initiator: NodeId,
    pub gateway_id: GatewayId,
    #[serde(default)]
    pub channel_id: Option<ChannelId>,
    pub status: TransactionStatus,
    /// Every tier's charge, captured at creation. Never recomputed.
    pub quote: PricingQuote,
    /// Filled in when the transaction settles successfully.
    #[serde(default)]
    pub commissions: Vec<CommissionShare>,
    #[serde(default)]
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    pub fn from_quote(quote: PricingQuote) -> Result<Self, SettlementError> {
        let initiator = quote
            .initiator()
            .cloned()
            .ok_or_else(|| SettlementError::InvalidSnapshot("pricing quote has no tiers".into()))?;
        let now = quote.quoted_at;
        Ok(Self {
            id: TransactionId::new(),
            kind: quote.kind,
            amount: quote.amount,
            initiator,
            gateway_id: quote.gateway_id.clone(),
            channel_id: quote.channel_id.clone(),
            status: TransactionStatus::Pending,
            quote,
            commissions: Vec::new(),
            failure_reason: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Charge billed to the initiator.
    pub fn charge(&self) -> Amount {
        self.quote.billed
    }

    /// What a payout takes from the initiator's wallet: amount plus charge.
    pub fn total_debit(&self) -> Option<Amount> {
        self.amount.checked_add(self.quote.billed)
    }
}

/// What a settle call did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum SettleResult {
    /// This call won the transition and applied its postings.
    Committed { status: TransactionStatus },
    /// Another caller already settled the transaction; nothing was done.
    AlreadyTerminal { status: TransactionStatus },
    /// The ledger rejected the postings and the transaction was failed.
    Rejected { status: TransactionStatus, reason: String },
}

impl SettleResult {
    pub fn status(&self) -> TransactionStatus {
        match self {
            Self::Committed { status }
            | Self::AlreadyTerminal { status }
            | Self::Rejected { status, .. } => *status,
        }
    }
}
