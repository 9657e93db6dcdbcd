//! Tierpay Settlement Layer
//!
//! Turns a verified settlement outcome into ledger postings: the commission
//! distributor splits each tier's margin, the wallet ledger applies postings
//! atomically and exactly once, and the engine guards every transaction's
//! single PENDING → terminal transition.

pub mod adapters;
pub mod distributor;
pub mod engine;
pub mod error;
pub mod journal;
pub mod ledger;
pub mod manager;
pub mod traits;
pub mod transactions;
pub mod types;

pub use distributor::CommissionDistributor;
pub use engine::{EngineStats, SettlementEngine};
pub use error::{LedgerError, SettlementError};
pub use journal::{Journal, MemoryJournal, NoopJournal};
pub use ledger::WalletLedger;
pub use manager::{PollReport, StatusSourceManager};
pub use traits::GatewayStatusSource;
pub use transactions::TransactionBook;
pub use types::{
    ApplyOutcome, CommissionShare, EntryKey, EntryKind, LedgerEntry, Posting, SettleResult,
    Transaction, WalletBalance,
};
