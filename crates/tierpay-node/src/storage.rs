//! RocksDB storage backend for the Tierpay node.
//!
//! Doubles as the engine's journal: every transaction update with its ledger
//! entries, every override and every payout config is written here as JSON
//! before the engine publishes it, and read back on start.

use anyhow::Result;
use rocksdb::{ColumnFamilyDescriptor, IteratorMode, Options, WriteBatch, DB};
use serde::de::DeserializeOwned;
use std::path::Path;

use tierpay_pricing::{NodeChannelOverride, PayoutChargeRecord};
use tierpay_settlement::{Journal, LedgerEntry, SettlementError, Transaction};

/// Column family names for different data types.
const CF_TRANSACTIONS: &str = "transactions";
const CF_LEDGER: &str = "ledger";
const CF_OVERRIDES: &str = "overrides";
const CF_PAYOUT_CONFIGS: &str = "payout_configs";
const CF_STATE: &str = "state";

/// RocksDB-backed storage for the Tierpay node.
pub struct Storage {
    db: DB,
}

impl Storage {
    /// Open or create a RocksDB database at the given path with column families.
    pub fn open(path: &Path) -> Result<Self> {
        std::fs::create_dir_all(path)?;

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_TRANSACTIONS, Options::default()),
            ColumnFamilyDescriptor::new(CF_LEDGER, Options::default()),
            ColumnFamilyDescriptor::new(CF_OVERRIDES, Options::default()),
            ColumnFamilyDescriptor::new(CF_PAYOUT_CONFIGS, Options::default()),
            ColumnFamilyDescriptor::new(CF_STATE, Options::default()),
        ];

        let db = DB::open_cf_descriptors(&opts, path, cf_descriptors)?;

        Ok(Self { db })
    }

    /// Put a value into a column family.
    pub fn put(&self, cf_name: &str, key: &[u8], value: &[u8]) -> Result<()> {
        let cf = self
            .db
            .cf_handle(cf_name)
            .ok_or_else(|| anyhow::anyhow!("column family '{}' not found", cf_name))?;
        self.db.put_cf(&cf, key, value)?;
        Ok(())
    }

    /// Get a value from a column family.
    pub fn get(&self, cf_name: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let cf = self
            .db
            .cf_handle(cf_name)
            .ok_or_else(|| anyhow::anyhow!("column family '{}' not found", cf_name))?;
        let value = self.db.get_cf(&cf, key)?;
        Ok(value)
    }

    /// Every value of a column family in key order, decoded from JSON.
    fn load_all<T: DeserializeOwned>(&self, cf_name: &str) -> Result<Vec<T>> {
        let cf = self
            .db
            .cf_handle(cf_name)
            .ok_or_else(|| anyhow::anyhow!("column family '{}' not found", cf_name))?;
        let mut values = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (_, value) = item?;
            values.push(serde_json::from_slice(&value)?);
        }
        Ok(values)
    }

    pub fn load_transactions(&self) -> Result<Vec<Transaction>> {
        self.load_all(CF_TRANSACTIONS)
    }

    /// Write a transaction row and its ledger entries in one batch. Entry
    /// keys are the entries' UUIDv7 ids, so key order is commit order.
    pub fn put_commit(&self, txn: Option<&Transaction>, entries: &[LedgerEntry]) -> Result<()> {
        let cf_ledger = self
            .db
            .cf_handle(CF_LEDGER)
            .ok_or_else(|| anyhow::anyhow!("column family '{}' not found", CF_LEDGER))?;
        let cf_txns = self
            .db
            .cf_handle(CF_TRANSACTIONS)
            .ok_or_else(|| anyhow::anyhow!("column family '{}' not found", CF_TRANSACTIONS))?;
        let mut batch = WriteBatch::default();
        if let Some(txn) = txn {
            batch.put_cf(&cf_txns, txn.id.as_uuid().as_bytes(), serde_json::to_vec(txn)?);
        }
        for entry in entries {
            batch.put_cf(&cf_ledger, entry.id.as_bytes(), serde_json::to_vec(entry)?);
        }
        self.db.write(batch)?;
        Ok(())
    }

    pub fn load_entries(&self) -> Result<Vec<LedgerEntry>> {
        self.load_all(CF_LEDGER)
    }

    pub fn put_override(&self, entry: &NodeChannelOverride) -> Result<()> {
        let key = format!("{}/{}", entry.node_id, entry.channel_id);
        self.put(CF_OVERRIDES, key.as_bytes(), &serde_json::to_vec(entry)?)
    }

    pub fn load_overrides(&self) -> Result<Vec<NodeChannelOverride>> {
        self.load_all(CF_OVERRIDES)
    }

    pub fn put_payout_config(&self, record: &PayoutChargeRecord) -> Result<()> {
        let key = format!("{}/{}", record.scope, record.gateway_id);
        self.put(CF_PAYOUT_CONFIGS, key.as_bytes(), &serde_json::to_vec(record)?)
    }

    pub fn load_payout_configs(&self) -> Result<Vec<PayoutChargeRecord>> {
        self.load_all(CF_PAYOUT_CONFIGS)
    }

    /// Store node state.
    pub fn put_state(&self, key: &str, data: &[u8]) -> Result<()> {
        self.put(CF_STATE, key.as_bytes(), data)
    }

    /// Get node state.
    pub fn get_state(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.get(CF_STATE, key.as_bytes())
    }
}

fn journal_error(e: anyhow::Error) -> SettlementError {
    SettlementError::Journal(e.to_string())
}

impl Journal for Storage {
    fn commit(&self, txn: Option<&Transaction>, entries: &[LedgerEntry]) -> Result<(), SettlementError> {
        self.put_commit(txn, entries).map_err(journal_error)
    }

    fn override_assigned(&self, entry: &NodeChannelOverride) -> Result<(), SettlementError> {
        self.put_override(entry).map_err(journal_error)
    }

    fn payout_config_assigned(&self, record: &PayoutChargeRecord) -> Result<(), SettlementError> {
        self.put_payout_config(record).map_err(journal_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Arc;
    use tierpay_core::{Amount, ChannelCategory, EngineConfig, Outcome, Rate, Role, TransactionId, TxnKind};
    use tierpay_pricing::{HierarchyNode, PaymentChannel, RateDirectory};
    use tierpay_settlement::SettlementEngine;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("tierpay-test-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn directory() -> Arc<RateDirectory> {
        let dir = RateDirectory::new();
        dir.register_channel(
            PaymentChannel::new("upi", "pg", TxnKind::Payin, ChannelCategory::Upi, Rate::parse_percent("1.5").unwrap())
                .as_default(),
        )
        .unwrap();
        dir.register_node(HierarchyNode::new("platform", Role::Platform, None)).unwrap();
        dir.register_node(HierarchyNode::new("ret", Role::Retailer, Some("platform".into())))
            .unwrap();
        Arc::new(dir)
    }

    #[test]
    fn test_open_storage() {
        let dir = temp_dir();
        let storage = Storage::open(&dir);
        assert!(storage.is_ok());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_put_get_state() {
        let dir = temp_dir();
        let storage = Storage::open(&dir).unwrap();

        storage.put_state("last_start", b"2026-01-01T00:00:00Z").unwrap();
        let result = storage.get_state("last_start").unwrap();
        assert_eq!(result, Some(b"2026-01-01T00:00:00Z".to_vec()));
        assert!(storage.get_state("missing").unwrap().is_none());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_commit_writes_transaction_with_its_entries() {
        let dir = temp_dir();
        let storage = Arc::new(Storage::open(&dir).unwrap());
        let engine = SettlementEngine::with_journal(directory(), EngineConfig::default(), storage.clone());
        engine
            .assign_rate(&"platform".into(), &"ret".into(), &"upi".into(), Rate::parse_percent("2").unwrap())
            .unwrap();
        engine
            .credit_wallet(TransactionId::new(), &"ret".into(), Amount::from_major(100))
            .unwrap();
        let txn = engine
            .create_payin(&"ret".into(), &"upi".into(), Amount::from_major(1_000))
            .unwrap();
        assert_eq!(storage.load_transactions().unwrap().len(), 1);
        assert_eq!(storage.load_entries().unwrap().len(), 1);

        engine.settle(txn.id, Outcome::Success).unwrap();
        let txns = storage.load_transactions().unwrap();
        assert_eq!(txns.len(), 1);
        assert_eq!(txns[0].status, tierpay_core::TransactionStatus::Success);
        let settled: Vec<_> = storage
            .load_entries()
            .unwrap()
            .into_iter()
            .filter(|e| e.transaction_id == txn.id)
            .collect();
        assert_eq!(settled.len(), engine.stats().ledger_entries - 1);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_journal_survives_reopen() {
        let dir = temp_dir();
        let (txn_id, balance) = {
            let storage = Arc::new(Storage::open(&dir).unwrap());
            let engine = SettlementEngine::with_journal(directory(), EngineConfig::default(), storage);
            engine
                .assign_rate(&"platform".into(), &"ret".into(), &"upi".into(), Rate::parse_percent("2").unwrap())
                .unwrap();
            let txn = engine
                .create_payin(&"ret".into(), &"upi".into(), Amount::from_major(1_000))
                .unwrap();
            engine.settle(txn.id, Outcome::Success).unwrap();
            engine
                .credit_wallet(TransactionId::new(), &"ret".into(), Amount::from_major(5))
                .unwrap();
            (txn.id, engine.wallet_balance(&"ret".into()).unwrap())
        };

        let storage = Storage::open(&dir).unwrap();
        let overrides = storage.load_overrides().unwrap();
        assert_eq!(overrides.len(), 1);

        let restored = SettlementEngine::new(directory(), EngineConfig::default());
        restored
            .restore(storage.load_transactions().unwrap(), storage.load_entries().unwrap())
            .unwrap();
        assert_eq!(restored.wallet_balance(&"ret".into()).unwrap(), balance);
        assert_eq!(
            restored.transaction(&txn_id).unwrap().status,
            tierpay_core::TransactionStatus::Success
        );
        restored.ledger().verify_chain(&"ret".into()).unwrap();

        std::fs::remove_dir_all(&dir).ok();
    }
}
