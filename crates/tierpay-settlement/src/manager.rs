use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tierpay_core::{GatewayId, TransactionId};

use crate::engine::SettlementEngine;
use crate::error::SettlementError;
use crate::traits::GatewayStatusSource;
use crate::types::SettleResult;

/// What one polling pass did.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PollReport {
    pub settled: Vec<TransactionId>,
    pub cancelled: Vec<TransactionId>,
    pub errors: usize,
}

/// Registry of per-gateway status sources, polled for PENDING transactions
/// when the platform runs without gateway webhooks.
pub struct StatusSourceManager {
    sources: HashMap<GatewayId, Box<dyn GatewayStatusSource>>,
}

impl StatusSourceManager {
    pub fn new() -> Self {
        Self {
            sources: HashMap::new(),
        }
    }

    /// Register a status source, keyed by its `gateway_id()`.
    pub fn register_source(&mut self, source: Box<dyn GatewayStatusSource>) {
        let gateway = source.gateway_id().clone();
        tracing::info!(gateway = %gateway, "registering gateway status source");
        self.sources.insert(gateway, source);
    }

    pub fn unregister_source(&mut self, gateway: &GatewayId) -> Option<Box<dyn GatewayStatusSource>> {
        self.sources.remove(gateway)
    }

    pub fn get_source(&self, gateway: &GatewayId) -> Result<&dyn GatewayStatusSource, SettlementError> {
        self.sources
            .get(gateway)
            .map(|s| s.as_ref())
            .ok_or_else(|| SettlementError::SourceNotFound(gateway.clone()))
    }

    pub fn gateway_ids(&self) -> Vec<GatewayId> {
        self.sources.keys().cloned().collect()
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Ask each PENDING transaction's gateway for an outcome and settle the
    /// ones that have one, then apply the pending timeout.
    ///
    /// Transactions on gateways without a registered source are left alone.
    /// They can still be settled by the timeout or by an explicit call.
    pub async fn poll_once(&self, engine: &SettlementEngine, now: DateTime<Utc>) -> PollReport {
        let mut report = PollReport::default();

        for txn in engine.pending_transactions() {
            let Some(source) = self.sources.get(&txn.gateway_id) else {
                continue;
            };
            let outcome = match source.fetch_outcome(&txn).await {
                Ok(Some(outcome)) => outcome,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(txn_id = %txn.id, gateway = %txn.gateway_id, error = %e, "status fetch failed");
                    report.errors += 1;
                    continue;
                }
            };
            match engine.settle(txn.id, outcome) {
                Ok(SettleResult::AlreadyTerminal { .. }) => {}
                Ok(_) => report.settled.push(txn.id),
                Err(e) => {
                    tracing::warn!(txn_id = %txn.id, error = %e, "polled settlement failed");
                    report.errors += 1;
                }
            }
        }

        report.cancelled = engine.cancel_expired(now);
        tracing::debug!(
            settled = report.settled.len(),
            cancelled = report.cancelled.len(),
            errors = report.errors,
            "status poll complete"
        );
        report
    }
}

impl Default for StatusSourceManager {
    fn default() -> Self {
        Self::new()
    }
}
