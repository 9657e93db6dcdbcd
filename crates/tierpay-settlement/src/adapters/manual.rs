use async_trait::async_trait;
use dashmap::DashMap;
use tierpay_core::{GatewayId, Outcome, TransactionId};

use crate::error::SettlementError;
use crate::traits::GatewayStatusSource;
use crate::types::Transaction;

/// Status source fed by hand: an operator, a test, or an upstream process
/// records outcomes and the poller picks them up.
pub struct ManualStatusSource {
    gateway_id: GatewayId,
    outcomes: DashMap<TransactionId, Outcome>,
}

impl ManualStatusSource {
    pub fn new(gateway_id: impl Into<GatewayId>) -> Self {
        Self {
            gateway_id: gateway_id.into(),
            outcomes: DashMap::new(),
        }
    }

    /// Record what the gateway reported for a transaction.
    pub fn report(&self, txn: TransactionId, outcome: Outcome) {
        tracing::debug!(gateway = %self.gateway_id, txn_id = %txn, %outcome, "outcome reported");
        self.outcomes.insert(txn, outcome);
    }

    pub fn reported(&self) -> usize {
        self.outcomes.len()
    }
}

#[async_trait]
impl GatewayStatusSource for ManualStatusSource {
    fn gateway_id(&self) -> &GatewayId {
        &self.gateway_id
    }

    async fn fetch_outcome(&self, txn: &Transaction) -> Result<Option<Outcome>, SettlementError> {
        Ok(self.outcomes.get(&txn.id).map(|o| *o.value()))
    }
}
