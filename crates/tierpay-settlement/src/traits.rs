use async_trait::async_trait;
use tierpay_core::{GatewayId, Outcome};

use crate::error::SettlementError;
use crate::types::Transaction;

/// A gateway that can be asked for a transaction's outcome.
///
/// Used in offline mode, when the gateway's webhooks are not relied on and
/// PENDING transactions are polled instead. Implementations only report what
/// the gateway says; settling is left to the engine.
#[async_trait]
pub trait GatewayStatusSource: Send + Sync {
    /// The gateway this source answers for.
    fn gateway_id(&self) -> &GatewayId;

    /// The terminal outcome the gateway reports, or `None` while it is still
    /// in flight.
    async fn fetch_outcome(&self, txn: &Transaction) -> Result<Option<Outcome>, SettlementError>;
}
