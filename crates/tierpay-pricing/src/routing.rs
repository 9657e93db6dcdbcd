use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tierpay_core::GatewayId;

use crate::error::PricingError;

/// One published choice of payout gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayoutRoutingVersion {
    pub version: u32,
    pub gateway_id: GatewayId,
    pub effective_from: DateTime<Utc>,
}

/// Versioned "active payout gateway" record.
///
/// Versions are only ever appended. Payouts read the version active at their
/// creation time and keep its number in their snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PayoutRoutingConfig {
    versions: Vec<PayoutRoutingVersion>,
}

impl PayoutRoutingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(
        &mut self,
        gateway_id: GatewayId,
        effective_from: DateTime<Utc>,
    ) -> Result<&PayoutRoutingVersion, PricingError> {
        if let Some(latest) = self.versions.last() {
            if effective_from < latest.effective_from {
                return Err(PricingError::InvalidConfig(format!(
                    "payout routing version cannot take effect at {effective_from}, before version {} ({})",
                    latest.version, latest.effective_from
                )));
            }
        }

        let version = self.versions.last().map_or(1, |v| v.version + 1);
        tracing::info!(version, gateway = %gateway_id, %effective_from, "published payout routing");
        self.versions.push(PayoutRoutingVersion {
            version,
            gateway_id,
            effective_from,
        });
        Ok(&self.versions[self.versions.len() - 1])
    }

    /// The latest version already in effect at `at`.
    pub fn active_at(&self, at: DateTime<Utc>) -> Option<&PayoutRoutingVersion> {
        self.versions.iter().rev().find(|v| v.effective_from <= at)
    }

    pub fn versions(&self) -> &[PayoutRoutingVersion] {
        &self.versions
    }
}
