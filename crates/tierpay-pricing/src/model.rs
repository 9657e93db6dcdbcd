use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tierpay_core::{
    CardNetwork, CardType, ChannelCategory, ChannelId, GatewayId, NodeId, PlanId, Rate, Role,
    TxnKind,
};

use crate::error::PricingError;

/// A payment instrument or route within a gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentChannel {
    pub id: ChannelId,
    pub gateway_id: GatewayId,
    pub kind: TxnKind,
    pub category: ChannelCategory,
    #[serde(default)]
    pub card_network: Option<CardNetwork>,
    #[serde(default)]
    pub card_type: Option<CardType>,
    /// The aggregator's own cost for routing through this channel.
    pub base_cost: Rate,
    /// Catch-all fallback for the gateway and transaction kind.
    #[serde(default)]
    pub is_default: bool,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl PaymentChannel {
    pub fn new(
        id: impl Into<ChannelId>,
        gateway_id: impl Into<GatewayId>,
        kind: TxnKind,
        category: ChannelCategory,
        base_cost: Rate,
    ) -> Self {
        Self {
            id: id.into(),
            gateway_id: gateway_id.into(),
            kind,
            category,
            card_network: None,
            card_type: None,
            base_cost,
            is_default: false,
            active: true,
        }
    }

    pub fn with_card(mut self, network: CardNetwork, card_type: CardType) -> Self {
        self.card_network = Some(network);
        self.card_type = Some(card_type);
        self
    }

    pub fn as_default(mut self) -> Self {
        self.is_default = true;
        self
    }

    /// Whether the channel is discriminated by card network or card type.
    pub fn is_card_specific(&self) -> bool {
        self.card_network.is_some() || self.card_type.is_some()
    }

    pub fn validate(&self) -> Result<(), PricingError> {
        if self.is_card_specific() && self.category != ChannelCategory::Card {
            return Err(PricingError::InvalidConfig(format!(
                "channel {} has card discriminators but category {:?}",
                self.id, self.category
            )));
        }
        if self.is_default && self.is_card_specific() {
            return Err(PricingError::InvalidConfig(format!(
                "fallback channel {} cannot be card specific",
                self.id
            )));
        }
        Ok(())
    }
}

/// A rate plan ("schema") applied to every node on it without a personal override.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatePlan {
    pub id: PlanId,
    pub code: String,
    pub applicable_roles: Vec<Role>,
    #[serde(default)]
    pub is_default: bool,
}

impl RatePlan {
    pub fn applies_to(&self, role: Role) -> bool {
        self.applicable_roles.contains(&role)
    }

    pub fn shares_roles_with(&self, other: &RatePlan) -> bool {
        self.applicable_roles
            .iter()
            .any(|r| other.applicable_roles.contains(r))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanChannelRate {
    pub plan_id: PlanId,
    pub channel_id: ChannelId,
    pub rate: Rate,
    #[serde(default = "default_active")]
    pub enabled: bool,
}

/// A personal rate set for one node by one of its ancestors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeChannelOverride {
    pub node_id: NodeId,
    pub channel_id: ChannelId,
    pub rate: Rate,
    pub enabled: bool,
    pub assigned_by: NodeId,
    pub updated_at: DateTime<Utc>,
}

impl NodeChannelOverride {
    pub fn new(node_id: NodeId, channel_id: ChannelId, rate: Rate, assigned_by: NodeId) -> Self {
        Self {
            node_id,
            channel_id,
            rate,
            enabled: true,
            assigned_by,
            updated_at: Utc::now(),
        }
    }
}
