use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tierpay_core::{ChannelId, GatewayId, NodeId, PlanId, Rate};

use crate::directory::RateDirectory;
use crate::error::PricingError;
use crate::hierarchy::HierarchyNode;
use crate::model::{PaymentChannel, PlanChannelRate, RatePlan};
use crate::payout::{PayoutChargeConfig, PayoutScope};

/// Bootstrap description of a directory, loaded from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DirectorySeed {
    #[serde(default)]
    pub channels: Vec<PaymentChannel>,
    #[serde(default)]
    pub plans: Vec<RatePlan>,
    #[serde(default)]
    pub plan_rates: Vec<PlanChannelRate>,
    #[serde(default)]
    pub nodes: Vec<HierarchyNode>,
    #[serde(default)]
    pub overrides: Vec<SeedOverride>,
    #[serde(default)]
    pub payout_configs: Vec<SeedPayoutConfig>,
    #[serde(default)]
    pub payout_routing: Vec<SeedRouting>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedOverride {
    pub assigner: NodeId,
    pub node: NodeId,
    pub channel: ChannelId,
    pub rate: Rate,
}

/// A payout config entry. With neither `plan` nor `node` set it is the
/// gateway's own cost.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedPayoutConfig {
    pub assigner: NodeId,
    pub gateway: GatewayId,
    #[serde(default)]
    pub plan: Option<PlanId>,
    #[serde(default)]
    pub node: Option<NodeId>,
    pub config: PayoutChargeConfig,
}

impl SeedPayoutConfig {
    pub fn scope(&self) -> Result<PayoutScope, PricingError> {
        match (&self.plan, &self.node) {
            (None, None) => Ok(PayoutScope::Gateway),
            (Some(plan), None) => Ok(PayoutScope::Plan(plan.clone())),
            (None, Some(node)) => Ok(PayoutScope::Node(node.clone())),
            (Some(_), Some(_)) => Err(PricingError::InvalidConfig(format!(
                "payout config on gateway {} names both a plan and a node",
                self.gateway
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedRouting {
    pub gateway: GatewayId,
    pub effective_from: DateTime<Utc>,
}

impl DirectorySeed {
    pub fn from_toml(content: &str) -> Result<Self, PricingError> {
        toml::from_str(content).map_err(|e| PricingError::InvalidConfig(format!("seed: {e}")))
    }

    pub fn load(path: &Path) -> Result<Self, PricingError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            PricingError::InvalidConfig(format!("reading seed {}: {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    /// Apply every entry through the directory's validated write paths.
    ///
    /// Entries are ordered so that everything a write depends on exists first:
    /// channels and plans, then nodes from the root down, then rates, then
    /// payout configs from the gateway cost down.
    pub fn apply(&self, directory: &RateDirectory) -> Result<(), PricingError> {
        for channel in &self.channels {
            directory.register_channel(channel.clone())?;
        }
        for plan in &self.plans {
            directory.register_plan(plan.clone())?;
        }

        let mut nodes: Vec<&HierarchyNode> = self.nodes.iter().collect();
        nodes.sort_by_key(|n| n.role.rank());
        for node in nodes {
            directory.register_node(node.clone())?;
        }

        for rate in &self.plan_rates {
            directory.set_plan_rate(&rate.plan_id, &rate.channel_id, rate.rate, rate.enabled)?;
        }

        let mut overrides = Vec::with_capacity(self.overrides.len());
        for entry in &self.overrides {
            overrides.push((directory.node(&entry.node)?.role.rank(), entry));
        }
        overrides.sort_by_key(|(rank, _)| *rank);
        for (_, entry) in overrides {
            directory.upsert_override(&entry.assigner, &entry.node, &entry.channel, entry.rate)?;
        }

        let mut payouts = Vec::with_capacity(self.payout_configs.len());
        for entry in &self.payout_configs {
            let scope = entry.scope()?;
            let order = match &scope {
                PayoutScope::Gateway => 0,
                PayoutScope::Plan(_) => 1,
                PayoutScope::Node(node) => 2 + directory.node(node)?.role.rank(),
            };
            payouts.push((order, scope, entry));
        }
        payouts.sort_by_key(|(order, _, _)| *order);
        for (_, scope, entry) in payouts {
            directory.upsert_payout_config(&entry.assigner, scope, &entry.gateway, entry.config.clone())?;
        }

        for routing in &self.payout_routing {
            directory.publish_payout_routing(routing.gateway.clone(), routing.effective_from)?;
        }

        tracing::info!(
            channels = self.channels.len(),
            plans = self.plans.len(),
            nodes = self.nodes.len(),
            overrides = self.overrides.len(),
            payout_configs = self.payout_configs.len(),
            "directory seed applied"
        );
        Ok(())
    }
}
