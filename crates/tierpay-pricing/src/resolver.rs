use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tierpay_core::{Amount, ChannelId, GatewayId, NodeId, PlanId, Rate, Role, TxnKind};

use crate::directory::DirectoryState;
use crate::error::PricingError;
use crate::hierarchy::HierarchyNode;
use crate::model::PaymentChannel;
use crate::payout::{PayoutChargeConfig, PayoutScope};

/// Where a resolved rate came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum RateSource {
    Override { assigned_by: NodeId },
    Plan { plan_id: PlanId },
    /// The channel's own cost: the root tier, or a tier with nothing configured.
    BaseCost,
}

/// The single rate that applies to a node on a channel right now.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectiveRate {
    pub node_id: NodeId,
    pub rate: Rate,
    /// The channel the rate was found on; differs from the requested one on fallback.
    pub channel_id: ChannelId,
    pub source: RateSource,
    pub via_fallback: bool,
}

impl EffectiveRate {
    fn base_cost(node: &HierarchyNode, channel: &PaymentChannel) -> Self {
        Self {
            node_id: node.id.clone(),
            rate: channel.base_cost,
            channel_id: channel.id.clone(),
            source: RateSource::BaseCost,
            via_fallback: false,
        }
    }
}

/// What a tier is charged and why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "basis", rename_all = "snake_case")]
pub enum CostBasis {
    Rate {
        rate: Rate,
        channel_id: ChannelId,
        source: RateSource,
        via_fallback: bool,
    },
    Payout {
        scope: PayoutScope,
        config: PayoutChargeConfig,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierCost {
    pub node_id: NodeId,
    pub role: Role,
    pub basis: CostBasis,
    /// The amount this tier is charged on the transaction, already rounded.
    pub cost: Amount,
}

/// Every tier's charge for one transaction, frozen at creation time.
///
/// `tiers[0]` is the initiator and `tiers.last()` the root. Costs never
/// increase towards the root, so each tier's margin is non-negative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingQuote {
    pub kind: TxnKind,
    pub amount: Amount,
    #[serde(default)]
    pub channel_id: Option<ChannelId>,
    pub gateway_id: GatewayId,
    /// Charge billed to the initiator.
    pub billed: Amount,
    /// The root tier's cost: the aggregator's own cost of the transaction.
    pub base_portion: Amount,
    pub tiers: Vec<TierCost>,
    #[serde(default)]
    pub routing_version: Option<u32>,
    pub quoted_at: DateTime<Utc>,
}

impl PricingQuote {
    /// `None` only for a malformed snapshot with no tiers.
    pub fn initiator(&self) -> Option<&NodeId> {
        self.tiers.first().map(|t| &t.node_id)
    }
}

/// Read-only view over a directory state that answers pricing questions.
pub struct RateResolver<'a> {
    state: &'a DirectoryState,
}

impl<'a> RateResolver<'a> {
    pub fn new(state: &'a DirectoryState) -> Self {
        Self { state }
    }

    /// Resolve the rate charged to `node` on `channel`.
    ///
    /// Precedence: enabled override on the channel, enabled plan rate on the
    /// channel, then the same two on the gateway's fallback channel of the same
    /// kind. The root tier is always charged the channel base cost.
    pub fn resolve(
        &self,
        node: &NodeId,
        channel: &ChannelId,
        kind: TxnKind,
    ) -> Result<EffectiveRate, PricingError> {
        let node = self.state.hierarchy().require(node)?;
        if !node.is_active() {
            return Err(PricingError::NodeSuspended(node.id.clone()));
        }
        let channel = self.usable_channel(channel, kind)?;
        self.resolve_node(node, channel)
    }

    fn usable_channel(&self, id: &ChannelId, kind: TxnKind) -> Result<&'a PaymentChannel, PricingError> {
        let channel = self.state.require_channel(id)?;
        if !channel.active {
            return Err(PricingError::ChannelInactive(id.clone()));
        }
        if channel.kind != kind {
            return Err(PricingError::KindMismatch {
                channel: id.clone(),
                expected: kind,
                actual: channel.kind,
            });
        }
        Ok(channel)
    }

    fn resolve_node(
        &self,
        node: &HierarchyNode,
        channel: &PaymentChannel,
    ) -> Result<EffectiveRate, PricingError> {
        if node.is_root() {
            return Ok(EffectiveRate::base_cost(node, channel));
        }

        if let Some((rate, source)) = self.lookup(node, &channel.id) {
            return Ok(EffectiveRate {
                node_id: node.id.clone(),
                rate,
                channel_id: channel.id.clone(),
                source,
                via_fallback: false,
            });
        }

        if let Some(fallback) = self.state.default_channel(&channel.gateway_id, channel.kind) {
            if fallback.id != channel.id && fallback.active {
                if let Some((rate, source)) = self.lookup(node, &fallback.id) {
                    tracing::debug!(
                        node = %node.id,
                        channel = %channel.id,
                        fallback = %fallback.id,
                        "rate resolved on gateway fallback channel"
                    );
                    return Ok(EffectiveRate {
                        node_id: node.id.clone(),
                        rate,
                        channel_id: fallback.id.clone(),
                        source,
                        via_fallback: true,
                    });
                }
            }
        }

        Err(PricingError::RateNotConfigured {
            node: node.id.clone(),
            channel: channel.id.clone(),
        })
    }

    fn lookup(&self, node: &HierarchyNode, channel: &ChannelId) -> Option<(Rate, RateSource)> {
        if let Some(o) = self.state.node_override(&node.id, channel).filter(|o| o.enabled) {
            return Some((
                o.rate,
                RateSource::Override {
                    assigned_by: o.assigned_by.clone(),
                },
            ));
        }
        let plan = self.state.plan_for(node)?;
        self.state
            .plan_rate(&plan.id, channel)
            .filter(|r| r.enabled)
            .map(|r| {
                (
                    r.rate,
                    RateSource::Plan {
                        plan_id: plan.id.clone(),
                    },
                )
            })
    }

    /// What `node` is charged on `channel`. A tier with no rate of its own is
    /// charged the channel base cost.
    pub fn effective_cost(&self, node: &NodeId, channel: &ChannelId) -> Result<EffectiveRate, PricingError> {
        let node = self.state.hierarchy().require(node)?;
        let channel = self.state.require_channel(channel)?;
        self.cost_of(node, channel)
    }

    fn cost_of(&self, node: &HierarchyNode, channel: &PaymentChannel) -> Result<EffectiveRate, PricingError> {
        match self.resolve_node(node, channel) {
            Err(PricingError::RateNotConfigured { .. }) => Ok(EffectiveRate::base_cost(node, channel)),
            // A fallback rate never prices a tier below the exact channel's cost.
            Ok(rate) if rate.via_fallback && rate.rate < channel.base_cost => {
                Ok(EffectiveRate::base_cost(node, channel))
            }
            other => other,
        }
    }

    /// The lowest rate `assigner` may hand down on `channel`: its own cost,
    /// and never less than the channel base cost.
    pub fn rate_floor(&self, assigner: &NodeId, channel: &ChannelId) -> Result<Rate, PricingError> {
        let base_cost = self.state.channel_base_cost(channel)?;
        Ok(self.effective_cost(assigner, channel)?.rate.max(base_cost))
    }

    /// The lowest rate `assigner` may set for `target`: the highest cost among
    /// the tiers from the target's parent up to the assigner, so no tier in
    /// between is pushed to a negative margin.
    ///
    /// The root is always charged the exact channel's base cost, so that is the
    /// starting floor even when the tiers above only hold a rate on the
    /// gateway fallback channel.
    pub fn assignment_floor(
        &self,
        assigner: &NodeId,
        target: &NodeId,
        channel: &ChannelId,
    ) -> Result<Rate, PricingError> {
        let hierarchy = self.state.hierarchy();
        if !hierarchy.is_descendant(assigner, target)? {
            return Err(PricingError::NotDescendant {
                ancestor: assigner.clone(),
                node: target.clone(),
            });
        }
        let channel = self.state.require_channel(channel)?;

        let mut floor = channel.base_cost;
        for tier in hierarchy.ancestors(target)?.into_iter().skip(1) {
            floor = floor.max(self.cost_of(tier, channel)?.rate);
            if &tier.id == assigner {
                break;
            }
        }
        Ok(floor)
    }

    /// The payout charge config `node` is billed under on `gateway`.
    pub fn effective_payout_config(
        &self,
        node: &NodeId,
        gateway: &GatewayId,
    ) -> Result<(PayoutScope, &'a PayoutChargeConfig), PricingError> {
        let node = self.state.hierarchy().require(node)?;
        self.payout_config_of(node, gateway)
    }

    fn payout_config_of(
        &self,
        node: &HierarchyNode,
        gateway: &GatewayId,
    ) -> Result<(PayoutScope, &'a PayoutChargeConfig), PricingError> {
        let state = self.state;
        let lookup = |scope: PayoutScope| {
            state
                .payout_config(&scope, gateway)
                .map(|record| (scope, &record.config))
        };
        let not_configured = || PricingError::PayoutChargeNotConfigured {
            node: node.id.clone(),
            gateway: gateway.clone(),
        };

        if node.is_root() {
            return lookup(PayoutScope::Gateway).ok_or_else(not_configured);
        }
        if let Some(found) = lookup(PayoutScope::Node(node.id.clone())) {
            return Ok(found);
        }
        state
            .plan_for(node)
            .and_then(|plan| lookup(PayoutScope::Plan(plan.id.clone())))
            .ok_or_else(not_configured)
    }

    /// Like `payout_config_of`, but a tier with nothing configured is charged
    /// what the gateway charges the root.
    fn payout_cost_of(
        &self,
        node: &HierarchyNode,
        gateway: &GatewayId,
    ) -> Result<(PayoutScope, &'a PayoutChargeConfig), PricingError> {
        match self.payout_config_of(node, gateway) {
            Err(PricingError::PayoutChargeNotConfigured { .. }) if !node.is_root() => {
                let root = self.state.hierarchy().root_of(&node.id)?;
                self.payout_config_of(root, gateway)
            }
            other => other,
        }
    }

    /// The configs a new payout config written by `assigner` at `scope` must
    /// charge at least as much as, each with the tier it belongs to.
    pub fn payout_floor(
        &self,
        assigner: &NodeId,
        scope: &PayoutScope,
        gateway: &GatewayId,
    ) -> Result<Vec<(NodeId, &'a PayoutChargeConfig)>, PricingError> {
        let hierarchy = self.state.hierarchy();
        match scope {
            PayoutScope::Gateway => Ok(Vec::new()),
            PayoutScope::Plan(_) => {
                let root = hierarchy.root_of(assigner)?;
                let (_, config) = self.payout_config_of(root, gateway)?;
                Ok(vec![(root.id.clone(), config)])
            }
            PayoutScope::Node(target) => {
                if !hierarchy.is_descendant(assigner, target)? {
                    return Err(PricingError::NotDescendant {
                        ancestor: assigner.clone(),
                        node: target.clone(),
                    });
                }
                let mut floors = Vec::new();
                for tier in hierarchy.ancestors(target)?.into_iter().skip(1) {
                    let (_, config) = self.payout_cost_of(tier, gateway)?;
                    floors.push((tier.id.clone(), config));
                    if &tier.id == assigner {
                        break;
                    }
                }
                Ok(floors)
            }
        }
    }

    /// Price a payin for every tier from the initiator to the root.
    pub fn quote_payin(
        &self,
        initiator: &NodeId,
        channel: &ChannelId,
        amount: Amount,
        at: DateTime<Utc>,
    ) -> Result<PricingQuote, PricingError> {
        let billed = self.resolve(initiator, channel, TxnKind::Payin)?;
        let channel = self.state.require_channel(channel)?;
        let chain = self.state.hierarchy().ancestors(initiator)?;

        let mut tiers: Vec<TierCost> = Vec::with_capacity(chain.len());
        let mut prev: Option<(&NodeId, Rate)> = None;
        for tier in chain {
            let cost = if tiers.is_empty() {
                billed.clone()
            } else {
                self.cost_of(tier, channel)?
            };

            if let Some((below, below_rate)) = prev {
                if below_rate < cost.rate {
                    tracing::warn!(
                        node = %below,
                        parent = %tier.id,
                        channel = %channel.id,
                        "tier would operate at a negative margin"
                    );
                    return Err(PricingError::RateBelowFloor {
                        node: below.clone(),
                        channel: channel.id.clone(),
                        rate: below_rate,
                        floor: cost.rate,
                    });
                }
            }
            prev = Some((&tier.id, cost.rate));

            tiers.push(TierCost {
                node_id: tier.id.clone(),
                role: tier.role,
                cost: cost.rate.apply(amount),
                basis: CostBasis::Rate {
                    rate: cost.rate,
                    channel_id: cost.channel_id,
                    source: cost.source,
                    via_fallback: cost.via_fallback,
                },
            });
        }

        Ok(Self::finish_quote(
            TxnKind::Payin,
            amount,
            Some(channel.id.clone()),
            channel.gateway_id.clone(),
            tiers,
            None,
            at,
        ))
    }

    /// Price a payout for every tier from the initiator to the root.
    ///
    /// Without an explicit gateway the routing version active at `at` is used.
    pub fn quote_payout(
        &self,
        initiator: &NodeId,
        gateway: Option<&GatewayId>,
        amount: Amount,
        at: DateTime<Utc>,
    ) -> Result<PricingQuote, PricingError> {
        let node = self.state.hierarchy().require(initiator)?;
        if !node.is_active() {
            return Err(PricingError::NodeSuspended(initiator.clone()));
        }

        let (gateway, routing_version) = match gateway {
            Some(gateway) => (gateway.clone(), None),
            None => {
                let active = self.state.payout_routing().active_at(at).ok_or_else(|| {
                    PricingError::InvalidConfig("no payout gateway is active".into())
                })?;
                (active.gateway_id.clone(), Some(active.version))
            }
        };
        let channel = self
            .state
            .default_channel(&gateway, TxnKind::Payout)
            .map(|c| c.id.clone());

        let chain = self.state.hierarchy().ancestors(initiator)?;
        let mut tiers: Vec<TierCost> = Vec::with_capacity(chain.len());
        for tier in chain {
            let (scope, config) = if tiers.is_empty() {
                self.payout_config_of(tier, &gateway)?
            } else {
                self.payout_cost_of(tier, &gateway)?
            };
            let cost = config.charge_for(amount)?;

            if let Some(below) = tiers.last() {
                if below.cost < cost {
                    tracing::warn!(
                        node = %below.node_id,
                        parent = %tier.id,
                        gateway = %gateway,
                        amount = amount.value(),
                        "tier payout charge undercuts its parent"
                    );
                    return Err(PricingError::PayoutChargeBelowFloor {
                        node: below.node_id.clone(),
                        gateway: gateway.clone(),
                        amount,
                        charge: below.cost,
                        floor: cost,
                    });
                }
            }

            tiers.push(TierCost {
                node_id: tier.id.clone(),
                role: tier.role,
                cost,
                basis: CostBasis::Payout {
                    scope,
                    config: config.clone(),
                },
            });
        }

        Ok(Self::finish_quote(
            TxnKind::Payout,
            amount,
            channel,
            gateway,
            tiers,
            routing_version,
            at,
        ))
    }

    fn finish_quote(
        kind: TxnKind,
        amount: Amount,
        channel_id: Option<ChannelId>,
        gateway_id: GatewayId,
        tiers: Vec<TierCost>,
        routing_version: Option<u32>,
        quoted_at: DateTime<Utc>,
    ) -> PricingQuote {
        let billed = tiers.first().map_or(Amount::ZERO, |t| t.cost);
        let base_portion = tiers.last().map_or(Amount::ZERO, |t| t.cost);
        PricingQuote {
            kind,
            amount,
            channel_id,
            gateway_id,
            billed,
            base_portion,
            tiers,
            routing_version,
            quoted_at,
        }
    }
}
