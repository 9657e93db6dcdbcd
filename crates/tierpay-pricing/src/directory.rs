use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use tierpay_core::{Amount, ChannelId, GatewayId, NodeId, NodeStatus, PlanId, Rate, TxnKind};

use crate::error::PricingError;
use crate::hierarchy::{HierarchyNode, HierarchyTable};
use crate::model::{NodeChannelOverride, PaymentChannel, PlanChannelRate, RatePlan};
use crate::payout::{PayoutChargeConfig, PayoutChargeRecord, PayoutScope};
use crate::resolver::{EffectiveRate, PricingQuote, RateResolver};
use crate::routing::{PayoutRoutingConfig, PayoutRoutingVersion};

/// Everything the directory stores, keyed the way it is queried.
#[derive(Debug, Clone, Default)]
pub struct DirectoryState {
    hierarchy: HierarchyTable,
    channels: HashMap<ChannelId, PaymentChannel>,
    plans: HashMap<PlanId, RatePlan>,
    plan_rates: HashMap<(PlanId, ChannelId), PlanChannelRate>,
    overrides: HashMap<(NodeId, ChannelId), NodeChannelOverride>,
    payout_configs: HashMap<(PayoutScope, GatewayId), PayoutChargeRecord>,
    payout_routing: PayoutRoutingConfig,
}

impl DirectoryState {
    pub fn hierarchy(&self) -> &HierarchyTable {
        &self.hierarchy
    }

    pub fn channel(&self, id: &ChannelId) -> Option<&PaymentChannel> {
        self.channels.get(id)
    }

    pub fn require_channel(&self, id: &ChannelId) -> Result<&PaymentChannel, PricingError> {
        self.channels
            .get(id)
            .ok_or_else(|| PricingError::UnknownChannel(id.clone()))
    }

    pub fn channel_base_cost(&self, id: &ChannelId) -> Result<Rate, PricingError> {
        Ok(self.require_channel(id)?.base_cost)
    }

    /// The gateway's catch-all channel for a transaction kind.
    pub fn default_channel(&self, gateway: &GatewayId, kind: TxnKind) -> Option<&PaymentChannel> {
        self.channels
            .values()
            .find(|c| c.is_default && c.kind == kind && &c.gateway_id == gateway)
    }

    pub fn plan(&self, id: &PlanId) -> Option<&RatePlan> {
        self.plans.get(id)
    }

    /// The node's explicit plan, or the default plan for its role.
    pub fn plan_for(&self, node: &HierarchyNode) -> Option<&RatePlan> {
        match &node.plan_id {
            Some(id) => self.plans.get(id),
            None => self
                .plans
                .values()
                .find(|p| p.is_default && p.applies_to(node.role)),
        }
    }

    pub fn plan_rate(&self, plan: &PlanId, channel: &ChannelId) -> Option<&PlanChannelRate> {
        self.plan_rates.get(&(plan.clone(), channel.clone()))
    }

    pub fn node_override(&self, node: &NodeId, channel: &ChannelId) -> Option<&NodeChannelOverride> {
        self.overrides.get(&(node.clone(), channel.clone()))
    }

    pub fn payout_config(&self, scope: &PayoutScope, gateway: &GatewayId) -> Option<&PayoutChargeRecord> {
        self.payout_configs.get(&(scope.clone(), gateway.clone()))
    }

    pub fn payout_routing(&self) -> &PayoutRoutingConfig {
        &self.payout_routing
    }

    pub fn overrides(&self) -> impl Iterator<Item = &NodeChannelOverride> {
        self.overrides.values()
    }

    pub fn payout_configs(&self) -> impl Iterator<Item = &PayoutChargeRecord> {
        self.payout_configs.values()
    }

    fn require_root(&self, node: &NodeId, action: &str) -> Result<(), PricingError> {
        if !self.hierarchy.require(node)?.is_root() {
            return Err(PricingError::Forbidden(format!(
                "only the platform root may {action}"
            )));
        }
        Ok(())
    }
}

/// Durable-in-memory store of rate assignments.
///
/// One `RwLock` guards the whole state. Floor-validated writes run their
/// validation and their insert under the same write guard, so two concurrent
/// assignments can never both pass against a stale floor.
#[derive(Debug, Default)]
pub struct RateDirectory {
    state: RwLock<DirectoryState>,
}

impl RateDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_state(state: DirectoryState) -> Self {
        Self {
            state: RwLock::new(state),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, DirectoryState>, PricingError> {
        self.state.read().map_err(|_| PricingError::LockPoisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, DirectoryState>, PricingError> {
        self.state.write().map_err(|_| PricingError::LockPoisoned)
    }

    /// Run `f` against a consistent snapshot of the directory.
    pub fn with_state<T>(&self, f: impl FnOnce(&DirectoryState) -> T) -> Result<T, PricingError> {
        let state = self.read()?;
        Ok(f(&state))
    }

    /// Run a resolver query under a single read guard.
    pub fn with_resolver<T>(
        &self,
        f: impl FnOnce(&RateResolver<'_>) -> Result<T, PricingError>,
    ) -> Result<T, PricingError> {
        let state = self.read()?;
        f(&RateResolver::new(&state))
    }

    // ---- queries ----

    pub fn resolve(&self, node: &NodeId, channel: &ChannelId, kind: TxnKind) -> Result<EffectiveRate, PricingError> {
        self.with_resolver(|r| r.resolve(node, channel, kind))
    }

    pub fn rate_floor(&self, assigner: &NodeId, channel: &ChannelId) -> Result<Rate, PricingError> {
        self.with_resolver(|r| r.rate_floor(assigner, channel))
    }

    pub fn channel_base_cost(&self, channel: &ChannelId) -> Result<Rate, PricingError> {
        self.read()?.channel_base_cost(channel)
    }

    pub fn plan_rate(&self, plan: &PlanId, channel: &ChannelId) -> Result<Option<PlanChannelRate>, PricingError> {
        Ok(self.read()?.plan_rate(plan, channel).cloned())
    }

    pub fn node_override(&self, node: &NodeId, channel: &ChannelId) -> Result<Option<NodeChannelOverride>, PricingError> {
        Ok(self.read()?.node_override(node, channel).cloned())
    }

    pub fn payout_config(&self, scope: &PayoutScope, gateway: &GatewayId) -> Result<Option<PayoutChargeRecord>, PricingError> {
        Ok(self.read()?.payout_config(scope, gateway).cloned())
    }

    pub fn node(&self, id: &NodeId) -> Result<HierarchyNode, PricingError> {
        Ok(self.read()?.hierarchy().require(id)?.clone())
    }

    pub fn quote_payin(
        &self,
        initiator: &NodeId,
        channel: &ChannelId,
        amount: Amount,
        at: DateTime<Utc>,
    ) -> Result<PricingQuote, PricingError> {
        self.with_resolver(|r| r.quote_payin(initiator, channel, amount, at))
    }

    pub fn quote_payout(
        &self,
        initiator: &NodeId,
        gateway: Option<&GatewayId>,
        amount: Amount,
        at: DateTime<Utc>,
    ) -> Result<PricingQuote, PricingError> {
        self.with_resolver(|r| r.quote_payout(initiator, gateway, amount, at))
    }

    // ---- hierarchy ----

    pub fn register_node(&self, node: HierarchyNode) -> Result<(), PricingError> {
        let mut state = self.write()?;
        if let Some(plan_id) = &node.plan_id {
            let plan = state
                .plans
                .get(plan_id)
                .ok_or_else(|| PricingError::UnknownPlan(plan_id.clone()))?;
            if !plan.applies_to(node.role) {
                return Err(PricingError::PlanNotApplicable {
                    plan: plan_id.clone(),
                    role: node.role,
                });
            }
        }
        state.hierarchy.register(node)
    }

    pub fn reparent(&self, node: &NodeId, new_parent: &NodeId) -> Result<(), PricingError> {
        self.write()?.hierarchy.reparent(node, new_parent)
    }

    pub fn set_node_status(&self, node: &NodeId, status: NodeStatus) -> Result<(), PricingError> {
        let mut state = self.write()?;
        state.hierarchy.get_mut(node)?.status = status;
        tracing::info!(node = %node, ?status, "node status changed");
        Ok(())
    }

    pub fn assign_plan(&self, node: &NodeId, plan: &PlanId) -> Result<(), PricingError> {
        let mut state = self.write()?;
        let role = state.hierarchy.require(node)?.role;
        let found = state
            .plans
            .get(plan)
            .ok_or_else(|| PricingError::UnknownPlan(plan.clone()))?;
        if !found.applies_to(role) {
            return Err(PricingError::PlanNotApplicable {
                plan: plan.clone(),
                role,
            });
        }
        state.hierarchy.get_mut(node)?.plan_id = Some(plan.clone());
        tracing::info!(node = %node, plan = %plan, "plan assigned");
        Ok(())
    }

    // ---- channels and plans ----

    pub fn register_channel(&self, channel: PaymentChannel) -> Result<(), PricingError> {
        channel.validate()?;
        let mut state = self.write()?;
        if state.channels.contains_key(&channel.id) {
            return Err(PricingError::DuplicateChannel(channel.id));
        }
        if channel.is_default {
            if let Some(existing) = state.default_channel(&channel.gateway_id, channel.kind) {
                return Err(PricingError::InvalidConfig(format!(
                    "gateway {} already has fallback {} channel {}",
                    channel.gateway_id, channel.kind, existing.id
                )));
            }
        }
        tracing::debug!(channel = %channel.id, gateway = %channel.gateway_id, "registered channel");
        state.channels.insert(channel.id.clone(), channel);
        Ok(())
    }

    pub fn set_channel_active(&self, channel: &ChannelId, active: bool) -> Result<(), PricingError> {
        let mut state = self.write()?;
        let found = state
            .channels
            .get_mut(channel)
            .ok_or_else(|| PricingError::UnknownChannel(channel.clone()))?;
        found.active = active;
        Ok(())
    }

    pub fn register_plan(&self, plan: RatePlan) -> Result<(), PricingError> {
        let mut state = self.write()?;
        if state.plans.contains_key(&plan.id) {
            return Err(PricingError::DuplicatePlan(plan.id));
        }
        if plan.is_default {
            if let Some(existing) = state
                .plans
                .values()
                .find(|p| p.is_default && p.shares_roles_with(&plan))
            {
                return Err(PricingError::DuplicateDefaultPlan {
                    plan: plan.id,
                    existing: existing.id.clone(),
                });
            }
        }
        state.plans.insert(plan.id.clone(), plan);
        Ok(())
    }

    /// Set a plan's rate on a channel. A plan may never charge below the
    /// channel's base cost.
    pub fn set_plan_rate(
        &self,
        plan: &PlanId,
        channel: &ChannelId,
        rate: Rate,
        enabled: bool,
    ) -> Result<(), PricingError> {
        let mut state = self.write()?;
        if !state.plans.contains_key(plan) {
            return Err(PricingError::UnknownPlan(plan.clone()));
        }
        let base_cost = state.channel_base_cost(channel)?;
        if rate < base_cost {
            return Err(PricingError::PlanRateBelowCost {
                plan: plan.clone(),
                channel: channel.clone(),
                rate,
                base_cost,
            });
        }
        state.plan_rates.insert(
            (plan.clone(), channel.clone()),
            PlanChannelRate {
                plan_id: plan.clone(),
                channel_id: channel.clone(),
                rate,
                enabled,
            },
        );
        Ok(())
    }

    // ---- overrides ----

    /// Assign a personal rate to `node`, written by its ancestor `assigner`.
    ///
    /// Rejected with `RateBelowFloor`, and nothing stored, when the rate is
    /// below what the assigner or any tier between them is charged.
    pub fn upsert_override(
        &self,
        assigner: &NodeId,
        node: &NodeId,
        channel: &ChannelId,
        rate: Rate,
    ) -> Result<NodeChannelOverride, PricingError> {
        self.upsert_override_with(assigner, node, channel, rate, |_| Ok::<(), PricingError>(()))
    }

    /// `upsert_override`, handing the accepted entry to `persist` under the
    /// write lock. The entry becomes visible only if `persist` succeeds.
    pub fn upsert_override_with<E>(
        &self,
        assigner: &NodeId,
        node: &NodeId,
        channel: &ChannelId,
        rate: Rate,
        persist: impl FnOnce(&NodeChannelOverride) -> Result<(), E>,
    ) -> Result<NodeChannelOverride, E>
    where
        E: From<PricingError>,
    {
        let mut state = self.write()?;
        let floor = RateResolver::new(&state).assignment_floor(assigner, node, channel)?;
        if rate < floor {
            tracing::warn!(
                assigner = %assigner,
                node = %node,
                channel = %channel,
                %rate,
                %floor,
                "rate assignment rejected below floor"
            );
            return Err(PricingError::RateBelowFloor {
                node: node.clone(),
                channel: channel.clone(),
                rate,
                floor,
            }
            .into());
        }

        let entry = NodeChannelOverride::new(node.clone(), channel.clone(), rate, assigner.clone());
        persist(&entry)?;
        state
            .overrides
            .insert((node.clone(), channel.clone()), entry.clone());
        tracing::info!(assigner = %assigner, node = %node, channel = %channel, %rate, "rate assigned");
        Ok(entry)
    }

    /// Enable or disable an existing override. Enabling re-checks the floor,
    /// since the assigner's own cost may have moved since it was written.
    pub fn set_override_enabled(
        &self,
        node: &NodeId,
        channel: &ChannelId,
        enabled: bool,
    ) -> Result<NodeChannelOverride, PricingError> {
        self.set_override_enabled_with(node, channel, enabled, |_| Ok::<(), PricingError>(()))
    }

    pub fn set_override_enabled_with<E>(
        &self,
        node: &NodeId,
        channel: &ChannelId,
        enabled: bool,
        persist: impl FnOnce(&NodeChannelOverride) -> Result<(), E>,
    ) -> Result<NodeChannelOverride, E>
    where
        E: From<PricingError>,
    {
        let mut state = self.write()?;
        let key = (node.clone(), channel.clone());
        let existing = state.overrides.get(&key).cloned().ok_or_else(|| {
            PricingError::RateNotConfigured {
                node: node.clone(),
                channel: channel.clone(),
            }
        })?;

        if enabled {
            let floor =
                RateResolver::new(&state).assignment_floor(&existing.assigned_by, node, channel)?;
            if existing.rate < floor {
                return Err(PricingError::RateBelowFloor {
                    node: node.clone(),
                    channel: channel.clone(),
                    rate: existing.rate,
                    floor,
                }
                .into());
            }
        }

        let updated = NodeChannelOverride {
            enabled,
            updated_at: Utc::now(),
            ..existing
        };
        persist(&updated)?;
        state.overrides.insert(key, updated.clone());
        Ok(updated)
    }

    /// Put back an override read from the journal without re-validating it.
    pub fn restore_override(&self, entry: NodeChannelOverride) -> Result<(), PricingError> {
        let mut state = self.write()?;
        state
            .overrides
            .insert((entry.node_id.clone(), entry.channel_id.clone()), entry);
        Ok(())
    }

    // ---- payout charges ----

    /// Store a payout charge config.
    ///
    /// Gateway and plan scopes belong to the platform root. A node-scope config
    /// must charge at least what every tier from the node's parent up to the
    /// assigner is charged, at every amount.
    pub fn upsert_payout_config(
        &self,
        assigner: &NodeId,
        scope: PayoutScope,
        gateway: &GatewayId,
        config: PayoutChargeConfig,
    ) -> Result<PayoutChargeRecord, PricingError> {
        self.upsert_payout_config_with(assigner, scope, gateway, config, |_| Ok::<(), PricingError>(()))
    }

    /// `upsert_payout_config`, handing the accepted record to `persist` under
    /// the write lock. The record becomes visible only if `persist` succeeds.
    pub fn upsert_payout_config_with<E>(
        &self,
        assigner: &NodeId,
        scope: PayoutScope,
        gateway: &GatewayId,
        config: PayoutChargeConfig,
        persist: impl FnOnce(&PayoutChargeRecord) -> Result<(), E>,
    ) -> Result<PayoutChargeRecord, E>
    where
        E: From<PricingError>,
    {
        config.validate()?;
        let mut state = self.write()?;

        match &scope {
            PayoutScope::Gateway => state.require_root(assigner, "set gateway payout costs")?,
            PayoutScope::Plan(plan) => {
                state.require_root(assigner, "set plan payout charges")?;
                if !state.plans.contains_key(plan) {
                    return Err(PricingError::UnknownPlan(plan.clone()).into());
                }
            }
            PayoutScope::Node(_) => {}
        }

        let floors = RateResolver::new(&state).payout_floor(assigner, &scope, gateway)?;
        for (tier, floor) in floors {
            if let Some(amount) = config.undercut_witness(floor)? {
                let charge = config.charge_for(amount)?;
                let floor_charge = floor.charge_for(amount)?;
                tracing::warn!(
                    assigner = %assigner,
                    %scope,
                    tier = %tier,
                    gateway = %gateway,
                    amount = amount.value(),
                    "payout charge rejected below floor"
                );
                let node = match &scope {
                    PayoutScope::Node(node) => node.clone(),
                    _ => assigner.clone(),
                };
                return Err(PricingError::PayoutChargeBelowFloor {
                    node,
                    gateway: gateway.clone(),
                    amount,
                    charge,
                    floor: floor_charge,
                }
                .into());
            }
        }

        let record = PayoutChargeRecord {
            scope: scope.clone(),
            gateway_id: gateway.clone(),
            config,
            assigned_by: Some(assigner.clone()),
            updated_at: Utc::now(),
        };
        persist(&record)?;
        state
            .payout_configs
            .insert((scope, gateway.clone()), record.clone());
        tracing::info!(assigner = %assigner, scope = %record.scope, gateway = %gateway, "payout charge assigned");
        Ok(record)
    }

    /// Put back a payout config read from the journal or a seed without
    /// floor validation. The slab shape is still checked.
    pub fn restore_payout_config(&self, record: PayoutChargeRecord) -> Result<(), PricingError> {
        record.config.validate()?;
        let mut state = self.write()?;
        state
            .payout_configs
            .insert((record.scope.clone(), record.gateway_id.clone()), record);
        Ok(())
    }

    // ---- payout routing ----

    pub fn publish_payout_routing(
        &self,
        gateway: GatewayId,
        effective_from: DateTime<Utc>,
    ) -> Result<PayoutRoutingVersion, PricingError> {
        let mut state = self.write()?;
        if state.default_channel(&gateway, TxnKind::Payout).is_none()
            && state.payout_config(&PayoutScope::Gateway, &gateway).is_none()
        {
            return Err(PricingError::InvalidConfig(format!(
                "gateway {gateway} has no payout channel or payout cost"
            )));
        }
        state
            .payout_routing
            .publish(gateway, effective_from)
            .cloned()
    }

    pub fn active_payout_routing(&self, at: DateTime<Utc>) -> Result<Option<PayoutRoutingVersion>, PricingError> {
        Ok(self.read()?.payout_routing().active_at(at).cloned())
    }

    // ---- listings ----

    pub fn overrides_for(&self, node: &NodeId) -> Result<Vec<NodeChannelOverride>, PricingError> {
        let state = self.read()?;
        let mut found: Vec<_> = state
            .overrides()
            .filter(|o| &o.node_id == node)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.channel_id.cmp(&b.channel_id));
        Ok(found)
    }

    pub fn channels(&self) -> Result<Vec<PaymentChannel>, PricingError> {
        let state = self.read()?;
        let mut channels: Vec<_> = state.channels.values().cloned().collect();
        channels.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(channels)
    }

    pub fn node_count(&self) -> Result<usize, PricingError> {
        Ok(self.read()?.hierarchy().len())
    }
}
