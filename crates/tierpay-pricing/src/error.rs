use tierpay_core::{Amount, ChannelId, CoreError, GatewayId, NodeId, PlanId, Rate, Role, TxnKind};

/// Errors raised while configuring or resolving prices.
///
/// Everything here is a configuration error: it is reported at assignment time
/// or at transaction creation, before any funds move.
#[derive(Debug, thiserror::Error)]
pub enum PricingError {
    #[error("no rate configured for node {node} on channel {channel}")]
    RateNotConfigured { node: NodeId, channel: ChannelId },

    #[error("rate {rate} for node {node} on channel {channel} is below the floor {floor}")]
    RateBelowFloor {
        node: NodeId,
        channel: ChannelId,
        rate: Rate,
        floor: Rate,
    },

    #[error("plan {plan} rate {rate} on channel {channel} is below the channel base cost {base_cost}")]
    PlanRateBelowCost {
        plan: PlanId,
        channel: ChannelId,
        rate: Rate,
        base_cost: Rate,
    },

    #[error("payout charge for {node} on gateway {gateway} undercuts its floor at amount {amount}: {charge} < {floor}")]
    PayoutChargeBelowFloor {
        node: NodeId,
        gateway: GatewayId,
        amount: Amount,
        charge: Amount,
        floor: Amount,
    },

    #[error("payout slab configuration has a gap: {0}")]
    SlabGapError(String),

    #[error("invalid payout slab configuration: {0}")]
    InvalidSlab(String),

    #[error("no payout charge configured for node {node} on gateway {gateway}")]
    PayoutChargeNotConfigured { node: NodeId, gateway: GatewayId },

    #[error("hierarchy violation: {0}")]
    HierarchyViolation(String),

    #[error("{node} is not a descendant of {ancestor}")]
    NotDescendant { ancestor: NodeId, node: NodeId },

    #[error("unknown node: {0}")]
    UnknownNode(NodeId),

    #[error("unknown channel: {0}")]
    UnknownChannel(ChannelId),

    #[error("unknown plan: {0}")]
    UnknownPlan(PlanId),

    #[error("node already registered: {0}")]
    DuplicateNode(NodeId),

    #[error("channel already registered: {0}")]
    DuplicateChannel(ChannelId),

    #[error("plan already registered: {0}")]
    DuplicatePlan(PlanId),

    #[error("a default plan already covers roles of {plan} (existing default: {existing})")]
    DuplicateDefaultPlan { plan: PlanId, existing: PlanId },

    #[error("plan {plan} does not apply to role {role}")]
    PlanNotApplicable { plan: PlanId, role: Role },

    #[error("node is suspended: {0}")]
    NodeSuspended(NodeId),

    #[error("channel is inactive: {0}")]
    ChannelInactive(ChannelId),

    #[error("channel {channel} carries {actual} traffic, not {expected}")]
    KindMismatch {
        channel: ChannelId,
        expected: TxnKind,
        actual: TxnKind,
    },

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("directory lock poisoned")]
    LockPoisoned,

    #[error(transparent)]
    Core(#[from] CoreError),
}
