use chrono::Utc;
use tierpay_core::{CardNetwork, CardType, ChannelCategory, NodeId, Rate, Role, TxnKind};

use crate::hierarchy::HierarchyNode;
use crate::model::{PaymentChannel, RatePlan};
use crate::payout::{PayoutChargeConfig, PayoutChargeRecord, PayoutScope, PayoutSlab};
use crate::RateDirectory;

pub(crate) fn pct(s: &str) -> Rate {
    Rate::parse_percent(s).unwrap()
}

fn node(id: &str, role: Role, parent: Option<&str>) -> HierarchyNode {
    HierarchyNode::new(id, role, parent.map(NodeId::from))
}

/// platform → wl → md → {ret, dist → ret2}, gold as the default plan,
/// UPI at 1.5% base cost and a slab payout table on gateway `pg`.
pub(crate) fn directory_fixture() -> RateDirectory {
    let dir = RateDirectory::new();

    for channel in [
        PaymentChannel::new("upi", "pg", TxnKind::Payin, ChannelCategory::Upi, pct("1.5")),
        PaymentChannel::new("card", "pg", TxnKind::Payin, ChannelCategory::Card, pct("1.8")).as_default(),
        PaymentChannel::new("visa-corp", "pg", TxnKind::Payin, ChannelCategory::Card, pct("2.0"))
            .with_card(CardNetwork::Visa, CardType::Corporate),
        PaymentChannel::new("imps", "pg", TxnKind::Payout, ChannelCategory::Imps, Rate::ZERO).as_default(),
        PaymentChannel::new("netbanking", "pg2", TxnKind::Payin, ChannelCategory::Netbanking, pct("1.2")),
    ] {
        dir.register_channel(channel).unwrap();
    }

    dir.register_plan(RatePlan {
        id: "gold".into(),
        code: "GOLD".into(),
        applicable_roles: vec![
            Role::WhiteLabel,
            Role::MasterDistributor,
            Role::Distributor,
            Role::Retailer,
        ],
        is_default: true,
    })
    .unwrap();
    dir.register_plan(RatePlan {
        id: "platinum".into(),
        code: "PLATINUM".into(),
        applicable_roles: vec![Role::MasterDistributor],
        is_default: false,
    })
    .unwrap();
    dir.set_plan_rate(&"gold".into(), &"upi".into(), pct("1.65"), true).unwrap();
    dir.set_plan_rate(&"gold".into(), &"card".into(), pct("2.1"), true).unwrap();
    dir.set_plan_rate(&"platinum".into(), &"upi".into(), pct("1.7"), true).unwrap();

    for n in [
        node("platform", Role::Platform, None),
        node("wl", Role::WhiteLabel, Some("platform")),
        node("md", Role::MasterDistributor, Some("wl")),
        node("ret", Role::Retailer, Some("md")),
        node("dist", Role::Distributor, Some("md")),
        node("ret2", Role::Retailer, Some("dist")),
    ] {
        dir.register_node(n).unwrap();
    }

    dir.upsert_payout_config(
        &"platform".into(),
        PayoutScope::Gateway,
        &"pg".into(),
        PayoutChargeConfig::Slab {
            slabs: vec![
                PayoutSlab::bounded(0, 5_000_000, 500),
                PayoutSlab::bounded(5_000_001, 10_000_000, 1_000),
                PayoutSlab::unbounded(10_000_001, 1_500),
            ],
        },
    )
    .unwrap();
    dir.restore_payout_config(PayoutChargeRecord {
        scope: PayoutScope::Plan("gold".into()),
        gateway_id: "pg".into(),
        config: PayoutChargeConfig::Slab {
            slabs: vec![
                PayoutSlab::bounded(0, 5_000_000, 1_000),
                PayoutSlab::bounded(5_000_001, 10_000_000, 1_500),
                PayoutSlab::unbounded(10_000_001, 2_000),
            ],
        },
        assigned_by: Some("platform".into()),
        updated_at: Utc::now(),
    })
    .unwrap();

    dir
}
