//! Integration test: pay-in pricing and commission distribution across the
//! pricing and settlement crates.

use proptest::prelude::*;
use tierpay_core::{Amount, ChannelCategory, Outcome, Rate, TransactionStatus, TxnKind};
use tierpay_integration_tests::{pct, seeded_engine};
use tierpay_pricing::{PaymentChannel, PricingError};
use tierpay_settlement::{CommissionDistributor, EntryKind, SettlementEngine, SettlementError};

fn balance(engine: &SettlementEngine, node: &str) -> Amount {
    engine.wallet_balance(&node.into()).unwrap().balance
}

fn commission_total(engine: &SettlementEngine, nodes: &[&str]) -> Amount {
    let paise = nodes
        .iter()
        .flat_map(|n| engine.ledger_entries(&(*n).into()))
        .filter(|e| e.kind == EntryKind::Commission)
        .map(|e| e.amount.value())
        .sum();
    Amount::new(paise)
}

// =========================================================================
// Worked example: UPI at 1.5 % base, Gold at 1.65 %, retailer at 2.0 %
// =========================================================================

#[test]
fn test_worked_example_split() {
    let engine = seeded_engine();
    engine
        .assign_rate(&"md".into(), &"ret2".into(), &"upi".into(), pct("2.0"))
        .unwrap();

    let txn = engine
        .create_payin(&"ret2".into(), &"upi".into(), Amount::from_major(10_000))
        .unwrap();
    assert_eq!(txn.quote.billed, Amount::from_major(200));
    assert_eq!(txn.quote.base_portion, Amount::from_major(150));

    engine.settle(txn.id, Outcome::Success).unwrap();

    assert_eq!(balance(&engine, "ret2"), Amount::from_major(9_800));
    assert_eq!(balance(&engine, "md"), Amount::from_major(35));
    // The white label sits on the same plan as md and earns nothing.
    assert_eq!(balance(&engine, "wl"), Amount::ZERO);
    assert!(engine.ledger_entries(&"wl".into()).is_empty());
    assert_eq!(balance(&engine, "platform"), Amount::from_major(15));

    let settled = engine.transaction(&txn.id).unwrap();
    let total = CommissionDistributor::total(&settled.commissions).unwrap();
    assert_eq!(total.checked_add(settled.quote.base_portion), Some(settled.quote.billed));
}

#[test]
fn test_five_tier_chain_telescopes() {
    let engine = seeded_engine();
    engine
        .assign_rate(&"wl".into(), &"md".into(), &"upi".into(), pct("1.8"))
        .unwrap();
    engine
        .assign_rate(&"md".into(), &"dist".into(), &"upi".into(), pct("1.9"))
        .unwrap();
    engine
        .assign_rate(&"md".into(), &"ret".into(), &"upi".into(), pct("2.2"))
        .unwrap();

    let txn = engine
        .create_payin(&"ret".into(), &"upi".into(), Amount::from_major(10_000))
        .unwrap();
    assert_eq!(txn.quote.tiers.len(), 5);
    engine.settle(txn.id, Outcome::Success).unwrap();

    assert_eq!(balance(&engine, "ret"), Amount::from_major(9_780));
    assert_eq!(balance(&engine, "dist"), Amount::from_major(30));
    assert_eq!(balance(&engine, "md"), Amount::from_major(10));
    assert_eq!(balance(&engine, "wl"), Amount::from_major(15));
    assert_eq!(balance(&engine, "platform"), Amount::from_major(15));
    assert_eq!(
        commission_total(&engine, &["dist", "md", "wl", "platform"]),
        Amount::from_major(70)
    );
}

// =========================================================================
// Floor invariant
// =========================================================================

#[test]
fn test_floor_rejects_and_leaves_directory_unchanged() {
    let engine = seeded_engine();
    let before = engine
        .resolve_effective_rate(&"ret2".into(), &"upi".into(), TxnKind::Payin)
        .unwrap();

    let err = engine
        .assign_rate(&"md".into(), &"ret2".into(), &"upi".into(), pct("1.6"))
        .unwrap_err();
    assert!(matches!(err, SettlementError::Pricing(PricingError::RateBelowFloor { .. })));

    let after = engine
        .resolve_effective_rate(&"ret2".into(), &"upi".into(), TxnKind::Payin)
        .unwrap();
    assert_eq!(before, after);
    assert_eq!(after.rate, pct("1.65"));
}

#[test]
fn test_floor_covers_intermediate_tiers() {
    let engine = seeded_engine();
    engine
        .assign_rate(&"md".into(), &"dist".into(), &"upi".into(), pct("1.9"))
        .unwrap();

    // md may not sell to ret below what dist, sitting between them, is charged.
    let err = engine
        .assign_rate(&"md".into(), &"ret".into(), &"upi".into(), pct("1.8"))
        .unwrap_err();
    assert!(matches!(err, SettlementError::Pricing(PricingError::RateBelowFloor { .. })));
    engine
        .assign_rate(&"md".into(), &"ret".into(), &"upi".into(), pct("1.9"))
        .unwrap();
}

#[test]
fn test_assignment_requires_descendant() {
    let engine = seeded_engine();
    let err = engine
        .assign_rate(&"dist".into(), &"ret2".into(), &"upi".into(), pct("3.0"))
        .unwrap_err();
    assert!(matches!(err, SettlementError::Pricing(PricingError::NotDescendant { .. })));
}

// =========================================================================
// Resolution fallbacks and configuration errors
// =========================================================================

#[test]
fn test_card_specific_channel_falls_back_to_gateway_default() {
    let engine = seeded_engine();
    let rate = engine
        .resolve_effective_rate(&"ret".into(), &"visa-corp".into(), TxnKind::Payin)
        .unwrap();
    assert_eq!(rate.rate, pct("2.1"));
    assert_eq!(rate.channel_id.as_str(), "card");
    assert!(rate.via_fallback);

    // An exact match wins over the fallback once it exists.
    engine
        .assign_rate(&"md".into(), &"ret".into(), &"visa-corp".into(), pct("2.4"))
        .unwrap();
    let rate = engine
        .resolve_effective_rate(&"ret".into(), &"visa-corp".into(), TxnKind::Payin)
        .unwrap();
    assert_eq!(rate.channel_id.as_str(), "visa-corp");
    assert!(!rate.via_fallback);
}

#[test]
fn test_unconfigured_rate_fails_before_funds_move() {
    let engine = seeded_engine();
    engine
        .directory()
        .register_channel(PaymentChannel::new(
            "nb",
            "pg2",
            TxnKind::Payin,
            ChannelCategory::Netbanking,
            pct("1.2"),
        ))
        .unwrap();

    let err = engine
        .create_payin(&"ret".into(), &"nb".into(), Amount::from_major(500))
        .unwrap_err();
    assert!(matches!(err, SettlementError::Pricing(PricingError::RateNotConfigured { .. })));
    assert_eq!(engine.stats().transactions, 0);
    assert_eq!(engine.stats().ledger_entries, 0);
}

#[test]
fn test_suspended_initiator_cannot_transact() {
    let engine = seeded_engine();
    engine
        .directory()
        .set_node_status(&"ret".into(), tierpay_core::NodeStatus::Suspended)
        .unwrap();
    let err = engine
        .create_payin(&"ret".into(), &"upi".into(), Amount::from_major(500))
        .unwrap_err();
    assert!(matches!(err, SettlementError::Pricing(PricingError::NodeSuspended(_))));
}

#[test]
fn test_failed_payin_moves_nothing() {
    let engine = seeded_engine();
    let txn = engine
        .create_payin(&"ret".into(), &"upi".into(), Amount::from_major(500))
        .unwrap();
    let result = engine.settle(txn.id, Outcome::Failed).unwrap();
    assert_eq!(result.status(), TransactionStatus::Failed);
    assert_eq!(engine.stats().ledger_entries, 0);
    assert!(engine.transaction(&txn.id).unwrap().commissions.is_empty());
}

// =========================================================================
// Conservation
// =========================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn property_commissions_conserve_billed_amount(
        amount in 1u64..10_000_000_000,
        md_markup in 0u32..20_000,
        dist_markup in 0u32..20_000,
        ret_markup in 0u32..20_000,
    ) {
        let engine = seeded_engine();
        let md_rate = Rate::from_ppm(16_500 + md_markup).unwrap();
        let dist_rate = Rate::from_ppm(md_rate.ppm() + dist_markup).unwrap();
        let ret_rate = Rate::from_ppm(dist_rate.ppm() + ret_markup).unwrap();
        engine.assign_rate(&"wl".into(), &"md".into(), &"upi".into(), md_rate).unwrap();
        engine.assign_rate(&"md".into(), &"dist".into(), &"upi".into(), dist_rate).unwrap();
        engine.assign_rate(&"dist".into(), &"ret".into(), &"upi".into(), ret_rate).unwrap();

        let amount = Amount::new(amount);
        let txn = engine.create_payin(&"ret".into(), &"upi".into(), amount).unwrap();
        engine.settle(txn.id, Outcome::Success).unwrap();

        let billed = txn.quote.billed;
        let earned = commission_total(&engine, &["dist", "md", "wl", "platform"]);
        prop_assert_eq!(earned.checked_add(txn.quote.base_portion), Some(billed));
        prop_assert_eq!(txn.quote.base_portion, pct("1.5").apply(amount));
        prop_assert_eq!(
            balance(&engine, "ret").checked_add(billed),
            Some(amount)
        );
    }
}
