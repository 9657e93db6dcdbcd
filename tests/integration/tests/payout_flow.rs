//! Integration test: payout charges, holds and settlement across the
//! pricing and settlement crates.

use tierpay_core::{Amount, Outcome, TransactionId, TransactionStatus};
use tierpay_integration_tests::seeded_engine;
use tierpay_pricing::{PayoutChargeConfig, PayoutScope, PayoutSlab, PricingError};
use tierpay_settlement::{EntryKind, LedgerError, SettlementEngine, SettlementError};

fn gold_like(low: u64, mid: u64, high: u64) -> PayoutChargeConfig {
    PayoutChargeConfig::Slab {
        slabs: vec![
            PayoutSlab::bounded(0, 5_000_000, low),
            PayoutSlab::bounded(5_000_001, 10_000_000, mid),
            PayoutSlab::unbounded(10_000_001, high),
        ],
    }
}

fn fund(engine: &SettlementEngine, node: &str, rupees: u64) {
    engine
        .credit_wallet(TransactionId::new(), &node.into(), Amount::from_major(rupees))
        .unwrap();
}

#[test]
fn test_slab_charge_for_worked_amount() {
    let engine = seeded_engine();
    let charge = engine
        .payout_charge(&gold_like(1_000, 1_500, 2_000), Amount::from_major(75_000))
        .unwrap();
    assert_eq!(charge, Amount::from_major(15));
    assert_eq!(
        Amount::from_major(75_000).checked_add(charge),
        Some(Amount::from_major(75_015))
    );
}

#[test]
fn test_payout_holds_then_debits_and_pays_commission() {
    let engine = seeded_engine();
    fund(&engine, "ret", 100_000);

    let txn = engine
        .create_payout(&"ret".into(), Some(&"pg".into()), Amount::from_major(75_000))
        .unwrap();
    assert_eq!(txn.charge(), Amount::from_major(15));

    let held = engine.wallet_balance(&"ret".into()).unwrap();
    assert_eq!(held.balance, Amount::from_major(100_000));
    assert_eq!(held.hold_balance, Amount::from_major(75_015));
    assert_eq!(held.available, Amount::from_major(24_985));

    engine.settle(txn.id, Outcome::Success).unwrap();

    let after = engine.wallet_balance(&"ret".into()).unwrap();
    assert_eq!(after.balance, Amount::from_major(24_985));
    assert_eq!(after.hold_balance, Amount::ZERO);
    // Every reseller tier sits on the gold slabs; only the platform earns.
    assert_eq!(
        engine.wallet_balance(&"platform".into()).unwrap().balance,
        Amount::new(500)
    );
    for node in ["dist", "md", "wl"] {
        assert!(engine.ledger_entries(&node.into()).is_empty(), "{node} should earn nothing");
    }

    let kinds: Vec<EntryKind> = engine
        .ledger_entries(&"ret".into())
        .iter()
        .map(|e| e.kind)
        .collect();
    assert_eq!(kinds, vec![EntryKind::Credit, EntryKind::Hold, EntryKind::Debit]);
}

#[test]
fn test_node_scope_charge_earns_for_its_assigner() {
    let engine = seeded_engine();
    engine
        .assign_payout_config(
            &"md".into(),
            PayoutScope::Node("ret2".into()),
            &"pg".into(),
            gold_like(1_200, 1_800, 2_500),
        )
        .unwrap();
    fund(&engine, "ret2", 100_000);

    let txn = engine
        .create_payout(&"ret2".into(), Some(&"pg".into()), Amount::from_major(75_000))
        .unwrap();
    assert_eq!(txn.charge(), Amount::new(1_800));
    engine.settle(txn.id, Outcome::Success).unwrap();

    assert_eq!(engine.wallet_balance(&"md".into()).unwrap().balance, Amount::new(300));
    assert_eq!(engine.wallet_balance(&"wl".into()).unwrap().balance, Amount::ZERO);
    assert_eq!(
        engine.wallet_balance(&"platform".into()).unwrap().balance,
        Amount::new(500)
    );
}

#[test]
fn test_node_scope_charge_below_floor_is_rejected() {
    let engine = seeded_engine();
    let flat = PayoutChargeConfig::Slab {
        slabs: vec![PayoutSlab::unbounded(0, 1_400)],
    };
    let err = engine
        .assign_payout_config(&"md".into(), PayoutScope::Node("ret2".into()), &"pg".into(), flat)
        .unwrap_err();
    match err {
        SettlementError::Pricing(PricingError::PayoutChargeBelowFloor { charge, floor, .. }) => {
            assert_eq!(charge, Amount::new(1_400));
            assert!(floor > charge);
        }
        other => panic!("unexpected error: {other:?}"),
    }

    // Nothing was stored: ret2 is still billed the plan charge.
    fund(&engine, "ret2", 1_000);
    let txn = engine
        .create_payout(&"ret2".into(), Some(&"pg".into()), Amount::from_major(100))
        .unwrap();
    assert_eq!(txn.charge(), Amount::new(1_000));
}

#[test]
fn test_plan_scope_requires_root() {
    let engine = seeded_engine();
    let err = engine
        .assign_payout_config(
            &"md".into(),
            PayoutScope::Plan("gold".into()),
            &"pg".into(),
            gold_like(5_000, 5_000, 5_000),
        )
        .unwrap_err();
    assert!(matches!(err, SettlementError::Pricing(PricingError::Forbidden(_))));
}

#[test]
fn test_failed_payout_releases_hold() {
    let engine = seeded_engine();
    fund(&engine, "ret", 1_000);

    let txn = engine
        .create_payout(&"ret".into(), Some(&"pg".into()), Amount::from_major(500))
        .unwrap();
    assert_eq!(
        engine.wallet_balance(&"ret".into()).unwrap().available,
        Amount::new(100_000 - 50_000 - 1_000)
    );

    let result = engine.settle(txn.id, Outcome::Failed).unwrap();
    assert_eq!(result.status(), TransactionStatus::Failed);

    let balance = engine.wallet_balance(&"ret".into()).unwrap();
    assert_eq!(balance.balance, Amount::from_major(1_000));
    assert_eq!(balance.hold_balance, Amount::ZERO);
    assert_eq!(balance.available, Amount::from_major(1_000));
    assert!(engine.ledger_entries(&"platform".into()).is_empty());
}

#[test]
fn test_payout_without_funds_fails_at_creation() {
    let engine = seeded_engine();
    fund(&engine, "ret", 100);

    let err = engine
        .create_payout(&"ret".into(), Some(&"pg".into()), Amount::from_major(100))
        .unwrap_err();
    assert!(matches!(
        err,
        SettlementError::Ledger(LedgerError::InsufficientBalance { .. })
    ));

    let failed: Vec<_> = engine
        .transactions()
        .into_iter()
        .filter(|t| t.status == TransactionStatus::Failed)
        .collect();
    assert_eq!(failed.len(), 1);
    assert!(failed[0].failure_reason.is_some());
    assert!(engine.pending_transactions().is_empty());

    let balance = engine.wallet_balance(&"ret".into()).unwrap();
    assert_eq!(balance.balance, Amount::from_major(100));
    assert_eq!(balance.hold_balance, Amount::ZERO);
}

#[test]
fn test_payout_uses_active_routing_when_no_gateway_given() {
    let engine = seeded_engine();
    fund(&engine, "ret", 1_000);

    let txn = engine
        .create_payout(&"ret".into(), None, Amount::from_major(100))
        .unwrap();
    assert_eq!(txn.gateway_id.as_str(), "pg");
    assert_eq!(txn.quote.routing_version, Some(1));
    assert_eq!(txn.channel_id.as_ref().map(|c| c.as_str()), Some("imps"));
}

#[test]
fn test_payout_charge_frozen_after_reconfiguration() {
    let engine = seeded_engine();
    fund(&engine, "ret2", 1_000);
    let txn = engine
        .create_payout(&"ret2".into(), Some(&"pg".into()), Amount::from_major(100))
        .unwrap();

    engine
        .assign_payout_config(
            &"md".into(),
            PayoutScope::Node("ret2".into()),
            &"pg".into(),
            gold_like(3_000, 3_000, 3_000),
        )
        .unwrap();
    engine.settle(txn.id, Outcome::Success).unwrap();

    // The snapshot charge of 10 rupees applies, not the new 30.
    assert_eq!(
        engine.wallet_balance(&"ret2".into()).unwrap().balance,
        Amount::from_major(1_000 - 100 - 10)
    );
    assert!(engine.ledger_entries(&"md".into()).is_empty());
}
