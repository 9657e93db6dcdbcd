//! Integration test: exactly-once settlement and wallet safety under
//! concurrent callers, plus recovery from a journal.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use tierpay_core::{Amount, Outcome, TransactionId, TransactionStatus};
use tierpay_integration_tests::{journaled_engine, pct, seeded_directory, seeded_engine};
use tierpay_settlement::{MemoryJournal, SettleResult, SettlementEngine};

fn fund(engine: &SettlementEngine, node: &str, rupees: u64) {
    engine
        .credit_wallet(TransactionId::new(), &node.into(), Amount::from_major(rupees))
        .unwrap();
}

#[test]
fn test_racing_settlers_apply_once() {
    let engine = Arc::new(seeded_engine());
    engine
        .assign_rate(&"md".into(), &"ret2".into(), &"upi".into(), pct("2.0"))
        .unwrap();
    let txn = engine
        .create_payin(&"ret2".into(), &"upi".into(), Amount::from_major(10_000))
        .unwrap();

    let committed = Arc::new(AtomicUsize::new(0));
    let handles: Vec<_> = (0..16)
        .map(|i| {
            let engine = engine.clone();
            let committed = committed.clone();
            let outcome = if i % 2 == 0 { Outcome::Success } else { Outcome::Failed };
            thread::spawn(move || {
                if let SettleResult::Committed { .. } = engine.settle(txn.id, outcome).unwrap() {
                    committed.fetch_add(1, Ordering::SeqCst);
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(committed.load(Ordering::SeqCst), 1);
    let settled = engine.transaction(&txn.id).unwrap();
    match settled.status {
        TransactionStatus::Success => {
            assert_eq!(
                engine.wallet_balance(&"md".into()).unwrap().balance,
                Amount::from_major(35)
            );
            assert_eq!(engine.ledger_entries(&"ret2".into()).len(), 1);
        }
        TransactionStatus::Failed => assert_eq!(engine.stats().ledger_entries, 0),
        other => panic!("unexpected status {other}"),
    }
}

#[test]
fn test_concurrent_payouts_never_overdraw() {
    let engine = Arc::new(seeded_engine());
    // Each payout takes 90 + 10 rupees; only four fit.
    fund(&engine, "ret", 450);

    let handles: Vec<_> = (0..12)
        .map(|_| {
            let engine = engine.clone();
            thread::spawn(move || {
                engine
                    .create_payout(&"ret".into(), Some(&"pg".into()), Amount::from_major(90))
                    .is_ok()
            })
        })
        .collect();
    let created = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|ok| *ok)
        .count();
    assert_eq!(created, 4);

    let balance = engine.wallet_balance(&"ret".into()).unwrap();
    assert_eq!(balance.hold_balance, Amount::from_major(400));
    assert_eq!(balance.available, Amount::from_major(50));

    for txn in engine.pending_transactions() {
        engine.settle(txn.id, Outcome::Success).unwrap();
    }
    let balance = engine.wallet_balance(&"ret".into()).unwrap();
    assert_eq!(balance.balance, Amount::from_major(50));
    assert_eq!(balance.hold_balance, Amount::ZERO);
    assert_eq!(
        engine.wallet_balance(&"platform".into()).unwrap().balance,
        Amount::from_major(20)
    );
}

#[test]
fn test_concurrent_commissions_on_shared_wallet() {
    let engine = Arc::new(seeded_engine());
    engine
        .assign_rate(&"md".into(), &"ret2".into(), &"upi".into(), pct("2.0"))
        .unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let engine = engine.clone();
            thread::spawn(move || {
                for _ in 0..10 {
                    let txn = engine
                        .create_payin(&"ret2".into(), &"upi".into(), Amount::from_major(10_000))
                        .unwrap();
                    engine.settle(txn.id, Outcome::Success).unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(
        engine.wallet_balance(&"md".into()).unwrap().balance,
        Amount::from_major(80 * 35)
    );
    assert_eq!(
        engine.wallet_balance(&"platform".into()).unwrap().balance,
        Amount::from_major(80 * 15)
    );
    assert_eq!(engine.ledger_entries(&"md".into()).len(), 80);
    for node in ["md", "platform", "ret2"] {
        engine.ledger().verify_chain(&node.into()).unwrap();
    }
}

#[test]
fn test_redelivered_outcome_is_ignored() {
    let engine = seeded_engine();
    fund(&engine, "ret", 1_000);
    let txn = engine
        .create_payout(&"ret".into(), Some(&"pg".into()), Amount::from_major(100))
        .unwrap();

    assert_eq!(
        engine.settle(txn.id, Outcome::Success).unwrap(),
        SettleResult::Committed {
            status: TransactionStatus::Success
        }
    );
    let entries = engine.stats().ledger_entries;

    for outcome in [Outcome::Success, Outcome::Failed, Outcome::Cancelled] {
        assert_eq!(
            engine.settle(txn.id, outcome).unwrap(),
            SettleResult::AlreadyTerminal {
                status: TransactionStatus::Success
            }
        );
    }
    assert_eq!(engine.stats().ledger_entries, entries);
    assert_eq!(
        engine.wallet_balance(&"ret".into()).unwrap().balance,
        Amount::from_major(890)
    );
}

#[test]
fn test_restore_from_memory_journal() {
    let journal = Arc::new(MemoryJournal::new());
    let engine = journaled_engine(journal.clone());
    engine
        .assign_rate(&"md".into(), &"ret2".into(), &"upi".into(), pct("2.0"))
        .unwrap();
    let payin = engine
        .create_payin(&"ret2".into(), &"upi".into(), Amount::from_major(10_000))
        .unwrap();
    engine.settle(payin.id, Outcome::Success).unwrap();
    let payout = engine
        .create_payout(&"ret2".into(), Some(&"pg".into()), Amount::from_major(1_000))
        .unwrap();
    drop(engine);

    let directory = seeded_directory();
    for entry in journal.overrides() {
        directory.restore_override(entry).unwrap();
    }
    let restored = SettlementEngine::new(directory, Default::default());
    let (txns, _) = restored
        .restore(journal.transactions(), journal.entries())
        .unwrap();
    assert_eq!(txns, 2);

    let rate = restored
        .resolve_effective_rate(&"ret2".into(), &"upi".into(), tierpay_core::TxnKind::Payin)
        .unwrap();
    assert_eq!(rate.rate, pct("2.0"));

    let balance = restored.wallet_balance(&"ret2".into()).unwrap();
    assert_eq!(balance.balance, Amount::from_major(9_800));
    assert_eq!(balance.hold_balance, Amount::from_major(1_010));

    // The restored hold is released by a late failure.
    restored.settle(payout.id, Outcome::Failed).unwrap();
    let balance = restored.wallet_balance(&"ret2".into()).unwrap();
    assert_eq!(balance.hold_balance, Amount::ZERO);
    assert_eq!(balance.available, Amount::from_major(9_800));
    restored.ledger().verify_chain(&"ret2".into()).unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_async_settlers_race() {
    let engine = Arc::new(seeded_engine());
    let txn = engine
        .create_payin(&"ret".into(), &"upi".into(), Amount::from_major(1_000))
        .unwrap();

    let tasks: Vec<_> = (0..32)
        .map(|_| {
            let engine = engine.clone();
            tokio::task::spawn_blocking(move || engine.settle(txn.id, Outcome::Success))
        })
        .collect();

    let mut committed = 0;
    for task in tasks {
        if let SettleResult::Committed { .. } = task.await.unwrap().unwrap() {
            committed += 1;
        }
    }
    assert_eq!(committed, 1);
    // ret pays 1.65 %, the platform keeps the 0.15 % margin.
    assert_eq!(
        engine.wallet_balance(&"ret".into()).unwrap().balance,
        Amount::new(98_350)
    );
    assert_eq!(
        engine.wallet_balance(&"platform".into()).unwrap().balance,
        Amount::new(150)
    );
}
