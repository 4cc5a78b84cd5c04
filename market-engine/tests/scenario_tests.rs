//! End-to-end scenarios across commitment, resolution and distribution
//!
//! Each test drives the full pipeline against a real RocksDB instance in a
//! temp directory: purchase -> commit -> resolve -> distribute, asserting
//! balance conservation, idempotence and partial-failure isolation.

use chrono::Utc;
use market_engine::{CommitmentRequest, EngineConfig, MarketEngine, OptionDef};
use rust_decimal::Decimal;
use std::sync::Arc;
use token_ledger::types::{CommitmentStatus, MarketStatus, Position, ResolutionStatus};
use token_ledger::{Market, Reconciler, UserId};
use uuid::Uuid;

fn test_engine() -> (Arc<MarketEngine>, tempfile::TempDir) {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let temp_dir = tempfile::tempdir().unwrap();
    let mut config = EngineConfig::default();
    config.ledger.data_dir = temp_dir.path().to_path_buf();
    (Arc::new(MarketEngine::open(config).unwrap()), temp_dir)
}

fn options(ids: &[&str]) -> Vec<OptionDef> {
    ids.iter()
        .map(|id| OptionDef {
            option_id: id.to_string(),
            text: id.to_string(),
        })
        .collect()
}

async fn binary_market(engine: &MarketEngine) -> Market {
    engine
        .create_market(
            "will it?",
            options(&["opt-yes", "opt-no"]),
            Utc::now() + chrono::Duration::hours(1),
        )
        .await
        .unwrap()
}

fn stake(user: &str, market_id: Uuid, tokens: i64, option_id: &str) -> CommitmentRequest {
    CommitmentRequest {
        user_id: user.to_string(),
        market_id,
        tokens_to_commit: Decimal::from(tokens),
        position: None,
        option_id: Some(option_id.to_string()),
        client_info: None,
    }
}

#[tokio::test]
async fn scenario_exact_pool_distribution() {
    // 2000-token pool, 5% house + 2% creator fee leaves a 1860 winner pool
    // for the single yes-side winner
    let (engine, _temp) = test_engine();
    let market = binary_market(&engine).await;

    let alice = UserId::new("alice");
    let bob = UserId::new("bob");
    engine
        .purchase_tokens(&alice, Decimal::from(2000))
        .await
        .unwrap();
    engine
        .purchase_tokens(&bob, Decimal::from(2000))
        .await
        .unwrap();

    engine
        .create_commitment(&stake("alice", market.market_id, 500, "opt-yes"))
        .await
        .unwrap();
    engine
        .create_commitment(&stake("bob", market.market_id, 750, "opt-no"))
        .await
        .unwrap();
    engine
        .create_commitment(&stake("bob", market.market_id, 750, "opt-no"))
        .await
        .unwrap();

    let summary = engine
        .resolve_market(
            market.market_id,
            "opt-yes",
            vec!["https://evidence.example/1".to_string()],
            "admin-1",
            Decimal::new(2, 2),
        )
        .await
        .unwrap();

    assert!(summary.success);
    assert_eq!(summary.winner_count, 1);
    assert_eq!(summary.total_payout, Decimal::from(1860));
    assert_eq!(summary.distributed_users, 2);

    let alice_balance = engine.ledger().get_balance(&alice).await.unwrap();
    assert_eq!(alice_balance.available_tokens, Decimal::from(3360)); // 1500 + 1860
    assert_eq!(alice_balance.committed_tokens, Decimal::ZERO);
    assert!(alice_balance.conserves());

    let bob_balance = engine.ledger().get_balance(&bob).await.unwrap();
    assert_eq!(bob_balance.available_tokens, Decimal::from(500));
    assert_eq!(bob_balance.committed_tokens, Decimal::ZERO);
    assert_eq!(bob_balance.total_spent, Decimal::from(1500));
    assert!(bob_balance.conserves());

    let market = engine.get_market(market.market_id).unwrap();
    assert_eq!(market.status, MarketStatus::Resolved);

    let storage = engine.ledger().storage();
    let resolution = storage
        .resolution_for_market(market.market_id)
        .unwrap()
        .unwrap();
    assert_eq!(resolution.status, ResolutionStatus::Completed);
    for commitment in storage.commitments_for_market(market.market_id).unwrap() {
        let expected = if commitment.user_id == alice {
            CommitmentStatus::Won
        } else {
            CommitmentStatus::Lost
        };
        assert_eq!(commitment.status, expected);
        assert!(commitment.resolved_at.is_some());
    }

    // estimate-num-keys counts memtable entries, so these are lower bounds
    let stats = engine.stats().unwrap();
    assert!(stats.total_markets >= 1);
    assert!(stats.total_balances >= 2);
    assert!(stats.total_commitments >= 3);

    // Resolved market collapses around the winning option: 500 of 2000
    let analytics = engine.market_analytics(market.market_id).unwrap();
    assert_eq!(analytics.yes_percentage, Decimal::from(25));
    assert_eq!(analytics.participant_count, 3);
    assert_eq!(engine.list_analytics(0, 10).unwrap().len(), 1);
}

#[tokio::test]
async fn scenario_double_distribution_is_idempotent() {
    let (engine, _temp) = test_engine();
    let market = binary_market(&engine).await;

    for user in ["alice", "bob"] {
        engine
            .purchase_tokens(&UserId::new(user), Decimal::from(1000))
            .await
            .unwrap();
    }
    engine
        .create_commitment(&stake("alice", market.market_id, 400, "opt-yes"))
        .await
        .unwrap();
    engine
        .create_commitment(&stake("bob", market.market_id, 600, "opt-no"))
        .await
        .unwrap();

    let summary = engine
        .resolve_market(market.market_id, "opt-yes", vec![], "admin", Decimal::ZERO)
        .await
        .unwrap();
    assert!(summary.success);

    let alice = UserId::new("alice");
    let before = engine.ledger().get_balance(&alice).await.unwrap();

    // Re-running the distribution skips every completed user
    let retry = engine
        .retry_distribution(summary.resolution_id)
        .await
        .unwrap();
    assert!(retry.success);

    let after = engine.ledger().get_balance(&alice).await.unwrap();
    assert_eq!(before.available_tokens, after.available_tokens);
    assert_eq!(before.version, after.version);
}

#[tokio::test]
async fn scenario_insufficient_balance_leaves_version_unchanged() {
    let (engine, _temp) = test_engine();
    let market = binary_market(&engine).await;

    let user = UserId::new("shorty");
    engine
        .purchase_tokens(&user, Decimal::from(50))
        .await
        .unwrap();

    let response = engine
        .create_commitment_response(&stake("shorty", market.market_id, 100, "opt-yes"))
        .await;
    assert!(!response.success);
    assert_eq!(response.error.unwrap().code, "INSUFFICIENT_BALANCE");

    let balance = engine.ledger().get_balance(&user).await.unwrap();
    assert_eq!(balance.available_tokens, Decimal::from(50));
    assert_eq!(balance.version, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn scenario_racing_commitments_converge() {
    let (engine, _temp) = test_engine();
    let market = binary_market(&engine).await;

    let user = UserId::new("racer");
    engine
        .purchase_tokens(&user, Decimal::from(1000))
        .await
        .unwrap();

    let mut handles = Vec::new();
    for i in 0..10 {
        let engine = engine.clone();
        let market_id = market.market_id;
        handles.push(tokio::spawn(async move {
            let option = if i % 2 == 0 { "opt-yes" } else { "opt-no" };
            engine
                .create_commitment(&stake("racer", market_id, 50, option))
                .await
        }));
    }

    let mut successes = 0u64;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            successes += 1;
        }
    }
    assert_eq!(successes, 10);

    let balance = engine.ledger().get_balance(&user).await.unwrap();
    assert_eq!(balance.version, 1 + successes); // Purchase + one bump per commit
    assert_eq!(balance.committed_tokens, Decimal::from(500));
    assert_eq!(balance.available_tokens, Decimal::from(500));
    assert!(balance.conserves());

    let market = engine.get_market(market.market_id).unwrap();
    assert_eq!(market.total_participants, 10);
    assert_eq!(market.total_tokens_staked, Decimal::from(500));
    assert_eq!(market.version, successes);
}

#[tokio::test]
async fn scenario_no_winners_refunds_all_stakes() {
    let (engine, _temp) = test_engine();
    let market = engine
        .create_market(
            "which of three?",
            options(&["a", "b", "c"]),
            Utc::now() + chrono::Duration::hours(1),
        )
        .await
        .unwrap();

    for user in ["u1", "u2"] {
        engine
            .purchase_tokens(&UserId::new(user), Decimal::from(300))
            .await
            .unwrap();
    }
    engine
        .create_commitment(&stake("u1", market.market_id, 100, "a"))
        .await
        .unwrap();
    engine
        .create_commitment(&stake("u2", market.market_id, 200, "b"))
        .await
        .unwrap();

    // Nobody staked on "c"
    let summary = engine
        .resolve_market(market.market_id, "c", vec![], "admin", Decimal::ZERO)
        .await
        .unwrap();
    assert!(summary.success);
    assert!(summary.no_winners_refund);
    assert_eq!(summary.winner_count, 0);
    assert_eq!(summary.total_payout, Decimal::ZERO);

    // Every stake returned; nothing earned, nothing spent
    for user in ["u1", "u2"] {
        let balance = engine
            .ledger()
            .get_balance(&UserId::new(user))
            .await
            .unwrap();
        assert_eq!(balance.available_tokens, Decimal::from(300));
        assert_eq!(balance.committed_tokens, Decimal::ZERO);
        assert_eq!(balance.total_spent, Decimal::ZERO);
        assert!(balance.conserves());
    }

    let storage = engine.ledger().storage();
    let resolution = storage
        .resolution_for_market(market.market_id)
        .unwrap()
        .unwrap();
    assert_eq!(resolution.status, ResolutionStatus::NoWinnersRefunded);
    for commitment in storage.commitments_for_market(market.market_id).unwrap() {
        assert_eq!(commitment.status, CommitmentStatus::Cancelled);
    }
}

#[tokio::test]
async fn scenario_partial_failure_isolates_users() {
    // 200 winners, one with a corrupted balance: that user fails, the other
    // 199 complete, and a retry after repair settles the last one without
    // touching the rest
    let (engine, _temp) = test_engine();
    let market = binary_market(&engine).await;

    for i in 0..200 {
        let user = format!("winner-{:03}", i);
        engine
            .purchase_tokens(&UserId::new(&user), Decimal::from(10))
            .await
            .unwrap();
        engine
            .create_commitment(&stake(&user, market.market_id, 10, "opt-yes"))
            .await
            .unwrap();
    }
    engine
        .purchase_tokens(&UserId::new("loser"), Decimal::from(100))
        .await
        .unwrap();
    engine
        .create_commitment(&stake("loser", market.market_id, 100, "opt-no"))
        .await
        .unwrap();

    // Corrupt one winner's stored row: drop its committed stake so the win
    // mutation would drive committed negative
    let victim = UserId::new("winner-007");
    let storage = engine.ledger().storage();
    let mut corrupted = storage.get_balance(&victim).unwrap().unwrap();
    corrupted.committed_tokens = Decimal::ZERO;
    corrupted.version += 1;
    let mut unit = storage.begin_unit();
    unit.put_balance(&corrupted).unwrap();
    unit.commit().unwrap();

    let summary = engine
        .resolve_market(market.market_id, "opt-yes", vec![], "admin", Decimal::ZERO)
        .await
        .unwrap();
    assert!(!summary.success);
    assert_eq!(summary.errors.len(), 1);
    assert_eq!(summary.errors[0].user_id, victim);
    assert_eq!(summary.distributed_users, 200); // 199 winners + the loser

    let resolution = storage
        .resolution_for_market(market.market_id)
        .unwrap()
        .unwrap();
    assert_eq!(resolution.status, ResolutionStatus::PartiallyFailed);

    // 2100-token pool, 5% house fee: each of 200 equal winners gets 9.975
    let expected_payout = Decimal::new(99750, 4);
    let healthy = UserId::new("winner-000");
    let balance = engine.ledger().get_balance(&healthy).await.unwrap();
    assert_eq!(balance.available_tokens, expected_payout);
    assert!(balance.conserves());

    // Repair the corrupted row from the transaction log, then retry
    let reconciler = Reconciler::new(engine.ledger().clone());
    let report = reconciler.reconcile(&victim).await.unwrap();
    assert!(report.has_drift());

    let retry = engine
        .retry_distribution(resolution.resolution_id)
        .await
        .unwrap();
    assert!(retry.success);

    let repaired = engine.ledger().get_balance(&victim).await.unwrap();
    assert_eq!(repaired.available_tokens, expected_payout);
    assert!(repaired.conserves());

    // The healthy winner was skipped, not paid twice
    let balance = engine.ledger().get_balance(&healthy).await.unwrap();
    assert_eq!(balance.available_tokens, expected_payout);

    let resolution = storage.get_resolution(resolution.resolution_id).unwrap();
    assert_eq!(resolution.status, ResolutionStatus::Completed);
}

#[tokio::test]
async fn scenario_addressing_compatibility_round_trip() {
    let (engine, _temp) = test_engine();
    engine
        .purchase_tokens(&UserId::new("legacy"), Decimal::from(100))
        .await
        .unwrap();

    // Position-only request on a binary market derives the option id
    let binary = binary_market(&engine).await;
    let commitment = engine
        .create_commitment(&CommitmentRequest {
            user_id: "legacy".to_string(),
            market_id: binary.market_id,
            tokens_to_commit: Decimal::from(10),
            position: Some("no".to_string()),
            option_id: None,
            client_info: None,
        })
        .await
        .unwrap();
    let stored = engine
        .ledger()
        .storage()
        .get_commitment(commitment.commitment_id)
        .unwrap();
    assert_eq!(stored.option_id.as_deref(), Some("opt-no"));
    assert_eq!(stored.position, Some(Position::No));

    // Option-id request on a multi-option market derives position only for
    // the first two options
    let multi = engine
        .create_market(
            "which?",
            options(&["first", "second", "third"]),
            Utc::now() + chrono::Duration::hours(1),
        )
        .await
        .unwrap();
    for (option, expected) in [
        ("first", Some(Position::Yes)),
        ("second", Some(Position::No)),
        ("third", None),
    ] {
        let commitment = engine
            .create_commitment(&stake("legacy", multi.market_id, 10, option))
            .await
            .unwrap();
        assert_eq!(commitment.position, expected);
        assert_eq!(commitment.option_id.as_deref(), Some(option));
    }
}

#[tokio::test]
async fn scenario_cancelled_market_refunds() {
    let (engine, _temp) = test_engine();
    let market = binary_market(&engine).await;

    let user = UserId::new("alice");
    engine
        .purchase_tokens(&user, Decimal::from(100))
        .await
        .unwrap();
    engine
        .create_commitment(&stake("alice", market.market_id, 60, "opt-yes"))
        .await
        .unwrap();

    let (_, refunds) = engine.cancel_market(market.market_id).await.unwrap();
    assert!(refunds.success());
    assert_eq!(refunds.refunded, 1);

    let balance = engine.ledger().get_balance(&user).await.unwrap();
    assert_eq!(balance.available_tokens, Decimal::from(100));
    assert_eq!(balance.committed_tokens, Decimal::ZERO);
    assert!(balance.conserves());

    // A cancelled market accepts no further operations
    let result = engine
        .create_commitment(&stake("alice", market.market_id, 10, "opt-yes"))
        .await;
    assert!(result.is_err());
    let result = engine
        .resolve_market(market.market_id, "opt-yes", vec![], "admin", Decimal::ZERO)
        .await;
    assert!(result.is_err());

    // Transaction history shows the full commit/refund trail
    let transactions = engine.ledger().transactions(&user, 0, 10).await.unwrap();
    assert_eq!(transactions.len(), 3);
    let mut kinds: Vec<_> = transactions.iter().map(|t| t.kind).collect();
    kinds.sort_by_key(|k| *k as u8);
    use token_ledger::TransactionKind::*;
    assert_eq!(kinds, vec![Purchase, Commit, Refund]);
}

#[tokio::test]
async fn scenario_no_winners_refund_failure_is_retriable() {
    // One user's refund fails mid-pass: the others are refunded, and the
    // failed remainder is re-run through retry_distribution after repair
    let (engine, _temp) = test_engine();
    let market = engine
        .create_market(
            "which of three?",
            options(&["a", "b", "c"]),
            Utc::now() + chrono::Duration::hours(1),
        )
        .await
        .unwrap();

    for user in ["r1", "r2", "r3"] {
        engine
            .purchase_tokens(&UserId::new(user), Decimal::from(100))
            .await
            .unwrap();
        engine
            .create_commitment(&stake(user, market.market_id, 50, "a"))
            .await
            .unwrap();
    }

    // Corrupt one row: the refund would drive committed negative
    let victim = UserId::new("r2");
    let storage = engine.ledger().storage();
    let mut corrupted = storage.get_balance(&victim).unwrap().unwrap();
    corrupted.committed_tokens = Decimal::ZERO;
    corrupted.version += 1;
    let mut unit = storage.begin_unit();
    unit.put_balance(&corrupted).unwrap();
    unit.commit().unwrap();

    // Nobody staked on "c"
    let summary = engine
        .resolve_market(market.market_id, "c", vec![], "admin", Decimal::ZERO)
        .await
        .unwrap();
    assert!(summary.no_winners_refund);
    assert!(!summary.success);
    assert_eq!(summary.errors.len(), 1);
    assert_eq!(summary.errors[0].user_id, victim);
    assert_eq!(summary.distributed_users, 2);

    // The healthy users got their stakes back
    for user in ["r1", "r3"] {
        let balance = engine
            .ledger()
            .get_balance(&UserId::new(user))
            .await
            .unwrap();
        assert_eq!(balance.available_tokens, Decimal::from(100));
        assert_eq!(balance.committed_tokens, Decimal::ZERO);
    }

    // The market is resolved, so a second resolve is rejected; recovery
    // goes through the retry path instead
    assert!(engine
        .resolve_market(market.market_id, "c", vec![], "admin", Decimal::ZERO)
        .await
        .is_err());

    let resolution = storage
        .resolution_for_market(market.market_id)
        .unwrap()
        .unwrap();
    assert_eq!(resolution.status, ResolutionStatus::NoWinnersRefunded);

    let reconciler = Reconciler::new(engine.ledger().clone());
    let report = reconciler.reconcile(&victim).await.unwrap();
    assert!(report.has_drift());

    let retry = engine
        .retry_distribution(resolution.resolution_id)
        .await
        .unwrap();
    assert!(retry.success);
    assert!(retry.no_winners_refund);
    assert_eq!(retry.distributed_users, 3); // 1 refunded + 2 skipped

    let repaired = engine.ledger().get_balance(&victim).await.unwrap();
    assert_eq!(repaired.available_tokens, Decimal::from(100));
    assert_eq!(repaired.committed_tokens, Decimal::ZERO);
    assert!(repaired.conserves());
    for commitment in storage.commitments_for_market(market.market_id).unwrap() {
        assert_eq!(commitment.status, CommitmentStatus::Cancelled);
    }
}

#[tokio::test]
async fn scenario_cancellation_refund_failure_is_retriable() {
    let (engine, _temp) = test_engine();
    let market = binary_market(&engine).await;

    for user in ["u1", "u2"] {
        engine
            .purchase_tokens(&UserId::new(user), Decimal::from(100))
            .await
            .unwrap();
        engine
            .create_commitment(&stake(user, market.market_id, 40, "opt-yes"))
            .await
            .unwrap();
    }

    // Refund retries only apply to cancelled markets
    assert!(engine
        .retry_cancellation_refunds(market.market_id)
        .await
        .is_err());

    let victim = UserId::new("u2");
    let storage = engine.ledger().storage();
    let mut corrupted = storage.get_balance(&victim).unwrap().unwrap();
    corrupted.committed_tokens = Decimal::ZERO;
    corrupted.version += 1;
    let mut unit = storage.begin_unit();
    unit.put_balance(&corrupted).unwrap();
    unit.commit().unwrap();

    let (cancelled, refunds) = engine.cancel_market(market.market_id).await.unwrap();
    assert_eq!(cancelled.status, MarketStatus::Cancelled);
    assert!(!refunds.success());
    assert_eq!(refunds.refunded, 1);
    assert_eq!(refunds.failed, 1);
    assert_eq!(refunds.errors[0].user_id, victim);

    let healthy = engine
        .ledger()
        .get_balance(&UserId::new("u1"))
        .await
        .unwrap();
    assert_eq!(healthy.available_tokens, Decimal::from(100));

    let reconciler = Reconciler::new(engine.ledger().clone());
    reconciler.reconcile(&victim).await.unwrap();

    let retry = engine
        .retry_cancellation_refunds(market.market_id)
        .await
        .unwrap();
    assert!(retry.success());
    assert_eq!(retry.refunded, 1);
    assert_eq!(retry.skipped, 1);

    let repaired = engine.ledger().get_balance(&victim).await.unwrap();
    assert_eq!(repaired.available_tokens, Decimal::from(100));
    assert_eq!(repaired.committed_tokens, Decimal::ZERO);
    assert!(repaired.conserves());
}

#[tokio::test]
async fn scenario_retry_pays_fees_recorded_at_resolution() {
    // A house-fee config change between the run and its retry must not pay
    // retried users a different amount than the rest
    let (engine, _temp) = test_engine();
    let market = binary_market(&engine).await;

    let alice = UserId::new("alice");
    for (user, option) in [("alice", "opt-yes"), ("bob", "opt-no")] {
        engine
            .purchase_tokens(&UserId::new(user), Decimal::from(1000))
            .await
            .unwrap();
        engine
            .create_commitment(&stake(user, market.market_id, 100, option))
            .await
            .unwrap();
    }

    let storage = engine.ledger().storage();
    let mut corrupted = storage.get_balance(&alice).unwrap().unwrap();
    corrupted.committed_tokens = Decimal::ZERO;
    corrupted.version += 1;
    let mut unit = storage.begin_unit();
    unit.put_balance(&corrupted).unwrap();
    unit.commit().unwrap();

    // Resolved under the default 5% house fee: the winner pool is 190
    let summary = engine
        .resolve_market(market.market_id, "opt-yes", vec![], "admin", Decimal::ZERO)
        .await
        .unwrap();
    assert!(!summary.success);

    let resolution = storage
        .resolution_for_market(market.market_id)
        .unwrap()
        .unwrap();
    assert_eq!(resolution.house_fee_pct, Decimal::new(5, 2));

    let reconciler = Reconciler::new(engine.ledger().clone());
    reconciler.reconcile(&alice).await.unwrap();

    // Retry through an engine configured with a 20% house fee; the stored
    // fee decides the plan
    let mut raised = EngineConfig::default();
    raised.fees.house_fee_pct = Decimal::new(20, 2);
    let raised_engine = MarketEngine::with_ledger(engine.ledger().clone(), raised);
    let retry = raised_engine
        .retry_distribution(resolution.resolution_id)
        .await
        .unwrap();
    assert!(retry.success);
    assert_eq!(retry.total_payout, Decimal::from(190));

    let balance = engine.ledger().get_balance(&alice).await.unwrap();
    assert_eq!(balance.available_tokens, Decimal::from(1090)); // 900 + 190
    assert!(balance.conserves());
}

#[tokio::test]
async fn scenario_reconcile_matches_after_full_lifecycle() {
    let (engine, _temp) = test_engine();
    let market = binary_market(&engine).await;

    for (user, tokens, option) in [("a", 400, "opt-yes"), ("b", 600, "opt-no")] {
        engine
            .purchase_tokens(&UserId::new(user), Decimal::from(1000))
            .await
            .unwrap();
        engine
            .create_commitment(&stake(user, market.market_id, tokens, option))
            .await
            .unwrap();
    }
    engine
        .resolve_market(market.market_id, "opt-yes", vec![], "admin", Decimal::ZERO)
        .await
        .unwrap();

    let reconciler = Reconciler::new(engine.ledger().clone());
    for user in ["a", "b"] {
        let report = reconciler.check_drift(&UserId::new(user)).await.unwrap();
        assert!(!report.has_drift(), "{}: {:?}", user, report.drifted_fields);
    }
}

#[tokio::test]
async fn scenario_commitment_metadata_records_disagreement() {
    // Binary market, position and option id disagree: position wins and the
    // override is visible in the transaction metadata
    let (engine, _temp) = test_engine();
    let market = binary_market(&engine).await;
    let user = UserId::new("mixed");
    engine
        .purchase_tokens(&user, Decimal::from(100))
        .await
        .unwrap();

    let commitment = engine
        .create_commitment(&CommitmentRequest {
            user_id: "mixed".to_string(),
            market_id: market.market_id,
            tokens_to_commit: Decimal::from(10),
            position: Some("yes".to_string()),
            option_id: Some("opt-no".to_string()),
            client_info: None,
        })
        .await
        .unwrap();
    assert_eq!(commitment.option_id.as_deref(), Some("opt-yes"));

    let transactions = engine.ledger().transactions(&user, 0, 10).await.unwrap();
    let commit_tx = transactions
        .iter()
        .find(|t| t.kind == token_ledger::TransactionKind::Commit)
        .unwrap();
    assert_eq!(
        commit_tx.metadata.get("addressing_method").map(String::as_str),
        Some("position-based")
    );
    assert!(commit_tx.metadata.contains_key("addressing_disagreement"));
}
