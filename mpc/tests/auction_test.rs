mod common;

use sealbid_mpc::harness::{reference_auction, run_auction, AuctionConfig, AuctionReport};
use sealbid_network::PartyId;
use std::collections::BTreeSet;
use std::time::Duration;

/// Checks every §-level outcome invariant against the cleartext oracle on
/// the realized active set: one agreed set of size three, the winner paying
/// the second price, zeros everywhere else.
fn assert_auction_correct(report: &AuctionReport, bids: [u32; 4], omitter: Option<PartyId>) {
    assert!(
        report.all_honest_completed(omitter),
        "honest parties must terminate: {:?}",
        report.outcomes
    );

    let config = AuctionConfig::new(bids);
    let completed: Vec<_> = report
        .outcomes
        .values()
        .filter_map(|o| o.as_ref())
        .collect();
    let active = completed[0].active_set.clone();
    assert_eq!(active.len(), 3);
    assert!(
        completed.iter().all(|o| o.active_set == active),
        "active set must be agreed"
    );
    if let Some(omitter) = omitter {
        assert!(!active.contains(&omitter), "the omitter cannot be active");
        assert!(report.outcomes[&omitter].is_none());
    }

    let (winner, price) =
        reference_auction(&config.bids, active.iter().copied()).expect("three active bidders");
    for (party, outcome) in &report.outcomes {
        let Some(outcome) = outcome else { continue };
        let expected = if *party == winner { price as u128 } else { 0 };
        assert_eq!(
            outcome.output_as_int(),
            expected,
            "party {party} (winner {winner}, price {price}, active {active:?})"
        );
    }
}

fn scenario(bids: [u32; 4], seed: u64) -> AuctionConfig {
    let mut config = AuctionConfig::new(bids).with_seed(seed);
    config.budget = Duration::from_secs(20);
    config
}

#[tokio::test]
async fn honest_run_produces_the_second_price() {
    common::init_tracing();
    let report = run_auction(scenario([5, 20, 13, 7], 0)).await.unwrap();
    assert_auction_correct(&report, [5, 20, 13, 7], None);

    // The full circuit: 30 decomposition, 45 comparison, 3 + 3 winner and
    // minimum, 3 price and 3 output multiplications.
    assert_eq!(report.multiplication_gates, 87);
    assert!(report.messages_sent > 0);
    assert!(report.counts_by_kind.contains_key("CSS_SHARE"));
    assert!(report.counts_by_kind.contains_key("MUL_RESHARE"));
}

#[tokio::test]
async fn omitting_party_1_leaves_the_rest_correct() {
    common::init_tracing();
    let report = run_auction(scenario([5, 20, 13, 7], 300).with_omitter(1))
        .await
        .unwrap();
    assert_auction_correct(&report, [5, 20, 13, 7], Some(1));
    let active: BTreeSet<PartyId> = [2, 3, 4].into_iter().collect();
    let outcome = report.outcomes[&2].as_ref().unwrap();
    assert_eq!(outcome.active_set, active);
    // Winner 2 still pays the second price 13 of the remaining bids.
    assert_eq!(outcome.output_as_int(), 13);
}

#[tokio::test]
async fn omitting_the_would_be_winner_changes_the_outcome() {
    common::init_tracing();
    let report = run_auction(scenario([5, 20, 13, 7], 301).with_omitter(2))
        .await
        .unwrap();
    assert_auction_correct(&report, [5, 20, 13, 7], Some(2));
    // Party 3 (bid 13) wins and pays 7.
    assert_eq!(report.outcomes[&3].as_ref().unwrap().output_as_int(), 7);
}

#[tokio::test]
async fn omitting_party_3_leaves_the_rest_correct() {
    common::init_tracing();
    let report = run_auction(scenario([5, 20, 13, 7], 302).with_omitter(3))
        .await
        .unwrap();
    assert_auction_correct(&report, [5, 20, 13, 7], Some(3));
}

#[tokio::test]
async fn omitting_party_4_leaves_the_rest_correct() {
    common::init_tracing();
    let report = run_auction(scenario([5, 20, 13, 7], 303).with_omitter(4))
        .await
        .unwrap();
    assert_auction_correct(&report, [5, 20, 13, 7], Some(4));
}

#[tokio::test]
async fn boundary_bids_participate_correctly() {
    common::init_tracing();
    let report = run_auction(scenario([31, 0, 1, 30], 304)).await.unwrap();
    assert_auction_correct(&report, [31, 0, 1, 30], None);
}

#[tokio::test]
async fn adjacent_bids_resolve_like_separated_ones() {
    common::init_tracing();
    let report = run_auction(scenario([10, 11, 12, 13], 305)).await.unwrap();
    assert_auction_correct(&report, [10, 11, 12, 13], None);
}

#[tokio::test]
async fn invalid_scenarios_are_rejected() {
    common::init_tracing();
    // Duplicate bids.
    assert!(run_auction(AuctionConfig::new([5, 5, 13, 7])).await.is_err());
    // Out-of-range bid.
    assert!(run_auction(AuctionConfig::new([32, 1, 2, 3])).await.is_err());
    // Out-of-range omitter.
    assert!(run_auction(AuctionConfig::new([5, 20, 13, 7]).with_omitter(9))
        .await
        .is_err());
}
