mod common;

use common::{quick_delay, setup, spawn_routers};
use futures::future::join_all;
use sealbid_mpc::message::{SessionId, Vid};
use sealbid_network::sim::OmissionPolicy;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

fn vid_for(party: usize) -> Option<Vid> {
    let sid = SessionId::root(format!("input-{party}"));
    Some(Vid::digest(
        &sid,
        &[(party, sealbid_common::Fq::from(party as u64))],
    ))
}

#[tokio::test]
async fn all_honest_parties_output_the_same_set() {
    let (net, inboxes, _, stacks, _) = setup(quick_delay(), None, 400);
    let _routers = spawn_routers(&stacks, &net, inboxes);

    let sid = SessionId::root("acs");
    let outputs = join_all(stacks.iter().map(|stack| {
        let sid = sid.clone();
        let net = Arc::clone(&net);
        async move { stack.acs.run(&sid, vid_for(stack.id), net).await.unwrap() }
    }))
    .await;

    assert!(outputs.iter().all(|s| s.len() == common::N - common::F));
    assert!(outputs.iter().all(|s| *s == outputs[0]));
}

#[tokio::test]
async fn omitter_is_excluded_and_honest_parties_agree() {
    let omitter = 2;
    let (net, inboxes, _, stacks, _) = setup(
        quick_delay(),
        Some(OmissionPolicy::DropAll { party: omitter }),
        401,
    );
    let _routers = spawn_routers(&stacks, &net, inboxes);

    let sid = SessionId::root("acs");
    let honest: Vec<_> = stacks.iter().filter(|s| s.id != omitter).collect();
    let outputs = join_all(honest.iter().map(|stack| {
        let sid = sid.clone();
        let net = Arc::clone(&net);
        async move {
            tokio::time::timeout(
                Duration::from_secs(10),
                stack.acs.run(&sid, vid_for(stack.id), net),
            )
            .await
            .expect("honest ACS must terminate")
            .unwrap()
        }
    }))
    .await;

    let expected: BTreeSet<usize> = (1..=common::N).filter(|p| *p != omitter).collect();
    assert!(outputs.iter().all(|s| *s == expected));
}

#[tokio::test]
async fn more_qualifiers_than_needed_truncates_to_smallest_indices() {
    // With everyone honest and fast links, all four proposals are delivered
    // and all four agreements decide one; the deterministic tie-break keeps
    // the three smallest indices.
    let (net, inboxes, _, stacks, _) = setup(quick_delay(), None, 402);
    let _routers = spawn_routers(&stacks, &net, inboxes);

    let sid = SessionId::root("acs");
    let outputs = join_all(stacks.iter().map(|stack| {
        let sid = sid.clone();
        let net = Arc::clone(&net);
        async move { stack.acs.run(&sid, vid_for(stack.id), net).await.unwrap() }
    }))
    .await;

    assert!(outputs.iter().all(|s| *s == outputs[0]));
    let expected: BTreeSet<usize> = [1, 2, 3].into_iter().collect();
    assert_eq!(
        outputs[0], expected,
        "with all proposals delivered, the smallest three indices survive"
    );
}
