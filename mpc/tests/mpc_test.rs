mod common;

use common::{quick_delay, setup, spawn_routers, Stack};
use futures::future::join_all;
use sealbid_common::{Fq, Share};
use sealbid_mpc::arith::Arithmetic;
use sealbid_mpc::css::DealKind;
use sealbid_mpc::message::SessionId;
use std::sync::Arc;

/// Deals `secret` from `dealer` and returns each party's finalized share.
async fn deal(
    stacks: &[Stack],
    net: &Arc<common::Net>,
    dealer: usize,
    label: &str,
    secret: u64,
) -> Vec<Share> {
    let sid = SessionId::root("mpc").child(label);
    stacks[dealer - 1]
        .css
        .share(sid.clone(), Fq::from(secret), DealKind::Input, net)
        .await
        .unwrap();
    join_all(stacks.iter().map(|s| s.css.wait_finalized(&sid)))
        .await
        .into_iter()
        .map(|r| r.unwrap().1)
        .collect()
}

/// Opens one share per party under a common session and asserts agreement.
async fn open_all(stacks: &[Stack], net: &Arc<common::Net>, label: &str, shares: &[Share]) -> Fq {
    let sid = SessionId::root("mpc").child(label);
    let opened = join_all(stacks.iter().zip(shares).map(|(stack, share)| {
        let sid = sid.clone();
        let net = Arc::clone(net);
        async move { stack.arith.open(*share, sid, net).await.unwrap() }
    }))
    .await;
    assert!(opened.iter().all(|v| *v == opened[0]));
    opened[0]
}

#[tokio::test]
async fn linear_operations_commute_with_opening() {
    let (net, inboxes, _, stacks, _) = setup(quick_delay(), None, 500);
    let _routers = spawn_routers(&stacks, &net, inboxes);

    let a = deal(&stacks, &net, 1, "input-a", 6).await;
    let b = deal(&stacks, &net, 2, "input-b", 7).await;

    let sums: Vec<Share> = a
        .iter()
        .zip(&b)
        .map(|(x, y)| Arithmetic::add(*x, *y).unwrap())
        .collect();
    assert_eq!(open_all(&stacks, &net, "sum", &sums).await, Fq::from(13u64));

    let diffs: Vec<Share> = b
        .iter()
        .zip(&a)
        .map(|(x, y)| Arithmetic::sub(*x, *y).unwrap())
        .collect();
    assert_eq!(open_all(&stacks, &net, "diff", &diffs).await, Fq::from(1u64));

    let scaled: Vec<Share> = a
        .iter()
        .map(|x| Arithmetic::scalar_mul(Fq::from(3u64), *x))
        .collect();
    assert_eq!(
        open_all(&stacks, &net, "scaled", &scaled).await,
        Fq::from(18u64)
    );
}

#[tokio::test]
async fn multiply_then_open_equals_the_plaintext_product() {
    let (net, inboxes, _, stacks, _) = setup(quick_delay(), None, 501);
    let _routers = spawn_routers(&stacks, &net, inboxes);

    let a = deal(&stacks, &net, 1, "input-a", 6).await;
    let b = deal(&stacks, &net, 2, "input-b", 7).await;

    let sid = SessionId::root("mpc").child("mul-0");
    let products = join_all(stacks.iter().enumerate().map(|(idx, stack)| {
        let sid = sid.clone();
        let net = Arc::clone(&net);
        let (x, y) = (a[idx], b[idx]);
        async move { stack.arith.multiply(x, y, sid, net).await.unwrap() }
    }))
    .await;

    // Degree reduction must land back on a degree-f sharing.
    assert!(products.iter().all(|p| p.degree == common::F));
    assert_eq!(
        open_all(&stacks, &net, "product", &products).await,
        Fq::from(42u64)
    );
    assert!(stacks.iter().all(|s| s.arith.gates_evaluated() == 1));
}

#[tokio::test]
async fn chained_multiplications_stay_reduced() {
    let (net, inboxes, _, stacks, _) = setup(quick_delay(), None, 502);
    let _routers = spawn_routers(&stacks, &net, inboxes);

    let a = deal(&stacks, &net, 1, "input-a", 3).await;
    let b = deal(&stacks, &net, 2, "input-b", 4).await;
    let c = deal(&stacks, &net, 3, "input-c", 5).await;

    let ab_sid = SessionId::root("mpc").child("mul-ab");
    let ab = join_all(stacks.iter().enumerate().map(|(idx, stack)| {
        let sid = ab_sid.clone();
        let net = Arc::clone(&net);
        let (x, y) = (a[idx], b[idx]);
        async move { stack.arith.multiply(x, y, sid, net).await.unwrap() }
    }))
    .await;

    let abc_sid = SessionId::root("mpc").child("mul-abc");
    let abc = join_all(stacks.iter().enumerate().map(|(idx, stack)| {
        let sid = abc_sid.clone();
        let net = Arc::clone(&net);
        let (x, y) = (ab[idx], c[idx]);
        async move { stack.arith.multiply(x, y, sid, net).await.unwrap() }
    }))
    .await;

    assert_eq!(
        open_all(&stacks, &net, "product", &abc).await,
        Fq::from(60u64)
    );
}

#[tokio::test]
async fn masked_output_reveals_only_to_the_owner() {
    let (net, inboxes, _, stacks, _) = setup(quick_delay(), None, 503);
    let _routers = spawn_routers(&stacks, &net, inboxes);

    let shares = deal(&stacks, &net, 1, "input-o", 23).await;
    let owner = 2;

    let sid = SessionId::root("mpc").child(format!("output-{owner}"));
    let revealed = join_all(stacks.iter().zip(&shares).map(|(stack, share)| {
        let sid = sid.clone();
        let net = Arc::clone(&net);
        async move {
            stack
                .output
                .reveal_to_owner(*share, owner, sid, net)
                .await
                .unwrap()
        }
    }))
    .await;

    for (stack, result) in stacks.iter().zip(&revealed) {
        if stack.id == owner {
            assert_eq!(*result, Some(Fq::from(23u64)));
        } else {
            assert_eq!(*result, None);
        }
    }
}
