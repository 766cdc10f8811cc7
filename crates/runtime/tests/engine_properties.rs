//! Property-style checks over the running engine: snapshot purity,
//! intent FIFO, cleaner idempotence, monotone step counter.

mod common;

use std::collections::BTreeMap;

use rbc_core::model::{BattleType, Zone};
use rbc_runtime::MoveRequest;

use common::{create_battle, fighter, harness};

fn open_exchange(target: i64) -> MoveRequest {
    MoveRequest::exchange(target, vec![Zone::Legs], vec![Zone::Head, Zone::Chest])
}

#[tokio::test]
async fn context_load_is_exactly_two_round_trips() {
    let mut chars = BTreeMap::new();
    chars.insert(1, fighter("Rita", 10.0));
    chars.insert(2, fighter("Bob", 10.0));
    let h = harness(chars);
    create_battle(&h, "p-1", BattleType::Standard, &[("blue", &[1]), ("red", &[2])]).await;

    let before = h.store.round_trips();
    h.handle.data().load_battle_context("p-1").await.unwrap();
    let after = h.store.round_trips();
    assert_eq!(after - before, 2, "meta load + batched actor/targets load");
}

#[tokio::test]
async fn step_counter_is_monotone_per_committed_exchange() {
    let mut chars = BTreeMap::new();
    chars.insert(1, fighter("Rita", 10.0));
    chars.insert(2, fighter("Bob", 10.0));
    let h = harness(chars);
    create_battle(&h, "p-2", BattleType::Standard, &[("blue", &[1]), ("red", &[2])]).await;

    let mut last = 0;
    for _ in 0..3 {
        h.handle.turn().register_move_request("p-2", 1, open_exchange(2)).await.unwrap();
        h.handle.turn().register_move_request("p-2", 2, open_exchange(1)).await.unwrap();
        let outcome = h.handle.collect("p-2", None).await.unwrap();
        if outcome.enqueued == 0 {
            // Someone already died in an earlier round; stop driving.
            break;
        }
        let result = h.handle.execute("p-2", outcome.batch_size).await.unwrap();
        if !result.committed {
            break;
        }
        let meta = h.handle.data().get_battle_meta("p-2").await.unwrap();
        assert!(meta.step_counter > last, "step counter strictly increases");
        last = meta.step_counter;
        if !meta.active {
            break;
        }
    }
    assert!(last >= 1);
}

#[tokio::test]
async fn hp_total_never_increases_without_heals() {
    let mut chars = BTreeMap::new();
    chars.insert(1, fighter("Rita", 20.0));
    chars.insert(2, fighter("Bob", 20.0));
    let h = harness(chars);
    create_battle(&h, "p-3", BattleType::Standard, &[("blue", &[1]), ("red", &[2])]).await;

    let total = |ctx: &rbc_runtime::BattleContext| -> i64 {
        ctx.actors.values().map(|a| a.state.hp).sum()
    };
    let mut previous = total(&h.handle.data().load_battle_context("p-3").await.unwrap());

    for _ in 0..4 {
        h.handle.turn().register_move_request("p-3", 1, open_exchange(2)).await.unwrap();
        h.handle.turn().register_move_request("p-3", 2, open_exchange(1)).await.unwrap();
        let outcome = h.handle.collect("p-3", None).await.unwrap();
        if outcome.enqueued == 0 {
            break;
        }
        let result = h.handle.execute("p-3", outcome.batch_size).await.unwrap();
        if !result.committed {
            break;
        }
        let ctx = h.handle.data().load_battle_context("p-3").await.unwrap();
        let current = total(&ctx);
        assert!(current <= previous, "no hp is created out of thin air");
        previous = current;
        if !ctx.meta.active {
            break;
        }
    }
}

#[tokio::test]
async fn collector_preserves_intent_fifo() {
    // Three bots all attack the player; the player answers them in
    // order. Matched actions must come out in intent-creation order.
    let mut chars = BTreeMap::new();
    chars.insert(1, fighter("Rita", 10.0));
    chars.insert(-10, fighter("Rat", 5.0));
    chars.insert(-11, fighter("Bat", 5.0));
    chars.insert(-12, fighter("Cat", 5.0));
    let h = harness(chars);
    create_battle(
        &h,
        "p-4",
        BattleType::Standard,
        &[("blue", &[1]), ("red", &[-10, -11, -12])],
    )
    .await;

    let outcome = h.handle.collect("p-4", None).await.unwrap();
    for request in &outcome.ai_tasks {
        h.handle.run_ai_turn(request).await.unwrap();
    }

    // The player files toward -10 first, then -11, with a clock tick in
    // between so created_at orders them.
    h.handle.turn().register_move_request("p-4", 1, open_exchange(-10)).await.unwrap();
    h.clock.advance(1.0);
    h.handle.turn().register_move_request("p-4", 1, open_exchange(-11)).await.unwrap();

    let outcome = h.handle.collect("p-4", None).await.unwrap();
    assert_eq!(outcome.enqueued, 2);

    let raw = h
        .handle
        .manager()
        .read_action_queue("p-4", 10)
        .await
        .unwrap();
    let pair_targets: Vec<i64> = raw
        .iter()
        .map(|value| {
            let action: rbc_core::model::Action =
                serde_json::from_value(value.clone()).unwrap();
            match (&action.r#move.char_id, action.r#move.as_exchange()) {
                (_, Some(payload)) => {
                    // Normalize so the pair reads as (player target).
                    if action.r#move.char_id == 1 {
                        payload.target_id
                    } else {
                        action.r#move.char_id
                    }
                }
                _ => panic!("expected exchange actions"),
            }
        })
        .collect();
    assert_eq!(pair_targets, vec![-10, -11], "FIFO by created_at");
}

#[tokio::test]
async fn cleaner_injection_is_idempotent() {
    let mut chars = BTreeMap::new();
    chars.insert(1, fighter("Rita", 10.0));
    chars.insert(2, fighter("Bob", 10.0));
    let h = harness(chars);
    create_battle(&h, "p-5", BattleType::Standard, &[("blue", &[1]), ("red", &[2])]).await;

    // Fresh session: supervisor relays but injects nothing.
    assert!(h.handle.supervise("p-5").await.unwrap());
    let meta = h.handle.data().get_battle_meta("p-5").await.unwrap();
    assert_eq!(meta.actors_info.len(), 2);

    // Stall past the threshold: the cleaner arrives.
    h.clock.advance(700.0);
    assert!(h.handle.supervise("p-5").await.unwrap());
    let meta = h.handle.data().get_battle_meta("p-5").await.unwrap();
    assert_eq!(meta.actors_info.len(), 3, "cleaner joined");
    assert!(meta.teams.contains_key("chaos"));

    // A second stalled tick changes nothing.
    let before_meta = h.handle.manager().get_meta_fields("p-5").await.unwrap();
    let before_targets = h.handle.manager().get_targets_doc("p-5").await.unwrap();
    assert!(h.handle.supervise("p-5").await.unwrap());
    let after_meta = h.handle.manager().get_meta_fields("p-5").await.unwrap();
    let after_targets = h.handle.manager().get_targets_doc("p-5").await.unwrap();
    assert_eq!(before_meta, after_meta, "meta untouched on repeat");
    assert_eq!(before_targets, after_targets, "targets untouched on repeat");

    // The cleaner is hostile to everyone.
    let ctx = h.handle.data().load_battle_context("p-5").await.unwrap();
    let cleaner_targets = ctx.targets.targets_of(rbc_content::CLEANER_ID_BASE);
    assert_eq!(cleaner_targets.len(), 2);
}

#[tokio::test]
async fn supervisor_stops_relaying_after_finish() {
    let mut chars = BTreeMap::new();
    chars.insert(1, fighter("Rita", 400.0));
    chars.insert(2, fighter("Bob", 1.0));
    let h = harness(chars);
    create_battle(&h, "p-6", BattleType::Standard, &[("blue", &[1]), ("red", &[2])]).await;

    let mv = h.handle.turn().register_move_request("p-6", 1, open_exchange(2)).await.unwrap();
    h.clock.advance(61.0);
    let outcome = h
        .handle
        .collect(
            "p-6",
            Some(&rbc_runtime::CollectorSignal::check_timeout(
                Some(1),
                Some(mv.move_id),
            )),
        )
        .await
        .unwrap();
    let result = h.handle.execute("p-6", outcome.batch_size).await.unwrap();
    assert!(result.winner.is_some());

    assert!(
        !h.handle.supervise("p-6").await.unwrap(),
        "inactive session ends the relay"
    );
}
