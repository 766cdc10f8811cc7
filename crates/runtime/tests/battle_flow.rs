//! End-to-end battle scenarios: duels, force-attacks, AI turns, shadow
//! mode, victory and reward write-back.

mod common;

use std::collections::BTreeMap;

use rbc_core::model::{BattleType, TargetSpec, Zone};
use rbc_runtime::{BattleStatus, CollectorSignal, EngineError, MoveRequest};

use common::{create_battle, fighter, harness};

/// Attack zones that never overlap the opposing block pair, so plain
/// fighters always connect.
fn open_exchange(target: i64) -> MoveRequest {
    MoveRequest::exchange(target, vec![Zone::Legs], vec![Zone::Head, Zone::Chest])
}

#[tokio::test]
async fn simple_duel_resolves_one_exchange() {
    let mut chars = BTreeMap::new();
    chars.insert(1, fighter("Rita", 10.0));
    chars.insert(2, fighter("Bob", 10.0));
    let h = harness(chars);
    create_battle(&h, "duel-1", BattleType::Standard, &[("blue", &[1]), ("red", &[2])]).await;

    h.handle
        .turn()
        .register_move_request("duel-1", 1, open_exchange(2))
        .await
        .unwrap();
    h.handle
        .turn()
        .register_move_request("duel-1", 2, open_exchange(1))
        .await
        .unwrap();

    let outcome = h.handle.collect("duel-1", None).await.unwrap();
    assert_eq!(outcome.enqueued, 1, "reciprocal pair collapses to one action");
    assert!(outcome.ai_tasks.is_empty());

    let result = h
        .handle
        .execute("duel-1", outcome.batch_size)
        .await
        .unwrap();
    assert!(result.committed);
    assert_eq!(result.processed, 1);

    let meta = h.handle.data().get_battle_meta("duel-1").await.unwrap();
    assert_eq!(meta.step_counter, 1);

    let view1 = h.handle.dashboard("duel-1", 1, 0).await.unwrap();
    let hero = view1.hero.unwrap();
    assert!(hero.hp < hero.max_hp, "Rita took reciprocal damage");
    let view2 = h.handle.dashboard("duel-1", 2, 0).await.unwrap();
    let hero2 = view2.hero.unwrap();
    assert!(hero2.hp < hero2.max_hp, "Bob took damage");

    assert_eq!(view1.logs.len(), 1);
    assert_eq!(view1.logs[0].round_index, 1);
    assert_eq!(view1.logs[0].logs.len(), 2, "one line per direction");
}

#[tokio::test]
async fn force_attack_after_deadline_is_one_sided() {
    let mut chars = BTreeMap::new();
    chars.insert(1, fighter("Rita", 10.0));
    chars.insert(2, fighter("Bob", 10.0));
    let h = harness(chars);
    create_battle(&h, "duel-2", BattleType::Standard, &[("blue", &[1]), ("red", &[2])]).await;

    let mv = h
        .handle
        .turn()
        .register_move_request("duel-2", 1, open_exchange(2))
        .await
        .unwrap();

    // Nothing to match yet; a plain tick emits nothing.
    let idle = h.handle.collect("duel-2", None).await.unwrap();
    assert_eq!(idle.enqueued, 0);

    // Before the deadline the timeout signal is a no-op too.
    let early = h
        .handle
        .collect(
            "duel-2",
            Some(&CollectorSignal::check_timeout(Some(1), Some(mv.move_id.clone()))),
        )
        .await
        .unwrap();
    assert_eq!(early.enqueued, 0, "no forced action before the deadline");

    h.clock.advance(61.0);
    let forced = h
        .handle
        .collect(
            "duel-2",
            Some(&CollectorSignal::check_timeout(Some(1), Some(mv.move_id))),
        )
        .await
        .unwrap();
    assert_eq!(forced.enqueued, 1);

    h.handle.execute("duel-2", forced.batch_size).await.unwrap();

    let view1 = h.handle.dashboard("duel-2", 1, 0).await.unwrap();
    let hero = view1.hero.unwrap();
    assert_eq!(hero.hp, hero.max_hp, "one-sided: attacker untouched");
    let target = view1.target.unwrap();
    assert!(target.hp < target.max_hp, "defender lost hp");
    assert_eq!(view1.logs[0].round_index, 1);
}

#[tokio::test]
async fn ai_fills_missing_targets_then_waits_for_partner() {
    let mut chars = BTreeMap::new();
    chars.insert(1, fighter("Rita", 10.0));
    chars.insert(-10, fighter("Rat", 6.0));
    chars.insert(-11, fighter("Bat", 6.0));
    let h = harness(chars);
    create_battle(
        &h,
        "pve-1",
        BattleType::Standard,
        &[("blue", &[1]), ("red", &[-10, -11])],
    )
    .await;

    let outcome = h.handle.collect("pve-1", None).await.unwrap();
    assert_eq!(outcome.enqueued, 0);
    let bots: Vec<i64> = outcome.ai_tasks.iter().map(|t| t.bot_id).collect();
    assert!(bots.contains(&-10), "bot -10 is missing its target");
    let request = outcome
        .ai_tasks
        .iter()
        .find(|t| t.bot_id == -10)
        .unwrap();
    assert_eq!(request.missing_targets, vec![1]);

    // AI files its intents; registration pops the targets.
    for request in &outcome.ai_tasks {
        let registered = h.handle.run_ai_turn(request).await.unwrap();
        assert_eq!(registered, request.missing_targets.len() as i64);
    }

    // Player hasn't moved and no timeout fired: intents stay pending.
    let next = h.handle.collect("pve-1", None).await.unwrap();
    assert_eq!(next.enqueued, 0);
    assert!(next.ai_tasks.is_empty(), "all targets covered now");

    // Once the player answers one bot, that pair matches.
    h.handle
        .turn()
        .register_move_request("pve-1", 1, open_exchange(-10))
        .await
        .unwrap();
    let matched = h.handle.collect("pve-1", None).await.unwrap();
    assert_eq!(matched.enqueued, 1);
}

#[tokio::test]
async fn shadow_mode_negates_red_side_and_prefixes_names() {
    let mut chars = BTreeMap::new();
    chars.insert(1, fighter("Rita", 10.0));
    chars.insert(7, fighter("Hero", 10.0));
    let h = harness(chars);
    let meta = create_battle(
        &h,
        "shadow-1",
        BattleType::Shadow,
        &[("blue", &[1]), ("red", &[7])],
    )
    .await;

    assert_eq!(meta.teams["red"], vec![-7], "red-side copy gets a negated id");
    assert_eq!(
        meta.role_of(-7),
        Some(rbc_core::model::ActorRole::Ai),
        "shadow copies are AI-driven"
    );

    let ctx = h.handle.data().load_battle_context("shadow-1").await.unwrap();
    let shadow = ctx.actor(-7).unwrap();
    assert_eq!(shadow.meta.name, "Shadow Hero");
    let original = ctx.actor(1).unwrap();
    assert_eq!(
        shadow.state.max_hp, original.state.max_hp,
        "same template, same stats"
    );
}

#[tokio::test]
async fn stale_target_rejects_second_registration() {
    let mut chars = BTreeMap::new();
    chars.insert(1, fighter("Rita", 10.0));
    chars.insert(2, fighter("Bob", 10.0));
    let h = harness(chars);
    create_battle(&h, "duel-3", BattleType::Standard, &[("blue", &[1]), ("red", &[2])]).await;

    h.handle
        .turn()
        .register_move_request("duel-3", 1, open_exchange(2))
        .await
        .unwrap();
    let second = h.handle.turn().register_move_request("duel-3", 1, open_exchange(2)).await;
    match second {
        Err(EngineError::StaleTarget {
            actor_id: 1,
            target_id: 2,
        }) => {}
        other => panic!("expected StaleTarget, got {other:?}"),
    }
}

#[tokio::test]
async fn victory_writes_rewards_and_unlinks_profiles() {
    let mut chars = BTreeMap::new();
    // Overwhelming strength: one forced hit ends the fight.
    chars.insert(1, fighter("Rita", 400.0));
    chars.insert(2, fighter("Bob", 1.0));
    let h = harness(chars);
    create_battle(&h, "duel-4", BattleType::Standard, &[("blue", &[1]), ("red", &[2])]).await;

    assert_eq!(
        h.accounts.field(1, "combat_session_id"),
        Some(serde_json::json!("duel-4")),
        "profile linked at creation"
    );

    let mv = h
        .handle
        .turn()
        .register_move_request("duel-4", 1, open_exchange(2))
        .await
        .unwrap();
    h.clock.advance(61.0);
    let forced = h
        .handle
        .collect(
            "duel-4",
            Some(&CollectorSignal::check_timeout(Some(1), Some(mv.move_id))),
        )
        .await
        .unwrap();
    assert_eq!(forced.enqueued, 1);

    let result = h.handle.execute("duel-4", forced.batch_size).await.unwrap();
    assert_eq!(result.winner.as_deref(), Some("blue"));

    let meta = h.handle.data().get_battle_meta("duel-4").await.unwrap();
    assert!(!meta.active);
    assert_eq!(meta.winner.as_deref(), Some("blue"));
    let reward = meta.rewards.get("1").expect("winner reward present");
    assert!(reward.xp > 0);
    assert!(reward.gold > 0);

    // Durable write-back: link released, battle vitals persisted.
    assert_eq!(h.accounts.field(1, "combat_session_id"), None);
    let hp = h.accounts.field(1, "hp_current").expect("hp written back");
    assert!(hp.as_i64().unwrap() > 0);

    let view = h.handle.dashboard("duel-4", 1, 0).await.unwrap();
    assert_eq!(view.status, BattleStatus::Finished);
}

#[tokio::test]
async fn item_use_heals_through_the_queue() {
    let mut chars = BTreeMap::new();
    chars.insert(1, fighter("Rita", 10.0));
    chars.insert(2, fighter("Bob", 10.0));
    let h = harness(chars);
    create_battle(&h, "duel-5", BattleType::Standard, &[("blue", &[1]), ("red", &[2])]).await;

    // Trade one exchange first so Rita is wounded.
    h.handle.turn().register_move_request("duel-5", 1, open_exchange(2)).await.unwrap();
    h.handle.turn().register_move_request("duel-5", 2, open_exchange(1)).await.unwrap();
    let outcome = h.handle.collect("duel-5", None).await.unwrap();
    h.handle.execute("duel-5", outcome.batch_size).await.unwrap();

    let before = h
        .handle
        .dashboard("duel-5", 1, 0)
        .await
        .unwrap()
        .hero
        .unwrap()
        .hp;

    h.handle
        .turn()
        .register_move_request(
            "duel-5",
            1,
            MoveRequest::item("healing_draught", TargetSpec::Named("self".into())),
        )
        .await
        .unwrap();
    let outcome = h.handle.collect("duel-5", None).await.unwrap();
    assert_eq!(outcome.enqueued, 1, "item harvested without a partner");
    h.handle.execute("duel-5", outcome.batch_size).await.unwrap();

    let after = h
        .handle
        .dashboard("duel-5", 1, 0)
        .await
        .unwrap()
        .hero
        .unwrap()
        .hp;
    assert!(after > before, "healing draught restored hp");
}

#[tokio::test]
async fn background_pipeline_resolves_a_duel_unattended() {
    let mut chars = BTreeMap::new();
    chars.insert(1, fighter("Rita", 10.0));
    chars.insert(2, fighter("Bob", 10.0));
    let h = harness(chars);
    create_battle(&h, "bg-1", BattleType::Standard, &[("blue", &[1]), ("red", &[2])]).await;

    // The scheduled path: submissions arm the collector, the collector
    // schedules the executor, the executor heartbeats back.
    h.handle.submit_move("bg-1", 1, open_exchange(2)).await.unwrap();
    h.handle.submit_move("bg-1", 2, open_exchange(1)).await.unwrap();

    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
    loop {
        let meta = h.handle.data().get_battle_meta("bg-1").await.unwrap();
        if meta.step_counter >= 1 {
            break;
        }
        assert!(
            std::time::Instant::now() < deadline,
            "background pipeline never committed the exchange"
        );
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }

    let view = h.handle.dashboard("bg-1", 1, 0).await.unwrap();
    let hero = view.hero.unwrap();
    assert!(hero.hp < hero.max_hp);
}
