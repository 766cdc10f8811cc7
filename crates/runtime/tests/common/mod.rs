//! Shared fixtures for the integration suites.

use std::collections::BTreeMap;
use std::sync::Arc;

use rbc_runtime::{
    AssembleRequest, Clock, CreateBattleConfig, Engine, EngineConfig, EngineHandle,
    EquipmentPiece, InMemoryAccounts, ManualClock, MemberSpec, MemoryStore, StaticCharacter,
    StaticCharacterSource, Vitals,
};
use rbc_core::model::BattleType;

pub struct Harness {
    pub engine: Engine,
    pub handle: EngineHandle,
    pub clock: Arc<ManualClock>,
    pub store: Arc<MemoryStore>,
    pub accounts: Arc<InMemoryAccounts>,
}

fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// A plain melee fighter: no avoidance stats, so exchanges with
/// non-overlapping zones land deterministically.
pub fn fighter(name: &str, strength: f64) -> StaticCharacter {
    StaticCharacter {
        name: name.to_string(),
        attributes: BTreeMap::from([
            ("strength".to_string(), strength),
            ("endurance".to_string(), 5.0),
        ]),
        equipment: vec![EquipmentPiece {
            id: 900,
            slot: "main_hand".into(),
            skill_key: Some("skill_swords".into()),
            additive: BTreeMap::from([
                ("damage_min".to_string(), 3.0),
                ("damage_max".to_string(), 6.0),
            ]),
            hand_prefixed: true,
            is_weapon: true,
            ..EquipmentPiece::default()
        }],
        abilities: vec!["second_wind".into()],
        belt: vec!["healing_draught".into()],
        vitals: Vitals::default(),
    }
}

/// Engine over a manual clock and instrumented in-memory store.
pub fn harness(characters: BTreeMap<i64, StaticCharacter>) -> Harness {
    init_tracing();
    let clock = Arc::new(ManualClock::at(1_000.0));
    let clock_for_store: Arc<dyn Clock> = clock.clone();
    let store = Arc::new(MemoryStore::new(clock_for_store));
    let accounts = Arc::new(InMemoryAccounts::new());
    let source = Arc::new(StaticCharacterSource::new(characters));

    let engine = Engine::builder()
        .config(EngineConfig::default())
        .clock(clock.clone())
        .store(store.clone())
        .account_manager(accounts.clone())
        .player_source(source.clone())
        .monster_source(source.clone())
        .pet_source(source)
        .build();
    let handle = engine.handle();

    Harness {
        engine,
        handle,
        clock,
        store,
        accounts,
    }
}

/// Assemble templates for the given ids and create a battle with the
/// given rosters. Member ids equal source ids unless remapped.
pub async fn create_battle(
    harness: &Harness,
    session_id: &str,
    battle_type: BattleType,
    teams: &[(&str, &[i64])],
) -> rbc_core::model::SessionMeta {
    // Convention: positive ids are player characters, negative ids are
    // monsters (AI-driven).
    let all_ids: Vec<i64> = teams.iter().flat_map(|(_, ids)| ids.iter().copied()).collect();
    let (keys, errors) = harness
        .handle
        .assemble(AssembleRequest {
            player_ids: all_ids.iter().copied().filter(|id| *id > 0).collect(),
            monster_ids: all_ids.iter().copied().filter(|id| *id < 0).collect(),
            ..AssembleRequest::default()
        })
        .await
        .expect("assembly should succeed");
    assert!(errors.is_empty(), "assembly errors: {errors:?}");

    let mut roster = BTreeMap::new();
    for (team, ids) in teams {
        let members: Vec<MemberSpec> = ids
            .iter()
            .map(|id| MemberSpec {
                template_key: keys[id].clone(),
                id: *id,
            })
            .collect();
        roster.insert(team.to_string(), members);
    }

    harness
        .handle
        .create_battle(
            session_id,
            &CreateBattleConfig {
                battle_type,
                teams: roster,
                session_ttl_secs: None,
            },
        )
        .await
        .expect("battle creation should succeed")
}
