//! Turn manager: intent validation and registration.

use std::sync::Arc;

use rand::seq::SliceRandom;

use rbc_core::config::afk_timeout;
use rbc_core::model::{
    ActorId, BlockPattern, ExchangePayload, InstantPayload, ItemPayload, Move, MovePayload,
    Strategy, TargetSpec, WeaponLayout, Zone, zone_block_list,
};

use crate::clock::Clock;
use crate::error::{EngineError, Result};
use crate::manager::{CombatManager, keys};
use crate::service::data::DataService;
use crate::utils::short_id;

/// Raw submission from a front-end, pre-validation.
#[derive(Clone, Debug)]
pub struct MoveRequest {
    pub strategy: Strategy,
    /// Exchange target.
    pub target_id: Option<ActorId>,
    pub attack_zones: Vec<Zone>,
    pub block_zones: Vec<Zone>,
    pub ability_key: Option<String>,
    pub feint_key: Option<String>,
    /// Item strategy only.
    pub item_id: Option<String>,
    /// Item/instant target selector.
    pub target: Option<TargetSpec>,
}

impl MoveRequest {
    pub fn exchange(target_id: ActorId, attack_zones: Vec<Zone>, block_zones: Vec<Zone>) -> Self {
        Self {
            strategy: Strategy::Exchange,
            target_id: Some(target_id),
            attack_zones,
            block_zones,
            ability_key: None,
            feint_key: None,
            item_id: None,
            target: None,
        }
    }

    pub fn item(item_id: &str, target: TargetSpec) -> Self {
        Self {
            strategy: Strategy::Item,
            target_id: None,
            attack_zones: vec![],
            block_zones: vec![],
            ability_key: None,
            feint_key: None,
            item_id: Some(item_id.to_string()),
            target: Some(target),
        }
    }

    pub fn instant(ability_key: &str, target: TargetSpec) -> Self {
        Self {
            strategy: Strategy::Instant,
            target_id: None,
            attack_zones: vec![],
            block_zones: vec![],
            ability_key: Some(ability_key.to_string()),
            feint_key: None,
            item_id: None,
            target: Some(target),
        }
    }

    pub fn with_ability(mut self, key: &str) -> Self {
        self.ability_key = Some(key.to_string());
        self
    }
}

pub struct TurnService {
    data: Arc<DataService>,
    manager: Arc<CombatManager>,
    clock: Arc<dyn Clock>,
}

impl TurnService {
    pub fn new(data: Arc<DataService>, manager: Arc<CombatManager>, clock: Arc<dyn Clock>) -> Self {
        Self {
            data,
            manager,
            clock,
        }
    }

    /// Validate and atomically register one intent.
    ///
    /// On success the submitter's afk penalty resets and the stored move
    /// is returned (deadline filled). Stale exchange targets surface as
    /// [`EngineError::StaleTarget`].
    pub async fn register_move_request(
        &self,
        session_id: &str,
        char_id: ActorId,
        request: MoveRequest,
    ) -> Result<Move> {
        let meta = self.data.get_battle_meta(session_id).await?;
        if !meta.active {
            return Err(EngineError::SessionInactive(session_id.to_string()));
        }
        if meta.team_of(char_id).is_none() {
            return Err(EngineError::UnknownActor(char_id));
        }

        let now = self.clock.now();
        let mv = match request.strategy {
            Strategy::Exchange => {
                self.build_exchange(session_id, char_id, request, now).await?
            }
            Strategy::Item => build_item(char_id, request, now)?,
            Strategy::Instant => build_instant(char_id, request, now)?,
        };

        if mv.is_expired(now) {
            return Err(EngineError::Validation("deadline already past".into()));
        }

        match &mv.payload {
            MovePayload::Exchange(payload) => {
                let doc = serde_json::to_value(&mv)
                    .map_err(|e| EngineError::External(e.to_string()))?;
                let registered = self
                    .manager
                    .register_exchange_move_atomic(
                        session_id,
                        char_id,
                        payload.target_id,
                        &mv.move_id,
                        doc,
                    )
                    .await?;
                if !registered {
                    return Err(EngineError::StaleTarget {
                        actor_id: char_id,
                        target_id: payload.target_id,
                    });
                }
            }
            _ => {
                let doc = serde_json::to_value(&mv)
                    .map_err(|e| EngineError::External(e.to_string()))?;
                self.manager
                    .append_move(
                        session_id,
                        char_id,
                        &mv.strategy().to_string(),
                        &mv.move_id,
                        doc,
                    )
                    .await?;
            }
        }

        self.manager.reset_afk_penalty(session_id, char_id).await?;
        Ok(mv)
    }

    async fn build_exchange(
        &self,
        session_id: &str,
        char_id: ActorId,
        request: MoveRequest,
        now: f64,
    ) -> Result<Move> {
        let target_id = request
            .target_id
            .ok_or_else(|| EngineError::Validation("exchange requires target_id".into()))?;
        if target_id == char_id {
            return Err(EngineError::Validation("cannot target self".into()));
        }

        let layout = self.load_layout(session_id, char_id).await?;
        let (attack_zones, block_zones) =
            validate_zones(layout, request.attack_zones, request.block_zones)?;

        // Deadline scales down with the target's afk record.
        let penalty = self
            .manager
            .store()
            .hget_one(&keys::actor_state(session_id, target_id), "afk_penalty_level")
            .await?
            .and_then(|raw| raw.parse::<u8>().ok())
            .unwrap_or(0);
        let deadline = now + afk_timeout(penalty) as f64;

        Ok(Move {
            move_id: short_id(8),
            char_id,
            created_at: now,
            deadline,
            payload: MovePayload::Exchange(ExchangePayload {
                target_id,
                attack_zones,
                block_zones,
                ability_key: request.ability_key,
                feint_key: request.feint_key,
                extra: Default::default(),
            }),
        })
    }

    async fn load_layout(&self, session_id: &str, char_id: ActorId) -> Result<WeaponLayout> {
        let layout = self
            .manager
            .store()
            .json_get(&keys::actor_loadout(session_id, char_id), "$.layout")
            .await?;
        match layout {
            Some(value) => serde_json::from_value(value).map_err(|source| EngineError::Corrupt {
                key: keys::actor_loadout(session_id, char_id),
                source,
            }),
            None => Ok(WeaponLayout::OneHand),
        }
    }
}

/// Zone validation: wrong counts or invalid pairs are rejected; missing
/// zones fill with a random valid selection.
fn validate_zones(
    layout: WeaponLayout,
    attack: Vec<Zone>,
    block: Vec<Zone>,
) -> Result<(Vec<Zone>, Vec<Zone>)> {
    let mut rng = rand::thread_rng();

    let attack = if attack.is_empty() {
        (0..layout.attack_zone_count())
            .filter_map(|_| Zone::ALL.choose(&mut rng).copied())
            .collect()
    } else if attack.len() == layout.attack_zone_count() {
        attack
    } else {
        return Err(EngineError::Validation(format!(
            "expected {} attack zones for layout {layout}, got {}",
            layout.attack_zone_count(),
            attack.len()
        )));
    };

    let block = if block.is_empty() {
        zone_block_list(layout)
            .choose(&mut rng)
            .cloned()
            .unwrap_or_default()
    } else {
        match BlockPattern::from_zones(layout, &block) {
            Some(pattern) => pattern.zones(),
            None => {
                return Err(EngineError::Validation(format!(
                    "invalid block zones for layout {layout}"
                )));
            }
        }
    };

    Ok((attack, block))
}

fn build_item(char_id: ActorId, request: MoveRequest, now: f64) -> Result<Move> {
    let item_id = request
        .item_id
        .ok_or_else(|| EngineError::Validation("item strategy requires item_id".into()))?;
    let target = request
        .target
        .unwrap_or(TargetSpec::Named("self".into()));
    Ok(Move {
        move_id: short_id(8),
        char_id,
        created_at: now,
        deadline: now + afk_timeout(0) as f64,
        payload: MovePayload::Item(ItemPayload {
            item_id,
            target,
            targets: vec![],
            extra: Default::default(),
        }),
    })
}

fn build_instant(char_id: ActorId, request: MoveRequest, now: f64) -> Result<Move> {
    let ability_key = request
        .ability_key
        .ok_or_else(|| EngineError::Validation("instant strategy requires ability_key".into()))?;
    let target = request
        .target
        .unwrap_or(TargetSpec::Named("self".into()));
    Ok(Move {
        move_id: short_id(8),
        char_id,
        created_at: now,
        deadline: now + afk_timeout(0) as f64,
        payload: MovePayload::Instant(InstantPayload {
            ability_key,
            target,
            targets: vec![],
            extra: Default::default(),
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zone_validation_fills_missing_and_rejects_bad_shapes() {
        let (attack, block) = validate_zones(WeaponLayout::OneHand, vec![], vec![]).unwrap();
        assert_eq!(attack.len(), 1);
        assert_eq!(block.len(), 2);
        assert!(BlockPattern::from_zones(WeaponLayout::OneHand, &block).is_some());

        let err = validate_zones(
            WeaponLayout::OneHand,
            vec![Zone::Head, Zone::Chest],
            vec![],
        );
        assert!(err.is_err(), "1h carries exactly one attack zone");

        let err = validate_zones(
            WeaponLayout::Dual,
            vec![Zone::Head, Zone::Chest],
            vec![Zone::Head, Zone::Groin],
        );
        assert!(err.is_err(), "non-adjacent block pair");
    }

    #[test]
    fn two_hand_blocks_one_zone() {
        let (_, block) =
            validate_zones(WeaponLayout::TwoHand, vec![Zone::Head], vec![Zone::Legs]).unwrap();
        assert_eq!(block, vec![Zone::Legs]);
    }
}
