//! AI decision module.
//!
//! Produces valid exchange payloads for a bot given its weapon layout and
//! a set of missing targets. Decisions are independent per target; the
//! runtime registers them in one atomic batch.

use rand::Rng;
use rand::RngCore;

use crate::model::{ActorId, ExchangePayload, WeaponLayout, Zone, zone_block_list};

/// One decided exchange payload for one target.
pub fn decide_exchange(
    target_id: ActorId,
    layout: WeaponLayout,
    rng: &mut dyn RngCore,
) -> ExchangePayload {
    let attack_zones = pick_attack_zones(layout, rng);
    let block_zones = pick_block_zones(layout, rng);
    ExchangePayload {
        target_id,
        attack_zones,
        block_zones,
        ability_key: None,
        feint_key: None,
        extra: Default::default(),
    }
}

/// Independent decisions for every missing target.
pub fn decide_batch(
    targets: &[ActorId],
    layout: WeaponLayout,
    rng: &mut dyn RngCore,
) -> Vec<ExchangePayload> {
    targets
        .iter()
        .map(|target| decide_exchange(*target, layout, rng))
        .collect()
}

/// Attack zones: uniform picks from the five body zones, one per swing.
pub fn pick_attack_zones(layout: WeaponLayout, rng: &mut dyn RngCore) -> Vec<Zone> {
    (0..layout.attack_zone_count())
        .map(|_| Zone::ALL[rng.gen_range(0..Zone::ALL.len())])
        .collect()
}

/// Block zones: an adjacent pair, or a single zone for two-handers.
pub fn pick_block_zones(layout: WeaponLayout, rng: &mut dyn RngCore) -> Vec<Zone> {
    let options = zone_block_list(layout);
    options[rng.gen_range(0..options.len())].clone()
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use crate::model::{BLOCK_PAIRS, BlockPattern};

    use super::*;

    #[test]
    fn decisions_are_always_valid_for_every_layout() {
        let mut rng = StdRng::seed_from_u64(17);
        for layout in [WeaponLayout::OneHand, WeaponLayout::TwoHand, WeaponLayout::Dual] {
            for _ in 0..64 {
                let payload = decide_exchange(5, layout, &mut rng);
                assert_eq!(payload.attack_zones.len(), layout.attack_zone_count());
                assert!(
                    BlockPattern::from_zones(layout, &payload.block_zones).is_some(),
                    "invalid block zones {:?} for {layout:?}",
                    payload.block_zones
                );
            }
        }
    }

    #[test]
    fn batch_produces_one_decision_per_target() {
        let mut rng = StdRng::seed_from_u64(17);
        let decisions = decide_batch(&[2, 3, 4], WeaponLayout::Dual, &mut rng);
        assert_eq!(decisions.len(), 3);
        let targets: Vec<i64> = decisions.iter().map(|d| d.target_id).collect();
        assert_eq!(targets, vec![2, 3, 4]);
    }

    #[test]
    fn pair_blocks_come_from_the_fixed_list() {
        let mut rng = StdRng::seed_from_u64(23);
        for _ in 0..32 {
            let zones = pick_block_zones(WeaponLayout::OneHand, &mut rng);
            let pair = [zones[0], zones[1]];
            assert!(BLOCK_PAIRS.iter().any(|p| *p == pair));
        }
    }
}
