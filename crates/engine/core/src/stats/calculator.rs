//! The stats waterfall: raw model → flat sheet.
//!
//! Derivation runs in layers, each consuming the one before it:
//! attributes collapse first, then vitals, then per-hand offense, then
//! defense, then passthrough modifiers, and finally the flat impacts of
//! any live ability overlays.

use crate::model::{ActiveAbility, Loadout, WeaponLayout};

use super::{Hand, RawModel, StatSheet, keys};

/// Materialize the full stat sheet for one actor.
///
/// `step` selects which ability overlays are still live; expired overlays
/// contribute nothing.
pub fn materialize(
    raw: &RawModel,
    loadout: &Loadout,
    overlays: &[ActiveAbility],
    step: u64,
) -> StatSheet {
    let mut sheet = StatSheet::new();

    let strength = raw.attribute(keys::STRENGTH);
    let dexterity = raw.attribute(keys::DEXTERITY);
    let endurance = raw.attribute(keys::ENDURANCE);
    let intuition = raw.attribute(keys::INTUITION);
    let wisdom = raw.attribute(keys::WISDOM);

    // Vitals.
    sheet.set(
        keys::MAX_HP,
        50.0 + endurance * 10.0 + strength * 2.0 + raw.modifier(keys::MAX_HP),
    );
    sheet.set(keys::MAX_EN, 30.0 + wisdom * 5.0 + raw.modifier(keys::MAX_EN));
    sheet.set(keys::EN_REGEN, 2.0 + wisdom * 0.2 + raw.modifier(keys::EN_REGEN));

    // Per-hand offense. The off hand only materializes for dual layouts;
    // a two-hander folds everything into the main hand.
    let hands: &[Hand] = match loadout.layout {
        WeaponLayout::Dual => &[Hand::Main, Hand::Off],
        _ => &[Hand::Main],
    };
    for &hand in hands {
        let prefix = hand.prefix();
        sheet.set_handed(
            hand,
            keys::DAMAGE_MIN,
            strength * 0.5 + raw.modifier(&format!("{prefix}{}", keys::DAMAGE_MIN)),
        );
        sheet.set_handed(
            hand,
            keys::DAMAGE_MAX,
            strength * 0.8 + raw.modifier(&format!("{prefix}{}", keys::DAMAGE_MAX)),
        );
        sheet.set_handed(
            hand,
            keys::SKILL_MULT,
            1.0 + raw.modifier(&format!("{prefix}{}", keys::SKILL_MULT)),
        );
    }

    // Magic offense scales off intuition instead of weapon entries.
    sheet.set(
        keys::MAGIC_DAMAGE_MIN,
        intuition * 0.6 + raw.modifier(keys::MAGIC_DAMAGE_MIN),
    );
    sheet.set(
        keys::MAGIC_DAMAGE_MAX,
        intuition * 0.9 + raw.modifier(keys::MAGIC_DAMAGE_MAX),
    );

    // Crit block.
    sheet.set(keys::CRIT_CHANCE, intuition * 0.005 + raw.modifier(keys::CRIT_CHANCE));
    sheet.set(keys::CRIT_POWER, 1.5 + intuition * 0.002 + raw.modifier(keys::CRIT_POWER));
    sheet.set(keys::ANTI_CRIT, endurance * 0.002 + raw.modifier(keys::ANTI_CRIT));

    // Avoidance.
    sheet.set(keys::DODGE_CHANCE, dexterity * 0.004 + raw.modifier(keys::DODGE_CHANCE));
    sheet.set(keys::ANTI_DODGE, intuition * 0.003 + raw.modifier(keys::ANTI_DODGE));
    sheet.set(keys::COUNTER_CHANCE, dexterity * 0.002 + raw.modifier(keys::COUNTER_CHANCE));
    sheet.set(keys::PARRY_CHANCE, dexterity * 0.0025 + raw.modifier(keys::PARRY_CHANCE));

    // Shield block only exists with a shield equipped.
    if loadout.has_shield {
        sheet.set(keys::BLOCK_CHANCE, raw.modifier(keys::BLOCK_CHANCE));
        sheet.set(keys::SHIELD_BLOCK_POWER, raw.modifier(keys::SHIELD_BLOCK_POWER));
    }

    // Mitigation and passthrough modifiers.
    sheet.set(keys::RESIST_PHYSICAL, endurance * 0.003 + raw.modifier(keys::RESIST_PHYSICAL));
    for key in [
        keys::PENETRATION,
        keys::PIERCE_CHANCE,
        keys::DAMAGE_REDUCTION_FLAT,
        keys::THORNS_DAMAGE,
        keys::VAMP_POWER,
        keys::VAMP_TRIGGER_CHANCE,
        keys::DAMAGE_BONUS_GENERIC,
        keys::SKILL_DUAL_WIELD,
    ] {
        sheet.set(key, raw.modifier(key));
    }

    // Armor-specific bonuses pass through under their full names.
    for name in raw.modifiers.keys() {
        if name.starts_with(keys::DAMAGE_BONUS_VS) {
            sheet.set(name.clone(), raw.modifier(name));
        }
    }

    // Overlay impacts land last as flat adds.
    for overlay in overlays {
        if overlay.expires_at_exchange >= step {
            for (key, value) in &overlay.impact {
                sheet.add(key, *value);
            }
        }
    }

    sheet
}
