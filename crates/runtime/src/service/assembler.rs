//! Context assembler: external character data → setup templates.
//!
//! Given entity ids, builds a full snapshot document (math model,
//! loadout, vitals) from external sources and parks it under a
//! short-lived `temp:setup:{token}` key. The lifecycle service consumes
//! the template once during session creation; the key expires regardless.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use rbc_core::model::{Loadout, WeaponLayout};
use rbc_core::stats::{RawModel, StatEntry};

use crate::error::{EngineError, Result};
use crate::manager::keys;
use crate::store::KvStore;
use crate::utils::short_id;

/// TTL for assembled templates.
pub const TEMP_SETUP_TTL_SECS: u64 = 60;

/// Which projections get filled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssembleScope {
    Combat,
    Status,
    Inventory,
    Full,
}

impl AssembleScope {
    fn wants_math(self) -> bool {
        matches!(self, AssembleScope::Combat | AssembleScope::Full)
    }

    fn wants_loadout(self) -> bool {
        matches!(
            self,
            AssembleScope::Combat | AssembleScope::Inventory | AssembleScope::Full
        )
    }

    fn wants_vitals(self) -> bool {
        matches!(
            self,
            AssembleScope::Combat | AssembleScope::Status | AssembleScope::Full
        )
    }
}

/// Assembly order for one batch of entities.
#[derive(Clone, Debug, Default)]
pub struct AssembleRequest {
    pub player_ids: Vec<i64>,
    pub monster_ids: Vec<i64>,
    pub pet_ids: Vec<i64>,
    pub scope: Option<AssembleScope>,
}

/// Current vitals; `-1` means "start at max".
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Vitals {
    pub hp_current: i64,
    pub energy_current: i64,
}

impl Default for Vitals {
    fn default() -> Self {
        Self {
            hp_current: -1,
            energy_current: -1,
        }
    }
}

/// One equipped piece as the external inventory reports it.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EquipmentPiece {
    pub id: i64,
    /// Slot name: "main_hand", "off_hand", "two_hand", "torso", "belt".
    pub slot: String,
    #[serde(default)]
    pub skill_key: Option<String>,
    /// Additive stat contributions, keyed by stat name.
    #[serde(default)]
    pub additive: BTreeMap<String, f64>,
    /// Multiplicative contributions (fractions).
    #[serde(default)]
    pub multiplicative: BTreeMap<String, f64>,
    /// Whether stat names gain the hand prefix of the slot.
    #[serde(default)]
    pub hand_prefixed: bool,
    #[serde(default)]
    pub trigger_id: Option<String>,
    #[serde(default)]
    pub armor_type: Option<String>,
    #[serde(default)]
    pub is_weapon: bool,
    #[serde(default)]
    pub is_shield: bool,
}

/// External provider of durable character data.
#[async_trait]
pub trait CharacterSource: Send + Sync {
    async fn display_name(&self, id: i64) -> Result<String>;
    async fn base_attributes(&self, id: i64) -> Result<BTreeMap<String, f64>>;
    async fn equipment(&self, id: i64) -> Result<Vec<EquipmentPiece>>;
    async fn known_abilities(&self, id: i64) -> Result<Vec<String>>;
    async fn belt(&self, id: i64) -> Result<Vec<String>>;
    async fn vitals(&self, id: i64) -> Result<Vitals>;
    /// Symbiote bonuses; players only, others return `None`.
    async fn symbiote_bonus(&self, id: i64) -> Result<Option<BTreeMap<String, f64>>> {
        let _ = id;
        Ok(None)
    }
}

/// The assembled template document, consumed by session creation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SetupTemplate {
    pub name: String,
    /// "player", "monster", "pet".
    pub kind: String,
    #[serde(default)]
    pub math_model: RawModel,
    #[serde(default)]
    pub loadout: Option<Loadout>,
    #[serde(default)]
    pub vitals: Vitals,
}

pub struct ContextAssembler {
    store: Arc<dyn KvStore>,
    players: Arc<dyn CharacterSource>,
    monsters: Arc<dyn CharacterSource>,
    pets: Arc<dyn CharacterSource>,
}

impl ContextAssembler {
    pub fn new(
        store: Arc<dyn KvStore>,
        players: Arc<dyn CharacterSource>,
        monsters: Arc<dyn CharacterSource>,
        pets: Arc<dyn CharacterSource>,
    ) -> Self {
        Self {
            store,
            players,
            monsters,
            pets,
        }
    }

    /// Assemble every requested entity. Returns `{entity id -> temp key}`
    /// plus per-entity errors; one failing entity never fails the batch.
    pub async fn assemble(
        &self,
        request: AssembleRequest,
    ) -> Result<(BTreeMap<i64, String>, Vec<(i64, EngineError)>)> {
        let scope = request.scope.unwrap_or(AssembleScope::Combat);
        let mut keys_out = BTreeMap::new();
        let mut errors = Vec::new();

        let batches: [(&[i64], &Arc<dyn CharacterSource>, &str); 3] = [
            (&request.player_ids, &self.players, "player"),
            (&request.monster_ids, &self.monsters, "monster"),
            (&request.pet_ids, &self.pets, "pet"),
        ];
        for (ids, source, kind) in batches {
            for id in ids {
                match self.assemble_one(*id, source.as_ref(), kind, scope).await {
                    Ok(temp_key) => {
                        keys_out.insert(*id, temp_key);
                    }
                    Err(err) => errors.push((*id, err)),
                }
            }
        }
        Ok((keys_out, errors))
    }

    async fn assemble_one(
        &self,
        id: i64,
        source: &dyn CharacterSource,
        kind: &str,
        scope: AssembleScope,
    ) -> Result<String> {
        let name = source.display_name(id).await?;
        let mut template = SetupTemplate {
            name,
            kind: kind.to_string(),
            math_model: RawModel::default(),
            loadout: None,
            vitals: Vitals::default(),
        };

        let equipment = source.equipment(id).await?;

        if scope.wants_math() {
            template.math_model = build_math_model(
                source.base_attributes(id).await?,
                &equipment,
                if kind == "player" {
                    source.symbiote_bonus(id).await?
                } else {
                    None
                },
            );
        }
        if scope.wants_loadout() {
            template.loadout = Some(build_loadout(
                &equipment,
                source.belt(id).await?,
                source.known_abilities(id).await?,
            ));
        }
        if scope.wants_vitals() {
            template.vitals = source.vitals(id).await?;
        }

        let token = short_id(12);
        let temp_key = keys::temp_setup(&token);
        let doc = serde_json::to_value(&template)
            .map_err(|e| EngineError::External(e.to_string()))?;
        self.store.exec(vec![
            crate::store::Op::JsonSet(temp_key.clone(), "$".into(), doc),
            crate::store::Op::Expire(temp_key.clone(), TEMP_SETUP_TTL_SECS),
        ])
        .await?;
        Ok(temp_key)
    }
}

/// Fold base attributes, equipment entries, and symbiote bonuses into the
/// raw math model. Equipment lands as named sources keyed `item:{id}`;
/// hand-dependent stats gain the slot's hand prefix.
fn build_math_model(
    attributes: BTreeMap<String, f64>,
    equipment: &[EquipmentPiece],
    symbiote: Option<BTreeMap<String, f64>>,
) -> RawModel {
    let mut model = RawModel::default();
    for (name, base) in attributes {
        model.attributes.insert(name, StatEntry::with_base(base));
    }

    for piece in equipment {
        let source_key = format!("item:{}", piece.id);
        let prefix = match (piece.hand_prefixed, piece.slot.as_str()) {
            (true, "main_hand" | "two_hand") => "main_hand_",
            (true, "off_hand") => "off_hand_",
            _ => "",
        };
        for (stat, value) in &piece.additive {
            model
                .modifier_entry(&format!("{prefix}{stat}"))
                .set_add(source_key.clone(), *value);
        }
        for (stat, value) in &piece.multiplicative {
            model
                .modifier_entry(&format!("{prefix}{stat}"))
                .set_mult(source_key.clone(), *value);
        }
    }

    if let Some(bonus) = symbiote {
        for (stat, value) in bonus {
            model.modifier_entry(&stat).set_add("symbiote", value);
        }
    }
    model
}

fn build_loadout(
    equipment: &[EquipmentPiece],
    belt: Vec<String>,
    known_abilities: Vec<String>,
) -> Loadout {
    let has_two_hand = equipment.iter().any(|p| p.slot == "two_hand");
    let off_hand_weapon = equipment
        .iter()
        .any(|p| p.slot == "off_hand" && p.is_weapon);
    let layout = if has_two_hand {
        WeaponLayout::TwoHand
    } else if off_hand_weapon {
        WeaponLayout::Dual
    } else {
        WeaponLayout::OneHand
    };

    let mut slots = BTreeMap::new();
    for piece in equipment {
        if let Some(skill) = &piece.skill_key {
            let slot = if piece.slot == "two_hand" {
                "main_hand".to_string()
            } else {
                piece.slot.clone()
            };
            slots.insert(slot, skill.clone());
        }
    }

    Loadout {
        layout,
        slots,
        belt,
        known_abilities,
        tags: vec![],
        weapon_triggers: equipment
            .iter()
            .filter_map(|p| p.trigger_id.clone())
            .collect(),
        armor_type: equipment
            .iter()
            .find_map(|p| p.armor_type.clone()),
        has_shield: equipment.iter().any(|p| p.is_shield),
        extra: Default::default(),
    }
}

// ----------------------------------------------------------------------
// Static source for tests and offline tools
// ----------------------------------------------------------------------

/// One statically defined character.
#[derive(Clone, Debug, Default)]
pub struct StaticCharacter {
    pub name: String,
    pub attributes: BTreeMap<String, f64>,
    pub equipment: Vec<EquipmentPiece>,
    pub abilities: Vec<String>,
    pub belt: Vec<String>,
    pub vitals: Vitals,
}

/// In-memory character source.
#[derive(Clone, Debug, Default)]
pub struct StaticCharacterSource {
    characters: BTreeMap<i64, StaticCharacter>,
}

impl StaticCharacterSource {
    pub fn new(characters: BTreeMap<i64, StaticCharacter>) -> Self {
        Self { characters }
    }

    pub fn insert(&mut self, id: i64, character: StaticCharacter) {
        self.characters.insert(id, character);
    }

    fn get(&self, id: i64) -> Result<&StaticCharacter> {
        self.characters
            .get(&id)
            .ok_or_else(|| EngineError::External(format!("unknown character {id}")))
    }
}

#[async_trait]
impl CharacterSource for StaticCharacterSource {
    async fn display_name(&self, id: i64) -> Result<String> {
        Ok(self.get(id)?.name.clone())
    }

    async fn base_attributes(&self, id: i64) -> Result<BTreeMap<String, f64>> {
        Ok(self.get(id)?.attributes.clone())
    }

    async fn equipment(&self, id: i64) -> Result<Vec<EquipmentPiece>> {
        Ok(self.get(id)?.equipment.clone())
    }

    async fn known_abilities(&self, id: i64) -> Result<Vec<String>> {
        Ok(self.get(id)?.abilities.clone())
    }

    async fn belt(&self, id: i64) -> Result<Vec<String>> {
        Ok(self.get(id)?.belt.clone())
    }

    async fn vitals(&self, id: i64) -> Result<Vitals> {
        Ok(self.get(id)?.vitals)
    }
}

#[cfg(test)]
mod tests {
    use crate::clock::ManualClock;
    use crate::store::MemoryStore;

    use super::*;

    fn warrior() -> StaticCharacter {
        StaticCharacter {
            name: "Grim".into(),
            attributes: BTreeMap::from([
                ("strength".to_string(), 12.0),
                ("endurance".to_string(), 8.0),
            ]),
            equipment: vec![
                EquipmentPiece {
                    id: 401,
                    slot: "main_hand".into(),
                    skill_key: Some("skill_swords".into()),
                    additive: BTreeMap::from([("damage_min".to_string(), 4.0)]),
                    hand_prefixed: true,
                    is_weapon: true,
                    ..EquipmentPiece::default()
                },
                EquipmentPiece {
                    id: 402,
                    slot: "off_hand".into(),
                    is_shield: true,
                    additive: BTreeMap::from([("block_chance".to_string(), 0.25)]),
                    ..EquipmentPiece::default()
                },
                EquipmentPiece {
                    id: 403,
                    slot: "torso".into(),
                    armor_type: Some("heavy".into()),
                    ..EquipmentPiece::default()
                },
            ],
            abilities: vec!["power_strike".into()],
            belt: vec!["healing_draught".into()],
            vitals: Vitals {
                hp_current: -1,
                energy_current: 30,
            },
        }
    }

    fn assembler_with(source: StaticCharacterSource) -> (ContextAssembler, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new(Arc::new(ManualClock::at(0.0))));
        let source = Arc::new(source);
        (
            ContextAssembler::new(store.clone(), source.clone(), source.clone(), source),
            store,
        )
    }

    #[tokio::test]
    async fn assembles_math_loadout_and_vitals() {
        let mut source = StaticCharacterSource::default();
        source.insert(7, warrior());
        let (assembler, store) = assembler_with(source);

        let (keys_out, errors) = assembler
            .assemble(AssembleRequest {
                player_ids: vec![7],
                scope: Some(AssembleScope::Full),
                ..AssembleRequest::default()
            })
            .await
            .unwrap();
        assert!(errors.is_empty());
        let temp_key = keys_out.get(&7).unwrap();

        let doc = store.json_get(temp_key, "$").await.unwrap().unwrap();
        let template: SetupTemplate = serde_json::from_value(doc).unwrap();
        assert_eq!(template.name, "Grim");
        assert_eq!(template.vitals.energy_current, 30);

        let loadout = template.loadout.unwrap();
        assert_eq!(loadout.layout, WeaponLayout::OneHand);
        assert!(loadout.has_shield);
        assert_eq!(loadout.armor_type.as_deref(), Some("heavy"));

        // Weapon entry landed hand-prefixed, keyed by item id.
        let entry = template
            .math_model
            .modifiers
            .get("main_hand_damage_min")
            .unwrap();
        assert_eq!(entry.add.get("item:401"), Some(&4.0));
    }

    #[tokio::test]
    async fn unknown_entity_is_reported_not_fatal() {
        let mut source = StaticCharacterSource::default();
        source.insert(7, warrior());
        let (assembler, _store) = assembler_with(source);

        let (keys_out, errors) = assembler
            .assemble(AssembleRequest {
                player_ids: vec![7, 99],
                scope: Some(AssembleScope::Combat),
                ..AssembleRequest::default()
            })
            .await
            .unwrap();
        assert_eq!(keys_out.len(), 1);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].0, 99);
    }

    #[tokio::test]
    async fn temp_keys_expire() {
        let clock = Arc::new(ManualClock::at(0.0));
        let store = Arc::new(MemoryStore::new(clock.clone()));
        let mut chars = StaticCharacterSource::default();
        chars.insert(7, warrior());
        let source = Arc::new(chars);
        let assembler =
            ContextAssembler::new(store.clone(), source.clone(), source.clone(), source);

        let (keys_out, _) = assembler
            .assemble(AssembleRequest {
                player_ids: vec![7],
                ..AssembleRequest::default()
            })
            .await
            .unwrap();
        let temp_key = keys_out.get(&7).unwrap();
        assert!(store.key_exists(temp_key).await.unwrap());

        clock.advance(TEMP_SETUP_TTL_SECS as f64 + 1.0);
        assert!(!store.key_exists(temp_key).await.unwrap());
    }
}
