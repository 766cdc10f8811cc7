//! Per-session enemy visibility map.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::ActorId;

/// `{actor-id -> [enemy-id, ...]}`, one document per session.
///
/// Built at session creation from the opposing team rosters, shuffled.
/// Mutated only by atomic store scripts: a pop on exchange registration,
/// a full rewrite on hot-join. Only opposing-team ids ever appear and an
/// actor never lists itself.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetsMap(pub BTreeMap<String, Vec<ActorId>>);

impl TargetsMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enemy list for an actor; empty when exhausted or unknown.
    pub fn targets_of(&self, actor_id: ActorId) -> &[ActorId] {
        self.0
            .get(&actor_id.to_string())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn insert(&mut self, actor_id: ActorId, enemies: Vec<ActorId>) {
        self.0.insert(actor_id.to_string(), enemies);
    }

    /// Append a late joiner to every opponent's list and materialize a
    /// fresh list for the newcomer.
    pub fn hot_join(&mut self, joiner: ActorId, enemies: Vec<ActorId>) {
        for enemy in &enemies {
            if let Some(list) = self.0.get_mut(&enemy.to_string()) {
                if !list.contains(&joiner) {
                    list.push(joiner);
                }
            }
        }
        self.insert(joiner, enemies);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hot_join_adds_mutual_visibility() {
        let mut map = TargetsMap::new();
        map.insert(1, vec![-10]);
        map.insert(-10, vec![1]);

        map.hot_join(2, vec![-10]);

        assert_eq!(map.targets_of(2), &[-10]);
        assert_eq!(map.targets_of(-10), &[1, 2]);
        assert_eq!(map.targets_of(1), &[-10], "unrelated lists untouched");
    }

    #[test]
    fn exhausted_list_reads_as_empty_not_error() {
        let map = TargetsMap::new();
        assert!(map.targets_of(42).is_empty());
    }
}
