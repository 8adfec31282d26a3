//! "Most recently changed" ordering without an event log.
//!
//! Each (root, owner, inventory, resource) key is replayed through its
//! history in snapshot order, comparing each observation with the previous
//! one. The last snapshot where the amount moved is the key's change point;
//! a key that never moved counts its latest observation.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

use crate::aggregate::{fold_rows, RowFilter};
use crate::error::Result;
use crate::ident::{ResourceId, RootLabel};
use crate::model::InventoryKind;
use crate::store::{ItemRow, Store};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecencyKey {
    pub root: RootLabel,
    pub owner: String,
    pub inventory: InventoryKind,
    pub resource_id: ResourceId,
}

/// A key's summed amount within one snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    pub snapshot_id: i64,
    pub amount: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankedResource {
    pub resource_id: ResourceId,
    pub last_changed_snapshot: i64,
    pub last_changed_at: Option<i64>,
}

/// Change point of one key's history. Observations may come in any order.
pub fn last_changed(observations: &[Observation]) -> Option<i64> {
    let mut ordered = observations.to_vec();
    ordered.sort_by_key(|obs| obs.snapshot_id);

    let mut previous: Option<i64> = None;
    let mut changed_at: Option<i64> = None;
    for obs in &ordered {
        if previous != Some(obs.amount) {
            changed_at = Some(obs.snapshot_id);
        }
        previous = Some(obs.amount);
    }

    // unchanged since first sight: the latest observation
    match (changed_at, ordered.last()) {
        (Some(id), Some(last)) if ordered.len() > 1 && id == ordered[0].snapshot_id => {
            Some(last.snapshot_id)
        }
        (changed, _) => changed,
    }
}

/// Resources seen in the given roots, most recently changed first; ties by
/// resource id.
pub fn rank(store: &Store, roots: &[RootLabel], filter: &RowFilter) -> Result<Vec<RankedResource>> {
    let mut histories: HashMap<RecencyKey, Vec<Observation>> = HashMap::new();

    for root in roots {
        let items = store.history_items(root)?;
        // one observation per key per snapshot
        let per_snapshot = observations_by_snapshot(&items, filter, root);
        for ((snapshot_id, key), amount) in per_snapshot {
            histories
                .entry(key)
                .or_default()
                .push(Observation { snapshot_id, amount });
        }
    }

    let mut by_resource: BTreeMap<ResourceId, i64> = BTreeMap::new();
    for (key, observations) in &histories {
        if let Some(changed) = last_changed(observations) {
            let best = by_resource.entry(key.resource_id.clone()).or_insert(changed);
            *best = (*best).max(changed);
        }
    }

    let mut captured: HashMap<i64, Option<i64>> = HashMap::new();
    let mut ranked = Vec::with_capacity(by_resource.len());
    for (resource_id, snapshot_id) in by_resource {
        let last_changed_at = match captured.get(&snapshot_id) {
            Some(at) => *at,
            None => {
                let at = store.get_snapshot(snapshot_id)?.map(|s| s.captured_at);
                captured.insert(snapshot_id, at);
                at
            }
        };
        ranked.push(RankedResource {
            resource_id,
            last_changed_snapshot: snapshot_id,
            last_changed_at,
        });
    }

    ranked.sort_by(|a, b| {
        b.last_changed_snapshot
            .cmp(&a.last_changed_snapshot)
            .then_with(|| a.resource_id.cmp(&b.resource_id))
    });
    Ok(ranked)
}

fn observations_by_snapshot(
    items: &[ItemRow],
    filter: &RowFilter,
    root: &RootLabel,
) -> BTreeMap<(i64, RecencyKey), i64> {
    let mut sums = BTreeMap::new();
    let mut start = 0;
    while start < items.len() {
        let snapshot_id = items[start].snapshot_id;
        let end = items[start..]
            .iter()
            .position(|row| row.snapshot_id != snapshot_id)
            .map_or(items.len(), |n| start + n);

        let folded = fold_rows(items[start..end].iter().map(|row| &row.slot), filter, |slot| {
            RecencyKey {
                root: root.clone(),
                owner: slot.owner.clone(),
                inventory: slot.inventory,
                resource_id: slot.resource_id.clone(),
            }
        });
        for (key, tally) in folded {
            sums.insert((snapshot_id, key), tally.amount);
        }
        start = end;
    }
    sums
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(pairs: &[(i64, i64)]) -> Vec<Observation> {
        pairs
            .iter()
            .map(|&(snapshot_id, amount)| Observation { snapshot_id, amount })
            .collect()
    }

    #[test]
    fn change_point_is_last_movement() {
        assert_eq!(last_changed(&obs(&[(1, 5), (2, 5), (3, 8)])), Some(3));
        assert_eq!(last_changed(&obs(&[(1, 5), (2, 8), (3, 8)])), Some(2));
    }

    #[test]
    fn single_observation_is_its_own_change() {
        assert_eq!(last_changed(&obs(&[(4, 10)])), Some(4));
    }

    #[test]
    fn never_changed_counts_latest_observation() {
        assert_eq!(last_changed(&obs(&[(1, 5), (2, 5), (6, 5)])), Some(6));
    }

    #[test]
    fn order_of_input_does_not_matter() {
        assert_eq!(last_changed(&obs(&[(3, 8), (1, 5), (2, 5)])), Some(3));
        assert_eq!(last_changed(&[]), None);
    }
}
