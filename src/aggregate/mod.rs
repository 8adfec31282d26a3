//! Canonical aggregation.
//!
//! Every total in the crate goes through `fold_rows`: the active-root view,
//! per-snapshot totals for diffs, baseline sums and ledger derivation. The
//! ledger path is checked against this one by `reconcile`.

pub mod latest;
pub mod scope;

pub use latest::{latest_by_root, resolve, RootSelection};
pub use scope::{RowFilter, Scope};

use serde::Serialize;
use std::collections::BTreeMap;

use crate::error::Result;
use crate::ident::ResourceId;
use crate::model::{ResourceKind, SlotRecord};
use crate::store::Store;

/// One line of a totals response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceTotal {
    pub resource_id: ResourceId,
    pub amount: i64,
    pub resource_kind: ResourceKind,
}

/// Running sum for one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tally {
    pub amount: i64,
    pub resource_kind: ResourceKind,
}

impl Tally {
    fn add(&mut self, amount: i64, kind: ResourceKind) {
        self.amount = self.amount.saturating_add(amount);
        if self.resource_kind == ResourceKind::Unknown {
            self.resource_kind = kind;
        }
    }
}

/// Sum admitted rows under a caller-chosen key.
pub fn fold_rows<'a, K, I, F>(rows: I, filter: &RowFilter, key: F) -> BTreeMap<K, Tally>
where
    K: Ord,
    I: IntoIterator<Item = &'a SlotRecord>,
    F: Fn(&SlotRecord) -> K,
{
    let mut totals: BTreeMap<K, Tally> = BTreeMap::new();
    for slot in rows.into_iter().filter(|slot| filter.admits(slot)) {
        totals
            .entry(key(slot))
            .or_insert(Tally {
                amount: 0,
                resource_kind: ResourceKind::Unknown,
            })
            .add(slot.amount, slot.resource_kind);
    }
    totals
}

pub fn sum_by_resource<'a, I>(rows: I, filter: &RowFilter) -> BTreeMap<ResourceId, Tally>
where
    I: IntoIterator<Item = &'a SlotRecord>,
{
    fold_rows(rows, filter, |slot| slot.resource_id.clone())
}

/// Merge one root's per-resource sums into a combined map.
fn merge_into(combined: &mut BTreeMap<ResourceId, Tally>, part: BTreeMap<ResourceId, Tally>) {
    for (id, tally) in part {
        combined
            .entry(id)
            .or_insert(Tally {
                amount: 0,
                resource_kind: ResourceKind::Unknown,
            })
            .add(tally.amount, tally.resource_kind);
    }
}

/// Totals of one snapshot.
pub fn snapshot_totals(
    store: &Store,
    snapshot_id: i64,
    filter: &RowFilter,
) -> Result<BTreeMap<ResourceId, Tally>> {
    let items = store.load_items(snapshot_id)?;
    Ok(sum_by_resource(&items, filter))
}

/// Current totals across the selected roots' latest snapshots: summed per
/// root, then across roots. Resources with no admitted rows are absent.
pub fn current_totals(
    store: &Store,
    selection: &RootSelection,
    filter: &RowFilter,
) -> Result<BTreeMap<ResourceId, ResourceTotal>> {
    let mut combined = BTreeMap::new();
    for snapshot in resolve(store, selection)? {
        merge_into(&mut combined, snapshot_totals(store, snapshot.id, filter)?);
    }

    Ok(combined
        .into_iter()
        .map(|(resource_id, tally)| {
            let total = ResourceTotal {
                resource_id: resource_id.clone(),
                amount: tally.amount,
                resource_kind: tally.resource_kind,
            };
            (resource_id, total)
        })
        .collect())
}

/// Bare amounts, for comparison.
pub fn amounts<V, F>(totals: &BTreeMap<ResourceId, V>, amount: F) -> BTreeMap<ResourceId, i64>
where
    F: Fn(&V) -> i64,
{
    totals.iter().map(|(id, v)| (id.clone(), amount(v))).collect()
}
