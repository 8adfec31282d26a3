//! Cross-check of the two accounting paths.
//!
//! The snapshot aggregation is canonical. A resource missing on one side
//! counts as zero there; any difference in amount is reported, never
//! corrected.

use serde::Serialize;
use std::collections::BTreeSet;
use tracing::warn;

use crate::aggregate::{self, RootSelection, RowFilter};
use crate::error::Result;
use crate::ident::ResourceId;
use crate::ledger;
use crate::store::Store;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Mismatch {
    pub resource_id: ResourceId,
    pub snapshot_total: Option<i64>,
    pub ledger_total: Option<i64>,
}

impl Mismatch {
    pub fn difference(&self) -> i64 {
        self.ledger_total
            .unwrap_or(0)
            .saturating_sub(self.snapshot_total.unwrap_or(0))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// `None` when no baseline exists and there is nothing to compare.
    pub baseline_at: Option<i64>,
    pub agreed: usize,
    pub mismatches: Vec<Mismatch>,
}

impl ReconcileReport {
    pub fn is_consistent(&self) -> bool {
        self.mismatches.is_empty()
    }
}

pub fn reconcile(store: &Store, include_tech: bool) -> Result<ReconcileReport> {
    let Some(baseline_at) = store.latest_baseline_at()? else {
        return Ok(ReconcileReport {
            baseline_at: None,
            agreed: 0,
            mismatches: Vec::new(),
        });
    };

    let filter = RowFilter::new(None, include_tech);
    let canonical = aggregate::amounts(
        &aggregate::current_totals(store, &RootSelection::AllActive, &filter)?,
        |t| t.amount,
    );
    let ledger = aggregate::amounts(&ledger::current_totals(store, include_tech)?, |t| t.amount);

    let ids: BTreeSet<&ResourceId> = canonical.keys().chain(ledger.keys()).collect();
    let mut agreed = 0;
    let mut mismatches = Vec::new();
    for id in ids {
        let snapshot_total = canonical.get(id).copied();
        let ledger_total = ledger.get(id).copied();
        if snapshot_total.unwrap_or(0) == ledger_total.unwrap_or(0) {
            agreed += 1;
            continue;
        }
        warn!(
            resource = %id,
            snapshot_total = snapshot_total.unwrap_or(0),
            ledger_total = ledger_total.unwrap_or(0),
            "accounting paths disagree"
        );
        mismatches.push(Mismatch {
            resource_id: id.clone(),
            snapshot_total,
            ledger_total,
        });
    }

    Ok(ReconcileReport {
        baseline_at: Some(baseline_at),
        agreed,
        mismatches,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ident::RootLabel;
    use crate::model::{InventoryKind, ResourceKind, SlotRecord};
    use crate::payload::SnapshotPayload;
    use crate::store::LedgerDelta;
    use std::time::Duration;

    fn slot(x: i64, id: &str, amount: i64) -> SlotRecord {
        SlotRecord {
            owner: "SUIT".into(),
            inventory: InventoryKind::General,
            container: String::new(),
            x,
            y: 0,
            resource_id: ResourceId::new(id),
            amount,
            resource_kind: ResourceKind::Substance,
        }
    }

    fn ingest(store: &mut Store, captured_at: i64, slots: Vec<SlotRecord>) {
        let payload =
            SnapshotPayload::new("st_1/save.hg", RootLabel::parse("st_1").unwrap(), captured_at, slots).unwrap();
        store.write_snapshot(&payload, &payload.slots, captured_at).unwrap();
    }

    #[test]
    fn nothing_to_compare_without_baseline() {
        let store = Store::open_in_memory().unwrap();
        let report = reconcile(&store, false).unwrap();
        assert_eq!(report.baseline_at, None);
        assert!(report.is_consistent());
    }

    #[test]
    fn derived_ledger_agrees_with_snapshots() {
        let mut store = Store::open_in_memory().unwrap();
        ingest(&mut store, 100, vec![slot(0, "FUEL1", 100), slot(1, "CARBON", 8)]);
        ledger::capture(&mut store, 150).unwrap();
        ingest(&mut store, 2000, vec![slot(0, "FUEL1", 40), slot(2, "OXYGEN", 9)]);
        ledger::sync(&mut store, Duration::from_secs(600)).unwrap();

        let report = reconcile(&store, false).unwrap();
        assert!(report.is_consistent(), "{:?}", report.mismatches);
        assert_eq!(report.agreed, 3);
    }

    #[test]
    fn stray_delta_is_reported() {
        let mut store = Store::open_in_memory().unwrap();
        ingest(&mut store, 100, vec![slot(0, "FUEL1", 100)]);
        ledger::capture(&mut store, 150).unwrap();
        store
            .append_deltas(&[LedgerDelta {
                resource_id: ResourceId::new("FUEL1"),
                resource_kind: ResourceKind::Substance,
                owner: "SUIT".into(),
                inventory: InventoryKind::General,
                delta: 5,
                applied_at: 200,
                session_start: None,
                session_end: None,
                snapshot_id: None,
                save_root: None,
            }])
            .unwrap();

        let report = reconcile(&store, false).unwrap();
        assert_eq!(
            report.mismatches,
            vec![Mismatch {
                resource_id: ResourceId::new("FUEL1"),
                snapshot_total: Some(100),
                ledger_total: Some(105),
            }]
        );
        assert_eq!(report.mismatches[0].difference(), 5);
    }
}
