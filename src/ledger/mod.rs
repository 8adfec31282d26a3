//! Baseline + ledger accounting.
//!
//! Current total of a resource = its sum in the latest baseline capture plus
//! every ledger delta applied at or after that capture. The ledger is derived
//! from the snapshot store (`session::sync`), so this path is a cache over
//! the canonical aggregation, not an independent source of truth.

pub mod baseline;
pub mod session;

pub use baseline::{capture, import_payload, select, BaselineCapture, BaselinePick};
pub use session::{coalesce, sync, LedgerKey, Session, SyncSummary};

use std::collections::BTreeMap;

use crate::aggregate::{fold_rows, ResourceTotal, RowFilter, Tally};
use crate::error::Result;
use crate::ident::ResourceId;
use crate::model::ResourceKind;
use crate::store::{LedgerDelta, Store};

/// Baseline+ledger totals. No baseline yet means an empty map.
pub fn current_totals(store: &Store, include_tech: bool) -> Result<BTreeMap<ResourceId, ResourceTotal>> {
    let Some(baseline_at) = store.latest_baseline_at()? else {
        return Ok(BTreeMap::new());
    };

    let rows = store.baseline_rows_at(baseline_at)?;
    let filter = RowFilter::new(None, include_tech);
    let mut totals = fold_rows(rows.iter().map(|row| &row.slot), &filter, |slot| {
        slot.resource_id.clone()
    });

    let deltas = store.deltas_since(baseline_at)?;
    apply_deltas(&mut totals, &deltas, include_tech);

    Ok(totals
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

fn apply_deltas(totals: &mut BTreeMap<ResourceId, Tally>, deltas: &[LedgerDelta], include_tech: bool) {
    for delta in deltas {
        if !include_tech && delta.is_tech() {
            continue;
        }
        let tally = totals.entry(delta.resource_id.clone()).or_insert(Tally {
            amount: 0,
            resource_kind: delta.resource_kind,
        });
        tally.amount = tally.amount.saturating_add(delta.delta);
        if tally.resource_kind == ResourceKind::Unknown {
            tally.resource_kind = delta.resource_kind;
        }
    }
}

/// Append a hand-recorded delta.
pub fn record(store: &mut Store, delta: LedgerDelta) -> Result<()> {
    store.append_deltas(std::slice::from_ref(&delta))?;
    tracing::info!(
        resource = %delta.resource_id,
        delta = delta.delta,
        applied_at = delta.applied_at,
        "recorded ledger delta"
    );
    Ok(())
}
