//! Read-side entry points: validated requests in, serializable rows out.

use serde::Serialize;
use std::collections::HashMap;

use crate::aggregate::{self, RootSelection, RowFilter, Scope};
use crate::error::Result;
use crate::ident::{ResourceId, RootLabel};
use crate::ledger;
use crate::model::ResourceKind;
use crate::recency;
use crate::store::Store;

/// A totals request as received from a caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TotalsRequest {
    pub scope: Option<String>,
    pub include_tech: bool,
    pub root: Option<String>,
    pub recent_first: bool,
}

/// The request after validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidTotals {
    pub filter: RowFilter,
    pub selection: RootSelection,
    pub recent_first: bool,
}

impl TotalsRequest {
    /// Reject malformed scope and root names before anything touches the store.
    pub fn validate(&self) -> Result<ValidTotals> {
        let scope = self
            .scope
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(Scope::parse)
            .transpose()?;
        let selection = match self.root.as_deref().map(str::trim).filter(|r| !r.is_empty()) {
            Some(raw) => RootSelection::Root(RootLabel::parse(raw)?),
            None => RootSelection::AllActive,
        };
        Ok(ValidTotals {
            filter: RowFilter::new(scope, self.include_tech),
            selection,
            recent_first: self.recent_first,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TotalRow {
    pub resource_id: ResourceId,
    pub amount: i64,
    pub resource_kind: ResourceKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_changed_snapshot: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_changed_at: Option<i64>,
}

/// Current totals for the request, ordered by resource id, or by recency
/// when `recent_first` is set.
pub fn totals(store: &Store, request: &TotalsRequest) -> Result<Vec<TotalRow>> {
    let valid = request.validate()?;
    let current = aggregate::current_totals(store, &valid.selection, &valid.filter)?;

    let rows: Vec<TotalRow> = current
        .into_values()
        .map(|total| TotalRow {
            resource_id: total.resource_id,
            amount: total.amount,
            resource_kind: total.resource_kind,
            last_changed_snapshot: None,
            last_changed_at: None,
        })
        .collect();

    if !valid.recent_first {
        return Ok(rows);
    }

    // rank within the roots that fed the totals
    let roots: Vec<RootLabel> = aggregate::resolve(store, &valid.selection)?
        .into_iter()
        .map(|snapshot| snapshot.save_root)
        .collect();
    let ranking = recency::rank(store, &roots, &valid.filter)?;
    Ok(order_by_recency(rows, &ranking))
}

fn order_by_recency(rows: Vec<TotalRow>, ranking: &[recency::RankedResource]) -> Vec<TotalRow> {
    let by_id: HashMap<&ResourceId, &recency::RankedResource> =
        ranking.iter().map(|rank| (&rank.resource_id, rank)).collect();

    let mut rows: Vec<TotalRow> = rows
        .into_iter()
        .map(|mut row| {
            if let Some(rank) = by_id.get(&row.resource_id) {
                row.last_changed_snapshot = Some(rank.last_changed_snapshot);
                row.last_changed_at = rank.last_changed_at;
            }
            row
        })
        .collect();

    rows.sort_by(|a, b| {
        b.last_changed_snapshot
            .cmp(&a.last_changed_snapshot)
            .then_with(|| a.resource_id.cmp(&b.resource_id))
    });
    rows
}

/// Baseline+ledger totals in the same row shape.
pub fn ledger_totals(store: &Store, include_tech: bool) -> Result<Vec<TotalRow>> {
    Ok(ledger::current_totals(store, include_tech)?
        .into_values()
        .map(|total| TotalRow {
            resource_id: total.resource_id,
            amount: total.amount,
            resource_kind: total.resource_kind,
            last_changed_snapshot: None,
            last_changed_at: None,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn bad_scope_rejected_before_query() {
        let request = TotalsRequest {
            scope: Some("moon".into()),
            ..TotalsRequest::default()
        };
        assert!(matches!(request.validate(), Err(Error::InvalidScope(_))));
    }

    #[test]
    fn bad_root_rejected_before_query() {
        let request = TotalsRequest {
            root: Some("st 1".into()),
            ..TotalsRequest::default()
        };
        assert!(matches!(request.validate(), Err(Error::InvalidRoot(_))));
    }

    #[test]
    fn blank_fields_mean_unset() {
        let valid = TotalsRequest {
            scope: Some(" ".into()),
            root: Some(String::new()),
            include_tech: true,
            recent_first: false,
        }
        .validate()
        .unwrap();
        assert_eq!(valid.selection, RootSelection::AllActive);
        assert_eq!(valid.filter, RowFilter::new(None, true));
    }

    fn row(id: &str, amount: i64) -> TotalRow {
        TotalRow {
            resource_id: ResourceId::new(id),
            amount,
            resource_kind: ResourceKind::Substance,
            last_changed_snapshot: None,
            last_changed_at: None,
        }
    }

    #[test]
    fn recency_ranks_attached_by_resource() {
        let ranking = vec![
            recency::RankedResource {
                resource_id: ResourceId::new("OXYGEN"),
                last_changed_snapshot: 9,
                last_changed_at: Some(900),
            },
            recency::RankedResource {
                resource_id: ResourceId::new("FUEL1"),
                last_changed_snapshot: 4,
                last_changed_at: Some(400),
            },
        ];
        let ordered = order_by_recency(vec![row("CARBON", 1), row("FUEL1", 2), row("OXYGEN", 3)], &ranking);

        let ids: Vec<(&str, Option<i64>)> = ordered
            .iter()
            .map(|r| (r.resource_id.as_str(), r.last_changed_snapshot))
            .collect();
        assert_eq!(ids, vec![("OXYGEN", Some(9)), ("FUEL1", Some(4)), ("CARBON", None)]);
        assert_eq!(ordered[0].last_changed_at, Some(900));
    }

    #[test]
    fn empty_store_gives_empty_totals() {
        let store = Store::open_in_memory().unwrap();
        let rows = totals(
            &store,
            &TotalsRequest {
                recent_first: true,
                ..TotalsRequest::default()
            },
        )
        .unwrap();
        assert!(rows.is_empty());
        assert!(ledger_totals(&store, false).unwrap().is_empty());
    }
}
