use tracing::debug;

use crate::error::Result;
use crate::ident::RootLabel;
use crate::store::{Snapshot, Store};

/// Which roots a query draws from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RootSelection {
    AllActive,
    Root(RootLabel),
}

/// Latest snapshot per root. Roots without snapshots contribute nothing.
pub fn latest_by_root(store: &Store, roots: &[RootLabel]) -> Result<Vec<Snapshot>> {
    let mut latest = Vec::with_capacity(roots.len());
    for root in roots {
        if let Some(snapshot) = store.latest_for_root(root)? {
            latest.push(snapshot);
        }
    }
    Ok(latest)
}

/// Snapshots feeding a query.
///
/// An explicit root is used whether or not it is active. In all-active mode,
/// when no active root resolves, the most recent import anywhere stands in
/// so the view is not empty while anything has been imported.
pub fn resolve(store: &Store, selection: &RootSelection) -> Result<Vec<Snapshot>> {
    match selection {
        RootSelection::Root(root) => latest_by_root(store, std::slice::from_ref(root)),
        RootSelection::AllActive => {
            let roots = store.active_roots()?;
            let latest = latest_by_root(store, &roots)?;
            if !latest.is_empty() {
                return Ok(latest);
            }

            let fallback = store.most_recent_import()?;
            if let Some(snapshot) = &fallback {
                debug!(
                    snapshot_id = snapshot.id,
                    root = %snapshot.save_root,
                    "no active root resolved, using most recent import"
                );
            }
            Ok(fallback.into_iter().collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::SnapshotPayload;

    fn ingest(store: &mut Store, source: &str, root: &str, captured_at: i64, imported_at: i64) -> i64 {
        let payload =
            SnapshotPayload::new(source, RootLabel::parse(root).unwrap(), captured_at, vec![]).unwrap();
        store.write_snapshot(&payload, &[], imported_at).unwrap().0
    }

    #[test]
    fn picks_greatest_id_per_root() {
        let mut store = Store::open_in_memory().unwrap();
        ingest(&mut store, "a.hg", "st_1", 100, 1);
        let newest_a = ingest(&mut store, "a.hg", "st_1", 200, 2);
        let only_b = ingest(&mut store, "b.hg", "st_2", 100, 3);

        let picked = resolve(&store, &RootSelection::AllActive).unwrap();
        let ids: Vec<i64> = picked.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![newest_a, only_b]);
    }

    #[test]
    fn root_without_snapshots_yields_nothing() {
        let store = Store::open_in_memory().unwrap();
        let root = RootLabel::parse("st_9").unwrap();
        store.ensure_root(&root, 0).unwrap();
        assert!(latest_by_root(&store, &[root.clone()]).unwrap().is_empty());
        assert!(resolve(&store, &RootSelection::Root(root)).unwrap().is_empty());
        assert!(resolve(&store, &RootSelection::AllActive).unwrap().is_empty());
    }

    #[test]
    fn falls_back_to_most_recent_import() {
        let mut store = Store::open_in_memory().unwrap();
        ingest(&mut store, "a.hg", "st_1", 100, 10);
        let recent = ingest(&mut store, "b.hg", "st_2", 50, 20);
        for root in ["st_1", "st_2"] {
            store.set_active(&RootLabel::parse(root).unwrap(), false).unwrap();
        }

        let picked = resolve(&store, &RootSelection::AllActive).unwrap();
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].id, recent);
    }

    #[test]
    fn explicit_root_ignores_active_flag() {
        let mut store = Store::open_in_memory().unwrap();
        let id = ingest(&mut store, "a.hg", "st_1", 100, 10);
        let root = RootLabel::parse("ST_1").unwrap();
        store.set_active(&root, false).unwrap();

        let picked = resolve(&store, &RootSelection::Root(root)).unwrap();
        assert_eq!(picked[0].id, id);
    }
}
