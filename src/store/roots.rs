use rusqlite::params;
use serde::Serialize;

use super::Store;
use crate::error::{Error, Result};
use crate::ident::RootLabel;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RootInfo {
    pub label: RootLabel,
    pub active: bool,
    pub display_name: Option<String>,
    pub latest_snapshot: Option<i64>,
}

impl Store {
    /// Register a root if it is not known yet. New roots start active.
    pub fn ensure_root(&self, root: &RootLabel, seen_at: i64) -> Result<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO save_roots (label, active, first_seen) VALUES (?1, 1, ?2)",
            params![root.as_str(), seen_at],
        )?;
        Ok(())
    }

    pub fn set_active(&self, root: &RootLabel, active: bool) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE save_roots SET active = ?2 WHERE lower(trim(label)) = ?1",
            params![root.as_str(), active],
        )?;
        if changed == 0 {
            return Err(Error::UnknownRoot(root.to_string()));
        }
        Ok(())
    }

    /// Set or clear the human-readable name shown next to a root.
    pub fn set_display_name(&self, root: &RootLabel, name: Option<&str>) -> Result<()> {
        let name = name.map(str::trim).filter(|n| !n.is_empty());
        let changed = self.conn.execute(
            "UPDATE save_roots SET display_name = ?2 WHERE lower(trim(label)) = ?1",
            params![root.as_str(), name],
        )?;
        if changed == 0 {
            return Err(Error::UnknownRoot(root.to_string()));
        }
        Ok(())
    }

    pub fn root_exists(&self, root: &RootLabel) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM save_roots WHERE lower(trim(label)) = ?1",
            params![root.as_str()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Labels of all roots with the active flag set, sorted.
    pub fn active_roots(&self) -> Result<Vec<RootLabel>> {
        let mut stmt = self
            .conn
            .prepare("SELECT label FROM save_roots WHERE active = 1")?;
        let mut roots = stmt
            .query_map([], |row| Ok(RootLabel::from_stored(row.get(0)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        roots.sort();
        roots.dedup();
        Ok(roots)
    }

    pub fn list_roots(&self) -> Result<Vec<RootInfo>> {
        // legacy spellings of one label collapse into a single entry
        let mut stmt = self.conn.prepare(
            "SELECT lower(trim(r.label)) AS norm, MAX(r.active), MAX(r.display_name), MAX(s.id)
             FROM save_roots r
             LEFT JOIN snapshots s ON lower(trim(s.save_root)) = lower(trim(r.label))
             GROUP BY norm
             ORDER BY norm",
        )?;
        let roots = stmt
            .query_map([], |row| {
                Ok(RootInfo {
                    label: RootLabel::from_stored(row.get(0)?),
                    active: row.get(1)?,
                    display_name: row.get(2)?,
                    latest_snapshot: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(roots)
    }
}
