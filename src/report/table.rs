//! Plain text tables for terminal output.
//!
//! Fixed-width columns, ids and amounts right-aligned, timestamps in UTC.

use crate::ident::ResourceId;
use crate::query::TotalRow;
use crate::reconcile::ReconcileReport;
use crate::store::diff::{DiffResult, DiffType};
use crate::store::{BaselineRow, RootInfo, Snapshot};
use crate::util::{format_delta, format_timestamp};

use super::IngestLine;

pub fn render_totals(rows: &[TotalRow]) -> String {
    if rows.is_empty() {
        return String::from("No totals yet. Run 'stockpile ingest' first.\n");
    }

    let recent = rows.iter().any(|r| r.last_changed_snapshot.is_some());
    let mut output = String::new();
    if recent {
        output.push_str(&format!(
            "{:<32} {:>12} {:<11} {:>8} {:<20}\n",
            "Resource", "Amount", "Kind", "Changed", "At"
        ));
    } else {
        output.push_str(&format!("{:<32} {:>12} {:<11}\n", "Resource", "Amount", "Kind"));
    }
    output.push_str(&"-".repeat(if recent { 87 } else { 57 }));
    output.push('\n');

    for row in rows {
        let resource = truncate(row.resource_id.as_str(), 32);
        let kind = row.resource_kind.as_str();
        if recent {
            let changed = row
                .last_changed_snapshot
                .map(|id| format!("#{id}"))
                .unwrap_or_default();
            let at = row.last_changed_at.map(format_timestamp).unwrap_or_default();
            output.push_str(&format!(
                "{resource:<32} {:>12} {kind:<11} {changed:>8} {at:<20}\n",
                row.amount
            ));
        } else {
            output.push_str(&format!("{resource:<32} {:>12} {kind:<11}\n", row.amount));
        }
    }

    output.push_str(&format!("\n{} resources\n", rows.len()));
    output
}

pub fn render_roots(roots: &[RootInfo]) -> String {
    if roots.is_empty() {
        return String::from("No save roots seen yet.\n");
    }

    let mut output = format!("{:<32} {:<8} {:>8} {}\n", "Root", "Active", "Latest", "Name");
    output.push_str(&"-".repeat(64));
    output.push('\n');
    for root in roots {
        let latest = root
            .latest_snapshot
            .map(|id| format!("#{id}"))
            .unwrap_or_else(|| "-".to_string());
        output.push_str(&format!(
            "{:<32} {:<8} {latest:>8} {}\n",
            truncate(root.label.as_str(), 32),
            if root.active { "yes" } else { "no" },
            root.display_name.as_deref().unwrap_or("")
        ));
    }
    output
}

pub fn render_snapshots(snapshots: &[Snapshot]) -> String {
    if snapshots.is_empty() {
        return String::from("No snapshots found. Run 'stockpile ingest' to create one.\n");
    }

    let mut output = format!(
        "{:<6} {:<24} {:<20} {:<20} {}\n",
        "ID", "Root", "Captured", "Imported", "Source"
    );
    output.push_str(&"-".repeat(100));
    output.push('\n');
    for snapshot in snapshots {
        output.push_str(&format!(
            "{:<6} {:<24} {:<20} {:<20} {}\n",
            snapshot.id,
            truncate(snapshot.save_root.as_str(), 24),
            format_timestamp(snapshot.captured_at),
            format_timestamp(snapshot.imported_at),
            snapshot.source
        ));
    }
    output
}

pub fn render_diff(result: &DiffResult<ResourceId>) -> String {
    let mut output = String::from("\nComparing snapshots:\n");
    output.push_str(&format!(
        "  From: #{} ({})\n",
        result.from_id,
        format_timestamp(result.from_timestamp)
    ));
    output.push_str(&format!(
        "  To:   #{} ({})\n\n",
        result.to_id,
        format_timestamp(result.to_timestamp)
    ));

    if result.entries.is_empty() {
        output.push_str("No changes detected.\n");
        return output;
    }

    for diff_type in [DiffType::Gained, DiffType::Spent, DiffType::New, DiffType::Gone] {
        let mut entries: Vec<_> = result
            .entries
            .iter()
            .filter(|e| e.diff_type == diff_type)
            .collect();
        if entries.is_empty() {
            continue;
        }
        entries.sort_by_key(|e| std::cmp::Reverse(e.delta.unsigned_abs()));

        output.push_str(&format!("{}:\n", diff_type.as_str()));
        for entry in entries {
            let line = match diff_type {
                DiffType::Gained | DiffType::Spent => format!(
                    "  {} {} -> {} ({})\n",
                    entry.key,
                    entry.old_amount,
                    entry.new_amount,
                    format_delta(entry.delta)
                ),
                DiffType::New => format!("  {} appeared ({})\n", entry.key, entry.new_amount),
                DiffType::Gone => format!("  {} gone (was {})\n", entry.key, entry.old_amount),
            };
            output.push_str(&line);
        }
        output.push('\n');
    }

    output.push_str(&format!("Net change: {}\n", format_delta(result.net_change)));
    output
}

pub fn render_baseline(captured_at: i64, rows: &[BaselineRow]) -> String {
    let mut output = format!(
        "Baseline captured {} ({} rows)\n\n",
        format_timestamp(captured_at),
        rows.len()
    );
    output.push_str(&format!(
        "{:<24} {:<10} {:<9} {:<32} {:>10}\n",
        "Root", "Owner", "Inventory", "Resource", "Amount"
    ));
    output.push_str(&"-".repeat(89));
    output.push('\n');
    for row in rows {
        output.push_str(&format!(
            "{:<24} {:<10} {:<9} {:<32} {:>10}\n",
            truncate(row.save_root.as_str(), 24),
            truncate(&row.slot.owner, 10),
            row.slot.inventory.as_str(),
            truncate(row.slot.resource_id.as_str(), 32),
            row.slot.amount
        ));
    }
    output
}

pub fn render_reconcile(report: &ReconcileReport) -> String {
    let Some(baseline_at) = report.baseline_at else {
        return String::from("No baseline captured; nothing to reconcile.\n");
    };

    let mut output = format!("Baseline: {}\n", format_timestamp(baseline_at));
    output.push_str(&format!("Agreeing resources: {}\n", report.agreed));

    if report.is_consistent() {
        output.push_str("Snapshot and ledger totals agree.\n");
        return output;
    }

    output.push_str(&format!("\n{:<32} {:>12} {:>12} {:>10}\n", "Resource", "Snapshots", "Ledger", "Diff"));
    output.push_str(&"-".repeat(69));
    output.push('\n');
    for mismatch in &report.mismatches {
        let side = |v: Option<i64>| v.map(|n| n.to_string()).unwrap_or_else(|| "-".to_string());
        output.push_str(&format!(
            "{:<32} {:>12} {:>12} {:>10}\n",
            truncate(mismatch.resource_id.as_str(), 32),
            side(mismatch.snapshot_total),
            side(mismatch.ledger_total),
            format_delta(mismatch.difference())
        ));
    }
    output.push_str(&format!("\n{} resources disagree\n", report.mismatches.len()));
    output
}

pub fn render_ingest(lines: &[IngestLine]) -> String {
    if lines.is_empty() {
        return String::from("No documents found.\n");
    }

    let mut output = String::new();
    for line in lines {
        let id = line
            .snapshot_id
            .map(|id| format!("#{id}"))
            .unwrap_or_else(|| "-".to_string());
        output.push_str(&format!("{:<9} {id:>6} {:<24} {}", line.status, truncate(line.root.as_str(), 24), line.source));
        if let Some(detail) = &line.detail {
            output.push_str(&format!(" ({detail})"));
        }
        output.push('\n');
    }
    output
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_len - 3).collect();
        format!("{truncated}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ResourceKind;
    use std::collections::BTreeMap;

    #[test]
    fn long_names_truncated() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("ABCDEFGHIJKLMNOP", 10), "ABCDEFG...");
    }

    #[test]
    fn totals_table_lists_every_row() {
        let rows = vec![TotalRow {
            resource_id: ResourceId::new("FUEL1"),
            amount: -12,
            resource_kind: ResourceKind::Substance,
            last_changed_snapshot: None,
            last_changed_at: None,
        }];
        let text = render_totals(&rows);
        assert!(text.contains("FUEL1"));
        assert!(text.contains("-12"));
        assert!(text.contains("1 resources"));
    }

    #[test]
    fn diff_table_groups_by_change() {
        let from: BTreeMap<ResourceId, i64> = [(ResourceId::new("FUEL1"), 10)].into_iter().collect();
        let to: BTreeMap<ResourceId, i64> = [(ResourceId::new("OXYGEN"), 4)].into_iter().collect();
        let result = crate::store::diff::compare_totals(&from, &to, 1, 2, 0, 0);

        let text = render_diff(&result);
        assert!(text.contains("new:\n  OXYGEN appeared (4)"));
        assert!(text.contains("gone:\n  FUEL1 gone (was 10)"));
        assert!(text.contains("Net change: -6"));
    }
}
