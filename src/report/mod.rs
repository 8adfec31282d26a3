pub mod json;
pub mod table;

use serde::Serialize;

use crate::error::Result;
use crate::ident::RootLabel;
use crate::ingest::{IngestOutcome, RootRun, RunOutcome};

/// Print either pretty JSON or the table rendering of `value`.
pub fn print<T, F>(json_output: bool, value: &T, render_table: F) -> Result<()>
where
    T: Serialize + ?Sized,
    F: FnOnce(&T) -> String,
{
    if json_output {
        println!("{}", json::render(value)?);
    } else {
        print!("{}", render_table(value));
    }
    Ok(())
}

/// One line of ingest output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestLine {
    pub root: RootLabel,
    pub source: String,
    pub status: &'static str,
    pub snapshot_id: Option<i64>,
    pub rows: Option<usize>,
    pub detail: Option<String>,
}

impl IngestLine {
    pub fn is_failure(&self) -> bool {
        self.status == "failed"
    }
}

/// Flatten batch results into printable lines, one per document (or one per
/// root when the whole root run did not happen).
pub fn ingest_lines(runs: &[RootRun]) -> Vec<IngestLine> {
    let mut lines = Vec::new();
    for run in runs {
        let items = match &run.outcome {
            Ok(RunOutcome::Finished(items)) => items,
            Ok(RunOutcome::Busy) => {
                lines.push(IngestLine {
                    root: run.root.clone(),
                    source: String::new(),
                    status: "busy",
                    snapshot_id: None,
                    rows: None,
                    detail: Some("another ingest for this root is running".to_string()),
                });
                continue;
            }
            Err(e) => {
                lines.push(IngestLine {
                    root: run.root.clone(),
                    source: String::new(),
                    status: "failed",
                    snapshot_id: None,
                    rows: None,
                    detail: Some(e.to_string()),
                });
                continue;
            }
        };

        for item in items {
            let line = match &item.outcome {
                Ok(IngestOutcome::Skipped { snapshot_id }) => IngestLine {
                    root: run.root.clone(),
                    source: item.source.clone(),
                    status: "unchanged",
                    snapshot_id: Some(*snapshot_id),
                    rows: None,
                    detail: None,
                },
                Ok(IngestOutcome::Ingested {
                    snapshot_id,
                    rows,
                    replaced,
                    dropped_tokens,
                }) => IngestLine {
                    root: run.root.clone(),
                    source: item.source.clone(),
                    status: if *replaced > 0 { "replaced" } else { "ingested" },
                    snapshot_id: Some(*snapshot_id),
                    rows: Some(*rows),
                    detail: (*dropped_tokens > 0)
                        .then(|| format!("{dropped_tokens} progress tokens dropped")),
                },
                Err(e) => IngestLine {
                    root: run.root.clone(),
                    source: item.source.clone(),
                    status: "failed",
                    snapshot_id: None,
                    rows: None,
                    detail: Some(e.to_string()),
                },
            };
            lines.push(line);
        }
    }
    lines
}
