use clap::Parser;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use stockpile::aggregate::{self, RowFilter, Scope};
use stockpile::cli::{
    BaselineCommand, Cli, Command, DiffArgs, LedgerCommand, RecordArgs, RootsCommand, SnapshotsCommand,
};
use stockpile::config::Config;
use stockpile::ident::{ResourceId, RootLabel};
use stockpile::ingest::{self, IngestGate};
use stockpile::ledger::{self, BaselinePick};
use stockpile::model::{normalize_owner, InventoryKind, ResourceKind};
use stockpile::query::{self, TotalsRequest};
use stockpile::report::{self, table, IngestLine};
use stockpile::store::diff::compare_totals;
use stockpile::store::{BaselineRow, LedgerDelta, Store};
use stockpile::{payload, reconcile, util, Error, Result};

/// Exit status when the two accounting paths disagree.
const EXIT_MISMATCH: i32 = 3;

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn open_store(config: &Config) -> Result<Store> {
    let store = Store::open(&config.database, config.busy_timeout)?;
    config.apply_root_names(&store)?;
    Ok(store)
}

fn parse_root(raw: &str) -> Result<RootLabel> {
    RootLabel::parse(raw)
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(if e.is_bad_request() { 2 } else { 1 });
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(db) = cli.db {
        config.database = db;
    }

    match cli.command {
        Command::Ingest(args) => {
            let documents = payload::discover(&args.paths);
            let mut payloads = Vec::with_capacity(documents.len());
            let mut lines: Vec<IngestLine> = Vec::new();
            for path in &documents {
                match payload::load(path) {
                    Ok(p) => payloads.push(p),
                    Err(e) => {
                        let source = path.display().to_string();
                        lines.push(IngestLine {
                            root: payload::derive_save_root(&source),
                            source,
                            status: "failed",
                            snapshot_id: None,
                            rows: None,
                            detail: Some(e.to_string()),
                        });
                    }
                }
            }

            // schema exists before workers open their own connections
            let store = open_store(&config)?;
            let gate = IngestGate::new();
            let runs = ingest::ingest_batch(
                &config.database,
                config.busy_timeout,
                payloads,
                &gate,
                util::now_secs(),
            );
            lines.extend(report::ingest_lines(&runs));
            config.apply_root_names(&store)?;

            report::print(args.output.json, lines.as_slice(), table::render_ingest)?;
            Ok(if lines.iter().any(IngestLine::is_failure) { 1 } else { 0 })
        }

        Command::Totals(args) => {
            let store = open_store(&config)?;
            let include_tech = args.tech || config.include_tech;
            let rows = if args.ledger {
                query::ledger_totals(&store, include_tech)?
            } else {
                query::totals(
                    &store,
                    &TotalsRequest {
                        scope: args.scope,
                        include_tech,
                        root: args.root,
                        recent_first: args.recent,
                    },
                )?
            };
            report::print(args.output.json, rows.as_slice(), table::render_totals)?;
            Ok(0)
        }

        Command::Roots(command) => {
            let store = open_store(&config)?;
            match command {
                RootsCommand::List(output) => {
                    let roots = store.list_roots()?;
                    report::print(output.json, roots.as_slice(), table::render_roots)?;
                }
                RootsCommand::Activate { root } => {
                    let root = parse_root(&root)?;
                    store.set_active(&root, true)?;
                    println!("{root} active");
                }
                RootsCommand::Deactivate { root } => {
                    let root = parse_root(&root)?;
                    store.set_active(&root, false)?;
                    println!("{root} inactive");
                }
                RootsCommand::Rename { root, name } => {
                    let root = parse_root(&root)?;
                    store.set_display_name(&root, name.as_deref())?;
                }
            }
            Ok(0)
        }

        Command::Snapshots(command) => {
            let mut store = open_store(&config)?;
            match command {
                SnapshotsCommand::List { root, output } => {
                    let root = root.as_deref().map(parse_root).transpose()?;
                    let snapshots = store.list_snapshots(root.as_ref())?;
                    report::print(output.json, snapshots.as_slice(), table::render_snapshots)?;
                }
                SnapshotsCommand::Delete { id } => {
                    if !store.delete_snapshot(id)? {
                        return Err(Error::InvalidArgument(format!("snapshot {id} not found")));
                    }
                    println!("deleted snapshot #{id}");
                }
                SnapshotsCommand::Diff(args) => diff(&store, args)?,
            }
            Ok(0)
        }

        Command::Baseline(command) => {
            let mut store = open_store(&config)?;
            match command {
                BaselineCommand::Capture(output) => {
                    let captured = ledger::capture(&mut store, util::now_secs())?;
                    report::print(output.json, &captured, |c| {
                        format!(
                            "captured baseline at {}: {} rows from {} roots\n",
                            util::format_timestamp(c.captured_at),
                            c.rows,
                            c.roots.len()
                        )
                    })?;
                }
                BaselineCommand::Import { path } => {
                    let payload = payload::load(&path)?;
                    let imported = ledger::import_payload(&mut store, &payload)?;
                    println!(
                        "imported baseline at {}: {} rows",
                        util::format_timestamp(imported.captured_at),
                        imported.rows
                    );
                }
                BaselineCommand::Show { pick, output } => {
                    let pick: BaselinePick = pick.parse()?;
                    match ledger::select(&store, pick)? {
                        Some((captured_at, rows)) => {
                            let view = BaselineView { captured_at, rows };
                            report::print(output.json, &view, |v| table::render_baseline(v.captured_at, &v.rows))?;
                        }
                        None if output.json => println!("null"),
                        None => println!("No baseline captured."),
                    }
                }
            }
            Ok(0)
        }

        Command::Ledger(command) => {
            let mut store = open_store(&config)?;
            match command {
                LedgerCommand::Sync { gap } => {
                    let gap = match gap {
                        Some(raw) => humantime::parse_duration(raw.trim())
                            .map_err(|e| Error::InvalidArgument(format!("gap '{raw}': {e}")))?,
                        None => config.session_gap,
                    };
                    let summary = ledger::sync(&mut store, gap)?;
                    match summary.baseline_at {
                        Some(at) => println!(
                            "baseline {}: {} roots, {} sessions, {} deltas written",
                            util::format_timestamp(at),
                            summary.roots,
                            summary.sessions,
                            summary.deltas
                        ),
                        None => println!("No baseline captured; run 'stockpile baseline capture' first."),
                    }
                }
                LedgerCommand::Record(args) => {
                    let delta = manual_delta(args)?;
                    let line = format!("recorded {} {}", delta.resource_id, util::format_delta(delta.delta));
                    ledger::record(&mut store, delta)?;
                    println!("{line}");
                }
            }
            Ok(0)
        }

        Command::Reconcile(args) => {
            let store = open_store(&config)?;
            let report = reconcile::reconcile(&store, args.tech || config.include_tech)?;
            report::print(args.output.json, &report, table::render_reconcile)?;
            Ok(if report.is_consistent() { 0 } else { EXIT_MISMATCH })
        }
    }
}

#[derive(Serialize)]
struct BaselineView {
    captured_at: i64,
    rows: Vec<BaselineRow>,
}

fn diff(store: &Store, args: DiffArgs) -> Result<()> {
    let (from_id, to_id) = match (args.from, args.to) {
        (Some(from), Some(to)) => (from, to),
        _ => {
            let root = args.root.as_deref().map(parse_root).transpose()?;
            let snapshots = store.list_snapshots(root.as_ref())?;
            if snapshots.len() < 2 {
                return Err(Error::InvalidArgument(
                    "need at least 2 snapshots to compare".to_string(),
                ));
            }
            (snapshots[1].id, snapshots[0].id)
        }
    };

    let load = |id: i64| {
        store
            .get_snapshot(id)?
            .ok_or_else(|| Error::InvalidArgument(format!("snapshot {id} not found")))
    };
    let from = load(from_id)?;
    let to = load(to_id)?;

    let scope = args.scope.as_deref().map(Scope::parse).transpose()?;
    let filter = RowFilter::new(scope, args.tech);
    let from_totals = aggregate::amounts(&aggregate::snapshot_totals(store, from.id, &filter)?, |t| t.amount);
    let to_totals = aggregate::amounts(&aggregate::snapshot_totals(store, to.id, &filter)?, |t| t.amount);

    let result = compare_totals(
        &from_totals,
        &to_totals,
        from.id,
        to.id,
        from.captured_at,
        to.captured_at,
    );
    report::print(args.output.json, &result, table::render_diff)
}

fn manual_delta(args: RecordArgs) -> Result<LedgerDelta> {
    let resource_id = ResourceId::new(&args.resource);
    if resource_id.is_empty() {
        return Err(Error::InvalidArgument("empty resource id".to_string()));
    }
    let applied_at = match args.at.as_deref() {
        Some(raw) => util::parse_timestamp(raw)
            .ok_or_else(|| Error::InvalidArgument(format!("timestamp '{raw}'")))?,
        None => util::now_secs(),
    };
    let save_root = args.root.as_deref().map(parse_root).transpose()?;

    Ok(LedgerDelta {
        resource_id,
        resource_kind: ResourceKind::parse(&args.kind),
        owner: normalize_owner(&args.owner),
        inventory: InventoryKind::parse(&args.inventory),
        delta: args.delta,
        applied_at,
        session_start: None,
        session_end: None,
        snapshot_id: None,
        save_root,
    })
}
