//! Inventory snapshot aggregation and reconciliation.
//!
//! Decoded save dumps are ingested as deduplicated snapshots per save root.
//! Current totals come from each active root's latest snapshot; an
//! alternate baseline+ledger path is derived from the same history and
//! cross-checked by `reconcile`.

pub mod aggregate;
pub mod cli;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod ident;
pub mod ingest;
pub mod ledger;
pub mod model;
pub mod payload;
pub mod query;
pub mod recency;
pub mod reconcile;
pub mod report;
pub mod store;
pub mod util;

pub use error::{Error, Result};
