//! Duplicate-record merging for line-oriented genealogical record
//! stores.
//!
//! Two records of the same type are folded into one: their facts are
//! partitioned into shared and one-sided sets, the caller chooses which
//! one-sided facts survive, every inbound cross-reference is rewritten
//! to the surviving id, auxiliary data (usage counters, favorites,
//! account linkage) is consolidated, and the discarded record is
//! deleted. The sub-stores share no transaction; each propagation step
//! is idempotent so an interrupted merge can be re-run.

pub mod consolidate;
pub mod error;
pub mod gedcom;
pub mod links;
pub mod matcher;
pub mod merge;
pub mod notify;
pub mod rewrite;
pub mod store;
pub mod types;

pub use consolidate::Consolidator;
pub use error::{Result, StemmaError};
pub use links::{LinkUpdater, RepointOutcome};
pub use matcher::{diff_facts, FactDiff};
pub use merge::{MergeReport, MergeRequest, MergeService, MergeState, Session};
pub use notify::{LogNotifier, MemoryNotifier, Notifier, Severity};
pub use store::{RedbStore, Store, CURRENT_SCHEMA_VERSION};
pub use types::{Fact, Favorite, PendingChange, Record, Xref};
