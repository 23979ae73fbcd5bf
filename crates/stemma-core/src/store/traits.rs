use crate::error::Result;
use crate::types::{Favorite, Record, Xref};
use std::collections::HashMap;

/// Storage trait for the record store and its auxiliary tables. All ids
/// are scoped by `tree`, the isolation boundary within which they are
/// unique.
pub trait Store: Send + Sync {
    // === Records ===

    /// Insert a new record with the given committed body. Fails if the
    /// id is already taken in this tree.
    fn create_record(&self, tree: &str, xref: &Xref, gedcom: &str) -> Result<()>;

    /// Fetch a record by id, including any staged change.
    fn resolve(&self, tree: &str, xref: &Xref) -> Result<Option<Record>>;

    /// Replace a record's body. With `auto_approve` the write commits
    /// immediately (change metadata refreshed, references reindexed);
    /// without it the body is staged as a pending change and the
    /// committed state is untouched.
    fn write_record(&self, tree: &str, xref: &Xref, gedcom: &str, auto_approve: bool)
        -> Result<()>;

    /// Remove a record and its outbound reference-index entries.
    fn delete_record(&self, tree: &str, xref: &Xref) -> Result<()>;

    /// Stage a deletion as a pending change; the record stays live until
    /// the change is accepted.
    fn stage_deletion(&self, tree: &str, xref: &Xref) -> Result<()>;

    /// Apply a record's staged change, if any.
    fn accept_pending(&self, tree: &str, xref: &Xref) -> Result<()>;

    // === Reference links ===

    /// Ids of every record whose committed body points at `target`.
    fn referencing_xrefs(&self, tree: &str, target: &Xref) -> Result<Vec<Xref>>;

    // === Usage counters ===

    /// Per-page totals summed across the given ids. Pages with no rows
    /// are absent from the map.
    fn usage_counts(&self, tree: &str, xrefs: &[Xref]) -> Result<HashMap<String, u64>>;

    fn set_usage_count(&self, tree: &str, page: &str, xref: &Xref, count: u64) -> Result<()>;

    /// Drop every counter row keyed by this id.
    fn delete_usage_counts(&self, tree: &str, xref: &Xref) -> Result<()>;

    /// Increment one counter, returning the new value.
    fn bump_usage_count(&self, tree: &str, page: &str, xref: &Xref) -> Result<u64>;

    // === Favorites ===

    fn add_favorite(&self, tree: &str, owner: &str, xref: &Xref) -> Result<()>;

    fn favorites(&self, tree: &str) -> Result<Vec<Favorite>>;

    /// Point every favorite referencing `from` at `to` instead.
    fn repoint_favorites(&self, tree: &str, from: &Xref, to: &Xref) -> Result<()>;

    // === Account linkage ===

    fn set_account_link(&self, tree: &str, user: &str, xref: &Xref) -> Result<()>;

    fn account_link(&self, tree: &str, user: &str) -> Result<Option<Xref>>;

    /// Point every user whose linked record is `from` at `to` instead.
    fn repoint_account_links(&self, tree: &str, from: &Xref, to: &Xref) -> Result<()>;
}
