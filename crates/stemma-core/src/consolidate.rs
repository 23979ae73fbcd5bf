//! Folding a discarded record's auxiliary data into the surviving
//! record's identity. Every operation here is idempotent so a partially
//! applied merge can safely be re-run.

use crate::error::Result;
use crate::store::Store;
use crate::types::Xref;

pub struct Consolidator<'a, S: Store> {
    store: &'a S,
}

impl<'a, S: Store> Consolidator<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// For every page seen under either id, write the combined total
    /// under the surviving id, then drop the discarded id's rows.
    pub fn merge_usage_counts(
        &self,
        tree: &str,
        surviving: &Xref,
        discarded: &Xref,
    ) -> Result<()> {
        let sums = self
            .store
            .usage_counts(tree, &[surviving.clone(), discarded.clone()])?;
        for (page, total) in &sums {
            self.store.set_usage_count(tree, page, surviving, *total)?;
        }
        self.store.delete_usage_counts(tree, discarded)
    }

    /// Point saved shortcuts at the surviving record.
    pub fn repoint_favorites(&self, tree: &str, discarded: &Xref, surviving: &Xref) -> Result<()> {
        self.store.repoint_favorites(tree, discarded, surviving)
    }

    /// Point per-user record linkage at the surviving record.
    pub fn repoint_account_links(
        &self,
        tree: &str,
        discarded: &Xref,
        surviving: &Xref,
    ) -> Result<()> {
        self.store.repoint_account_links(tree, discarded, surviving)
    }
}
