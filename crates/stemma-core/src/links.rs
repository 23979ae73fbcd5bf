//! Repointing every inbound reference to a record being discarded.

use crate::error::Result;
use crate::notify::{Notifier, Severity};
use crate::rewrite;
use crate::store::Store;
use crate::types::Xref;

/// What happened while repointing inbound references.
#[derive(Debug, Clone, Default)]
pub struct RepointOutcome {
    /// Records whose bodies were rewritten and persisted.
    pub updated: Vec<Xref>,
    /// Records that could not be updated. Their failures were reported
    /// as warnings; the rest of the merge proceeds without them.
    pub failed: Vec<Xref>,
}

/// Rewrites every record referencing a discarded id so it references the
/// surviving id instead, persisting each change through the store.
pub struct LinkUpdater<'a, S: Store, N: Notifier> {
    store: &'a S,
    notifier: &'a N,
}

impl<'a, S: Store, N: Notifier> LinkUpdater<'a, S, N> {
    pub fn new(store: &'a S, notifier: &'a N) -> Self {
        Self { store, notifier }
    }

    /// Process every record referencing `discarded`, in deterministic id
    /// order. Referrers that are themselves staged for deletion are
    /// skipped. A single referrer failing is reported and does not stop
    /// the others from being processed.
    ///
    /// `target_label` names the record being pointed away from in each
    /// notice; the caller picks it based on the auto-accept mode.
    pub fn repoint_inbound(
        &self,
        tree: &str,
        discarded: &Xref,
        surviving: &Xref,
        target_label: &str,
        auto_approve: bool,
    ) -> Result<RepointOutcome> {
        let referrers = self.store.referencing_xrefs(tree, discarded)?;
        let mut outcome = RepointOutcome::default();

        for referrer in referrers {
            match self.repoint_one(tree, &referrer, discarded, surviving, auto_approve) {
                Ok(Some(referrer_name)) => {
                    self.notifier.notify(
                        &format!(
                            "The link from “{}” to “{}” has been updated.",
                            referrer_name, target_label
                        ),
                        Severity::Info,
                    );
                    outcome.updated.push(referrer);
                }
                Ok(None) => {} // staged for deletion, nothing to rewrite
                Err(e) => {
                    log::warn!("Failed to update link in {}: {}", referrer, e);
                    self.notifier.notify(
                        &format!("The record “{}” could not be updated: {}", referrer, e),
                        Severity::Warning,
                    );
                    outcome.failed.push(referrer);
                }
            }
        }

        Ok(outcome)
    }

    /// Rewrite one referrer. Returns its display name when a write
    /// happened, `None` when the referrer was skipped.
    fn repoint_one(
        &self,
        tree: &str,
        referrer: &Xref,
        discarded: &Xref,
        surviving: &Xref,
        auto_approve: bool,
    ) -> Result<Option<String>> {
        let record = self
            .store
            .resolve(tree, referrer)?
            .ok_or_else(|| crate::error::StemmaError::RecordNotFound(referrer.to_string()))?;

        if record.is_pending_deletion() {
            return Ok(None);
        }

        let rewritten = rewrite::repoint(&record.gedcom, discarded, surviving);
        self.store
            .write_record(tree, referrer, &rewritten, auto_approve)?;
        Ok(Some(record.display_name()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::MemoryNotifier;
    use crate::store::RedbStore;
    use tempfile::TempDir;

    fn xref(id: &str) -> Xref {
        Xref::new(id).unwrap()
    }

    fn create_test_store() -> (RedbStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = RedbStore::open(temp_dir.path().join("links.redb")).unwrap();
        (store, temp_dir)
    }

    #[test]
    fn test_repoints_every_referrer() {
        let (store, _temp) = create_test_store();
        store
            .create_record("tree1", &xref("F1"), "0 @F1@ FAM\n1 HUSB @I2@")
            .unwrap();
        store
            .create_record("tree1", &xref("F2"), "0 @F2@ FAM\n1 CHIL @I2@")
            .unwrap();

        let notifier = MemoryNotifier::new();
        let updater = LinkUpdater::new(&store, &notifier);
        let outcome = updater
            .repoint_inbound("tree1", &xref("I2"), &xref("I1"), "John Smith", true)
            .unwrap();

        assert_eq!(outcome.updated.len(), 2);
        assert!(outcome.failed.is_empty());
        for id in ["F1", "F2"] {
            let body = store.resolve("tree1", &xref(id)).unwrap().unwrap().gedcom;
            assert!(body.contains("@I1@"));
            assert!(!body.contains("@I2@"));
        }
        let messages = notifier.messages();
        assert_eq!(messages.len(), 2);
        assert!(messages[0].contains("John Smith"));
    }

    #[test]
    fn test_referrer_staged_for_deletion_is_skipped() {
        let (store, _temp) = create_test_store();
        store
            .create_record("tree1", &xref("F1"), "0 @F1@ FAM\n1 HUSB @I2@")
            .unwrap();
        store.stage_deletion("tree1", &xref("F1")).unwrap();

        let notifier = MemoryNotifier::new();
        let updater = LinkUpdater::new(&store, &notifier);
        let outcome = updater
            .repoint_inbound("tree1", &xref("I2"), &xref("I1"), "x", true)
            .unwrap();

        assert!(outcome.updated.is_empty());
        assert!(notifier.messages().is_empty());
        let body = store.resolve("tree1", &xref("F1")).unwrap().unwrap().gedcom;
        assert!(body.contains("@I2@"));
    }

    #[test]
    fn test_staged_mode_leaves_committed_body() {
        let (store, _temp) = create_test_store();
        store
            .create_record("tree1", &xref("F1"), "0 @F1@ FAM\n1 HUSB @I2@")
            .unwrap();

        let notifier = MemoryNotifier::new();
        let updater = LinkUpdater::new(&store, &notifier);
        updater
            .repoint_inbound("tree1", &xref("I2"), &xref("I1"), "x", false)
            .unwrap();

        let record = store.resolve("tree1", &xref("F1")).unwrap().unwrap();
        assert!(record.gedcom.contains("@I2@"));
        assert!(record.pending.is_some());

        store.accept_pending("tree1", &xref("F1")).unwrap();
        let record = store.resolve("tree1", &xref("F1")).unwrap().unwrap();
        assert!(record.gedcom.contains("@I1@"));
    }
}
