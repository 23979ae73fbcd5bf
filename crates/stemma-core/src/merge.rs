//! The merge transaction: validation, fact selection, and the ordered
//! commit sequence that folds one record into another.

use crate::consolidate::Consolidator;
use crate::error::{Result, StemmaError};
use crate::links::LinkUpdater;
use crate::matcher::{diff_facts, FactDiff};
use crate::notify::{Notifier, Severity};
use crate::store::Store;
use crate::types::{Record, Xref};
use std::collections::HashSet;
use std::sync::Arc;

/// Where a merge request stands.
///
/// `Input → Candidate` requires two distinct, existing, same-type
/// records in one tree. `Candidate → Confirmed` requires an explicit,
/// authenticated merge action. `Confirmed` ends in `Committed` or, when
/// any commit step fails, `Rejected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeState {
    Input,
    Candidate,
    Confirmed,
    Committed,
    Rejected,
}

/// Final answer handed back to the caller.
#[derive(Debug, Clone)]
pub struct MergeReport {
    pub state: MergeState,
    pub message: String,
}

impl MergeReport {
    fn new(state: MergeState, message: impl Into<String>) -> Self {
        MergeReport {
            state,
            message: message.into(),
        }
    }
}

/// The acting user's context, established by the surrounding request
/// handling.
#[derive(Debug, Clone)]
pub struct Session {
    pub user: String,
    pub is_manager: bool,
    /// Anti-forgery token issued with the confirmation form.
    pub csrf_token: String,
    /// When set, writes apply immediately; otherwise they are staged as
    /// pending changes.
    pub auto_accept: bool,
}

/// A confirmed merge request: keep `surviving`, fold `discarded` into
/// it. The keep sets name the one-sided facts to carry over, by fact id
/// as produced by [`MergeService::compute_fact_diff`]; shared facts are
/// always carried.
#[derive(Debug, Clone)]
pub struct MergeRequest {
    pub tree: String,
    pub surviving: Xref,
    pub discarded: Xref,
    pub keep_a: HashSet<String>,
    pub keep_b: HashSet<String>,
    /// Token presented with the form.
    pub csrf_token: String,
}

/// Entry point for merging two records.
pub struct MergeService<S: Store, N: Notifier> {
    store: Arc<S>,
    notifier: Arc<N>,
}

impl<S: Store, N: Notifier> MergeService<S, N> {
    pub fn new(store: Arc<S>, notifier: Arc<N>) -> Self {
        Self { store, notifier }
    }

    /// Read-only partition of two records' facts, used to render the
    /// selection form before anything is committed.
    pub fn compute_fact_diff(&self, tree: &str, a: &Xref, b: &Xref) -> Result<FactDiff> {
        let record_a = self.resolve_required(tree, a)?;
        let record_b = self.resolve_required(tree, b)?;
        Ok(diff_facts(
            &record_a.mergeable_facts(),
            &record_b.mergeable_facts(),
        ))
    }

    /// Run the full merge. Expected failures (validation, authorization)
    /// come back as reports with no store mutation; a failing commit
    /// step comes back as `Rejected` with whatever already applied left
    /// in place, since the sub-stores share no transaction. The commit
    /// steps are idempotent, so re-running a half-applied merge is the
    /// supported recovery path.
    pub fn attempt_merge(&self, session: &Session, request: &MergeRequest) -> MergeReport {
        match self.try_merge(session, request) {
            Ok(report) => report,
            Err(e) => {
                let message = format!("The records could not be merged: {}", e);
                self.notifier.notify(&message, Severity::Danger);
                MergeReport::new(MergeState::Rejected, message)
            }
        }
    }

    fn try_merge(&self, session: &Session, request: &MergeRequest) -> Result<MergeReport> {
        if !session.is_manager {
            return Ok(self.refuse(
                MergeState::Rejected,
                "You do not have permission to merge records.",
            ));
        }

        // Input -> Candidate: both records exist in this tree, are
        // distinct, and share a type.
        let tree = request.tree.as_str();
        let Some(surviving) = self.store.resolve(tree, &request.surviving)? else {
            return Ok(self.refuse(
                MergeState::Input,
                format!("{} does not exist.", request.surviving),
            ));
        };
        let Some(discarded) = self.store.resolve(tree, &request.discarded)? else {
            return Ok(self.refuse(
                MergeState::Input,
                format!("{} does not exist.", request.discarded),
            ));
        };
        if request.surviving == request.discarded {
            return Ok(self.refuse(
                MergeState::Input,
                "You entered the same IDs. You cannot merge the same records.",
            ));
        }
        let (Some(type_a), Some(type_b)) = (surviving.record_type(), discarded.record_type())
        else {
            return Err(StemmaError::Malformed(
                "record is missing its header line".to_string(),
            ));
        };
        if type_a != type_b {
            return Ok(self.refuse(
                MergeState::Input,
                "Records are not the same type. Cannot merge records that are not the same type.",
            ));
        }

        // Candidate -> Confirmed: the action must carry the session's
        // anti-forgery token.
        if request.csrf_token != session.csrf_token {
            return Ok(self.refuse(MergeState::Candidate, "This form has expired. Try again."));
        }

        let diff = diff_facts(
            &surviving.mergeable_facts(),
            &discarded.mergeable_facts(),
        );
        let merged_body = assemble_body(
            &request.surviving,
            type_a,
            &diff,
            &request.keep_a,
            &request.keep_b,
        );

        // Confirmed -> Committed.
        let discarded_label = self.commit(session, request, &discarded, &merged_body)?;

        let surviving_name =
            Record::new(tree, request.surviving.clone(), merged_body).display_name();
        let message = format!(
            "The records “{}” and “{}” have been merged.",
            surviving_name, discarded_label
        );
        self.notifier.notify(&message, Severity::Success);
        Ok(MergeReport::new(MergeState::Committed, message))
    }

    /// The ordered commit sequence. Returns the label used for the
    /// discarded record in notices.
    fn commit(
        &self,
        session: &Session,
        request: &MergeRequest,
        discarded: &Record,
        merged_body: &str,
    ) -> Result<String> {
        let tree = request.tree.as_str();

        // With auto-accept the rewritten links point at the surviving
        // record right away, so notices show its final name; otherwise
        // the discarded record is still visible behind its pending
        // change and is named directly.
        let discarded_label = if session.auto_accept {
            Record::new(tree, request.surviving.clone(), merged_body.to_string()).display_name()
        } else {
            discarded.display_name()
        };

        let updater = LinkUpdater::new(self.store.as_ref(), self.notifier.as_ref());
        updater.repoint_inbound(
            tree,
            &request.discarded,
            &request.surviving,
            &discarded_label,
            session.auto_accept,
        )?;

        let consolidator = Consolidator::new(self.store.as_ref());
        consolidator.repoint_account_links(tree, &request.discarded, &request.surviving)?;
        consolidator.merge_usage_counts(tree, &request.surviving, &request.discarded)?;

        self.store.write_record(
            tree,
            &request.surviving,
            merged_body,
            session.auto_accept,
        )?;
        self.store.delete_record(tree, &request.discarded)?;
        consolidator.repoint_favorites(tree, &request.discarded, &request.surviving)?;

        Ok(discarded_label)
    }

    fn refuse(&self, state: MergeState, message: impl Into<String>) -> MergeReport {
        let message = message.into();
        self.notifier.notify(&message, Severity::Danger);
        MergeReport::new(state, message)
    }

    fn resolve_required(&self, tree: &str, xref: &Xref) -> Result<Record> {
        self.store
            .resolve(tree, xref)?
            .ok_or_else(|| StemmaError::RecordNotFound(xref.to_string()))
    }
}

/// Assemble the surviving record's body: header, every shared fact in
/// matcher order, then the kept one-sided facts from each side in their
/// original order. One-sided facts not in a keep set are dropped for
/// good.
fn assemble_body(
    surviving: &Xref,
    record_type: &str,
    diff: &FactDiff,
    keep_a: &HashSet<String>,
    keep_b: &HashSet<String>,
) -> String {
    let mut body = format!("0 {} {}", surviving.pointer(), record_type);
    let kept = diff
        .common
        .iter()
        .chain(diff.unique_a.iter().filter(|f| keep_a.contains(&f.fact_id)))
        .chain(diff.unique_b.iter().filter(|f| keep_b.contains(&f.fact_id)));
    for fact in kept {
        body.push('\n');
        body.push_str(&fact.gedcom);
    }
    body
}
