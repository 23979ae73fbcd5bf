//! Partitioning two records' facts into shared and one-sided sets.

use crate::types::Fact;

/// Three-way partition of two records' facts. `common` holds one copy of
/// every fact present on both sides, in side-A order; the unique sets
/// keep their side's original order.
#[derive(Debug, Clone, Default)]
pub struct FactDiff {
    pub common: Vec<Fact>,
    pub unique_a: Vec<Fact>,
    pub unique_b: Vec<Fact>,
}

/// Match facts between two sides by structural equality. Each A-side
/// fact consumes at most one B-side fact: the earliest not-yet-consumed
/// structural match, scanning B in original order. Inputs are expected
/// to be pre-filtered (no change metadata, no pending deletions).
pub fn diff_facts(a: &[Fact], b: &[Fact]) -> FactDiff {
    let mut consumed = vec![false; b.len()];
    let mut diff = FactDiff::default();

    for fact_a in a {
        let matched = b
            .iter()
            .enumerate()
            .find(|(i, fact_b)| !consumed[*i] && fact_a.structurally_equal(fact_b));
        match matched {
            Some((i, _)) => {
                consumed[i] = true;
                diff.common.push(fact_a.clone());
            }
            None => diff.unique_a.push(fact_a.clone()),
        }
    }

    for (i, fact_b) in b.iter().enumerate() {
        if !consumed[i] {
            diff.unique_b.push(fact_b.clone());
        }
    }

    diff
}
