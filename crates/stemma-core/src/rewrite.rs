//! Rewriting embedded cross-references inside a record body.

use crate::gedcom;
use crate::types::Xref;
use rustc_hash::FxHashSet;

/// Replace every pointer to `from` with a pointer to `to`, then drop
/// later duplicates of any reference block the substitution made
/// identical to an earlier one. Returns the input unchanged when `from`
/// does not occur.
pub fn repoint(body: &str, from: &Xref, to: &Xref) -> String {
    let needle = from.pointer();
    if !body.contains(&needle) {
        return body.to_string();
    }
    let substituted = body.replace(&needle, &to.pointer());
    collapse_duplicate_blocks(&substituted)
}

/// Remove repeated occurrences of byte-identical top-level blocks,
/// keeping each first occurrence in place. Only blocks whose top line
/// carries a pointer token participate; identical non-reference blocks
/// (duplicate notes, say) are legal and left alone.
pub fn collapse_duplicate_blocks(body: &str) -> String {
    let (preamble, blocks) = gedcom::split_blocks(body);
    let mut seen: FxHashSet<&str> = FxHashSet::default();
    let mut kept: Vec<String> = Vec::with_capacity(blocks.len());

    for block in &blocks {
        let top = block.lines().next().unwrap_or("");
        if gedcom::has_pointer(top) && !seen.insert(block.as_str()) {
            continue;
        }
        kept.push(block.clone());
    }

    gedcom::join_blocks(&preamble, &kept)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn xref(id: &str) -> Xref {
        Xref::new(id).unwrap()
    }

    #[test]
    fn test_substitution_is_whole_token() {
        let body = "0 @F1@ FAM\n1 HUSB @I1@\n1 WIFE @I10@";
        let out = repoint(body, &xref("I1"), &xref("I99"));
        // @I1@ inside @I10@ must not match.
        assert_eq!(out, "0 @F1@ FAM\n1 HUSB @I99@\n1 WIFE @I10@");
    }

    #[test]
    fn test_missing_id_is_a_noop() {
        let body = "0 @F1@ FAM\n1 HUSB @I1@\n1 HUSB @I1@";
        // The id being rewritten never occurs: even existing duplicates
        // are left untouched.
        assert_eq!(repoint(body, &xref("I7"), &xref("I8")), body);
    }

    #[test]
    fn test_collapse_after_substitution() {
        // Both sides pointed at the same person under different ids;
        // after substitution the two spouse blocks become identical.
        let body = "0 @F1@ FAM\n1 HUSB @I2@\n2 NOTE primary\n1 HUSB @I1@\n2 NOTE primary\n1 WIFE @I3@";
        let out = repoint(body, &xref("I2"), &xref("I1"));
        assert_eq!(out, "0 @F1@ FAM\n1 HUSB @I1@\n2 NOTE primary\n1 WIFE @I3@");
    }

    #[test]
    fn test_first_occurrence_position_kept() {
        let body = "0 @F1@ FAM\n1 HUSB @I2@\n1 WIFE @I3@\n1 HUSB @I1@";
        let out = repoint(body, &xref("I2"), &xref("I1"));
        assert_eq!(out, "0 @F1@ FAM\n1 HUSB @I1@\n1 WIFE @I3@");
    }

    #[test]
    fn test_blocks_differing_in_sublines_survive() {
        let body = "0 @F1@ FAM\n1 HUSB @I2@\n2 NOTE a\n1 HUSB @I1@\n2 NOTE b";
        let out = repoint(body, &xref("I2"), &xref("I1"));
        assert_eq!(out, "0 @F1@ FAM\n1 HUSB @I1@\n2 NOTE a\n1 HUSB @I1@\n2 NOTE b");
    }

    #[test]
    fn test_identical_non_reference_blocks_kept() {
        let body = "0 @I1@ INDI\n1 NOTE twin\n1 RELA @I2@\n1 NOTE twin";
        let out = repoint(body, &xref("I2"), &xref("I3"));
        assert_eq!(out, "0 @I1@ INDI\n1 NOTE twin\n1 RELA @I3@\n1 NOTE twin");
    }

    #[test]
    fn test_idempotent() {
        let body = "0 @F1@ FAM\n1 HUSB @I2@\n2 NOTE x\n1 HUSB @I1@\n2 NOTE x";
        let once = repoint(body, &xref("I2"), &xref("I1"));
        let twice = repoint(&once, &xref("I2"), &xref("I1"));
        assert_eq!(once, twice);
    }
}
