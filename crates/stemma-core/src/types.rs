use crate::error::{Result, StemmaError};
use crate::gedcom;
use rustc_hash::FxHasher;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Upper bound on record-id length, matching the surrounding system's
/// input filter.
const XREF_MAX_LEN: usize = 20;

/// A record identifier, unique within one tree. Opaque to the merge
/// machinery; validated on construction so that the pointer form `@ID@`
/// is always well delimited inside a record body.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Xref(String);

impl Xref {
    /// Accepts 1-20 characters from `[A-Za-z0-9:_.-]`.
    pub fn new(id: &str) -> Result<Self> {
        if id.is_empty() || id.len() > XREF_MAX_LEN || !id.chars().all(gedcom::is_xref_char) {
            return Err(StemmaError::InvalidXref(id.to_string()));
        }
        Ok(Self(id.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The bracketed token form embedded in record bodies.
    pub fn pointer(&self) -> String {
        format!("@{}@", self.0)
    }
}

impl fmt::Display for Xref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A staged edit awaiting moderator approval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PendingChange {
    /// Replacement body for the record.
    Replace(String),
    /// Deletion of the record.
    Delete,
}

/// A saved shortcut to a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Favorite {
    pub owner: String,
    pub xref: Xref,
}

/// One structural sub-unit of a record: a level-1 line plus the deeper
/// lines attached to it. Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    /// Stable within one parse of the record (content + position hash),
    /// not unique across records.
    pub fact_id: String,
    pub tag: String,
    /// The fact's own sub-tree of lines, verbatim.
    pub gedcom: String,
    /// Set when the fact's value is a pointer to another record.
    pub target: Option<Xref>,
    /// The record has a staged replacement body that drops this fact.
    pub pending_deletion: bool,
}

impl Fact {
    /// Parse one top-level block. `ordinal` is the fact's position in
    /// its record and keeps ids distinct between identical blocks.
    pub fn from_block(block: &str, ordinal: usize) -> Self {
        let top = block.lines().next().unwrap_or("");
        let tag = gedcom::line_tag(top).unwrap_or("").to_string();
        let target = gedcom::as_pointer(gedcom::line_value(top))
            .and_then(|id| Xref::new(id).ok());
        let mut hasher = FxHasher::default();
        gedcom::normalize(block).hash(&mut hasher);
        ordinal.hash(&mut hasher);
        Fact {
            fact_id: format!("{:016x}", hasher.finish()),
            tag,
            gedcom: block.to_string(),
            target,
            pending_deletion: false,
        }
    }

    /// Structural equality: same tag, same target, and byte-identical
    /// body lines after canonicalization. No semantic inference; two
    /// facts describing the same event in different words are distinct.
    pub fn structurally_equal(&self, other: &Fact) -> bool {
        self.tag == other.tag
            && self.target == other.target
            && gedcom::normalize(&self.gedcom) == gedcom::normalize(&other.gedcom)
    }
}

/// A uniquely identified entity in the store. The raw serialized body is
/// the authoritative representation; everything else is parsed from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub tree: String,
    pub xref: Xref,
    /// Committed body.
    pub gedcom: String,
    /// Staged edit, if any.
    pub pending: Option<PendingChange>,
}

impl Record {
    pub fn new(tree: impl Into<String>, xref: Xref, gedcom: impl Into<String>) -> Self {
        Record {
            tree: tree.into(),
            xref,
            gedcom: gedcom.into(),
            pending: None,
        }
    }

    /// The type tag from the header line, e.g. `INDI` or `SOUR`.
    pub fn record_type(&self) -> Option<&str> {
        gedcom::header(&self.gedcom).map(|(_, rtype)| rtype)
    }

    /// A deletion has been staged but not yet committed.
    pub fn is_pending_deletion(&self) -> bool {
        matches!(self.pending, Some(PendingChange::Delete))
    }

    /// Parse the committed body into its ordered facts. When a staged
    /// replacement exists, facts it no longer contains are flagged as
    /// pending deletion.
    pub fn facts(&self) -> Vec<Fact> {
        let (_, blocks) = gedcom::split_blocks(&self.gedcom);
        let staged: Option<Vec<String>> = match &self.pending {
            Some(PendingChange::Replace(body)) => {
                let (_, staged_blocks) = gedcom::split_blocks(body);
                Some(staged_blocks.iter().map(|b| gedcom::normalize(b)).collect())
            }
            _ => None,
        };
        blocks
            .iter()
            .enumerate()
            .map(|(i, block)| {
                let mut fact = Fact::from_block(block, i);
                fact.pending_deletion = match (&self.pending, &staged) {
                    (Some(PendingChange::Delete), _) => true,
                    (_, Some(bodies)) => !bodies.contains(&gedcom::normalize(block)),
                    _ => false,
                };
                fact
            })
            .collect()
    }

    /// Facts eligible for merging: change metadata and facts staged for
    /// deletion are excluded.
    pub fn mergeable_facts(&self) -> Vec<Fact> {
        self.facts()
            .into_iter()
            .filter(|f| !f.pending_deletion && f.tag != gedcom::CHANGE_TAG)
            .collect()
    }

    /// Human-readable label for notices: the first `NAME` value (surname
    /// slashes stripped), falling back to `TITL`, then to the id.
    pub fn display_name(&self) -> String {
        for tag in ["NAME", "TITL"] {
            if let Some(fact) = self.facts().iter().find(|f| f.tag == tag) {
                let top = fact.gedcom.lines().next().unwrap_or("");
                let value = gedcom::line_value(top).replace('/', " ");
                let value = value.split_whitespace().collect::<Vec<_>>().join(" ");
                if !value.is_empty() {
                    return value;
                }
            }
        }
        self.xref.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(gedcom: &str) -> Record {
        Record::new("tree1", Xref::new("I1").unwrap(), gedcom)
    }

    #[test]
    fn test_xref_validation() {
        assert!(Xref::new("I1").is_ok());
        assert!(Xref::new("X:a_b.c-9").is_ok());
        assert!(Xref::new("").is_err());
        assert!(Xref::new("has space").is_err());
        assert!(Xref::new("@I1@").is_err());
        assert!(Xref::new(&"x".repeat(21)).is_err());
        assert_eq!(Xref::new("I1").unwrap().pointer(), "@I1@");
    }

    #[test]
    fn test_record_type_and_facts() {
        let rec = record("0 @I1@ INDI\n1 NAME John /Smith/\n1 BIRT\n2 DATE 1900");
        assert_eq!(rec.record_type(), Some("INDI"));
        let facts = rec.facts();
        assert_eq!(facts.len(), 2);
        assert_eq!(facts[0].tag, "NAME");
        assert_eq!(facts[1].gedcom, "1 BIRT\n2 DATE 1900");
    }

    #[test]
    fn test_fact_ids_stable_and_position_scoped() {
        let rec = record("0 @I1@ INDI\n1 NOTE x\n1 NOTE x");
        let first = rec.facts();
        let second = rec.facts();
        assert_eq!(first[0].fact_id, second[0].fact_id);
        // Identical bodies at different positions keep distinct ids.
        assert_ne!(first[0].fact_id, first[1].fact_id);
    }

    #[test]
    fn test_fact_target() {
        let rec = record("0 @F1@ FAM\n1 HUSB @I7@\n1 NOTE plain");
        let facts = rec.facts();
        assert_eq!(facts[0].target, Some(Xref::new("I7").unwrap()));
        assert_eq!(facts[1].target, None);
    }

    #[test]
    fn test_structural_equality_ignores_line_endings() {
        let a = Fact::from_block("1 BIRT\r\n2 DATE 1900", 0);
        let b = Fact::from_block("1 BIRT\n2 DATE 1900", 5);
        assert!(a.structurally_equal(&b));

        let c = Fact::from_block("1 BIRT\n2 DATE 1901", 0);
        assert!(!a.structurally_equal(&c));
    }

    #[test]
    fn test_mergeable_facts_exclude_chan_and_pending_deletion() {
        let mut rec = record("0 @I1@ INDI\n1 NAME John\n1 BIRT\n2 DATE 1900\n1 CHAN\n2 DATE 01 JAN 2020");
        assert_eq!(rec.mergeable_facts().len(), 2);

        // Stage a replacement that drops the BIRT fact.
        rec.pending = Some(PendingChange::Replace("0 @I1@ INDI\n1 NAME John".to_string()));
        let mergeable = rec.mergeable_facts();
        assert_eq!(mergeable.len(), 1);
        assert_eq!(mergeable[0].tag, "NAME");
    }

    #[test]
    fn test_display_name() {
        let rec = record("0 @I1@ INDI\n1 NAME John /Smith/");
        assert_eq!(rec.display_name(), "John Smith");

        let sour = record("0 @S1@ SOUR\n1 TITL Parish register");
        assert_eq!(sour.display_name(), "Parish register");

        let bare = record("0 @I1@ INDI\n1 BIRT");
        assert_eq!(bare.display_name(), "I1");
    }

    #[test]
    fn test_pending_deletion_flags() {
        let mut rec = record("0 @I1@ INDI\n1 NAME John");
        assert!(!rec.is_pending_deletion());
        rec.pending = Some(PendingChange::Delete);
        assert!(rec.is_pending_deletion());
        assert!(rec.facts().iter().all(|f| f.pending_deletion));
    }
}
