//! Primitives for the line-oriented record serialization.
//!
//! A record body is a sequence of lines, each starting with a decimal
//! level number. Level 0 is the record header (`0 @X1@ TYPE`), each
//! level-1 line opens a top-level block (a "fact"), and deeper lines
//! attach to the nearest preceding shallower line. Only the primitives
//! the merge machinery needs live here; this is not a full grammar.

/// Tag of the change-metadata structure maintained by the store.
/// Excluded from fact matching and refreshed on every committed write.
pub const CHANGE_TAG: &str = "CHAN";

/// Level number of a line, taken from its leading decimal digits.
pub fn line_level(line: &str) -> Option<u32> {
    let digits: &str = match line.find(' ') {
        Some(pos) => &line[..pos],
        None => line,
    };
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

/// Tag of a level-1 line: the token following the level number.
pub fn line_tag(line: &str) -> Option<&str> {
    line.split_whitespace().nth(1)
}

/// Everything after the tag. Empty for tag-only lines.
pub fn line_value(line: &str) -> &str {
    let mut parts = line.splitn(3, ' ');
    parts.next();
    parts.next();
    parts.next().unwrap_or("").trim_start()
}

/// Parse a record header `0 @XREF@ TYPE` into its id and type tag.
pub fn header(gedcom: &str) -> Option<(&str, &str)> {
    let first = gedcom.lines().next()?;
    if line_level(first) != Some(0) {
        return None;
    }
    let mut parts = first.split_whitespace();
    parts.next();
    let id = as_pointer(parts.next()?)?;
    let rtype = parts.next()?;
    Some((id, rtype))
}

/// Unwrap a whole-value pointer token `@X@` into `X`.
pub fn as_pointer(value: &str) -> Option<&str> {
    let inner = value.strip_prefix('@')?.strip_suffix('@')?;
    if inner.is_empty() {
        None
    } else {
        Some(inner)
    }
}

/// Whether the line contains at least one pointer token.
pub fn has_pointer(line: &str) -> bool {
    pointer_tokens(line).next().is_some()
}

/// Pointer tokens embedded in a single line, in order. A token is the
/// text between a balanced pair of `@` delimiters, restricted to the
/// xref character set.
fn pointer_tokens(line: &str) -> impl Iterator<Item = &str> {
    let segments: Vec<&str> = line.split('@').collect();
    let last = segments.len().saturating_sub(1);
    segments
        .into_iter()
        .enumerate()
        .filter(move |(i, s)| {
            i % 2 == 1 && *i < last && !s.is_empty() && s.chars().all(is_xref_char)
        })
        .map(|(_, s)| s)
}

/// Every distinct pointer target in the body, in order of first
/// appearance. The header's own id is not an outbound reference and is
/// skipped.
pub fn pointer_targets(gedcom: &str) -> Vec<String> {
    let mut targets: Vec<String> = Vec::new();
    for line in gedcom.lines().skip(1) {
        for candidate in pointer_tokens(line) {
            if !targets.iter().any(|t| t == candidate) {
                targets.push(candidate.to_string());
            }
        }
    }
    targets
}

pub(crate) fn is_xref_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, ':' | '_' | '.' | '-')
}

/// Canonical form for structural comparison: `\r\n` folded to `\n`,
/// per-line trailing whitespace trimmed, trailing blank lines dropped.
/// Interior whitespace and line order stay significant.
pub fn normalize(body: &str) -> String {
    let unified = body.replace("\r\n", "\n");
    let mut lines: Vec<&str> = unified.lines().map(str::trim_end).collect();
    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    lines.join("\n")
}

/// Split a record body into its preamble (the header line plus any lines
/// preceding the first level-1 line) and its top-level blocks. A block is
/// a level-1 line and the contiguous run of deeper lines following it.
pub fn split_blocks(gedcom: &str) -> (Vec<String>, Vec<String>) {
    let mut preamble: Vec<String> = Vec::new();
    let mut blocks: Vec<String> = Vec::new();
    for line in gedcom.lines() {
        if line_level(line) == Some(1) {
            blocks.push(line.to_string());
        } else if let Some(current) = blocks.last_mut() {
            current.push('\n');
            current.push_str(line);
        } else {
            preamble.push(line.to_string());
        }
    }
    (preamble, blocks)
}

/// Inverse of [`split_blocks`].
pub fn join_blocks(preamble: &[String], blocks: &[String]) -> String {
    preamble
        .iter()
        .map(String::as_str)
        .chain(blocks.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_parsing() {
        assert_eq!(line_level("0 @I1@ INDI"), Some(0));
        assert_eq!(line_level("2 DATE 1 JAN 1900"), Some(2));
        assert_eq!(line_level("NAME"), None);
        assert_eq!(line_tag("1 NAME John /Smith/"), Some("NAME"));
        assert_eq!(line_value("1 NAME John /Smith/"), "John /Smith/");
        assert_eq!(line_value("1 BIRT"), "");
    }

    #[test]
    fn test_header() {
        assert_eq!(header("0 @I1@ INDI\n1 NAME John"), Some(("I1", "INDI")));
        assert_eq!(header("1 NAME John"), None);
        assert_eq!(header("0 I1 INDI"), None);
    }

    #[test]
    fn test_pointers() {
        assert_eq!(as_pointer("@I1@"), Some("I1"));
        assert_eq!(as_pointer("I1"), None);
        assert_eq!(as_pointer("@@"), None);
        assert!(has_pointer("1 HUSB @I1@"));
        assert!(!has_pointer("1 NAME John"));
    }

    #[test]
    fn test_pointer_targets_skip_header_and_dedup() {
        let gedcom = "0 @F1@ FAM\n1 HUSB @I1@\n1 WIFE @I2@\n1 CHIL @I1@";
        assert_eq!(pointer_targets(gedcom), vec!["I1", "I2"]);
    }

    #[test]
    fn test_split_and_join_blocks() {
        let gedcom = "0 @I1@ INDI\n1 NAME John\n2 GIVN John\n1 BIRT\n2 DATE 1900";
        let (preamble, blocks) = split_blocks(gedcom);
        assert_eq!(preamble, vec!["0 @I1@ INDI"]);
        assert_eq!(blocks, vec!["1 NAME John\n2 GIVN John", "1 BIRT\n2 DATE 1900"]);
        assert_eq!(join_blocks(&preamble, &blocks), gedcom);
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("1 NAME John \r\n2 GIVN John\n\n"), "1 NAME John\n2 GIVN John");
    }
}
