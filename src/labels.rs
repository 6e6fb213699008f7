//! FASTA Header Annotation Parsing
//!
//! Amplicon pipelines carry metadata inline in sequence labels using
//! semicolon-delimited `key=value` tokens, e.g.
//! `>read1;size=113;` or `>AB0001;tax=d:Bacteria,p:Firmicutes;`.
//! Unknown annotations are ignored by every consumer.

/// Extracts the abundance from a `;size=N;` annotation.
///
/// Returns 0 when the annotation is absent or the value does not parse,
/// which downstream code treats as "below any minimum abundance".
pub fn parse_size(id: &str) -> u64 {
    match annotation_value(id, "size") {
        Some(v) => v.parse().unwrap_or(0),
        None => 0,
    }
}

/// Extracts the raw taxonomy payload from a `;tax=...;` annotation.
pub fn parse_tax(id: &str) -> Option<&str> {
    annotation_value(id, "tax")
}

/// Splits a taxonomy payload into ordered rank tokens.
///
/// `"d:Bacteria,p:Firmicutes"` becomes `["d:Bacteria", "p:Firmicutes"]`.
/// Empty tokens are dropped.
pub fn split_ranks(tax: &str) -> Vec<String> {
    tax.split(',')
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty())
        .collect()
}

/// Removes any `size=N` annotation from a label, preserving the other
/// tokens and dropping a trailing separator.
pub fn strip_size(id: &str) -> String {
    let kept: Vec<&str> = id
        .split(';')
        .filter(|token| !token.starts_with("size="))
        .collect();
    let joined = kept.join(";");
    joined.trim_end_matches(';').to_string()
}

fn annotation_value<'a>(id: &'a str, key: &str) -> Option<&'a str> {
    for token in id.split(';') {
        if let Some(rest) = token.strip_prefix(key) {
            if let Some(value) = rest.strip_prefix('=') {
                return Some(value);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("x;size=5;"), 5);
        assert_eq!(parse_size("x;size=113"), 113);
        assert_eq!(parse_size("x;size=foo;"), 0);
        assert_eq!(parse_size("x"), 0);
        assert_eq!(parse_size("size=42;"), 42);
    }

    #[test]
    fn test_parse_size_ignores_other_annotations() {
        assert_eq!(parse_size("x;tax=d:Bacteria;size=9;"), 9);
        assert_eq!(parse_size("x;oversized=3;"), 0);
    }

    #[test]
    fn test_parse_tax() {
        assert_eq!(
            parse_tax("q;tax=d:Bacteria,p:Firmicutes;"),
            Some("d:Bacteria,p:Firmicutes")
        );
        assert_eq!(parse_tax("q;size=4;"), None);
    }

    #[test]
    fn test_strip_size() {
        assert_eq!(strip_size("a;size=10;"), "a");
        assert_eq!(strip_size("a"), "a");
        assert_eq!(strip_size("a;tax=d:B;size=3;"), "a;tax=d:B");
    }

    #[test]
    fn test_split_ranks() {
        let ranks = split_ranks("d:Bacteria,p:Firmicutes,g:Testus");
        assert_eq!(ranks, vec!["d:Bacteria", "p:Firmicutes", "g:Testus"]);
        assert!(split_ranks("").is_empty());
        assert_eq!(split_ranks("d:Bacteria,,"), vec!["d:Bacteria"]);
    }
}
