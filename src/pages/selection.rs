//! Page selection parser
//!
//! Grammar: comma-separated tokens, each a positive 1-indexed page number or
//! an inclusive `start-end` range. Whitespace is ignored. `all` (any case) and
//! the empty string select every page. Malformed tokens are skipped with a
//! warning rather than failing the whole expression.

use std::collections::BTreeSet;
use std::fmt;

/// Literal accepted for "every page"
const ALL_TOKEN: &str = "all";

/// A normalized page selection
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PageSelection {
    /// Every page of the document
    #[default]
    All,
    /// Explicit 0-indexed pages, ascending and deduplicated
    Pages(BTreeSet<usize>),
}

/// Detailed outcome of parsing an expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionReport {
    /// The resulting selection
    pub selection: PageSelection,
    /// Tokens that were dropped as malformed
    pub skipped: Vec<String>,
    /// True when tokens were given but none survived, so the selection
    /// silently widened to every page
    pub fell_back_to_all: bool,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
enum TokenError {
    #[error("not a number")]
    NotNumeric,
    #[error("pages must be >= 1")]
    BelowOne,
    #[error("range start is after range end")]
    Reversed,
}

impl PageSelection {
    /// Parse an expression, discarding the diagnostic report
    pub fn parse(expr: &str) -> Self {
        Self::parse_report(expr).selection
    }

    /// Parse an expression and report skipped tokens
    pub fn parse_report(expr: &str) -> SelectionReport {
        let compact: String = expr.chars().filter(|c| !c.is_whitespace()).collect();

        if compact.is_empty() || compact.eq_ignore_ascii_case(ALL_TOKEN) {
            return SelectionReport {
                selection: PageSelection::All,
                skipped: Vec::new(),
                fell_back_to_all: false,
            };
        }

        let mut pages = BTreeSet::new();
        let mut skipped = Vec::new();

        for token in compact.split(',').filter(|t| !t.is_empty()) {
            match parse_token(token) {
                Ok(range) => pages.extend(range),
                Err(e) => {
                    tracing::warn!(token = %token, reason = %e, "Skipping invalid page token");
                    skipped.push(token.to_string());
                }
            }
        }

        if pages.is_empty() {
            tracing::warn!(
                expression = %expr,
                "Page selection is empty after dropping invalid tokens, selecting all pages"
            );
            return SelectionReport {
                selection: PageSelection::All,
                skipped,
                fell_back_to_all: true,
            };
        }

        SelectionReport {
            selection: PageSelection::Pages(pages),
            skipped,
            fell_back_to_all: false,
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, PageSelection::All)
    }

    /// Resolve against a document with `page_count` pages.
    ///
    /// Indices past the end of the document are dropped.
    pub fn resolve(&self, page_count: usize) -> Vec<usize> {
        match self {
            PageSelection::All => (0..page_count).collect(),
            PageSelection::Pages(pages) => {
                pages.iter().copied().filter(|&p| p < page_count).collect()
            }
        }
    }
}

fn parse_token(token: &str) -> Result<std::ops::RangeInclusive<usize>, TokenError> {
    match token.split_once('-') {
        Some((start, end)) => {
            let start = parse_page_number(start)?;
            let end = parse_page_number(end)?;
            if start > end {
                return Err(TokenError::Reversed);
            }
            Ok(start - 1..=end - 1)
        }
        None => {
            let page = parse_page_number(token)?;
            Ok(page - 1..=page - 1)
        }
    }
}

fn parse_page_number(raw: &str) -> Result<usize, TokenError> {
    let value: i64 = raw.parse().map_err(|_| TokenError::NotNumeric)?;
    if value < 1 {
        return Err(TokenError::BelowOne);
    }
    usize::try_from(value).map_err(|_| TokenError::NotNumeric)
}

/// Canonical form: 1-indexed, consecutive runs collapsed into ranges
impl fmt::Display for PageSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pages = match self {
            PageSelection::All => return f.write_str(ALL_TOKEN),
            PageSelection::Pages(pages) => pages,
        };

        let mut parts: Vec<String> = Vec::new();
        let mut iter = pages.iter().copied().peekable();
        while let Some(start) = iter.next() {
            let mut end = start;
            while iter.peek() == Some(&(end + 1)) {
                end += 1;
                iter.next();
            }
            if start == end {
                parts.push(format!("{}", start + 1));
            } else {
                parts.push(format!("{}-{}", start + 1, end + 1));
            }
        }
        f.write_str(&parts.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pages(list: &[usize]) -> PageSelection {
        PageSelection::Pages(list.iter().copied().collect())
    }

    #[test]
    fn test_mixed_ranges_and_singles() {
        assert_eq!(
            PageSelection::parse("1-5,7,10-12"),
            pages(&[0, 1, 2, 3, 4, 6, 9, 10, 11])
        );
    }

    #[test]
    fn test_all_and_empty() {
        assert_eq!(PageSelection::parse("all"), PageSelection::All);
        assert_eq!(PageSelection::parse("ALL"), PageSelection::All);
        assert_eq!(PageSelection::parse(""), PageSelection::All);
        assert_eq!(PageSelection::parse("   "), PageSelection::All);
    }

    #[test]
    fn test_zero_falls_back_to_all() {
        let report = PageSelection::parse_report("0");
        assert_eq!(report.selection, PageSelection::All);
        assert!(report.fell_back_to_all);
        assert_eq!(report.skipped, vec!["0".to_string()]);
    }

    #[test]
    fn test_invalid_tokens_are_skipped() {
        let report = PageSelection::parse_report("abc, 3, 5-2, 0-1, 8");
        assert_eq!(report.selection, pages(&[2, 7]));
        assert_eq!(report.skipped, vec!["abc", "5-2", "0-1"]);
        assert!(!report.fell_back_to_all);
    }

    #[test]
    fn test_whitespace_and_duplicates() {
        assert_eq!(PageSelection::parse(" 3 , 1 - 2 ,2,3 "), pages(&[0, 1, 2]));
    }

    #[test]
    fn test_canonical_rendering() {
        assert_eq!(PageSelection::parse("7,1-5,10-12").to_string(), "1-5,7,10-12");
        assert_eq!(PageSelection::parse("4").to_string(), "4");
        assert_eq!(PageSelection::All.to_string(), "all");
    }

    #[test]
    fn test_parse_render_is_idempotent() {
        for expr in ["1-5,7,10-12", "all", "", "3,2,1", "9-9", "2,4,6-8,7", "x,1"] {
            let first = PageSelection::parse(expr);
            let second = PageSelection::parse(&first.to_string());
            assert_eq!(first, second, "expression {:?}", expr);
        }
    }

    #[test]
    fn test_resolve_drops_out_of_range() {
        assert_eq!(PageSelection::parse("2,4,9").resolve(5), vec![1, 3]);
        assert_eq!(PageSelection::All.resolve(3), vec![0, 1, 2]);
    }
}
