//! String utilities shared by the schema model.

use regex::Regex;
use std::sync::LazyLock;

static LEADING_NON_LETTERS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^A-Za-z_]+").expect("leading pattern is valid"));
static LEADING_XML: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^xml").expect("xml pattern is valid"));
static INVALID_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9]+").expect("invalid-chars pattern is valid"));
static REPEATED_UNDERSCORES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_+").expect("underscore pattern is valid"));

/// Normalize a display name into a lower-case identifier.
///
/// A leading run of non-letters becomes `_`, as does a leading `xml`. Every
/// other run of characters outside `[A-Za-z0-9]` becomes a single `_`.
///
/// ```
/// use socrata_publisher::strings::underscoreize;
/// assert_eq!(underscoreize("Total Cost ($)"), "total_cost_");
/// assert_eq!(underscoreize("2012 Budget"), "_budget");
/// ```
pub fn underscoreize(input: &str) -> String {
    let output = LEADING_NON_LETTERS.replace(input, "_");
    let output = LEADING_XML.replace(&output, "_");
    let output = INVALID_CHARS.replace_all(&output, "_");
    let output = REPEATED_UNDERSCORES.replace_all(&output, "_");
    output.to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_underscoreize_simple() {
        assert_eq!(underscoreize("Name"), "name");
        assert_eq!(underscoreize("First Name"), "first_name");
        assert_eq!(underscoreize("a  --  b"), "a_b");
    }

    #[test]
    fn test_underscoreize_leading_characters() {
        assert_eq!(underscoreize("  spaced"), "_spaced");
        assert_eq!(underscoreize("123abc"), "_abc");
        assert_eq!(underscoreize("_id"), "_id");
        assert_eq!(underscoreize("#id"), "_id");
    }

    #[test]
    fn test_underscoreize_xml_prefix() {
        assert_eq!(underscoreize("XMLData"), "_data");
        assert_eq!(underscoreize("xml"), "_");
    }

    #[test]
    fn test_underscoreize_non_ascii() {
        assert_eq!(underscoreize("Café Name"), "caf_name");
        assert_eq!(underscoreize("Ünits"), "_nits");
    }

    #[test]
    fn test_underscoreize_empty() {
        assert_eq!(underscoreize(""), "");
    }
}
