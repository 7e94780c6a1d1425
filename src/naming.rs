//! Centralized identifier parsing for the `base[_variant]*` convention.
//!
//! Every page and block is addressed by an identifier. The part before the
//! first underscore names the block's source directory; each further segment
//! names a nested variant directory inside it (a "workspace"):
//!
//! - `menu` → block `menu`, no workspace
//! - `menu_dark` → block `menu`, workspace `dark/`
//! - `menu_dark_mobile` → block `menu`, workspace `dark/mobile/`
//!
//! Identifiers are matched case-insensitively against
//! `[a-z0-9-]+(_[a-z0-9-]+)*`.

use regex::Regex;
use std::sync::LazyLock;

/// Separator between the block name and its variant segments.
pub const VARIANT_SEPARATOR: char = '_';

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^[a-z0-9-]+(?:_[a-z0-9-]+)*$").unwrap());

/// Result of parsing an identifier like `menu_dark_mobile`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedId {
    /// Source directory name of the block (`menu`).
    pub base: String,
    /// Ordered variant directory names (`["dark", "mobile"]`).
    pub variants: Vec<String>,
}

impl ParsedId {
    /// Variant segments joined with the separator, empty if there are none.
    pub fn workspace(&self) -> String {
        self.variants.join("_")
    }
}

/// True if `id` (already trimmed) follows the identifier syntax.
pub fn is_valid_identifier(id: &str) -> bool {
    IDENTIFIER.is_match(id)
}

/// Split an identifier into its block name and variant segments.
///
/// Returns `None` if the identifier is malformed.
pub fn parse_identifier(id: &str) -> Option<ParsedId> {
    let id = id.trim();
    if !is_valid_identifier(id) {
        return None;
    }
    let mut parts = id.split(VARIANT_SEPARATOR).map(str::to_string);
    let base = parts.next()?;
    Some(ParsedId {
        base,
        variants: parts.collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_block_name() {
        let p = parse_identifier("menu").unwrap();
        assert_eq!(p.base, "menu");
        assert!(p.variants.is_empty());
        assert_eq!(p.workspace(), "");
    }

    #[test]
    fn single_variant() {
        let p = parse_identifier("menu_dark").unwrap();
        assert_eq!(p.base, "menu");
        assert_eq!(p.variants, vec!["dark"]);
    }

    #[test]
    fn nested_variants_keep_order() {
        let p = parse_identifier("menu_dark_mobile").unwrap();
        assert_eq!(p.variants, vec!["dark", "mobile"]);
        assert_eq!(p.workspace(), "dark_mobile");
    }

    #[test]
    fn dashes_and_digits_allowed() {
        let p = parse_identifier("top-nav2_en-us").unwrap();
        assert_eq!(p.base, "top-nav2");
        assert_eq!(p.variants, vec!["en-us"]);
    }

    #[test]
    fn surrounding_whitespace_is_trimmed() {
        assert_eq!(parse_identifier("  footer ").unwrap().base, "footer");
    }

    #[test]
    fn rejects_malformed() {
        assert!(parse_identifier("").is_none());
        assert!(parse_identifier("menu_").is_none());
        assert!(parse_identifier("_menu").is_none());
        assert!(parse_identifier("menu__dark").is_none());
        assert!(parse_identifier("menu/dark").is_none());
        assert!(parse_identifier("menu dark").is_none());
    }

    #[test]
    fn case_insensitive() {
        assert!(is_valid_identifier("Header_Dark"));
    }
}
