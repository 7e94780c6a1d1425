//! Shared types used across the block engine, the index, and the orchestrator.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether a compiled unit is a top-level page or a reusable block.
///
/// Pages are the compile entry points and have no parent. Blocks are only
/// ever compiled as dependencies of a page or of another block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockKind {
    Page,
    Block,
}

impl BlockKind {
    /// Plural form used for index-key prefixes and output directory names.
    pub fn plural(self) -> &'static str {
        match self {
            BlockKind::Page => "pages",
            BlockKind::Block => "blocks",
        }
    }

    /// Index key for an identifier of this kind: `pages:home`, `blocks:menu_dark`.
    pub fn index_key(self, id: &str) -> String {
        format!("{}:{}", self.plural(), id)
    }

    /// Parse either the singular or plural spelling (`page`, `pages`, ...).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "page" | "pages" => Some(BlockKind::Page),
            "block" | "blocks" => Some(BlockKind::Block),
            _ => None,
        }
    }
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockKind::Page => f.write_str("page"),
            BlockKind::Block => f.write_str("block"),
        }
    }
}
