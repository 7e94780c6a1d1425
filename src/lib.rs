//! # Blocksmith
//!
//! An incremental builder for static pages assembled from reusable blocks.
//! A block is a directory holding a template, a stylesheet, a script and any
//! attachment files. Templates pull other blocks in with `#block-id#`
//! placeholders; compiling a page inlines the whole dependency tree into one
//! HTML file with one stylesheet and one script next to it.
//!
//! # Architecture
//!
//! ```text
//! Bundle::compile
//!   └─ for each stale page
//!        └─ BlockSource::resolve → compile (mixins) → merge children → save
//!             └─ css / js / mixin engines, fingerprints for the index entry
//! ```
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`bundle`] | Orchestration: create/open a bundle, incremental compile, index queries, navigation map |
//! | [`index`] | Persisted `index.json`, index entries and the staleness check |
//! | [`block`] | Block assembly: source resolution, variants, merge, save |
//! | [`css`] | Stylesheet parse/merge/emit used when compression is on |
//! | [`js`] | Comment and whitespace minifier for scripts |
//! | [`mixin`] | Class injection into template elements |
//! | [`fingerprint`] | Source and output stamps (SHA-256 over path, size, mtime) |
//! | [`config`] | `config.json` for bundles and blocks: loading, cascading, validation |
//! | [`naming`] | `base[_variant]*` identifier parsing |
//! | [`types`] | `BlockKind` and index-key construction |
//! | [`json`] | Pretty JSON with HTML-sensitive characters escaped |
//! | [`output`] | CLI output formatting |
//! | [`log`] | `log!` macro with colored module prefixes |
//!
//! # Design Decisions
//!
//! ## Fingerprints Over Timestamps
//!
//! Staleness is decided by comparing stamps, not by comparing a source mtime
//! with an output mtime. A stamp covers a set of files (name, size, mtime),
//! so adding, deleting or renaming a file is detected as well as editing one.
//! The output directory is stamped too: a hand-edited or deleted compiled
//! file triggers a rebuild.
//!
//! ## One-Level Dependency Check
//!
//! A page is trusted if its own stamps match and the entries of the blocks it
//! lists are fresh. Deeper levels are not walked: a merged child's
//! dependencies are already part of the parent's dependency list, and every
//! entry was verified when it was written.
//!
//! ## Typed Compile Stages
//!
//! [`block::BlockSource`] and [`block::CompiledBlock`] are separate types.
//! Merging, placeholder replacement and saving exist only on the compiled
//! form, so "merge before compile" cannot be expressed.

pub mod block;
pub mod bundle;
pub mod config;
pub mod css;
pub mod fingerprint;
pub mod index;
pub mod js;
pub mod json;
pub mod log;
pub mod mixin;
pub mod naming;
pub mod output;
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;
