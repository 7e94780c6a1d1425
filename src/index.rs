//! Persisted compile index (`index.json`) and staleness checks.
//!
//! One entry per compiled page or block, keyed `pages:<id>` / `blocks:<id>`:
//!
//! ```json
//! {
//!   "pages:home": {
//!     "id": "home",
//!     "name": "home",
//!     "type": "page",
//!     "variant": "",
//!     "config": { ... },
//!     "stamp": "<source fingerprint>",
//!     "path": { "block": "/src/pages/home", "template": "/src/pages/home" },
//!     "parent": "",
//!     "dependencies": ["css-block", "menu"],
//!     "mixins": { "environment": [], "used": [] },
//!     "compilation": {
//!       "time": "2026-10-19T12:00:00+02:00",
//!       "stamp": "<output fingerprint>",
//!       "path": "/bundle/pages/home",
//!       "compression": false
//!     }
//!   }
//! }
//! ```
//!
//! Entries are cache metadata only. A missing, damaged or outdated entry is
//! never an error: it just means the page gets compiled again.

use crate::config::{BlockConfig, Mixin};
use crate::fingerprint::{block_stamp, dir_stamp};
use crate::json::to_string_html_safe;
use crate::log;
use crate::types::BlockKind;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const INDEX_FILENAME: &str = "index.json";

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourcePaths {
    /// Block root directory.
    pub block: PathBuf,
    /// Variant directory the block was resolved to.
    pub template: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MixinRecord {
    /// Mixins handed down to this block's dependencies.
    pub environment: Vec<Mixin>,
    /// Mixins that changed this block's template.
    pub used: Vec<Mixin>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Compilation {
    /// RFC 3339 timestamp.
    pub time: String,
    /// Output fingerprint.
    pub stamp: String,
    pub path: PathBuf,
    pub compression: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: BlockKind,
    pub variant: String,
    pub config: BlockConfig,
    /// Source fingerprint.
    pub stamp: String,
    pub path: SourcePaths,
    pub parent: String,
    pub dependencies: Vec<String>,
    pub mixins: MixinRecord,
    pub compilation: Compilation,
}

impl IndexEntry {
    /// True if the entry still describes what is on disk.
    ///
    /// Unreadable directories count as a mismatch.
    pub fn is_fresh(&self, compression: bool) -> bool {
        self.compilation.compression == compression
            && self.compilation.path.is_dir()
            && block_stamp(&self.path.block, &self.path.template).is_ok_and(|s| s == self.stamp)
            && dir_stamp(&self.compilation.path).is_ok_and(|s| s == self.compilation.stamp)
    }
}

/// Inputs of a staleness check that come from the bundle.
#[derive(Debug, Clone, Copy)]
pub struct Freshness<'a> {
    pub compression: bool,
    /// Placeholder names that are not blocks.
    pub anchors: [&'a str; 2],
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Index {
    entries: BTreeMap<String, IndexEntry>,
}

impl Index {
    /// Load `<root>/index.json`. A missing or unreadable index is replaced by `{}`.
    pub fn load(root: &Path) -> Result<Self, IndexError> {
        let path = root.join(INDEX_FILENAME);
        let parsed = match fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str::<Index>(&content).ok(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };
        match parsed {
            Some(index) => Ok(index),
            None => {
                log::warning(&format!(
                    "index \"{}\" is missing or damaged, starting with an empty one",
                    path.display()
                ));
                let index = Index::default();
                index.save(root)?;
                Ok(index)
            }
        }
    }

    pub fn save(&self, root: &Path) -> Result<(), IndexError> {
        fs::write(root.join(INDEX_FILENAME), to_string_html_safe(self)?)?;
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&IndexEntry> {
        self.entries.get(key)
    }

    pub fn insert(&mut self, key: String, entry: IndexEntry) {
        self.entries.insert(key, entry);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Page entries in key order.
    pub fn pages(&self) -> impl Iterator<Item = &IndexEntry> {
        self.entries.values().filter(|e| e.kind == BlockKind::Page)
    }

    /// Whether the entry under `key` can be trusted without recompiling.
    ///
    /// The entry itself must be fresh, and so must the entry of every
    /// dependency it lists (one level deep; anchors are skipped). Every key
    /// found stale is added to `irrelevant`, and keys already there are
    /// stale for the rest of the run, even if their entry was rewritten
    /// in the meantime.
    pub fn is_actual(
        &self,
        key: &str,
        check: Freshness<'_>,
        irrelevant: &mut HashSet<String>,
    ) -> bool {
        let Some(entry) = self.get(key) else {
            irrelevant.insert(key.to_string());
            return false;
        };
        if irrelevant.contains(key) {
            return false;
        }
        if !entry.is_fresh(check.compression) {
            irrelevant.insert(key.to_string());
            return false;
        }

        for dep in &entry.dependencies {
            if check.anchors.contains(&dep.as_str()) {
                continue;
            }
            let dep_key = BlockKind::Block.index_key(dep);
            let fresh = !irrelevant.contains(&dep_key)
                && self
                    .get(&dep_key)
                    .is_some_and(|e| e.is_fresh(check.compression));
            if !fresh {
                irrelevant.insert(dep_key);
                irrelevant.insert(key.to_string());
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    const CHECK: Freshness<'static> = Freshness {
        compression: false,
        anchors: ["css-block", "js-block"],
    };

    /// Source and output directories for one block, with an entry matching them.
    fn recorded(root: &Path, kind: BlockKind, id: &str, deps: &[&str]) -> IndexEntry {
        let source = root.join("src").join(id);
        let output = root.join(kind.plural()).join(id);
        fs::create_dir_all(&source).unwrap();
        fs::create_dir_all(&output).unwrap();
        fs::write(source.join(format!("{id}.html")), id).unwrap();
        fs::write(output.join(format!("{id}.html")), id).unwrap();
        IndexEntry {
            id: id.to_string(),
            name: id.to_string(),
            kind,
            variant: String::new(),
            config: BlockConfig::default(),
            stamp: block_stamp(&source, &source).unwrap(),
            path: SourcePaths {
                block: source.clone(),
                template: source,
            },
            parent: String::new(),
            dependencies: deps.iter().map(|d| d.to_string()).collect(),
            mixins: MixinRecord::default(),
            compilation: Compilation {
                time: "2026-01-01T00:00:00+00:00".into(),
                stamp: dir_stamp(&output).unwrap(),
                path: output,
                compression: false,
            },
        }
    }

    fn touch(path: &Path, secs: u64) {
        let file = fs::OpenOptions::new().write(true).open(path).unwrap();
        file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(secs))
            .unwrap();
    }

    fn two_level(tmp: &TempDir) -> Index {
        let mut index = Index::default();
        index.insert(
            "pages:home".into(),
            recorded(tmp.path(), BlockKind::Page, "home", &["css-block", "menu"]),
        );
        index.insert(
            "blocks:menu".into(),
            recorded(tmp.path(), BlockKind::Block, "menu", &[]),
        );
        index
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    #[test]
    fn missing_index_loads_empty_and_writes_braces() {
        let tmp = TempDir::new().unwrap();
        let index = Index::load(tmp.path()).unwrap();
        assert!(index.is_empty());
        assert_eq!(fs::read_to_string(tmp.path().join(INDEX_FILENAME)).unwrap(), "{}");
    }

    #[test]
    fn damaged_index_is_reset() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(INDEX_FILENAME), "{not json").unwrap();
        let index = Index::load(tmp.path()).unwrap();
        assert!(index.is_empty());
        assert_eq!(fs::read_to_string(tmp.path().join(INDEX_FILENAME)).unwrap(), "{}");
    }

    #[test]
    fn save_load_roundtrip_is_byte_identical() {
        let tmp = TempDir::new().unwrap();
        let index = two_level(&tmp);
        index.save(tmp.path()).unwrap();
        let first = fs::read_to_string(tmp.path().join(INDEX_FILENAME)).unwrap();

        let loaded = Index::load(tmp.path()).unwrap();
        assert_eq!(loaded, index);
        loaded.save(tmp.path()).unwrap();
        let second = fs::read_to_string(tmp.path().join(INDEX_FILENAME)).unwrap();
        assert_eq!(first, second);
        assert!(first.contains("\"type\": \"page\""));
    }

    #[test]
    fn pages_filters_by_kind() {
        let tmp = TempDir::new().unwrap();
        let index = two_level(&tmp);
        let ids: Vec<&str> = index.pages().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["home"]);
    }

    // =========================================================================
    // Staleness
    // =========================================================================

    #[test]
    fn fresh_entries_are_actual() {
        let tmp = TempDir::new().unwrap();
        let index = two_level(&tmp);
        let mut irrelevant = HashSet::new();
        assert!(index.is_actual("pages:home", CHECK, &mut irrelevant));
        assert!(irrelevant.is_empty());
    }

    #[test]
    fn absent_entry_is_stale() {
        let index = Index::default();
        let mut irrelevant = HashSet::new();
        assert!(!index.is_actual("pages:home", CHECK, &mut irrelevant));
        assert!(irrelevant.contains("pages:home"));
    }

    #[test]
    fn compression_change_is_stale() {
        let tmp = TempDir::new().unwrap();
        let index = two_level(&tmp);
        let check = Freshness {
            compression: true,
            ..CHECK
        };
        assert!(!index.is_actual("pages:home", check, &mut HashSet::new()));
    }

    #[test]
    fn touched_source_is_stale() {
        let tmp = TempDir::new().unwrap();
        let index = two_level(&tmp);
        touch(&tmp.path().join("src/home/home.html"), 12_345);
        assert!(!index.is_actual("pages:home", CHECK, &mut HashSet::new()));
    }

    #[test]
    fn edited_output_is_stale() {
        let tmp = TempDir::new().unwrap();
        let index = two_level(&tmp);
        fs::write(tmp.path().join("pages/home/extra.txt"), "x").unwrap();
        assert!(!index.is_actual("pages:home", CHECK, &mut HashSet::new()));
    }

    #[test]
    fn deleted_output_is_stale() {
        let tmp = TempDir::new().unwrap();
        let index = two_level(&tmp);
        fs::remove_dir_all(tmp.path().join("pages/home")).unwrap();
        assert!(!index.is_actual("pages:home", CHECK, &mut HashSet::new()));
    }

    #[test]
    fn stale_dependency_makes_parent_stale() {
        let tmp = TempDir::new().unwrap();
        let index = two_level(&tmp);
        touch(&tmp.path().join("src/menu/menu.html"), 99);
        let mut irrelevant = HashSet::new();
        assert!(!index.is_actual("pages:home", CHECK, &mut irrelevant));
        assert!(irrelevant.contains("blocks:menu"));
    }

    #[test]
    fn missing_dependency_entry_makes_parent_stale() {
        let tmp = TempDir::new().unwrap();
        let mut index = Index::default();
        index.insert(
            "pages:home".into(),
            recorded(tmp.path(), BlockKind::Page, "home", &["menu"]),
        );
        assert!(!index.is_actual("pages:home", CHECK, &mut HashSet::new()));
    }

    #[test]
    fn anchors_are_not_dependencies() {
        let tmp = TempDir::new().unwrap();
        let mut index = Index::default();
        index.insert(
            "pages:home".into(),
            recorded(tmp.path(), BlockKind::Page, "home", &["css-block", "js-block"]),
        );
        assert!(index.is_actual("pages:home", CHECK, &mut HashSet::new()));
    }

    #[test]
    fn irrelevant_memo_short_circuits() {
        let tmp = TempDir::new().unwrap();
        let index = two_level(&tmp);
        let mut irrelevant = HashSet::from(["blocks:menu".to_string()]);
        assert!(!index.is_actual("pages:home", CHECK, &mut irrelevant));
        let mut irrelevant = HashSet::from(["pages:home".to_string()]);
        assert!(!index.is_actual("pages:home", CHECK, &mut irrelevant));
    }
}
