//! Bundle orchestration: create/open, incremental compile, index queries.
//!
//! ```text
//! my-bundle/
//! ├── config.json        # BundleConfig
//! ├── index.json         # Index of compiled pages and blocks
//! ├── index.html         # navigation map, regenerated on every compile
//! ├── pages/             # compiled pages, one directory each
//! └── blocks/            # compiled blocks, one directory each
//! ```
//!
//! ## Compile
//!
//! For every configured page, in order:
//!
//! 1. Ask the index whether `pages:<id>` is still actual ([`Index::is_actual`]).
//! 2. If not, compile it: resolve, mix, recursively compile and merge every
//!    dependency, replace the CSS/JS anchors, save, record an index entry for
//!    the page and for each block on the way.
//!
//! Afterwards the navigation map is rendered and `index.json` is written.
//! Any failure aborts the whole run and leaves `index.json` untouched.

use crate::block::{BlockError, BlockSource, BuildSettings, CompiledBlock};
use crate::config::{BundleConfig, ConfigError, Mixin, ResolvedDirs};
use crate::fingerprint::{block_stamp, dir_stamp};
use crate::index::{Compilation, Freshness, Index, IndexEntry, IndexError, MixinRecord, SourcePaths};
use crate::log;
use crate::mixin::merge_mixins;
use crate::types::BlockKind;
use chrono::{DateTime, Local, SecondsFormat, Utc};
use maud::{DOCTYPE, Markup, PreEscaped, html};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Navigation map written to the bundle root.
pub const MAP_FILENAME: &str = "index.html";

const MAP_STYLE: &str = "table{width:auto;min-width:50%;margin:16px;border-collapse:collapse;}\
td{color:#333333;font-size:14px;vertical-align:top;padding:12px 0;border-bottom:1px solid #e6e6e6;}\
td a{color:#1976D2;text-decoration:none;}";

#[derive(Error, Debug)]
pub enum BundleError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error(transparent)]
    Block(#[from] BlockError),
    #[error("Bundle directory not found: {0}")]
    NotFound(PathBuf),
    #[error("No index entry for {kind} \"{id}\"; compile the bundle first")]
    NotCompiled { kind: BlockKind, id: String },
}

/// Pages compiled and skipped by one [`Bundle::compile`] run.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CompileReport {
    pub compiled: Vec<String>,
    pub skipped: Vec<String>,
}

#[derive(Debug)]
pub struct Bundle {
    root: PathBuf,
    config: BundleConfig,
    dirs: ResolvedDirs,
    index: Index,
    /// Keys found stale during the current compile run.
    irrelevant: HashSet<String>,
}

impl Bundle {
    /// Create a bundle in `root`: config, empty index, empty output directories.
    ///
    /// An existing bundle in `root` is overwritten, including its compiled
    /// pages and blocks. Source directories are left alone.
    pub fn create(root: &Path, mut config: BundleConfig) -> Result<Self, BundleError> {
        config.validate()?;
        fs::create_dir_all(root)?;
        let root = fs::canonicalize(root)?;

        config.save(&root)?;
        let index = Index::default();
        index.save(&root)?;
        let dirs = config.prepare(&root)?;
        let bundle = Bundle {
            root,
            config,
            dirs,
            index,
            irrelevant: HashSet::new(),
        };
        bundle.clear_compilation()?;
        log!("bundle"; "created bundle in \"{}\"", bundle.root.display());
        Ok(bundle)
    }

    /// Open an existing bundle.
    pub fn open(root: &Path) -> Result<Self, BundleError> {
        if !root.is_dir() {
            return Err(BundleError::NotFound(root.to_path_buf()));
        }
        let root = fs::canonicalize(root)?;
        let config = BundleConfig::load(&root)?;
        let dirs = config.prepare(&root)?;
        let index = Index::load(&root)?;
        Ok(Bundle {
            root,
            config,
            dirs,
            index,
            irrelevant: HashSet::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &BundleConfig {
        &self.config
    }

    pub fn index(&self) -> &Index {
        &self.index
    }

    /// Compile every stale page.
    pub fn compile(&mut self) -> Result<CompileReport, BundleError> {
        let snapshot = self.index.clone();
        self.irrelevant.clear();

        let result = self.compile_pages();
        self.irrelevant.clear();

        match result {
            Ok(report) => {
                fs::write(self.root.join(MAP_FILENAME), self.render_map().into_string())?;
                self.index.save(&self.root)?;
                Ok(report)
            }
            Err(e) => {
                self.index = snapshot;
                Err(e)
            }
        }
    }

    fn compile_pages(&mut self) -> Result<CompileReport, BundleError> {
        let settings = BuildSettings {
            compression: self.config.compression,
            ignore: self.config.ignore_patterns(),
            attach_dir: self.dirs.attach.clone(),
        };
        let mut report = CompileReport::default();

        for page in self.config.pages.clone() {
            let key = BlockKind::Page.index_key(&page);
            let check = Freshness {
                compression: self.config.compression,
                anchors: [self.config.anchor_css.as_str(), self.config.anchor_js.as_str()],
            };
            if self.index.is_actual(&key, check, &mut self.irrelevant) {
                report.skipped.push(page);
                continue;
            }
            let mut stack = Vec::new();
            self.compile_block(BlockKind::Page, &page, "", &[], &settings, &mut stack)?;
            log!("compile"; "page \"{}\" compiled", page);
            report.compiled.push(page);
        }
        Ok(report)
    }

    /// Compile one page or block and everything it depends on.
    ///
    /// `stack` holds the keys currently being compiled; meeting one of them
    /// again is a cycle.
    fn compile_block(
        &mut self,
        kind: BlockKind,
        id: &str,
        parent: &str,
        mixins: &[Mixin],
        settings: &BuildSettings,
        stack: &mut Vec<String>,
    ) -> Result<CompiledBlock, BlockError> {
        let key = kind.index_key(id);
        if stack.contains(&key) {
            let mut chain = stack.clone();
            chain.push(key);
            return Err(BlockError::Cycle(chain.join(" → ")));
        }
        stack.push(key);
        let result = self
            .assemble(kind, id, parent, mixins, settings, stack)
            .map_err(|e| e.context(kind, id));
        stack.pop();
        result
    }

    fn assemble(
        &mut self,
        kind: BlockKind,
        id: &str,
        parent: &str,
        mixins: &[Mixin],
        settings: &BuildSettings,
        stack: &mut Vec<String>,
    ) -> Result<CompiledBlock, BlockError> {
        let sources = match kind {
            BlockKind::Page => self.dirs.pages.clone(),
            BlockKind::Block => self.dirs.blocks.clone(),
        };
        let mut block = BlockSource::resolve(kind, id, &sources, settings)?.compile(mixins)?;
        if block.mixed {
            block.config.label = format!("{parent}_");
        }

        let environment = merge_mixins(mixins, &block.config.mixins);
        for dep in block.dependencies.clone() {
            if self.config.is_anchor(&dep) {
                continue;
            }
            let child =
                self.compile_block(BlockKind::Block, &dep, id, &environment, settings, stack)?;
            block.merge(child)?;
        }

        if kind == BlockKind::Page {
            let ts = Utc::now().timestamp();
            let name = block.name.clone();
            block.replace_placeholder(
                &self.config.anchor_css,
                &format!("<link href=\"{name}.css?{ts}\" rel=\"stylesheet\"/>"),
            );
            block.replace_placeholder(
                &self.config.anchor_js,
                &format!("<script src=\"{name}.js?{ts}\"></script>"),
            );
        }

        let output = block.save(&self.root.join(kind.plural()), &settings.attach_dir)?;
        let entry = IndexEntry {
            id: id.to_string(),
            name: block.name.clone(),
            kind,
            variant: block.workspace.clone(),
            config: block.config.clone(),
            stamp: block_stamp(&block.path, &block.workspace_path)?,
            path: SourcePaths {
                block: block.path.clone(),
                template: block.workspace_path.clone(),
            },
            parent: parent.to_string(),
            dependencies: block.dependencies.clone(),
            mixins: MixinRecord {
                environment,
                used: block.used_mixins.clone(),
            },
            compilation: Compilation {
                time: Local::now().to_rfc3339_opts(SecondsFormat::Secs, false),
                stamp: dir_stamp(&output)?,
                path: output,
                compression: self.config.compression,
            },
        };
        self.index.insert(kind.index_key(id), entry);
        Ok(block)
    }

    /// Clear the index, in memory and on disk.
    pub fn reset_index(&mut self) -> Result<(), BundleError> {
        self.index.clear();
        self.index.save(&self.root)?;
        Ok(())
    }

    /// Remove everything under `pages/` and `blocks/`.
    pub fn clear_compilation(&self) -> Result<(), BundleError> {
        for kind in [BlockKind::Page, BlockKind::Block] {
            let dir = self.root.join(kind.plural());
            if dir.is_dir() {
                fs::remove_dir_all(&dir)?;
            }
            fs::create_dir_all(&dir)?;
        }
        Ok(())
    }

    /// Selected fields of an index entry as a JSON object.
    ///
    /// No fields means all of them. The extra field `actual` reports whether
    /// the entry would be trusted by the next compile. Unknown field names
    /// are skipped.
    pub fn info(
        &self,
        kind: BlockKind,
        id: &str,
        fields: &[String],
    ) -> Result<Map<String, Value>, BundleError> {
        let key = kind.index_key(id);
        let entry = self.index.get(&key).ok_or_else(|| BundleError::NotCompiled {
            kind,
            id: id.to_string(),
        })?;

        let mut all = match serde_json::to_value(entry).map_err(IndexError::from)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        if fields.is_empty() || fields.iter().any(|f| f == "actual") {
            let check = Freshness {
                compression: self.config.compression,
                anchors: [self.config.anchor_css.as_str(), self.config.anchor_js.as_str()],
            };
            let actual = self.index.is_actual(&key, check, &mut HashSet::new());
            all.insert("actual".into(), Value::Bool(actual));
        }
        if fields.is_empty() {
            return Ok(all);
        }
        Ok(fields
            .iter()
            .filter_map(|f| all.get(f).map(|v| (f.clone(), v.clone())))
            .collect())
    }

    pub fn add_pages(&mut self, pages: &[String]) -> Result<(), BundleError> {
        self.config.add_pages(pages)?;
        self.config.save(&self.root)?;
        Ok(())
    }

    pub fn remove_pages(&mut self, pages: &[String]) -> Result<(), BundleError> {
        self.config.remove_pages(pages);
        self.config.save(&self.root)?;
        Ok(())
    }

    pub fn add_ignore(&mut self, patterns: &[String]) -> Result<(), BundleError> {
        self.config.add_ignore(patterns)?;
        self.config.save(&self.root)?;
        Ok(())
    }

    pub fn remove_ignore(&mut self, patterns: &[String]) -> Result<(), BundleError> {
        self.config.remove_ignore(patterns);
        self.config.save(&self.root)?;
        Ok(())
    }

    /// Navigation map: one row per compiled page.
    fn render_map(&self) -> Markup {
        html! {
            (DOCTYPE)
            html {
                head {
                    meta charset="UTF-8";
                    title { "Bundle map" }
                    style { (PreEscaped(MAP_STYLE)) }
                }
                body {
                    table {
                        @for entry in self.index.pages() {
                            (map_row(entry, &self.root))
                        }
                    }
                }
            }
        }
    }
}

fn map_row(entry: &IndexEntry, root: &Path) -> Markup {
    let name = if entry.config.name.is_empty() {
        &entry.id
    } else {
        &entry.config.name
    };
    let description = if entry.config.description.is_empty() {
        "—"
    } else {
        entry.config.description.as_str()
    };
    let compiled = DateTime::parse_from_rfc3339(&entry.compilation.time)
        .map(|t| t.format("%d.%m.%Y %H:%M:%S").to_string())
        .unwrap_or_else(|_| "—".to_string());
    let relative = entry
        .compilation
        .path
        .strip_prefix(root)
        .unwrap_or(&entry.compilation.path);
    let link = format!("./{}/{}.html", relative.to_string_lossy(), entry.name);

    html! {
        tr {
            td {
                a href=(link) target="_blank" { (name) " (ID: " (entry.id) ")" }
                br;
                (description)
            }
            td { "Compiled: " (compiled) }
        }
    }
}
