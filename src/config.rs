//! Bundle and block configuration.
//!
//! Two kinds of `config.json` exist:
//!
//! ```text
//! my-bundle/
//! ├── config.json              # BundleConfig: source dirs, anchors, page list
//! └── ...
//! src/blocks/menu/
//! ├── menu.json                # BlockConfig (or config.json)
//! ├── menu.html
//! └── dark/
//!     └── config.json          # Variant config, cascades over menu.json
//! ```
//!
//! ## Bundle Configuration
//!
//! ```json
//! {
//!   "sources_pages": "src/pages",
//!   "sources_blocks": "src/blocks",
//!   "attachable_files": "src/attach",
//!   "anchor_css": "css-block",
//!   "anchor_js": "js-block",
//!   "compression": false,
//!   "pages": ["home", "about"],
//!   "ignore": ["\\.psd", "\\.DS_Store"]
//! }
//! ```
//!
//! The three directory fields are required. Relative paths resolve against
//! the bundle root. Unknown keys are rejected to catch typos early.
//!
//! ## Block Configuration
//!
//! ```json
//! {
//!   "name": "Main menu",
//!   "description": "Top navigation",
//!   "dependencies": ["logo", "search_compact"],
//!   "mixins": [{"tag": "ul", "class": "menu", "mixin": "menu--dark"}]
//! }
//! ```
//!
//! Every field is optional. Variant directories may carry their own config,
//! which is merged over the parent level: keys overlay, arrays union, scalars
//! replace (see [`merge_json`]).

use crate::log;
use crate::naming::is_valid_identifier;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error in {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Config validation error: {0}")]
    Validation(String),
    #[error("Bundle config not found: {0}")]
    NotFound(PathBuf),
}

/// Name of the config file in the bundle root and in block directories.
pub const CONFIG_FILENAME: &str = "config.json";

// =============================================================================
// Bundle configuration
// =============================================================================

/// Bundle configuration loaded from `<bundle>/config.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BundleConfig {
    /// Directory holding page sources, one subdirectory per page.
    pub sources_pages: PathBuf,
    /// Directory holding block sources, one subdirectory per block.
    pub sources_blocks: PathBuf,
    /// Directory that `_attach/<path>` references in templates resolve against.
    pub attachable_files: PathBuf,
    /// Placeholder name replaced by the stylesheet link in pages.
    #[serde(default = "default_anchor_css")]
    pub anchor_css: String,
    /// Placeholder name replaced by the script tag in pages.
    #[serde(default = "default_anchor_js")]
    pub anchor_js: String,
    /// Merge/minify CSS and JS instead of concatenating them.
    #[serde(default)]
    pub compression: bool,
    /// Ordered page identifiers compiled by `compile`.
    #[serde(default)]
    pub pages: Vec<String>,
    /// Regular expressions; source files whose path ends with a match are not attachments.
    #[serde(default)]
    pub ignore: Vec<String>,
}

fn default_anchor_css() -> String {
    "css-block".to_string()
}

fn default_anchor_js() -> String {
    "js-block".to_string()
}

impl BundleConfig {
    /// Config with the given source directories and all other values defaulted.
    pub fn new(
        sources_pages: impl Into<PathBuf>,
        sources_blocks: impl Into<PathBuf>,
        attachable_files: impl Into<PathBuf>,
    ) -> Self {
        Self {
            sources_pages: sources_pages.into(),
            sources_blocks: sources_blocks.into(),
            attachable_files: attachable_files.into(),
            anchor_css: default_anchor_css(),
            anchor_js: default_anchor_js(),
            compression: false,
            pages: Vec::new(),
            ignore: Vec::new(),
        }
    }

    /// Normalize list fields and check all values.
    ///
    /// Page identifiers and ignore patterns are trimmed; empty entries and
    /// duplicates are dropped.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        for (field, path) in [
            ("sources_pages", &self.sources_pages),
            ("sources_blocks", &self.sources_blocks),
            ("attachable_files", &self.attachable_files),
        ] {
            if path.as_os_str().is_empty() {
                return Err(ConfigError::Validation(format!("{field} must not be empty")));
            }
        }
        for (field, anchor) in [("anchor_css", &self.anchor_css), ("anchor_js", &self.anchor_js)] {
            if !is_valid_identifier(anchor) {
                return Err(ConfigError::Validation(format!(
                    "{field} \"{anchor}\" is not a valid placeholder name"
                )));
            }
        }
        if self.anchor_css == self.anchor_js {
            return Err(ConfigError::Validation(
                "anchor_css and anchor_js must differ".into(),
            ));
        }
        self.pages = normalize_list(&self.pages);
        if let Some(bad) = self.pages.iter().find(|p| !is_valid_identifier(p)) {
            return Err(ConfigError::Validation(format!(
                "incorrect page identifier \"{bad}\" in bundle configuration"
            )));
        }
        self.ignore = normalize_list(&self.ignore);
        for pattern in &self.ignore {
            Regex::new(pattern).map_err(|e| {
                ConfigError::Validation(format!("incorrect ignore pattern \"{pattern}\": {e}"))
            })?;
        }
        Ok(())
    }

    /// Resolve relative source directories against `root` and create the
    /// ones that do not exist yet.
    pub fn prepare(&self, root: &Path) -> Result<ResolvedDirs, ConfigError> {
        let dirs = ResolvedDirs {
            pages: resolve_dir(root, &self.sources_pages),
            blocks: resolve_dir(root, &self.sources_blocks),
            attach: resolve_dir(root, &self.attachable_files),
        };
        for (label, dir) in [
            ("source pages", &dirs.pages),
            ("source blocks", &dirs.blocks),
            ("attachable files", &dirs.attach),
        ] {
            if !dir.exists() {
                fs::create_dir_all(dir)?;
                log::notice(&format!(
                    "created directory for {label}: \"{}\"",
                    dir.display()
                ));
            }
        }
        Ok(dirs)
    }

    /// Compiled ignore patterns, each anchored to the end of the path.
    pub fn ignore_patterns(&self) -> Vec<Regex> {
        self.ignore
            .iter()
            .filter_map(|p| Regex::new(&format!("(?i)(?:{p})$")).ok())
            .collect()
    }

    /// True if `id` is one of the two anchor placeholders rather than a block.
    pub fn is_anchor(&self, id: &str) -> bool {
        id == self.anchor_css || id == self.anchor_js
    }

    /// Append page identifiers that are not already listed.
    pub fn add_pages(&mut self, pages: &[String]) -> Result<(), ConfigError> {
        for page in normalize_list(pages) {
            if !is_valid_identifier(&page) {
                return Err(ConfigError::Validation(format!(
                    "incorrect page identifier \"{page}\""
                )));
            }
            if !self.pages.contains(&page) {
                self.pages.push(page);
            }
        }
        Ok(())
    }

    pub fn remove_pages(&mut self, pages: &[String]) {
        let pages = normalize_list(pages);
        self.pages.retain(|p| !pages.contains(p));
    }

    pub fn add_ignore(&mut self, patterns: &[String]) -> Result<(), ConfigError> {
        for pattern in normalize_list(patterns) {
            Regex::new(&pattern).map_err(|e| {
                ConfigError::Validation(format!("incorrect ignore pattern \"{pattern}\": {e}"))
            })?;
            if !self.ignore.contains(&pattern) {
                self.ignore.push(pattern);
            }
        }
        Ok(())
    }

    pub fn remove_ignore(&mut self, patterns: &[String]) {
        let patterns = normalize_list(patterns);
        self.ignore.retain(|p| !patterns.contains(p));
    }

    /// Load and validate `<root>/config.json`.
    pub fn load(root: &Path) -> Result<Self, ConfigError> {
        let path = root.join(CONFIG_FILENAME);
        if !path.is_file() {
            return Err(ConfigError::NotFound(path));
        }
        let content = fs::read_to_string(&path)?;
        let mut config: BundleConfig =
            serde_json::from_str(&content).map_err(|source| ConfigError::Json {
                path: path.clone(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Write to `<root>/config.json`.
    pub fn save(&self, root: &Path) -> Result<(), ConfigError> {
        let path = root.join(CONFIG_FILENAME);
        let json = crate::json::to_string_html_safe(self).map_err(|source| ConfigError::Json {
            path: path.clone(),
            source,
        })?;
        fs::write(path, json)?;
        Ok(())
    }
}

/// Absolute source directories of a bundle.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedDirs {
    pub pages: PathBuf,
    pub blocks: PathBuf,
    pub attach: PathBuf,
}

fn resolve_dir(root: &Path, dir: &Path) -> PathBuf {
    if dir.is_absolute() {
        dir.to_path_buf()
    } else {
        root.join(dir)
    }
}

/// Trim entries, drop empty ones and duplicates, keep first-occurrence order.
fn normalize_list(items: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for item in items {
        let item = item.trim();
        if !item.is_empty() && !out.iter().any(|o| o == item) {
            out.push(item.to_string());
        }
    }
    out
}

// =============================================================================
// Block configuration
// =============================================================================

/// A rule injecting a CSS class into matching elements of a template.
///
/// At least one of `tag`, `id`, `class` selects the elements; `mixin` is
/// the class token added to them.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Mixin {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    pub mixin: String,
}

impl Mixin {
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn token(v: &Option<String>) -> Option<&str> {
            v.as_deref().map(str::trim).filter(|s| !s.is_empty())
        }
        let selector_ok = [&self.tag, &self.id, &self.class]
            .into_iter()
            .any(|v| token(v).is_some());
        if self.mixin.trim().is_empty() || !selector_ok {
            return Err(ConfigError::Validation(
                "incorrect mixin format in block configuration: \"mixin\" and one of \"tag\", \"id\", \"class\" are required".into(),
            ));
        }
        if self.mixin.split_whitespace().count() != 1 {
            return Err(ConfigError::Validation(format!(
                "mixin \"{}\" must be a single class name",
                self.mixin
            )));
        }
        Ok(())
    }
}

/// Per-block configuration, after all variant levels have been merged.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BlockConfig {
    /// Display name (shown in the navigation map).
    pub name: String,
    pub description: String,
    /// Mixins this block passes down to its dependencies.
    pub mixins: Vec<Mixin>,
    /// Declared dependency identifiers, in addition to `#id#` placeholders.
    pub dependencies: Vec<String>,
    /// Bundle compression flag at compile time.
    pub compression: bool,
    /// Output directory prefix; `<parent>_` when inherited mixins applied.
    pub label: String,
}

impl BlockConfig {
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        for mixin in &self.mixins {
            mixin.validate()?;
        }
        self.dependencies = normalize_list(&self.dependencies);
        if let Some(bad) = self.dependencies.iter().find(|d| !is_valid_identifier(d)) {
            return Err(ConfigError::Validation(format!(
                "incorrect dependency identifier \"{bad}\" in block configuration"
            )));
        }
        Ok(())
    }
}

/// Locate a block-level config file: `<name>.json` wins over `config.json`.
pub fn find_block_config(dir: &Path, name: &str) -> Option<PathBuf> {
    [dir.join(format!("{name}.json")), dir.join(CONFIG_FILENAME)]
        .into_iter()
        .find(|p| p.is_file())
}

/// Load a block-level config file as a raw JSON value.
///
/// Returns `Ok(None)` if the directory has no config file, or the file is
/// empty. Returns `Err` if the file exists but is not a JSON object.
pub fn load_raw_block_config(dir: &Path, name: &str) -> Result<Option<Value>, ConfigError> {
    let Some(path) = find_block_config(dir, name) else {
        return Ok(None);
    };
    let content = fs::read_to_string(&path)?;
    if content.trim().is_empty() {
        return Ok(None);
    }
    let value: Value =
        serde_json::from_str(&content).map_err(|source| ConfigError::Json { path: path.clone(), source })?;
    if !value.is_object() {
        return Err(ConfigError::Validation(format!(
            "block config {} must be a JSON object",
            path.display()
        )));
    }
    Ok(Some(value))
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Objects are merged key-by-key (overlay keys override base keys).
/// - Arrays are unioned: base items first, then overlay items not already present.
/// - Other overlay values replace base values entirely.
pub fn merge_json(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_val) in overlay_map {
                let merged = match base_map.remove(&key) {
                    Some(base_val) => merge_json(base_val, overlay_val),
                    None => overlay_val,
                };
                base_map.insert(key, merged);
            }
            Value::Object(base_map)
        }
        (Value::Array(mut base_items), Value::Array(overlay_items)) => {
            for item in overlay_items {
                if !base_items.contains(&item) {
                    base_items.push(item);
                }
            }
            Value::Array(base_items)
        }
        (_, overlay) => overlay,
    }
}

/// Deserialize a merged block config value and validate it.
pub fn resolve_block_config(value: Option<Value>) -> Result<BlockConfig, ConfigError> {
    let mut config: BlockConfig = match value {
        Some(v) => serde_json::from_value(v).map_err(|e| {
            ConfigError::Validation(format!("incorrect block configuration: {e}"))
        })?,
        None => BlockConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

/// Stock bundle `config.json`, used by the `gen-config` CLI command.
pub fn stock_config_json() -> String {
    let config = BundleConfig::new("src/pages", "src/blocks", "src/attach");
    crate::json::to_string_html_safe(&config).unwrap_or_default()
}
