//! Block assembly: resolve a block's sources, compile, merge children, save.
//!
//! A block goes through two stages:
//!
//! ```text
//! BlockSource::resolve ──► BlockSource::compile ──► CompiledBlock
//!   (files, config)          (template, deps,         │ merge(child)...
//!                             mixins applied)         │ replace_placeholder
//!                                                     ▼ save → output dir
//! ```
//!
//! ## Source layout
//!
//! ```text
//! blocks/menu/
//! ├── menu.json          # config (or config.json)
//! ├── menu.html          # template (or template.html, menu.tpl, template.tpl)
//! ├── menu.css           # stylesheet (or style.css)
//! ├── menu.js            # script (or script.js)
//! ├── arrow.svg          # attachment, copied to the output
//! └── dark/              # variant: identifier `menu_dark`
//!     ├── menu.html      # overrides the template above
//!     ├── menu.css       # added after the base stylesheet
//!     └── config.json    # merged over the base config
//! ```
//!
//! ## Output layout
//!
//! ```text
//! blocks/<label><name>[_<variants>]/
//! ├── <name>.html        # template wrapped in <!--block:DIR--> ... <!--end:DIR-->
//! ├── <name>.css         # own + inherited stylesheets
//! ├── <name>.js          # own + inherited scripts
//! └── ...                # attachments
//! ```

use crate::config::{
    BlockConfig, ConfigError, Mixin, load_raw_block_config, merge_json, resolve_block_config,
};
use crate::fingerprint::FingerprintError;
use crate::js::{self, MinifyError};
use crate::mixin::{apply_mixins, merge_mixins};
use crate::naming::parse_identifier;
use crate::types::BlockKind;
use crate::{css, log};
use regex::Regex;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use thiserror::Error;

static DEPENDENCY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)#([a-z0-9-]+(?:_[a-z0-9-]+)*)#").unwrap());
static ATTACHMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/?_attach/([\w./-]+)").unwrap());

#[derive(Error, Debug)]
pub enum BlockError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Fingerprint(#[from] FingerprintError),
    #[error("Incorrect block identifier \"{0}\"")]
    InvalidId(String),
    #[error("Block directory not found: {0}")]
    NotFound(PathBuf),
    #[error("Template directory not found: {0}")]
    VariantNotFound(PathBuf),
    #[error("Compressing script {file}: {source}")]
    Script { file: PathBuf, source: MinifyError },
    #[error("Recursive connection of blocks: {0}")]
    Cycle(String),
    #[error("{block} → {source}")]
    Context {
        block: String,
        source: Box<BlockError>,
    },
}

impl BlockError {
    /// Wrap with the block being compiled when the error surfaced.
    pub fn context(self, kind: BlockKind, id: &str) -> Self {
        BlockError::Context {
            block: format!("{kind} \"{id}\""),
            source: Box::new(self),
        }
    }
}

/// Bundle-wide settings a block needs while resolving and saving.
#[derive(Debug, Clone)]
pub struct BuildSettings {
    pub compression: bool,
    pub ignore: Vec<Regex>,
    pub attach_dir: PathBuf,
}

/// Attachment files by output name.
pub type Attachments = BTreeMap<String, PathBuf>;

/// A block located on disk, with every variant level overlaid.
#[derive(Debug, Clone)]
pub struct BlockSource {
    pub kind: BlockKind,
    /// Directory name of the block (identifier without variants).
    pub name: String,
    /// Variant segments joined with `_`; empty without variants.
    pub workspace: String,
    /// Block root directory.
    pub path: PathBuf,
    /// Deepest variant directory (`path` itself without variants).
    pub workspace_path: PathBuf,
    pub template_file: Option<PathBuf>,
    pub css: Vec<PathBuf>,
    pub js: Vec<PathBuf>,
    pub files: Attachments,
    pub config: BlockConfig,
}

fn find_first(dir: &Path, candidates: &[String]) -> Option<PathBuf> {
    candidates.iter().map(|c| dir.join(c)).find(|p| p.is_file())
}

fn is_reserved(file_name: &str, block_name: &str) -> bool {
    let lower = file_name.to_ascii_lowercase();
    let own = block_name.to_ascii_lowercase();
    if let Some((stem, ext)) = lower.rsplit_once('.') {
        if stem == own && matches!(ext, "tpl" | "html" | "css" | "js" | "json") {
            return true;
        }
    }
    matches!(
        lower.as_str(),
        "template.html" | "template.tpl" | "style.css" | "script.js" | "config.json"
    )
}

impl BlockSource {
    /// Locate `id` under `sources` and overlay its variant directories.
    pub fn resolve(
        kind: BlockKind,
        id: &str,
        sources: &Path,
        settings: &BuildSettings,
    ) -> Result<Self, BlockError> {
        let parsed = parse_identifier(id).ok_or_else(|| BlockError::InvalidId(id.to_string()))?;
        let path = sources.join(&parsed.base);
        if !path.is_dir() {
            return Err(BlockError::NotFound(path));
        }

        let mut source = BlockSource {
            kind,
            name: parsed.base.clone(),
            workspace: parsed.workspace(),
            path: path.clone(),
            workspace_path: path.clone(),
            template_file: None,
            css: Vec::new(),
            js: Vec::new(),
            files: Attachments::new(),
            config: BlockConfig::default(),
        };

        let mut raw_config = load_raw_block_config(&path, &source.name)?;
        source.scan_level(&path, settings)?;

        let mut level = path;
        for variant in &parsed.variants {
            level.push(variant);
            if !level.is_dir() {
                return Err(BlockError::VariantNotFound(level));
            }
            source.scan_level(&level, settings)?;
            if let Some(overlay) = load_raw_block_config(&level, &source.name)? {
                raw_config = Some(match raw_config {
                    Some(base) => merge_json(base, overlay),
                    None => overlay,
                });
            }
        }
        source.workspace_path = level;

        source.config = resolve_block_config(raw_config)?;
        source.config.compression = settings.compression;
        source.config.label.clear();
        Ok(source)
    }

    /// Pick up template, stylesheet, script and attachments of one level.
    fn scan_level(&mut self, dir: &Path, settings: &BuildSettings) -> Result<(), BlockError> {
        let name = &self.name;
        let templates = [
            format!("{name}.html"),
            "template.html".to_string(),
            format!("{name}.tpl"),
            "template.tpl".to_string(),
        ];
        if let Some(file) = find_first(dir, &templates) {
            self.template_file = Some(file);
        }
        if let Some(file) = find_first(dir, &[format!("{name}.css"), "style.css".to_string()]) {
            self.css.push(file);
        }
        if let Some(file) = find_first(dir, &[format!("{name}.js"), "script.js".to_string()]) {
            self.js.push(file);
        }

        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let file_name = entry.file_name().to_string_lossy().into_owned();
            let file_path = entry.path();
            let full = file_path.to_string_lossy();
            if is_reserved(&file_name, name) || settings.ignore.iter().any(|re| re.is_match(&full)) {
                continue;
            }
            self.files.insert(file_name, file_path);
        }
        Ok(())
    }

    /// Read the template, collect dependencies and apply inherited mixins.
    pub fn compile(self, mixins: &[Mixin]) -> Result<CompiledBlock, BlockError> {
        let mut dependencies = self.config.dependencies.clone();
        let (template, used_mixins) = match &self.template_file {
            Some(file) => {
                let text = fs::read_to_string(file)?;
                for caps in DEPENDENCY.captures_iter(&text) {
                    let id = caps[1].to_string();
                    if !dependencies.contains(&id) {
                        dependencies.push(id);
                    }
                }
                apply_mixins(&text, mixins)
            }
            None => (String::new(), Vec::new()),
        };

        Ok(CompiledBlock {
            kind: self.kind,
            name: self.name,
            workspace: self.workspace,
            path: self.path,
            workspace_path: self.workspace_path,
            template,
            css: self.css,
            js: self.js,
            css_dependencies: Vec::new(),
            js_dependencies: Vec::new(),
            files: self.files,
            config: self.config,
            dependencies,
            mixed: !used_mixins.is_empty(),
            used_mixins,
            merged: false,
        })
    }
}

/// A block whose template has been read and mixed. Only compiled blocks
/// can be merged, have placeholders replaced, or be saved.
#[derive(Debug, Clone)]
pub struct CompiledBlock {
    pub kind: BlockKind,
    pub name: String,
    pub workspace: String,
    pub path: PathBuf,
    pub workspace_path: PathBuf,
    pub template: String,
    /// Own stylesheets, base level first.
    pub css: Vec<PathBuf>,
    pub js: Vec<PathBuf>,
    /// Stylesheets inherited from merged children; emitted before `css`.
    pub css_dependencies: Vec<PathBuf>,
    pub js_dependencies: Vec<PathBuf>,
    pub files: Attachments,
    pub config: BlockConfig,
    pub dependencies: Vec<String>,
    pub used_mixins: Vec<Mixin>,
    /// At least one inherited mixin modified the template.
    pub mixed: bool,
    /// At least one child has been merged in.
    pub merged: bool,
}

fn wrap(key: &str, template: &str) -> String {
    if template.is_empty() {
        String::new()
    } else {
        format!("<!--block:{key}-->{template}<!--end:{key}-->")
    }
}

fn union_into(target: &mut Vec<PathBuf>, other: &[PathBuf], incoming: &[PathBuf]) {
    for item in incoming {
        if !target.contains(item) && !other.contains(item) {
            target.push(item.clone());
        }
    }
}

impl CompiledBlock {
    /// Placeholder key of this block: `name` or `name_variant`.
    pub fn key(&self) -> String {
        if self.workspace.is_empty() {
            self.name.clone()
        } else {
            format!("{}_{}", self.name, self.workspace)
        }
    }

    /// Output directory name: label prefix plus key.
    pub fn dir_name(&self) -> String {
        format!("{}{}", self.config.label, self.key())
    }

    /// Replace every `#key#` in the template. Returns whether anything changed.
    pub fn replace_placeholder(&mut self, key: &str, value: &str) -> bool {
        let token = format!("#{}#", key.trim());
        if key.trim().is_empty() || !self.template.contains(&token) {
            return false;
        }
        self.template = self.template.replace(&token, value);
        true
    }

    /// Inline a compiled child into this block.
    pub fn merge(&mut self, child: CompiledBlock) -> Result<(), BlockError> {
        if self.workspace_path == child.workspace_path {
            return Err(BlockError::Cycle(self.workspace_path.display().to_string()));
        }

        let key = child.key();
        let wrapped = wrap(&format!("{}{key}", child.config.label), &child.template);
        if self.replace_placeholder(&key, &wrapped) {
            self.used_mixins = merge_mixins(&self.used_mixins, &child.used_mixins);
        }

        let child_css: Vec<PathBuf> = child.css_dependencies.iter().chain(&child.css).cloned().collect();
        union_into(&mut self.css_dependencies, &self.css, &child_css);
        let child_js: Vec<PathBuf> = child.js_dependencies.iter().chain(&child.js).cloned().collect();
        union_into(&mut self.js_dependencies, &self.js, &child_js);

        for (name, path) in child.files {
            if self.files.values().any(|p| *p == path) {
                continue;
            }
            self.files.entry(name).or_insert(path);
        }

        for dep in child.dependencies {
            if !self.dependencies.contains(&dep) {
                self.dependencies.push(dep);
            }
        }

        self.merged = true;
        Ok(())
    }

    /// Stylesheet output: inherited files first, then own.
    pub fn compile_css(&self) -> Result<String, BlockError> {
        let files: Vec<&PathBuf> = self.css_dependencies.iter().chain(&self.css).collect();
        let sources = files
            .iter()
            .map(|f| fs::read_to_string(f))
            .collect::<Result<Vec<_>, _>>()?;
        if self.config.compression {
            Ok(css::merge_sources(&sources))
        } else {
            Ok(concat(&sources))
        }
    }

    /// Script output: inherited files first, then own.
    pub fn compile_js(&self) -> Result<String, BlockError> {
        let mut out = Vec::new();
        for file in self.js_dependencies.iter().chain(&self.js) {
            let source = fs::read_to_string(file)?;
            if self.config.compression {
                let minified = js::minify(&source).map_err(|source| BlockError::Script {
                    file: file.clone(),
                    source,
                })?;
                out.push(minified);
            } else {
                out.push(source);
            }
        }
        if self.config.compression {
            Ok(out.concat())
        } else {
            Ok(concat(&out))
        }
    }

    /// Write the compiled block into `<out_dir>/<dir_name>` and return that path.
    ///
    /// `_attach/<path>` references in the template are rewritten to a
    /// flattened file name and the referenced file is copied next to the
    /// output. Missing attachments and failed copies are warnings.
    pub fn save(&self, out_dir: &Path, attach_dir: &Path) -> Result<PathBuf, BlockError> {
        let dir_name = self.dir_name();
        let block_path = out_dir.join(&dir_name);
        let outputs = ["html", "css", "js"].map(|ext| format!("{}.{ext}", self.name));

        if block_path.is_dir() {
            for entry in fs::read_dir(&block_path)? {
                let entry = entry?;
                let file_name = entry.file_name().to_string_lossy().into_owned();
                if !entry.file_type()?.is_file()
                    || self.files.contains_key(&file_name)
                    || outputs.contains(&file_name)
                {
                    continue;
                }
                if let Err(e) = fs::remove_file(entry.path()) {
                    log::warning(&format!(
                        "could not remove stale file \"{}\": {e}",
                        entry.path().display()
                    ));
                }
            }
        } else {
            fs::create_dir_all(&block_path)?;
        }

        let mut template = wrap(&dir_name, &self.template);
        let css = self.compile_css()?;
        let js = self.compile_js()?;

        let references: Vec<(String, String)> = ATTACHMENT
            .captures_iter(&template)
            .map(|caps| (caps[0].to_string(), caps[1].to_string()))
            .collect();
        for (link, relative) in references {
            let alias = relative.replace('/', "_");
            template = template.replacen(&link, &alias, 1);

            let source = attach_dir.join(&relative);
            if !source.is_file() {
                log::warning(&format!("file \"{relative}\" not found in attach directory"));
                continue;
            }
            if let Err(e) = fs::copy(&source, block_path.join(&alias)) {
                log::warning(&format!(
                    "could not copy \"{}\" to \"{}\": {e}",
                    source.display(),
                    block_path.display()
                ));
            }
        }

        fs::write(block_path.join(&outputs[0]), template)?;
        fs::write(block_path.join(&outputs[1]), css)?;
        fs::write(block_path.join(&outputs[2]), js)?;

        for (file_name, source) in &self.files {
            if let Err(e) = fs::copy(source, block_path.join(file_name)) {
                log::warning(&format!(
                    "could not copy \"{file_name}\" to \"{}\": {e}",
                    block_path.display()
                ));
            }
        }

        Ok(block_path)
    }
}

fn concat(sources: &[String]) -> String {
    let mut out = String::new();
    for source in sources {
        out.push_str(source);
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::write_block;
    use tempfile::TempDir;

    fn settings(root: &Path) -> BuildSettings {
        BuildSettings {
            compression: false,
            ignore: Vec::new(),
            attach_dir: root.join("attach"),
        }
    }

    fn compiled(sources: &Path, id: &str, settings: &BuildSettings) -> CompiledBlock {
        BlockSource::resolve(BlockKind::Block, id, sources, settings)
            .unwrap()
            .compile(&[])
            .unwrap()
    }

    // =========================================================================
    // Resolution
    // =========================================================================

    #[test]
    fn resolve_finds_standard_files() {
        let tmp = TempDir::new().unwrap();
        write_block(
            tmp.path(),
            "menu",
            &[("menu.html", "<ul></ul>"), ("style.css", "ul{}"), ("menu.js", ""), ("arrow.svg", "<svg/>")],
        );
        let source = BlockSource::resolve(BlockKind::Block, "menu", tmp.path(), &settings(tmp.path())).unwrap();
        assert_eq!(source.template_file, Some(tmp.path().join("menu/menu.html")));
        assert_eq!(source.css, vec![tmp.path().join("menu/style.css")]);
        assert_eq!(source.js, vec![tmp.path().join("menu/menu.js")]);
        assert_eq!(source.files.keys().collect::<Vec<_>>(), vec!["arrow.svg"]);
        assert_eq!(source.workspace_path, tmp.path().join("menu"));
    }

    #[test]
    fn template_priority_order() {
        let tmp = TempDir::new().unwrap();
        write_block(
            tmp.path(),
            "card",
            &[("template.tpl", "d"), ("card.tpl", "c"), ("template.html", "b")],
        );
        let source = BlockSource::resolve(BlockKind::Block, "card", tmp.path(), &settings(tmp.path())).unwrap();
        assert_eq!(source.template_file, Some(tmp.path().join("card/template.html")));
    }

    #[test]
    fn variants_override_template_and_accumulate_styles() {
        let tmp = TempDir::new().unwrap();
        write_block(
            tmp.path(),
            "menu",
            &[
                ("menu.html", "base"),
                ("menu.css", "a{}"),
                ("logo.png", "base"),
                ("dark/menu.html", "dark"),
                ("dark/menu.css", "b{}"),
                ("dark/logo.png", "dark"),
                ("dark/config.json", r#"{"name":"Dark"}"#),
            ],
        );
        let source = BlockSource::resolve(BlockKind::Block, "menu_dark", tmp.path(), &settings(tmp.path())).unwrap();
        assert_eq!(source.workspace, "dark");
        assert_eq!(source.template_file, Some(tmp.path().join("menu/dark/menu.html")));
        assert_eq!(
            source.css,
            vec![tmp.path().join("menu/menu.css"), tmp.path().join("menu/dark/menu.css")]
        );
        assert_eq!(source.files["logo.png"], tmp.path().join("menu/dark/logo.png"));
        assert_eq!(source.config.name, "Dark");
    }

    #[test]
    fn variant_config_cascades_over_base() {
        let tmp = TempDir::new().unwrap();
        write_block(
            tmp.path(),
            "menu",
            &[
                ("menu.json", r#"{"name":"Menu","dependencies":["logo"]}"#),
                ("dark/menu.json", r#"{"dependencies":["toggle"]}"#),
            ],
        );
        let source = BlockSource::resolve(BlockKind::Block, "menu_dark", tmp.path(), &settings(tmp.path())).unwrap();
        assert_eq!(source.config.name, "Menu");
        assert_eq!(source.config.dependencies, vec!["logo", "toggle"]);
    }

    #[test]
    fn ignore_patterns_exclude_attachments() {
        let tmp = TempDir::new().unwrap();
        write_block(tmp.path(), "logo", &[("logo.psd", "x"), ("logo.png", "y")]);
        let mut s = settings(tmp.path());
        s.ignore = vec![Regex::new(r"(?i)(?:\.psd)$").unwrap()];
        let source = BlockSource::resolve(BlockKind::Block, "logo", tmp.path(), &s).unwrap();
        assert_eq!(source.files.keys().collect::<Vec<_>>(), vec!["logo.png"]);
    }

    #[test]
    fn missing_block_or_variant_is_an_error() {
        let tmp = TempDir::new().unwrap();
        write_block(tmp.path(), "menu", &[("menu.html", "x")]);
        let s = settings(tmp.path());
        assert!(matches!(
            BlockSource::resolve(BlockKind::Block, "nope", tmp.path(), &s),
            Err(BlockError::NotFound(_))
        ));
        assert!(matches!(
            BlockSource::resolve(BlockKind::Block, "menu_gone", tmp.path(), &s),
            Err(BlockError::VariantNotFound(_))
        ));
        assert!(matches!(
            BlockSource::resolve(BlockKind::Block, "bad id", tmp.path(), &s),
            Err(BlockError::InvalidId(_))
        ));
    }

    // =========================================================================
    // Compile
    // =========================================================================

    #[test]
    fn compile_unions_placeholders_with_declared_dependencies() {
        let tmp = TempDir::new().unwrap();
        write_block(
            tmp.path(),
            "page",
            &[
                ("page.html", "<div>#header# #footer# #header#</div>"),
                ("page.json", r#"{"dependencies":["analytics","header"]}"#),
            ],
        );
        let block = compiled(tmp.path(), "page", &settings(tmp.path()));
        assert_eq!(block.dependencies, vec!["analytics", "header", "footer"]);
    }

    #[test]
    fn compile_applies_inherited_mixins() {
        let tmp = TempDir::new().unwrap();
        write_block(tmp.path(), "list", &[("list.html", "<ul></ul>")]);
        let mixin = Mixin {
            tag: Some("ul".into()),
            mixin: "dark".into(),
            ..Default::default()
        };
        let source = BlockSource::resolve(BlockKind::Block, "list", tmp.path(), &settings(tmp.path())).unwrap();
        let block = source.compile(std::slice::from_ref(&mixin)).unwrap();
        assert!(block.mixed);
        assert_eq!(block.template, "<ul class=\"dark\"></ul>");
        assert_eq!(block.used_mixins, vec![mixin]);
    }

    #[test]
    fn block_without_template_compiles_empty() {
        let tmp = TempDir::new().unwrap();
        write_block(tmp.path(), "styles", &[("styles.css", "a{}")]);
        let block = compiled(tmp.path(), "styles", &settings(tmp.path()));
        assert!(block.template.is_empty());
        assert!(!block.mixed);
    }

    // =========================================================================
    // Merge
    // =========================================================================

    #[test]
    fn merge_inlines_wrapped_child_and_collects_assets() {
        let tmp = TempDir::new().unwrap();
        write_block(tmp.path(), "page", &[("page.html", "<main>#child#</main>"), ("page.css", "main{}")]);
        write_block(
            tmp.path(),
            "child",
            &[("child.html", "<p>hi</p>"), ("child.css", "p{}"), ("child.js", "x()"), ("icon.png", "i")],
        );
        let s = settings(tmp.path());
        let mut parent = compiled(tmp.path(), "page", &s);
        let child = compiled(tmp.path(), "child", &s);
        parent.merge(child).unwrap();

        assert_eq!(parent.template, "<main><!--block:child--><p>hi</p><!--end:child--></main>");
        assert_eq!(parent.css_dependencies, vec![tmp.path().join("child/child.css")]);
        assert_eq!(parent.js_dependencies, vec![tmp.path().join("child/child.js")]);
        assert!(parent.files.contains_key("icon.png"));
        assert!(parent.merged);
    }

    #[test]
    fn merging_same_child_twice_does_not_duplicate() {
        let tmp = TempDir::new().unwrap();
        write_block(tmp.path(), "page", &[("page.html", "#child##child#")]);
        write_block(tmp.path(), "child", &[("child.html", "c"), ("child.css", "p{}"), ("a.png", "a")]);
        let s = settings(tmp.path());
        let mut parent = compiled(tmp.path(), "page", &s);
        parent.merge(compiled(tmp.path(), "child", &s)).unwrap();
        parent.merge(compiled(tmp.path(), "child", &s)).unwrap();
        assert_eq!(parent.css_dependencies.len(), 1);
        assert_eq!(parent.files.len(), 1);
        assert_eq!(parent.dependencies, vec!["child"]);
    }

    #[test]
    fn merge_with_same_workspace_is_a_cycle() {
        let tmp = TempDir::new().unwrap();
        write_block(tmp.path(), "loop", &[("loop.html", "#loop#")]);
        let s = settings(tmp.path());
        let mut a = compiled(tmp.path(), "loop", &s);
        let b = compiled(tmp.path(), "loop", &s);
        assert!(matches!(a.merge(b), Err(BlockError::Cycle(_))));
    }

    #[test]
    fn merge_without_placeholder_skips_mixin_union() {
        let tmp = TempDir::new().unwrap();
        write_block(tmp.path(), "page", &[("page.html", "no slot")]);
        write_block(tmp.path(), "child", &[("child.html", "<ul></ul>")]);
        let s = settings(tmp.path());
        let mixin = Mixin {
            tag: Some("ul".into()),
            mixin: "m".into(),
            ..Default::default()
        };
        let mut parent = compiled(tmp.path(), "page", &s);
        let child = BlockSource::resolve(BlockKind::Block, "child", tmp.path(), &s)
            .unwrap()
            .compile(&[mixin])
            .unwrap();
        parent.merge(child).unwrap();
        assert!(parent.used_mixins.is_empty());
        assert_eq!(parent.template, "no slot");
        assert!(parent.merged);
    }

    // =========================================================================
    // Save
    // =========================================================================

    #[test]
    fn save_writes_outputs_and_attachments() {
        let tmp = TempDir::new().unwrap();
        let sources = tmp.path().join("src");
        write_block(
            &sources,
            "card",
            &[("card.html", "<img src=\"/_attach/img/a.png\">"), ("card.css", "a{}"), ("b.txt", "b")],
        );
        fs::create_dir_all(tmp.path().join("attach/img")).unwrap();
        fs::write(tmp.path().join("attach/img/a.png"), "png").unwrap();

        let s = settings(tmp.path());
        let block = compiled(&sources, "card", &s);
        let out = block.save(&tmp.path().join("blocks"), &s.attach_dir).unwrap();

        assert_eq!(out, tmp.path().join("blocks/card"));
        let html = fs::read_to_string(out.join("card.html")).unwrap();
        assert_eq!(html, "<!--block:card--><img src=\"img_a.png\"><!--end:card-->");
        assert_eq!(fs::read_to_string(out.join("card.css")).unwrap(), "a{}\n");
        assert_eq!(fs::read_to_string(out.join("card.js")).unwrap(), "");
        assert!(out.join("img_a.png").is_file());
        assert!(out.join("b.txt").is_file());
    }

    #[test]
    fn save_missing_attachment_still_rewrites() {
        let tmp = TempDir::new().unwrap();
        let sources = tmp.path().join("src");
        write_block(&sources, "card", &[("card.html", "_attach/gone.png")]);
        let s = settings(tmp.path());
        let out = compiled(&sources, "card", &s)
            .save(&tmp.path().join("blocks"), &s.attach_dir)
            .unwrap();
        let html = fs::read_to_string(out.join("card.html")).unwrap();
        assert!(html.contains("gone.png"));
        assert!(!html.contains("_attach"));
        assert!(!out.join("gone.png").exists());
    }

    #[test]
    fn save_removes_stray_files() {
        let tmp = TempDir::new().unwrap();
        let sources = tmp.path().join("src");
        write_block(&sources, "card", &[("card.html", "x"), ("keep.png", "k")]);
        let stray_dir = tmp.path().join("blocks/card");
        fs::create_dir_all(&stray_dir).unwrap();
        fs::write(stray_dir.join("old.png"), "o").unwrap();

        let s = settings(tmp.path());
        compiled(&sources, "card", &s)
            .save(&tmp.path().join("blocks"), &s.attach_dir)
            .unwrap();
        assert!(!stray_dir.join("old.png").exists());
        assert!(stray_dir.join("keep.png").is_file());
    }

    #[test]
    fn save_uses_label_and_variant_in_dir_name() {
        let tmp = TempDir::new().unwrap();
        let sources = tmp.path().join("src");
        write_block(&sources, "menu", &[("dark/menu.html", "<ul></ul>")]);
        let s = settings(tmp.path());
        let mut block = compiled(&sources, "menu_dark", &s);
        block.config.label = "home_".into();
        let out = block.save(&tmp.path().join("blocks"), &s.attach_dir).unwrap();
        assert_eq!(out, tmp.path().join("blocks/home_menu_dark"));
        let html = fs::read_to_string(out.join("menu.html")).unwrap();
        assert!(html.starts_with("<!--block:home_menu_dark-->"));
    }

    #[test]
    fn compressed_output_merges_css_and_minifies_js() {
        let tmp = TempDir::new().unwrap();
        write_block(tmp.path(), "page", &[("page.html", "#child#"), ("page.css", "a{color:red}"), ("page.js", "var a = 1;")]);
        write_block(tmp.path(), "child", &[("child.css", "a{margin:0}"), ("child.js", "var b = 2; // x")]);
        let mut s = settings(tmp.path());
        s.compression = true;
        let mut parent = compiled(tmp.path(), "page", &s);
        parent.merge(compiled(tmp.path(), "child", &s)).unwrap();
        assert_eq!(parent.compile_css().unwrap(), "a{margin:0;color:red;}");
        assert_eq!(parent.compile_js().unwrap(), "var b=2;var a=1;");
    }

    #[test]
    fn compressed_js_with_unmatched_quote_fails() {
        let tmp = TempDir::new().unwrap();
        write_block(tmp.path(), "bad", &[("bad.js", "var s = 'oops;")]);
        let mut s = settings(tmp.path());
        s.compression = true;
        let block = compiled(tmp.path(), "bad", &s);
        assert!(matches!(block.compile_js(), Err(BlockError::Script { .. })));
    }
}
