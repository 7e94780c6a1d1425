//! Shared test utilities: bundles and block source trees in a temp dir.
//!
//! ```rust,ignore
//! use crate::test_helpers::*;
//!
//! let tmp = TempDir::new().unwrap();
//! let mut bundle = new_bundle(tmp.path(), &["home"]);
//! write_block(&bundle.root().join("src/pages"), "home", &[
//!     ("home.html", "<body>#menu#</body>"),
//!     ("dark/home.css", "body{}"),
//! ]);
//! bundle.compile().unwrap();
//! ```

use crate::bundle::Bundle;
use crate::config::BundleConfig;
use std::fs;
use std::path::Path;

/// Write `files` (paths relative to the block, subdirectories allowed)
/// under `<sources>/<name>/`.
pub fn write_block(sources: &Path, name: &str, files: &[(&str, &str)]) {
    let dir = sources.join(name);
    fs::create_dir_all(&dir).unwrap();
    for (relative, content) in files {
        let path = dir.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }
}

/// Create a bundle in `root` with sources under `root/src/` and the given pages.
pub fn new_bundle(root: &Path, pages: &[&str]) -> Bundle {
    let mut config = BundleConfig::new("src/pages", "src/blocks", "src/attach");
    config.pages = pages.iter().map(|p| p.to_string()).collect();
    Bundle::create(root, config).unwrap()
}
