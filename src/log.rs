//! Console logging with colored module prefixes.
//!
//! ```ignore
//! log!("compile"; "page \"{}\" compiled", id);
//! log::warning("file \"logo.svg\" not found in attach directory");
//! ```
//!
//! Informational lines go to stdout, warnings to stderr. Nothing here is
//! fatal: errors travel through `Result` and are reported once by `main`.

use colored::{ColoredString, Colorize};
use std::io::{Write, stderr, stdout};

/// Log a message with a colored `[module]` prefix.
#[macro_export]
macro_rules! log {
    ($module:expr; $($arg:tt)*) => {{
        $crate::log::log($module, &format!($($arg)*))
    }};
}

pub fn log(module: &str, message: &str) {
    let prefix = colorize_prefix(module);
    if module.eq_ignore_ascii_case("warn") || module.eq_ignore_ascii_case("error") {
        writeln!(stderr().lock(), "{prefix} {message}").ok();
    } else {
        writeln!(stdout().lock(), "{prefix} {message}").ok();
    }
}

/// Non-fatal problem: processing continues.
pub fn warning(message: &str) {
    log("warn", message);
}

/// Informational side effect worth surfacing (e.g. a directory was created).
pub fn notice(message: &str) {
    log("notice", message);
}

fn colorize_prefix(module: &str) -> ColoredString {
    let prefix = format!("[{module}]");
    match module.to_ascii_lowercase().as_str() {
        "error" => prefix.bright_red().bold(),
        "warn" => prefix.bright_magenta().bold(),
        "notice" => prefix.bright_cyan().bold(),
        _ => prefix.bright_yellow().bold(),
    }
}
