//! File-name conventions of a conformance suite.
//!
//! Walking the tree and scheduling the units it yields is the caller's
//! concern; the predicates that decide what counts live here.

use std::path::Path;

use crate::driver::BOOTSTRAP_FILE;

/// True for script files that are test units, as opposed to bootstrap or
/// template files sitting in the same directories.
pub fn is_test_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| {
            name.ends_with(".js")
                && name != BOOTSTRAP_FILE
                && name != "browser.js"
                && name != "template.js"
        })
}

/// True for directories that may contain test units. Version-control
/// metadata directories are excluded.
pub fn is_test_dir(path: &Path) -> bool {
    path.is_dir()
        && path
            .file_name()
            .and_then(|name| name.to_str())
            .is_none_or(|name| name != "CVS")
}
