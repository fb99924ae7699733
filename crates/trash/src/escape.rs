// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Unique escaped names for aggregated trash items.
//!
//! Items from the home trash use their basename; items from other
//! volumes use their full absolute path with `/` turned into `\`. Since
//! escaped home names never start with `\` and escaped non-home names
//! always do, the two namespaces cannot collide, and the backtick
//! escapes keep the mapping injective within each.

use std::path::Path;

const SYMBOL_SLASH: char = '\\';
const SYMBOL_ESCAPE: char = '`';

/// Compute the unique escaped name for a trashed file.
///
/// `is_homedir` selects the home-trash flavor (basename) over the
/// volume flavor (full path).
pub fn escape_name(file: &Path, is_homedir: bool) -> String {
    if is_homedir {
        let basename = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if basename.starts_with(SYMBOL_SLASH) || basename.starts_with(SYMBOL_ESCAPE) {
            format!("{SYMBOL_ESCAPE}{basename}")
        } else {
            basename
        }
    } else {
        let path = file.to_string_lossy();
        let mut escaped = String::with_capacity(path.len());
        for ch in path.chars() {
            match ch {
                SYMBOL_SLASH | SYMBOL_ESCAPE => {
                    escaped.push(SYMBOL_ESCAPE);
                    escaped.push(ch);
                }
                '/' => escaped.push(SYMBOL_SLASH),
                ch => escaped.push(ch),
            }
        }
        escaped
    }
}

#[cfg(test)]
#[path = "escape_tests.rs"]
mod tests;
