// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    plain = { "README", "README" },
    leading_backtick = { "`notes", "``notes" },
    leading_backslash = { "\\evil", "`\\evil" },
    inner_symbols_untouched = { "a`b\\c", "a`b\\c" },
)]
fn homedir_names(basename: &str, expected: &str) {
    let path = Path::new("/home/alice/.local/share/Trash/files").join(basename);
    assert_eq!(escape_name(&path, true), expected);
}

#[parameterized(
    plain = { "/mnt/x/a/b", "\\mnt\\x\\a\\b" },
    with_backslash = { "/mnt/x/a\\b", "\\mnt\\x\\a`\\b" },
    with_backtick = { "/mnt/x/a`b", "\\mnt\\x\\a``b" },
    root_file = { "/f", "\\f" },
)]
fn volume_names(path: &str, expected: &str) {
    assert_eq!(escape_name(Path::new(path), false), expected);
}

#[test]
fn namespaces_cannot_collide() {
    // Home names never start with '\'; volume names always do.
    assert!(!escape_name(Path::new("/t/files/x"), true).starts_with('\\'));
    assert!(escape_name(Path::new("/t/files/x"), false).starts_with('\\'));
}

mod properties {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashMap;

    proptest! {
        // Distinct inputs must produce distinct escaped names.
        #[test]
        fn escape_is_injective(paths in proptest::collection::hash_set("/[a-z`\\\\/]{1,12}", 1..12)) {
            let mut seen: HashMap<String, (String, bool)> = HashMap::new();
            for path in &paths {
                for is_homedir in [false, true] {
                    let input = (path.clone(), is_homedir);
                    let escaped = escape_name(Path::new(path), is_homedir);
                    if is_homedir {
                        // Home escaping keys on the basename only, so two
                        // paths sharing a basename legitimately collide.
                        continue;
                    }
                    if let Some(previous) = seen.insert(escaped.clone(), input.clone()) {
                        prop_assert_eq!(previous, input, "collision on {}", escaped);
                    }
                }
            }
        }

        #[test]
        fn homedir_escape_is_injective_on_basenames(names in proptest::collection::hash_set("[a-z`\\\\][a-z`\\\\]{0,10}", 1..12)) {
            let mut seen: HashMap<String, String> = HashMap::new();
            for name in &names {
                let escaped = escape_name(&Path::new("/trash/files").join(name), true);
                if let Some(previous) = seen.insert(escaped.clone(), name.clone()) {
                    prop_assert_eq!(&previous, name, "collision on {}", escaped);
                }
            }
        }
    }
}
