// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Mount specs: the canonical identity of a mountable location.
//!
//! A mount spec is a sorted bag of string key/value items (`type`, `host`,
//! `user`, ...) plus an absolute, canonicalized `mount_prefix`. Specs are
//! value types while being built; [`Spec::intern`] produces the shared
//! canonical instance used as a cache key.

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::Mutex;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::error::{ErrorKind, VfsError, VfsResult};

/// Escape set for the human-readable string form: everything outside the
/// URI unreserved set, except `$&'()*+` and `/` which stay literal. The
/// separators `,` and `=` are in the set, so values always round-trip.
const STRING_FORM_ESCAPES: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~')
    .remove(b'$')
    .remove(b'&')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')')
    .remove(b'*')
    .remove(b'+')
    .remove(b'/');

/// One key/value item of a mount spec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecItem {
    pub key: String,
    pub value: String,
}

/// Identity of a mountable location: typed items plus a prefix path.
///
/// Items are kept sorted by key so equality and hashing are canonical.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountSpec {
    items: Vec<SpecItem>,
    mount_prefix: String,
}

impl MountSpec {
    /// Empty spec of the given type, prefix `/`.
    pub fn new(spec_type: &str) -> Self {
        let mut spec = Self { items: Vec::new(), mount_prefix: "/".to_string() };
        spec.set("type", spec_type);
        spec
    }

    /// Build from raw parts; items get sorted, the prefix canonicalized.
    pub fn from_items(items: Vec<SpecItem>, mount_prefix: Option<&str>) -> Self {
        let mut spec = Self {
            items,
            mount_prefix: canonicalize_path(mount_prefix.unwrap_or("/")),
        };
        spec.items.sort_by(|a, b| a.key.cmp(&b.key));
        spec
    }

    /// Insert or replace an item, preserving sorted order.
    ///
    /// The pseudo-key `prefix` sets the mount prefix instead.
    pub fn set(&mut self, key: &str, value: &str) {
        if key == "prefix" {
            self.set_mount_prefix(value);
            return;
        }
        match self.items.binary_search_by(|item| item.key.as_str().cmp(key)) {
            Ok(i) => self.items[i].value = value.to_string(),
            Err(i) => self
                .items
                .insert(i, SpecItem { key: key.to_string(), value: value.to_string() }),
        }
    }

    /// Value of an item, if present.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.items
            .binary_search_by(|item| item.key.as_str().cmp(key))
            .ok()
            .map(|i| self.items[i].value.as_str())
    }

    /// The `type` item.
    pub fn spec_type(&self) -> Option<&str> {
        self.get("type")
    }

    /// Items in canonical (key-sorted) order.
    pub fn items(&self) -> &[SpecItem] {
        &self.items
    }

    pub fn mount_prefix(&self) -> &str {
        &self.mount_prefix
    }

    /// Replace the mount prefix (canonicalizing it).
    pub fn set_mount_prefix(&mut self, prefix: &str) {
        self.mount_prefix = canonicalize_path(prefix);
    }

    /// True iff `other`'s item set equals ours and `path` lies under our
    /// mount prefix (full path components only: `/a` matches `/a/b` but
    /// not `/ab`).
    pub fn matches(&self, other: &MountSpec, path: &str) -> bool {
        self.items == other.items && path_has_prefix(path, &self.mount_prefix)
    }

    /// Human-readable form: `type:key1=v1,key2=v2,prefix=/p`.
    ///
    /// The `type` item becomes the leading segment and `prefix=` is
    /// omitted when the prefix is `/`.
    pub fn to_spec_string(&self) -> String {
        let mut out = String::new();
        out.push_str(self.spec_type().unwrap_or(""));
        out.push(':');

        let mut first = true;
        for item in &self.items {
            if item.key == "type" {
                continue;
            }
            if !first {
                out.push(',');
            }
            first = false;
            out.push_str(&item.key);
            out.push('=');
            out.push_str(&utf8_percent_encode(&item.value, STRING_FORM_ESCAPES).to_string());
        }

        if self.mount_prefix != "/" {
            if !first {
                out.push(',');
            }
            out.push_str("prefix=");
            out.push_str(&utf8_percent_encode(&self.mount_prefix, STRING_FORM_ESCAPES).to_string());
        }

        out
    }

    /// Parse the string form produced by [`MountSpec::to_spec_string`].
    pub fn parse(s: &str) -> VfsResult<Self> {
        let mut items = Vec::new();
        let mut prefix: Option<String> = None;

        let rest = match s.split_once(':') {
            Some((spec_type, rest)) => {
                items.push(SpecItem { key: "type".to_string(), value: spec_type.to_string() });
                rest
            }
            None => s,
        };

        for pair in rest.split(',').filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').ok_or_else(|| {
                VfsError::new(
                    ErrorKind::InvalidArgument,
                    format!("invalid key/value pair {pair:?} in mount spec"),
                )
            })?;
            if key.is_empty() || value.contains('=') {
                return Err(VfsError::new(
                    ErrorKind::InvalidArgument,
                    format!("invalid key/value pair {pair:?} in mount spec"),
                ));
            }
            let value = percent_decode_str(value)
                .decode_utf8()
                .map_err(|_| {
                    VfsError::new(
                        ErrorKind::InvalidArgument,
                        format!("invalid escape in mount spec value {value:?}"),
                    )
                })?
                .into_owned();
            if key == "prefix" {
                prefix = Some(value);
            } else {
                items.push(SpecItem { key: key.to_string(), value });
            }
        }

        Ok(Self::from_items(items, prefix.as_deref()))
    }
}

impl Hash for MountSpec {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // Prefix plus item values; keys are implied by the canonical order.
        self.mount_prefix.hash(state);
        for item in &self.items {
            item.value.hash(state);
        }
    }
}

impl fmt::Display for MountSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_spec_string())
    }
}

/// Canonicalize an absolute path: collapse `.`/`..`, deduplicate slashes,
/// strip the trailing slash. Relative input is rooted first; the root
/// itself stays `/`.
pub fn canonicalize_path(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for seg in path.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            seg => parts.push(seg),
        }
    }
    if parts.is_empty() {
        "/".to_string()
    } else {
        let mut out = String::new();
        for seg in parts {
            out.push('/');
            out.push_str(seg);
        }
        out
    }
}

/// Component-wise prefix check: `prefix` must either be `/` or be followed
/// in `path` by a slash or the end of the string.
pub fn path_has_prefix(path: &str, prefix: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => {
            prefix.is_empty()
                || prefix.ends_with('/')
                || rest.is_empty()
                || rest.starts_with('/')
        }
        None => false,
    }
}

struct SpecShared {
    spec: MountSpec,
}

impl Drop for SpecShared {
    fn drop(&mut self) {
        let mut table = intern_table().lock();
        if let Some(weak) = table.get(&self.spec) {
            if weak.strong_count() == 0 {
                table.remove(&self.spec);
            }
        }
    }
}

fn intern_table() -> &'static Mutex<HashMap<MountSpec, Weak<SpecShared>>> {
    static TABLE: OnceLock<Mutex<HashMap<MountSpec, Weak<SpecShared>>>> = OnceLock::new();
    TABLE.get_or_init(|| Mutex::new(HashMap::new()))
}

/// A shared, immutable, interned mount spec.
///
/// Interning structurally equal specs yields handles to the same
/// allocation, so equality is a pointer comparison. The intern table holds
/// weak references; an entry disappears when the last handle drops.
#[derive(Clone)]
pub struct Spec(Arc<SpecShared>);

impl Spec {
    /// The canonical shared instance for `spec`.
    pub fn intern(spec: &MountSpec) -> Spec {
        let mut table = intern_table().lock();
        if let Some(existing) = table.get(spec).and_then(Weak::upgrade) {
            return Spec(existing);
        }
        let shared = Arc::new(SpecShared { spec: spec.clone() });
        table.insert(spec.clone(), Arc::downgrade(&shared));
        Spec(shared)
    }

    pub fn as_mount_spec(&self) -> &MountSpec {
        &self.0.spec
    }
}

impl std::ops::Deref for Spec {
    type Target = MountSpec;

    fn deref(&self) -> &MountSpec {
        &self.0.spec
    }
}

impl PartialEq for Spec {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Spec {}

impl Hash for Spec {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.spec.hash(state);
    }
}

impl fmt::Debug for Spec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Spec({})", self.0.spec)
    }
}

impl fmt::Display for Spec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.spec)
    }
}

#[cfg(test)]
#[path = "spec_tests.rs"]
mod tests;
