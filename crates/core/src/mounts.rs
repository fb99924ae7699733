// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Minimal unix mount-table model.
//!
//! Parses `/proc/self/mounts`-format text into entries sorted by mount
//! path. This is what the trash watcher and the volume layer consume; it
//! is deliberately not a full mtab/fstab implementation.

use std::path::{Path, PathBuf};

/// Filesystem types that never carry user data.
const SYSTEM_FS_TYPES: &[&str] = &[
    "autofs", "bpf", "cgroup", "cgroup2", "configfs", "debugfs", "devpts", "devtmpfs", "efivarfs",
    "fusectl", "hugetlbfs", "mqueue", "overlay", "proc", "pstore", "securityfs", "selinuxfs",
    "squashfs", "sysfs", "tracefs",
];

/// Mount path prefixes that mark a mount as system-internal.
const SYSTEM_PATH_PREFIXES: &[&str] = &["/proc", "/sys", "/dev", "/run", "/boot", "/snap"];

/// One line of the mount table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    pub device: String,
    pub mount_path: PathBuf,
    pub fs_type: String,
    pub options: String,
}

impl MountEntry {
    /// True if the comma-separated options contain `name` as a whole item.
    pub fn has_option(&self, name: &str) -> bool {
        self.options.split(',').any(|opt| opt == name)
    }

    /// Heuristic for mounts that should not be offered to users.
    pub fn is_system_internal(&self) -> bool {
        if self.mount_path == Path::new("/") {
            return false;
        }
        if SYSTEM_FS_TYPES.contains(&self.fs_type.as_str()) {
            return true;
        }
        SYSTEM_PATH_PREFIXES.iter().any(|prefix| {
            self.mount_path.starts_with(prefix)
        })
    }
}

/// Decode the octal escapes (`\040` for space etc.) used by the kernel's
/// mount table. Unrecognized escapes pass through verbatim. Runs between
/// escapes are copied as whole str slices: the field is valid UTF-8, and
/// multi-byte characters must not be reassembled byte by byte.
fn unescape_field(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let bytes = field.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' {
            if let Some(digits) = bytes.get(i + 1..i + 4) {
                if digits.iter().all(|d| (b'0'..=b'7').contains(d)) {
                    let value = (digits[0] - b'0') as u32 * 64
                        + (digits[1] - b'0') as u32 * 8
                        + (digits[2] - b'0') as u32;
                    if let Some(ch) = char::from_u32(value) {
                        out.push(ch);
                        i += 4;
                        continue;
                    }
                }
            }
            out.push('\\');
            i += 1;
            continue;
        }
        // Backslashes are single-byte ASCII, so both ends of this run
        // land on character boundaries.
        let run_end = bytes[i..]
            .iter()
            .position(|&b| b == b'\\')
            .map_or(bytes.len(), |offset| i + offset);
        out.push_str(&field[i..run_end]);
        i = run_end;
    }
    out
}

/// Parse mount-table text; malformed lines are skipped. The result is
/// sorted by mount path so list reconciliation can diff two snapshots.
pub fn parse_mount_table(text: &str) -> Vec<MountEntry> {
    let mut entries: Vec<MountEntry> = text
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let device = fields.next()?;
            let mount_path = fields.next()?;
            let fs_type = fields.next()?;
            let options = fields.next()?;
            Some(MountEntry {
                device: unescape_field(device),
                mount_path: PathBuf::from(unescape_field(mount_path)),
                fs_type: fs_type.to_string(),
                options: options.to_string(),
            })
        })
        .collect();
    entries.sort_by(|a, b| a.mount_path.cmp(&b.mount_path));
    entries
}

/// Read and parse this process's mount table.
pub fn read_mount_table() -> std::io::Result<Vec<MountEntry>> {
    let text = std::fs::read_to_string("/proc/self/mounts")?;
    Ok(parse_mount_table(&text))
}

/// The entry whose mount path is the longest component prefix of `path`.
pub fn entry_for_path<'a>(entries: &'a [MountEntry], path: &Path) -> Option<&'a MountEntry> {
    entries
        .iter()
        .filter(|entry| path.starts_with(&entry.mount_path))
        .max_by_key(|entry| entry.mount_path.as_os_str().len())
}

#[cfg(test)]
#[path = "mounts_tests.rs"]
mod tests;
