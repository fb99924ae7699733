// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `.trashinfo` sidecar files.
//!
//! A trashed `files/foo` is described by `info/foo.trashinfo`, a
//! key-file with a `[Trash Info]` group carrying the percent-escaped
//! original path (relative paths are relative to the volume topdir) and
//! an ISO-8601 deletion date.

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};

const GROUP_HEADER: &str = "[Trash Info]";
const DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Escape set for the `Path=` value: controls, space and the percent
/// sign itself. Slashes stay readable.
const PATH_ESCAPES: &AsciiSet = &CONTROLS.add(b' ').add(b'%').add(b'\n').add(b'\r');

/// Parsed sidecar contents. Both fields are optional on disk.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TrashInfo {
    pub original: Option<PathBuf>,
    pub deletion_date: Option<String>,
}

impl TrashInfo {
    pub fn parsed_date(&self) -> Option<NaiveDateTime> {
        NaiveDateTime::parse_from_str(self.deletion_date.as_deref()?, DATE_FORMAT).ok()
    }
}

/// Parse key-file text. Keys outside the `[Trash Info]` group are
/// ignored, as are unknown keys inside it.
pub fn parse_trashinfo(text: &str, topdir: &Path) -> TrashInfo {
    let mut info = TrashInfo::default();
    let mut in_group = false;

    for line in text.lines() {
        let line = line.trim();
        if line.starts_with('[') {
            in_group = line == GROUP_HEADER;
            continue;
        }
        if !in_group || line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else { continue };
        match key.trim() {
            "Path" => {
                let decoded = percent_decode_str(value.trim())
                    .decode_utf8()
                    .map(|s| s.into_owned())
                    .unwrap_or_else(|_| value.trim().to_string());
                let path = Path::new(&decoded);
                info.original = Some(if path.is_absolute() {
                    path.to_path_buf()
                } else {
                    topdir.join(path)
                });
            }
            "DeletionDate" => info.deletion_date = Some(value.trim().to_string()),
            _ => {}
        }
    }

    info
}

/// Locate and parse the sidecar for a `files/<name>` path. The `info/`
/// directory is the sibling of `files/`; relative originals resolve
/// against the trash dir's parent.
pub fn read_trashinfo_for(file_in_files_dir: &Path) -> TrashInfo {
    let Some(name) = file_in_files_dir.file_name() else {
        return TrashInfo::default();
    };
    let Some(files_dir) = file_in_files_dir.parent() else {
        return TrashInfo::default();
    };
    let Some(trash_dir) = files_dir.parent() else {
        return TrashInfo::default();
    };
    let topdir = trash_dir.parent().unwrap_or(trash_dir);

    let sidecar = trash_dir.join("info").join(format!("{}.trashinfo", name.to_string_lossy()));
    match std::fs::read_to_string(&sidecar) {
        Ok(text) => parse_trashinfo(&text, topdir),
        Err(_) => TrashInfo::default(),
    }
}

/// Render sidecar text for a freshly trashed file. `original` should be
/// relative to the topdir for volume trashes and absolute for the home
/// trash.
pub fn write_trashinfo(original: &Path, deleted_at: NaiveDateTime) -> String {
    let path = utf8_percent_encode(&original.to_string_lossy(), PATH_ESCAPES).to_string();
    format!(
        "{GROUP_HEADER}\nPath={path}\nDeletionDate={}\n",
        deleted_at.format(DATE_FORMAT)
    )
}

/// Path of the sidecar for `files/<name>`.
pub fn trashinfo_path_for(file_in_files_dir: &Path) -> Option<PathBuf> {
    let name = file_in_files_dir.file_name()?;
    let trash_dir = file_in_files_dir.parent()?.parent()?;
    Some(trash_dir.join("info").join(format!("{}.trashinfo", name.to_string_lossy())))
}

#[cfg(test)]
#[path = "info_tests.rs"]
mod tests;
