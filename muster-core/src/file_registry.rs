use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::checksum::{Checksum, SizeAndChecksum};
use crate::error::{CoordinationError, Result};

/// Metadata for one distinct piece of file content. Many logical names may
/// map to the same record through its (size, checksum) key; the registry
/// keeps exactly one record per key.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct FileInfo {
    pub file_name: String,
    pub size: u64,
    pub checksum: Checksum,
    /// Bytes already covered by the base backup; 0 when there is none.
    pub base_size: u64,
    /// Assigned once the owning archive chunk is decided.
    pub archive_suffix: String,
}

impl FileInfo {
    pub fn key(&self) -> SizeAndChecksum {
        SizeAndChecksum::new(self.size, self.checksum)
    }
}

#[derive(Default)]
struct Indexes {
    /// Every registered name, size-0 files included. Lexicographic order is
    /// load-bearing: `list_files` scans a prefix range of this map.
    names: BTreeMap<String, SizeAndChecksum>,
    /// One record per distinct content key; size-0 files are never stored here.
    contents: HashMap<SizeAndChecksum, FileInfo>,
}

/// Registry of logical backup file names deduplicated by content key.
/// The name index and content index mutate inside one critical section so
/// `add_file_info`'s check-then-insert is atomic under concurrent scanners.
#[derive(Default)]
pub struct FileRegistry {
    indexes: Mutex<Indexes>,
}

impl FileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a file name under its content key and reports whether the
    /// caller must upload the file's data: true only for the first
    /// registration of a key whose content is not already fully covered by
    /// the base backup. Size-0 files are recorded by name and never need an
    /// upload.
    pub fn add_file_info(&self, info: FileInfo) -> bool {
        let mut ix = self.indexes.lock().unwrap();
        let key = info.key();
        ix.names.insert(info.file_name.clone(), key);
        if info.size == 0 {
            return false;
        }
        match ix.contents.entry(key) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                let required = info.size > info.base_size;
                slot.insert(info);
                required
            }
        }
    }

    /// Attaches the final archive suffix to a registered content record.
    /// No-op for size-0 keys, which carry no content record.
    pub fn update_file_info(&self, key: &SizeAndChecksum, archive_suffix: &str) -> Result<()> {
        if key.size == 0 {
            return Ok(());
        }
        let mut ix = self.indexes.lock().unwrap();
        let info = ix
            .contents
            .get_mut(key)
            .ok_or(CoordinationError::UnknownFileKey { key: *key })?;
        info.archive_suffix = archive_suffix.to_string();
        Ok(())
    }

    pub fn get_file_info_by_name(&self, file_name: &str) -> Option<FileInfo> {
        let ix = self.indexes.lock().unwrap();
        let key = ix.names.get(file_name)?;
        // Size-0 names have no content record; report the name and an
        // otherwise empty record, the same shape callers get for real files.
        let mut info = ix.contents.get(key).cloned().unwrap_or_default();
        info.file_name = file_name.to_string();
        Some(info)
    }

    pub fn get_file_info(&self, key: &SizeAndChecksum) -> Option<FileInfo> {
        self.indexes.lock().unwrap().contents.get(key).cloned()
    }

    pub fn get_size_and_checksum(&self, file_name: &str) -> Option<SizeAndChecksum> {
        self.indexes.lock().unwrap().names.get(file_name).copied()
    }

    /// One entry per registered logical name, in name order, each carrying
    /// its content record (empty record for size-0 files).
    pub fn all_file_infos(&self) -> Vec<FileInfo> {
        let ix = self.indexes.lock().unwrap();
        ix.names
            .iter()
            .map(|(name, key)| {
                let mut info = ix.contents.get(key).cloned().unwrap_or_default();
                info.file_name = name.clone();
                info
            })
            .collect()
    }

    /// Directory-style single-level listing over the flat namespace: for
    /// every registered name starting with `prefix`, the segment up to the
    /// first `terminator` (to end of name when the terminator is empty or
    /// absent), with consecutive duplicates collapsed.
    pub fn list_files(&self, prefix: &str, terminator: &str) -> Vec<String> {
        let ix = self.indexes.lock().unwrap();
        let mut elements: Vec<String> = Vec::new();
        for (name, _) in ix.names.range(prefix.to_string()..) {
            let Some(rest) = name.strip_prefix(prefix) else {
                break;
            };
            let segment = if terminator.is_empty() {
                rest
            } else {
                match rest.find(terminator) {
                    Some(pos) => &rest[..pos],
                    None => rest,
                }
            };
            if elements.last().map(String::as_str) == Some(segment) {
                continue;
            }
            elements.push(segment.to_string());
        }
        elements
    }
}
