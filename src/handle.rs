//! File handles
//!
//! A [`FileHandle`] is a value-typed snapshot of one directory entry plus a
//! mutable cursor. It borrows its volume for the volume's lifetime; the
//! volume never references handles back, and two handles on the same volume
//! do not coordinate (interleaved use is defined for readers because every
//! operation addresses the device absolutely).
//!
//! Cursor fields and their invariants between public calls:
//! - `cur_rel <= size`, except transiently inside write extension;
//! - `cur_clu` is a member of the chain rooted at the entry's first
//!   cluster, or an end-of-chain value when the cursor sits just past the
//!   last allocated position;
//! - `cur_ofs < bytes_per_cluster` after any normalization step;
//! - `cur_abs` matches `(cur_clu, cur_ofs)` whenever `cur_clu` is a real
//!   cluster.

use alloc::string::String;

use crate::entry::{FileType, ShortDirEntry};
use crate::fs::Fat16Volume;
use crate::{is_chain_end, ATTR_DIRECTORY};

pub struct FileHandle<'v> {
    pub(crate) vol: &'v Fat16Volume,
    pub(crate) entry: ShortDirEntry,
    pub(crate) file_type: FileType,

    // Cursor
    pub(crate) cur_abs: u32,
    pub(crate) cur_rel: u32,
    pub(crate) cur_clu: u16,
    pub(crate) cur_ofs: u32,

    // Position of the entry within its directory: first cluster of the
    // containing directory (0 for the root) and the entry index.
    pub(crate) dir_clu: u16,
    pub(crate) num: u16,
}

impl<'v> FileHandle<'v> {
    pub(crate) fn new(
        vol: &'v Fat16Volume,
        entry: ShortDirEntry,
        file_type: FileType,
        dir_clu: u16,
        num: u16,
    ) -> Self {
        let cur_clu = entry.first_cluster;
        // Free and deleted slots may carry junk in the cluster field; the
        // cursor parks instead of addressing through it.
        let cur_abs = if cur_clu >= 2 && is_chain_end(cur_clu) {
            0
        } else {
            vol.cluster_start(cur_clu)
        };
        Self {
            vol,
            entry,
            file_type,
            cur_abs,
            cur_rel: 0,
            cur_clu,
            cur_ofs: 0,
            dir_clu,
            num,
        }
    }

    pub fn file_type(&self) -> FileType {
        self.file_type
    }

    /// Logical file size in bytes, as recorded in the directory entry.
    pub fn size(&self) -> u32 {
        self.entry.size
    }

    pub fn first_cluster(&self) -> u16 {
        self.entry.first_cluster
    }

    /// Attribute byte of the entry (composed of the `ATTR_*` flags).
    pub fn attributes(&self) -> u8 {
        self.entry.attr
    }

    /// Index of this entry within its containing directory.
    pub fn entry_index(&self) -> u16 {
        self.num
    }

    /// First cluster of the containing directory, 0 for the root.
    pub fn dir_cluster(&self) -> u16 {
        self.dir_clu
    }

    pub fn is_dir(&self) -> bool {
        self.entry.attr & ATTR_DIRECTORY != 0
    }

    /// True for entries a listing should show: regular files,
    /// subdirectories and the two dot entries. Free and deleted slots,
    /// long-name fragments and the volume label are not valid files.
    pub fn is_valid(&self) -> bool {
        matches!(
            self.file_type,
            FileType::File | FileType::SubDir | FileType::SelfDir | FileType::ParentDir
        )
    }

    /// Human-readable name; `None` for free, deleted and long-name slots.
    pub fn display_name(&self) -> Option<String> {
        self.entry.display_name(self.file_type)
    }

    pub(crate) fn entry(&self) -> &ShortDirEntry {
        &self.entry
    }

    /// Position within the file, in bytes.
    pub fn position(&self) -> u32 {
        self.cur_rel
    }
}
