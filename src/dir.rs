//! Directory iteration, lookup and file creation
//!
//! A directory is identified by its first cluster; the root directory uses
//! the reserved value 0 and lives in a fixed-size region of `root_entries`
//! slots, every other directory is an ordinary cluster chain. A handle's
//! `dir_cluster`/`entry_index` pair names the slot it was loaded from, and
//! the iteration calls below re-load the handle in place from neighboring
//! slots.
//!
//! Enumeration stops at the first entry whose name starts with 0x00: no
//! live entry may appear after it in the same directory. Creation reuses
//! both 0x00 and 0xE5 slots, and a directory cluster appended during
//! creation has the first byte of every slot cleared, which keeps the stop
//! rule intact.

use log::debug;

use crate::device;
use crate::entry::{FileType, ShortDirEntry};
use crate::handle::FileHandle;
use crate::{
    Fat16Error, ATTR_DIRECTORY, DIRENT_SIZE, DIR_ENTRY_LAST_AND_UNUSED, DIR_ENTRY_UNUSED,
};

pub trait Dir {
    /// Reload entry 0 of the directory this handle came from.
    fn first(&mut self) -> Result<(), Fat16Error>;

    /// Advance to the next entry slot. `Ok(false)` at the end of the
    /// directory: past the root capacity, past the last directory cluster,
    /// or at a never-used slot.
    fn next(&mut self) -> Result<bool, Fat16Error>;

    /// Step back one entry slot. `Ok(false)` at entry 0.
    fn prev(&mut self) -> Result<bool, Fat16Error>;

    /// Descend into the directory this entry describes: the handle is
    /// repositioned to entry 0 of that directory's cluster chain. Fails on
    /// non-directories and on "." (which names the directory it lives in).
    fn open_dir(&mut self) -> Result<(), Fat16Error>;

    /// Search for `name` (display form) from the current slot onward.
    ///
    /// On `Ok(true)` the handle holds the match; on `Ok(false)` it sits
    /// past the end of the directory, so rewind with [`Dir::first`] before
    /// using it again.
    fn find(&mut self, name: &str) -> Result<bool, Fat16Error>;

    /// Create an empty regular file named `name` (display form) in the
    /// directory this handle came from, and return a handle to it.
    ///
    /// The new entry takes the first free or deleted slot; a full
    /// subdirectory grows by one cluster, a full root directory fails with
    /// [`Fat16Error::RootFull`]. The file gets one freshly allocated
    /// cluster, zero attributes, zero timestamps and size 0.
    fn create(&mut self, name: &str) -> Result<Self, Fat16Error>
    where
        Self: Sized;
}

impl<'v> Dir for FileHandle<'v> {
    fn first(&mut self) -> Result<(), Fat16Error> {
        *self = self.vol.open_entry(self.dir_clu, 0)?;
        Ok(())
    }

    fn next(&mut self) -> Result<bool, Fat16Error> {
        let next_num = self.num as u32 + 1;
        if self.dir_clu == 0 && next_num >= self.vol.root_entries() as u32 {
            return Ok(false);
        }

        let addr = match self
            .vol
            .resolve(self.dir_clu, next_num * DIRENT_SIZE as u32)
        {
            Ok(addr) => addr,
            Err(Fat16Error::ChainExhausted) => return Ok(false),
            Err(err) => return Err(err),
        };

        // A never-used slot ends the directory.
        if device::read_u8(self.vol.device(), addr)? == DIR_ENTRY_LAST_AND_UNUSED {
            return Ok(false);
        }

        *self = self.vol.open_entry(self.dir_clu, self.num + 1)?;
        Ok(true)
    }

    fn prev(&mut self) -> Result<bool, Fat16Error> {
        if self.num == 0 {
            return Ok(false);
        }
        *self = self.vol.open_entry(self.dir_clu, self.num - 1)?;
        Ok(true)
    }

    fn open_dir(&mut self) -> Result<(), Fat16Error> {
        if self.entry().attr & ATTR_DIRECTORY == 0 || self.file_type() == FileType::SelfDir {
            return Err(Fat16Error::InvalidForOperation);
        }
        *self = self.vol.open_entry(self.first_cluster(), 0)?;
        Ok(())
    }

    fn find(&mut self, name: &str) -> Result<bool, Fat16Error> {
        let want = ShortDirEntry::stored_name_from_str(name);
        self.lookup(&want)
    }

    fn create(&mut self, name: &str) -> Result<FileHandle<'v>, Fat16Error> {
        let want = ShortDirEntry::stored_name_from_str(name);

        // The short name must be unique within the directory.
        self.first()?;
        if self.lookup(&want)? {
            self.first()?;
            return Err(Fat16Error::AlreadyExists);
        }
        self.first()?;

        // First slot that is free or deleted. Running off the cluster chain
        // of a subdirectory grows it; the root region cannot grow.
        let mut num: u32 = 0;
        let addr = loop {
            if self.dir_clu == 0 && num >= self.vol.root_entries() as u32 {
                return Err(Fat16Error::RootFull);
            }
            let addr = match self.vol.resolve(self.dir_clu, num * DIRENT_SIZE as u32) {
                Ok(addr) => addr,
                Err(Fat16Error::ChainExhausted) => {
                    let tail = self.vol.fat().chain_tail(self.dir_clu)?;
                    self.vol.append_cluster(tail)?;
                    continue;
                }
                Err(err) => return Err(err),
            };
            let first_byte = device::read_u8(self.vol.device(), addr)?;
            if first_byte == DIR_ENTRY_LAST_AND_UNUSED || first_byte == DIR_ENTRY_UNUSED {
                break addr;
            }
            num += 1;
        };

        // Even an empty file owns one cluster, marked end-of-chain.
        let cluster = self.vol.alloc_cluster()?;
        let entry = ShortDirEntry::new(want, cluster);
        self.vol.device().write_at(&entry.encode(), addr)?;

        debug!(
            "created '{}' at slot {} of directory {}",
            name, num, self.dir_clu
        );

        // Reload from disk so the returned handle starts from a normalized
        // cursor, exactly like any other opened entry.
        self.vol.open_entry(self.dir_clu, num as u16)
    }
}

impl FileHandle<'_> {
    /// Byte-exact search over the stored 11-byte name forms, from the
    /// current slot onward.
    fn lookup(&mut self, want: &[u8; 11]) -> Result<bool, Fat16Error> {
        loop {
            if self.is_valid() && self.entry().stored_name() == *want {
                return Ok(true);
            }
            if !self.next()? {
                return Ok(false);
            }
        }
    }
}
