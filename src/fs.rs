//! Volume handle
//!
//! [`Fat16Volume::mount`] locates the boot sector through the MBR, parses
//! the BPB subset and derives the three region addresses consumed by the
//! rest of the driver (byte units, sector = 512 bytes):
//!
//! ```text
//! fat_addr  = bs_base + reserved_sectors * 512
//! root_addr = fat_addr + num_fats * fat_size_sectors * 512
//! data_addr = root_addr + root_entries * 32
//! ```
//!
//! Data cluster N (N >= 2) begins at `data_addr + (N - 2) * bytes_per_cluster`;
//! cluster values 0 and 1 resolve to `root_addr`. The volume is immutable
//! after mount and exclusively owns its block device; file handles borrow it.

use alloc::string::String;
use alloc::sync::Arc;
use log::{debug, trace};

use crate::bpb::{locate_boot_sector, BootSector};
use crate::device::BlockDevice;
use crate::entry::{FileType, ShortDirEntry};
use crate::fat::FatTable;
use crate::handle::FileHandle;
use crate::{
    Fat16Error, DIRENT_SIZE, DIR_ENTRY_LAST_AND_UNUSED, END_OF_CLUSTER, MAX_CLUSTER_FAT16,
    SECTOR_SIZE, SPACE,
};

pub struct Fat16Volume {
    device: Arc<dyn BlockDevice>,
    bs: BootSector,
    fat: FatTable,
    /// Start of the fixed-size root directory region.
    root_addr: u32,
    /// Start of cluster number 2.
    data_addr: u32,
}

impl Fat16Volume {
    /// Locate and parse the file system on `device`.
    ///
    /// Fails with [`Fat16Error::NoFat16Partition`] when no MBR entry leads
    /// to a signed FAT16 boot sector, and with
    /// [`Fat16Error::TooManyClusters`] when the data region holds more
    /// clusters than 16-bit cells can address.
    pub fn mount(device: Arc<dyn BlockDevice>) -> Result<Self, Fat16Error> {
        let base = locate_boot_sector(&*device)?;
        let bs = BootSector::load(&*device, base)?;

        if bs.data_cluster_cnt() > MAX_CLUSTER_FAT16 as u32 {
            return Err(Fat16Error::TooManyClusters);
        }

        let fat_addr = base + bs.reserved_sectors as u32 * SECTOR_SIZE as u32;
        let root_addr =
            fat_addr + bs.num_fats as u32 * bs.fat_size_sectors as u32 * SECTOR_SIZE as u32;
        let data_addr = root_addr + bs.root_entries as u32 * DIRENT_SIZE as u32;
        let fat = FatTable::new(Arc::clone(&device), fat_addr, bs.fat_size_sectors);

        debug!(
            "mounted FAT16 volume at {:#x}: {} B/cluster, {} root entries, {} data clusters",
            base,
            bs.bytes_per_cluster,
            bs.root_entries,
            bs.data_cluster_cnt()
        );

        Ok(Self {
            device,
            bs,
            fat,
            root_addr,
            data_addr,
        })
    }

    pub fn bytes_per_cluster(&self) -> u32 {
        self.bs.bytes_per_cluster
    }

    pub fn root_entries(&self) -> u16 {
        self.bs.root_entries
    }

    pub fn fat(&self) -> &FatTable {
        &self.fat
    }

    pub(crate) fn device(&self) -> &dyn BlockDevice {
        &*self.device
    }

    /// Starting address of a cluster. Values below 2 address the root
    /// directory region.
    pub(crate) fn cluster_start(&self, cluster: u16) -> u32 {
        if cluster < 2 {
            return self.root_addr;
        }
        self.data_addr + (cluster as u32 - 2) * self.bs.bytes_per_cluster
    }

    /// Translate `(chain start, relative byte offset)` to an absolute
    /// address, following the FAT across cluster boundaries. The root
    /// directory is contiguous, so cluster values below 2 translate without
    /// a chain walk.
    pub(crate) fn resolve(&self, start: u16, rel: u32) -> Result<u32, Fat16Error> {
        if start < 2 {
            return Ok(self.root_addr + rel);
        }
        let hops = rel / self.bs.bytes_per_cluster;
        match self.fat.walk(start, hops)? {
            Some(cluster) => Ok(self.cluster_start(cluster) + rel % self.bs.bytes_per_cluster),
            None => Err(Fat16Error::ChainExhausted),
        }
    }

    /// Claim the first free cluster: mark its FAT cell end-of-chain and
    /// clear the first byte of every 32-byte slot inside it, which is what
    /// marks all possible directory entries unused. File data needs no
    /// deeper zeroing, reads are bounded by the file size.
    pub(crate) fn alloc_cluster(&self) -> Result<u16, Fat16Error> {
        let cluster = self
            .fat
            .find_free_cluster()?
            .ok_or(Fat16Error::AllocFailed)?;
        self.fat.set_next_cluster(cluster, END_OF_CLUSTER)?;

        let start = self.cluster_start(cluster);
        let mut ofs = 0;
        while ofs < self.bs.bytes_per_cluster {
            self.device
                .write_at(&[DIR_ENTRY_LAST_AND_UNUSED], start + ofs)?;
            ofs += DIRENT_SIZE as u32;
        }

        trace!("allocated cluster {}", cluster);
        Ok(cluster)
    }

    /// Extend a chain by one freshly allocated cluster and return it.
    pub(crate) fn append_cluster(&self, last: u16) -> Result<u16, Fat16Error> {
        let cluster = self.alloc_cluster()?;
        self.fat.set_next_cluster(last, cluster)?;
        trace!("chain extended: {} -> {}", last, cluster);
        Ok(cluster)
    }

    /// Open the first entry of the root directory.
    ///
    /// The entry may be invalid (a volume label, deleted slot, or a blank
    /// `None` entry on an empty volume); [`crate::Dir::next`] and friends
    /// work either way.
    pub fn open_root(&self) -> Result<FileHandle<'_>, Fat16Error> {
        self.open_entry(0, 0)
    }

    /// Load directory entry `num` of the directory rooted at `dir_cluster`
    /// (0 for the root directory) and wrap it in a handle with a rewound
    /// cursor.
    pub(crate) fn open_entry(
        &self,
        dir_cluster: u16,
        num: u16,
    ) -> Result<FileHandle<'_>, Fat16Error> {
        let addr = self.resolve(dir_cluster, num as u32 * DIRENT_SIZE as u32)?;
        let mut raw = [0u8; DIRENT_SIZE];
        self.device.read_at(&mut raw, addr)?;
        let (entry, file_type) = ShortDirEntry::decode(&raw);
        Ok(FileHandle::new(self, entry, file_type, dir_cluster, num))
    }

    /// Resolve the volume label: a LABEL entry at the start of the root
    /// directory wins, the space-padded BPB field is the fallback.
    pub fn volume_label(&self) -> Result<String, Fat16Error> {
        let first = self.open_root()?;
        let label = if first.file_type() == FileType::Label {
            first.entry().stored_name()
        } else {
            self.bs.volume_label
        };
        let end = label
            .iter()
            .rposition(|&b| b != SPACE)
            .map(|i| i + 1)
            .unwrap_or(0);
        Ok(label[..end].iter().map(|&b| b as char).collect())
    }
}
