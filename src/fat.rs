//! File Allocation Table accessor
//!
//! The FAT is an array of 16-bit little-endian cells indexed by cluster
//! number; the cell for cluster N sits at `fat_addr + 2 * N`. A cell holds
//! the number of the next cluster of the chain, 0x0000 for a free cluster,
//! or a value in 0xFFF8..=0xFFFF marking the end of the chain. The two
//! reserved cells at the start (FAT[0] carries the media byte, FAT[1] an
//! EOC mark) are never followed or handed out.
//!
//! Cells are read and written one at a time, directly against the device.
//! No caching. Only the primary FAT is accessed: secondary copies are left
//! untouched, a documented limitation of this driver.

use alloc::sync::Arc;

use crate::device::{self, BlockDevice};
use crate::{is_chain_end, Fat16Error, FREE_CLUSTER, MAX_CLUSTER_FAT16, SECTOR_SIZE};

pub struct FatTable {
    device: Arc<dyn BlockDevice>,
    /// Absolute byte address of the primary FAT.
    fat_addr: u32,
    /// Number of 16-bit cells the FAT holds (`fat_size_sectors * 256`).
    cells: u32,
}

impl FatTable {
    pub(crate) fn new(device: Arc<dyn BlockDevice>, fat_addr: u32, fat_size_sectors: u16) -> Self {
        Self {
            device,
            fat_addr,
            cells: fat_size_sectors as u32 * (SECTOR_SIZE / 2) as u32,
        }
    }

    fn cell_addr(&self, cluster: u16) -> u32 {
        self.fat_addr + 2 * cluster as u32
    }

    /// The FAT cell value for `cluster`: the following cluster, or a
    /// free/EOC mark.
    pub fn next_cluster(&self, cluster: u16) -> Result<u16, Fat16Error> {
        Ok(device::read_u16(&*self.device, self.cell_addr(cluster))?)
    }

    pub(crate) fn set_next_cluster(&self, cluster: u16, value: u16) -> Result<(), Fat16Error> {
        Ok(device::write_u16(
            &*self.device,
            self.cell_addr(cluster),
            value,
        )?)
    }

    /// Linear scan for the first free cell, starting at cluster 2.
    /// `Ok(None)` when the FAT is full.
    pub(crate) fn find_free_cluster(&self) -> Result<Option<u16>, Fat16Error> {
        let limit = self.cells.min(MAX_CLUSTER_FAT16 as u32 + 1);
        for cluster in 2..limit {
            if self.next_cluster(cluster as u16)? == FREE_CLUSTER {
                return Ok(Some(cluster as u16));
            }
        }
        Ok(None)
    }

    /// Follow `hops` links from `start`. `Ok(None)` when the chain ends
    /// before the requested step count.
    pub(crate) fn walk(&self, start: u16, hops: u32) -> Result<Option<u16>, Fat16Error> {
        let mut cluster = start;
        for _ in 0..hops {
            let next = self.next_cluster(cluster)?;
            if is_chain_end(next) {
                return Ok(None);
            }
            cluster = next;
        }
        Ok(Some(cluster))
    }

    /// Last cluster of the chain rooted at `start`. The walk is bounded by
    /// the FAT size, so a cyclic chain surfaces as `ChainExhausted` instead
    /// of looping forever.
    pub(crate) fn chain_tail(&self, start: u16) -> Result<u16, Fat16Error> {
        let mut cluster = start;
        for _ in 0..self.cells {
            let next = self.next_cluster(cluster)?;
            if is_chain_end(next) {
                return Ok(cluster);
            }
            cluster = next;
        }
        Err(Fat16Error::ChainExhausted)
    }

    /// Number of clusters in the chain rooted at `start`, bounded like
    /// [`FatTable::chain_tail`].
    pub fn chain_len(&self, start: u16) -> Result<u32, Fat16Error> {
        let mut cluster = start;
        for len in 1..=self.cells {
            let next = self.next_cluster(cluster)?;
            if is_chain_end(next) {
                return Ok(len);
            }
            cluster = next;
        }
        Err(Fat16Error::ChainExhausted)
    }
}
