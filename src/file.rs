//! File cursor, read and write
//!
//! Reads and writes move through the file sequentially from the cursor,
//! copying at most one cluster remainder per device call and stepping the
//! chain at cluster boundaries. Writing past the end of the file extends
//! the chain first, zero-fills any sparse hole between the old end and the
//! write position, persists the new size to the directory entry, and only
//! then stores the payload.

use log::trace;

use crate::device;
use crate::entry::FILE_SIZE_OFFSET;
use crate::handle::FileHandle;
use crate::{is_chain_end, Fat16Error, DIRENT_SIZE, END_OF_CLUSTER, SECTOR_SIZE};

pub trait File {
    /// Move the cursor to `pos`, relative to the file start.
    ///
    /// This is the extending seek: walking off the end of the cluster
    /// chain allocates and appends a fresh cluster and continues. It never
    /// changes the recorded file size; the write path depends on that.
    fn seek(&mut self, pos: u32) -> Result<(), Fat16Error>;

    /// Move the cursor to `pos` without ever allocating.
    ///
    /// For read-only callers: positions past the file size fail with
    /// [`Fat16Error::OutOfRange`] and leave the cursor untouched.
    fn seek_bounded(&mut self, pos: u32) -> Result<(), Fat16Error>;

    /// Fill `buf` from the cursor position.
    ///
    /// Fails with [`Fat16Error::OutOfRange`] when the request reaches past
    /// the file size; the bounds check happens before the cursor moves.
    fn read(&mut self, buf: &mut [u8]) -> Result<(), Fat16Error>;

    /// Store `buf` at the cursor position, growing the file as needed.
    ///
    /// A write starting past the end of the file leaves a sparse hole
    /// between the old size and the write position; the hole is filled
    /// with zero bytes before the new size becomes visible. Only
    /// allocation failure aborts a write; clusters appended before the
    /// failure stay appended, and the recorded size has been updated only
    /// if the failure happened after the hole fill. No atomicity is
    /// guaranteed.
    fn write(&mut self, buf: &[u8]) -> Result<(), Fat16Error>;
}

impl File for FileHandle<'_> {
    fn seek(&mut self, pos: u32) -> Result<(), Fat16Error> {
        let bpc = self.vol.bytes_per_cluster();
        let mut cluster = self.entry.first_cluster;
        let mut left = pos;

        // A handle without a data chain (first cluster inside the reserved
        // range) can only be positioned at offset 0; extending it would
        // clobber the reserved FAT cells.
        if cluster < 2 && pos >= bpc {
            return Err(Fat16Error::InvalidForOperation);
        }

        while left >= bpc {
            let next = self.vol.fat().next_cluster(cluster)?;
            cluster = if is_chain_end(next) {
                self.vol.append_cluster(cluster)?
            } else {
                next
            };
            left -= bpc;
        }

        self.cur_rel = pos;
        self.cur_clu = cluster;
        self.cur_ofs = left;
        self.cur_abs = self.vol.cluster_start(cluster) + left;
        Ok(())
    }

    fn seek_bounded(&mut self, pos: u32) -> Result<(), Fat16Error> {
        if pos > self.entry.size {
            return Err(Fat16Error::OutOfRange);
        }

        let bpc = self.vol.bytes_per_cluster();
        let hops = pos / bpc;
        let ofs = pos % bpc;

        let mut cluster = self.entry.first_cluster;
        let mut remaining = hops;
        while remaining > 0 {
            let next = self.vol.fat().next_cluster(cluster)?;
            if is_chain_end(next) {
                // Walking off the last cluster is legal only when the
                // target is the first byte of the would-be next cluster,
                // i.e. the position right after a chain-filling file. The
                // cursor parks at end-of-chain; only bounds-checked
                // operations may look at it there.
                if remaining == 1 && ofs == 0 {
                    self.cur_rel = pos;
                    self.cur_clu = END_OF_CLUSTER;
                    self.cur_ofs = 0;
                    self.cur_abs = 0;
                    return Ok(());
                }
                return Err(Fat16Error::ChainExhausted);
            }
            cluster = next;
            remaining -= 1;
        }

        self.cur_rel = pos;
        self.cur_clu = cluster;
        self.cur_ofs = ofs;
        self.cur_abs = self.vol.cluster_start(cluster) + ofs;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<(), Fat16Error> {
        if buf.is_empty() {
            return Ok(());
        }
        let len = buf.len() as u32;
        if self
            .cur_rel
            .checked_add(len)
            .map_or(true, |end| end > self.entry.size)
        {
            return Err(Fat16Error::OutOfRange);
        }
        if is_chain_end(self.cur_clu) {
            return Err(Fat16Error::ChainExhausted);
        }

        let bpc = self.vol.bytes_per_cluster();
        let mut done = 0usize;
        while done < buf.len() {
            let remaining = (buf.len() - done) as u32;
            let chunk = (self.entry.size - self.cur_rel)
                .min(bpc - self.cur_ofs)
                .min(remaining);
            self.vol
                .device()
                .read_at(&mut buf[done..done + chunk as usize], self.cur_abs)?;
            done += chunk as usize;
            self.advance(chunk)?;
        }
        Ok(())
    }

    fn write(&mut self, buf: &[u8]) -> Result<(), Fat16Error> {
        if buf.is_empty() {
            return Ok(());
        }
        let pos_start = self.cur_rel;
        let end = pos_start
            .checked_add(buf.len() as u32)
            .ok_or(Fat16Error::OutOfRange)?;

        if end > self.entry.size {
            let old_size = self.entry.size;

            // Grow the chain far enough for the whole write before touching
            // any data.
            self.seek(end)?;

            if pos_start > old_size {
                // Sparse hole between the old end and the write position:
                // the bytes in [old_size, pos_start) must read back as zero.
                self.seek(old_size)?;
                trace!(
                    "zero-filling hole [{}, {}) in entry {}",
                    old_size,
                    pos_start,
                    self.num
                );
                let zeros = [0u8; SECTOR_SIZE];
                while self.cur_rel < pos_start {
                    let chunk = (pos_start - self.cur_rel)
                        .min(self.vol.bytes_per_cluster() - self.cur_ofs)
                        .min(SECTOR_SIZE as u32);
                    self.vol
                        .device()
                        .write_at(&zeros[..chunk as usize], self.cur_abs)?;
                    self.advance(chunk)?;
                }
            }

            self.update_size(end)?;
            self.seek(pos_start)?;
        }

        let bpc = self.vol.bytes_per_cluster();
        let mut done = 0usize;
        while done < buf.len() {
            let remaining = (buf.len() - done) as u32;
            let chunk = (bpc - self.cur_ofs).min(remaining);
            self.vol
                .device()
                .write_at(&buf[done..done + chunk as usize], self.cur_abs)?;
            done += chunk as usize;
            self.advance(chunk)?;
        }
        Ok(())
    }
}

impl FileHandle<'_> {
    /// Move all three cursor fields forward by `chunk` bytes and hop to the
    /// next cluster when the current one is exhausted.
    fn advance(&mut self, chunk: u32) -> Result<(), Fat16Error> {
        self.cur_abs += chunk;
        self.cur_rel += chunk;
        self.cur_ofs += chunk;
        if self.cur_ofs >= self.vol.bytes_per_cluster() {
            let next = self.vol.fat().next_cluster(self.cur_clu)?;
            self.cur_ofs = 0;
            self.cur_clu = next;
            // Past the last cluster the cursor parks; the absolute address
            // is only recomputed once a real cluster is entered.
            self.cur_abs = if is_chain_end(next) {
                0
            } else {
                self.vol.cluster_start(next)
            };
        }
        Ok(())
    }

    /// Persist a new size to the entry's slot in its directory and to the
    /// in-memory snapshot.
    fn update_size(&mut self, new_size: u32) -> Result<(), Fat16Error> {
        let addr = self
            .vol
            .resolve(self.dir_clu, self.num as u32 * DIRENT_SIZE as u32)?;
        device::write_u32(
            self.vol.device(),
            addr + FILE_SIZE_OFFSET as u32,
            new_size,
        )?;
        self.entry.size = new_size;
        Ok(())
    }
}
