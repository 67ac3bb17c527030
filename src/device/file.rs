//! File-backed block device.
//!
//! Library-mode callers typically hand the manager an opened file or a
//! raw device node. Transfers are seek-then-exact; a short read or write
//! surfaces as `Io`. Files are always raw devices here, so the slice
//! queries keep their `NotSupported` defaults.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};

use super::{BlockDevice, BlockInfo};
use crate::error::{Result, SuperblockError};

/// Block device over a `std::fs::File`.
pub struct FileDevice {
    file: File,
    block_size: u32,
}

impl FileDevice {
    /// Wraps an open file, exposing it as a device of `block_size` blocks.
    /// Trailing bytes that do not fill a whole block are ignored.
    pub fn new(file: File, block_size: u32) -> Result<Self> {
        if block_size == 0 {
            return Err(SuperblockError::InvalidArgs("zero block size"));
        }
        Ok(Self { file, block_size })
    }
}

impl BlockDevice for FileDevice {
    fn block_info(&self) -> Result<BlockInfo> {
        let len = self.file.metadata()?.len();
        Ok(BlockInfo {
            block_size: self.block_size,
            block_count: len / u64::from(self.block_size),
        })
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(buf)?;
        Ok(())
    }

    fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(buf)?;
        self.file.flush()?;
        Ok(())
    }
}
