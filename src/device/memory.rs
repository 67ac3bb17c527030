//! In-memory block device.
//!
//! Handles are cheap clones sharing one backing buffer, so a caller can
//! hand a clone to `Superblock::create` and keep another to reopen or
//! inspect the device afterwards. Optionally emulates thin provisioning
//! with a per-slice allocation bitmap: transfers touching an unallocated
//! slice fail, `extend` allocates.

use std::io;
use std::sync::{Arc, Mutex, MutexGuard};

use super::{BlockDevice, BlockInfo, SliceInfo, SliceRange};
use crate::error::{Result, SuperblockError};

struct FvmState {
    slice_size: u64,
    allocated: Vec<bool>,
}

struct MemState {
    block_size: u32,
    data: Vec<u8>,
    fvm: Option<FvmState>,
    writes: u64,
}

/// Shared-state in-memory device.
#[derive(Clone)]
pub struct MemDevice {
    state: Arc<Mutex<MemState>>,
}

impl MemDevice {
    /// Creates a raw (non-sliced) device of `block_count` blocks.
    pub fn raw(block_size: u32, block_count: u64) -> Self {
        let len = (u64::from(block_size) * block_count) as usize;
        Self {
            state: Arc::new(Mutex::new(MemState {
                block_size,
                data: vec![0u8; len],
                fvm: None,
                writes: 0,
            })),
        }
    }

    /// Creates a thin-provisioned device of `vslice_count` slices with
    /// only the first slice allocated.
    pub fn sliced(block_size: u32, slice_size: u64, vslice_count: u64) -> Self {
        let len = (slice_size * vslice_count) as usize;
        let mut allocated = vec![false; vslice_count as usize];
        if let Some(first) = allocated.first_mut() {
            *first = true;
        }
        Self {
            state: Arc::new(Mutex::new(MemState {
                block_size,
                data: vec![0u8; len],
                fvm: Some(FvmState { slice_size, allocated }),
                writes: 0,
            })),
        }
    }

    /// Number of `write_at` calls served so far. Test probe for commit
    /// idempotence.
    pub fn write_count(&self) -> u64 {
        self.state.lock().map(|s| s.writes).unwrap_or(0)
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemState>> {
        self.state
            .lock()
            .map_err(|_| SuperblockError::Internal("device lock poisoned"))
    }
}

impl MemState {
    fn check_range(&self, offset: u64, len: usize) -> Result<usize> {
        let end = offset
            .checked_add(len as u64)
            .ok_or(SuperblockError::InvalidArgs("offset overflow"))?;
        if end > self.data.len() as u64 {
            return Err(SuperblockError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "transfer past end of device",
            )));
        }
        if let Some(fvm) = &self.fvm {
            let first = offset / fvm.slice_size;
            let last = (end - 1) / fvm.slice_size;
            for vslice in first..=last {
                if !fvm.allocated[vslice as usize] {
                    return Err(SuperblockError::Io(io::Error::new(
                        io::ErrorKind::InvalidInput,
                        "slice not allocated",
                    )));
                }
            }
        }
        Ok(offset as usize)
    }
}

impl BlockDevice for MemDevice {
    fn block_info(&self) -> Result<BlockInfo> {
        let state = self.lock()?;
        Ok(BlockInfo {
            block_size: state.block_size,
            block_count: state.data.len() as u64 / u64::from(state.block_size),
        })
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let state = self.lock()?;
        let start = state.check_range(offset, buf.len())?;
        buf.copy_from_slice(&state.data[start..start + buf.len()]);
        Ok(())
    }

    fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<()> {
        let mut state = self.lock()?;
        let start = state.check_range(offset, buf.len())?;
        state.data[start..start + buf.len()].copy_from_slice(buf);
        state.writes += 1;
        Ok(())
    }

    fn slice_info(&self) -> Result<SliceInfo> {
        let state = self.lock()?;
        match &state.fvm {
            Some(fvm) => Ok(SliceInfo {
                slice_size: fvm.slice_size,
                vslice_count: fvm.allocated.len() as u64,
            }),
            None => Err(SuperblockError::NotSupported("device is not sliced")),
        }
    }

    fn query_slice(&self, vslice: u64) -> Result<SliceRange> {
        let state = self.lock()?;
        let fvm = state
            .fvm
            .as_ref()
            .ok_or(SuperblockError::NotSupported("device is not sliced"))?;
        let total = fvm.allocated.len() as u64;
        if vslice >= total {
            return Err(SuperblockError::InvalidArgs("slice index out of range"));
        }
        let allocated = fvm.allocated[vslice as usize];
        let count = fvm.allocated[vslice as usize..]
            .iter()
            .take_while(|&&a| a == allocated)
            .count() as u64;
        Ok(SliceRange { allocated, count })
    }

    fn extend(&mut self, vslice: u64, count: u64) -> Result<()> {
        let mut state = self.lock()?;
        let fvm = state
            .fvm
            .as_mut()
            .ok_or(SuperblockError::NotSupported("device is not sliced"))?;
        let total = fvm.allocated.len() as u64;
        let end = vslice
            .checked_add(count)
            .ok_or(SuperblockError::InvalidArgs("slice range overflow"))?;
        if end > total {
            return Err(SuperblockError::NoSpace);
        }
        for slot in &mut fvm.allocated[vslice as usize..end as usize] {
            *slot = true;
        }
        Ok(())
    }
}
