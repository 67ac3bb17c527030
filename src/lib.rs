//! blockseal - superblock management for encrypted block volumes
//!
//! This library creates, opens, rekeys, revokes, and destroys the
//! metadata header of a block-device-level encrypted volume. It does not
//! touch user data: it produces the data cipher's key material and hands
//! out configured sector-cipher contexts for a downstream data path.
//!
//! # Features
//!
//! - **Sealed key slots**: one random data key, wrapped independently in
//!   up to 16 slots with AES-128-GCM-SIV under HKDF-derived wrap keys
//! - **Replicated header**: superblock copies at both ends of the device,
//!   with idempotent, self-healing commits
//! - **Thin-provisioning aware**: sliced and raw devices share one layout
//! - **Memory safety**: all secret material is zeroized on drop
//!
//! # Example
//!
//! ```no_run
//! use blockseal::{MemDevice, Superblock};
//!
//! let dev = MemDevice::raw(4096, 64);
//! let root_key = [0x01u8; 32];
//!
//! Superblock::create(Box::new(dev.clone()), &root_key).unwrap();
//! let mut volume = Superblock::open(Box::new(dev), &root_key, 0).unwrap();
//!
//! // Let a second key open the same volume, then retire it.
//! let other_key = [0x02u8; 32];
//! volume.enroll(&other_key, 5).unwrap();
//! volume.revoke(5).unwrap();
//! ```

pub mod config;
pub mod crypto;
pub mod device;
pub mod error;
pub mod volume;

// Re-export commonly used types
pub use config::{HEADER_LEN, NUM_SLOTS, RESERVED_PAIRS, TYPE_GUID};
pub use crypto::cipher::{Direction, SectorCipher};
pub use crypto::{AeadAlg, CipherAlg, DigestAlg};
pub use device::{BlockDevice, BlockInfo, FileDevice, MemDevice, SliceInfo, SliceRange};
pub use error::{Result, SuperblockError};
pub use volume::{Superblock, Version};
