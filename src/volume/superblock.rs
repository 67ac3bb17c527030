//! Superblock lifecycle: create, open, enroll, revoke, shred.
//!
//! Several copies of a volume's metadata are kept at the beginning and
//! end of the backing device; `Locations` enumerates them. The
//! superblock is a fixed type GUID, an instance GUID, a 32-bit version,
//! and a set of key slots, each holding the volume's data cipher key
//! material wrapped by an AEAD key derived from a caller-provided root
//! key and the slot number. The rest of the block is random filler laid
//! down before any structured field, so unoccupied slots cannot be told
//! apart from occupied ones.
//!
//! All operations on one superblock must be externally serialized; the
//! manager itself holds no locks and spawns no tasks.

use log::{debug, warn};
use rand::RngCore;
use zeroize::Zeroizing;

use crate::config::{GUID_LEN, HEADER_LEN, NUM_SLOTS, PAGE_SIZE, RESERVED_PAIRS};
use crate::crypto::cipher::{Direction, SectorCipher};
use crate::crypto::{aead, hkdf};
use crate::device::{BlockDevice, BlockInfo, SliceInfo};
use crate::error::{Result, SuperblockError};
use crate::volume::header::{Header, Version};
use crate::volume::location::Locations;

/// How the backing device was handed to the manager. Library mode owns
/// the full lifecycle; driver mode only opens volumes and binds ciphers.
/// The two variants share all upper logic and diverge only at the I/O
/// leaves.
enum Backing {
    Library(Box<dyn BlockDevice>),
    Driver(Box<dyn BlockDevice>),
}

impl Backing {
    fn device(&mut self) -> &mut dyn BlockDevice {
        match self {
            Backing::Library(dev) | Backing::Driver(dev) => dev.as_mut(),
        }
    }

    fn device_ref(&self) -> &dyn BlockDevice {
        match self {
            Backing::Library(dev) | Backing::Driver(dev) => dev.as_ref(),
        }
    }

    fn is_driver(&self) -> bool {
        matches!(self, Backing::Driver(_))
    }
}

/// Manager of one volume's superblock.
///
/// Owns all secret material for the volume; every secret buffer is
/// zeroized when the manager is dropped or reset.
pub struct Superblock {
    backing: Backing,
    blk: BlockInfo,
    fvm: SliceInfo,
    has_fvm: bool,
    guid: [u8; GUID_LEN],
    version: Option<Version>,
    slot_len: usize,
    wrap_key: Zeroizing<Vec<u8>>,
    wrap_iv: Zeroizing<Vec<u8>>,
    data_key: Zeroizing<Vec<u8>>,
    data_iv: Zeroizing<Vec<u8>>,
    block: Zeroizing<Vec<u8>>,
    aad: Vec<u8>,
}

impl Superblock {
    /// Formats `dev` as a new volume and seals slot 0 with `root_key`.
    ///
    /// The freshly written superblock is committed to every location.
    /// Callers reopen the device with [`Superblock::open`] to use it.
    pub fn create(dev: Box<dyn BlockDevice>, root_key: &[u8]) -> Result<()> {
        if root_key.is_empty() {
            return Err(SuperblockError::InvalidArgs("empty root key"));
        }
        let mut sb = Self::with_backing(Backing::Library(dev));
        sb.init()?;
        sb.create_block()?;
        sb.seal_slot(root_key, 0)?;
        sb.commit()
    }

    /// Opens an existing volume in library mode, unsealing `slot` with
    /// `root_key`. Enrollment, revocation, and shredding are available.
    pub fn open(dev: Box<dyn BlockDevice>, root_key: &[u8], slot: u64) -> Result<Self> {
        Self::open_with(Backing::Library(dev), root_key, slot)
    }

    /// Opens an existing volume in driver mode. Only [`Superblock::info`]
    /// and [`Superblock::bind_ciphers`] are available afterwards.
    pub fn open_driver(dev: Box<dyn BlockDevice>, root_key: &[u8], slot: u64) -> Result<Self> {
        Self::open_with(Backing::Driver(dev), root_key, slot)
    }

    /// Seals the volume's key material into `slot` under a new root key.
    pub fn enroll(&mut self, root_key: &[u8], slot: u64) -> Result<()> {
        self.require_library("enroll")?;
        if slot >= NUM_SLOTS {
            return Err(SuperblockError::InvalidArgs("slot out of range"));
        }
        if root_key.is_empty() {
            return Err(SuperblockError::InvalidArgs("empty root key"));
        }
        self.require_operational()?;
        self.seal_slot(root_key, slot)?;
        self.commit()
    }

    /// Destroys `slot` by overwriting it with random bytes.
    ///
    /// Revoking a slot that was never enrolled is permitted and harmless.
    pub fn revoke(&mut self, slot: u64) -> Result<()> {
        self.require_library("revoke")?;
        if slot >= NUM_SLOTS {
            return Err(SuperblockError::InvalidArgs("slot out of range"));
        }
        self.require_operational()?;
        let off = HEADER_LEN + self.slot_len * slot as usize;
        rand::rng().fill_bytes(&mut self.block[off..off + self.slot_len]);
        self.commit()
    }

    /// Renders the volume permanently inaccessible by overwriting every
    /// superblock location with random bytes.
    ///
    /// Shredding is best effort across replicas: a write failure is
    /// returned only if no location could be overwritten at all. The
    /// manager resets to uninitialized afterwards.
    pub fn shred(&mut self) -> Result<()> {
        self.require_library("shred")?;
        self.require_operational()?;
        rand::rng().fill_bytes(&mut self.block);
        let mut overwritten = 0u64;
        let mut first_err = None;
        for offset in self.locations()? {
            match self.write_block(offset) {
                Ok(()) => overwritten += 1,
                Err(err) => {
                    warn!("shred: write at offset {offset} failed: {err}");
                    if first_err.is_none() {
                        first_err = Some(err);
                    }
                }
            }
        }
        self.reset();
        match (overwritten, first_err) {
            (0, Some(err)) => Err(err),
            _ => Ok(()),
        }
    }

    /// Reports block geometry, slice geometry, and whether the backing
    /// device is thin-provisioned. Counts exclude the reserved slices.
    pub fn info(&self) -> Result<(BlockInfo, SliceInfo, bool)> {
        self.require_operational()?;
        Ok((self.blk, self.fvm, self.has_fvm))
    }

    /// Builds the matched encrypt/decrypt pair for the data path.
    ///
    /// Driver mode only. The pair is configured with the volume's cipher,
    /// data key, and data IV; sector indices are bounded by
    /// `u64::MAX / block_size`.
    pub fn bind_ciphers(&self) -> Result<(SectorCipher, SectorCipher)> {
        if !self.backing.is_driver() {
            return Err(SuperblockError::BadState("ciphers bind in driver mode only"));
        }
        self.require_operational()?;
        let version = self
            .version
            .ok_or(SuperblockError::BadState("volume not configured"))?;
        let tweak_count = u64::MAX / u64::from(self.blk.block_size);
        let encrypt = SectorCipher::new(
            version.cipher(),
            Direction::Encrypt,
            &self.data_key,
            &self.data_iv,
            tweak_count,
        )?;
        let decrypt = SectorCipher::new(
            version.cipher(),
            Direction::Decrypt,
            &self.data_key,
            &self.data_iv,
            tweak_count,
        )?;
        Ok((encrypt, decrypt))
    }

    /// Instance GUID of the open volume.
    pub fn guid(&self) -> &[u8; GUID_LEN] {
        &self.guid
    }

    /// Format version of the open volume, if configured.
    pub fn version(&self) -> Option<Version> {
        self.version
    }

    /// Length of the volume's data key in bytes.
    pub fn data_key_len(&self) -> usize {
        self.data_key.len()
    }

    /// Length of the volume's data IV in bytes.
    pub fn data_iv_len(&self) -> usize {
        self.data_iv.len()
    }

    // Construction

    fn with_backing(backing: Backing) -> Self {
        Self {
            backing,
            blk: BlockInfo::default(),
            fvm: SliceInfo::default(),
            has_fvm: false,
            guid: [0u8; GUID_LEN],
            version: None,
            slot_len: 0,
            wrap_key: Zeroizing::new(Vec::new()),
            wrap_iv: Zeroizing::new(Vec::new()),
            data_key: Zeroizing::new(Vec::new()),
            data_iv: Zeroizing::new(Vec::new()),
            block: Zeroizing::new(Vec::new()),
            aad: Vec::new(),
        }
    }

    fn open_with(backing: Backing, root_key: &[u8], slot: u64) -> Result<Self> {
        if slot >= NUM_SLOTS {
            return Err(SuperblockError::InvalidArgs("slot out of range"));
        }
        if root_key.is_empty() {
            return Err(SuperblockError::InvalidArgs("empty root key"));
        }
        let mut sb = Self::with_backing(backing);
        sb.init()?;
        sb.open_any(root_key, slot)?;
        Ok(sb)
    }

    // Configuration

    /// Acquires geometry and sizes the block buffer. Every error path
    /// restores the uninitialized state, wiping anything partially set.
    fn init(&mut self) -> Result<()> {
        self.reset();
        let result = self.init_geometry();
        if result.is_err() {
            self.reset();
        }
        result
    }

    fn init_geometry(&mut self) -> Result<()> {
        let mut blk = self.backing.device_ref().block_info()?;

        // Align the logical superblock to pages: aggregate small device
        // blocks, accept larger blocks only if they are page multiples.
        if u64::from(blk.block_size) < PAGE_SIZE {
            if PAGE_SIZE % u64::from(blk.block_size) != 0 {
                debug!("unsupported block size: {}", blk.block_size);
                return Err(SuperblockError::NotSupported(
                    "block size does not divide page size",
                ));
            }
            blk.block_count /= PAGE_SIZE / u64::from(blk.block_size);
            blk.block_size = PAGE_SIZE as u32;
        } else if u64::from(blk.block_size) % PAGE_SIZE != 0 {
            debug!("unsupported block size: {}", blk.block_size);
            return Err(SuperblockError::NotSupported(
                "block size is not a page multiple",
            ));
        }

        let block_size = u64::from(blk.block_size);
        let reserved = block_size
            .checked_mul(RESERVED_PAIRS)
            .ok_or(SuperblockError::Internal("reserved size overflow"))?;

        let mut fvm;
        match self.backing.device_ref().slice_info() {
            Ok(info) => {
                // Thin-provisioned device. Both reserved slices must be
                // present, and the last one must be backed by storage.
                if info.slice_size < reserved || info.vslice_count < 2 {
                    debug!(
                        "bad sliced device: slice_size={}, vslice_count={}",
                        info.slice_size, info.vslice_count
                    );
                    return Err(SuperblockError::NoSpace);
                }
                let last = info.vslice_count - 1;
                let range = self.backing.device_ref().query_slice(last)?;
                if range.count == 0 {
                    return Err(SuperblockError::Internal("empty slice query response"));
                }
                if !range.allocated {
                    self.backing.device().extend(last, 1)?;
                }
                fvm = info;
                self.has_fvm = true;
            }
            Err(SuperblockError::NotSupported(_)) => {
                // Raw device. Synthesize slice geometry so one walk covers
                // both layouts.
                if blk.block_count / 2 < RESERVED_PAIRS {
                    debug!(
                        "bad device: block_size={}, block_count={}",
                        blk.block_size, blk.block_count
                    );
                    return Err(SuperblockError::NoSpace);
                }
                fvm = SliceInfo {
                    slice_size: reserved,
                    vslice_count: blk.block_count / RESERVED_PAIRS,
                };
                self.has_fvm = false;
            }
            Err(err) => return Err(err),
        }

        // Account for the two reserved slices.
        let reserved_blocks = (fvm.slice_size / block_size) * 2;
        if blk.block_count < reserved_blocks {
            return Err(SuperblockError::NoSpace);
        }
        fvm.vslice_count -= 2;
        blk.block_count -= reserved_blocks;

        self.block = Zeroizing::new(vec![0u8; blk.block_size as usize]);
        self.blk = blk;
        self.fvm = fvm;
        Ok(())
    }

    /// Selects algorithms for `version` and sizes the secret buffers.
    fn configure(&mut self, version: Version) -> Result<()> {
        let aead_alg = version.aead();
        let cipher_alg = version.cipher();
        self.wrap_key = Zeroizing::new(vec![0u8; aead_alg.key_len()]);
        self.wrap_iv = Zeroizing::new(vec![0u8; aead_alg.iv_len()]);
        self.data_key = Zeroizing::new(vec![0u8; cipher_alg.key_len()]);
        self.data_iv = Zeroizing::new(vec![0u8; cipher_alg.iv_len()]);
        self.slot_len = cipher_alg.key_len() + cipher_alg.iv_len() + aead_alg.tag_len();

        let needed = HEADER_LEN + NUM_SLOTS as usize * self.slot_len;
        if (self.blk.block_size as usize) < needed {
            debug!(
                "block size too small: have {}, need {}",
                self.blk.block_size, needed
            );
            return Err(SuperblockError::NotSupported(
                "key slots do not fit in one block",
            ));
        }
        self.version = Some(version);
        Ok(())
    }

    /// Derives the wrap key and wrap IV for `slot` from `root_key`,
    /// salted by the instance GUID.
    fn derive_slot_keys(&mut self, root_key: &[u8], slot: u64) -> Result<()> {
        let version = self
            .version
            .ok_or(SuperblockError::BadState("volume not configured"))?;
        let digest = version.digest();
        let aead_alg = version.aead();
        self.wrap_key = hkdf::derive(
            digest,
            root_key,
            &self.guid,
            &hkdf::wrap_key_label(slot),
            aead_alg.key_len(),
        )?;
        self.wrap_iv = hkdf::derive(
            digest,
            root_key,
            &self.guid,
            &hkdf::wrap_iv_label(slot),
            aead_alg.iv_len(),
        )?;
        Ok(())
    }

    /// Zeroes all secret state and returns to uninitialized.
    fn reset(&mut self) {
        self.blk = BlockInfo::default();
        self.fvm = SliceInfo::default();
        self.has_fvm = false;
        self.guid = [0u8; GUID_LEN];
        self.version = None;
        self.slot_len = 0;
        // Replacing a Zeroizing buffer zeroes the old allocation on drop.
        self.wrap_key = Zeroizing::new(Vec::new());
        self.wrap_iv = Zeroizing::new(Vec::new());
        self.data_key = Zeroizing::new(Vec::new());
        self.data_iv = Zeroizing::new(Vec::new());
        self.block = Zeroizing::new(Vec::new());
        self.aad.clear();
    }

    // Block assembly

    /// Assembles a fresh superblock image: random backdrop, header, new
    /// data key and IV. No slot is sealed yet.
    fn create_block(&mut self) -> Result<()> {
        rand::rng().fill_bytes(&mut self.block);

        let header = Header::generate(Version::DEFAULT);
        self.configure(header.version)?;
        header.encode_into(&mut self.block);
        self.guid = header.guid;

        rand::rng().fill_bytes(&mut self.data_key);
        rand::rng().fill_bytes(&mut self.data_iv);
        self.aad = self.block[..HEADER_LEN].to_vec();
        Ok(())
    }

    /// Seals `data_key || data_iv` into `slot`, binding the header prefix
    /// as associated data.
    fn seal_slot(&mut self, root_key: &[u8], slot: u64) -> Result<()> {
        let version = self
            .version
            .ok_or(SuperblockError::BadState("volume not configured"))?;
        let mut plaintext = Zeroizing::new(Vec::with_capacity(
            self.data_key.len() + self.data_iv.len(),
        ));
        plaintext.extend_from_slice(&self.data_key);
        plaintext.extend_from_slice(&self.data_iv);

        self.derive_slot_keys(root_key, slot)?;
        let sealed = aead::seal(
            version.aead(),
            &self.wrap_key,
            &self.wrap_iv,
            &self.aad,
            &plaintext,
        )?;
        if sealed.len() != self.slot_len {
            return Err(SuperblockError::Internal("sealed slot length mismatch"));
        }
        let off = HEADER_LEN + self.slot_len * slot as usize;
        self.block[off..off + self.slot_len].copy_from_slice(&sealed);
        Ok(())
    }

    /// Parses the block in the scratch buffer and tries to unseal `slot`.
    fn open_slot(&mut self, root_key: &[u8], slot: u64) -> Result<()> {
        let header = Header::decode(&self.block)?;
        self.guid = header.guid;
        self.configure(header.version)?;
        self.derive_slot_keys(root_key, slot)?;

        let off = HEADER_LEN + self.slot_len * slot as usize;
        let sealed = self.block[off..off + self.slot_len].to_vec();
        self.aad = self.block[..HEADER_LEN].to_vec();

        let plaintext = aead::open(
            header.version.aead(),
            &self.wrap_key,
            &self.wrap_iv,
            &self.aad,
            &sealed,
        )?;
        let key_len = self.data_key.len();
        let iv_len = self.data_iv.len();
        if plaintext.len() != key_len + iv_len {
            warn!(
                "unsealed slot has {} residual bytes",
                plaintext.len().saturating_sub(key_len + iv_len)
            );
            return Err(SuperblockError::Internal("unsealed slot length mismatch"));
        }
        self.data_key.copy_from_slice(&plaintext[..key_len]);
        self.data_iv.copy_from_slice(&plaintext[key_len..]);
        Ok(())
    }

    // Committing

    /// Writes the current block image to every location that does not
    /// already match it byte for byte.
    ///
    /// Read failures are treated as a mismatch and written over; write
    /// failures are logged and skipped so one healthy replica is enough
    /// for progress. Calling `commit` twice in a row performs no writes
    /// on the second call.
    fn commit(&mut self) -> Result<()> {
        let current = self.block.clone();
        for offset in self.locations()? {
            if self.read_block(offset).is_ok() && *self.block == *current {
                continue;
            }
            self.block.copy_from_slice(&current);
            if let Err(err) = self.write_block(offset) {
                warn!("commit: write at offset {offset} failed: {err}");
            }
        }
        Ok(())
    }

    /// Walks the locations until one block unseals; on success the other
    /// replicas are healed by an immediate commit.
    fn open_any(&mut self, root_key: &[u8], slot: u64) -> Result<()> {
        for offset in self.locations()? {
            if let Err(err) = self.read_block(offset) {
                debug!("failed to read block at offset {offset}: {err}");
            } else if let Err(err) = self.open_slot(root_key, slot) {
                debug!("failed to open block at offset {offset}: {err}");
            } else {
                return self.commit();
            }
        }
        Err(SuperblockError::AccessDenied)
    }

    // I/O leaves

    fn locations(&self) -> Result<Locations> {
        Locations::new(
            u64::from(self.blk.block_size),
            self.fvm.slice_size,
            self.fvm.vslice_count,
        )
    }

    fn read_block(&mut self, offset: u64) -> Result<()> {
        self.backing.device().read_at(offset, &mut self.block)
    }

    fn write_block(&mut self, offset: u64) -> Result<()> {
        self.backing.device().write_at(offset, &self.block)
    }

    // State checks

    fn require_library(&self, op: &str) -> Result<()> {
        if self.backing.is_driver() {
            debug!("{op} is not available in driver mode");
            return Err(SuperblockError::BadState("operation requires library mode"));
        }
        Ok(())
    }

    fn require_operational(&self) -> Result<()> {
        if self.block.is_empty() {
            return Err(SuperblockError::BadState("volume not initialized"));
        }
        Ok(())
    }
}

impl std::fmt::Debug for Superblock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Superblock")
            .field("mode", if self.backing.is_driver() { &"driver" } else { &"library" })
            .field("blk", &self.blk)
            .field("fvm", &self.fvm)
            .field("has_fvm", &self.has_fvm)
            .field("version", &self.version)
            .field("secrets", &"[REDACTED]")
            .finish()
    }
}
