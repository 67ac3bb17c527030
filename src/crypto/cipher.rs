//! Data-path sector cipher contexts handed out by `bind_ciphers`.
//!
//! The superblock stores a 32-byte data key and a 16-byte data IV. XTS
//! needs a 64-byte key pair, so the stored key is expanded with HKDF
//! (salted by the data IV) before the two AES-256 schedules are built.
//! Each sector is tweaked by its index offset from a base taken from the
//! data IV, bounded by the tweak count the volume was bound with.

use aes::cipher::{generic_array::GenericArray, KeyInit};
use aes::Aes256;
use xts_mode::{get_tweak_default, Xts128};

use crate::crypto::{hkdf, CipherAlg, DigestAlg};
use crate::error::{Result, SuperblockError};

const SECTOR_KEY_LABEL: &str = "sector key";
const XTS_KEY_PAIR_LEN: usize = 64;
const AES_BLOCK_LEN: usize = 16;

/// Direction a sector cipher was configured for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Encrypt,
    Decrypt,
}

/// A configured XTS context for one direction of the data path.
pub struct SectorCipher {
    xts: Xts128<Aes256>,
    direction: Direction,
    tweak_base: u64,
    tweak_count: u64,
}

impl SectorCipher {
    /// Builds a sector cipher from the volume's data key and IV.
    ///
    /// `tweak_count` bounds the sector indices this context will accept.
    pub(crate) fn new(
        alg: CipherAlg,
        direction: Direction,
        data_key: &[u8],
        data_iv: &[u8],
        tweak_count: u64,
    ) -> Result<Self> {
        if data_key.len() != alg.key_len() {
            return Err(SuperblockError::InvalidArgs("bad data key length"));
        }
        if data_iv.len() != alg.iv_len() {
            return Err(SuperblockError::InvalidArgs("bad data IV length"));
        }
        if tweak_count == 0 {
            return Err(SuperblockError::InvalidArgs("zero tweak count"));
        }
        match alg {
            CipherAlg::Aes256Xts => {}
        }

        let expanded = hkdf::derive(
            DigestAlg::Sha256,
            data_key,
            data_iv,
            SECTOR_KEY_LABEL,
            XTS_KEY_PAIR_LEN,
        )?;
        let key1 = Aes256::new(GenericArray::from_slice(&expanded[..32]));
        let key2 = Aes256::new(GenericArray::from_slice(&expanded[32..]));

        let mut base = [0u8; 8];
        base.copy_from_slice(&data_iv[..8]);

        Ok(Self {
            xts: Xts128::new(key1, key2),
            direction,
            tweak_base: u64::from_le_bytes(base),
            tweak_count,
        })
    }

    /// Encrypts one sector in place.
    pub fn encrypt_sector(&self, sector: u64, data: &mut [u8]) -> Result<()> {
        if self.direction != Direction::Encrypt {
            return Err(SuperblockError::BadState("cipher bound for decryption"));
        }
        let tweak = self.tweak(sector, data)?;
        self.xts.encrypt_sector(data, tweak);
        Ok(())
    }

    /// Decrypts one sector in place.
    pub fn decrypt_sector(&self, sector: u64, data: &mut [u8]) -> Result<()> {
        if self.direction != Direction::Decrypt {
            return Err(SuperblockError::BadState("cipher bound for encryption"));
        }
        let tweak = self.tweak(sector, data)?;
        self.xts.decrypt_sector(data, tweak);
        Ok(())
    }

    /// Direction this context was bound for.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Number of sector tweaks this context will accept.
    pub fn tweak_count(&self) -> u64 {
        self.tweak_count
    }

    fn tweak(&self, sector: u64, data: &[u8]) -> Result<[u8; 16]> {
        if sector >= self.tweak_count {
            return Err(SuperblockError::InvalidArgs("sector beyond tweak range"));
        }
        if data.is_empty() || data.len() % AES_BLOCK_LEN != 0 {
            return Err(SuperblockError::InvalidArgs("sector length not block aligned"));
        }
        Ok(get_tweak_default(u128::from(
            self.tweak_base.wrapping_add(sector),
        )))
    }
}
