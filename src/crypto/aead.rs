//! AEAD seal and open for key-slot material.
//!
//! Slot ciphertexts are produced with a deterministic nonce (the derived
//! wrap IV) over the superblock header prefix as associated data. The
//! nonce never repeats across distinct plaintexts because the wrap key
//! and IV are derived per volume and per slot, and GCM-SIV tolerates the
//! remaining misuse surface.

use aes_gcm_siv::aead::{Aead, KeyInit, Payload};
use aes_gcm_siv::{Aes128GcmSiv, Nonce};
use zeroize::Zeroizing;

use crate::crypto::AeadAlg;
use crate::error::{Result, SuperblockError};

/// Seals `plaintext` under `key`/`nonce`, binding `aad`. Returns
/// ciphertext with the tag appended.
pub fn seal(alg: AeadAlg, key: &[u8], nonce: &[u8], aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
    check_lens(alg, key, nonce)?;
    match alg {
        AeadAlg::Aes128GcmSiv => {
            let cipher = Aes128GcmSiv::new_from_slice(key)
                .map_err(|_| SuperblockError::InvalidArgs("bad wrap key length"))?;
            cipher
                .encrypt(Nonce::from_slice(nonce), Payload { msg: plaintext, aad })
                .map_err(|_| SuperblockError::Internal("AEAD seal failed"))
        }
    }
}

/// Opens a sealed slot. Any failure (wrong key, tampered associated data,
/// corrupt ciphertext) is reported uniformly as `AccessDenied`.
pub fn open(
    alg: AeadAlg,
    key: &[u8],
    nonce: &[u8],
    aad: &[u8],
    ciphertext: &[u8],
) -> Result<Zeroizing<Vec<u8>>> {
    check_lens(alg, key, nonce)?;
    match alg {
        AeadAlg::Aes128GcmSiv => {
            let cipher = Aes128GcmSiv::new_from_slice(key)
                .map_err(|_| SuperblockError::InvalidArgs("bad wrap key length"))?;
            cipher
                .decrypt(Nonce::from_slice(nonce), Payload { msg: ciphertext, aad })
                .map(Zeroizing::new)
                .map_err(|_| SuperblockError::AccessDenied)
        }
    }
}

fn check_lens(alg: AeadAlg, key: &[u8], nonce: &[u8]) -> Result<()> {
    if key.len() != alg.key_len() {
        return Err(SuperblockError::InvalidArgs("bad wrap key length"));
    }
    if nonce.len() != alg.iv_len() {
        return Err(SuperblockError::InvalidArgs("bad wrap IV length"));
    }
    Ok(())
}
