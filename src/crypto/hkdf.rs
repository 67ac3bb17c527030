//! Per-slot wrap key derivation.
//!
//! Wrap keys and IVs are derived from a caller-supplied root key with
//! HKDF, salted by the volume's instance GUID and labelled per slot. The
//! label bytes are part of the on-disk contract: two slots differ only in
//! their labels, and that difference is what isolates them
//! cryptographically.

use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::config::{MAX_LABEL_LEN, WRAP_IV_LABEL, WRAP_KEY_LABEL};
use crate::crypto::DigestAlg;
use crate::error::{Result, SuperblockError};

/// Derives `len` bytes from `ikm` using HKDF with the given digest.
///
/// `salt` is the volume's instance GUID; `label` is the HKDF info input,
/// used verbatim with no terminator.
pub fn derive(
    digest: DigestAlg,
    ikm: &[u8],
    salt: &[u8],
    label: &str,
    len: usize,
) -> Result<Zeroizing<Vec<u8>>> {
    if label.is_empty() || label.len() > MAX_LABEL_LEN {
        return Err(SuperblockError::InvalidArgs("bad HKDF label length"));
    }
    let mut okm = Zeroizing::new(vec![0u8; len]);
    match digest {
        DigestAlg::Sha256 => {
            let hk = Hkdf::<Sha256>::new(Some(salt), ikm);
            hk.expand(label.as_bytes(), &mut okm)
                .map_err(|_| SuperblockError::InvalidArgs("HKDF output too long"))?;
        }
    }
    Ok(okm)
}

/// Formats the wrap-key label for a slot: `"wrap key <slot>"`.
pub fn wrap_key_label(slot: u64) -> String {
    format!("{WRAP_KEY_LABEL}{slot}")
}

/// Formats the wrap-IV label for a slot: `"wrap iv <slot>"`.
pub fn wrap_iv_label(slot: u64) -> String {
    format!("{WRAP_IV_LABEL}{slot}")
}

#[cfg(test)]
mod tests {
    use super::*;

    const IKM: &[u8] = &[0x0b; 32];
    const SALT: &[u8] = &[0x60; 16];

    #[test]
    fn test_label_bytes() {
        // The exact label bytes are normative for on-disk compatibility.
        assert_eq!(wrap_key_label(0).as_bytes(), b"wrap key 0");
        assert_eq!(wrap_iv_label(0).as_bytes(), b"wrap iv 0");
        assert_eq!(wrap_key_label(15).as_bytes(), b"wrap key 15");
        assert_eq!(wrap_iv_label(15).as_bytes(), b"wrap iv 15");
    }

    #[test]
    fn test_derive_deterministic() {
        let a = derive(DigestAlg::Sha256, IKM, SALT, "wrap key 0", 16).unwrap();
        let b = derive(DigestAlg::Sha256, IKM, SALT, "wrap key 0", 16).unwrap();
        assert_eq!(*a, *b);
    }

    #[test]
    fn test_slots_are_isolated() {
        let k0 = derive(DigestAlg::Sha256, IKM, SALT, &wrap_key_label(0), 16).unwrap();
        let k1 = derive(DigestAlg::Sha256, IKM, SALT, &wrap_key_label(1), 16).unwrap();
        assert_ne!(*k0, *k1);
    }

    #[test]
    fn test_key_and_iv_are_independent() {
        let key = derive(DigestAlg::Sha256, IKM, SALT, &wrap_key_label(3), 16).unwrap();
        let iv = derive(DigestAlg::Sha256, IKM, SALT, &wrap_iv_label(3), 16).unwrap();
        assert_ne!(*key, *iv);
    }

    #[test]
    fn test_salt_changes_output() {
        let a = derive(DigestAlg::Sha256, IKM, &[0x60; 16], "wrap key 0", 16).unwrap();
        let b = derive(DigestAlg::Sha256, IKM, &[0x61; 16], "wrap key 0", 16).unwrap();
        assert_ne!(*a, *b);
    }

    #[test]
    fn test_oversized_label_rejected() {
        let label = "wrap key 12345678901234567890";
        assert!(label.len() > MAX_LABEL_LEN);
        assert!(derive(DigestAlg::Sha256, IKM, SALT, label, 16).is_err());
    }

    #[test]
    fn test_empty_label_rejected() {
        assert!(derive(DigestAlg::Sha256, IKM, SALT, "", 16).is_err());
    }
}
