//! Normative constants of the on-disk superblock format.
//!
//! Everything here is fixed by the format: changing any of these values
//! produces volumes that existing deployments cannot open.

/// Size of a GUID in bytes.
pub const GUID_LEN: usize = 16;

/// Fixed type GUID identifying a blockseal superblock. The first sixteen
/// bytes of every valid superblock location must equal this constant.
pub const TYPE_GUID: [u8; GUID_LEN] = [
    0x3b, 0x1e, 0x4d, 0x62, 0xf0, 0x5a, 0x11, 0xe8, 0x9d, 0x1c, 0x00, 0x1b, 0x21, 0x7e, 0xc5, 0x9a,
];

/// Maximum number of key slots. If a device's block size cannot hold
/// `NUM_SLOTS` slots for a given version, `create` and `open` fail with
/// `NotSupported`.
pub const NUM_SLOTS: u64 = 16;

/// Number of superblock copies at each end of the device. `RESERVED_PAIRS`
/// blocks are reserved at the start and the same number again at the end.
pub const RESERVED_PAIRS: u64 = 2;

/// Superblock header length: type GUID, instance GUID, 32-bit version.
pub const HEADER_LEN: usize = GUID_LEN + GUID_LEN + 4;

/// Upper bound on HKDF label length, including the decimal slot number.
pub const MAX_LABEL_LEN: usize = 16;

/// HKDF label prefix for per-slot wrap keys; the decimal slot number is
/// appended, with no trailing NUL.
pub const WRAP_KEY_LABEL: &str = "wrap key ";

/// HKDF label prefix for per-slot wrap IVs.
pub const WRAP_IV_LABEL: &str = "wrap iv ";

/// Header blocks are aligned to this size. Devices with smaller blocks are
/// aggregated; devices with larger blocks must be a multiple of it.
pub const PAGE_SIZE: u64 = 4096;
