//! End-to-end scenarios for superblock lifecycle management.
//!
//! Each test drives the public API against an in-memory or file-backed
//! device and inspects the raw device bytes where the format demands it.

use blockseal::{
    BlockDevice, FileDevice, MemDevice, Superblock, SuperblockError, NUM_SLOTS, TYPE_GUID,
};

const BLOCK_SIZE: u32 = 4096;
const BLOCK_COUNT: u64 = 64;
const ROOT_KEY: [u8; 32] = [0x01; 32];

/// Offsets of the four superblock copies on the standard raw test device.
fn replica_offsets() -> [u64; 4] {
    let bs = u64::from(BLOCK_SIZE);
    [0, bs, (BLOCK_COUNT - 2) * bs, (BLOCK_COUNT - 1) * bs]
}

fn raw_device() -> MemDevice {
    MemDevice::raw(BLOCK_SIZE, BLOCK_COUNT)
}

fn read_block(dev: &MemDevice, offset: u64) -> Vec<u8> {
    let mut dev = dev.clone();
    let mut buf = vec![0u8; BLOCK_SIZE as usize];
    dev.read_at(offset, &mut buf).unwrap();
    buf
}

fn write_block(dev: &MemDevice, offset: u64, buf: &[u8]) {
    let mut dev = dev.clone();
    dev.write_at(offset, buf).unwrap();
}

#[test]
fn s1_create_and_open() {
    let dev = raw_device();
    Superblock::create(Box::new(dev.clone()), &ROOT_KEY).unwrap();

    // All four replicas are byte-identical and carry the type GUID.
    let first = read_block(&dev, 0);
    assert_eq!(&first[..16], &TYPE_GUID);
    for offset in replica_offsets() {
        assert_eq!(read_block(&dev, offset), first);
    }

    let sb = Superblock::open(Box::new(dev), &ROOT_KEY, 0).unwrap();
    assert_eq!(sb.data_key_len(), 32);
    assert_eq!(sb.data_iv_len(), 16);
}

#[test]
fn s1_distinct_volumes_share_only_the_type_guid() {
    let dev_a = raw_device();
    let dev_b = raw_device();
    Superblock::create(Box::new(dev_a.clone()), &ROOT_KEY).unwrap();
    Superblock::create(Box::new(dev_b.clone()), &ROOT_KEY).unwrap();

    let a = read_block(&dev_a, 0);
    let b = read_block(&dev_b, 0);
    assert_eq!(&a[..16], &b[..16]);
    // Fresh instance GUID, keys, and backdrop every time.
    assert_ne!(a[16..], b[16..]);
}

#[test]
fn s2_wrong_slot_is_denied() {
    let dev = raw_device();
    Superblock::create(Box::new(dev.clone()), &ROOT_KEY).unwrap();
    let result = Superblock::open(Box::new(dev), &ROOT_KEY, 1);
    assert!(matches!(result, Err(SuperblockError::AccessDenied)));
}

#[test]
fn s3_enroll_then_revoke() {
    let dev = raw_device();
    let second_key = [0x22u8; 32];
    Superblock::create(Box::new(dev.clone()), &ROOT_KEY).unwrap();

    let mut sb = Superblock::open(Box::new(dev.clone()), &ROOT_KEY, 0).unwrap();
    sb.enroll(&second_key, 5).unwrap();
    drop(sb);

    Superblock::open(Box::new(dev.clone()), &second_key, 5).unwrap();

    let mut sb = Superblock::open(Box::new(dev.clone()), &ROOT_KEY, 0).unwrap();
    sb.revoke(5).unwrap();
    drop(sb);

    let result = Superblock::open(Box::new(dev.clone()), &second_key, 5);
    assert!(matches!(result, Err(SuperblockError::AccessDenied)));

    // Slot 0 is unaffected.
    Superblock::open(Box::new(dev), &ROOT_KEY, 0).unwrap();
}

#[test]
fn s4_self_heal_after_replica_loss() {
    let dev = raw_device();
    Superblock::create(Box::new(dev.clone()), &ROOT_KEY).unwrap();

    // Clobber the first replica.
    write_block(&dev, 0, &[0xFFu8; BLOCK_SIZE as usize]);

    Superblock::open(Box::new(dev.clone()), &ROOT_KEY, 0).unwrap();

    // The surviving replicas served the open and healed the first one.
    let healed = read_block(&dev, 0);
    for offset in replica_offsets() {
        assert_eq!(read_block(&dev, offset), healed);
    }
    assert_eq!(&healed[..16], &TYPE_GUID);
}

#[test]
fn s5_shred_destroys_every_slot() {
    let dev = raw_device();
    Superblock::create(Box::new(dev.clone()), &ROOT_KEY).unwrap();

    let mut sb = Superblock::open(Box::new(dev.clone()), &ROOT_KEY, 0).unwrap();
    sb.shred().unwrap();
    drop(sb);

    for slot in 0..NUM_SLOTS {
        let result = Superblock::open(Box::new(dev.clone()), &ROOT_KEY, slot);
        assert!(matches!(result, Err(SuperblockError::AccessDenied)));
    }
    for offset in replica_offsets() {
        let block = read_block(&dev, offset);
        assert_ne!(&block[..16], &TYPE_GUID);
    }
}

#[test]
fn s6_foreign_device_is_denied() {
    // A device that was never formatted holds no type GUID anywhere.
    let dev = raw_device();
    let result = Superblock::open(Box::new(dev), &ROOT_KEY, 0);
    assert!(matches!(result, Err(SuperblockError::AccessDenied)));
}

#[test]
fn every_slot_can_be_enrolled_and_opened() {
    let dev = raw_device();
    Superblock::create(Box::new(dev.clone()), &ROOT_KEY).unwrap();

    let mut sb = Superblock::open(Box::new(dev.clone()), &ROOT_KEY, 0).unwrap();
    for slot in 0..NUM_SLOTS {
        let mut key = [0u8; 32];
        key[0] = slot as u8;
        key[31] = 0xA0 | slot as u8;
        sb.enroll(&key, slot).unwrap();
    }
    drop(sb);

    for slot in 0..NUM_SLOTS {
        let mut key = [0u8; 32];
        key[0] = slot as u8;
        key[31] = 0xA0 | slot as u8;
        Superblock::open(Box::new(dev.clone()), &key, slot).unwrap();
    }
}

#[test]
fn consistent_replicas_are_not_rewritten() {
    let dev = raw_device();
    Superblock::create(Box::new(dev.clone()), &ROOT_KEY).unwrap();
    let after_create = dev.write_count();

    // Opening a healthy volume commits, but every replica already
    // matches, so no write is issued.
    Superblock::open(Box::new(dev.clone()), &ROOT_KEY, 0).unwrap();
    assert_eq!(dev.write_count(), after_create);
}

#[test]
fn healing_rewrites_only_the_damaged_replica() {
    let dev = raw_device();
    Superblock::create(Box::new(dev.clone()), &ROOT_KEY).unwrap();
    write_block(&dev, 4096, &[0u8; BLOCK_SIZE as usize]);
    let before = dev.write_count();

    Superblock::open(Box::new(dev.clone()), &ROOT_KEY, 0).unwrap();
    assert_eq!(dev.write_count(), before + 1);
}

#[test]
fn tampered_replica_is_skipped_and_healed() {
    let dev = raw_device();
    Superblock::create(Box::new(dev.clone()), &ROOT_KEY).unwrap();

    // Flip one bit inside the first replica's instance GUID.
    let mut block = read_block(&dev, 0);
    block[16] ^= 0x01;
    write_block(&dev, 0, &block);

    Superblock::open(Box::new(dev.clone()), &ROOT_KEY, 0).unwrap();

    let healed = read_block(&dev, 0);
    assert_eq!(healed, read_block(&dev, 4096));
}

#[test]
fn tampered_version_everywhere_is_denied() {
    let dev = raw_device();
    Superblock::create(Box::new(dev.clone()), &ROOT_KEY).unwrap();

    for offset in replica_offsets() {
        let mut block = read_block(&dev, offset);
        block[35] ^= 0x01;
        write_block(&dev, offset, &block);
    }

    let result = Superblock::open(Box::new(dev), &ROOT_KEY, 0);
    assert!(matches!(result, Err(SuperblockError::AccessDenied)));
}

#[test]
fn instance_guid_has_rfc4122_v4_bits() {
    let dev = raw_device();
    Superblock::create(Box::new(dev.clone()), &ROOT_KEY).unwrap();
    let sb = Superblock::open(Box::new(dev.clone()), &ROOT_KEY, 0).unwrap();

    let guid = sb.guid();
    assert_eq!(guid[6] >> 4, 0x4);
    assert_eq!(guid[8] >> 6, 0b10);

    // The on-disk copy carries the same bytes.
    let block = read_block(&dev, 0);
    assert_eq!(&block[16..32], guid);
}

#[test]
fn sliced_device_full_lifecycle() {
    let dev = MemDevice::sliced(BLOCK_SIZE, 2 * u64::from(BLOCK_SIZE), 16);
    Superblock::create(Box::new(dev.clone()), &ROOT_KEY).unwrap();

    let mut sb = Superblock::open(Box::new(dev.clone()), &ROOT_KEY, 0).unwrap();
    let (_, fvm, has_fvm) = sb.info().unwrap();
    assert!(has_fvm);
    assert_eq!(fvm.vslice_count, 14);

    let second_key = [0x33u8; 32];
    sb.enroll(&second_key, 3).unwrap();
    drop(sb);
    Superblock::open(Box::new(dev.clone()), &second_key, 3).unwrap();

    // Replicas live in the first and last reserved slices.
    let last_start = 15 * 2 * u64::from(BLOCK_SIZE);
    assert_eq!(read_block(&dev, 0), read_block(&dev, last_start));
}

#[test]
fn file_backed_device_roundtrip() {
    let file = tempfile::NamedTempFile::new().unwrap();
    file.as_file()
        .set_len(u64::from(BLOCK_SIZE) * BLOCK_COUNT)
        .unwrap();

    let dev = FileDevice::new(file.reopen().unwrap(), BLOCK_SIZE).unwrap();
    Superblock::create(Box::new(dev), &ROOT_KEY).unwrap();

    let dev = FileDevice::new(file.reopen().unwrap(), BLOCK_SIZE).unwrap();
    let mut sb = Superblock::open(Box::new(dev), &ROOT_KEY, 0).unwrap();
    let second_key = [0x44u8; 32];
    sb.enroll(&second_key, 7).unwrap();
    drop(sb);

    let dev = FileDevice::new(file.reopen().unwrap(), BLOCK_SIZE).unwrap();
    Superblock::open(Box::new(dev), &second_key, 7).unwrap();
}

#[test]
fn data_key_is_stable_across_reopen() {
    let dev = raw_device();
    Superblock::create(Box::new(dev.clone()), &ROOT_KEY).unwrap();

    let mut sb = Superblock::open(Box::new(dev.clone()), &ROOT_KEY, 0).unwrap();
    let second_key = [0x55u8; 32];
    sb.enroll(&second_key, 9).unwrap();
    drop(sb);

    // Bind ciphers from two independent driver-mode opens through
    // different slots; a sector sealed by one must open under the other.
    let first = Superblock::open_driver(Box::new(dev.clone()), &ROOT_KEY, 0).unwrap();
    let (enc, _) = first.bind_ciphers().unwrap();
    let plaintext = vec![0x5Au8; 4096];
    let mut sector = plaintext.clone();
    enc.encrypt_sector(11, &mut sector).unwrap();

    let second = Superblock::open_driver(Box::new(dev), &second_key, 9).unwrap();
    let (_, dec) = second.bind_ciphers().unwrap();
    dec.decrypt_sector(11, &mut sector).unwrap();
    assert_eq!(sector, plaintext);
}
