//! Encrypted-volume superblock management.
//!
//! The superblock carries the volume's identity and its sealed key
//! slots, replicated across reserved regions at both ends of the
//! backing device.

pub mod header;
pub mod location;
pub mod superblock;

pub use header::{Header, Version};
pub use location::Locations;
pub use superblock::Superblock;
