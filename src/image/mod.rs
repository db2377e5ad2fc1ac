// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Signed firmware images.
//!
//! A signed image is a flash range containing firmware plus an embedded
//! *image descriptor*. The descriptor can live anywhere in the range, at an
//! aligned offset, and is found by scanning for its magic value.
//!
//! # Wire Format
//!
//! On the wire (and in flash) the descriptor has the following layout,
//! expressed as a pseudo-Rust struct. Integers are encoded in little-endian
//! order, except for RSA values, which are big-endian. `_` indicates
//! reserved fields that should be set to 0.
//! ```ignore
//! struct ImageDescriptor {
//!     magic: u64, // "_IMGDSC_"
//!     descriptor_major: u8,
//!     descriptor_minor: u8,
//!     _: u16,
//!     descriptor_offset: u32, // Relative to the start of the image.
//!     descriptor_area_size: u32,
//!
//!     image_name: [u8; 32],
//!     image_family: u32, // Zero matches any family.
//!     image_major: u32,
//!     image_minor: u32,
//!     image_point: u32,
//!     image_subpoint: u32,
//!     build_timestamp: u64,
//!
//!     image_type: u8, // See `ImageType`.
//!     denylist_size: u8,
//!     hash_type: u8, // See `HashType`.
//!     signature_scheme: u8, // See `sig::Scheme`.
//!     region_count: u8,
//!     _: u8,
//!     _: u16,
//!     image_size: u32,
//!     blob_size: u32,
//!
//!     regions: [ImageRegion; self.region_count],
//!
//!     hash: struct {
//!         magic: u32, // "HASH"
//!         _: [u8; 4],
//!         digest: [u8; self.hash_type.len()],
//!     },
//!     denylist: struct { // Present iff `denylist_size > 0`.
//!         magic: u32, // "BLCK"
//!         _: [u8; 4],
//!         versions: [[u32; 4]; self.denylist_size],
//!     },
//!     blob: struct { // Present iff `blob_size > 0`.
//!         magic: u32, // "BLOB"
//!         _: [u8; 4],
//!         records: [u8; self.blob_size - 8],
//!     },
//!
//!     signature: struct {
//!         magic: u32, // "SIGN"
//!         modulus: [u8; N],
//!         exponent: u32,
//!         signature: [u8; N],
//!     },
//! }
//! ```
//!
//! Everything up to, but not including, the signature block is signed. The
//! region table partitions the image; the `hash` digest covers every region
//! marked [`RegionAttribute::Static`], except for the descriptor's own bytes.
//!
//! The blob is a list of typed records, each four-byte aligned; the only one
//! `cr51sign` understands is the anti-rollback record described in [`mauv`].

use crate::crypto::hash;

pub mod descriptor;
pub mod failure;
pub mod mauv;
#[cfg(feature = "std")]
pub mod owned;
pub mod policy;
pub mod region;
pub mod scan;
pub mod signature;
pub mod validate;

#[cfg(test)]
pub(crate) mod testing;

pub use descriptor::ImageDescriptor;
pub use failure::FailureReason;
pub use failure::Tier;
pub use mauv::ImageMauv;
pub use mauv::MauvOutcome;
pub use region::ImageRegion;
pub use region::RegionAttribute;
pub use region::ValidatedRegions;
pub use validate::ValidationContext;
pub use validate::ValidationState;

/// The magic value at the start of every image descriptor, "_IMGDSC_".
pub const DESCRIPTOR_MAGIC: u64 = 0x5f43_5344_474d_495f;

/// The magic value at the start of the hash struct, "HASH".
pub const HASH_MAGIC: u32 = 0x4853_4148;

/// The magic value at the start of the denylist, "BLCK".
pub const DENYLIST_MAGIC: u32 = 0x4b43_4c42;

/// The magic value at the start of the blob, "BLOB".
pub const BLOB_MAGIC: u32 = 0x424f_4c42;

/// The magic value at the start of the signature block, "SIGN".
pub const SIGNATURE_MAGIC: u32 = 0x4e47_4953;

/// The largest descriptor major version this crate understands.
pub const MAX_DESCRIPTOR_MAJOR: u8 = 1;

/// The granularity of regions, in bytes.
pub const SECTOR_SIZE: u32 = 4096;

/// The maximum number of regions a descriptor may declare.
pub const MAX_REGIONS: usize = 16;

/// The alignment at which descriptors are searched for, unless configured
/// otherwise.
pub const DEFAULT_DESCRIPTOR_ALIGNMENT: u32 = 64;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

wire_enum! {
    /// The kind of build an image is.
    #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
    pub enum ImageType: u8 {
        /// A development image.
        Dev = 0,
        /// A production image.
        Prod = 1,
        /// A breakout image.
        Breakout = 2,
        /// A test image, only accepted while a test image is running.
        Test = 3,
        /// An image protected only by its digest; never accepted by signature
        /// validation.
        UnsignedIntegrity = 4,
    }
}

wire_enum! {
    /// The digest algorithm used for the region hash.
    #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
    pub enum HashType: u8 {
        /// No hash.
        None = 0,
        /// SHA-224.
        Sha224 = 1,
        /// SHA-256.
        Sha256 = 2,
        /// SHA-384.
        Sha384 = 3,
        /// SHA-512.
        Sha512 = 4,
    }
}

impl HashType {
    /// Returns the hash algorithm for this type, if it is one images may use.
    pub fn algo(self) -> Option<hash::Algo> {
        match self {
            Self::Sha256 => Some(hash::Algo::Sha256),
            Self::Sha512 => Some(hash::Algo::Sha512),
            _ => None,
        }
    }
}

/// A four-part image version.
#[derive(Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Version {
    /// The major version.
    pub major: u32,
    /// The minor version.
    pub minor: u32,
    /// The point version.
    pub point: u32,
    /// The subpoint version.
    pub subpoint: u32,
}
