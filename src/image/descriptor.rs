// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Image descriptor parsing.
//!
//! See the [module documentation](super) for the wire format.

use core::ops::Range;

use arrayvec::ArrayVec;

use crate::crypto::hash;
use crate::crypto::sig;
use crate::hardware::flash::Flash;
use crate::hardware::flash::Region;
use crate::hardware::Platform;
use crate::image::region::REGION_LEN;
use crate::image::FailureReason;
use crate::image::HashType;
use crate::image::ImageRegion;
use crate::image::ImageType;
use crate::image::Version;
use crate::image::BLOB_MAGIC;
use crate::image::DENYLIST_MAGIC;
use crate::image::DESCRIPTOR_MAGIC;
use crate::image::MAX_DESCRIPTOR_MAJOR;
use crate::image::MAX_REGIONS;
use crate::io;
use crate::io::wire::WireEnum;
use crate::io::Write;

/// The length of the fixed descriptor header.
pub const HEADER_LEN: u32 = 96;

/// The length of the header of the hash struct, denylist, and blob.
pub const SECTION_HEADER_LEN: u32 = 8;

/// The length of a single legacy denylist record.
pub const DENYLIST_RECORD_LEN: u32 = 16;

/// Returns the length of a signature block for `scheme`.
pub fn signature_block_len(scheme: sig::Scheme) -> u32 {
    (4 + 4 + 2 * scheme.sig_len()) as u32
}

/// The absolute locations of the variable-length parts of a descriptor.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct Layout {
    /// The hash struct, including its header.
    pub hash: Region,
    /// The legacy denylist, including its header, if present.
    pub denylist: Option<Region>,
    /// The blob, including its header, if present.
    pub blob: Option<Region>,
    /// The signature block.
    pub signature: Region,
    /// Everything covered by the signature: the header up to, but not
    /// including, the signature block.
    pub signed: Region,
}

impl Layout {
    /// Computes the layout of a descriptor at absolute offset `base`.
    ///
    /// Returns `None` if any offset overflows.
    pub fn new(
        base: u32,
        region_count: u8,
        hash_algo: hash::Algo,
        denylist_size: u8,
        blob_size: u32,
        scheme: sig::Scheme,
    ) -> Option<Self> {
        let regions_len = REGION_LEN.checked_mul(region_count as u32)?;
        let hash_at = base.checked_add(HEADER_LEN)?.checked_add(regions_len)?;
        let hash = Region::new(
            hash_at,
            SECTION_HEADER_LEN + hash_algo.bytes() as u32,
        );
        let mut cursor = hash.end()?;

        let mut denylist = None;
        if denylist_size > 0 {
            let len = SECTION_HEADER_LEN
                + DENYLIST_RECORD_LEN * denylist_size as u32;
            denylist = Some(Region::new(cursor, len));
            cursor = cursor.checked_add(len)?;
        }

        let mut blob = None;
        if blob_size > 0 {
            blob = Some(Region::new(cursor, blob_size));
            cursor = cursor.checked_add(blob_size)?;
        }

        let signature = Region::new(cursor, signature_block_len(scheme));
        signature.end()?;
        Some(Self {
            hash,
            denylist,
            blob,
            signature,
            signed: Region::new(base, cursor - base),
        })
    }

    /// Returns the total length of the descriptor, through the end of the
    /// signature block.
    pub fn total_len(&self) -> u32 {
        self.signed.len + self.signature.len
    }
}

/// A parsed image descriptor.
///
/// An `ImageDescriptor` that was returned by [`ImageDescriptor::parse()`] is
/// structurally sound, but its signature and region digest have not yet
/// been checked.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ImageDescriptor {
    /// The absolute offset this descriptor was found at.
    pub offset: u32,
    /// The descriptor format major version.
    pub descriptor_major: u8,
    /// The descriptor format minor version.
    pub descriptor_minor: u8,
    /// The descriptor's own offset, relative to the start of the image.
    pub descriptor_offset: u32,
    /// The size of the descriptor, through the end of the signature block
    /// and any padding after it.
    pub descriptor_area_size: u32,
    /// The image name, NUL-padded.
    pub image_name: [u8; 32],
    /// The image family; zero matches any family.
    pub image_family: u32,
    /// The image version.
    pub version: Version,
    /// The build timestamp.
    pub build_timestamp: u64,
    /// The kind of build this is.
    pub image_type: ImageType,
    /// The number of legacy denylist records.
    pub denylist_size: u8,
    /// The digest algorithm for the region hash.
    pub hash_type: HashType,
    /// The signature scheme.
    pub signature_scheme: sig::Scheme,
    /// The total size of the image, which the regions partition.
    pub image_size: u32,
    /// The size of the blob, including its header; zero if absent.
    pub blob_size: u32,
    /// The region table.
    pub regions: ArrayVec<ImageRegion, MAX_REGIONS>,
    /// Where the variable-length parts of the descriptor are.
    pub layout: Layout,
}

/// Header fields, as they appear on the wire.
struct RawHeader {
    magic: u64,
    descriptor_major: u8,
    descriptor_minor: u8,
    descriptor_offset: u32,
    descriptor_area_size: u32,
    image_name: [u8; 32],
    image_family: u32,
    version: Version,
    build_timestamp: u64,
    image_type: u8,
    denylist_size: u8,
    hash_type: u8,
    signature_scheme: u8,
    region_count: u8,
    image_size: u32,
    blob_size: u32,
}

impl RawHeader {
    fn parse(mut r: impl io::Read) -> Result<Self, io::Error> {
        let magic = r.read_le()?;
        let descriptor_major = r.read_le()?;
        let descriptor_minor = r.read_le()?;
        r.skip(2)?;
        let descriptor_offset = r.read_le()?;
        let descriptor_area_size = r.read_le()?;
        let mut image_name = [0; 32];
        r.read_bytes(&mut image_name)?;
        let image_family = r.read_le()?;
        let version = Version {
            major: r.read_le()?,
            minor: r.read_le()?,
            point: r.read_le()?,
            subpoint: r.read_le()?,
        };
        let build_timestamp = r.read_le()?;
        let image_type = r.read_le()?;
        let denylist_size = r.read_le()?;
        let hash_type = r.read_le()?;
        let signature_scheme = r.read_le()?;
        let region_count = r.read_le()?;
        r.skip(3)?;
        let image_size = r.read_le()?;
        let blob_size = r.read_le()?;

        Ok(Self {
            magic,
            descriptor_major,
            descriptor_minor,
            descriptor_offset,
            descriptor_area_size,
            image_name,
            image_family,
            version,
            build_timestamp,
            image_type,
            denylist_size,
            hash_type,
            signature_scheme,
            region_count,
            image_size,
            blob_size,
        })
    }
}

fn read_magic<F: Flash + ?Sized>(
    flash: &F,
    offset: u32,
) -> Result<u32, FailureReason> {
    let mut word = [0; 4];
    flash.read(offset, &mut word)?;
    Ok(u32::from_le_bytes(word))
}

impl ImageDescriptor {
    /// Parses and structurally validates the descriptor at absolute offset
    /// `at`, for an image occupying `bounds`.
    ///
    /// This checks everything that can be checked without doing any
    /// cryptography: format version, self-offset, sizes, enumerations, and
    /// the magic values of the optional sections.
    pub fn parse<F: Flash + ?Sized>(
        flash: &F,
        at: u32,
        bounds: Range<u32>,
        platform: &dyn Platform,
    ) -> Result<Self, FailureReason> {
        let header_end = at.checked_add(HEADER_LEN);
        check!(
            matches!(header_end, Some(end) if end <= bounds.end),
            FailureReason::InvalidDescriptor
        );

        let mut buf = [0; HEADER_LEN as usize];
        flash.read(at, &mut buf)?;
        let raw = RawHeader::parse(&buf[..])?;

        check!(raw.magic == DESCRIPTOR_MAGIC, FailureReason::InvalidDescriptor);
        check!(
            raw.descriptor_major <= MAX_DESCRIPTOR_MAJOR,
            FailureReason::UnsupportedDescriptor
        );
        check!(
            bounds.start.checked_add(raw.descriptor_offset) == Some(at),
            FailureReason::InvalidDescriptor
        );
        check!(raw.region_count > 0, FailureReason::InvalidDescriptor);
        check!(
            raw.region_count as usize <= MAX_REGIONS,
            FailureReason::UnsupportedDescriptor
        );
        check!(
            matches!(
                at.checked_add(raw.descriptor_area_size),
                Some(end) if end <= bounds.end
            ),
            FailureReason::InvalidDescriptor
        );

        let size_ok = match platform.image_size_valid(raw.image_size) {
            Some(ok) => ok,
            None => {
                bounds.end.checked_sub(bounds.start) == Some(raw.image_size)
            }
        };
        check!(size_ok, FailureReason::InvalidDescriptor);

        let image_type = ImageType::from_wire_value(raw.image_type)
            .ok_or_else(|| fail!(FailureReason::InvalidDescriptor))?;
        let signature_scheme = sig::Scheme::from_wire_value(
            raw.signature_scheme,
        )
        .ok_or_else(|| fail!(FailureReason::InvalidSigScheme))?;
        let hash_type = HashType::from_wire_value(raw.hash_type)
            .ok_or_else(|| fail!(FailureReason::InvalidHashType))?;
        let hash_algo = hash_type
            .algo()
            .ok_or_else(|| fail!(FailureReason::InvalidHashType))?;

        let layout = Layout::new(
            at,
            raw.region_count,
            hash_algo,
            raw.denylist_size,
            raw.blob_size,
            signature_scheme,
        )
        .ok_or_else(|| fail!(FailureReason::InvalidDescriptor))?;
        check!(
            layout.total_len() <= raw.descriptor_area_size,
            FailureReason::InvalidDescriptor
        );

        if let Some(denylist) = layout.denylist {
            check!(
                read_magic(flash, denylist.offset)? == DENYLIST_MAGIC,
                FailureReason::InvalidDescriptor
            );
        }
        if let Some(blob) = layout.blob {
            check!(
                blob.len >= SECTION_HEADER_LEN,
                FailureReason::InvalidDescriptor
            );
            check!(
                read_magic(flash, blob.offset)? == BLOB_MAGIC,
                FailureReason::InvalidDescriptor
            );
        }

        let mut regions = ArrayVec::new();
        let mut entry = [0; REGION_LEN as usize];
        for i in 0..raw.region_count as u32 {
            flash.read(at + HEADER_LEN + i * REGION_LEN, &mut entry)?;
            let region = ImageRegion::parse(&entry[..])?;
            regions.push(region);
        }

        info!(
            "descriptor at {:#x}: type {}, scheme {}, {} regions",
            at,
            image_type,
            signature_scheme,
            regions.len()
        );
        Ok(Self {
            offset: at,
            descriptor_major: raw.descriptor_major,
            descriptor_minor: raw.descriptor_minor,
            descriptor_offset: raw.descriptor_offset,
            descriptor_area_size: raw.descriptor_area_size,
            image_name: raw.image_name,
            image_family: raw.image_family,
            version: raw.version,
            build_timestamp: raw.build_timestamp,
            image_type,
            denylist_size: raw.denylist_size,
            hash_type,
            signature_scheme,
            image_size: raw.image_size,
            blob_size: raw.blob_size,
            regions,
            layout,
        })
    }

    /// Writes the fixed header and the region table.
    pub fn write_header<W: Write>(&self, mut w: W) -> Result<(), io::Error> {
        w.write_le(DESCRIPTOR_MAGIC)?;
        w.write_le(self.descriptor_major)?;
        w.write_le(self.descriptor_minor)?;
        w.write_zeros(2)?;
        w.write_le(self.descriptor_offset)?;
        w.write_le(self.descriptor_area_size)?;
        w.write_bytes(&self.image_name)?;
        w.write_le(self.image_family)?;
        w.write_le(self.version.major)?;
        w.write_le(self.version.minor)?;
        w.write_le(self.version.point)?;
        w.write_le(self.version.subpoint)?;
        w.write_le(self.build_timestamp)?;
        w.write_le(self.image_type.to_wire_value())?;
        w.write_le(self.denylist_size)?;
        w.write_le(self.hash_type.to_wire_value())?;
        w.write_le(self.signature_scheme.to_wire_value())?;
        w.write_le(self.regions.len() as u8)?;
        w.write_zeros(3)?;
        w.write_le(self.image_size)?;
        w.write_le(self.blob_size)?;
        for region in &self.regions {
            region.write_to(&mut w)?;
        }
        Ok(())
    }

    /// Returns the image name, if it is valid UTF-8.
    pub fn name(&self) -> Option<&str> {
        let len = self
            .image_name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(self.image_name.len());
        core::str::from_utf8(&self.image_name[..len]).ok()
    }

    /// Returns the digest algorithm of the region hash.
    pub fn hash_algo(&self) -> hash::Algo {
        // `parse()` rejects every other hash type.
        self.hash_type.algo().unwrap_or(hash::Algo::Sha256)
    }

    /// Returns the absolute byte range owned by the descriptor, which is
    /// excluded from the region hash.
    pub fn area(&self) -> Region {
        Region::new(self.offset, self.descriptor_area_size)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::hardware::fake;
    use crate::hardware::flash::Ram;
    use crate::image::testing;
    use pretty_assertions::assert_eq;

    fn parse(image: &[u8]) -> Result<ImageDescriptor, FailureReason> {
        let at = testing::DESCRIPTOR_OFFSET;
        ImageDescriptor::parse(
            &Ram(image),
            at,
            0..image.len() as u32,
            &fake::Platform::dev(),
        )
    }

    /// Overwrites the header byte at `offset` within the descriptor.
    fn poke(image: &mut [u8], offset: usize, bytes: &[u8]) {
        let at = testing::DESCRIPTOR_OFFSET as usize + offset;
        image[at..at + bytes.len()].copy_from_slice(bytes);
    }

    #[test]
    fn parses_built_image() {
        let layout = testing::layout();
        let image = testing::build(&layout);
        let desc = parse(&image).unwrap();

        assert_eq!(desc.offset, testing::DESCRIPTOR_OFFSET);
        assert_eq!(desc.name(), Some("test-image"));
        assert_eq!(desc.image_type, ImageType::Prod);
        assert_eq!(desc.signature_scheme, sig::Scheme::Rsa2048Pkcs15);
        assert_eq!(desc.regions.len(), layout.regions.len());
        assert_eq!(desc.image_size, image.len() as u32);
        assert_eq!(desc.layout.signed.offset, desc.offset);
        assert!(desc.layout.total_len() <= desc.descriptor_area_size);

        let mut rewritten = Vec::new();
        desc.write_header(&mut rewritten).unwrap();
        let at = desc.offset as usize;
        assert_eq!(&rewritten[..], &image[at..at + rewritten.len()]);
    }

    #[test]
    fn header_must_fit() {
        let image = testing::build(&testing::layout());
        let at = image.len() as u32 - 64;
        assert_eq!(
            ImageDescriptor::parse(
                &Ram(&image[..]),
                at,
                0..image.len() as u32,
                &fake::Platform::dev(),
            ),
            Err(FailureReason::InvalidDescriptor)
        );
    }

    #[test]
    fn bad_magic() {
        let mut image = testing::build(&testing::layout());
        poke(&mut image, 0, b"_IMGDSX");
        assert_eq!(parse(&image), Err(FailureReason::InvalidDescriptor));
    }

    #[test]
    fn unsupported_major() {
        let mut image = testing::build(&testing::layout());
        poke(&mut image, 8, &[2]);
        assert_eq!(parse(&image), Err(FailureReason::UnsupportedDescriptor));
    }

    #[test]
    fn relocated_descriptor() {
        let mut image = testing::build(&testing::layout());
        let at = testing::DESCRIPTOR_OFFSET as usize;
        let len = 4096;
        let desc = image[at..at + len].to_vec();
        image[at + 4096..at + 4096 + len].copy_from_slice(&desc);

        assert_eq!(
            ImageDescriptor::parse(
                &Ram(&image[..]),
                testing::DESCRIPTOR_OFFSET + 4096,
                0..image.len() as u32,
                &fake::Platform::dev(),
            ),
            Err(FailureReason::InvalidDescriptor)
        );
    }

    #[test]
    fn region_counts() {
        let mut image = testing::build(&testing::layout());
        poke(&mut image, 84, &[0]);
        assert_eq!(parse(&image), Err(FailureReason::InvalidDescriptor));
        poke(&mut image, 84, &[17]);
        assert_eq!(parse(&image), Err(FailureReason::UnsupportedDescriptor));
    }

    #[test]
    fn area_size() {
        let mut image = testing::build(&testing::layout());
        poke(&mut image, 16, &u32::MAX.to_le_bytes());
        assert_eq!(parse(&image), Err(FailureReason::InvalidDescriptor));

        // Too small to contain the signature block.
        poke(&mut image, 16, &(HEADER_LEN + 64).to_le_bytes());
        assert_eq!(parse(&image), Err(FailureReason::InvalidDescriptor));
    }

    #[test]
    fn image_size() {
        let mut image = testing::build(&testing::layout());
        let actual = image.len() as u32;
        poke(&mut image, 88, &(actual - 4096).to_le_bytes());
        assert_eq!(parse(&image), Err(FailureReason::InvalidDescriptor));

        let lenient = fake::Platform {
            size_valid: Some(true),
            ..fake::Platform::dev()
        };
        assert!(ImageDescriptor::parse(
            &Ram(&image[..]),
            testing::DESCRIPTOR_OFFSET,
            0..actual,
            &lenient,
        )
        .is_ok());

        let strict = fake::Platform {
            size_valid: Some(false),
            ..fake::Platform::dev()
        };
        poke(&mut image, 88, &actual.to_le_bytes());
        assert_eq!(
            ImageDescriptor::parse(
                &Ram(&image[..]),
                testing::DESCRIPTOR_OFFSET,
                0..actual,
                &strict,
            ),
            Err(FailureReason::InvalidDescriptor)
        );
    }

    #[test]
    fn enumerations() {
        let image = testing::build(&testing::layout());

        let mut bad = image.clone();
        poke(&mut bad, 80, &[9]);
        assert_eq!(parse(&bad), Err(FailureReason::InvalidDescriptor));

        let mut bad = image.clone();
        poke(&mut bad, 83, &[5]);
        assert_eq!(parse(&bad), Err(FailureReason::InvalidSigScheme));

        let mut bad = image.clone();
        poke(&mut bad, 82, &[HashType::Sha384.to_wire_value()]);
        assert_eq!(parse(&bad), Err(FailureReason::InvalidHashType));

        let mut bad = image;
        poke(&mut bad, 82, &[0x77]);
        assert_eq!(parse(&bad), Err(FailureReason::InvalidHashType));
    }

    #[test]
    fn section_magics() {
        let mut layout = testing::layout();
        layout.denylist.push(Version::default());
        layout.mauv = Some(testing::mauv(5, 1, 0));
        let image = testing::build(&layout);
        let desc = parse(&image).unwrap();

        let denylist = desc.layout.denylist.unwrap().offset as usize;
        let mut bad = image.clone();
        bad[denylist] ^= 1;
        assert_eq!(parse(&bad), Err(FailureReason::InvalidDescriptor));

        let blob = desc.layout.blob.unwrap().offset as usize;
        let mut bad = image;
        bad[blob] ^= 1;
        assert_eq!(parse(&bad), Err(FailureReason::InvalidDescriptor));
    }

    #[test]
    fn layout_overflow() {
        assert_eq!(
            Layout::new(
                u32::MAX - 100,
                1,
                hash::Algo::Sha256,
                0,
                0,
                sig::Scheme::Rsa2048Pkcs15,
            ),
            None
        );
        let layout = Layout::new(
            0,
            2,
            hash::Algo::Sha512,
            1,
            16,
            sig::Scheme::Rsa3072Pkcs15,
        )
        .unwrap();
        assert_eq!(layout.hash, Region::new(96 + 88, 72));
        assert_eq!(layout.denylist, Some(Region::new(256, 24)));
        assert_eq!(layout.blob, Some(Region::new(280, 16)));
        assert_eq!(layout.signature, Region::new(296, 776));
        assert_eq!(layout.total_len(), 296 + 776);
    }
}
