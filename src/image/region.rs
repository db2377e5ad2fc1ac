// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Image regions and region-table validation.
//!
//! The region table partitions an image into sector-aligned, contiguous
//! regions. Regions marked [`RegionAttribute::Static`] are covered by the
//! descriptor's region hash.

use arrayvec::ArrayVec;
use enumflags2::bitflags;
use enumflags2::BitFlags;

use crate::crypto::hash;
use crate::crypto::hash::EngineExt as _;
use crate::hardware::flash::Flash;
use crate::hardware::flash::Region;
use crate::image::FailureReason;
use crate::image::ImageDescriptor;
use crate::image::HASH_MAGIC;
use crate::image::MAX_REGIONS;
use crate::image::SECTOR_SIZE;
use crate::io;
use crate::io::Write;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The length of a region table entry.
pub const REGION_LEN: u32 = 44;

/// An attribute of an [`ImageRegion`].
#[bitflags]
#[repr(u16)]
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum RegionAttribute {
    /// The region's contents are covered by the region hash.
    Static = 1 << 0,
    /// The region is compressed.
    Compressed = 1 << 1,
    /// The region is write-protected.
    WriteProtected = 1 << 2,
    /// The region's contents persist across updates.
    Persistent = 1 << 3,
    /// The region persists, but may move.
    PersistentRelocatable = 1 << 4,
    /// The region persists, but may grow.
    PersistentExpandable = 1 << 5,
    /// The region overrides the one in the running image.
    Override = 1 << 6,
    /// The region overrides the running image's only on a type transition.
    OverrideOnTransition = 1 << 7,
    /// The region is a mailbox.
    Mailbox = 1 << 8,
    /// The region is not checked at boot.
    SkipBootValidation = 1 << 9,
    /// The region is empty.
    Empty = 1 << 10,
}

/// An entry in a descriptor's region table.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct ImageRegion {
    /// The region name, NUL-padded.
    pub name: [u8; 32],
    /// The offset of the region, relative to the start of the image.
    pub offset: u32,
    /// The size of the region.
    pub size: u32,
    /// The region's version.
    pub version: u16,
    /// The attribute bits, exactly as they appear on the wire.
    pub raw_attributes: u16,
}

impl ImageRegion {
    /// Parses a region table entry.
    pub fn parse(mut r: impl io::Read) -> Result<Self, io::Error> {
        let mut name = [0; 32];
        r.read_bytes(&mut name)?;
        Ok(Self {
            name,
            offset: r.read_le()?,
            size: r.read_le()?,
            version: r.read_le()?,
            raw_attributes: r.read_le()?,
        })
    }

    /// Writes this entry in wire format.
    pub fn write_to(&self, mut w: impl Write) -> Result<(), io::Error> {
        w.write_bytes(&self.name)?;
        w.write_le(self.offset)?;
        w.write_le(self.size)?;
        w.write_le(self.version)?;
        w.write_le(self.raw_attributes)?;
        Ok(())
    }

    /// Returns the known attributes of this region; unknown bits are ignored.
    pub fn attributes(&self) -> BitFlags<RegionAttribute> {
        BitFlags::from_bits_truncate(self.raw_attributes)
    }

    /// Returns whether this region is covered by the region hash.
    pub fn is_static(&self) -> bool {
        self.attributes().contains(RegionAttribute::Static)
    }

    /// Returns the region name, if it is valid UTF-8.
    pub fn name(&self) -> Option<&str> {
        let len = self.name.iter().position(|&b| b == 0).unwrap_or(32);
        core::str::from_utf8(&self.name[..len]).ok()
    }

    /// Returns this region's half-open range, relative to the image start.
    pub fn range(&self) -> Region {
        Region::new(self.offset, self.size)
    }
}

/// Caller-owned storage for the regions of a successfully validated image.
///
/// `N` is the largest number of regions the caller is prepared to accept; an
/// image with more is rejected with `InvalidRegionSize`.
#[derive(Clone, Debug, Default)]
pub struct ValidatedRegions<const N: usize = MAX_REGIONS> {
    regions: ArrayVec<ImageRegion, N>,
}

impl<const N: usize> ValidatedRegions<N> {
    /// Creates a new, empty `ValidatedRegions`.
    pub fn new() -> Self {
        Self {
            regions: ArrayVec::new(),
        }
    }

    /// Returns the validated regions, in table order.
    pub fn as_slice(&self) -> &[ImageRegion] {
        &self.regions
    }

    /// Returns the number of validated regions.
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// Returns whether there are no validated regions.
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Returns the maximum number of regions this value can hold.
    pub fn capacity(&self) -> usize {
        N
    }

    pub(crate) fn clear(&mut self) {
        self.regions.clear();
    }
}

fn read_hash<F: Flash + ?Sized>(
    flash: &F,
    desc: &ImageDescriptor,
) -> Result<hash::Digest, FailureReason> {
    let mut header = [0; 8];
    flash.read(desc.layout.hash.offset, &mut header)?;
    check!(
        header[..4] == HASH_MAGIC.to_le_bytes()[..],
        FailureReason::InvalidDescriptor
    );

    let mut expected = hash::Digest::zeroed(desc.hash_algo());
    flash.read(desc.layout.hash.offset + 8, expected.as_bytes_mut())?;
    Ok(expected)
}

/// Validates the region table of `desc`, and checks the region hash.
///
/// `start` is the absolute offset of the image start and `end` the end of
/// the range being validated. On success, `out` holds a copy of the region
/// table; on failure, `out` is left empty.
pub fn validate_regions<F: Flash + ?Sized, const N: usize>(
    flash: &F,
    desc: &ImageDescriptor,
    start: u32,
    end: u32,
    engine: &mut dyn hash::Engine,
    out: &mut ValidatedRegions<N>,
) -> Result<(), FailureReason> {
    out.clear();
    check!(desc.regions.len() <= N, FailureReason::InvalidRegionSize);

    let mut total = 0u32;
    for region in &desc.regions {
        check!(region.offset == total, FailureReason::InvalidDescriptor);
        check!(
            region.offset % SECTOR_SIZE == 0 && region.size % SECTOR_SIZE == 0,
            FailureReason::InvalidDescriptor
        );
        check!(
            region.size <= desc.image_size - total,
            FailureReason::InvalidDescriptor
        );
        let abs_end = start
            .checked_add(region.offset)
            .and_then(|x| x.checked_add(region.size));
        check!(
            matches!(abs_end, Some(e) if e <= end),
            FailureReason::InvalidRegionInput
        );
        total += region.size;
    }
    check!(total == desc.image_size, FailureReason::InvalidDescriptor);

    // Regions are half-open, so a region ending exactly at the descriptor
    // does not contain it.
    let area = desc.area();
    let rel_area = Region::new(desc.descriptor_offset, area.len);
    let owner = desc
        .regions
        .iter()
        .find(|r| r.range().contains(rel_area.offset))
        .ok_or_else(|| fail!(FailureReason::InvalidDescriptor))?;
    check!(owner.is_static(), FailureReason::InvalidDescriptor);
    check!(
        matches!(
            (rel_area.end(), owner.range().end()),
            (Some(a), Some(r)) if a <= r
        ),
        FailureReason::InvalidDescriptor
    );

    let expected = read_hash(flash, desc)?;

    let mut hasher = engine.new_hash(desc.hash_algo())?;
    for region in desc.regions.iter().filter(|r| r.is_static()) {
        let abs = Region::new(start + region.offset, region.size);
        if core::ptr::eq(region, owner) {
            let before = Region::new(abs.offset, area.offset - abs.offset);
            let after_start = area.offset + area.len;
            let after =
                Region::new(after_start, abs.offset + abs.len - after_start);
            trace!("hashing {:?} and {:?}", before, after);
            flash.hash_range(before, hasher.engine())?;
            flash.hash_range(after, hasher.engine())?;
        } else {
            trace!("hashing {:?}", abs);
            flash.hash_range(abs, hasher.engine())?;
        }
    }
    let actual = hasher.finish()?;
    check!(actual == expected, FailureReason::InvalidHash);

    for region in &desc.regions {
        out.regions.push(*region);
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::crypto::ring;
    use crate::hardware::fake;
    use crate::hardware::flash::Ram;
    use crate::image::owned;
    use crate::image::testing;
    use pretty_assertions::assert_eq;

    fn validate<const N: usize>(
        image: &[u8],
        out: &mut ValidatedRegions<N>,
    ) -> Result<(), FailureReason> {
        let flash = Ram(image);
        let end = image.len() as u32;
        let desc = ImageDescriptor::parse(
            &flash,
            testing::DESCRIPTOR_OFFSET,
            0..end,
            &fake::Platform::dev(),
        )?;
        validate_regions(
            &flash,
            &desc,
            0,
            end,
            &mut ring::hash::Engine::new(),
            out,
        )
    }

    fn with_regions(regions: Vec<owned::Region>) -> Vec<u8> {
        let mut layout = testing::layout();
        layout.regions = regions;
        layout.image_size = Some(0x8000);
        testing::build(&layout)
    }

    #[test]
    fn valid_table() {
        let layout = testing::layout();
        let image = testing::build(&layout);
        let mut out = ValidatedRegions::<16>::new();
        validate(&image, &mut out).unwrap();

        assert_eq!(out.len(), layout.regions.len());
        for (got, want) in out.as_slice().iter().zip(&layout.regions) {
            assert_eq!(got.name(), Some(want.name.as_str()));
            assert_eq!(got.offset, want.offset);
            assert_eq!(got.size, want.size);
        }
    }

    #[test]
    fn bit_flip_in_static_region() {
        let image = testing::build(&testing::layout());
        for &offset in &[0usize, 0x3fff, 0x6000, 0x7fff] {
            let mut bad = image.clone();
            bad[offset] ^= 0x20;
            let mut out = ValidatedRegions::<16>::new();
            assert_eq!(
                validate(&bad, &mut out),
                Err(FailureReason::InvalidHash),
                "offset {:#x}",
                offset
            );
            assert!(out.is_empty());
        }
    }

    #[test]
    fn bit_flip_outside_hash() {
        let image = testing::build(&testing::layout());
        let mut out = ValidatedRegions::<16>::new();

        // Non-static region.
        let mut bad = image.clone();
        bad[0x4800] ^= 0x20;
        validate(&bad, &mut out).unwrap();

        // Descriptor padding.
        let mut bad = image;
        let at = testing::DESCRIPTOR_OFFSET as usize;
        bad[at + testing::AREA_SIZE as usize - 1] ^= 0x20;
        validate(&bad, &mut out).unwrap();
    }

    #[test]
    fn too_many_regions() {
        let image = testing::build(&testing::layout());
        let mut out = ValidatedRegions::<2>::new();
        assert_eq!(
            validate(&image, &mut out),
            Err(FailureReason::InvalidRegionSize)
        );
        assert_eq!(out.capacity(), 2);
    }

    #[test]
    fn gaps_and_overlaps() {
        let mut out = ValidatedRegions::<16>::new();

        let gap = with_regions(vec![
            testing::region("a", 0x0000, 0x4000, true),
            testing::region("b", 0x5000, 0x3000, true),
        ]);
        assert_eq!(
            validate(&gap, &mut out),
            Err(FailureReason::InvalidDescriptor)
        );

        let overlap = with_regions(vec![
            testing::region("a", 0x0000, 0x4000, true),
            testing::region("b", 0x3000, 0x5000, true),
        ]);
        assert_eq!(
            validate(&overlap, &mut out),
            Err(FailureReason::InvalidDescriptor)
        );

        let short = with_regions(vec![
            testing::region("a", 0x0000, 0x4000, true),
            testing::region("b", 0x4000, 0x3000, true),
        ]);
        assert_eq!(
            validate(&short, &mut out),
            Err(FailureReason::InvalidDescriptor)
        );

        let long = with_regions(vec![
            testing::region("a", 0x0000, 0x4000, true),
            testing::region("b", 0x4000, 0x5000, true),
        ]);
        assert_eq!(
            validate(&long, &mut out),
            Err(FailureReason::InvalidDescriptor)
        );
    }

    #[test]
    fn misaligned() {
        let mut out = ValidatedRegions::<16>::new();
        let image = with_regions(vec![
            testing::region("a", 0x0000, 0x4100, true),
            testing::region("b", 0x4100, 0x3f00, true),
        ]);
        assert_eq!(
            validate(&image, &mut out),
            Err(FailureReason::InvalidDescriptor)
        );
    }

    #[test]
    fn descriptor_must_be_static() {
        let mut out = ValidatedRegions::<16>::new();
        let image = with_regions(vec![
            testing::region("a", 0x0000, 0x4000, false),
            testing::region("b", 0x4000, 0x4000, true),
        ]);
        assert_eq!(
            validate(&image, &mut out),
            Err(FailureReason::InvalidDescriptor)
        );
    }

    #[test]
    fn descriptor_must_not_straddle() {
        let mut out = ValidatedRegions::<16>::new();
        let mut layout = testing::layout();
        layout.regions = vec![
            testing::region("a", 0x0000, 0x2000, true),
            testing::region("b", 0x2000, 0x6000, true),
        ];
        let image = testing::build(&layout);
        validate(&image, &mut out).unwrap();

        layout.descriptor_offset = 0x1c00;
        let straddling = testing::build(&layout);
        assert_eq!(
            testing::validate_at(&straddling, 0x1c00, &mut out),
            Err(FailureReason::InvalidDescriptor)
        );
    }

    #[test]
    fn boundary_belongs_to_next_region() {
        // The descriptor sits exactly where region "b" begins, so "b" owns
        // it; "a" is not static, which would be fatal if it were chosen.
        let mut layout = testing::layout();
        layout.descriptor_offset = 0x2000;
        layout.regions = vec![
            testing::region("a", 0x0000, 0x2000, false),
            testing::region("b", 0x2000, 0x6000, true),
        ];
        let image = testing::build(&layout);
        let mut out = ValidatedRegions::<16>::new();
        testing::validate_at(&image, 0x2000, &mut out).unwrap();

        // Flipping the last byte of "a" does not matter; flipping the first
        // byte after the descriptor does.
        let mut bad = image.clone();
        bad[0x1fff] ^= 1;
        testing::validate_at(&bad, 0x2000, &mut out).unwrap();

        let mut bad = image;
        bad[0x2000 + testing::AREA_SIZE as usize] ^= 1;
        assert_eq!(
            testing::validate_at(&bad, 0x2000, &mut out),
            Err(FailureReason::InvalidHash)
        );
    }

    #[test]
    fn region_past_end() {
        let image = testing::build(&testing::layout());
        let flash = Ram(&image[..]);
        let end = image.len() as u32;
        let lenient = fake::Platform {
            size_valid: Some(true),
            ..fake::Platform::dev()
        };
        let desc = ImageDescriptor::parse(
            &flash,
            testing::DESCRIPTOR_OFFSET,
            0..end,
            &lenient,
        )
        .unwrap();

        let mut out = ValidatedRegions::<16>::new();
        assert_eq!(
            validate_regions(
                &flash,
                &desc,
                0,
                end - SECTOR_SIZE,
                &mut ring::hash::Engine::new(),
                &mut out,
            ),
            Err(FailureReason::InvalidRegionInput)
        );
    }

    #[test]
    fn unknown_attributes_are_ignored() {
        let region = ImageRegion {
            name: [0; 32],
            offset: 0,
            size: 0,
            version: 0,
            raw_attributes: 0x8001,
        };
        assert!(region.is_static());
        assert_eq!(
            region.attributes(),
            BitFlags::from(RegionAttribute::Static)
        );

        let mut bytes = Vec::new();
        region.write_to(&mut bytes).unwrap();
        assert_eq!(bytes.len(), REGION_LEN as usize);
        assert_eq!(ImageRegion::parse(&bytes[..]).unwrap(), region);
    }
}
