// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Owned image layouts.
//!
//! This module provides a heap-allocated description of a signed image,
//! which can be turned into the bytes of a finished image with
//! [`Image::build()`]. It is intended for tooling to make building signed
//! images easy and straight-forward.
//!
//! When the `serde` feature is enabled, layouts can be de/serialized.

use std::convert::TryInto;

use arrayvec::ArrayVec;

use crate::crypto::hash;
use crate::crypto::hash::EngineExt as _;
use crate::crypto::sig;
use crate::image::descriptor::Layout;
use crate::image::descriptor::SECTION_HEADER_LEN;
use crate::image::mauv;
use crate::image::HashType;
use crate::image::ImageDescriptor;
use crate::image::ImageMauv;
use crate::image::ImageRegion;
use crate::image::ImageType;
use crate::image::RegionAttribute;
use crate::image::Version;
use crate::image::BLOB_MAGIC;
use crate::image::DENYLIST_MAGIC;
use crate::image::HASH_MAGIC;
use crate::image::MAX_REGIONS;
use crate::image::SIGNATURE_MAGIC;
use crate::io;
use crate::io::Write as _;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// An error returned while building an image.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Error {
    /// Indicates an error in a low-level [`io`] type.
    Io(io::Error),
    /// Indicates that hashing failed.
    Hash(hash::Error),
    /// Indicates that signing failed.
    Sig(sig::Error),
    /// Indicates that a name did not fit in its 32-byte field.
    NameTooLong,
    /// Indicates that there were too many regions, or none.
    BadRegionCount,
    /// Indicates that the image's hash type cannot be computed.
    UnsupportedHash,
    /// Indicates that a size or offset was out of range, such as a
    /// descriptor that does not fit in the image.
    OutOfRange,
    /// Indicates that the MAUV record is not well-formed.
    BadMauv(mauv::MauvError),
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<hash::Error> for Error {
    fn from(e: hash::Error) -> Self {
        Self::Hash(e)
    }
}

impl From<sig::Error> for Error {
    fn from(e: sig::Error) -> Self {
        Self::Sig(e)
    }
}

/// A region, as described in an image layout.
#[derive(Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Region {
    /// The region's name; at most 32 bytes.
    pub name: String,
    /// The region's offset within the image.
    pub offset: u32,
    /// The region's size.
    pub size: u32,
    /// The region's version.
    #[cfg_attr(feature = "serde", serde(default))]
    pub version: u16,
    /// The region's attributes.
    #[cfg_attr(feature = "serde", serde(default))]
    pub attributes: Vec<RegionAttribute>,
}

/// An anti-rollback record, as described in an image layout.
#[derive(Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Mauv {
    /// The image's security version.
    pub payload_security_version: u64,
    /// When the record was issued.
    pub update_timestamp: u64,
    /// The oldest security version the record allows.
    pub minimum_acceptable_update_version: u64,
    /// Security versions the record forbids.
    #[cfg_attr(feature = "serde", serde(default))]
    pub denylist: Vec<u64>,
}

/// An arbitrary blob sub-record.
#[derive(Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BlobRecord {
    /// The record's type magic.
    pub ty: u32,
    /// The record's payload.
    pub payload: Vec<u8>,
}

/// A heap-allocated image layout.
///
/// Only the parts of a descriptor that are not derived from the image are
/// described here; sizes, digests, and the signature are computed by
/// [`Image::build()`].
#[derive(Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Image {
    /// The image name; at most 32 bytes.
    pub name: String,
    /// The image family.
    #[cfg_attr(feature = "serde", serde(default))]
    pub family: u32,
    /// The image version.
    #[cfg_attr(feature = "serde", serde(default))]
    pub version: Version,
    /// The build timestamp.
    #[cfg_attr(feature = "serde", serde(default))]
    pub build_timestamp: u64,
    /// The kind of build.
    pub image_type: ImageType,
    /// The digest algorithm for the region hash.
    pub hash_type: HashType,
    /// The signature scheme.
    pub scheme: sig::Scheme,
    /// Where the descriptor is placed, relative to the start of the image.
    pub descriptor_offset: u32,
    /// The size of the descriptor area; if absent, exactly as large as the
    /// descriptor.
    #[cfg_attr(feature = "serde", serde(default))]
    pub descriptor_area_size: Option<u32>,
    /// The size of the image; if absent, the sum of the region sizes.
    #[cfg_attr(feature = "serde", serde(default))]
    pub image_size: Option<u32>,
    /// The region table.
    pub regions: Vec<Region>,
    /// Legacy denylist records.
    #[cfg_attr(feature = "serde", serde(default))]
    pub denylist: Vec<Version>,
    /// The anti-rollback record, if any.
    #[cfg_attr(feature = "serde", serde(default))]
    pub mauv: Option<Mauv>,
    /// Other blob sub-records, placed after the anti-rollback record.
    #[cfg_attr(feature = "serde", serde(default))]
    pub blob_records: Vec<BlobRecord>,
}

fn name_bytes(name: &str) -> Result<[u8; 32], Error> {
    let mut out = [0; 32];
    if name.len() > out.len() {
        return Err(Error::NameTooLong);
    }
    out[..name.len()].copy_from_slice(name.as_bytes());
    Ok(out)
}

impl Mauv {
    /// Converts this record into its checked form.
    pub fn to_image_mauv(&self) -> Result<ImageMauv, Error> {
        let mut bytes = Vec::new();
        let mut denylist = ArrayVec::<u64, { mauv::MAX_DENYLIST }>::new();
        for &v in &self.denylist {
            denylist
                .try_push(v)
                .map_err(|_| Error::BadMauv(mauv::MauvError::TooManyEntries))?;
        }
        let record = ImageMauv {
            payload_security_version: self.payload_security_version,
            mauv_update_timestamp: self.update_timestamp,
            minimum_acceptable_update_version: self
                .minimum_acceptable_update_version,
            denylist,
        };

        // Round-trip through the parser, which runs the sanity checks.
        record.write_to(&mut bytes)?;
        ImageMauv::parse(&bytes).map_err(Error::BadMauv)
    }
}

impl Image {
    fn blob(&self) -> Result<Vec<u8>, Error> {
        let mut records = Vec::new();
        if let Some(m) = &self.mauv {
            let mut payload = Vec::new();
            m.to_image_mauv()?.write_to(&mut payload)?;
            records.push(BlobRecord {
                ty: mauv::MAUV_MAGIC,
                payload,
            });
        }
        records.extend(self.blob_records.iter().cloned());
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let mut blob = Vec::new();
        blob.write_le(BLOB_MAGIC)?;
        blob.write_zeros(4)?;
        for record in &records {
            let len = record.payload.len().try_into();
            blob.write_le(record.ty)?;
            blob.write_le::<u32>(len.map_err(|_| Error::OutOfRange)?)?;
            blob.write_bytes(&record.payload)?;
            while blob.len() % 4 != 0 {
                blob.write_le(0u8)?;
            }
        }
        Ok(blob)
    }

    /// Builds a signed image, with `payload` as its contents.
    ///
    /// `payload` is padded with `0xff` to the image size; the descriptor is
    /// then written over it at the configured offset. The signature is
    /// produced by `signer`, whose key size must match the layout's scheme.
    pub fn build(
        &self,
        payload: &[u8],
        engine: &mut dyn hash::Engine,
        signer: &mut dyn sig::Sign,
    ) -> Result<Vec<u8>, Error> {
        if self.regions.is_empty() || self.regions.len() > MAX_REGIONS {
            return Err(Error::BadRegionCount);
        }
        let hash_algo = self.hash_type.algo().ok_or(Error::UnsupportedHash)?;
        let denylist_size: u8 =
            self.denylist.len().try_into().map_err(|_| Error::OutOfRange)?;

        let mut regions = ArrayVec::new();
        let mut region_sum = 0u32;
        for r in &self.regions {
            let raw_attributes =
                r.attributes.iter().fold(0, |acc, &a| acc | a as u16);
            regions.push(ImageRegion {
                name: name_bytes(&r.name)?,
                offset: r.offset,
                size: r.size,
                version: r.version,
                raw_attributes,
            });
            region_sum =
                region_sum.checked_add(r.size).ok_or(Error::OutOfRange)?;
        }
        let image_size = self.image_size.unwrap_or(region_sum);

        let blob = self.blob()?;
        let layout = Layout::new(
            self.descriptor_offset,
            regions.len() as u8,
            hash_algo,
            denylist_size,
            blob.len().try_into().map_err(|_| Error::OutOfRange)?,
            self.scheme,
        )
        .ok_or(Error::OutOfRange)?;
        let area_size = self.descriptor_area_size.unwrap_or(layout.total_len());
        let area_end = self
            .descriptor_offset
            .checked_add(area_size)
            .ok_or(Error::OutOfRange)?;
        if area_size < layout.total_len() || area_end > image_size {
            return Err(Error::OutOfRange);
        }

        let desc = ImageDescriptor {
            offset: self.descriptor_offset,
            descriptor_major: 1,
            descriptor_minor: 0,
            descriptor_offset: self.descriptor_offset,
            descriptor_area_size: area_size,
            image_name: name_bytes(&self.name)?,
            image_family: self.family,
            version: self.version,
            build_timestamp: self.build_timestamp,
            image_type: self.image_type,
            denylist_size,
            hash_type: self.hash_type,
            signature_scheme: self.scheme,
            image_size,
            blob_size: blob.len() as u32,
            regions,
            layout,
        };

        if payload.len() > image_size as usize {
            return Err(Error::OutOfRange);
        }
        let mut image = payload.to_vec();
        image.resize(image_size as usize, 0xff);

        let area_start = self.descriptor_offset as usize;
        let area = &mut image[area_start..area_end as usize];
        for b in area.iter_mut() {
            *b = 0;
        }
        let mut w = &mut area[..];
        desc.write_header(&mut w)?;
        w.write_le(HASH_MAGIC)?;
        w.write_zeros(4 + hash_algo.bytes())?;
        if denylist_size > 0 {
            w.write_le(DENYLIST_MAGIC)?;
            w.write_zeros(4)?;
            for v in &self.denylist {
                w.write_le(v.major)?;
                w.write_le(v.minor)?;
                w.write_le(v.point)?;
                w.write_le(v.subpoint)?;
            }
        }
        w.write_bytes(&blob)?;

        // Everything in a static region, except the descriptor area.
        let mut hasher = engine.new_hash(hash_algo)?;
        for r in self.regions.iter() {
            if !r.attributes.contains(&RegionAttribute::Static) {
                continue;
            }
            let start = (r.offset as usize).min(image.len());
            let end = (r.offset as usize)
                .saturating_add(r.size as usize)
                .min(image.len());
            let before_end = end.min(area_start).max(start);
            let after_start = start.max(area_end as usize).min(end);
            hasher.write(&image[start..before_end])?;
            hasher.write(&image[after_start..end])?;
        }
        let digest = hasher.finish()?;
        let digest_at = layout.hash.offset + SECTION_HEADER_LEN;
        let digest_at = digest_at as usize;
        image[digest_at..digest_at + hash_algo.bytes()]
            .copy_from_slice(digest.as_bytes());

        let signed = layout.signed;
        let signed = &image
            [signed.offset as usize..(signed.offset + signed.len) as usize];
        let digest =
            engine.contiguous_hash(self.scheme.hash_algo(), signed)?;

        let key_scheme = sig::Scheme::for_key(
            signer.modulus().len(),
            self.scheme.hash_algo(),
        );
        if key_scheme != Some(self.scheme) {
            return Err(Error::Sig(sig::Error::Unsupported));
        }
        let mut signature = vec![0; self.scheme.sig_len()];
        signer.sign(self.scheme, digest.as_bytes(), &mut signature)?;

        let sig_at = layout.signature.offset as usize;
        let mut w = &mut image[sig_at..sig_at + layout.signature.len as usize];
        w.write_le(SIGNATURE_MAGIC)?;
        w.write_bytes(signer.modulus())?;
        w.write_le(signer.exponent())?;
        w.write_bytes(&signature)?;

        Ok(image)
    }
}
