// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Shared fixtures for image tests.

use crate::crypto::ring;
use crate::crypto::sig;
use crate::crypto::sig::fake;
use crate::hardware;
use crate::hardware::flash::Ram;
use crate::image::owned;
use crate::image::region::validate_regions;
use crate::image::FailureReason;
use crate::image::HashType;
use crate::image::ImageDescriptor;
use crate::image::ImageType;
use crate::image::RegionAttribute;
use crate::image::ValidatedRegions;
use crate::image::Version;

/// Where [`layout()`] places its descriptor.
pub const DESCRIPTOR_OFFSET: u32 = 0x1000;

/// The descriptor area size used by [`layout()`].
pub const AREA_SIZE: u32 = 0x800;

/// The key that [`build()`] signs with.
pub const KEY_ID: u8 = 0x5a;

pub fn region(
    name: &str,
    offset: u32,
    size: u32,
    is_static: bool,
) -> owned::Region {
    let attributes = if is_static {
        vec![RegionAttribute::Static, RegionAttribute::WriteProtected]
    } else {
        vec![RegionAttribute::Persistent]
    };
    owned::Region {
        name: name.to_string(),
        offset,
        size,
        version: 1,
        attributes,
    }
}

/// A 32 KiB image with two static regions around a persistent one.
pub fn layout() -> owned::Image {
    owned::Image {
        name: "test-image".to_string(),
        family: 0,
        version: Version {
            major: 1,
            minor: 0,
            point: 2,
            subpoint: 0,
        },
        build_timestamp: 0x5f00_0000,
        image_type: ImageType::Prod,
        hash_type: HashType::Sha256,
        scheme: sig::Scheme::Rsa2048Pkcs15,
        descriptor_offset: DESCRIPTOR_OFFSET,
        descriptor_area_size: Some(AREA_SIZE),
        image_size: None,
        regions: vec![
            region("ro_a", 0x0000, 0x4000, true),
            region("rw", 0x4000, 0x2000, false),
            region("ro_b", 0x6000, 0x2000, true),
        ],
        denylist: Vec::new(),
        mauv: None,
        blob_records: Vec::new(),
    }
}

pub fn mauv(psv: u64, timestamp: u64, min: u64) -> owned::Mauv {
    owned::Mauv {
        payload_security_version: psv,
        update_timestamp: timestamp,
        minimum_acceptable_update_version: min,
        denylist: Vec::new(),
    }
}

/// Builds `layout` over a fixed payload, signed by [`KEY_ID`].
pub fn build(layout: &owned::Image) -> Vec<u8> {
    let len = layout.regions.iter().map(|r| r.size as usize).sum::<usize>();
    let len = layout.image_size.map(|s| s as usize).unwrap_or(len);
    let payload = (0..len).map(|i| (i % 251) as u8).collect::<Vec<_>>();
    layout
        .build(
            &payload,
            &mut ring::hash::Engine::new(),
            &mut fake::Sign::new(KEY_ID, layout.scheme.sig_len()),
        )
        .unwrap()
}

/// Parses the descriptor at `at` and checks the region table, treating
/// all of `image` as the range being validated.
pub fn validate_at<const N: usize>(
    image: &[u8],
    at: u32,
    out: &mut ValidatedRegions<N>,
) -> Result<(), FailureReason> {
    let flash = Ram(image);
    let end = image.len() as u32;
    let desc = ImageDescriptor::parse(
        &flash,
        at,
        0..end,
        &hardware::fake::Platform::dev(),
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
