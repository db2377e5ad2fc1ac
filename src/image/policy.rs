// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Image transition policy.
//!
//! Decides whether the running firmware may move to the image described by
//! a descriptor, based on the image's family and type and the device's
//! lifecycle state.

use crate::hardware::flash::Flash;
use crate::hardware::Platform;
use crate::image::FailureReason;
use crate::image::ImageDescriptor;
use crate::image::ImageType;
use crate::image::SIGNATURE_MAGIC;

/// Checks whether `desc` is an acceptable transition target.
///
/// `family` is the family of the running image and `current_type` the type
/// of the running image, if known. A family of zero, on either side, matches
/// any family.
pub fn check_transition<F: Flash + ?Sized>(
    flash: &F,
    desc: &ImageDescriptor,
    family: u32,
    current_type: Option<ImageType>,
    platform: &dyn Platform,
) -> Result<(), FailureReason> {
    let mut magic = [0; 4];
    flash.read(desc.layout.signature.offset, &mut magic)?;
    check!(
        u32::from_le_bytes(magic) == SIGNATURE_MAGIC,
        FailureReason::InvalidDescriptor
    );

    check!(
        desc.image_family == family || desc.image_family == 0 || family == 0,
        FailureReason::InvalidImageFamily
    );

    match desc.image_type {
        ImageType::UnsignedIntegrity => {
            return Err(fail!(FailureReason::ImageTypeDisallowed))
        }
        ImageType::Test => check!(
            current_type == Some(ImageType::Test),
            FailureReason::ImageTypeDisallowed
        ),
        _ => {}
    }

    let production = platform
        .is_production_mode()
        .ok_or_else(|| fail!(FailureReason::InvalidInterface))?;
    if production && desc.image_type == ImageType::Dev {
        let allowed = platform
            .prod_to_dev_downgrade_allowed()
            .ok_or_else(|| fail!(FailureReason::InvalidInterface))?;
        check!(allowed, FailureReason::DevDowngradeDisallowed);
        warn!("allowing downgrade to a dev image in production mode");
    }
    Ok(())
}
