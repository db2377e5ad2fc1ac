// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Validation failures.
//!
//! Every way validation can fail is a [`FailureReason`]. Reasons are split
//! into [`Tier`]s, which tell the scan loop whether to keep looking for
//! another descriptor candidate.

use crate::crypto::hash;
use crate::crypto::sig;
use crate::hardware::flash;
use crate::io;
use crate::io::wire::WireEnum as _;

wire_enum! {
    /// The reason an image failed validation.
    ///
    /// The wire values are stable, and double as `cr51sign-tool` exit codes.
    pub enum FailureReason: u8 {
        /// An I/O, hashing, or other capability failure.
        RuntimeFailure = 1,
        /// The descriptor uses a format version or size this crate does not
        /// support.
        UnsupportedDescriptor = 2,
        /// The descriptor is malformed.
        InvalidDescriptor = 3,
        /// The image belongs to a different family.
        InvalidImageFamily = 4,
        /// The image type is not accepted in this situation.
        ImageTypeDisallowed = 5,
        /// A production device was offered a development image.
        DevDowngradeDisallowed = 6,
        /// The image was signed with a key that is not trusted.
        UntrustedKey = 7,
        /// The image's signature did not verify.
        InvalidSignature = 8,
        /// The image's static regions did not hash to the embedded digest.
        InvalidHash = 9,
        /// The descriptor names an unsupported hash type.
        InvalidHashType = 10,
        /// A function was called with invalid arguments.
        InvalidArgument = 11,
        /// No descriptor magic was found.
        FailedToLocateMagic = 12,
        /// The validation context is malformed.
        InvalidContext = 13,
        /// A mandatory platform hook is missing.
        InvalidInterface = 14,
        /// The descriptor names an unsupported signature scheme.
        InvalidSigScheme = 15,
        /// A region extends past the validated range.
        InvalidRegionInput = 16,
        /// The image has more regions than the caller can accept.
        InvalidRegionSize = 17,
        /// The image's anti-rollback record is malformed.
        InvalidImageMauvData = 18,
        /// The stored anti-rollback record could not be read.
        RetrievingStoredImageMauvData = 19,
        /// The new anti-rollback record could not be stored.
        StoringNewImageMauvData = 20,
        /// The stored anti-rollback record forbids this image's version.
        StoredImageMauvDoesNotAllowUpdateToPayload = 21,
        /// An anti-rollback record is stored, but the image lacks one.
        StoredImageMauvExpectsPayloadImageMauv = 22,
        /// The stored anti-rollback record is malformed.
        StoredImageMauvDataInvalid = 23,
    }
}

/// How the scan loop treats a [`FailureReason`].
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Tier {
    /// The environment is broken; stop immediately.
    Fatal,
    /// This candidate is not a usable descriptor; try the next one.
    Structural,
    /// A well-formed descriptor was rejected; stop immediately.
    Policy,
}

impl FailureReason {
    /// Returns this reason's [`Tier`].
    pub fn tier(self) -> Tier {
        use FailureReason::*;
        match self {
            RuntimeFailure | InvalidArgument | InvalidContext
            | InvalidInterface => Tier::Fatal,

            UnsupportedDescriptor
            | InvalidDescriptor
            | FailedToLocateMagic
            | InvalidRegionSize
            | InvalidRegionInput
            | InvalidHashType
            | InvalidSigScheme => Tier::Structural,

            InvalidImageFamily
            | ImageTypeDisallowed
            | DevDowngradeDisallowed
            | UntrustedKey
            | InvalidSignature
            | InvalidHash
            | InvalidImageMauvData
            | RetrievingStoredImageMauvData
            | StoringNewImageMauvData
            | StoredImageMauvDoesNotAllowUpdateToPayload
            | StoredImageMauvExpectsPayloadImageMauv
            | StoredImageMauvDataInvalid => Tier::Policy,
        }
    }

    /// Returns this reason's numeric code.
    pub fn code(self) -> u8 {
        self.to_wire_value()
    }
}

impl From<flash::Error> for FailureReason {
    fn from(e: flash::Error) -> Self {
        fail!(Self::RuntimeFailure, "flash error: {:?}", e)
    }
}

impl From<hash::Error> for FailureReason {
    fn from(e: hash::Error) -> Self {
        fail!(Self::RuntimeFailure, "hash error: {:?}", e)
    }
}

impl From<io::Error> for FailureReason {
    fn from(e: io::Error) -> Self {
        fail!(Self::RuntimeFailure, "io error: {:?}", e)
    }
}

impl From<sig::Error> for FailureReason {
    fn from(e: sig::Error) -> Self {
        match e {
            sig::Error::UntrustedKey => Self::UntrustedKey,
            sig::Error::BadSignature => Self::InvalidSignature,
            sig::Error::Unsupported | sig::Error::Unspecified => {
                fail!(Self::RuntimeFailure, "verifier error: {:?}", e)
            }
        }
    }
}
