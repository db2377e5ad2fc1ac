// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! `cr51sign` validates signed firmware images for a baseboard management
//! controller.
//!
//! Given a byte range it does not trust, `cr51sign` decides whether that range
//! contains a firmware image that is authentic (its signature verifies
//! against a trusted key), internally consistent (its region table is
//! well-formed and its static regions hash to the embedded digest), and not a
//! rollback (its embedded minimum-acceptable-update-version record is
//! compatible with the one previously accepted).
//!
//! `cr51sign` does not read flash, hash bytes, verify RSA signatures or
//! persist state on its own. All of those are capabilities provided by the
//! integration:
//! - [`hardware::flash::Flash`] for reading the image.
//! - [`crypto::hash::Engine`] and [`crypto::sig::Verify`] for cryptography.
//! - [`hardware::Platform`] for platform policy hooks.
//! - [`hardware::MauvStorage`] for the persisted anti-rollback record.
//!
//! The entry-point is [`image::ValidationContext::validate()`]; see the
//! [`image`] module for the wire format.

#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![warn(missing_docs)]
#![deny(unsafe_code)]

#[macro_use]
mod debug;

#[macro_use]
pub mod io;

pub mod crypto;
pub mod hardware;
pub mod image;
