// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Pluggable cryptograpy traits.
//!
//! `cr51sign` never implements a cryptographic primitive itself. This module
//! provides object-safe traits that abstract over the two it needs: message
//! digests ([`hash::Engine`]) and signature verification ([`sig::Verify`]).
//!
//! Users are expected to provide their own implementations of these traits,
//! which may suit particular hardware or certification needs, such as a
//! hardware SHA block or a verifier that consults a fused keyring.
//!
//! It is recommended to not import the traits in this module directly, since
//! a lot of them have the same name. Instead, use imports like
//! `use cr51sign::crypto::hash;` and partially-qualified names like
//! `hash::Engine`.
//!
//! Software implementations of these traits are provided under the
//! [`ring` module] (hashing, based on the [`ring`] crate) and the
//! [`openssl` module] (RSA verification and signing, based on the `openssl`
//! crate). Their presence is controlled by feature flags of the same names.
//!
//! [`ring` module]: ring/index.html
//! [`openssl` module]: openssl/index.html

pub mod hash;
pub mod sig;

#[cfg(feature = "ring")]
pub mod ring;

#[cfg(all(feature = "openssl", feature = "std"))]
pub mod openssl;
