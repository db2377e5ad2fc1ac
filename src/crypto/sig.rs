// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Signature traits.
//!
//! Image signatures are RSA PKCS#1 v1.5 over a digest of the signed portion
//! of the image descriptor. The digest algorithm is never chosen
//! independently: it is implied by the [`Scheme`].

use static_assertions::assert_obj_safe;

use crate::crypto::hash;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The size of the largest modulus (and thus signature) of any [`Scheme`].
pub const MAX_SIG_LEN: usize = 512;

wire_enum! {
    /// A signature scheme, as encoded in an image descriptor.
    #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
    pub enum Scheme: u8 {
        /// RSA-2048, PKCS#1 v1.5 padding over SHA-256.
        Rsa2048Pkcs15 = 1,
        /// RSA-3072, PKCS#1 v1.5 padding over SHA-256.
        Rsa3072Pkcs15 = 2,
        /// RSA-4096, PKCS#1 v1.5 padding over SHA-256.
        Rsa4096Pkcs15 = 3,
        /// RSA-4096, PKCS#1 v1.5 padding over SHA-512.
        Rsa4096Pkcs15Sha512 = 4,
    }
}

impl Scheme {
    /// Returns the digest algorithm this scheme signs.
    pub fn hash_algo(self) -> hash::Algo {
        match self {
            Self::Rsa2048Pkcs15 | Self::Rsa3072Pkcs15 | Self::Rsa4096Pkcs15 => {
                hash::Algo::Sha256
            }
            Self::Rsa4096Pkcs15Sha512 => hash::Algo::Sha512,
        }
    }

    /// Returns the length of the modulus, and of a signature, in bytes.
    pub fn sig_len(self) -> usize {
        match self {
            Self::Rsa2048Pkcs15 => 256,
            Self::Rsa3072Pkcs15 => 384,
            Self::Rsa4096Pkcs15 | Self::Rsa4096Pkcs15Sha512 => 512,
        }
    }

    /// Returns the scheme that signs `algo` digests with a key of
    /// `modulus_len` bytes, if there is one.
    pub fn for_key(modulus_len: usize, algo: hash::Algo) -> Option<Self> {
        match (modulus_len, algo) {
            (256, hash::Algo::Sha256) => Some(Self::Rsa2048Pkcs15),
            (384, hash::Algo::Sha256) => Some(Self::Rsa3072Pkcs15),
            (512, hash::Algo::Sha256) => Some(Self::Rsa4096Pkcs15),
            (512, hash::Algo::Sha512) => Some(Self::Rsa4096Pkcs15Sha512),
            _ => None,
        }
    }
}

/// A signature block read out of an image.
///
/// The modulus and exponent are the key the image claims to be signed with;
/// it is up to a [`Verify`] implementation whether to trust that claim.
#[derive(Copy, Clone, Debug)]
pub struct Block<'a> {
    /// The scheme this signature was produced with.
    pub scheme: Scheme,
    /// The embedded public modulus, big-endian.
    pub modulus: &'a [u8],
    /// The embedded public exponent.
    pub exponent: u32,
    /// The signature, big-endian.
    pub signature: &'a [u8],
}

/// An error returned by a signature operation.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Error {
    /// The key embedded in the signature block is not trusted.
    UntrustedKey,

    /// The signature did not verify.
    BadSignature,

    /// The operation does not support the requested scheme.
    Unsupported,

    /// Indicates an unspecified, internal error.
    Unspecified,
}

/// A signature-verification engine, backed by some set of trusted keys.
///
/// Which keys are acceptable is entirely the implementation's decision; the
/// caller only learns which one succeeded.
pub trait Verify {
    /// Verifies `block` against `digest`, which was computed with
    /// `block.scheme.hash_algo()`.
    ///
    /// On success, returns the index, within the implementation's keyring, of
    /// the key that validated the signature.
    fn verify(&mut self, block: &Block, digest: &[u8]) -> Result<usize, Error>;
}
assert_obj_safe!(Verify);

/// A signing engine, already primed with a keypair.
///
/// There is no way to extract the keypair back out of a `Sign` value.
pub trait Sign {
    /// Returns the public modulus, big-endian, without leading zeros beyond
    /// the modulus length.
    fn modulus(&self) -> &[u8];

    /// Returns the public exponent.
    fn exponent(&self) -> u32;

    /// Signs `digest`, which was computed with `scheme.hash_algo()`, writing
    /// the signature to `out`.
    fn sign(
        &mut self,
        scheme: Scheme,
        digest: &[u8],
        out: &mut [u8],
    ) -> Result<(), Error>;
}
assert_obj_safe!(Sign);
