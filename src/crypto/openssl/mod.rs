// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Implementations of [`crypto::sig`] using the [`openssl`] crate.
//!
//! Image signatures are PKCS#1 v1.5 over a digest that the validator has
//! already computed by streaming the image through a [`hash::Engine`], so the
//! backend must be able to verify a prehashed signature. This module wraps
//! OpenSSL's `EVP_PKEY` verify operation, which can.
//!
//! [`hash::Engine`]: crate::crypto::hash::Engine

use openssl::bn::BigNum;
use openssl::error::ErrorStack;
use openssl::md::Md;
use openssl::md::MdRef;
use openssl::pkey::PKey;
use openssl::pkey::Private;
use openssl::pkey::Public;
use openssl::pkey_ctx::PkeyCtx;
use openssl::rsa::Padding;
use openssl::rsa::Rsa;

use crate::crypto::hash;
use crate::crypto::sig;

#[cfg(doc)]
use crate::crypto;

fn md_for(scheme: sig::Scheme) -> &'static MdRef {
    match scheme.hash_algo() {
        hash::Algo::Sha256 => Md::sha256(),
        hash::Algo::Sha384 => Md::sha384(),
        hash::Algo::Sha512 => Md::sha512(),
    }
}

fn ossl_err(_: ErrorStack) -> sig::Error {
    fail!(sig::Error::Unspecified)
}

fn strip_zeros(mut bytes: &[u8]) -> &[u8] {
    while let [0, rest @ ..] = bytes {
        bytes = rest;
    }
    bytes
}

fn exponent_to_u32(e: &[u8]) -> Option<u32> {
    let e = strip_zeros(e);
    if e.len() > 4 {
        return None;
    }
    Some(e.iter().fold(0, |acc, &b| acc << 8 | b as u32))
}

/// A trusted RSA public key.
pub struct PublicKey {
    modulus: Vec<u8>,
    exponent: u32,
    key: PKey<Public>,
}

impl PublicKey {
    /// Creates a key from a big-endian modulus and an exponent.
    pub fn new(modulus: &[u8], exponent: u32) -> Result<Self, sig::Error> {
        let n = BigNum::from_slice(modulus).map_err(ossl_err)?;
        let e = BigNum::from_u32(exponent).map_err(ossl_err)?;
        let rsa = Rsa::from_public_components(n, e).map_err(ossl_err)?;
        let key = PKey::from_rsa(rsa).map_err(ossl_err)?;
        Ok(Self {
            modulus: strip_zeros(modulus).to_vec(),
            exponent,
            key,
        })
    }

    /// Parses a DER-encoded `SubjectPublicKeyInfo` holding an RSA key.
    pub fn from_der(der: &[u8]) -> Result<Self, sig::Error> {
        let key = PKey::public_key_from_der(der).map_err(ossl_err)?;
        let rsa = key.rsa().map_err(|_| fail!(sig::Error::Unsupported))?;
        let exponent = exponent_to_u32(&rsa.e().to_vec())
            .ok_or_else(|| fail!(sig::Error::Unsupported))?;
        Ok(Self {
            modulus: rsa.n().to_vec(),
            exponent,
            key,
        })
    }

    /// Returns the key's modulus, big-endian.
    pub fn modulus(&self) -> &[u8] {
        &self.modulus
    }

    /// Returns the key's exponent.
    pub fn exponent(&self) -> u32 {
        self.exponent
    }

    /// Returns whether this is the key `block` claims to be signed with.
    fn matches(&self, block: &sig::Block) -> bool {
        self.exponent == block.exponent
            && self.modulus == strip_zeros(block.modulus)
    }

    fn verify_prehashed(
        &self,
        scheme: sig::Scheme,
        digest: &[u8],
        signature: &[u8],
    ) -> Result<(), sig::Error> {
        let mut ctx = PkeyCtx::new(&self.key).map_err(ossl_err)?;
        ctx.verify_init().map_err(ossl_err)?;
        ctx.set_rsa_padding(Padding::PKCS1).map_err(ossl_err)?;
        ctx.set_signature_md(md_for(scheme)).map_err(ossl_err)?;

        // OpenSSL reports some malformed signatures as errors rather than
        // as a failed comparison.
        match ctx.verify(digest, signature) {
            Ok(true) => Ok(()),
            _ => Err(fail!(sig::Error::BadSignature)),
        }
    }
}

/// An ordered set of trusted keys, implementing [`sig::Verify`].
///
/// The index reported on success is the position of the key in this ring.
#[derive(Default)]
pub struct Keyring {
    keys: Vec<PublicKey>,
}

impl Keyring {
    /// Creates an empty `Keyring`, which trusts nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `key` to the ring, returning its index.
    pub fn push(&mut self, key: PublicKey) -> usize {
        self.keys.push(key);
        self.keys.len() - 1
    }

    /// Returns the number of keys in the ring.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns whether the ring is empty.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl sig::Verify for Keyring {
    fn verify(
        &mut self,
        block: &sig::Block,
        digest: &[u8],
    ) -> Result<usize, sig::Error> {
        check!(
            digest.len() == block.scheme.hash_algo().bytes(),
            sig::Error::Unspecified
        );
        let (index, key) = self
            .keys
            .iter()
            .enumerate()
            .find(|(_, k)| k.matches(block))
            .ok_or_else(|| fail!(sig::Error::UntrustedKey))?;
        trace!("signature key matches keyring entry {}", index);

        key.verify_prehashed(block.scheme, digest, block.signature)?;
        Ok(index)
    }
}

/// An RSA keypair, implementing [`sig::Sign`].
pub struct Signer {
    key: PKey<Private>,
    modulus: Vec<u8>,
    exponent: u32,
}

impl Signer {
    /// Parses a DER-encoded PKCS#8 RSA private key.
    pub fn from_pkcs8(der: &[u8]) -> Result<Self, sig::Error> {
        let key = PKey::private_key_from_pkcs8(der).map_err(ossl_err)?;
        let rsa = key.rsa().map_err(|_| fail!(sig::Error::Unsupported))?;
        let exponent = exponent_to_u32(&rsa.e().to_vec())
            .ok_or_else(|| fail!(sig::Error::Unsupported))?;
        Ok(Self {
            modulus: rsa.n().to_vec(),
            exponent,
            key,
        })
    }

    /// Returns the public half of this keypair.
    pub fn public_key(&self) -> Result<PublicKey, sig::Error> {
        PublicKey::new(&self.modulus, self.exponent)
    }
}

impl sig::Sign for Signer {
    fn modulus(&self) -> &[u8] {
        &self.modulus
    }

    fn exponent(&self) -> u32 {
        self.exponent
    }

    fn sign(
        &mut self,
        scheme: sig::Scheme,
        digest: &[u8],
        out: &mut [u8],
    ) -> Result<(), sig::Error> {
        check!(self.modulus.len() == scheme.sig_len(), sig::Error::Unsupported);
        check!(out.len() == scheme.sig_len(), sig::Error::Unspecified);
        check!(
            digest.len() == scheme.hash_algo().bytes(),
            sig::Error::Unspecified
        );

        let mut ctx = PkeyCtx::new(&self.key).map_err(ossl_err)?;
        ctx.sign_init().map_err(ossl_err)?;
        ctx.set_rsa_padding(Padding::PKCS1).map_err(ossl_err)?;
        ctx.set_signature_md(md_for(scheme)).map_err(ossl_err)?;
        let mut sig = Vec::new();
        ctx.sign_to_vec(digest, &mut sig).map_err(ossl_err)?;
        check!(sig.len() == out.len(), sig::Error::Unspecified);
        out.copy_from_slice(&sig);
        Ok(())
    }
}
