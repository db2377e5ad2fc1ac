// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Descriptor signature verification.

use crate::crypto::hash;
use crate::crypto::hash::EngineExt as _;
use crate::crypto::sig;
use crate::hardware::flash::Flash;
use crate::image::FailureReason;
use crate::image::ImageDescriptor;
use crate::image::SIGNATURE_MAGIC;

/// The largest signature block, in bytes.
const MAX_BLOCK_LEN: usize = 4 + 4 + 2 * sig::MAX_SIG_LEN;

/// Hashes the signed portion of `desc` and checks its signature.
///
/// The digest algorithm is the one implied by the descriptor's signature
/// scheme, not its region hash type. On success, returns the index of the key
/// that validated the signature.
pub fn verify_signature<F: Flash + ?Sized>(
    flash: &F,
    desc: &ImageDescriptor,
    engine: &mut dyn hash::Engine,
    verifier: &mut dyn sig::Verify,
) -> Result<usize, FailureReason> {
    let scheme = desc.signature_scheme;
    let mut hasher = engine.new_hash(scheme.hash_algo())?;
    flash.hash_range(desc.layout.signed, hasher.engine())?;
    let digest = hasher.finish()?;

    let len = desc.layout.signature.len as usize;
    check!(len <= MAX_BLOCK_LEN, FailureReason::InvalidDescriptor);
    let mut buf = [0; MAX_BLOCK_LEN];
    let buf = &mut buf[..len];
    flash.read(desc.layout.signature.offset, buf)?;

    let n = scheme.sig_len();
    let (magic, rest) = buf.split_at(4);
    let (modulus, rest) = rest.split_at(n);
    let (exponent, signature) = rest.split_at(4);
    check!(
        magic[..] == SIGNATURE_MAGIC.to_le_bytes()[..],
        FailureReason::InvalidDescriptor
    );

    let mut exp = [0; 4];
    exp.copy_from_slice(exponent);
    let block = sig::Block {
        scheme,
        modulus,
        exponent: u32::from_le_bytes(exp),
        signature,
    };

    let key = verifier.verify(&block, digest.as_bytes()).map_err(|e| {
        fail!(FailureReason::from(e), "signature check failed: {:?}", e)
    })?;
    info!("signature verified with key {}", key);
    Ok(key)
}
