// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Key material intended only for testing.

/// Test-only RSA-2048 keypair, as PKCS#8.
#[rustfmt::skip]
pub const RSA_2048_PKCS8: &[u8] = include_bytes!("keys/rsa_2048.pk8");
/// Public half of [`RSA_2048_PKCS8`], as a DER `SubjectPublicKeyInfo`.
#[rustfmt::skip]
pub const RSA_2048_PUBLIC: &[u8] = include_bytes!("keys/rsa_2048.pub.der");

/// Test-only RSA-3072 keypair, as PKCS#8.
#[rustfmt::skip]
pub const RSA_3072_PKCS8: &[u8] = include_bytes!("keys/rsa_3072.pk8");
/// Public half of [`RSA_3072_PKCS8`], as a DER `SubjectPublicKeyInfo`.
#[rustfmt::skip]
pub const RSA_3072_PUBLIC: &[u8] = include_bytes!("keys/rsa_3072.pub.der");

/// Test-only RSA-4096 keypair, as PKCS#8.
#[rustfmt::skip]
pub const RSA_4096_PKCS8: &[u8] = include_bytes!("keys/rsa_4096.pk8");
/// Public half of [`RSA_4096_PKCS8`], as a DER `SubjectPublicKeyInfo`.
#[rustfmt::skip]
pub const RSA_4096_PUBLIC: &[u8] = include_bytes!("keys/rsa_4096.pub.der");
