// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Fuzz tests for image validation, with signature checks disabled so that
//! the region and anti-rollback logic is reachable.

#![no_main]

use libfuzzer_sys::fuzz_target;

use cr51sign::crypto::ring;
use cr51sign::crypto::sig;
use cr51sign::hardware::flash::Ram;
use cr51sign::hardware::MauvStorage;
use cr51sign::hardware::Platform;
use cr51sign::hardware::StorageError;
use cr51sign::image::ValidatedRegions;
use cr51sign::image::ValidationContext;

/// A `Verify` that blindly accepts all signatures.
struct NoVerify;

impl sig::Verify for NoVerify {
    fn verify(
        &mut self,
        _: &sig::Block,
        _: &[u8],
    ) -> Result<usize, sig::Error> {
        Ok(0)
    }
}

/// A development-mode platform.
struct Dev;

impl Platform for Dev {
    fn is_production_mode(&self) -> Option<bool> {
        Some(false)
    }
}

/// Storage that starts out empty and remembers one record.
#[derive(Default)]
struct Scratch(Option<Vec<u8>>);

impl MauvStorage for Scratch {
    fn retrieve(
        &mut self,
        buf: &mut [u8],
    ) -> Result<Option<usize>, StorageError> {
        Ok(self.0.as_ref().map(|r| {
            let len = r.len().min(buf.len());
            buf[..len].copy_from_slice(&r[..len]);
            r.len()
        }))
    }

    fn store(&mut self, record: &[u8]) -> Result<(), StorageError> {
        self.0 = Some(record.to_vec());
        Ok(())
    }
}

fuzz_target!(|data: &[u8]| {
    let flash = Ram(data);
    let mut ctx = ValidationContext::new(0, data.len() as u32);
    let mut regions = ValidatedRegions::<16>::new();
    let result = ctx.validate(
        &flash,
        &Dev,
        &mut ring::hash::Engine::new(),
        &mut NoVerify,
        &mut regions,
    );
    if result.is_err() {
        assert!(regions.is_empty());
        return;
    }

    let mut scratch = Scratch::default();
    let storage: &mut dyn MauvStorage = &mut scratch;
    let _ = ctx.validate_mauv(&flash, Some(&mut *storage));
    let _ = ctx.validate_mauv(&flash, Some(&mut *storage));
});
