// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Fuzz tests for the anti-rollback record parser.

#![no_main]

use libfuzzer_sys::fuzz_target;

use cr51sign::image::ImageMauv;

fuzz_target!(|data: &[u8]| {
    if let Ok(mauv) = ImageMauv::parse(data) {
        assert_eq!(mauv.encoded_len(), data.len());
        assert!(mauv.does_allow_update(mauv.payload_security_version));

        let mut bytes = Vec::new();
        mauv.write_to(&mut bytes).unwrap();
        assert_eq!(ImageMauv::parse(&bytes), Ok(mauv));
    }
});
