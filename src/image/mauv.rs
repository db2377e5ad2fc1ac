// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Anti-rollback enforcement.
//!
//! An image may carry a *minimum acceptable update version* (MAUV) record in
//! its blob. Once an image carrying such a record has been accepted, the
//! record is persisted, and every later image must carry a record of its own
//! whose security version the persisted record allows.
//!
//! # Wire Format
//!
//! A MAUV record is a blob sub-record with type `"MAUV"`. Its payload is:
//! ```ignore
//! struct ImageMauv {
//!     struct_version: u32, // Always 1.
//!     _: u32,
//!     payload_security_version: u64,
//!     mauv_update_timestamp: u64,
//!     minimum_acceptable_update_version: u64,
//!     denylist_count: u32,
//!     _: u32,
//!     denylist: [u64; self.denylist_count],
//! }
//! ```
//! Blob sub-records are `{ type: u32, size: u32, payload: [u8; size] }`,
//! each starting at a four-byte aligned offset from the blob header.

use arrayvec::ArrayVec;

use crate::hardware::flash::Flash;
use crate::hardware::flash::Region;
use crate::hardware::MauvStorage;
use crate::image::descriptor::SECTION_HEADER_LEN;
use crate::image::FailureReason;
use crate::image::ImageDescriptor;
use crate::image::BLOB_MAGIC;
use crate::io;
use crate::io::Read as _;
use crate::io::Write;

/// The blob sub-record type of a MAUV record, "MAUV".
pub const MAUV_MAGIC: u32 = 0x5655_414d;

/// The only MAUV struct version this crate understands.
pub const STRUCT_VERSION: u32 = 1;

/// The length of a MAUV record with an empty denylist.
pub const BASE_LEN: usize = 40;

/// The size of the storage slot for a MAUV record; no record is larger.
pub const SLOT_LEN: usize = 128;

/// The maximum number of denylist entries that fit in [`SLOT_LEN`].
pub const MAX_DENYLIST: usize = (SLOT_LEN - BASE_LEN) / 8;

/// A reason a MAUV record failed its sanity checks.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum MauvError {
    /// The record was too short, or its length did not match its denylist.
    BadSize,
    /// The record's struct version is not [`STRUCT_VERSION`].
    BadVersion,
    /// The denylist does not fit in [`SLOT_LEN`].
    TooManyEntries,
    /// The record's security version is zero.
    ZeroVersion,
    /// The record does not allow an update to its own security version.
    SelfInconsistent,
}

impl From<io::Error> for MauvError {
    fn from(_: io::Error) -> Self {
        Self::BadSize
    }
}

/// A parsed and sanity-checked MAUV record.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ImageMauv {
    /// The security version of the image carrying this record.
    pub payload_security_version: u64,
    /// When this record was issued; newer records replace older ones.
    pub mauv_update_timestamp: u64,
    /// The oldest security version this record allows.
    pub minimum_acceptable_update_version: u64,
    /// Security versions this record forbids outright.
    pub denylist: ArrayVec<u64, MAX_DENYLIST>,
}

impl ImageMauv {
    /// Parses and sanity-checks a record, which must be exactly `bytes`.
    pub fn parse(bytes: &[u8]) -> Result<Self, MauvError> {
        check!(bytes.len() >= BASE_LEN, MauvError::BadSize);
        let mut r = bytes;
        let version: u32 = r.read_le()?;
        r.skip(4)?;
        let psv: u64 = r.read_le()?;
        let timestamp: u64 = r.read_le()?;
        let min: u64 = r.read_le()?;
        let count: u32 = r.read_le()?;
        r.skip(4)?;

        check!(version == STRUCT_VERSION, MauvError::BadVersion);
        check!(count as usize <= MAX_DENYLIST, MauvError::TooManyEntries);
        check!(
            bytes.len() == BASE_LEN + 8 * count as usize,
            MauvError::BadSize
        );

        let mut denylist = ArrayVec::new();
        for _ in 0..count {
            denylist.push(r.read_le()?);
        }

        let mauv = Self {
            payload_security_version: psv,
            mauv_update_timestamp: timestamp,
            minimum_acceptable_update_version: min,
            denylist,
        };
        check!(psv != 0, MauvError::ZeroVersion);
        check!(mauv.does_allow_update(psv), MauvError::SelfInconsistent);
        Ok(mauv)
    }

    /// Returns whether this record allows moving to an image with security
    /// version `version`.
    pub fn does_allow_update(&self, version: u64) -> bool {
        version >= self.minimum_acceptable_update_version
            && !self.denylist.contains(&version)
    }

    /// Returns the length of this record in wire format.
    pub fn encoded_len(&self) -> usize {
        BASE_LEN + 8 * self.denylist.len()
    }

    /// Writes this record in wire format.
    pub fn write_to<W: Write>(&self, mut w: W) -> Result<(), io::Error> {
        w.write_le(STRUCT_VERSION)?;
        w.write_zeros(4)?;
        w.write_le(self.payload_security_version)?;
        w.write_le(self.mauv_update_timestamp)?;
        w.write_le(self.minimum_acceptable_update_version)?;
        w.write_le(self.denylist.len() as u32)?;
        w.write_zeros(4)?;
        for &v in &self.denylist {
            w.write_le(v)?;
        }
        Ok(())
    }
}

/// Locates the payload of the MAUV sub-record in `desc`'s blob, if any.
pub fn find_mauv<F: Flash + ?Sized>(
    flash: &F,
    desc: &ImageDescriptor,
) -> Result<Option<Region>, FailureReason> {
    let blob = match desc.layout.blob {
        Some(blob) => blob,
        None => return Ok(None),
    };
    check!(blob.len >= SECTION_HEADER_LEN, FailureReason::InvalidDescriptor);

    let mut header = [0; 8];
    flash.read(blob.offset, &mut header)?;
    check!(
        header[..4] == BLOB_MAGIC.to_le_bytes()[..],
        FailureReason::InvalidDescriptor
    );

    // `blob` was bounds-checked when the descriptor was parsed.
    let end = blob.offset + blob.len;
    let mut cursor = blob.offset + SECTION_HEADER_LEN;
    let mut found = None;
    while end - cursor >= 8 {
        flash.read(cursor, &mut header)?;
        let mut r = &header[..];
        let ty: u32 = r.read_le()?;
        let size: u32 = r.read_le()?;

        let payload = Region::new(cursor + 8, size);
        let payload_end = payload
            .end()
            .filter(|&e| e <= end)
            .ok_or_else(|| fail!(FailureReason::InvalidDescriptor))?;
        if ty == MAUV_MAGIC {
            check!(found.is_none(), FailureReason::InvalidDescriptor);
            found = Some(payload);
        }

        // Sub-records are aligned relative to the start of the blob.
        let next = (payload_end - blob.offset).saturating_add(3) & !3;
        cursor = blob.offset.saturating_add(next).min(end);
    }
    Ok(found)
}

/// What [`validate_payload_mauv()`] decided.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum MauvOutcome {
    /// No storage was provided, so nothing was checked.
    Disabled,
    /// Neither the image nor storage had a record.
    NothingToEnforce,
    /// The image was accepted; storage was left untouched.
    Accepted,
    /// The image was accepted, and its record replaced the stored one.
    Stored,
}

fn read_payload<F: Flash + ?Sized>(
    flash: &F,
    region: Region,
    buf: &mut [u8; SLOT_LEN],
) -> Result<ImageMauv, FailureReason> {
    check!(
        region.len as usize <= SLOT_LEN,
        FailureReason::InvalidImageMauvData
    );
    let bytes = &mut buf[..region.len as usize];
    flash.read(region.offset, bytes)?;
    ImageMauv::parse(bytes).map_err(|e| {
        fail!(FailureReason::InvalidImageMauvData, "bad payload MAUV: {:?}", e)
    })
}

fn read_stored(
    storage: &mut dyn MauvStorage,
    buf: &mut [u8; SLOT_LEN],
) -> Result<Option<ImageMauv>, FailureReason> {
    let len = match storage.retrieve(&mut buf[..]) {
        Ok(Some(len)) => len,
        Ok(None) => return Ok(None),
        Err(e) => {
            return Err(fail!(
                FailureReason::RetrievingStoredImageMauvData,
                "could not retrieve stored MAUV: {:?}",
                e
            ))
        }
    };
    check!(len <= SLOT_LEN, FailureReason::StoredImageMauvDataInvalid);
    ImageMauv::parse(&buf[..len]).map(Some).map_err(|e| {
        fail!(
            FailureReason::StoredImageMauvDataInvalid,
            "bad stored MAUV: {:?}",
            e
        )
    })
}

/// Enforces the stored MAUV record against the one carried by `desc`.
///
/// `desc` should already have passed signature validation. If `storage` is
/// `None`, the check is disabled. When the image's record is accepted and is
/// newer than the stored one (or nothing is stored yet), it is persisted,
/// byte-for-byte.
pub fn validate_payload_mauv<F: Flash + ?Sized>(
    flash: &F,
    desc: &ImageDescriptor,
    storage: Option<&mut dyn MauvStorage>,
) -> Result<MauvOutcome, FailureReason> {
    let storage = match storage {
        Some(s) => s,
        None => {
            info!("no MAUV storage; skipping anti-rollback check");
            return Ok(MauvOutcome::Disabled);
        }
    };

    let mut payload_buf = [0; SLOT_LEN];
    let payload = match find_mauv(flash, desc)? {
        Some(region) => Some((
            read_payload(flash, region, &mut payload_buf)?,
            region.len as usize,
        )),
        None => None,
    };

    let mut stored_buf = [0; SLOT_LEN];
    let stored = read_stored(storage, &mut stored_buf)?;

    let (payload, payload_len) = match (stored, payload) {
        (None, None) => return Ok(MauvOutcome::NothingToEnforce),
        (Some(_), None) => {
            return Err(fail!(
                FailureReason::StoredImageMauvExpectsPayloadImageMauv
            ))
        }
        (None, Some(payload)) => payload,
        (Some(stored), Some((payload, len))) => {
            let version = payload.payload_security_version;
            check!(
                stored.does_allow_update(version),
                FailureReason::StoredImageMauvDoesNotAllowUpdateToPayload
            );
            if payload.mauv_update_timestamp <= stored.mauv_update_timestamp {
                trace!("payload MAUV is not newer; keeping stored record");
                return Ok(MauvOutcome::Accepted);
            }
            (payload, len)
        }
    };

    storage.store(&payload_buf[..payload_len]).map_err(|e| {
        fail!(
            FailureReason::StoringNewImageMauvData,
            "could not store MAUV: {:?}",
            e
        )
    })?;
    info!(
        "stored new MAUV: version {}, minimum {}",
        payload.payload_security_version,
        payload.minimum_acceptable_update_version
    );
    Ok(MauvOutcome::Stored)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::hardware::fake;
    use crate::hardware::flash::Ram;
    use crate::image::owned;
    use crate::image::testing;
    use pretty_assertions::assert_eq;

    fn record(psv: u64, timestamp: u64, min: u64, denylist: &[u64]) -> Vec<u8> {
        let mauv = ImageMauv {
            payload_security_version: psv,
            mauv_update_timestamp: timestamp,
            minimum_acceptable_update_version: min,
            denylist: denylist.iter().copied().collect(),
        };
        let mut bytes = Vec::new();
        mauv.write_to(&mut bytes).unwrap();
        bytes
    }

    fn image_with(mauv: Option<owned::Mauv>) -> Vec<u8> {
        let mut layout = testing::layout();
        layout.mauv = mauv;
        testing::build(&layout)
    }

    fn check(
        image: &[u8],
        storage: &mut fake::MauvStorage,
    ) -> Result<MauvOutcome, FailureReason> {
        let flash = Ram(image);
        let desc = ImageDescriptor::parse(
            &flash,
            testing::DESCRIPTOR_OFFSET,
            0..image.len() as u32,
            &fake::Platform::dev(),
        )?;
        let storage: &mut dyn MauvStorage = storage;
        validate_payload_mauv(&flash, &desc, Some(storage))
    }

    #[test]
    fn parse_round_trip() {
        let bytes = record(10, 100, 5, &[7, 8]);
        assert_eq!(bytes.len(), BASE_LEN + 16);
        let mauv = ImageMauv::parse(&bytes).unwrap();
        assert_eq!(mauv.payload_security_version, 10);
        assert_eq!(&mauv.denylist[..], &[7, 8]);
        assert_eq!(mauv.encoded_len(), bytes.len());
    }

    #[test]
    fn sanity_checks() {
        let good = record(10, 100, 5, &[7]);

        assert_eq!(ImageMauv::parse(&good[..39]), Err(MauvError::BadSize));
        assert_eq!(
            ImageMauv::parse(&good[..BASE_LEN]),
            Err(MauvError::BadSize)
        );

        let mut bad = good.clone();
        bad[0] = 2;
        assert_eq!(ImageMauv::parse(&bad), Err(MauvError::BadVersion));

        let mut bad = good.clone();
        bad[32] = 12;
        assert_eq!(ImageMauv::parse(&bad), Err(MauvError::TooManyEntries));

        assert_eq!(
            ImageMauv::parse(&record(0, 1, 0, &[])),
            Err(MauvError::ZeroVersion)
        );
        assert_eq!(
            ImageMauv::parse(&record(4, 1, 5, &[])),
            Err(MauvError::SelfInconsistent)
        );
        assert_eq!(
            ImageMauv::parse(&record(7, 1, 5, &[7])),
            Err(MauvError::SelfInconsistent)
        );

        let full = record(20, 1, 0, &[1; MAX_DENYLIST]);
        assert_eq!(full.len(), SLOT_LEN);
        let mauv = ImageMauv::parse(&full).unwrap();
        assert_eq!(mauv.encoded_len(), SLOT_LEN);
        let empty = ImageMauv::parse(&record(3, 1, 0, &[])).unwrap();
        assert_eq!(empty.encoded_len(), BASE_LEN);
    }

    #[test]
    fn does_allow_update() {
        let denylist = [3, 9, 12];
        for min in 0..8 {
            let bytes = record(20, 1, min, &denylist);
            let mauv = ImageMauv::parse(&bytes).unwrap();
            for v in 0..24 {
                let expected = v >= min && !denylist.contains(&v);
                assert_eq!(
                    mauv.does_allow_update(v),
                    expected,
                    "min {}, v {}",
                    min,
                    v
                );
            }
            assert!(mauv.does_allow_update(mauv.payload_security_version));
        }
    }

    #[test]
    fn find_in_blob() {
        let image = image_with(Some(testing::mauv(5, 1, 0)));
        let flash = Ram(&image[..]);
        let desc = ImageDescriptor::parse(
            &flash,
            testing::DESCRIPTOR_OFFSET,
            0..image.len() as u32,
            &fake::Platform::dev(),
        )
        .unwrap();
        let region = find_mauv(&flash, &desc).unwrap().unwrap();
        assert_eq!(region.len as usize, BASE_LEN);

        let no_blob = image_with(None);
        let flash = Ram(&no_blob[..]);
        let desc = ImageDescriptor::parse(
            &flash,
            testing::DESCRIPTOR_OFFSET,
            0..no_blob.len() as u32,
            &fake::Platform::dev(),
        )
        .unwrap();
        assert_eq!(find_mauv(&flash, &desc), Ok(None));
    }

    #[test]
    fn duplicate_and_overrun_records() {
        let mut layout = testing::layout();
        layout.mauv = Some(testing::mauv(5, 1, 0));
        layout.blob_records.push(owned::BlobRecord {
            ty: MAUV_MAGIC,
            payload: record(6, 2, 0, &[]),
        });
        let dup = testing::build(&layout);
        let mut storage = fake::MauvStorage::empty();
        assert_eq!(
            check(&dup, &mut storage),
            Err(FailureReason::InvalidDescriptor)
        );

        let mut layout = testing::layout();
        layout.blob_records.push(owned::BlobRecord {
            ty: 0x1234_5678,
            payload: vec![0xaa; 10],
        });
        layout.mauv = Some(testing::mauv(5, 1, 0));
        let image = testing::build(&layout);
        assert_eq!(check(&image, &mut storage), Ok(MauvOutcome::Stored));

        // Inflate the first sub-record's size past the end of the blob.
        let flash = Ram(&image[..]);
        let desc = ImageDescriptor::parse(
            &flash,
            testing::DESCRIPTOR_OFFSET,
            0..image.len() as u32,
            &fake::Platform::dev(),
        )
        .unwrap();
        let size_at = desc.layout.blob.unwrap().offset as usize + 12;
        let mut bad = image.clone();
        bad[size_at..size_at + 4].copy_from_slice(&0x1000u32.to_le_bytes());
        assert_eq!(
            find_mauv(&Ram(&bad[..]), &desc),
            Err(FailureReason::InvalidDescriptor)
        );
    }

    #[test]
    fn disabled_without_storage() {
        let image = image_with(Some(testing::mauv(5, 1, 0)));
        let flash = Ram(&image[..]);
        let desc = ImageDescriptor::parse(
            &flash,
            testing::DESCRIPTOR_OFFSET,
            0..image.len() as u32,
            &fake::Platform::dev(),
        )
        .unwrap();
        assert_eq!(
            validate_payload_mauv(&flash, &desc, None),
            Ok(MauvOutcome::Disabled)
        );
    }

    #[test]
    fn decision_table() {
        let without = image_with(None);
        let with = image_with(Some(testing::mauv(5, 10, 3)));

        // Neither.
        let mut storage = fake::MauvStorage::empty();
        assert_eq!(
            check(&without, &mut storage),
            Ok(MauvOutcome::NothingToEnforce)
        );
        assert_eq!(storage.stores, 0);

        // Payload only: stored.
        assert_eq!(check(&with, &mut storage), Ok(MauvOutcome::Stored));
        assert_eq!(storage.record, Some(record(5, 10, 3, &[])));

        // Revalidating the same image changes nothing.
        assert_eq!(check(&with, &mut storage), Ok(MauvOutcome::Accepted));
        assert_eq!(storage.stores, 1);

        // Stored only.
        assert_eq!(
            check(&without, &mut storage),
            Err(FailureReason::StoredImageMauvExpectsPayloadImageMauv)
        );

        // Both; too old.
        let mut storage = fake::MauvStorage::with(&record(9, 10, 6, &[]));
        assert_eq!(
            check(&with, &mut storage),
            Err(FailureReason::StoredImageMauvDoesNotAllowUpdateToPayload)
        );

        // Both; denylisted.
        let mut storage = fake::MauvStorage::with(&record(9, 10, 0, &[5]));
        assert_eq!(
            check(&with, &mut storage),
            Err(FailureReason::StoredImageMauvDoesNotAllowUpdateToPayload)
        );

        // Both; allowed and newer.
        let mut storage = fake::MauvStorage::with(&record(4, 9, 4, &[]));
        assert_eq!(check(&with, &mut storage), Ok(MauvOutcome::Stored));
        assert_eq!(storage.record, Some(record(5, 10, 3, &[])));

        // Both; allowed but older, so the stored record is kept.
        let mut storage = fake::MauvStorage::with(&record(4, 11, 4, &[]));
        assert_eq!(check(&with, &mut storage), Ok(MauvOutcome::Accepted));
        assert_eq!(storage.record, Some(record(4, 11, 4, &[])));
        assert_eq!(storage.stores, 0);
    }

    #[test]
    fn storage_failures() {
        let with = image_with(Some(testing::mauv(5, 10, 3)));

        let mut storage = fake::MauvStorage {
            fail_retrieve: true,
            ..fake::MauvStorage::empty()
        };
        assert_eq!(
            check(&with, &mut storage),
            Err(FailureReason::RetrievingStoredImageMauvData)
        );

        let mut storage = fake::MauvStorage {
            fail_store: true,
            ..fake::MauvStorage::empty()
        };
        assert_eq!(
            check(&with, &mut storage),
            Err(FailureReason::StoringNewImageMauvData)
        );

        let mut storage = fake::MauvStorage::with(&[0; SLOT_LEN + 1]);
        assert_eq!(
            check(&with, &mut storage),
            Err(FailureReason::StoredImageMauvDataInvalid)
        );

        let mut storage = fake::MauvStorage::with(&record(0, 1, 0, &[]));
        assert_eq!(
            check(&with, &mut storage),
            Err(FailureReason::StoredImageMauvDataInvalid)
        );
    }

    #[test]
    fn invalid_payload() {
        let mut layout = testing::layout();
        layout.blob_records.push(owned::BlobRecord {
            ty: MAUV_MAGIC,
            payload: record(0, 1, 0, &[]),
        });
        let image = testing::build(&layout);
        let mut storage = fake::MauvStorage::empty();
        assert_eq!(
            check(&image, &mut storage),
            Err(FailureReason::InvalidImageMauvData)
        );

        let mut layout = testing::layout();
        layout.blob_records.push(owned::BlobRecord {
            ty: MAUV_MAGIC,
            payload: vec![0; SLOT_LEN + 8],
        });
        let image = testing::build(&layout);
        assert_eq!(
            check(&image, &mut storage),
            Err(FailureReason::InvalidImageMauvData)
        );
    }
}
