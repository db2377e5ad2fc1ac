// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Pluggable hardware functionality
//!
//! This module provides traits for plugging in platform-specific behavior:
//! reading the image out of flash, answering policy questions about the
//! device's lifecycle state, and persisting the anti-rollback record between
//! boots. `cr51sign` consults these while validating an image.

pub mod flash;

/// Platform policy hooks consulted during validation.
///
/// Every hook is optional: returning `None` means the platform does not
/// provide it. What a missing hook means depends on the hook; see each
/// function's documentation.
pub trait Platform {
    /// Returns whether the device is in production mode.
    ///
    /// This hook is mandatory for validating a signed image; if it is
    /// absent, validation fails with `InvalidInterface`.
    fn is_production_mode(&self) -> Option<bool> {
        None
    }

    /// Returns whether a device in production mode may accept a `Dev` image.
    ///
    /// Only consulted when a production device is offered a `Dev` image; if
    /// it is absent at that point, validation fails with `InvalidInterface`.
    fn prod_to_dev_downgrade_allowed(&self) -> Option<bool> {
        None
    }

    /// Returns whether `image_size` is acceptable for this platform.
    ///
    /// If absent, the image size must exactly match the size of the range
    /// being validated.
    fn image_size_valid(&self, image_size: u32) -> Option<bool> {
        let _ = image_size;
        None
    }
}
impl dyn Platform {} // Ensure object-safe.

/// A [`MauvStorage`] error.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StorageError {
    /// Indicates that the underlying storage could not be accessed.
    Io,

    /// Indicates that an unspecified error occured.
    Unspecified,
}

/// Persistent storage for the anti-rollback record.
///
/// The record is opaque to implementations: they only need to hand back the
/// exact bytes most recently stored.
pub trait MauvStorage {
    /// Retrieves the stored record into `buf`, which is as large as the
    /// largest record that can be stored.
    ///
    /// Returns the record's length, or `None` if nothing has been stored yet.
    /// The returned length is not trusted; a length larger than `buf` is
    /// treated as a corrupt record.
    fn retrieve(
        &mut self,
        buf: &mut [u8],
    ) -> Result<Option<usize>, StorageError>;

    /// Replaces the stored record with `record`.
    fn store(&mut self, record: &[u8]) -> Result<(), StorageError>;
}
impl dyn MauvStorage {} // Ensure object-safe.

#[cfg(test)]
pub(crate) mod fake {
    use super::StorageError;

    /// A fake `Platform` that returns fixed values.
    #[derive(Copy, Clone, Default)]
    pub struct Platform {
        pub production: Option<bool>,
        pub downgrade: Option<bool>,
        pub size_valid: Option<bool>,
    }

    impl Platform {
        /// Creates a development-mode `fake::Platform` that only provides
        /// `is_production_mode()`.
        pub fn dev() -> Self {
            Self {
                production: Some(false),
                ..Self::default()
            }
        }

        /// Creates a production-mode `fake::Platform` that refuses
        /// downgrades.
        pub fn prod() -> Self {
            Self {
                production: Some(true),
                downgrade: Some(false),
                ..Self::default()
            }
        }
    }

    impl super::Platform for Platform {
        fn is_production_mode(&self) -> Option<bool> {
            self.production
        }

        fn prod_to_dev_downgrade_allowed(&self) -> Option<bool> {
            self.downgrade
        }

        fn image_size_valid(&self, _: u32) -> Option<bool> {
            self.size_valid
        }
    }

    /// A fake `MauvStorage` backed by a `Vec`, which can be told to fail.
    #[derive(Clone, Default)]
    pub struct MauvStorage {
        pub record: Option<Vec<u8>>,
        pub fail_retrieve: bool,
        pub fail_store: bool,
        pub stores: usize,
    }

    impl MauvStorage {
        /// Creates a new `fake::MauvStorage` with nothing stored.
        pub fn empty() -> Self {
            Self::default()
        }

        /// Creates a new `fake::MauvStorage` holding `record`.
        pub fn with(record: &[u8]) -> Self {
            Self {
                record: Some(record.to_vec()),
                ..Self::default()
            }
        }
    }

    impl super::MauvStorage for MauvStorage {
        fn retrieve(
            &mut self,
            buf: &mut [u8],
        ) -> Result<Option<usize>, StorageError> {
            if self.fail_retrieve {
                return Err(StorageError::Io);
            }
            let record = match &self.record {
                Some(r) => r,
                None => return Ok(None),
            };
            let n = record.len().min(buf.len());
            buf[..n].copy_from_slice(&record[..n]);
            Ok(Some(record.len()))
        }

        fn store(&mut self, record: &[u8]) -> Result<(), StorageError> {
            if self.fail_store {
                return Err(StorageError::Io);
            }
            self.record = Some(record.to_vec());
            self.stores += 1;
            Ok(())
        }
    }
}
