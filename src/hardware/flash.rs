// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! External, remote flash abstraction.
//!
//! This module provides the [`Flash`] trait, which represents a read-only
//! *abstract flash device*: a region of memory that can be read at arbitrary
//! offsets. Such a "device" can range from a simple Rust slice to a remote
//! SPI flash device.

use core::convert::TryInto;

use static_assertions::assert_obj_safe;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::crypto::hash;

/// A [`Flash`] error.
///
/// All of these errors are non-retryable; a [`Flash`] implementation should
/// block until the operation succeeds.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// Indicates that an operation failed because the requested
    /// operation was outside of the device's address space.
    OutOfRange,

    /// Indicates that feeding flash contents into a hash engine failed.
    Hash(hash::Error),

    /// Indicates that an unspecified error occured.
    Unspecified,
}

impl From<hash::Error> for Error {
    fn from(e: hash::Error) -> Self {
        Self::Hash(e)
    }
}

/// Provides read access to a flash-like storage device.
///
/// It is the implementation's responsibility to implement these operations
/// efficiently with respect to the underlying device.
pub trait Flash {
    /// Returns the size, in bytes, of this device.
    fn size(&self) -> Result<u32, Error>;

    /// Attempts to read `out.len()` bytes starting at `offset`.
    fn read(&self, offset: u32, out: &mut [u8]) -> Result<(), Error>;

    /// Feeds the contents of `region` into an in-progress hashing operation.
    ///
    /// The default implementation reads `region` in small chunks; devices
    /// that can hash without copying, or that have a hash engine wired to
    /// their read path, should override it.
    fn hash_range(
        &self,
        region: Region,
        engine: &mut dyn hash::Engine,
    ) -> Result<(), Error> {
        let mut buf = [0; 256];
        let end = region.end().ok_or(Error::OutOfRange)?;
        let mut offset = region.offset;
        while offset < end {
            let chunk = ((end - offset) as usize).min(buf.len());
            self.read(offset, &mut buf[..chunk])?;
            engine.write_raw(&buf[..chunk])?;
            offset += chunk as u32;
        }
        Ok(())
    }
}
assert_obj_safe!(Flash);

impl<F: Flash + ?Sized> Flash for &F {
    #[inline]
    fn size(&self) -> Result<u32, Error> {
        F::size(self)
    }

    #[inline]
    fn read(&self, offset: u32, out: &mut [u8]) -> Result<(), Error> {
        F::read(self, offset, out)
    }

    #[inline]
    fn hash_range(
        &self,
        region: Region,
        engine: &mut dyn hash::Engine,
    ) -> Result<(), Error> {
        F::hash_range(self, region, engine)
    }
}

/// Adapter for converting RAM-backed storage into a [`Flash`].
///
/// For the purposes of this type, "RAM-backed" means that `AsRef<[u8]>`
/// is implemented.
#[derive(Copy, Clone)]
pub struct Ram<Bytes>(pub Bytes);

impl<Bytes: AsRef<[u8]>> Ram<Bytes> {
    fn slice(&self, region: Region) -> Result<&[u8], Error> {
        let start = region.offset as usize;
        let end = region.end().ok_or(Error::OutOfRange)? as usize;
        self.0.as_ref().get(start..end).ok_or(Error::OutOfRange)
    }
}

impl<Bytes: AsRef<[u8]>> Flash for Ram<Bytes> {
    fn size(&self) -> Result<u32, Error> {
        self.0
            .as_ref()
            .len()
            .try_into()
            .map_err(|_| Error::Unspecified)
    }

    #[inline]
    fn read(&self, offset: u32, out: &mut [u8]) -> Result<(), Error> {
        let len = out.len().try_into().map_err(|_| Error::OutOfRange)?;
        out.copy_from_slice(self.slice(Region::new(offset, len))?);
        Ok(())
    }

    fn hash_range(
        &self,
        region: Region,
        engine: &mut dyn hash::Engine,
    ) -> Result<(), Error> {
        engine.write_raw(self.slice(region)?)?;
        Ok(())
    }
}

/// A region within a [`Flash`] type.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Region {
    /// The offset of the first byte of this region.
    pub offset: u32,
    /// The length of the region, in bytes.
    pub len: u32,
}

impl Region {
    /// Convenience method for creating a `Region` without having to use
    /// a struct literal.
    pub const fn new(offset: u32, len: u32) -> Self {
        Self { offset, len }
    }

    /// Returns the offset one past the last byte of this region, or `None`
    /// if that would overflow.
    pub fn end(self) -> Option<u32> {
        self.offset.checked_add(self.len)
    }

    /// Returns whether `offset` falls within this region.
    pub fn contains(self, offset: u32) -> bool {
        offset >= self.offset && (offset - self.offset) < self.len
    }
}
