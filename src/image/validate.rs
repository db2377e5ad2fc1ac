// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! The validation entry-point.
//!
//! [`ValidationContext::validate()`] scans a range of flash for descriptor
//! candidates and runs each through descriptor, policy, signature, and
//! region validation until one passes.

use crate::crypto::hash;
use crate::crypto::sig;
use crate::hardware::flash::Flash;
use crate::hardware::MauvStorage;
use crate::hardware::Platform;
use crate::image::mauv;
use crate::image::policy;
use crate::image::region;
use crate::image::scan::scan;
use crate::image::signature;
use crate::image::FailureReason;
use crate::image::ImageDescriptor;
use crate::image::ImageType;
use crate::image::MauvOutcome;
use crate::image::Tier;
use crate::image::ValidatedRegions;
use crate::image::DEFAULT_DESCRIPTOR_ALIGNMENT;
use crate::image::DESCRIPTOR_MAGIC;

/// The result of the most recent call to [`ValidationContext::validate()`].
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ValidationState {
    /// `validate()` has not been called.
    Unvalidated,
    /// The image is valid.
    Valid,
    /// The image was rejected.
    Failed(FailureReason),
}

/// Configuration and results for validating one image.
///
/// The configuration (the range to validate, and what the running firmware
/// is) is set when the context is built. The results are reset by every
/// call to [`ValidationContext::validate()`].
#[derive(Clone, Debug)]
pub struct ValidationContext {
    start_offset: u32,
    end_offset: u32,
    descriptor_alignment: u32,
    image_family: u32,
    current_image_type: Option<ImageType>,

    state: ValidationState,
    valid_key: Option<usize>,
    descriptor: Option<ImageDescriptor>,
}

impl ValidationContext {
    /// Creates a context for the image occupying `[start_offset, end_offset)`.
    pub fn new(start_offset: u32, end_offset: u32) -> Self {
        Self {
            start_offset,
            end_offset,
            descriptor_alignment: DEFAULT_DESCRIPTOR_ALIGNMENT,
            image_family: 0,
            current_image_type: None,
            state: ValidationState::Unvalidated,
            valid_key: None,
            descriptor: None,
        }
    }

    /// Sets the alignment at which descriptors are searched for.
    pub fn with_descriptor_alignment(mut self, alignment: u32) -> Self {
        self.descriptor_alignment = alignment;
        self
    }

    /// Sets the family of the running image. Zero accepts any family.
    pub fn with_image_family(mut self, family: u32) -> Self {
        self.image_family = family;
        self
    }

    /// Sets the type of the running image.
    pub fn with_current_image_type(mut self, ty: ImageType) -> Self {
        self.current_image_type = Some(ty);
        self
    }

    /// Returns the absolute offset of the start of the image.
    pub fn start_offset(&self) -> u32 {
        self.start_offset
    }

    /// Returns the absolute offset of the end of the image.
    pub fn end_offset(&self) -> u32 {
        self.end_offset
    }

    /// Returns the result of the last validation.
    pub fn state(&self) -> ValidationState {
        self.state
    }

    /// Returns the index of the key that validated the image, if it is
    /// valid.
    pub fn valid_key(&self) -> Option<usize> {
        self.valid_key
    }

    /// Returns the descriptor of the image, if it is valid.
    pub fn descriptor(&self) -> Option<&ImageDescriptor> {
        self.descriptor.as_ref()
    }

    /// Validates the image.
    ///
    /// On success, the context records the descriptor and the key that
    /// validated it, and `regions` holds the image's region table.
    ///
    /// If a candidate descriptor is structurally unsound, the search moves on
    /// to the next candidate; if every candidate is, the first structural
    /// failure is returned. Any other failure ends the search immediately.
    pub fn validate<F: Flash + ?Sized, const N: usize>(
        &mut self,
        flash: &F,
        platform: &dyn Platform,
        engine: &mut dyn hash::Engine,
        verifier: &mut dyn sig::Verify,
        regions: &mut ValidatedRegions<N>,
    ) -> Result<(), FailureReason> {
        self.state = ValidationState::Unvalidated;
        self.valid_key = None;
        self.descriptor = None;
        regions.clear();

        let result = self.search(flash, platform, engine, verifier, regions);
        self.state = match result {
            Ok(()) => ValidationState::Valid,
            Err(e) => {
                warn!("image rejected: {}", e);
                ValidationState::Failed(e)
            }
        };
        result
    }

    fn check_context<F: Flash + ?Sized>(
        &self,
        flash: &F,
    ) -> Result<(), FailureReason> {
        check!(
            self.start_offset < self.end_offset,
            FailureReason::InvalidContext
        );
        check!(
            self.descriptor_alignment.is_power_of_two(),
            FailureReason::InvalidContext
        );
        check!(
            self.end_offset <= flash.size()?,
            FailureReason::InvalidContext
        );
        Ok(())
    }

    fn search<F: Flash + ?Sized, const N: usize>(
        &mut self,
        flash: &F,
        platform: &dyn Platform,
        engine: &mut dyn hash::Engine,
        verifier: &mut dyn sig::Verify,
        regions: &mut ValidatedRegions<N>,
    ) -> Result<(), FailureReason> {
        self.check_context(flash)?;

        let bounds = self.start_offset..self.end_offset;
        let mut floor = self.start_offset;
        let mut first_failure = None;
        while floor < self.end_offset {
            let at = match scan(
                flash,
                floor..self.end_offset,
                self.descriptor_alignment,
                DESCRIPTOR_MAGIC,
                bounds.clone(),
            ) {
                Ok(at) => at,
                Err(FailureReason::FailedToLocateMagic) => break,
                Err(e) => return Err(e),
            };

            match self.validate_candidate(
                flash,
                at,
                platform,
                engine,
                verifier,
                regions,
            ) {
                Ok((desc, key)) => {
                    info!("image at {:#x} is valid", at);
                    self.descriptor = Some(desc);
                    self.valid_key = Some(key);
                    return Ok(());
                }
                Err(e) if e.tier() == Tier::Structural => {
                    info!("skipping candidate at {:#x}: {}", at, e);
                    first_failure.get_or_insert(e);
                }
                Err(e) => return Err(e),
            }

            floor = match at.checked_add(self.descriptor_alignment) {
                Some(x) => x,
                None => break,
            };
        }

        Err(first_failure.unwrap_or(FailureReason::FailedToLocateMagic))
    }

    fn validate_candidate<F: Flash + ?Sized, const N: usize>(
        &self,
        flash: &F,
        at: u32,
        platform: &dyn Platform,
        engine: &mut dyn hash::Engine,
        verifier: &mut dyn sig::Verify,
        regions: &mut ValidatedRegions<N>,
    ) -> Result<(ImageDescriptor, usize), FailureReason> {
        let bounds = self.start_offset..self.end_offset;
        let desc = ImageDescriptor::parse(flash, at, bounds, platform)?;
        policy::check_transition(
            flash,
            &desc,
            self.image_family,
            self.current_image_type,
            platform,
        )?;
        let key = signature::verify_signature(flash, &desc, engine, verifier)?;
        region::validate_regions(
            flash,
            &desc,
            self.start_offset,
            self.end_offset,
            engine,
            regions,
        )?;
        Ok((desc, key))
    }

    /// Enforces anti-rollback for the validated image.
    ///
    /// This is a separate step from [`ValidationContext::validate()`], and
    /// must follow a successful call to it; otherwise, returns
    /// `InvalidContext`. See [`mauv::validate_payload_mauv()`].
    pub fn validate_mauv<F: Flash + ?Sized>(
        &self,
        flash: &F,
        storage: Option<&mut dyn MauvStorage>,
    ) -> Result<MauvOutcome, FailureReason> {
        let desc = match (&self.state, &self.descriptor) {
            (ValidationState::Valid, Some(desc)) => desc,
            _ => return Err(fail!(FailureReason::InvalidContext)),
        };
        mauv::validate_payload_mauv(flash, desc, storage)
    }
}
