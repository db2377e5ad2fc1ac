// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! Image signing and validation commands.

use std::fs;
use std::io::Read;
use std::io::Write;
use std::path::PathBuf;

use cr51sign::crypto::openssl;
use cr51sign::crypto::ring;
use cr51sign::hardware::flash::Ram;
use cr51sign::hardware::MauvStorage;
use cr51sign::hardware::Platform;
use cr51sign::hardware::StorageError;
use cr51sign::image::owned;
use cr51sign::image::ImageType;
use cr51sign::image::ValidatedRegions;
use cr51sign::image::ValidationContext;

/// A CLI interface for building and checking signed images.
#[derive(structopt::StructOpt)]
#[structopt(author)]
pub enum Image {
    /// Create a new signed image from a JSON layout and a payload.
    SignImage {
        /// PKCS#8-encoded RSA signing key to sign with.
        #[structopt(long, parse(from_os_str))]
        key: PathBuf,

        /// JSON image layout.
        #[structopt(long, parse(from_os_str))]
        layout: PathBuf,

        /// Payload file, defaults to stdin.
        #[structopt(short = "i", long, parse(from_os_str))]
        input: Option<PathBuf>,

        /// Output file, defaults to stdout.
        #[structopt(short = "o", long, parse(from_os_str))]
        output: Option<PathBuf>,
    },

    /// Validate a signed image.
    ///
    /// The process exits with the numeric failure reason if the image is
    /// rejected.
    ValidateImage {
        /// Trusted RSA public keys, as DER `SubjectPublicKeyInfo` or PKCS#8
        /// keypairs. The first key has index 0.
        #[structopt(long = "key", parse(from_os_str))]
        keys: Vec<PathBuf>,

        /// Start of the image within the input.
        #[structopt(long, default_value = "0")]
        start: u32,

        /// End of the image within the input; defaults to the input length.
        #[structopt(long)]
        end: Option<u32>,

        /// Alignment of descriptor candidates; defaults to 64.
        #[structopt(long)]
        alignment: Option<u32>,

        /// The family of the currently running image.
        #[structopt(long, default_value = "0")]
        family: u32,

        /// The type of the currently running image, if any.
        #[structopt(long)]
        current_type: Option<ImageType>,

        /// Whether the platform is in production mode.
        #[structopt(long)]
        production: Option<bool>,

        /// Whether the platform allows installing a dev image in
        /// production mode.
        #[structopt(long)]
        allow_dev_downgrade: Option<bool>,

        /// File holding the persisted anti-rollback record. If present, the
        /// image's record is checked against it and may replace it.
        #[structopt(long, parse(from_os_str))]
        mauv_state: Option<PathBuf>,

        /// Input file, defaults to stdin.
        #[structopt(short = "i", long, parse(from_os_str))]
        input: Option<PathBuf>,

        /// Output file for the JSON report, defaults to stdout.
        #[structopt(short = "o", long, parse(from_os_str))]
        output: Option<PathBuf>,
    },
}

/// Platform policy as given on the command line.
struct CliPlatform {
    production: Option<bool>,
    allow_dev_downgrade: Option<bool>,
}

impl Platform for CliPlatform {
    fn is_production_mode(&self) -> Option<bool> {
        self.production
    }

    fn prod_to_dev_downgrade_allowed(&self) -> Option<bool> {
        self.allow_dev_downgrade
    }
}

/// A [`MauvStorage`] backed by a file; a missing file means nothing has
/// been stored.
struct FileStorage(PathBuf);

impl MauvStorage for FileStorage {
    fn retrieve(
        &mut self,
        buf: &mut [u8],
    ) -> Result<Option<usize>, StorageError> {
        let bytes = match fs::read(&self.0) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(None)
            }
            Err(_) => return Err(StorageError::Io),
        };
        let len = bytes.len().min(buf.len());
        buf[..len].copy_from_slice(&bytes[..len]);
        Ok(Some(bytes.len()))
    }

    fn store(&mut self, record: &[u8]) -> Result<(), StorageError> {
        fs::write(&self.0, record).map_err(|_| StorageError::Io)
    }
}

fn load_key(bytes: &[u8]) -> Option<openssl::PublicKey> {
    if let Ok(key) = openssl::PublicKey::from_der(bytes) {
        return Some(key);
    }
    openssl::Signer::from_pkcs8(bytes)
        .and_then(|s| s.public_key())
        .ok()
}

impl Image {
    pub fn run(self) {
        match self {
            Self::SignImage {
                key,
                layout,
                input,
                output,
            } => {
                let (mut r, mut w) =
                    crate::util::stdio(input.as_deref(), output.as_deref());

                let key = check!(fs::read(key), "failed to open key");
                let mut signer = check!(
                    openssl::Signer::from_pkcs8(&key),
                    "failed to parse key"
                );
                let layout = check!(fs::read(layout), "failed to open layout");
                let layout: owned::Image = check!(
                    serde_json::from_slice(&layout),
                    "failed to parse layout"
                );

                let mut payload = Vec::new();
                check!(r.read_to_end(&mut payload), "failed to read payload");
                let image = check!(
                    layout.build(
                        &payload,
                        &mut ring::hash::Engine::new(),
                        &mut signer
                    ),
                    "failed to build image"
                );
                check!(w.write_all(&image), "failed to write image");
            }

            Self::ValidateImage {
                keys,
                start,
                end,
                alignment,
                family,
                current_type,
                production,
                allow_dev_downgrade,
                mauv_state,
                input,
                output,
            } => {
                let (mut r, w) =
                    crate::util::stdio(input.as_deref(), output.as_deref());

                let mut keyring = openssl::Keyring::new();
                for path in &keys {
                    let bytes = check!(fs::read(path), "failed to open key");
                    let key = check!(
                        load_key(&bytes).ok_or(()),
                        "failed to parse key {}",
                        path.display()
                    );
                    keyring.push(key);
                }

                let mut image = Vec::new();
                check!(r.read_to_end(&mut image), "failed to read image");
                let end = end.unwrap_or(image.len() as u32);

                let mut ctx = ValidationContext::new(start, end)
                    .with_image_family(family);
                if let Some(alignment) = alignment {
                    ctx = ctx.with_descriptor_alignment(alignment);
                }
                if let Some(ty) = current_type {
                    ctx = ctx.with_current_image_type(ty);
                }
                let platform = CliPlatform {
                    production,
                    allow_dev_downgrade,
                };

                let flash = Ram(&image[..]);
                let mut regions = ValidatedRegions::<16>::new();
                let mut result = ctx.validate(
                    &flash,
                    &platform,
                    &mut ring::hash::Engine::new(),
                    &mut keyring,
                    &mut regions,
                );

                let mut mauv = None;
                if result.is_ok() {
                    let mut storage = mauv_state.map(FileStorage);
                    let storage = storage
                        .as_mut()
                        .map(|s| s as &mut dyn MauvStorage);
                    match ctx.validate_mauv(&flash, storage) {
                        Ok(outcome) => mauv = Some(format!("{:?}", outcome)),
                        Err(e) => result = Err(e),
                    }
                }

                let report = match (&result, ctx.descriptor()) {
                    (Ok(()), Some(desc)) => serde_json::json!({
                        "valid": true,
                        "key": ctx.valid_key(),
                        "descriptor_offset": desc.offset,
                        "name": desc.name(),
                        "family": desc.image_family,
                        "version": desc.version,
                        "image_type": desc.image_type.to_string(),
                        "regions": regions
                            .as_slice()
                            .iter()
                            .map(|r| serde_json::json!({
                                "name": r.name(),
                                "offset": r.offset,
                                "size": r.size,
                                "static": r.is_static(),
                            }))
                            .collect::<Vec<_>>(),
                        "mauv": mauv,
                    }),
                    _ => serde_json::json!({
                        "valid": false,
                        "reason": result.as_ref().err().map(|e| e.to_string()),
                    }),
                };
                check!(
                    serde_json::to_writer_pretty(w, &report),
                    "failed to write report"
                );

                if let Err(e) = result {
                    eprintln!("error: image rejected: {}", e);
                    std::process::exit(e.code() as i32);
                }
            }
        }
    }
}
