// Copyright lowRISC contributors.
// Licensed under the Apache License, Version 2.0, see LICENSE for details.
// SPDX-License-Identifier: Apache-2.0

//! `cr51sign-tool` is a simple command-line tool for building and validating
//! signed firmware images.

#![deny(missing_docs)]
#![deny(warnings)]
#![deny(unused)]
#![deny(unsafe_code)]

use structopt::StructOpt as _;

#[macro_use]
mod util;

mod image;

/// A command-line tool for working with signed images.
#[allow(missing_docs)]
#[derive(structopt::StructOpt)]
#[structopt(author)]
enum CliCommand {
    #[structopt(flatten)]
    Image(image::Image),
}

fn main() {
    env_logger::init();
    match CliCommand::from_args() {
        CliCommand::Image(i) => i.run(),
    }
}
