#[macro_use]
extern crate clap;

#[macro_use]
extern crate lazy_static;

#[macro_use]
extern crate serde_plain;

#[macro_use]
extern crate log;

mod arch;
mod cli;
mod diff;
mod digest;
mod emit;
mod error;
mod image;
mod locate;
mod project;
mod runtime;

use std::io;

fn main() -> io::Result<()> {
    cli::main()
}
