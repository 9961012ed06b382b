//! Common utilities for command implementations

use clap::{App, Arg, SubCommand};
use std::str::FromStr;

/// Enumeration of all CLI commands
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Command {
    Build,
    Diff,
    Symbols,
}

impl Command {
    /// Enumerate all commands that fwpatch recognizes.
    pub fn enumerate() -> Vec<Self> {
        use Command::*;

        vec![Build, Diff, Symbols]
    }

    /// Construct the subcommand object for this particular `Command`.
    pub fn into_clap_subcommand<'a, 'b>(self) -> App<'a, 'b> {
        match self {
            Command::Build => SubCommand::with_name("build")
                .about("Patch every firmware binary in the patches directory and write deployment scripts"),
            Command::Diff => SubCommand::with_name("diff")
                .about("Compile a deployment script that turns one file into another")
                .arg(
                    Arg::with_name("before")
                        .value_name("K3SysUi.K3_2.3.9.3")
                        .index(1)
                        .required(true)
                        .help("The original file"),
                )
                .arg(
                    Arg::with_name("after")
                        .value_name("K3SysUi.K3_2.3.9.3.patch")
                        .index(2)
                        .required(true)
                        .help("The patched file"),
                )
                .arg(
                    Arg::with_name("out")
                        .long("out")
                        .short("o")
                        .value_name("patch.sh")
                        .takes_value(true)
                        .help("Where to write the script; standard output if omitted"),
                ),
            Command::Symbols => SubCommand::with_name("symbols")
                .about("List the functions named in a Go binary's runtime table")
                .arg(
                    Arg::with_name("binary")
                        .value_name("gkapi.K3_2.3.9.3")
                        .index(1)
                        .required(true)
                        .help("The Go executable to read"),
                ),
        }
    }
}

impl FromStr for Command {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_ref() {
            "build" => Ok(Command::Build),
            "diff" => Ok(Command::Diff),
            "symbols" => Ok(Command::Symbols),
            "syms" => Ok(Command::Symbols),
            _ => Err(()),
        }
    }
}
