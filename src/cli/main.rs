//! CLI support for non-command bits

use crate::cli::Command;
use crate::locate::{supported_targets, validate_targets};
use crate::{cli, project};
use clap::{Arg, ArgSettings};
use env_logger::Env;
use std::io;
use std::path::Path;
use std::str::FromStr;

pub fn main() -> io::Result<()> {
    let mut app = app_from_crate!();
    app = project::Settings::configure_app(app);
    app = app
        .arg(
            Arg::with_name("config")
                .long("config")
                .value_name("fwpatch.json")
                .takes_value(true)
                .help("The settings file to load")
                .set(ArgSettings::Global),
        )
        .arg(
            Arg::with_name("verbose")
                .long("verbose")
                .short("v")
                .help("Log resolved symbols and listings of patched code")
                .set(ArgSettings::Global),
        );

    for cmd in Command::enumerate().iter() {
        app = app.subcommand(cmd.into_clap_subcommand());
    }

    let matches = app.get_matches();

    // Global arguments given after a subcommand land in its matches.
    let (command, submatches) = matches.subcommand();
    let args = submatches.unwrap_or(&matches);

    let level = if args.is_present("verbose") { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();

    // Only the default settings file may be absent.
    let settings = match args.value_of("config") {
        Some(filename) => project::Settings::read(Path::new(filename))?,
        None => project::Settings::read_optional(Path::new("fwpatch.json"))?,
    };
    let settings = settings.apply_override(&project::Settings::from_arg_matches(args));

    validate_targets()?;
    for (model, version) in supported_targets() {
        debug!("Known patch point for {} {}", model, version);
    }

    let command = Command::from_str(command);

    match (command, submatches) {
        (Ok(Command::Diff), Some(submatches)) => cli::diff(submatches)?,
        (Ok(Command::Symbols), Some(submatches)) => cli::symbols(submatches)?,
        _ => cli::build(&settings)?,
    };

    Ok(())
}
