//! Configuration file representation

use crate::emit::{LanModeOverrides, LaunchCommands};
use crate::locate::Model;
use clap::{App, Arg, ArgMatches, ArgSettings};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::{fs, io};

/// In-memory representation of the patcher's configuration.
///
/// This is typically read from a file named `fwpatch.json`. Every field is
/// optional; an empty object configures the stock behavior.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    #[serde(default)]
    patches_dir: Option<PathBuf>,

    #[serde(default)]
    commands: LaunchCommands,

    /// Replaces `commands` wholesale for one model, keyed by model code.
    #[serde(default)]
    model_commands: BTreeMap<Model, LaunchCommands>,

    #[serde(default)]
    lan_mode_overrides: LanModeOverrides,
}

impl Settings {
    pub fn read(filename: &Path) -> io::Result<Self> {
        let settings_file = fs::File::open(filename)?;
        let settings: Self = serde_json::from_reader(io::BufReader::new(settings_file))?;

        Ok(settings)
    }

    /// Read a configuration file that need not exist.
    pub fn read_optional(filename: &Path) -> io::Result<Self> {
        match Self::read(filename) {
            Ok(settings) => Ok(settings),
            Err(ref e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No {}, using defaults", filename.display());
                Ok(Self::default())
            }
            Err(e) => Err(e),
        }
    }

    pub fn configure_app<'a, 'b>(app: App<'a, 'b>) -> App<'a, 'b> {
        app.arg(
            Arg::with_name("dir")
                .long("dir")
                .value_name("patches/")
                .help("The directory holding the firmware binaries to patch.")
                .takes_value(true)
                .set(ArgSettings::Global),
        )
    }

    /// Construct Settings from clap ArgMatches
    pub fn from_arg_matches(args: &ArgMatches) -> Settings {
        Settings {
            patches_dir: args.value_of("dir").map(PathBuf::from),
            ..Settings::default()
        }
    }

    /// Directory scanned for binaries; the working directory by default.
    pub fn patches_dir(&self) -> &Path {
        self.patches_dir.as_deref().unwrap_or_else(|| Path::new("."))
    }

    /// Commands to embed in the UI binaries of `model`.
    pub fn commands_for(&self, model: Model) -> &LaunchCommands {
        self.model_commands.get(&model).unwrap_or(&self.commands)
    }

    pub fn lan_mode_overrides(&self) -> &LanModeOverrides {
        &self.lan_mode_overrides
    }

    pub fn apply_override(&self, other: &Settings) -> Settings {
        Settings {
            patches_dir: other.patches_dir.clone().or_else(|| self.patches_dir.clone()),
            commands: if other.commands != LaunchCommands::default() {
                other.commands.clone()
            } else {
                self.commands.clone()
            },
            model_commands: match other.model_commands.len() {
                0 => self.model_commands.clone(),
                _ => other.model_commands.clone(),
            },
            lan_mode_overrides: match other.lan_mode_overrides.len() {
                0 => self.lan_mode_overrides.clone(),
                _ => other.lan_mode_overrides.clone(),
            },
        }
    }
}
