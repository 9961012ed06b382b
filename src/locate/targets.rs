//! Known patch points for every supported firmware build.
//!
//! Where exactly to splice into the settings menu callback differs per build
//! and was established by hand in a disassembler. The callback symbol names
//! are stable between builds of the same model; the addresses are not.

use crate::arch::aarch32::{Aarch32Register as Register, Condition, Instruction, PtrVal, INSTRUCTION_SIZE};
use crate::error::{Error, Result};
use serde::Serialize;
use std::collections::HashSet;
use std::{fmt, str};

/// Device models the patch engine knows about.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Debug)]
pub enum Model {
    K2P,
    K3,
    KS1,
}

impl Model {
    /// Symbol of the method that hides the "please wait" indicator, and the
    /// value to pass as its argument.
    ///
    /// The K2P firmware has no dedicated hide method; its wait handler hides
    /// the indicator when given zero.
    pub fn wait_hide(self) -> (&'static str, u32) {
        match self {
            Model::K2P => (WAIT_HANDLER, 0),
            Model::K3 => ("_ZN10MainWindow17AcDisplayWaitHideEv", 4),
            Model::KS1 => ("_ZN10MainWindow17AcDisplayWaitHideEh", 4),
        }
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Model::K2P => write!(f, "K2P"),
            Model::K3 => write!(f, "K3"),
            Model::KS1 => write!(f, "KS1"),
        }
    }
}

impl str::FromStr for Model {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_ref() {
            "K2P" => Ok(Model::K2P),
            "K3" => Ok(Model::K3),
            "KS1" => Ok(Model::KS1),
            _ => Err(()),
        }
    }
}

derive_deserialize_from_str!(Model, "valid printer model code");

/// `MainWindow::AcDisplayWaitHandler(unsigned char, unsigned char)`
pub const WAIT_HANDLER: &str = "_ZN10MainWindow20AcDisplayWaitHandlerEhh";

const LIST_BUTTON_RELEASE: &str = "_ZN10MainWindow23AcSettingListBtnReleaseEi";
const SETTING_PAGE_INIT: &str = "_ZZN10MainWindow19AcSettingPageUiInitEvENKUlvE_clEv";
const GENERAL_PAGE_INIT: &str =
    "_ZZN10MainWindow26AcSettingGeneralPageUiInitEvENKUlRK11QModelIndexE0_clES2_";

/// Restricts a patched callback shared by several menu rows to one of them.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct RowGuard {
    /// Register holding the selected row when the jump is taken.
    pub selector: Register,

    /// Row that should launch the replacement UI.
    pub row: u32,

    /// Original instruction overwritten by the jump, replayed before the
    /// guard so that the untouched path behaves as before.
    pub displaced: Instruction,
}

/// Where, and how, to redirect one firmware build's menu callback.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct PatchTarget {
    /// Symbol of the callback containing the jump.
    pub callback: &'static str,

    /// Instruction to overwrite with the jump into scratch space.
    pub jump_address: PtrVal,

    /// Condition of the branch originally at `jump_address`.
    pub jump_condition: Condition,

    /// Where the replacement code resumes the callback.
    pub return_address: PtrVal,

    pub guard: Option<RowGuard>,
}

impl PatchTarget {
    /// Where a rejected guard resumes: the instruction just before the
    /// return address, i.e. the call the row selection would have made.
    pub fn guard_fallback(&self) -> PtrVal {
        self.return_address - INSTRUCTION_SIZE
    }
}

const KS1_ROW_GUARD: RowGuard = RowGuard {
    selector: Register::R3,
    row: 3,
    displaced: Instruction::MovRegister(Register::R0, Register::R4),
};

lazy_static! {
    static ref TARGETS: Vec<(Model, &'static str, PatchTarget)> = vec![
        // Settings > Support (5th button)
        (Model::K2P, "3.1.2.3", PatchTarget {
            callback: LIST_BUTTON_RELEASE,
            jump_address: 0x99cb8,
            jump_condition: Condition::Equal,
            return_address: 0x99ce8,
            guard: None,
        }),

        // Settings > Support (5th button)
        (Model::K3, "2.3.8.9", PatchTarget {
            callback: SETTING_PAGE_INIT,
            jump_address: 0xfaf14,
            jump_condition: Condition::Always,
            return_address: 0xfaf44,
            guard: None,
        }),
        (Model::K3, "2.3.9.3", PatchTarget {
            callback: SETTING_PAGE_INIT,
            jump_address: 0xfd3bc,
            jump_condition: Condition::Always,
            return_address: 0xfd3ec,
            guard: None,
        }),

        // Settings > General > Service Support (4th row)
        (Model::KS1, "2.5.1.6", PatchTarget {
            callback: GENERAL_PAGE_INIT,
            jump_address: 0x113210,
            jump_condition: Condition::Always,
            return_address: 0x113218,
            guard: Some(KS1_ROW_GUARD),
        }),
        (Model::KS1, "2.5.2.3", PatchTarget {
            callback: GENERAL_PAGE_INIT,
            jump_address: 0x1138d8,
            jump_condition: Condition::Always,
            return_address: 0x1138e0,
            guard: Some(KS1_ROW_GUARD),
        }),
    ];
}

/// Look up the patch point of a firmware build.
pub fn lookup_target(model: Model, version: &str) -> Result<&'static PatchTarget> {
    TARGETS
        .iter()
        .find(|(m, v, _)| *m == model && *v == version)
        .map(|(_, _, target)| target)
        .ok_or_else(|| Error::UnsupportedTarget {
            model: model.to_string(),
            version: version.to_string(),
        })
}

/// Every firmware build with a known patch point.
pub fn supported_targets() -> impl Iterator<Item = (Model, &'static str)> {
    TARGETS.iter().map(|(m, v, _)| (*m, *v))
}

pub(super) fn check_target(model: Model, version: &str, target: &PatchTarget) -> Result<()> {
    let invalid = |reason: &str| Error::InvalidTargetTable {
        model: model.to_string(),
        version: version.to_string(),
        reason: reason.to_string(),
    };

    if target.jump_address % INSTRUCTION_SIZE != 0 || target.return_address % INSTRUCTION_SIZE != 0 {
        return Err(invalid("addresses must be word aligned"));
    }

    if target.return_address <= target.jump_address {
        return Err(invalid("return address must follow the jump address"));
    }

    if target.guard.is_some() && target.guard_fallback() <= target.jump_address {
        return Err(invalid("guarded targets must leave room for the displaced call"));
    }

    if target.callback.is_empty() {
        return Err(invalid("callback symbol is empty"));
    }

    Ok(())
}

/// Check the whole target table for entries that could never patch
/// correctly. Run once at startup.
pub fn validate_targets() -> Result<()> {
    let mut seen = HashSet::new();

    for (model, version, target) in TARGETS.iter() {
        if !seen.insert((*model, *version)) {
            return Err(Error::InvalidTargetTable {
                model: model.to_string(),
                version: version.to_string(),
                reason: "duplicate entry".to_string(),
            });
        }

        check_target(*model, version, target)?;
    }

    Ok(())
}
