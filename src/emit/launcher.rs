//! The replacement menu action: run an external UI, wait for it to exit,
//! then restore the vendor UI's wait indicator.

use crate::arch::aarch32::{
    Aarch32Register as Register, Condition, Instruction, PtrVal, INSTRUCTION_SIZE,
};
use crate::emit::ScratchAllocator;
use crate::error::Result;
use crate::image::Image;
use crate::locate::{CallSite, Model, PatchTarget, WAIT_HANDLER};
use serde::{Deserialize, Serialize};

/// libc `system(const char *)`, imported through the PLT.
pub const SYSTEM: &str = "system";

/// `GobalVar::OsSleep(int)`
pub const OS_SLEEP: &str = "_ZN8GobalVar7OsSleepEi";

/// Milliseconds to sleep between liveness polls.
const POLL_INTERVAL: u32 = 100;

/// Exit status of the poll command while the launched process is alive.
const STILL_RUNNING: u32 = 15;

/// Shell commands run by the replacement menu action.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LaunchCommands {
    /// Starts the external UI in the background and records its PID.
    pub launch: String,

    /// Exits with status 15 for as long as the external UI is running.
    pub poll: String,

    /// Removes the PID file.
    pub cleanup: String,
}

impl Default for LaunchCommands {
    fn default() -> Self {
        LaunchCommands {
            launch: "/useremain/rinkhals/.current/opt/rinkhals/ui/rinkhals-ui.sh & echo $! > /tmp/rinkhals/rinkhals-ui.pid".to_string(),
            poll: "timeout -t 2 strace -qqq -e trace=none -p $(cat /tmp/rinkhals/rinkhals-ui.pid) 2> /dev/null".to_string(),
            cleanup: "rm -f /tmp/rinkhals/rinkhals-ui.pid".to_string(),
        }
    }
}

/// Functions the launcher calls into.
#[derive(Copy, Clone, Debug)]
pub struct Helpers {
    pub system: PtrVal,
    pub sleep: PtrVal,
    pub wait_handler: PtrVal,
    pub hide: PtrVal,
    pub hide_arg: u32,
}

impl Helpers {
    pub fn resolve<I: Image>(image: &I, model: Model) -> Result<Self> {
        let (hide, hide_arg) = model.wait_hide();

        let helpers = Helpers {
            system: image.require_symbol(SYSTEM)?,
            sleep: image.require_symbol(OS_SLEEP)?,
            wait_handler: image.require_symbol(WAIT_HANDLER)?,
            hide: image.require_symbol(hide)?,
            hide_arg,
        };

        debug!("{:x?}", helpers);

        Ok(helpers)
    }
}

/// `r0 = *literal; system(r0)`, with the literal inline.
fn emit_system<I: Image>(
    image: &mut I,
    scratch: &mut ScratchAllocator,
    helpers: &Helpers,
    command: PtrVal,
) -> Result<()> {
    let skip = scratch.cursor() + 3 * INSTRUCTION_SIZE;

    scratch.emit(
        image,
        &Instruction::LoadWord {
            rt: Register::R0,
            rn: Register::PC,
            offset: 0,
        },
    )?;
    scratch.emit(image, &Instruction::branch(skip))?;
    scratch.emit_word(image, command)?;
    scratch.emit(image, &Instruction::call(helpers.system))?;

    Ok(())
}

fn emit_receiver<I: Image>(image: &mut I, scratch: &mut ScratchAllocator, site: &CallSite) -> Result<()> {
    for word in site.receiver.instructions() {
        scratch.emit_word(image, word)?;
    }

    Ok(())
}

/// Emit the launcher into scratch space and return the address execution
/// should be redirected to.
pub fn emit_launcher<I: Image>(
    image: &mut I,
    scratch: &mut ScratchAllocator,
    site: &CallSite,
    target: &PatchTarget,
    helpers: &Helpers,
    commands: &LaunchCommands,
) -> Result<PtrVal> {
    let launch = scratch.put_cstr(image, &commands.launch)?;
    let poll = scratch.put_cstr(image, &commands.poll)?;
    let cleanup = scratch.put_cstr(image, &commands.cleanup)?;

    let start = scratch.align();

    if let Some(guard) = target.guard {
        scratch.emit(image, &guard.displaced)?;
        scratch.emit(image, &Instruction::CmpImmediate(guard.selector, guard.row))?;
        scratch.emit(
            image,
            &Instruction::branch_if(Condition::NotEqual, target.guard_fallback()),
        )?;
    }

    emit_system(image, scratch, helpers, launch)?;

    let wait = scratch.cursor();
    scratch.emit(image, &Instruction::MovImmediate(Register::R0, POLL_INTERVAL))?;
    scratch.emit(image, &Instruction::call(helpers.sleep))?;
    emit_system(image, scratch, helpers, poll)?;
    scratch.emit(image, &Instruction::CmpImmediate(Register::R0, STILL_RUNNING))?;
    scratch.emit(image, &Instruction::branch_if(Condition::Equal, wait))?;

    emit_system(image, scratch, helpers, cleanup)?;

    emit_receiver(image, scratch, site)?;
    scratch.emit(image, &Instruction::MovImmediate(Register::R2, 4))?;
    scratch.emit(image, &Instruction::MovImmediate(Register::R1, 1))?;
    scratch.emit(image, &Instruction::call(helpers.wait_handler))?;

    emit_receiver(image, scratch, site)?;
    scratch.emit(image, &Instruction::MovImmediate(Register::R1, helpers.hide_arg))?;

    if site.site.uses_tail_call() {
        scratch.emit(image, &Instruction::branch(helpers.hide))?;
    } else {
        scratch.emit(image, &Instruction::call(helpers.hide))?;
        scratch.emit(image, &Instruction::branch(site.site.return_address))?;
    }

    debug!(
        "launcher at 0x{:x}..0x{:x}, strings at 0x{:x}",
        start,
        scratch.cursor(),
        launch
    );

    Ok(start)
}
