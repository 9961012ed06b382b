use crate::arch::aarch32::{Aarch32Register as Register, Condition, Instruction, PtrVal, Word};
use crate::emit::api::{apply_api_patches, LAN_PRINT_CHECK};
use crate::emit::launcher::{OS_SLEEP, SYSTEM};
use crate::emit::tweaks::{open_broker, replace_label, replace_labels, STATUS_CHECK};
use crate::emit::{
    apply_ui_patches, artifact_path, patch_api_file, patch_ui_file, LanModeOverrides, LaunchCommands,
    Outcome, ScratchAllocator, SCRATCH_FUNCTION,
};
use crate::error::Error;
use crate::image::tests::{blank_image, build_elf, plt_stub, put_words};
use crate::image::{ExecutableImage, Image};
use crate::locate::{lookup_target, Model, STATUS_BAR_LANDMARK, WAIT_HANDLER};
use crate::runtime::read_function_table;
use crate::runtime::tests::{build_pclntab, image_with_table};
use pretty_assertions::assert_eq;
use std::fs;
use std::path::Path;

const PUSH_FP_LR: Word = 0xE92D_4800;
const ADD_FP_SP_4: Word = 0xE28D_B004;
const SUB_SP_SP_8: Word = 0xE24D_D008;
const STR_R0_FP_8: Word = 0xE50B_0008;
const LDR_R0_FP_8: Word = 0xE51B_0008;
const LDR_R0_R0: Word = 0xE590_0000;
const LDR_R0_R4: Word = 0xE594_0000;
const MOV_R1_0: Word = 0xE3A0_1000;
const MOV_R3_R0: Word = 0xE1A0_3000;
const MOV_R0_R4: Word = 0xE1A0_0004;
const CMP_R0_0: Word = 0xE350_0000;

/// Addresses of the helper functions, relative to an image's base.
const SYSTEM_AT: PtrVal = 0x10;
const SLEEP_AT: PtrVal = 0x20;
const HANDLER_AT: PtrVal = 0x30;
const HIDE_AT: PtrVal = 0x40;
const STATUS_CHECK_AT: PtrVal = 0x50;
const LANDMARK_AT: PtrVal = 0x80;
const SCRATCH_AT: PtrVal = 0x400;
const SCRATCH_SIZE: usize = 0x400;

fn add_helpers(image: &mut ExecutableImage, base: PtrVal, model: Model) {
    image.add_symbol(SYSTEM, base + SYSTEM_AT);
    image.add_symbol(OS_SLEEP, base + SLEEP_AT);
    image.add_symbol(WAIT_HANDLER, base + HANDLER_AT);
    image.add_symbol(model.wait_hide().0, base + HIDE_AT);
    image.add_sized_symbol(SCRATCH_FUNCTION, base + SCRATCH_AT, SCRATCH_SIZE);
}

fn read_words<I: Image>(image: &I, address: PtrVal, count: usize) -> Vec<Word> {
    (0..count)
        .map(|i| image.read_word(address + i as PtrVal * 4).unwrap())
        .collect()
}

fn read_cstr<I: Image>(image: &I, address: PtrVal) -> String {
    let mut bytes = Vec::new();
    for i in 0.. {
        match image.read(address + i, 1).unwrap()[0] {
            0 => break,
            b => bytes.push(b),
        }
    }
    String::from_utf8(bytes).unwrap()
}

/// Expected instruction stream, encoded as it would be at its address.
struct Expected {
    pc: PtrVal,
    words: Vec<Word>,
}

impl Expected {
    fn at(pc: PtrVal) -> Self {
        Expected { pc, words: Vec::new() }
    }

    fn word(&mut self, word: Word) -> &mut Self {
        self.words.push(word);
        self.pc += 4;
        self
    }

    fn instr(&mut self, instr: Instruction) -> &mut Self {
        let word = instr.encode(self.pc).unwrap();
        self.word(word)
    }

    fn system(&mut self, command: PtrVal, system: PtrVal) -> &mut Self {
        let skip = self.pc + 12;
        self.word(0xE59F_0000)
            .instr(Instruction::branch(skip))
            .word(command)
            .instr(Instruction::call(system))
    }
}

/// Where the launcher strings and code land for the default commands.
fn default_layout(scratch: PtrVal) -> (PtrVal, PtrVal, PtrVal, PtrVal) {
    let commands = LaunchCommands::default();
    let launch = scratch + 4;
    let poll = launch + commands.launch.len() as PtrVal + 1;
    let cleanup = poll + commands.poll.len() as PtrVal + 1;
    let end = cleanup + commands.cleanup.len() as PtrVal + 1;

    (launch, poll, cleanup, (end + 3) & !3)
}

/// Launch, poll loop and cleanup, common to every model.
fn expect_launch_and_wait(expected: &mut Expected, base: PtrVal, scratch: PtrVal) {
    let (launch, poll, cleanup, _) = default_layout(scratch);

    expected.system(launch, base + SYSTEM_AT);
    let wait = expected.pc;
    expected
        .instr(Instruction::MovImmediate(Register::R0, 100))
        .instr(Instruction::call(base + SLEEP_AT))
        .system(poll, base + SYSTEM_AT)
        .instr(Instruction::CmpImmediate(Register::R0, 15))
        .instr(Instruction::branch_if(Condition::Equal, wait))
        .system(cleanup, base + SYSTEM_AT);
}

const K3_BASE: PtrVal = 0xF_C000;
const K3_CALLBACK: PtrVal = 0xF_D300;

/// A K3 2.3.9.3 style settings page callback with a frame.
fn k3_image() -> ExecutableImage {
    let target = lookup_target(Model::K3, "2.3.9.3").unwrap();
    let mut image = blank_image(K3_BASE, 0x2000);

    put_words(&mut image, K3_CALLBACK, &[PUSH_FP_LR, ADD_FP_SP_4, SUB_SP_SP_8, STR_R0_FP_8]);
    image.add_symbol(target.callback, K3_CALLBACK);
    image.add_symbol(STATUS_CHECK, K3_BASE + STATUS_CHECK_AT);
    add_helpers(&mut image, K3_BASE, Model::K3);
    image.write(0xF_DA00, b"Support\0").unwrap();

    image
}

#[test]
fn framed_callback_launcher() {
    let target = lookup_target(Model::K3, "2.3.9.3").unwrap();
    let mut image = k3_image();

    apply_ui_patches(&mut image, Model::K3, target, &LaunchCommands::default()).unwrap();

    let scratch = K3_BASE + SCRATCH_AT;
    let (launch, poll, cleanup, start) = default_layout(scratch);
    let commands = LaunchCommands::default();

    assert_eq!(image.read_word(scratch).unwrap(), 0xE1A0_F00E);
    assert_eq!(read_cstr(&image, launch), commands.launch);
    assert_eq!(read_cstr(&image, poll), commands.poll);
    assert_eq!(read_cstr(&image, cleanup), commands.cleanup);

    let mut expected = Expected::at(start);
    expect_launch_and_wait(&mut expected, K3_BASE, scratch);
    expected
        .word(LDR_R0_FP_8)
        .word(LDR_R0_R0)
        .instr(Instruction::MovImmediate(Register::R2, 4))
        .instr(Instruction::MovImmediate(Register::R1, 1))
        .instr(Instruction::call(K3_BASE + HANDLER_AT))
        .word(LDR_R0_FP_8)
        .word(LDR_R0_R0)
        .instr(Instruction::MovImmediate(Register::R1, 4))
        .instr(Instruction::call(K3_BASE + HIDE_AT))
        .instr(Instruction::branch(0xF_D3EC));

    assert_eq!(read_words(&image, start, expected.words.len()), expected.words);

    // The site now jumps into the launcher.
    assert_eq!(
        image.read_word(0xF_D3BC).unwrap(),
        Instruction::branch(start).encode(0xF_D3BC).unwrap()
    );

    // Opportunistic patches
    assert_eq!(
        read_words(&image, K3_BASE + STATUS_CHECK_AT, 2),
        vec![0xE3A0_0000, 0xE1A0_F00E]
    );
    assert_eq!(image.read(0xF_DA00, 8).unwrap(), b"Rinkhal\0");
}

#[test]
fn guarded_tail_call_launcher() {
    const BASE: PtrVal = 0x11_2000;
    const CALLBACK: PtrVal = 0x11_3200;

    let target = lookup_target(Model::KS1, "2.5.1.6").unwrap();
    let mut image = blank_image(BASE, 0x2000);

    put_words(&mut image, CALLBACK, &[LDR_R0_R4, MOV_R1_0]);
    image.assemble(CALLBACK + 8, &Instruction::call(BASE + LANDMARK_AT)).unwrap();
    put_words(&mut image, CALLBACK + 12, &[MOV_R3_R0, MOV_R0_R4]);
    image.assemble(CALLBACK + 20, &Instruction::call(BASE + 0x200)).unwrap();
    image.add_symbol(target.callback, CALLBACK);
    image.add_symbol(STATUS_BAR_LANDMARK, BASE + LANDMARK_AT);
    add_helpers(&mut image, BASE, Model::KS1);
    image.write(0x11_3A00, b"Service Support\0").unwrap();

    apply_ui_patches(&mut image, Model::KS1, target, &LaunchCommands::default()).unwrap();

    let scratch = BASE + SCRATCH_AT;
    let (_, _, _, start) = default_layout(scratch);

    let mut expected = Expected::at(start);
    expected
        .word(MOV_R0_R4)
        .instr(Instruction::CmpImmediate(Register::R3, 3))
        .instr(Instruction::branch_if(Condition::NotEqual, 0x11_3214));
    expect_launch_and_wait(&mut expected, BASE, scratch);
    expected
        .word(LDR_R0_R4)
        .instr(Instruction::MovImmediate(Register::R2, 4))
        .instr(Instruction::MovImmediate(Register::R1, 1))
        .instr(Instruction::call(BASE + HANDLER_AT))
        .word(LDR_R0_R4)
        .instr(Instruction::MovImmediate(Register::R1, 4))
        .instr(Instruction::branch(BASE + HIDE_AT))
        // Tail call: nothing returns to the callback.
        .word(0);

    assert_eq!(read_words(&image, start, expected.words.len()), expected.words);
    assert_eq!(
        image.read_word(0x11_3210).unwrap(),
        Instruction::branch(start).encode(0x11_3210).unwrap()
    );
    assert_eq!(image.read(0x11_3A00, 9).unwrap(), b"Rinkhals\0");
}

#[test]
fn conditional_site_keeps_condition() {
    const BASE: PtrVal = 0x9_8000;
    const CALLBACK: PtrVal = 0x9_9C00;

    let target = lookup_target(Model::K2P, "3.1.2.3").unwrap();
    let mut image = blank_image(BASE, 0x2000);

    put_words(&mut image, CALLBACK, &[PUSH_FP_LR, ADD_FP_SP_4, STR_R0_FP_8]);
    image.add_symbol(target.callback, CALLBACK);
    add_helpers(&mut image, BASE, Model::K2P);

    apply_ui_patches(&mut image, Model::K2P, target, &LaunchCommands::default()).unwrap();

    let (_, _, _, start) = default_layout(BASE + SCRATCH_AT);
    let jump = image.read_word(0x9_9CB8).unwrap();

    assert_eq!(jump, Instruction::branch_if(Condition::Equal, start).encode(0x9_9CB8).unwrap());
    assert_eq!(jump >> 28, 0);

    // Hidden through the wait handler with a zero argument, then returns.
    let mut expected = Expected::at(start);
    expect_launch_and_wait(&mut expected, BASE, BASE + SCRATCH_AT);
    let tail = expected.pc + 5 * 4;
    let mut hide = Expected::at(tail);
    hide.word(LDR_R0_FP_8)
        .word(LDR_R0_R0)
        .instr(Instruction::MovImmediate(Register::R1, 0))
        .instr(Instruction::call(BASE + HANDLER_AT))
        .instr(Instruction::branch(0x9_9CE8));

    assert_eq!(read_words(&image, tail, hide.words.len()), hide.words);
}

#[test]
fn custom_commands_are_embedded() {
    let target = lookup_target(Model::K3, "2.3.9.3").unwrap();
    let mut image = k3_image();
    let commands = LaunchCommands {
        launch: "run-ui &".to_string(),
        poll: "poll-ui".to_string(),
        cleanup: "true".to_string(),
    };

    apply_ui_patches(&mut image, Model::K3, target, &commands).unwrap();

    let scratch = K3_BASE + SCRATCH_AT;
    assert_eq!(read_cstr(&image, scratch + 4), "run-ui &");
    assert_eq!(read_cstr(&image, scratch + 13), "poll-ui");
    assert_eq!(read_cstr(&image, scratch + 21), "true");

    // Strings end at +0x1a; code is aligned to +0x1c.
    let start = scratch + 0x1C;
    assert_eq!(image.read_word(start).unwrap(), 0xE59F_0000);
    assert_eq!(image.read_word(start + 8).unwrap(), scratch + 4);
}

#[test]
fn missing_helper_fails_before_scratch_is_touched() {
    let target = lookup_target(Model::K3, "2.3.9.3").unwrap();
    let mut image = k3_image();
    let mut without_sleep = blank_image(K3_BASE, 0x2000);
    without_sleep.write(K3_BASE, image.as_bytes()).unwrap();
    without_sleep.add_symbol(target.callback, K3_CALLBACK);
    without_sleep.add_symbol(SYSTEM, K3_BASE + SYSTEM_AT);
    without_sleep.add_symbol(SCRATCH_FUNCTION, K3_BASE + SCRATCH_AT);

    match apply_ui_patches(&mut without_sleep, Model::K3, target, &LaunchCommands::default()) {
        Err(Error::MissingSymbol(name)) => assert_eq!(name, OS_SLEEP),
        other => panic!("expected MissingSymbol, got {:?}", other),
    }
    assert_eq!(without_sleep.read_word(K3_BASE + SCRATCH_AT).unwrap(), 0);

    // And without a receiver the site is not found.
    put_words(&mut image, K3_CALLBACK + 12, &[0]);
    assert!(matches!(
        apply_ui_patches(&mut image, Model::K3, target, &LaunchCommands::default()),
        Err(Error::PatchSiteNotFound { .. })
    ));
}

#[test]
fn scratch_allocation_is_monotonic() {
    let mut image = blank_image(0x1000, 0x100);
    image.add_sized_symbol("stub", 0x1010, 0x20);

    let mut scratch = ScratchAllocator::after_stub(&mut image, "stub").unwrap();
    assert_eq!(scratch.cursor(), 0x1014);

    assert_eq!(scratch.put_cstr(&mut image, "ab").unwrap(), 0x1014);
    assert_eq!(scratch.cursor(), 0x1017);
    assert_eq!(scratch.align(), 0x1018);
    assert_eq!(scratch.align(), 0x1018);
    assert_eq!(scratch.emit(&mut image, &Instruction::nop()).unwrap(), 0x1018);
    assert_eq!(scratch.emit_word(&mut image, 0xDEAD_BEEF).unwrap(), 0x101C);
    assert_eq!(scratch.used(), 0x10);

    assert_eq!(image.read_word(0x1010).unwrap(), 0xE1A0_F00E);
    assert_eq!(image.read(0x1014, 3).unwrap(), b"ab\0");
    assert_eq!(image.read_word(0x101C).unwrap(), 0xDEAD_BEEF);

    assert!(ScratchAllocator::after_stub(&mut image, "absent").is_err());
}

#[test]
fn scratch_stays_within_the_function() {
    let mut image = blank_image(0x1000, 0x100);
    image.add_sized_symbol("stub", 0x1010, 0x20);
    put_words(&mut image, 0x1030, &[PUSH_FP_LR]);

    let mut scratch = ScratchAllocator::after_stub(&mut image, "stub").unwrap();
    assert_eq!(scratch.remaining(), 0x1C);
    scratch.emit_word(&mut image, 0xDEAD_BEEF).unwrap();

    match scratch.put_cstr(&mut image, "0123456789abcdefghijklmn") {
        Err(Error::ScratchExhausted {
            function,
            needed,
            available,
        }) => {
            assert_eq!(function, "stub");
            assert_eq!(needed, 25);
            assert_eq!(available, 0x18);
        }
        other => panic!("expected ScratchExhausted, got {:?}", other),
    }
    assert_eq!(scratch.cursor(), 0x1018);

    // Filling it exactly is fine.
    assert_eq!(scratch.put_cstr(&mut image, "0123456789abcdefghijklm").unwrap(), 0x1018);
    assert_eq!(scratch.remaining(), 0);
    assert!(scratch.emit(&mut image, &Instruction::nop()).is_err());
    assert_eq!(image.read_word(0x1030).unwrap(), PUSH_FP_LR);

    // Without a size there is no telling what follows the stub.
    image.add_symbol("unsized", 0x1080);
    assert!(matches!(
        ScratchAllocator::after_stub(&mut image, "unsized"),
        Err(Error::ScratchExhausted { available: 0, .. })
    ));
    assert_eq!(image.read_word(0x1080).unwrap(), 0);
}

#[test]
fn long_commands_do_not_overrun_the_scratch_function() {
    let target = lookup_target(Model::K3, "2.3.9.3").unwrap();
    let mut image = k3_image();
    let neighbour = K3_BASE + SCRATCH_AT + SCRATCH_SIZE as PtrVal;
    put_words(&mut image, neighbour, &[PUSH_FP_LR, ADD_FP_SP_4]);

    let commands = LaunchCommands {
        launch: "x".repeat(SCRATCH_SIZE),
        ..LaunchCommands::default()
    };

    assert!(matches!(
        apply_ui_patches(&mut image, Model::K3, target, &commands),
        Err(Error::ScratchExhausted { .. })
    ));
    assert_eq!(read_words(&image, neighbour, 2), vec![PUSH_FP_LR, ADD_FP_SP_4]);
}

#[test]
fn labels_must_fit() {
    let mut image = blank_image(0x1000, 0x40);
    image.write(0x1010, b"Help\0").unwrap();

    match replace_label(&mut image, "Help", "Rinkhals") {
        Err(Error::LabelTooLong { available, .. }) => assert_eq!(available, 5),
        other => panic!("expected LabelTooLong, got {:?}", other),
    }
    assert_eq!(image.read(0x1010, 5).unwrap(), b"Help\0");
}

#[test]
fn only_first_label_is_replaced() {
    let mut image = blank_image(0x1000, 0x40);
    image.write(0x1010, b"Help\0").unwrap();
    image.write(0x1020, b"Help\0").unwrap();

    assert_eq!(replace_label(&mut image, "Help", "Info").unwrap(), Some(0x1010));

    assert_eq!(image.read(0x1010, 5).unwrap(), b"Info\0");
    assert_eq!(image.read(0x1020, 5).unwrap(), b"Help\0");
}

#[test]
fn later_rules_see_earlier_replacements() {
    let mut image = blank_image(0x1000, 0x40);
    image.write(0x1010, b"Service Support\0").unwrap();
    image.write(0x1020, b"Service Support\0").unwrap();

    replace_labels(&mut image).unwrap();

    // The first label is renamed whole; the generic rule then catches the
    // tail of the second one.
    assert_eq!(image.read(0x1010, 16).unwrap(), b"Rinkhals\0upport\0");
    assert_eq!(image.read(0x1020, 16).unwrap(), b"Service Rinkhal\0");
}

#[test]
fn broker_listens_everywhere() {
    let mut image = blank_image(0x1000, 0x40);
    image.write(0x1008, b"tcp://127.0.0.1:2883\0").unwrap();

    assert_eq!(open_broker(&mut image).unwrap(), Some(0x100E));
    assert_eq!(image.read(0x1008, 21).unwrap(), b"tcp://0.0.0.0:002883\0");
    assert_eq!(open_broker(&mut image).unwrap(), None);
}

/// A Go binary whose `main.main` tests the LAN mode check twice.
fn api_image() -> ExecutableImage {
    let mut image = image_with_table(&build_pclntab(
        0x1_0000,
        &["main.main", LAN_PRINT_CHECK, "printerApi/service/ssdp.(*ssdp).Advertise"],
    ));

    put_words(&mut image, 0x1_0000, &[PUSH_FP_LR]);
    image.assemble(0x1_0008, &Instruction::call(0x1_0100)).unwrap();
    put_words(&mut image, 0x1_000C, &[CMP_R0_0]);
    image.assemble(0x1_0010, &Instruction::branch_if(Condition::Equal, 0x1_0040)).unwrap();
    image.assemble(0x1_0020, &Instruction::call(0x1_0100)).unwrap();
    put_words(&mut image, 0x1_0024, &[CMP_R0_0]);
    image.assemble(0x1_0028, &Instruction::branch_if(Condition::NotEqual, 0x1_0060)).unwrap();

    // Called, but never tested.
    image.assemble(0x1_0208, &Instruction::call(0x1_0100)).unwrap();

    image.write(0x1_0800, b"127.0.0.1:2883").unwrap();

    image
}

fn overrides(function: &str, results: &[bool]) -> LanModeOverrides {
    let mut overrides = LanModeOverrides::new();
    overrides.insert(function.to_string(), results.to_vec());
    overrides
}

#[test]
fn lan_mode_forced_open() {
    let mut image = api_image();
    let table = read_function_table(&image).unwrap();

    apply_api_patches(&mut image, &table, &overrides("main.main", &[true, true])).unwrap();

    assert_eq!(image.read_word(0x1_0010).unwrap(), Instruction::nop().encode(0).unwrap());
    assert_eq!(
        image.read_word(0x1_0028).unwrap(),
        Instruction::branch(0x1_0060).encode(0x1_0028).unwrap()
    );
    assert_eq!(image.read(0x1_0800, 14).unwrap(), b"0.0.0.0:002883");
}

#[test]
fn lan_mode_forced_closed_by_address() {
    let mut image = api_image();
    let table = read_function_table(&image).unwrap();

    apply_api_patches(&mut image, &table, &overrides("0x10000", &[false, false])).unwrap();

    assert_eq!(
        image.read_word(0x1_0010).unwrap(),
        Instruction::branch(0x1_0040).encode(0x1_0010).unwrap()
    );
    assert_eq!(image.read_word(0x1_0028).unwrap(), Instruction::nop().encode(0).unwrap());
}

#[test]
fn lan_mode_call_not_found() {
    let mut image = api_image();
    let table = read_function_table(&image).unwrap();

    // A third call doesn't exist before the next function.
    assert!(matches!(
        apply_api_patches(&mut image, &table, &overrides("main.main", &[true, true, true])),
        Err(Error::PatchSiteNotFound { .. })
    ));
    assert!(matches!(
        apply_api_patches(&mut image, &table, &overrides("main.nothing", &[true])),
        Err(Error::MissingSymbol(_))
    ));
}

#[test]
fn lan_mode_untested_call_is_left_alone() {
    let mut image = api_image();
    let table = read_function_table(&image).unwrap();
    let before = read_words(&image, 0x1_0200, 0x20);

    apply_api_patches(
        &mut image,
        &table,
        &overrides("printerApi/service/ssdp.(*ssdp).Advertise", &[true]),
    )
    .unwrap();

    assert_eq!(read_words(&image, 0x1_0200, 0x20), before);
}

#[test]
fn artifact_naming() {
    assert_eq!(
        artifact_path(Path::new("/patches/K3SysUi.K3_2.3.9.3")),
        Path::new("/patches/K3SysUi.K3_2.3.9.3.patch")
    );
}

#[test]
fn existing_artifacts_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let ui = dir.path().join("K3SysUi.K3_2.3.9.3");
    let api = dir.path().join("gkapi.K3_2.3.9.3");

    for path in &[&ui, &api] {
        fs::write(path, b"not even an executable").unwrap();
        fs::write(artifact_path(path), b"previous run").unwrap();
    }

    let outcome = patch_ui_file(&ui, Model::K3, "2.3.9.3", &LaunchCommands::default()).unwrap();
    assert_eq!(outcome, Outcome::Skipped(artifact_path(&ui)));

    let outcome = patch_api_file(&api, Model::K3, "2.3.9.3", &LanModeOverrides::new()).unwrap();
    assert_eq!(outcome, Outcome::Skipped(artifact_path(&api)));

    assert_eq!(fs::read(artifact_path(&ui)).unwrap(), b"previous run");
    assert_eq!(fs::read(artifact_path(&api)).unwrap(), b"previous run");
}

#[test]
fn failures_leave_no_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let ui = dir.path().join("K3SysUi.K3_1.0.0.0");
    fs::write(&ui, b"not even an executable").unwrap();

    assert!(matches!(
        patch_ui_file(&ui, Model::K3, "1.0.0.0", &LaunchCommands::default()),
        Err(Error::UnsupportedTarget { .. })
    ));
    assert!(patch_ui_file(&ui, Model::K3, "2.3.9.3", &LaunchCommands::default()).is_err());
    assert!(!artifact_path(&ui).exists());
    assert_eq!(fs::read(&ui).unwrap(), b"not even an executable");
}

/// `k3_image` as an executable that imports `system` through its PLT.
fn k3_elf() -> Vec<u8> {
    let target = lookup_target(Model::K3, "2.3.9.3").unwrap();

    build_elf(
        K3_BASE,
        k3_image().as_bytes(),
        &[(".text", K3_BASE, 0x2000)],
        &[
            (target.callback, K3_CALLBACK, 0x100),
            (STATUS_CHECK, K3_BASE + STATUS_CHECK_AT, 8),
            (OS_SLEEP, K3_BASE + SLEEP_AT, 0x10),
            (WAIT_HANDLER, K3_BASE + HANDLER_AT, 0x10),
            (Model::K3.wait_hide().0, K3_BASE + HIDE_AT, 0x10),
            (SCRATCH_FUNCTION, K3_BASE + SCRATCH_AT, SCRATCH_SIZE as u32),
        ],
        &[SYSTEM],
    )
}

#[test]
fn ui_binary_is_patched_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("K3SysUi.K3_2.3.9.3");
    let original = k3_elf();
    fs::write(&path, &original).unwrap();
    let artifact = artifact_path(&path);

    let outcome = patch_ui_file(&path, Model::K3, "2.3.9.3", &LaunchCommands::default()).unwrap();
    assert_eq!(outcome, Outcome::Patched(artifact.clone()));
    assert_eq!(fs::read(&path).unwrap(), original);

    let image = ExecutableImage::open(&artifact).unwrap();
    let system = plt_stub(K3_BASE, 0x2000, 0);
    let scratch = K3_BASE + SCRATCH_AT;
    let (launch, _, _, start) = default_layout(scratch);

    assert_eq!(image.as_bytes().len(), original.len());
    assert_eq!(image.resolve_symbol(SYSTEM), Some(system));
    assert_eq!(image.read_word(scratch).unwrap(), 0xE1A0_F00E);

    let mut expected = Expected::at(start);
    expected.system(launch, system);
    assert_eq!(read_words(&image, start, 4), expected.words);
    assert_eq!(
        image.read_word(0xF_D3BC).unwrap(),
        Instruction::branch(start).encode(0xF_D3BC).unwrap()
    );

    let patched = fs::read(&artifact).unwrap();
    let outcome = patch_ui_file(&path, Model::K3, "2.3.9.3", &LaunchCommands::default()).unwrap();
    assert_eq!(outcome, Outcome::Skipped(artifact.clone()));
    assert_eq!(fs::read(&artifact).unwrap(), patched);
}

#[test]
fn api_binary_is_patched_once() {
    let image = api_image();
    let sections: Vec<(&str, PtrVal, usize)> = image
        .iter_sections()
        .map(|sec| (sec.as_name(), sec.address(), sec.size()))
        .collect();
    let original = build_elf(0x1_0000, image.as_bytes(), &sections, &[], &[]);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("gkapi.K3_2.3.9.3");
    fs::write(&path, &original).unwrap();
    let artifact = artifact_path(&path);
    let lan_mode = overrides("main.main", &[true, true]);

    let outcome = patch_api_file(&path, Model::K3, "2.3.9.3", &lan_mode).unwrap();
    assert_eq!(outcome, Outcome::Patched(artifact.clone()));
    assert_eq!(fs::read(&path).unwrap(), original);

    let patched = ExecutableImage::open(&artifact).unwrap();
    assert_eq!(patched.read_word(0x1_0010).unwrap(), Instruction::nop().encode(0).unwrap());
    assert_eq!(patched.read(0x1_0800, 14).unwrap(), b"0.0.0.0:002883");

    let first = fs::read(&artifact).unwrap();
    let outcome = patch_api_file(&path, Model::K3, "2.3.9.3", &lan_mode).unwrap();
    assert_eq!(outcome, Outcome::Skipped(artifact.clone()));
    assert_eq!(fs::read(&artifact).unwrap(), first);
}
