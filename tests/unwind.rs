//! End-to-end tests: author tables with the write API, persist them, then
//! decode and walk a fake call stack with the read API.

use std::collections::HashMap;

use callframe::arch::X86_64;
use callframe::endianity::LittleEndian;
use callframe::read::{
    CfaRule, Error, FrameSection, Memory, RegisterRule, RegisterSet, Result, UnwindContext,
    Unwinder,
};
use callframe::write::{
    CfiDirective, CommonDefaults, EndianVec, FrameInstruction, FrameTable, FunctionProgram,
    RuleTracker,
};

/// Target memory as a sparse map of 8-byte values.
#[derive(Debug, Default)]
struct FakeMemory {
    values: HashMap<u64, u64>,
}

impl FakeMemory {
    fn set(&mut self, address: u64, value: u64) {
        self.values.insert(address, value);
    }
}

impl Memory for FakeMemory {
    fn read_address(&self, address: u64, _size: u8) -> Result<u64> {
        self.values
            .get(&address)
            .copied()
            .ok_or(Error::UnreadableMemory)
    }
}

/// Target memory where every address reads back the same value, for
/// manufacturing cyclic "call stacks".
#[derive(Debug)]
struct ConstantMemory(u64);

impl Memory for ConstantMemory {
    fn read_address(&self, _address: u64, _size: u8) -> Result<u64> {
        Ok(self.0)
    }
}

fn x86_64_defaults() -> CommonDefaults {
    let mut defaults = CommonDefaults::new(8, 1, -8, X86_64::RA);
    defaults.add_instruction(FrameInstruction::Cfa(X86_64::RSP, 8));
    defaults.add_instruction(FrameInstruction::Offset(X86_64::RA, -8));
    defaults
}

/// Author the table for a function with a classic frame-pointer prologue
/// and epilogue, from the textual directives an assembler would see.
fn square_program(defaults: &CommonDefaults) -> FunctionProgram {
    let mut tracker = RuleTracker::new(defaults, 0x1000);
    let events: &[(u32, &str)] = &[
        (0, ".cfi_startproc"),
        // push rbp
        (0x1, ".cfi_def_cfa_offset 16"),
        (0x1, ".cfi_offset 6, -16"),
        // mov rbp, rsp
        (0x4, ".cfi_def_cfa_register 6"),
        // pop rbp
        (0x11, ".cfi_def_cfa 7, 8"),
        (0x11, ".cfi_restore 6"),
        (0x12, ".cfi_endproc"),
    ];
    for &(offset, line) in events {
        let directive: CfiDirective = line.parse().unwrap();
        tracker.event(offset, &directive).unwrap();
    }
    tracker.into_program().unwrap()
}

/// A leaf-free function that never diverges from the defaults.
fn main_program(defaults: &CommonDefaults) -> FunctionProgram {
    let mut tracker = RuleTracker::new(defaults, 0x2000);
    tracker.end(0x40).unwrap();
    tracker.into_program().unwrap()
}

/// The outermost function: its return address rule is undefined, which is
/// what cleanly terminates a walk.
fn start_program(defaults: &CommonDefaults) -> FunctionProgram {
    let mut tracker = RuleTracker::new(defaults, 0x3000);
    tracker
        .event(0, &CfiDirective::Undefined { register: X86_64::RA })
        .unwrap();
    tracker.end(0x10).unwrap();
    tracker.into_program().unwrap()
}

fn build_section(functions: Vec<FunctionProgram>) -> Vec<u8> {
    let table = FrameTable::factor(x86_64_defaults(), functions);
    let mut w = EndianVec::new(LittleEndian);
    table.write(&mut w).unwrap();
    w.into_vec()
}

#[test]
fn walk_a_three_frame_stack() {
    let defaults = x86_64_defaults();
    let contents = build_section(vec![
        square_program(&defaults),
        main_program(&defaults),
        start_program(&defaults),
    ]);
    let section = FrameSection::new(&contents, LittleEndian);

    // Stopped inside square's body, after the frame pointer took over.
    // square's frame: CFA = rbp + 16, caller rbp at CFA - 16, return
    // address at CFA - 8.
    let mut memory = FakeMemory::default();
    memory.set(0x7fff_ff08, 0x2010); // return address into main
    memory.set(0x7fff_ff00, 0x7fff_ff80); // caller's rbp
    memory.set(0x7fff_ff10, 0x3008); // main's return address into _start

    let mut registers = RegisterSet::new();
    registers.set(X86_64::RSP, 0x7fff_fef0).unwrap();
    registers.set(X86_64::RBP, 0x7fff_ff00).unwrap();

    let mut ctx = UnwindContext::new();
    let mut unwinder = Unwinder::new(
        &section,
        &mut ctx,
        &memory,
        X86_64::RSP,
        0x100a,
        registers,
    );

    let frame = unwinder.next_frame().unwrap();
    assert_eq!(frame.pc(), 0x100a);
    assert_eq!(frame.cfa(), 0x7fff_ff10);

    let frame = unwinder.next_frame().unwrap();
    assert_eq!(frame.pc(), 0x2010);
    assert_eq!(frame.cfa(), 0x7fff_ff18);
    // The caller's frame pointer was recovered from square's spill slot,
    // and its stack pointer is square's CFA.
    assert_eq!(frame.registers().get(X86_64::RBP), Some(0x7fff_ff80));
    assert_eq!(frame.registers().get(X86_64::RSP), Some(0x7fff_ff10));

    let frame = unwinder.next_frame().unwrap();
    assert_eq!(frame.pc(), 0x3008);

    // The walk ends cleanly at the outermost frame.
    assert_eq!(unwinder.next_frame(), None);
    assert_eq!(unwinder.stop_reason(), None);
}

#[test]
fn every_offset_decodes_after_round_trip() {
    let defaults = x86_64_defaults();
    let contents = build_section(vec![square_program(&defaults)]);
    let section = FrameSection::new(&contents, LittleEndian);

    let mut ctx = UnwindContext::new();
    for address in 0x1000..0x1012 {
        let row = section.rule_state_for_address(&mut ctx, address).unwrap();
        assert!(row.contains(address));

        // The CFA and frame pointer rules track the authored prologue and
        // epilogue exactly.
        let (cfa_register, cfa_offset) = match address {
            0x1000 => (X86_64::RSP, 8),
            0x1001..=0x1003 => (X86_64::RSP, 16),
            0x1004..=0x1010 => (X86_64::RBP, 16),
            _ => (X86_64::RSP, 8),
        };
        assert_eq!(
            row.cfa(),
            &CfaRule::RegisterAndOffset {
                register: cfa_register,
                offset: cfa_offset,
            },
            "cfa at {:#x}",
            address
        );

        let rbp_rule = match address {
            0x1001..=0x1010 => RegisterRule::Offset(-16),
            _ => RegisterRule::Undefined,
        };
        assert_eq!(row.register(X86_64::RBP), rbp_rule, "rbp at {:#x}", address);

        // The return address is recoverable at every single offset.
        assert_eq!(row.register(X86_64::RA), RegisterRule::Offset(-8));
    }
}

#[test]
fn cyclic_stack_is_capped() {
    let defaults = x86_64_defaults();
    let contents = build_section(vec![main_program(&defaults)]);
    let section = FrameSection::new(&contents, LittleEndian);

    // Every memory read yields a pc back inside the same function, so the
    // "stack" never bottoms out.
    let memory = ConstantMemory(0x2005);
    let mut registers = RegisterSet::new();
    registers.set(X86_64::RSP, 0x5000).unwrap();

    let mut ctx = UnwindContext::new();
    let mut unwinder = Unwinder::new(
        &section,
        &mut ctx,
        &memory,
        X86_64::RSP,
        0x2005,
        registers,
    )
    .max_frames(8);

    assert_eq!(unwinder.by_ref().count(), 8);
    assert_eq!(unwinder.stop_reason(), None);
}

#[test]
fn unknown_caller_truncates_the_walk() {
    let defaults = x86_64_defaults();
    let contents = build_section(vec![main_program(&defaults)]);
    let section = FrameSection::new(&contents, LittleEndian);

    // The recovered return address points to code with no table entry.
    let memory = ConstantMemory(0x9999_9999);
    let mut registers = RegisterSet::new();
    registers.set(X86_64::RSP, 0x5000).unwrap();

    let mut ctx = UnwindContext::new();
    let mut unwinder = Unwinder::new(
        &section,
        &mut ctx,
        &memory,
        X86_64::RSP,
        0x2005,
        registers,
    );

    assert!(unwinder.next_frame().is_some());
    assert_eq!(unwinder.next_frame(), None);
    assert_eq!(unwinder.stop_reason(), Some(Error::UnknownFunction));
}

#[test]
fn unreadable_memory_truncates_the_walk() {
    let defaults = x86_64_defaults();
    let contents = build_section(vec![main_program(&defaults)]);
    let section = FrameSection::new(&contents, LittleEndian);

    let memory = FakeMemory::default();
    let mut registers = RegisterSet::new();
    registers.set(X86_64::RSP, 0x5000).unwrap();

    let mut ctx = UnwindContext::new();
    let mut unwinder = Unwinder::new(
        &section,
        &mut ctx,
        &memory,
        X86_64::RSP,
        0x2005,
        registers,
    );

    // Recovering the return address needs a memory read, so not even the
    // innermost frame can be produced.
    assert_eq!(unwinder.next_frame(), None);
    assert_eq!(unwinder.stop_reason(), Some(Error::UnreadableMemory));
}

#[test]
fn missing_register_value_truncates_the_walk() {
    let defaults = x86_64_defaults();
    let contents = build_section(vec![main_program(&defaults)]);
    let section = FrameSection::new(&contents, LittleEndian);

    let memory = ConstantMemory(0);
    // No stack pointer value, so the CFA cannot be computed.
    let registers = RegisterSet::new();

    let mut ctx = UnwindContext::new();
    let mut unwinder = Unwinder::new(
        &section,
        &mut ctx,
        &memory,
        X86_64::RSP,
        0x2005,
        registers,
    );

    assert_eq!(unwinder.next_frame(), None);
    assert_eq!(unwinder.stop_reason(), Some(Error::MissingRegisterValue));
}
