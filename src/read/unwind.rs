//! Walking a call stack by chaining rule-state decodes across frames.
//!
//! The unwinder owns nothing heavier than a fixed-capacity register file and
//! borrows everything else, so a walk performs no allocation, takes no
//! locks, and reads target memory only through a caller-supplied primitive
//! that fails instead of trapping. That makes it usable over another
//! thread's register snapshot or from inside a signal handler, and it means
//! a corrupt target can truncate a trace but never crash the walker.

use std::fmt;

use arrayvec::ArrayVec;

use crate::read::cfi::{CfaRule, Expression, FrameSection, RegisterRule, UnwindContext};
use crate::common::Register;
use crate::read::parser::{Error, Result};
use crate::read::reader::Reader;

/// The default cap on the number of frames one walk may produce.
///
/// Corrupt tables can describe cyclic "call stacks"; the cap guarantees
/// termination regardless.
pub const DEFAULT_MAX_FRAMES: usize = 256;

const MAX_REGISTERS: usize = 48;

/// A read primitive over the target's memory.
///
/// Implementations must return `UnreadableMemory` for unmapped or otherwise
/// unreadable addresses rather than faulting; the unwinder turns that into a
/// truncated trace.
pub trait Memory {
    /// Read an `size`-byte value from `address` and zero-extend it.
    fn read_address(&self, address: u64, size: u8) -> Result<u64>;
}

impl<'a, M: Memory> Memory for &'a M {
    fn read_address(&self, address: u64, size: u8) -> Result<u64> {
        (**self).read_address(address, size)
    }
}

/// A fixed-capacity mapping from registers to their known values.
///
/// Registers without an entry have no known value. Like the rule map on the
/// decode side, this is a small vec of pairs rather than an indexed table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegisterSet {
    values: ArrayVec<(Register, u64), MAX_REGISTERS>,
}

impl RegisterSet {
    /// Construct an empty register set.
    pub fn new() -> RegisterSet {
        Default::default()
    }

    /// The known value of the given register, if any.
    pub fn get(&self, register: Register) -> Option<u64> {
        self.values
            .iter()
            .find(|entry| entry.0 == register)
            .map(|entry| entry.1)
    }

    /// Record a value for the given register.
    pub fn set(&mut self, register: Register, value: u64) -> Result<()> {
        for entry in &mut self.values {
            if entry.0 == register {
                entry.1 = value;
                return Ok(());
            }
        }
        self.values
            .try_push((register, value))
            .map_err(|_| Error::TooManyRegisterRules)
    }

    /// Forget the value of the given register.
    pub fn clear(&mut self, register: Register) {
        if let Some(idx) = self.values.iter().position(|entry| entry.0 == register) {
            self.values.swap_remove(idx);
        }
    }

    /// Iterate over all known `(register, value)` pairs, in no particular
    /// order.
    pub fn iter(&self) -> impl Iterator<Item = &(Register, u64)> {
        self.values.iter()
    }
}

/// One frame of a recovered call stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pc: u64,
    cfa: u64,
    registers: RegisterSet,
}

impl Frame {
    /// The instruction pointer within this frame.
    ///
    /// For every frame but the innermost this is a return address: it points
    /// just past the call instruction that produced the frame below it.
    pub fn pc(&self) -> u64 {
        self.pc
    }

    /// This frame's canonical frame address.
    pub fn cfa(&self) -> u64 {
        self.cfa
    }

    /// The register values known while executing within this frame.
    pub fn registers(&self) -> &RegisterSet {
        &self.registers
    }
}

/// An evaluator for CFA rules that carry expression bytecode.
///
/// Expression evaluation is an extension point; the common
/// register-plus-offset path never calls it.
pub type ExpressionEvaluator<'a, R, M> =
    &'a dyn Fn(&Expression<R>, &RegisterSet, &M) -> Result<u64>;

/// Walks a call stack one frame at a time.
///
/// The walk is lazy, finite, and not restartable: each call to
/// [`next_frame`](Unwinder::next_frame) recovers one frame and steps to its
/// parent. The sequence ends cleanly when the outermost frame's
/// return-address rule is `Undefined`, or early when the table, the register
/// file, or target memory cannot produce the parent frame; the cause of an
/// early stop is retained in [`stop_reason`](Unwinder::stop_reason) rather
/// than fabricating a frame.
pub struct Unwinder<'a, R: Reader, M: Memory> {
    section: &'a FrameSection<R>,
    ctx: &'a mut UnwindContext<R>,
    memory: &'a M,
    stack_pointer: Register,
    pc: u64,
    registers: RegisterSet,
    is_return_address: bool,
    max_frames: usize,
    frames_yielded: usize,
    done: bool,
    stop_reason: Option<Error>,
    evaluator: Option<ExpressionEvaluator<'a, R, M>>,
}

impl<'a, R: Reader, M: Memory> Unwinder<'a, R, M> {
    /// Begin a walk at the given instruction pointer and register file.
    ///
    /// `stack_pointer` names the architecture's stack-pointer register; each
    /// recovered parent frame has that register set to the child's CFA, by
    /// convention.
    pub fn new(
        section: &'a FrameSection<R>,
        ctx: &'a mut UnwindContext<R>,
        memory: &'a M,
        stack_pointer: Register,
        pc: u64,
        registers: RegisterSet,
    ) -> Unwinder<'a, R, M> {
        Unwinder {
            section,
            ctx,
            memory,
            stack_pointer,
            pc,
            registers,
            is_return_address: false,
            max_frames: DEFAULT_MAX_FRAMES,
            frames_yielded: 0,
            done: false,
            stop_reason: None,
            evaluator: None,
        }
    }

    /// Cap the number of frames the walk may produce.
    pub fn max_frames(mut self, max_frames: usize) -> Self {
        self.max_frames = max_frames;
        self
    }

    /// Supply an evaluator for expression CFA rules.
    ///
    /// Without one, a frame whose CFA rule carries bytecode stops the walk
    /// with `UnsupportedExpression`.
    pub fn expression_evaluator(mut self, evaluator: ExpressionEvaluator<'a, R, M>) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    /// Why the walk stopped early, if it did.
    ///
    /// `None` means the walk is still in progress or ended at the outermost
    /// frame (an `Undefined` return-address rule, or the frame cap).
    pub fn stop_reason(&self) -> Option<Error> {
        self.stop_reason
    }

    /// Recover the next frame, stepping the walk to its parent.
    pub fn next_frame(&mut self) -> Option<Frame> {
        if self.done || self.frames_yielded >= self.max_frames {
            self.done = true;
            return None;
        }
        match self.step() {
            Ok(frame) => {
                self.frames_yielded += 1;
                Some(frame)
            }
            Err(e) => {
                self.done = true;
                self.stop_reason = Some(e);
                None
            }
        }
    }

    fn step(&mut self) -> Result<Frame> {
        // A return address points just past its call instruction; the rules
        // we want for the parent frame are the call site's.
        let lookup_pc = if self.is_return_address {
            self.pc.saturating_sub(1)
        } else {
            self.pc
        };

        let function = self.section.function_for_address(lookup_pc)?;
        let row = function.rule_state_for_address(self.ctx, lookup_pc)?;
        let defaults = function.defaults();
        let address_size = defaults.address_size();
        let ra_register = defaults.return_address_register();

        let cfa = match row.cfa() {
            CfaRule::RegisterAndOffset { register, offset } => {
                let base = self
                    .registers
                    .get(*register)
                    .ok_or(Error::MissingRegisterValue)?;
                base.wrapping_add(*offset as u64)
            }
            CfaRule::Expression(expression) => match self.evaluator {
                Some(evaluator) => evaluator(expression, &self.registers, self.memory)?,
                None => return Err(Error::UnsupportedExpression),
            },
        };

        let frame = Frame {
            pc: self.pc,
            cfa,
            registers: self.registers.clone(),
        };

        // Recover the caller's register values. `SameValue` and registers
        // with no rule carry through unchanged.
        let mut recovered = self.registers.clone();
        for &(register, ref rule) in row.registers() {
            match *rule {
                RegisterRule::Undefined => recovered.clear(register),
                RegisterRule::SameValue => {}
                RegisterRule::Offset(offset) => {
                    let address = cfa.wrapping_add(offset as u64);
                    let value = self.memory.read_address(address, address_size)?;
                    recovered.set(register, value)?;
                }
                RegisterRule::Register(src) => {
                    let value = self
                        .registers
                        .get(src)
                        .ok_or(Error::MissingRegisterValue)?;
                    recovered.set(register, value)?;
                }
            }
        }

        // An `Undefined` return-address column marks the outermost frame.
        if let RegisterRule::Undefined = row.register(ra_register) {
            self.done = true;
            return Ok(frame);
        }
        let return_address = recovered
            .get(ra_register)
            .ok_or(Error::MissingRegisterValue)?;
        recovered.set(self.stack_pointer, cfa)?;
        self.pc = return_address;
        self.registers = recovered;
        self.is_return_address = true;

        Ok(frame)
    }
}

// The expression evaluator is a bare function reference and has nothing
// useful to show.
impl<'a, R: Reader, M: Memory> fmt::Debug for Unwinder<'a, R, M> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Unwinder")
            .field("stack_pointer", &self.stack_pointer)
            .field("pc", &self.pc)
            .field("registers", &self.registers)
            .field("is_return_address", &self.is_return_address)
            .field("max_frames", &self.max_frames)
            .field("frames_yielded", &self.frames_yielded)
            .field("done", &self.done)
            .field("stop_reason", &self.stop_reason)
            .finish_non_exhaustive()
    }
}

impl<'a, R: Reader, M: Memory> Iterator for Unwinder<'a, R, M> {
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        self.next_frame()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::X86_64;

    #[test]
    fn register_set_get_set_clear() {
        let mut regs = RegisterSet::new();
        assert_eq!(regs.get(X86_64::RSP), None);
        regs.set(X86_64::RSP, 0x1000).unwrap();
        regs.set(X86_64::RBP, 0x2000).unwrap();
        assert_eq!(regs.get(X86_64::RSP), Some(0x1000));
        regs.set(X86_64::RSP, 0x1008).unwrap();
        assert_eq!(regs.get(X86_64::RSP), Some(0x1008));
        regs.clear(X86_64::RSP);
        assert_eq!(regs.get(X86_64::RSP), None);
        assert_eq!(regs.get(X86_64::RBP), Some(0x2000));
    }
}
